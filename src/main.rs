//! skiff - interactive client for the skiff file-transfer protocol.

use anyhow::{Context, Result};
use clap::Parser;

use skiff::cli::ClientOpts;
use skiff::client::{CancelToken, ClientSession};
use skiff::protocol::ProtocolConfig;
use skiff::shell::Shell;

fn init_logging() {
    use tracing_subscriber::EnvFilter;
    // quiet by default so the shell stays readable; RUST_LOG overrides
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    init_logging();
    let opts = ClientOpts::parse();
    let (identity, host) = opts.identity_and_host();

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || cancel.cancel()).context("install Ctrl-C handler")?;
    }

    let mut session = ClientSession::connect(
        &host,
        opts.port,
        ProtocolConfig::default(),
        cancel.clone(),
    )
    .with_context(|| format!("connect to {host} port {}", opts.port))?;

    session.send_identity(&identity)?;
    let term = console::Term::stdout();
    loop {
        term.write_str(&format!("{identity}@{host}'s password: "))?;
        let secret = term.read_secure_line()?;
        if session.try_secret(&secret)? {
            println!("Connected to {identity}@{host}");
            break;
        }
        println!("Permission denied, please try again.");
    }

    Shell::new(session, cancel)?.run()
}
