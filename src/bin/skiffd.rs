//! skiffd - accepts connections and runs one independent session per
//! client.

use anyhow::{Context, Result};
use clap::Parser;

use skiff::auth::{self, CredentialStore};
use skiff::cli::DaemonOpts;
use skiff::protocol::ProtocolConfig;
use skiff::server;

fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    init_logging();
    let opts = DaemonOpts::parse();

    let home = match opts.home {
        Some(dir) => dir,
        None => auth::home_dir()?,
    };
    if !home.is_dir() {
        anyhow::bail!("session directory does not exist: {}", home.display());
    }
    let home = std::fs::canonicalize(&home)
        .with_context(|| format!("canonicalize {}", home.display()))?;

    // seeds the administrator entry on first run
    let users = CredentialStore::open_default().context("open credential table")?;
    tracing::info!(table = %users.path().display(), "credential table ready");

    let bind = format!("0.0.0.0:{}", opts.port);
    server::serve(&bind, home, users, ProtocolConfig::default())
}
