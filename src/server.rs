//! Connection acceptor and session supervisor.

use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};

use crate::auth::CredentialStore;
use crate::protocol::ProtocolConfig;
use crate::session::Session;

/// Binds `bind` and serves forever.
pub fn serve(
    bind: &str,
    home: PathBuf,
    users: CredentialStore,
    config: ProtocolConfig,
) -> Result<()> {
    let listener = TcpListener::bind(bind).with_context(|| format!("bind {bind}"))?;
    serve_on(listener, home, users, config)
}

/// Accept loop: each connection gets an independent session on its own
/// thread; sessions share nothing but the read-only credential table.
/// Finished threads are reaped after each accept without blocking new
/// ones, and neither a session error nor an accept error stops the loop.
pub fn serve_on(
    listener: TcpListener,
    home: PathBuf,
    users: CredentialStore,
    config: ProtocolConfig,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, home = %home.display(), "listening");
    }
    let users = Arc::new(users);
    let mut sessions: Vec<JoinHandle<()>> = Vec::new();
    for conn in listener.incoming() {
        match conn {
            Ok(stream) => {
                let peer = stream
                    .peer_addr()
                    .map(|a| a.to_string())
                    .unwrap_or_else(|_| "unknown".to_string());
                tracing::info!(%peer, "session started");
                let session =
                    Session::new(stream, users.clone(), home.clone(), config.clone());
                sessions.push(thread::spawn(move || session.run()));
            }
            Err(err) => tracing::warn!(%err, "accept error"),
        }
        // reap finished sessions without blocking the next accept
        for handle in std::mem::take(&mut sessions) {
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                sessions.push(handle);
            }
        }
    }
    Ok(())
}
