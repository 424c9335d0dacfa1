//! Clap argument types shared by the `skiff` and `skiffd` binaries.

use clap::Parser;
use std::path::PathBuf;

use crate::auth::DEFAULT_ADMIN_ID;
use crate::protocol::DEFAULT_PORT;

/// Interactive client: connect, authenticate, then a command shell
#[derive(Clone, Debug, Parser)]
#[command(author, version, about = "skiff - private file transfer client")]
pub struct ClientOpts {
    /// Remote endpoint, as `host` or `identifier@host`
    pub target: String,

    /// Remote port
    #[arg(default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

impl ClientOpts {
    /// Splits `identifier@host`; a bare (or empty) identifier falls back
    /// to the administrator identity.
    pub fn identity_and_host(&self) -> (String, String) {
        match self.target.split_once('@') {
            Some((id, host)) if !id.is_empty() => (id.to_string(), host.to_string()),
            Some((_, host)) => (DEFAULT_ADMIN_ID.to_string(), host.to_string()),
            None => (DEFAULT_ADMIN_ID.to_string(), self.target.clone()),
        }
    }
}

/// Daemon: bind 0.0.0.0 and serve one session per connection
#[derive(Clone, Debug, Parser)]
#[command(author, version, about = "skiffd - private file transfer daemon")]
pub struct DaemonOpts {
    /// Listen port
    #[arg(default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Initial session directory (defaults to this user's home)
    #[arg(long)]
    pub home: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_defaults_to_admin() {
        let opts = ClientOpts {
            target: "files.example.net".to_string(),
            port: DEFAULT_PORT,
        };
        assert_eq!(
            opts.identity_and_host(),
            ("admin".to_string(), "files.example.net".to_string())
        );
    }

    #[test]
    fn identity_is_split_from_host() {
        let opts = ClientOpts {
            target: "carol@files.example.net".to_string(),
            port: DEFAULT_PORT,
        };
        assert_eq!(
            opts.identity_and_host(),
            ("carol".to_string(), "files.example.net".to_string())
        );
    }

    #[test]
    fn empty_identity_falls_back_to_admin() {
        let opts = ClientOpts {
            target: "@files.example.net".to_string(),
            port: DEFAULT_PORT,
        };
        assert_eq!(
            opts.identity_and_host(),
            ("admin".to_string(), "files.example.net".to_string())
        );
    }
}
