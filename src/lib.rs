//! skiff: a private file-transfer protocol over a single TCP stream.
//!
//! The protocol engine is the frame codec ([`frame`]), the two closed
//! message vocabularies ([`protocol`]), the per-connection session state
//! machines ([`session`] server-side, [`client`] client-side) with their
//! stop-and-wait chunked transfers, and the acceptor/supervisor
//! ([`server`]). Everything else is thin wrapping: credential storage,
//! directory listing, CLI types and the interactive shell.

pub mod auth;
pub mod cli;
pub mod client;
pub mod error;
pub mod frame;
pub mod listing;
pub mod protocol;
pub mod server;
pub mod session;
pub mod shell;

pub use error::Error;
