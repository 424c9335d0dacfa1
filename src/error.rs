//! Error taxonomy for the protocol engine.
//!
//! Framing problems and vocabulary violations are fatal to the connection;
//! path and authentication refusals are *not* errors at all (they travel as
//! ordinary reply messages / outcome enums so the session survives them).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The leading bytes of a frame did not match the protocol discriminator.
    #[error("framing corrupted: bad discriminator")]
    BadDiscriminator,

    /// A header field could not be parsed or carried an out-of-range value.
    #[error("framing corrupted: {0}")]
    Framing(&'static str),

    /// Decoded message-type integer is outside the closed vocabulary.
    #[error("unknown message type {0}")]
    UnknownMessage(u8),

    /// The peer closed the connection (possibly mid-frame).
    #[error("peer disconnected")]
    Disconnected,

    /// No frame arrived within the configured read deadline.
    #[error("peer unresponsive")]
    PeerUnresponsive,

    /// The peer ended the session with an exit command.
    #[error("session closed by peer")]
    Closed,

    /// A message arrived that the state machine cannot accept in its
    /// current state.
    #[error("unexpected message {got} while waiting for {expected}")]
    Unexpected { expected: &'static str, got: u8 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
