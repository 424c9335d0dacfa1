//! Wire-level constants and the two closed message vocabularies.
//!
//! Every frame on the wire is `b"dg"` + an 8-digit decimal-ASCII total
//! length + a 2-digit decimal-ASCII message type + the payload. The two
//! vocabularies are exact mirror images: every outcome the server can emit
//! has a matching case the client recognizes, and vice versa. Adding a
//! command means extending both enums in lockstep.

use std::time::Duration;

use crate::error::Error;

/// Two-byte marker opening every frame; anything else is corruption.
pub const DISCRIMINATOR: &[u8; 2] = b"dg";

/// Width of the decimal-ASCII total-length field.
pub const LEN_WIDTH: usize = 8;

/// Width of the decimal-ASCII message-type field.
pub const TYPE_WIDTH: usize = 2;

/// Header bytes counted into `total_length` on top of type + payload
/// (discriminator plus the length field itself).
pub const HEADER_OVERHEAD: usize = 2 + LEN_WIDTH;

/// Complete header: discriminator, length field, message type.
pub const HEADER_SIZE: usize = HEADER_OVERHEAD + TYPE_WIDTH;

/// Default chunk size for get/put/ls streaming.
pub const DEFAULT_BLOCK_SIZE: usize = 2 * 1024 * 1024;

/// Upper bound on a declared frame length - prevents memory exhaustion
/// from a corrupt or hostile length field.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

pub const DEFAULT_PORT: u16 = 2022;

/// Knobs shared by the codec and both session ends. Passed explicitly into
/// constructors; there is no process-wide mutable configuration.
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    pub block_size: usize,
    pub max_frame_size: usize,
    /// Deadline for protocol-phase reads (acks, data blocks, command
    /// replies). Prompt-driven waits run without a deadline.
    pub read_timeout: Duration,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            read_timeout: Duration::from_secs(30),
        }
    }
}

/// Messages a client sends; the server decodes exactly this set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientMessage {
    Alive = 1,
    Hello = 2,
    AuthId = 3,
    AuthSecret = 4,
    Cd = 5,
    Pwd = 6,
    Ls = 7,
    Get = 8,
    Put = 9,
    Exit = 10,
    CdProceed = 11,
    LsProceed = 12,
    GetProceed = 13,
    GetStop = 14,
    PutProceed = 15,
    PutStop = 16,
    PutData = 17,
}

impl ClientMessage {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Out-of-range codes are a decode error, never a panic.
    pub fn from_code(code: u8) -> Result<Self, Error> {
        Ok(match code {
            1 => Self::Alive,
            2 => Self::Hello,
            3 => Self::AuthId,
            4 => Self::AuthSecret,
            5 => Self::Cd,
            6 => Self::Pwd,
            7 => Self::Ls,
            8 => Self::Get,
            9 => Self::Put,
            10 => Self::Exit,
            11 => Self::CdProceed,
            12 => Self::LsProceed,
            13 => Self::GetProceed,
            14 => Self::GetStop,
            15 => Self::PutProceed,
            16 => Self::PutStop,
            17 => Self::PutData,
            other => return Err(Error::UnknownMessage(other)),
        })
    }
}

/// Messages a server sends; the client decodes exactly this set.
///
/// `AliveCheck`, `GetSuccess` and `PutSuccess` are legal on the wire but
/// never emitted by this implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerMessage {
    AliveCheck = 1,
    AuthProceed = 2,
    AuthFailure = 3,
    AuthSuccess = 4,
    CdPathError = 5,
    CdProceed = 6,
    CdSuccess = 7,
    PwdSuccess = 8,
    LsPathError = 9,
    LsProceed = 10,
    LsData = 11,
    LsSuccess = 12,
    LsFailure = 13,
    GetPathError = 14,
    GetProceed = 15,
    GetData = 16,
    GetSuccess = 17,
    GetFailure = 18,
    PutPathError = 19,
    PutProceed = 20,
    PutSuccess = 21,
    PutFailure = 22,
    ExitSuccess = 23,
}

impl ServerMessage {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Result<Self, Error> {
        Ok(match code {
            1 => Self::AliveCheck,
            2 => Self::AuthProceed,
            3 => Self::AuthFailure,
            4 => Self::AuthSuccess,
            5 => Self::CdPathError,
            6 => Self::CdProceed,
            7 => Self::CdSuccess,
            8 => Self::PwdSuccess,
            9 => Self::LsPathError,
            10 => Self::LsProceed,
            11 => Self::LsData,
            12 => Self::LsSuccess,
            13 => Self::LsFailure,
            14 => Self::GetPathError,
            15 => Self::GetProceed,
            16 => Self::GetData,
            17 => Self::GetSuccess,
            18 => Self::GetFailure,
            19 => Self::PutPathError,
            20 => Self::PutProceed,
            21 => Self::PutSuccess,
            22 => Self::PutFailure,
            23 => Self::ExitSuccess,
            other => return Err(Error::UnknownMessage(other)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_codes_round_trip() {
        for code in 1..=17u8 {
            let msg = ClientMessage::from_code(code).unwrap();
            assert_eq!(msg.code(), code);
        }
    }

    #[test]
    fn server_codes_round_trip() {
        for code in 1..=23u8 {
            let msg = ServerMessage::from_code(code).unwrap();
            assert_eq!(msg.code(), code);
        }
    }

    #[test]
    fn out_of_range_codes_are_errors() {
        assert!(ClientMessage::from_code(0).is_err());
        assert!(ClientMessage::from_code(18).is_err());
        assert!(ServerMessage::from_code(0).is_err());
        assert!(ServerMessage::from_code(24).is_err());
        assert!(ServerMessage::from_code(99).is_err());
    }
}
