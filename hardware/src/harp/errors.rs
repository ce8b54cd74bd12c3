use thiserror::Error;

use super::message::{MessageType, ParseError};

/// Errors from a Harp transaction
#[derive(Error, Debug)]
pub enum HarpError {
    #[error("failed to open serial port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out waiting for reply to register {address}")]
    Timeout { address: u8 },

    #[error("malformed frame: {0}")]
    Frame(#[from] ParseError),

    #[error("device rejected {kind:?} of register {address}")]
    ErrorReply { kind: MessageType, address: u8 },

    #[error("register {address}: expected {expected} value(s), got {got}")]
    WrongValueCount {
        address: u8,
        expected: usize,
        got: usize,
    },

    #[error("unexpected device: WhoAmI is 0x{got:04X}, expected 0x{expected:04X}")]
    UnexpectedDevice { expected: u16, got: u16 },
}

pub type HarpResult<T> = Result<T, HarpError>;
