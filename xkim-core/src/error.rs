//! Error types for the monitor extension.

use std::fmt;

use thiserror::Error;

/// Handshake step that was waiting when a link timeout fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPhase {
    /// Write cycle: waiting for the peer to release ACK before driving data.
    WriteIdle,
    /// Write cycle: waiting for the peer to raise ACK after STROBE.
    WriteAck,
    /// Write cycle: waiting for the peer to drop ACK after STROBE cleared.
    WriteRelease,
    /// Read cycle: waiting for the peer's STROBE.
    ReadStrobe,
    /// Read cycle: waiting for the peer to drop STROBE after our ACK.
    ReadRelease,
}

/// Position inside an Intel HEX record where decoding stopped.
///
/// Each stage has its own diagnostic code so an operator can tell which byte
/// of the line was bad.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HexStage {
    /// Looking for the ':' that starts a record.
    Start,
    ByteCount,
    AddressHigh,
    AddressLow,
    RecordType,
    Payload,
    Checksum,
}

impl HexStage {
    /// Operator-facing diagnostic code.
    pub fn code(self) -> u8 {
        match self {
            HexStage::Start => 1,
            HexStage::ByteCount => 2,
            HexStage::AddressHigh => 3,
            HexStage::AddressLow => 4,
            HexStage::RecordType => 5,
            HexStage::Payload => 6,
            HexStage::Checksum => 7,
        }
    }
}

impl fmt::Display for HexStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HexStage::Start => "record start",
            HexStage::ByteCount => "byte count",
            HexStage::AddressHigh => "address high",
            HexStage::AddressLow => "address low",
            HexStage::RecordType => "record type",
            HexStage::Payload => "payload",
            HexStage::Checksum => "checksum",
        };
        f.write_str(name)
    }
}

/// Intel HEX decode failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HexError {
    #[error("expected ':' but found {found:#04X}")]
    MissingColon { found: u8 },

    #[error("bad hex digit {found:#04X} in {stage}")]
    BadDigit { stage: HexStage, found: u8 },

    #[error("input ended in {stage}")]
    UnexpectedEnd { stage: HexStage },

    #[error("unknown record type {0:#04X}")]
    UnknownRecordType(u8),

    #[error("end-of-file record declares {0} data bytes")]
    EndRecordWithData(u8),

    #[error("checksum mismatch: record has {found:#04X}, expected {expected:#04X}")]
    ChecksumMismatch { expected: u8, found: u8 },
}

impl HexError {
    /// Stage at which the load was aborted.
    pub fn stage(&self) -> HexStage {
        match self {
            HexError::MissingColon { .. } => HexStage::Start,
            HexError::BadDigit { stage, .. } | HexError::UnexpectedEnd { stage } => *stage,
            HexError::UnknownRecordType(_) => HexStage::RecordType,
            HexError::EndRecordWithData(_) => HexStage::ByteCount,
            HexError::ChecksumMismatch { .. } => HexStage::Checksum,
        }
    }

    /// Diagnostic code reported to the operator.
    pub fn code(&self) -> u8 {
        self.stage().code()
    }
}

/// Errors that can occur in the monitor extension.
#[derive(Error, Debug)]
pub enum XkimError {
    #[error("link timeout while waiting in {0:?}")]
    Timeout(LinkPhase),

    #[error("link is in {0:?} mode")]
    WrongDirection(crate::link::Direction),

    #[error("{operation} failed: peer status {status:#04X}")]
    Disk { operation: &'static str, status: u8 },

    #[error("unexpected reply {0:#04X} from peer")]
    Protocol(u8),

    #[error("bad argument: {0}")]
    BadArgument(String),

    #[error("invalid filename: {0}")]
    InvalidFilename(String),

    #[error("block of {0} bytes exceeds the protocol limit")]
    BlockTooLarge(usize),

    #[error("no file is open")]
    NotOpen,

    #[error("a file is already open")]
    AlreadyOpen,

    #[error("file is not open for {0}")]
    WrongMode(&'static str),

    #[error("HEX load error {code}: {0}", code = .0.code())]
    Hex(#[from] HexError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for monitor operations.
pub type XkimResult<T> = Result<T, XkimError>;
