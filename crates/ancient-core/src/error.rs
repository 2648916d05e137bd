//! Freezer Error Types
//!
//! Every failure a freezer, its backend, or a remote client can report maps to
//! one [`ErrorKind`]. The kind survives the RPC boundary: the server encodes it
//! as a JSON-RPC error code and the client rebuilds the same variant, so code
//! on either side of the wire can match on `err.kind()`.
//!
//! ## Error Categories
//!
//! ### Caller Errors
//! - `OutOfBounds`: requested item number is at or above the frozen count
//! - `OutOfOrder`: append with an item number other than the frozen count
//! - `InvalidRecord`: a supplied blob does not fit the typed record
//! - `ReadOnly`: mutating call on a read-only freezer
//! - `NotSupported`: unknown kind, or an operation the backend cannot serve
//!
//! ### Backend Errors
//! - `NotFound`: an object the freezer expected is missing
//! - `Transient`: network or storage hiccup, safe to retry
//! - `Fatal`: namespace missing, access denied, corrupt marker
//!
//! ### Plumbing Errors
//! - `Codec`: chunk or hex payload could not be encoded/decoded
//! - `Transport`: RPC transport failure
//! - `Closed`: the freezer was closed

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FreezerError>;

#[derive(Debug, Error)]
pub enum FreezerError {
    #[error("out of bounds: item {number} (frozen {frozen})")]
    OutOfBounds { number: u64, frozen: u64 },

    #[error("the append operation is out-order: have {frozen} want {number}")]
    OutOfOrder { number: u64, frozen: u64 },

    #[error("this operation is not supported: {0}")]
    NotSupported(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("transient backend error: {0}")]
    Transient(String),

    #[error("fatal backend error: {0}")]
    Fatal(String),

    #[error("freezer is read-only")]
    ReadOnly,

    #[error("freezer is closed")]
    Closed,

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl FreezerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FreezerError::OutOfBounds { .. } => ErrorKind::OutOfBounds,
            FreezerError::OutOfOrder { .. } => ErrorKind::OutOfOrder,
            FreezerError::NotSupported(_) => ErrorKind::NotSupported,
            FreezerError::NotFound(_) => ErrorKind::NotFound,
            FreezerError::Transient(_) => ErrorKind::Transient,
            FreezerError::Fatal(_) => ErrorKind::Fatal,
            FreezerError::ReadOnly => ErrorKind::ReadOnly,
            FreezerError::Closed => ErrorKind::Closed,
            FreezerError::InvalidRecord(_) => ErrorKind::InvalidRecord,
            FreezerError::Codec(_) => ErrorKind::Codec,
            FreezerError::Transport(_) => ErrorKind::Transport,
        }
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient | ErrorKind::Transport)
    }
}

impl From<std::io::Error> for FreezerError {
    fn from(e: std::io::Error) -> Self {
        FreezerError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for FreezerError {
    fn from(e: serde_json::Error) -> Self {
        FreezerError::Codec(e.to_string())
    }
}

/// Stable classification of a [`FreezerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    OutOfBounds,
    OutOfOrder,
    NotSupported,
    NotFound,
    #[serde(rename = "transient-backend")]
    Transient,
    #[serde(rename = "fatal-backend")]
    Fatal,
    ReadOnly,
    Closed,
    InvalidRecord,
    Codec,
    Transport,
}

impl ErrorKind {
    /// JSON-RPC error code carried on the wire.
    pub fn code(&self) -> i64 {
        match self {
            ErrorKind::Transient => -32000,
            ErrorKind::OutOfBounds => -32001,
            ErrorKind::OutOfOrder => -32002,
            ErrorKind::NotSupported => -32003,
            ErrorKind::NotFound => -32004,
            ErrorKind::ReadOnly => -32005,
            ErrorKind::Fatal => -32006,
            ErrorKind::Closed => -32007,
            ErrorKind::InvalidRecord => -32008,
            ErrorKind::Codec => -32009,
            // Transport failures never reach the wire as a response; a server
            // reporting one is treated as a transient failure.
            ErrorKind::Transport => -32000,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        let kind = match code {
            -32000 => ErrorKind::Transient,
            -32001 => ErrorKind::OutOfBounds,
            -32002 => ErrorKind::OutOfOrder,
            -32003 => ErrorKind::NotSupported,
            -32004 => ErrorKind::NotFound,
            -32005 => ErrorKind::ReadOnly,
            -32006 => ErrorKind::Fatal,
            -32007 => ErrorKind::Closed,
            -32008 => ErrorKind::InvalidRecord,
            -32009 => ErrorKind::Codec,
            _ => return None,
        };
        Some(kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::OutOfBounds => "out-of-bounds",
            ErrorKind::OutOfOrder => "out-of-order",
            ErrorKind::NotSupported => "not-supported",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Transient => "transient-backend",
            ErrorKind::Fatal => "fatal-backend",
            ErrorKind::ReadOnly => "read-only",
            ErrorKind::Closed => "closed",
            ErrorKind::InvalidRecord => "invalid-record",
            ErrorKind::Codec => "codec",
            ErrorKind::Transport => "transport",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
