//! Shared error taxonomy (spec §7).
//!
//! Every component defines its own `thiserror` enum for the failure modes
//! specific to it; `CoreError` is the common currency they all convert
//! into at module boundaries, so callers (the CLI, and eventually an HTTP
//! layer) can map a single enum onto user-visible status codes.

use thiserror::Error;

/// The error taxonomy shared by every core component.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("busy")]
    Busy,

    #[error("out of memory: {0}")]
    OutOfMemory(String),

    #[error("invalid size: {0}")]
    InvalidSize(String),

    #[error("decode error: {0}")]
    DecodeError(String),

    #[error("encode error: {0}")]
    EncodeError(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("timeout")]
    Timeout,

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
}

impl CoreError {
    /// HTTP status an external collaborator would map this onto (§7).
    /// Not used internally; kept so the boundary the HTTP layer would
    /// occupy has a single obvious answer once that layer is built.
    pub fn http_status_hint(&self) -> u16 {
        match self {
            CoreError::Busy => 503,
            CoreError::InvalidArgument(_) | CoreError::UnsupportedFormat(_) | CoreError::InvalidSize(_) => 400,
            CoreError::NotFound(_) => 404,
            CoreError::Timeout => 504,
            _ => 500,
        }
    }
}
