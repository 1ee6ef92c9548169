//! Error types for the index library.
//!
//! Errors carry a status code plus a human readable message, in the style of
//! a `Status`/`StatusOr` API. Query-time budget exhaustion is never reported
//! here: it shows up as fewer (sentinel padded) results.

use std::fmt;
use thiserror::Error;

/// Status codes used by [`FlannError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid argument provided (bad parameters, dimension mismatch, ...).
    InvalidArgument,
    /// The index is not in a state that allows the operation.
    FailedPrecondition,
    /// An allocation failed.
    ResourceExhausted,
    /// Persisted data is corrupt, truncated or does not match the dataset.
    DataLoss,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::InvalidArgument => write!(f, "INVALID_ARGUMENT"),
            ErrorCode::FailedPrecondition => write!(f, "FAILED_PRECONDITION"),
            ErrorCode::ResourceExhausted => write!(f, "RESOURCE_EXHAUSTED"),
            ErrorCode::DataLoss => write!(f, "DATA_LOSS"),
            ErrorCode::Internal => write!(f, "INTERNAL"),
        }
    }
}

/// Main error type for index construction, search and persistence.
#[derive(Error, Debug, Clone)]
pub struct FlannError {
    code: ErrorCode,
    message: String,
}

impl FlannError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    // Convenience constructors

    /// Create an invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, msg)
    }

    /// Create a failed precondition error.
    pub fn failed_precondition(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::FailedPrecondition, msg)
    }

    /// Create a resource exhausted error.
    pub fn resource_exhausted(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ResourceExhausted, msg)
    }

    /// Create a data loss error.
    pub fn data_loss(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::DataLoss, msg)
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, msg)
    }

    /// Shorthand for the "query before build" precondition.
    pub(crate) fn not_built() -> Self {
        Self::failed_precondition("index has not been built; call build_index() first")
    }
}

impl fmt::Display for FlannError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl From<std::io::Error> for FlannError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::InvalidData => {
                Self::data_loss(format!("stream truncated or corrupt: {}", err))
            }
            _ => Self::internal(format!("i/o error: {}", err)),
        }
    }
}

impl From<bincode::Error> for FlannError {
    fn from(err: bincode::Error) -> Self {
        match *err {
            bincode::ErrorKind::Io(io) => io.into(),
            other => Self::data_loss(format!("malformed record: {}", other)),
        }
    }
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, FlannError>;
