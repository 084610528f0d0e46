//! Error taxonomy shared by every boundary of the crate
//!
//! Two layers:
//! - [`ErrorKind`]: the five outcome classes callers branch on
//!   (unsupported, hardware missing, user cancelled, transport, precondition)
//! - [`TrustError`]: the concrete error carried through `Result`s, always
//!   mappable back to a kind

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result alias used across the crate
pub type TrustResult<T> = Result<T, TrustError>;

/// Failure class a caller can branch on without inspecting messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Platform or feature not implemented. Expected, not exceptional.
    Unsupported,
    /// The capability probe says the required hardware is absent
    HardwareUnavailable,
    /// The user dismissed a biometric or wallet prompt
    UserCancelled,
    /// The native, wallet or network call itself errored
    TransportFailure,
    /// Caller broke a documented precondition
    PreconditionViolation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Unsupported => "Unsupported",
            ErrorKind::HardwareUnavailable => "HardwareUnavailable",
            ErrorKind::UserCancelled => "UserCancelled",
            ErrorKind::TransportFailure => "TransportFailure",
            ErrorKind::PreconditionViolation => "PreconditionViolation",
        };
        f.write_str(name)
    }
}

/// Crate error type
#[derive(Debug, thiserror::Error)]
pub enum TrustError {
    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Hardware unavailable: {0}")]
    HardwareUnavailable(String),

    #[error("User cancelled")]
    UserCancelled,

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Precondition violated: {0}")]
    Precondition(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TrustError {
    /// Map to the branchable failure class
    pub fn kind(&self) -> ErrorKind {
        match self {
            TrustError::Unsupported(_) => ErrorKind::Unsupported,
            TrustError::HardwareUnavailable(_) => ErrorKind::HardwareUnavailable,
            TrustError::UserCancelled => ErrorKind::UserCancelled,
            TrustError::Transport(_) | TrustError::Io(_) => ErrorKind::TransportFailure,
            // Missing key: the caller enrolls first
            TrustError::Precondition(_)
            | TrustError::KeyNotFound(_)
            | TrustError::Config(_)
            | TrustError::Json(_) => ErrorKind::PreconditionViolation,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TrustError::UserCancelled)
    }
}
