//! Error taxonomy shared by every dbgrid crate.
//!
//! Each variant is a distinct kind a caller can act on. Transport layers
//! map kinds to status codes; nothing in the core collapses a specific
//! kind into a generic failure.

use thiserror::Error;

/// Result type alias for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors surfaced by provider operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Malformed resource id or tunable assignment. Never retried.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Tunables version mismatch. Re-read and retry.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Operation disallowed by the cluster topology. Never retried.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Leader not resolvable or connection refused.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Deadline exceeded.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Unexpected driver or orchestrator failure.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Discriminant of a [`ProviderError`], without the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidArgument,
    Conflict,
    Forbidden,
    Unavailable,
    Timeout,
    Internal,
}

impl ProviderError {
    /// The kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Unavailable(_) => ErrorKind::Unavailable,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// The message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::InvalidArgument(m)
            | Self::Conflict(m)
            | Self::Forbidden(m)
            | Self::Unavailable(m)
            | Self::Timeout(m)
            | Self::Internal(m) => m,
        }
    }

    /// Whether a caller may retry the same request unchanged (with backoff).
    ///
    /// `Conflict` is excluded: it needs a fresh read first.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }

    /// Rebuild an error from a kind and message (used when decoding
    /// errors that crossed the wire).
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::InvalidArgument => Self::InvalidArgument(message),
            ErrorKind::Conflict => Self::Conflict(message),
            ErrorKind::Forbidden => Self::Forbidden(message),
            ErrorKind::Unavailable => Self::Unavailable(message),
            ErrorKind::Timeout => Self::Timeout(message),
            ErrorKind::Internal => Self::Internal(message),
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InvalidArgument => "invalid_argument",
            Self::Conflict => "conflict",
            Self::Forbidden => "forbidden",
            Self::Unavailable => "unavailable",
            Self::Timeout => "timeout",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}
