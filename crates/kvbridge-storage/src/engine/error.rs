//! Storage error types.

use thiserror::Error;

/// Result alias used by every engine operation.
pub type StorageResult<T> = Result<T, StorageError>;

/// Coarse classification of a [`StorageError`].
///
/// A lookup miss is not an error and has no kind: reads report it as
/// `Ok(None)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Store-level I/O failure or corruption.
    IoFailure,
    /// The map-size ceiling or the namespace-count ceiling was hit.
    CapacityExceeded,
    /// The operation is not valid in the engine's current state.
    InvalidState,
}

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The environment could not be opened.
    #[error("failed to open environment: {0}")]
    Open(String),

    /// The configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O or corruption error reported by the store.
    #[error("I/O error: {0}")]
    Io(String),

    /// A size or count ceiling of the environment was reached.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// The operation is not valid in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The namespace handle has already been closed.
    #[error("namespace is closed")]
    NamespaceClosed,

    /// A namespace was reopened with a different key order than it was created with.
    #[error("namespace '{namespace}' was created with a different comparator")]
    ComparatorMismatch {
        /// The namespace that could not be opened.
        namespace: String,
    },
}

impl StorageError {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Open(_) | Self::Io(_) => ErrorKind::IoFailure,
            Self::CapacityExceeded(_) => ErrorKind::CapacityExceeded,
            Self::Config(_)
            | Self::InvalidState(_)
            | Self::NamespaceClosed
            | Self::ComparatorMismatch { .. } => ErrorKind::InvalidState,
        }
    }

    /// Create an invalid-state error.
    #[must_use]
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
