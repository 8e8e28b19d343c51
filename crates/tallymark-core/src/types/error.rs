//! Error types for the tallymark engine
//!
//! Every fallible engine path returns [`Error`]. Storage failures keep their
//! own enum so the maintenance scheduler can decide what is worth retrying.

use thiserror::Error;

/// Main result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum Error {
    /// Caller supplied an invalid request; nothing was mutated
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Requested item does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Backing store failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A concurrency or topology invariant was violated
    #[error("Invariant violated: {0}")]
    Invariant(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The engine is shutting down and no longer accepts work
    #[error("Engine is shut down")]
    Shutdown,

    /// I/O errors from std, such as failing to spawn a worker thread
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Request validation failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field was empty
    #[error("missing required field `{field}`")]
    Missing {
        /// Field name
        field: &'static str,
    },

    /// A field exceeded the configured maximum byte length
    #[error("field `{field}` is {len} bytes (max: {max})")]
    TooLong {
        /// Field name
        field: &'static str,
        /// Actual length in bytes
        len: usize,
        /// Configured maximum in bytes
        max: usize,
    },
}

/// Storage-specific errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// LMDB environment or transaction failure
    #[error("LMDB error: {0}")]
    Lmdb(#[from] heed::Error),

    /// Filesystem failure while opening the environment
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored row could not be decoded
    #[error("Data corruption detected: {0}")]
    Corruption(String),

    /// Transaction aborted
    #[error("Transaction failed: {0}")]
    Transaction(String),

    /// No integer ids left to allocate
    #[error("Integer id space exhausted")]
    IdSpaceExhausted,
}

impl Error {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new invariant error
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Storage(e) if e.is_retryable())
    }

    /// Check if error is a client error (4xx equivalent)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::Validation(_) | Error::NotFound(_))
    }

    /// Check if error is a server error (5xx equivalent)
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }
}

impl StorageError {
    /// Transient failures that a later attempt may clear
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::Lmdb(_) | StorageError::Io(_) | StorageError::Transaction(_) => true,
            StorageError::Corruption(_) | StorageError::IdSpaceExhausted => false,
        }
    }

    /// Create a new corruption error
    pub fn corruption(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }
}

/// Report a broken invariant.
///
/// Panics in debug builds; release builds log the violation and carry on so
/// the caller can skip the offending step.
#[track_caller]
pub fn invariant_violation(msg: &str) {
    crate::log_error!(violation = msg, "invariant violated");
    debug_assert!(false, "invariant violated: {msg}");
}
