//! Error taxonomy shared by every store implementation

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by `MemoryStore` implementations and the layers above
#[derive(Error, Debug)]
pub enum StoreError {
    /// The requested record does not exist (or is not visible to the caller)
    #[error("not found: {0}")]
    NotFound(String),

    /// A unique constraint was violated on create
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Validation failure on user-supplied input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A tenant quota would be exceeded by the write
    #[error("quota exceeded: {resource} limit {limit} exceeded with usage {current}")]
    QuotaExceeded {
        resource: String,
        limit: u64,
        current: u64,
    },

    /// Record (de)serialization failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying engine I/O failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The store has been closed
    #[error("store is closed")]
    Closed,

    /// Anything that does not fit a more specific variant
    #[error("internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Create a not-found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create an already-exists error
    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists(what.into())
    }

    /// Create an invalid-input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a quota-exceeded error
    pub fn quota_exceeded(resource: impl Into<String>, limit: u64, current: u64) -> Self {
        Self::QuotaExceeded {
            resource: resource.into(),
            limit,
            current,
        }
    }

    /// True when the error masks a record the caller must not learn about
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
