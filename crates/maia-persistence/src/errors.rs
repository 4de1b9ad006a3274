//! Error types for the persistence layer

use maia_types::StoreError;
use thiserror::Error;

/// Result type for registry and persistence operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Errors raised by the tenant registry and API-key lifecycle
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Tenant record missing
    #[error("tenant not found: {0}")]
    TenantNotFound(String),

    /// Tenant name already taken by a live tenant
    #[error("tenant already exists: {0}")]
    TenantExists(String),

    /// Usage row missing for a tenant
    #[error("usage record not found for tenant: {0}")]
    UsageNotFound(String),

    /// No API key matches the presented credential
    #[error("api key not found")]
    ApiKeyNotFound,

    /// The API key exists but its expiry has passed
    #[error("api key expired")]
    ApiKeyExpired,

    /// Scope outside the closed vocabulary
    #[error("invalid scope: {0}")]
    InvalidScope(String),

    /// Validation failure on registry input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Record (de)serialization failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failure in the underlying store or KV engine
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<PersistenceError> for StoreError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::TenantNotFound(id) => StoreError::NotFound(format!("tenant {id}")),
            PersistenceError::UsageNotFound(id) => {
                StoreError::NotFound(format!("usage for tenant {id}"))
            }
            PersistenceError::ApiKeyNotFound => StoreError::NotFound("api key".to_string()),
            PersistenceError::ApiKeyExpired => StoreError::invalid_input("api key expired"),
            PersistenceError::TenantExists(name) => {
                StoreError::AlreadyExists(format!("tenant {name}"))
            }
            PersistenceError::InvalidScope(s) => {
                StoreError::InvalidInput(format!("invalid scope: {s}"))
            }
            PersistenceError::InvalidInput(msg) => StoreError::InvalidInput(msg),
            PersistenceError::Serialization(e) => StoreError::Serialization(e),
            PersistenceError::Store(e) => e,
        }
    }
}

impl PersistenceError {
    /// Create an invalid-input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// True when the error should surface as 404 at the HTTP boundary
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::TenantNotFound(_)
                | Self::UsageNotFound(_)
                | Self::ApiKeyNotFound
                | Self::Store(StoreError::NotFound(_))
        )
    }
}
