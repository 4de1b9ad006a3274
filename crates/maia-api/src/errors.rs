//! API error types with canonical wire codes
//!
//! Every error surfaces as `{error, code?, details?}` with an appropriate
//! HTTP status. Internal detail never reaches the wire body; it is logged
//! with the request path at error level instead.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use maia_intelligence::IntelligenceError;
use maia_persistence::PersistenceError;
use maia_types::StoreError;
use serde_json::json;
use thiserror::Error;

/// Errors produced by handlers and middleware
#[derive(Error, Debug)]
pub enum ApiError {
    /// 404 NOT_FOUND
    #[error("{0}")]
    NotFound(String),

    /// 409 ALREADY_EXISTS
    #[error("{0}")]
    AlreadyExists(String),

    /// 400 INVALID_INPUT
    #[error("{0}")]
    InvalidInput(String),

    /// 401, plain `{error, message}` body
    #[error("{0}")]
    Unauthorized(String),

    /// 403 FORBIDDEN
    #[error("{0}")]
    Forbidden(String),

    /// 403 INSUFFICIENT_SCOPE
    #[error("{0}")]
    InsufficientScope(String),

    /// 429, generic body (quota axes)
    #[error("{0}")]
    QuotaExceeded(String),

    /// 429 RATE_LIMIT_EXCEEDED
    #[error("rate limit exceeded")]
    RateLimited,

    /// 400 CACHE_DISABLED
    #[error("response cache is disabled")]
    CacheDisabled,

    /// 503 INFERENCE_DISABLED
    #[error("inference routing is not configured")]
    InferenceDisabled,

    /// 404 PROVIDER_NOT_FOUND
    #[error("{0}")]
    ProviderNotFound(String),

    /// 500 HEALTH_CHECK_FAILED
    #[error("{0}")]
    HealthCheckFailed(String),

    /// 500 INTERNAL_ERROR; detail logged, never sent
    #[error("internal server error")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) | Self::ProviderNotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyExists(_) => StatusCode::CONFLICT,
            Self::InvalidInput(_) | Self::CacheDisabled => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) | Self::InsufficientScope(_) => StatusCode::FORBIDDEN,
            Self::QuotaExceeded(_) | Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::InferenceDisabled => StatusCode::SERVICE_UNAVAILABLE,
            Self::HealthCheckFailed(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Canonical wire code; `None` for bodies without a code
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::NotFound(_) => Some("NOT_FOUND"),
            Self::AlreadyExists(_) => Some("ALREADY_EXISTS"),
            Self::InvalidInput(_) => Some("INVALID_INPUT"),
            Self::Unauthorized(_) => None,
            Self::Forbidden(_) => Some("FORBIDDEN"),
            Self::InsufficientScope(_) => Some("INSUFFICIENT_SCOPE"),
            Self::QuotaExceeded(_) => None,
            Self::RateLimited => Some("RATE_LIMIT_EXCEEDED"),
            Self::CacheDisabled => Some("CACHE_DISABLED"),
            Self::InferenceDisabled => Some("INFERENCE_DISABLED"),
            Self::ProviderNotFound(_) => Some("PROVIDER_NOT_FOUND"),
            Self::HealthCheckFailed(_) => Some("HEALTH_CHECK_FAILED"),
            Self::Internal(_) => Some("INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if let Self::Internal(detail) = &self {
            tracing::error!(detail = %detail, "Internal error");
        }

        if let Self::Unauthorized(message) = &self {
            let body = Json(json!({ "error": "unauthorized", "message": message }));
            return (status, body).into_response();
        }

        let mut body = json!({ "error": self.to_string() });
        if let Some(code) = self.code() {
            body["code"] = json!(code);
        }
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::NotFound(format!("not found: {what}")),
            StoreError::AlreadyExists(what) => Self::AlreadyExists(format!("already exists: {what}")),
            StoreError::InvalidInput(msg) => Self::InvalidInput(msg),
            StoreError::QuotaExceeded { resource, .. } => {
                Self::QuotaExceeded(format!("quota exceeded for {resource}"))
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<PersistenceError> for ApiError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::TenantNotFound(id) => Self::NotFound(format!("tenant not found: {id}")),
            PersistenceError::UsageNotFound(id) => {
                Self::NotFound(format!("usage not found for tenant: {id}"))
            }
            PersistenceError::TenantExists(name) => {
                Self::AlreadyExists(format!("tenant already exists: {name}"))
            }
            PersistenceError::ApiKeyNotFound => Self::NotFound("api key not found".to_string()),
            PersistenceError::ApiKeyExpired => Self::Unauthorized("api key expired".to_string()),
            PersistenceError::InvalidScope(s) => Self::InvalidInput(format!("invalid scope: {s}")),
            PersistenceError::InvalidInput(msg) => Self::InvalidInput(msg),
            PersistenceError::Store(store) => store.into(),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<IntelligenceError> for ApiError {
    fn from(err: IntelligenceError) -> Self {
        match err {
            IntelligenceError::NoProviderFound(what) => {
                Self::ProviderNotFound(format!("no provider found: {what}"))
            }
            IntelligenceError::EmptyMessages | IntelligenceError::InvalidModel(_) => {
                Self::InvalidInput(err.to_string())
            }
            IntelligenceError::StreamNotSupported(_) => Self::InvalidInput(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

/// Result type alias for handlers
pub type ApiResult<T> = Result<T, ApiError>;
