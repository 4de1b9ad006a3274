//! MAIA inference routing core
//!
//! Vendor-agnostic abstraction over chat-completion providers: the
//! [`Provider`] contract and stream accumulator, a hysteresis-driven
//! health checker, a pattern-routing [`Router`] with failover, and a
//! deterministic-key response cache consumed through [`CachingRouter`].

use thiserror::Error;

pub mod cache;
pub mod health;
pub mod mock_provider;
pub mod provider;
pub mod router;

pub use cache::{CacheConfig, CacheStats, CachingRouter, ResponseCache};
pub use health::{HealthCheckConfig, HealthChecker, HealthRecord, ProviderHealth};
pub use provider::{
    ChatChunk, ChatMessage, ChatRequest, ChatResponse, Choice, ChunkAccumulator, ChunkChoice,
    ChunkDelta, ModelInfo, Provider, Role, StreamReader, TokenUsage,
};
pub use mock_provider::MockProvider;
pub use router::{Router, RouterConfig};

/// Errors shared across the inference layer
#[derive(Error, Debug, Clone)]
pub enum IntelligenceError {
    /// The provider has been closed
    #[error("provider is closed")]
    ProviderClosed,

    /// No provider could be resolved for the request
    #[error("no provider found for model: {0}")]
    NoProviderFound(String),

    /// A completion request carried no messages
    #[error("request contains no messages")]
    EmptyMessages,

    /// The model id is not served by the addressed provider
    #[error("invalid model: {0}")]
    InvalidModel(String),

    /// The addressed provider is failing health checks
    #[error("provider unhealthy: {0}")]
    ProviderUnhealthy(String),

    /// The provider cannot stream
    #[error("streaming not supported by provider: {0}")]
    StreamNotSupported(String),

    /// Upstream provider failure
    #[error("provider error: {0}")]
    Provider(String),

    /// Misconfiguration detected at runtime
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Result type for the inference layer
pub type Result<T> = std::result::Result<T, IntelligenceError>;
