//! Request-pipeline middleware
//!
//! Layered in a fixed order: security headers → request id → CORS → rate
//! limit → authentication → namespace authorization → tenant
//! identification → scope enforcement → handler.

pub mod auth;
pub mod authz;
pub mod rate_limit;
pub mod scopes;
pub mod security;
pub mod tenant;

pub use auth::{auth_middleware, RawApiKey};
pub use authz::namespace_authz_middleware;
pub use rate_limit::{rate_limit_middleware, ClientRateLimiter};
pub use scopes::scope_middleware;
pub use security::{request_id_middleware, security_headers_middleware, RequestId};
pub use tenant::{tenant_middleware, KeyRecord, RequestTenant};
