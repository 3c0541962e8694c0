//! Axum HTTP API server.
//!
//! This crate provides:
//! - Upload grants and result lookups for authenticated clients
//! - Object-write event ingestion from storage
//! - Identity token verification against a JWKS endpoint
//! - Rate limiting, security headers and Prometheus metrics

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use auth::{AuthUser, IdentityClaim, IdentityVerifier, JwksVerifier};
pub use config::{ApiConfig, IdentityConfig};
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
