//! Axum HTTP API server.
//!
//! This crate provides:
//! - Job submission endpoints for trim, segment removal and autoflip
//! - Job status polling and artifact downloads
//! - Health and readiness probes
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod validation;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
