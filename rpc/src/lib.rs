//! HTTP API for the verification orchestrator.
//!
//! Provides endpoints for:
//! - Sending, verifying and resetting one-time codes
//! - Verification status (refreshed through the deduplicating synchronizer)
//! - Document capture, review, correction and confirmation
//! - Face match
//! - Health and Prometheus metrics

pub mod error;
pub mod extract;
pub mod handlers;
pub mod metrics;
pub mod server;

pub use error::RpcError;
pub use metrics::OrchestratorMetrics;
pub use server::{router, ApiServer, AppState};
