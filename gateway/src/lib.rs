//! HTTP gateway to the external verification services.
//!
//! Implements the orchestrator's collaborator traits over one REST API:
//! - `POST /v1/otp/send`, `POST /v1/otp/verify` for the code channel
//! - `/v1/subjects/{id}/...` for status, document extraction and face match
//!
//! Non-success responses are mapped onto the orchestrator's error taxonomy by
//! status code, so callers never probe response shapes.

pub mod client;
pub mod error;
pub mod wire;

pub use client::HttpGateway;
pub use error::GatewayError;
