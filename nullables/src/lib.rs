//! Nullable infrastructure for deterministic testing.
//!
//! Every external collaborator of the orchestrator (clock, code channel,
//! system of record, secure storage) sits behind a trait. This crate provides
//! implementations that:
//! - Return deterministic values
//! - Can be controlled programmatically
//! - Record what they were asked to do, for assertions
//! - Never touch the network or the platform keystore
//!
//! Usage: swap real implementations for nullables in tests.

pub mod backend;
pub mod clock;
pub mod credentials;
pub mod gateway;

pub use backend::NullBackend;
pub use clock::NullClock;
pub use credentials::NullCredentialStore;
pub use gateway::NullOtpGateway;
