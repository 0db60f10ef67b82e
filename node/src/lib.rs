//! Orchestrator node: configuration, logging, credential storage and the
//! lifecycle that ties the verification service to its HTTP API.

pub mod config;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod node;
pub mod shutdown;

pub use config::NodeConfig;
pub use credentials::FileCredentialStore;
pub use error::NodeError;
pub use logging::{init_logging, LogFormat};
pub use node::OrchestratorNode;
pub use shutdown::ShutdownController;
