use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("verification error: {0}")]
    Verification(#[from] ekyc_verification::VerificationError),

    #[error("gateway error: {0}")]
    Gateway(#[from] ekyc_gateway::GatewayError),

    #[error("HTTP API error: {0}")]
    Rpc(#[from] ekyc_rpc::RpcError),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("credential store error: {0}")]
    CredentialStore(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("shutdown timeout")]
    ShutdownTimeout,
}
