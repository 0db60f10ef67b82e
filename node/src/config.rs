//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use ekyc_types::VerificationParams;

use crate::NodeError;

/// Configuration for an orchestrator node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Port the HTTP API listens on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Base URL of the verification backend (code channel, OCR, face match,
    /// system of record).
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Timeout for a single backend request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Where remembered-device credentials are kept. In memory when unset.
    #[serde(default)]
    pub credential_file: Option<PathBuf>,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Whether to expose the Prometheus metrics endpoint.
    #[serde(default)]
    pub enable_metrics: bool,

    /// Verification policy. Missing keys take their defaults.
    #[serde(default)]
    pub params: VerificationParams,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_listen_port() -> u16 {
    7077
}

fn default_backend_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<std::path::Path>) -> Result<Self, NodeError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Check everything that can be checked without touching the network.
    pub fn validate(&self) -> Result<(), NodeError> {
        if self.request_timeout_secs == 0 {
            return Err(NodeError::Config("request_timeout_secs must be positive".into()));
        }
        if !matches!(self.log_format.as_str(), "human" | "json") {
            return Err(NodeError::Config(format!(
                "log_format must be \"human\" or \"json\", got {:?}",
                self.log_format
            )));
        }
        self.params
            .validate()
            .map_err(|e| NodeError::Config(e.to_string()))
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
            backend_url: default_backend_url(),
            request_timeout_secs: default_request_timeout_secs(),
            credential_file: None,
            log_format: default_log_format(),
            log_level: default_log_level(),
            enable_metrics: false,
            params: VerificationParams::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = NodeConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        let parsed = NodeConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed.listen_port, config.listen_port);
        assert_eq!(parsed.params, config.params);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = NodeConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.listen_port, 7077);
        assert_eq!(config.request_timeout_secs, 10);
        assert_eq!(config.log_format, "human");
        assert_eq!(config.params.otp_cooldown_secs, 60);
    }

    #[test]
    fn partial_params_table_keeps_other_defaults() {
        let toml = r#"
            listen_port = 9999
            backend_url = "https://kyc.internal"

            [params]
            otp_cooldown_secs = 90
            face_match_threshold = 0.9
        "#;
        let config = NodeConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.listen_port, 9999);
        assert_eq!(config.backend_url, "https://kyc.internal");
        assert_eq!(config.params.otp_cooldown_secs, 90);
        assert_eq!(config.params.max_otp_attempts, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_params_fail_validation() {
        let config = NodeConfig::from_toml_str("[params]\nmax_otp_attempts = 0").unwrap();
        assert!(matches!(config.validate(), Err(NodeError::Config(_))));

        let config = NodeConfig::from_toml_str("log_format = \"xml\"").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "enable_metrics = true\nlog_level = \"debug\"").unwrap();
        let config = NodeConfig::from_toml_file(file.path()).unwrap();
        assert!(config.enable_metrics);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn missing_file_returns_config_error() {
        let result = NodeConfig::from_toml_file("/nonexistent/ekyc.toml");
        assert!(matches!(result, Err(NodeError::Config(_))));
    }
}
