//! eKYC daemon: entry point for running an orchestrator node.

use clap::Parser;
use ekyc_node::{init_logging, LogFormat, NodeConfig, OrchestratorNode};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ekyc-daemon", about = "eKYC verification orchestrator daemon")]
struct Cli {
    /// Port for the HTTP API.
    #[arg(long, env = "EKYC_LISTEN_PORT")]
    listen_port: Option<u16>,

    /// Base URL of the verification backend.
    #[arg(long, env = "EKYC_BACKEND_URL")]
    backend_url: Option<String>,

    /// Timeout for a single backend request, in seconds.
    #[arg(long, env = "EKYC_REQUEST_TIMEOUT_SECS")]
    request_timeout_secs: Option<u64>,

    /// JSON file holding remembered-device credentials.
    #[arg(long, env = "EKYC_CREDENTIAL_FILE")]
    credential_file: Option<PathBuf>,

    /// Enable the Prometheus metrics endpoint.
    #[arg(long, env = "EKYC_ENABLE_METRICS")]
    metrics: bool,

    /// Log format: "human" or "json".
    #[arg(long, env = "EKYC_LOG_FORMAT")]
    log_format: Option<String>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "EKYC_LOG_LEVEL")]
    log_level: Option<String>,

    /// Path to a TOML configuration file. If provided, file settings
    /// are used as the base; CLI flags and env vars override them.
    #[arg(long, env = "EKYC_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Run the orchestrator until SIGINT/SIGTERM.
    Run,
    /// Print the effective configuration as TOML and exit.
    PrintConfig,
}

impl Cli {
    /// File settings first, then flags and environment on top.
    fn resolve(&self) -> anyhow::Result<NodeConfig> {
        let base = match &self.config {
            Some(path) => NodeConfig::from_toml_file(path)?,
            None => NodeConfig::default(),
        };
        Ok(NodeConfig {
            listen_port: self.listen_port.unwrap_or(base.listen_port),
            backend_url: self.backend_url.clone().unwrap_or(base.backend_url),
            request_timeout_secs: self.request_timeout_secs.unwrap_or(base.request_timeout_secs),
            credential_file: self.credential_file.clone().or(base.credential_file),
            log_format: self.log_format.clone().unwrap_or(base.log_format),
            log_level: self.log_level.clone().unwrap_or(base.log_level),
            enable_metrics: self.metrics || base.enable_metrics,
            params: base.params,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve()?;
    config.validate()?;

    match cli.command {
        Command::PrintConfig => {
            print!("{}", config.to_toml_string()?);
        }
        Command::Run => {
            let format = config
                .log_format
                .parse::<LogFormat>()
                .map_err(anyhow::Error::msg)?;
            init_logging(format, &config.log_level);
            if let Some(path) = &cli.config {
                tracing::info!("loaded config from {}", path.display());
            }

            let mut node = OrchestratorNode::new(config).await?;
            node.run_until_signal().await?;
            tracing::info!("eKYC daemon exited cleanly");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn flags_override_file_settings() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "listen_port = 9000\nbackend_url = \"http://file\"\n[params]\notp_cooldown_secs = 90"
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let cli = Cli::parse_from([
            "ekyc-daemon",
            "--config",
            path.as_str(),
            "--backend-url",
            "http://flag",
            "run",
        ]);
        let config = cli.resolve().unwrap();
        assert_eq!(config.listen_port, 9000);
        assert_eq!(config.backend_url, "http://flag");
        assert_eq!(config.params.otp_cooldown_secs, 90);
    }

    #[test]
    fn defaults_without_a_file() {
        let cli = Cli::parse_from(["ekyc-daemon", "print-config"]);
        let config = cli.resolve().unwrap();
        assert_eq!(config.listen_port, 7077);
        assert!(!config.enable_metrics);
    }
}
