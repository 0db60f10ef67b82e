//! Node lifecycle: wires collaborators into the service and runs the HTTP API
//! until shutdown.

use crate::config::NodeConfig;
use crate::credentials::FileCredentialStore;
use crate::shutdown::ShutdownController;
use crate::NodeError;
use ekyc_gateway::HttpGateway;
use ekyc_rpc::{ApiServer, OrchestratorMetrics};
use ekyc_verification::{
    Collaborators, CredentialStore, ProgressEvent, SystemClock, VerificationService,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Timeout for waiting on background tasks during shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct OrchestratorNode {
    config: NodeConfig,
    service: Arc<VerificationService>,
    metrics: Arc<OrchestratorMetrics>,
    pub shutdown: Arc<ShutdownController>,
    /// Handles for spawned background tasks (joined during shutdown).
    tasks: Vec<JoinHandle<()>>,
}

impl OrchestratorNode {
    /// Build a node talking to the configured backend over HTTP.
    pub async fn new(config: NodeConfig) -> Result<Self, NodeError> {
        config.validate()?;
        let gateway = Arc::new(HttpGateway::with_timeout(
            &config.backend_url,
            config.request_timeout(),
        )?);
        let credentials: Arc<dyn CredentialStore> = match &config.credential_file {
            Some(path) => Arc::new(FileCredentialStore::open(path).await?),
            None => {
                tracing::warn!("no credential_file configured; remembered devices are kept in memory");
                Arc::new(FileCredentialStore::in_memory())
            }
        };
        Self::with_collaborators(
            config,
            Collaborators {
                otp: gateway.clone(),
                backend: gateway,
                credentials,
                clock: Arc::new(SystemClock),
            },
        )
    }

    /// Build a node over caller-supplied collaborators.
    pub fn with_collaborators(config: NodeConfig, collaborators: Collaborators) -> Result<Self, NodeError> {
        config.validate()?;
        let service = Arc::new(VerificationService::new(config.params.clone(), collaborators)?);
        let metrics = Arc::new(OrchestratorMetrics::new()?);
        Ok(Self {
            config,
            service,
            metrics,
            shutdown: Arc::new(ShutdownController::new()),
            tasks: Vec::new(),
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn service(&self) -> &Arc<VerificationService> {
        &self.service
    }

    pub fn metrics(&self) -> &Arc<OrchestratorMetrics> {
        &self.metrics
    }

    /// Bind the API listener and spawn the background tasks. Returns the
    /// bound address (useful with `listen_port = 0`).
    pub async fn start(&mut self) -> Result<SocketAddr, NodeError> {
        tracing::info!(
            port = self.config.listen_port,
            backend = %self.config.backend_url,
            metrics = self.config.enable_metrics,
            "orchestrator node starting"
        );

        let listener = ApiServer::bind(self.config.listen_port).await?;
        let addr = listener.local_addr()?;
        let server = ApiServer::new(
            self.service.clone(),
            self.metrics.clone(),
            self.config.enable_metrics,
        );
        let stopped = self.shutdown.signalled();
        self.tasks.push(tokio::spawn(async move {
            if let Err(e) = server.serve(listener, stopped).await {
                tracing::error!("HTTP API error: {e}");
            }
        }));

        let mut events = self.service.subscribe();
        let mut shutdown_rx = self.shutdown.subscribe();
        self.tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => break,
                    event = events.recv() => match event {
                        Ok(ProgressEvent::StageAdvanced { subject, from, to }) => {
                            tracing::info!(target: "ekyc::progress", %subject, ?from, ?to, "stage advanced");
                        }
                        Err(RecvError::Lagged(missed)) => {
                            tracing::warn!(missed, "progress log fell behind");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        }));

        Ok(addr)
    }

    /// Start, wait for SIGINT/SIGTERM, then stop.
    pub async fn run_until_signal(&mut self) -> Result<(), NodeError> {
        self.start().await?;
        self.shutdown.wait_for_signal().await;
        self.stop().await
    }

    pub async fn stop(&mut self) -> Result<(), NodeError> {
        tracing::info!("orchestrator node stopping");
        self.shutdown.shutdown();

        let tasks = std::mem::take(&mut self.tasks);
        tokio::time::timeout(SHUTDOWN_TIMEOUT, async move {
            for task in tasks {
                if let Err(e) = task.await {
                    tracing::warn!("background task failed: {e}");
                }
            }
        })
        .await
        .map_err(|_| NodeError::ShutdownTimeout)?;

        tracing::info!("orchestrator node stopped");
        Ok(())
    }
}
