//! Axum router and server lifecycle.

use crate::error::RpcError;
use crate::handlers;
use crate::metrics::OrchestratorMetrics;
use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post},
    Router,
};
use ekyc_verification::VerificationService;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared by every handler.
pub struct AppState {
    pub service: Arc<VerificationService>,
    pub metrics: Arc<OrchestratorMetrics>,
}

/// Build the router. `/metrics` is mounted only when `enable_metrics` is set;
/// handler counters are kept either way.
pub fn router(state: Arc<AppState>, enable_metrics: bool) -> Router {
    let subjects = Router::new()
        .route(
            "/:id/challenge",
            post(handlers::send_code).delete(handlers::reset_challenge),
        )
        .route("/:id/challenge/verify", post(handlers::verify_code))
        .route("/:id/status", get(handlers::status))
        .route("/:id/document/capture", post(handlers::capture_document))
        .route("/:id/document", get(handlers::document))
        .route(
            "/:id/document/edits",
            delete(handlers::discard_edits).put(handlers::edit_field),
        )
        .route("/:id/document/submit", post(handlers::submit_document))
        .route("/:id/face-match", post(handlers::face_match));

    let mut app = Router::new()
        .nest("/v1/subjects", subjects)
        .route("/health", get(handlers::health));
    if enable_metrics {
        app = app.route("/metrics", get(handlers::metrics));
    }

    app.layer(middleware::from_fn_with_state(state.clone(), track_latency))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn track_latency(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let started = Instant::now();
    let response = next.run(request).await;
    state
        .metrics
        .request_duration_ms
        .observe(started.elapsed().as_secs_f64() * 1_000.0);
    response
}

pub struct ApiServer {
    state: Arc<AppState>,
    enable_metrics: bool,
}

impl ApiServer {
    pub fn new(service: Arc<VerificationService>, metrics: Arc<OrchestratorMetrics>, enable_metrics: bool) -> Self {
        Self {
            state: Arc::new(AppState { service, metrics }),
            enable_metrics,
        }
    }

    pub fn router(&self) -> Router {
        router(self.state.clone(), self.enable_metrics)
    }

    pub async fn bind(port: u16) -> Result<TcpListener, RpcError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        TcpListener::bind(addr)
            .await
            .map_err(|e| RpcError::Server(format!("failed to bind {addr}: {e}")))
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), RpcError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local = listener
            .local_addr()
            .map_err(|e| RpcError::Server(e.to_string()))?;
        tracing::info!(addr = %local, metrics = self.enable_metrics, "HTTP API listening");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| RpcError::Server(e.to_string()))?;
        tracing::info!("HTTP API stopped");
        Ok(())
    }
}
