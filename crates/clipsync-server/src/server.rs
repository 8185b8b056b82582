//! `ClipSyncServer`: Axum HTTP + WebSocket server around one registry.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use clipsync_auth::TokenValidator;
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::{ServerConfig, SessionConfig};
use crate::fanout::{Backbone, Fanout, FanoutBridge};
use crate::health::{self, HealthResponse};
use crate::hub::{Hub, HubHandle};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::admission::ws_handler;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Registry handle.
    pub hub: HubHandle,
    /// Publishing side of the backbone.
    pub fanout: Arc<dyn Fanout>,
    /// Token check for admission.
    pub validator: Arc<dyn TokenValidator>,
    /// Limits applied to every session.
    pub session: SessionConfig,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// One hub instance: registry loop, fan-out bridge and HTTP surface.
pub struct ClipSyncServer {
    config: ServerConfig,
    state: AppState,
    shutdown: Arc<ShutdownCoordinator>,
    hub_task: Mutex<Option<JoinHandle<()>>>,
}

impl ClipSyncServer {
    /// Create a server and start its registry loop. Must be called from
    /// within a Tokio runtime.
    pub fn new(
        config: ServerConfig,
        backbone: Arc<dyn Backbone>,
        validator: Arc<dyn TokenValidator>,
    ) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let fanout: Arc<dyn Fanout> = Arc::new(FanoutBridge::new(
            backbone,
            config.channel_prefix.clone(),
            shutdown.token(),
        ));
        let (hub, hub_task) = Hub::spawn(
            fanout.clone(),
            config.command_queue_capacity,
            shutdown.token(),
        );

        let state = AppState {
            hub,
            fanout,
            validator,
            session: config.session,
            start_time: Instant::now(),
            metrics: None,
        };
        Self {
            config,
            state,
            shutdown,
            hub_task: Mutex::new(Some(hub_task)),
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.state.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
    }

    /// Bind and serve until shutdown. Returns the bound address and the
    /// server task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener =
            tokio::net::TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        info!(%addr, "clipsync hub listening");
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "http server failed");
            }
        });
        Ok((addr, handle))
    }

    /// Registry handle.
    pub fn hub(&self) -> &HubHandle {
        &self.state.hub
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Take the registry task, for draining at shutdown. `None` after the
    /// first call.
    pub fn take_hub_task(&self) -> Option<JoinHandle<()>> {
        self.hub_task.lock().take()
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let stats = state.hub.stats(None).await;
    let resp = health::health_check(state.start_time, stats);
    let status = if resp.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(resp))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
