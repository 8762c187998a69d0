use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use codeshare_core::ids::SessionId;
use codeshare_llm::CompletionGateway;
use codeshare_sandbox::SandboxExecutor;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::connection;
use crate::handlers::{autocomplete_handler, execute_handler, health_handler};
use crate::registry::SessionRegistry;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Per-connection outbound queue depth.
    pub max_send_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            max_send_queue: 256,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub executor: Arc<SandboxExecutor>,
    pub gateway: CompletionGateway,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws/{session_id}", get(ws_handler))
        .route("/execute", post(execute_handler))
        .route("/autocomplete", post(autocomplete_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind, build the registry and serve until `ServerHandle::shutdown`.
pub async fn start(
    config: ServerConfig,
    executor: SandboxExecutor,
    gateway: CompletionGateway,
) -> Result<ServerHandle, std::io::Error> {
    let registry = Arc::new(SessionRegistry::new(config.max_send_queue));
    let state = AppState {
        registry: Arc::clone(&registry),
        executor: Arc::new(executor),
        gateway,
    };

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(addr = %local_addr, "codeshare server started");

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
        {
            tracing::error!(error = %e, "server error");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        registry,
        cancel,
        server,
    })
}

/// Handle returned by `start()`. Keeps the server task alive.
pub struct ServerHandle {
    pub port: u16,
    registry: Arc<SessionRegistry>,
    cancel: CancellationToken,
    server: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Stop accepting connections and wait for in-flight HTTP requests.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.server.await {
            tracing::warn!(error = %e, "server task did not finish cleanly");
        }
        tracing::info!("codeshare server stopped");
    }
}

/// WebSocket upgrade handler for `/ws/{session_id}`.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let session_id = SessionId::from_raw(session_id);
    let failed_session = session_id.clone();
    ws.on_failed_upgrade(move |e| {
        tracing::warn!(session_id = %failed_session, error = %e, "websocket upgrade failed");
    })
    .on_upgrade(move |socket| async move {
        connection::handle_socket(socket, session_id, state.registry).await;
    })
}
