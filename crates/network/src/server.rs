//! HTTP/WebSocket server wiring.

use crate::config::{ServerConfig, MAX_MESSAGE_BYTES};
use crate::error::{NetworkError, NetworkResult};
use crate::gateway::handle_socket;
use crate::registry::SessionRegistry;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::HeaderValue;
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use boardsync_engine::{CollabEngine, EngineConfig};
use boardsync_persistence::{CacheStore, DocumentStore};
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::info;

/// Shared request state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<CollabEngine>,
    pub registry: Arc<SessionRegistry>,
}

/// The assembled collaboration server.
pub struct CollabServer {
    config: ServerConfig,
    state: AppState,
}

impl CollabServer {
    /// Wires an engine and session registry over the given stores.
    pub fn new(
        config: ServerConfig,
        cache: Arc<dyn CacheStore>,
        docs: Arc<dyn DocumentStore>,
        engine_config: EngineConfig,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let engine = CollabEngine::new(cache, docs, registry.clone(), engine_config);
        Self {
            config,
            state: AppState { engine, registry },
        }
    }

    pub fn engine(&self) -> Arc<CollabEngine> {
        self.state.engine.clone()
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        self.state.registry.clone()
    }

    /// Builds the axum router: the WebSocket entry point, a health probe,
    /// and the CORS allowlist.
    pub fn router(&self) -> Router {
        let allowlist = self.config.allowlist();
        let cors = CorsLayer::new()
            .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
                origin
                    .to_str()
                    .map(|origin| allowlist.allows(origin))
                    .unwrap_or(false)
            }))
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/ws", get(ws_upgrade))
            .route("/health", get(health))
            .layer(cors)
            .with_state(self.state.clone())
    }

    /// Serves until `shutdown` resolves, then flushes every open room.
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send) -> NetworkResult<()> {
        let address = self.config.listen_address();
        let server = axum::Server::try_bind(&address)
            .map_err(|err| NetworkError::Bind {
                address: address.to_string(),
                source: std::io::Error::other(err),
            })?
            .serve(self.router().into_make_service());

        info!(%address, "collaboration server listening");
        server.with_graceful_shutdown(shutdown).await?;

        info!("shutting down, flushing open rooms");
        self.state.engine.shutdown().await;
        Ok(())
    }

    /// Binds an ephemeral listener and serves in a background task.
    /// Used by tests; returns the bound address.
    pub fn spawn_for_tests(self) -> NetworkResult<(SocketAddr, tokio::task::JoinHandle<()>)> {
        let address = SocketAddr::from(([127, 0, 0, 1], 0));
        let server = axum::Server::try_bind(&address)
            .map_err(|err| NetworkError::Bind {
                address: address.to_string(),
                source: std::io::Error::other(err),
            })?
            .serve(self.router().into_make_service());
        let bound = server.local_addr();
        let handle = tokio::spawn(async move {
            let _ = server.await;
        });
        Ok((bound, handle))
    }
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.max_message_size(MAX_MESSAGE_BYTES)
        .max_frame_size(MAX_MESSAGE_BYTES)
        .on_upgrade(move |socket| handle_socket(socket, state.engine, state.registry))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "openRooms": state.engine.open_rooms(),
        "connections": state.registry.connection_count(),
    }))
}
