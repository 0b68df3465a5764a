//! Relay server listener
//!
//! HTTP front end: accepts WebSocket upgrades and spawns a session per
//! connection.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;

use crate::error::Result;
use crate::registry::ConnectionId;
use crate::relay::RelayHub;
use crate::server::config::ServerConfig;
use crate::server::ws;
use crate::session::SessionContext;

/// Relay server
pub struct RelayServer {
    shared: Arc<Shared>,
}

struct Shared {
    config: ServerConfig,
    hub: Arc<RelayHub>,
    next_connection_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl RelayServer {
    /// Create a new server with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        Self::with_hub(config, Arc::new(RelayHub::new()))
    }

    /// Create a server around an existing hub
    pub fn with_hub(config: ServerConfig, hub: Arc<RelayHub>) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            shared: Arc::new(Shared {
                config,
                hub,
                next_connection_id: AtomicU64::new(1),
                connection_semaphore,
            }),
        }
    }

    /// Get a reference to the relay hub
    pub fn hub(&self) -> &Arc<RelayHub> {
        &self.shared.hub
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }

    /// Build the HTTP router
    pub fn router(&self) -> Router {
        Router::new()
            .route(&self.shared.config.ws_path, get(ws_upgrade))
            .route("/health", get(health))
            .with_state(Arc::clone(&self.shared))
    }

    /// Run the server
    ///
    /// This method blocks until the server fails.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.shared.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(
            addr = %addr,
            path = %self.shared.config.ws_path,
            "Relay server listening"
        );

        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown.await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

        Ok(())
    }
}

async fn ws_upgrade(
    State(shared): State<Arc<Shared>>,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    // Check connection limit
    let permit = match shared.connection_semaphore {
        Some(ref sem) => match Arc::clone(sem).try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(_) => {
                tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached")
                    .into_response();
            }
        },
        None => None,
    };

    let connection_id =
        ConnectionId(shared.next_connection_id.fetch_add(1, Ordering::Relaxed));

    tracing::debug!(
        connection_id = %connection_id,
        peer = %peer_addr,
        "New connection"
    );

    ws.on_upgrade(move |socket| async move {
        let _permit = permit;
        let stats = Arc::clone(shared.hub.stats());
        stats.session_opened();

        let ctx = SessionContext::new(connection_id, peer_addr)
            .identify_timeout(shared.config.identify_timeout);
        let outcome = ws::serve_socket(
            socket,
            ctx,
            Arc::clone(&shared.hub),
            shared.config.send_queue_capacity,
            shared.config.send_timeout,
        )
        .await;

        stats.session_closed();
        tracing::debug!(
            connection_id = %connection_id,
            outcome = ?outcome,
            "Connection closed"
        );
    })
}

async fn health(State(shared): State<Arc<Shared>>) -> impl IntoResponse {
    let producers = shared.hub.producer_names().await;
    let subscribers = shared.hub.subscriber_count().await;

    Json(json!({
        "status": "ok",
        "producers": producers,
        "subscribers": subscribers,
        "stats": shared.hub.stats().snapshot(),
    }))
}
