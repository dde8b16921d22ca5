//! HTTP/WebSocket listener and process-level wiring.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use axum::{
    Router,
    extract::{
        State,
        ws::{WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    response::{Html, IntoResponse, Response},
    routing::get,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::ConfigError;
use crate::hub::Hub;
use crate::pages;
use crate::session::handle_socket;

static INSTANCE_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Held by the composition root for as long as the server runs. Only one
/// can exist per process at a time.
#[derive(Debug)]
pub struct InstanceLock {
    _private: (),
}

impl InstanceLock {
    pub fn acquire() -> Result<Self, ConfigError> {
        INSTANCE_ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self { _private: () })
            .map_err(|_| ConfigError::AlreadyInitialized)
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        INSTANCE_ACTIVE.store(false, Ordering::Release);
    }
}

/// `/` serves the homepage to plain GETs and upgrades WebSocket requests;
/// every other path is a 404.
pub fn router(hub: Arc<Hub>) -> Router {
    Router::new()
        .route("/", get(root))
        .fallback(pages::not_found_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(hub)
}

async fn root(
    State(hub): State<Arc<Hub>>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| handle_socket(socket, hub)),
        Err(_) => Html(pages::homepage().into_string()).into_response(),
    }
}

pub struct Server {
    listener: TcpListener,
    app: Router,
}

impl Server {
    /// Bind the listening socket. A port already in use is a startup error.
    pub async fn bind(addr: SocketAddr, hub: Arc<Hub>) -> Result<Self, ConfigError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ConfigError::Bind { addr, source })?;
        Ok(Self {
            listener,
            app: router(hub),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until `shutdown` completes.
    pub async fn serve(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        if let Ok(addr) = self.listener.local_addr() {
            info!("Listening on http://{}", addr);
        }
        axum::serve(self.listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await?;
        info!("Server stopped");
        Ok(())
    }
}
