//! # Web Server
//!
//! | Path            | Description                                  |
//! |-----------------|----------------------------------------------|
//! | `/`             | WebSocket for one radio session              |
//! | `/status`       | HTML table of connected sessions             |
//! | `/status.json`  | The same sessions as JSON                    |
//! | `/version.json` | Crate version                                |
//! | anything else   | Static files from the resources directory    |

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing::info;

use crate::config::UiConfig;
use crate::error::{Error, Result};
use crate::gateway::Gateway;
use crate::ui::{handlers, websocket};

/// Shared state passed to all request handlers
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    /// Outbound frames buffered per socket
    pub client_queue: usize,
}

pub struct WebServer {
    config: UiConfig,
    state: AppState,
}

impl WebServer {
    pub fn new(config: UiConfig, gateway: Arc<Gateway>) -> Self {
        let state = AppState {
            gateway,
            client_queue: config.client_queue,
        };
        Self { config, state }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(websocket::index))
            .route("/status", get(handlers::status_page))
            .route("/status.json", get(handlers::status_json))
            .route("/version.json", get(handlers::version))
            .fallback_service(ServeDir::new(&self.config.resources))
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .config
            .bind_address
            .parse()
            .map_err(|_| Error::Config(format!("bad bind address {}", self.config.bind_address)))?;
        Ok(SocketAddr::new(ip, self.config.http_port))
    }

    /// Serve until `shutdown` resolves
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let addr = self.bind_addr()?;
        let listener = TcpListener::bind(addr).await?;
        info!(
            addr = %addr,
            resources = %self.config.resources.display(),
            "web server listening"
        );
        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;
        Ok(())
    }
}
