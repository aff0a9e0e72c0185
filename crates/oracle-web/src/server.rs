//! Web server setup and startup.
//!
//! [`WebServer`] composes the Axum router and starts the HTTP listener.

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;

use oracle_core::Mediator;

use crate::state::AppState;
use crate::{WebConfig, WebError, api};

/// The oracle web server.
pub struct WebServer {
    config: WebConfig,
    state: Arc<AppState>,
}

impl WebServer {
    /// Create a new web server around a shared mediator.
    pub fn new(config: WebConfig, mediator: Mediator) -> Self {
        let state = Arc::new(AppState::new(mediator));
        Self { config, state }
    }

    /// Return the `host:port` string this server will bind to.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.config.bind_addr, self.config.port)
    }

    /// Build the Axum router with all routes registered.
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(HeaderValue::from_static("*"))
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(tower_http::cors::Any);

        Router::new()
            // Liveness.
            .route("/", get(api::root))
            .route("/health", get(api::health))
            // Upstream diagnostics.
            .route("/ping-upstream", get(api::ping_upstream))
            // Mediator over JSON.
            .route("/api/ask", post(api::ask))
            .layer(cors)
            .with_state(Arc::clone(&self.state))
    }

    /// Start the server and block until it is shut down.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP listener cannot be bound.
    pub async fn start(self) -> Result<(), WebError> {
        let addr = self.addr();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| WebError::Bind {
                addr: addr.clone(),
                source,
            })?;

        self.serve(listener).await
    }

    /// Serve on an already-bound listener.
    pub async fn serve(self, listener: tokio::net::TcpListener) -> Result<(), WebError> {
        let router = self.router();
        if let Ok(local) = listener.local_addr() {
            tracing::info!(addr = %local, "starting web server");
        }
        axum::serve(listener, router).await?;
        Ok(())
    }
}
