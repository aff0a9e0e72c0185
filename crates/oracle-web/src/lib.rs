//! HTTP surface for the oracle bot.
//!
//! Runs alongside the Telegram gateway (or on its own) and exposes:
//!
//! - `GET /` and `GET /health` -- liveness for the hosting platform.
//! - `GET /ping-upstream` -- one probe call to the upstream provider.
//! - `POST /api/ask` -- the mediator over JSON, for clients other than Telegram.

pub mod api;
pub mod server;
pub mod state;

pub use server::WebServer;
pub use state::AppState;

/// Web server configuration.
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// The address to bind the HTTP server to.
    pub bind_addr: String,
    /// The port to listen on.
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".into(),
            port: 8000,
        }
    }
}

/// Errors raised while running the web server.
#[derive(Debug, thiserror::Error)]
pub enum WebError {
    /// The TCP listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The server stopped with an I/O error.
    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}
