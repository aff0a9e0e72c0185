//! Shared application state for the web server.

use std::time::Instant;

use oracle_core::Mediator;

/// Shared state accessible from every Axum handler.
#[derive(Clone)]
pub struct AppState {
    /// The mediator shared with the Telegram gateway, if one is running.
    pub mediator: Mediator,

    /// When the server was constructed, for uptime reporting.
    pub started_at: Instant,
}

impl AppState {
    pub fn new(mediator: Mediator) -> Self {
        Self {
            mediator,
            started_at: Instant::now(),
        }
    }
}
