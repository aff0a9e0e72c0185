//! Oracle error types.
//!
//! Library code surfaces failures through [`OracleError`].  Upstream failures
//! are normally absorbed by the mediator and never reach this type; they only
//! appear here when a caller explicitly asks for them (see
//! [`UpstreamResult::into_result`](crate::upstream::UpstreamResult::into_result)).

/// Unified error type for the oracle core.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    // -- User-facing ---------------------------------------------------------
    /// The user sent a message inside their cooldown window.
    #[error("cooldown active, retry in {remaining_seconds}s")]
    CooldownActive { remaining_seconds: u64 },

    // -- Upstream ------------------------------------------------------------
    /// The upstream provider could not produce an answer.  Internal only.
    #[error("upstream unavailable: {reason}")]
    UpstreamUnavailable { reason: String },

    // -- Configuration -------------------------------------------------------
    /// A required configuration value is absent.
    #[error("missing configuration value: {key}")]
    ConfigurationMissing { key: String },

    /// Configuration was present but invalid.
    #[error("config error: {reason}")]
    Config { reason: String },

    // -- Upstream crate errors -----------------------------------------------
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the oracle crates.
pub type Result<T> = std::result::Result<T, OracleError>;
