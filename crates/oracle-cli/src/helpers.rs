//! Shared helper functions used across CLI subcommands.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use oracle_core::{Mediator, OracleConfig};

/// Initialize the tracing subscriber with the given default log level.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

/// Read an environment variable, treating empty values as unset.
pub fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Load variables from a `.env` file into the process environment.
/// Variables that are already set win.  `None` searches the working
/// directory and its parents.
///
/// Must run before argument parsing and tracing setup, which read `PORT`
/// and `RUST_LOG`.
pub fn load_env_file(path: Option<&Path>) -> Option<PathBuf> {
    match path {
        Some(path) => dotenvy::from_path(path).ok().map(|()| path.to_path_buf()),
        None => dotenvy::dotenv().ok(),
    }
}

/// Render an error with its whole cause chain on one line.
pub fn error_chain(err: &anyhow::Error) -> String {
    format!("{err:#}")
}

/// Load the config file and build the mediator.
pub fn load_mediator(config_path: &Path) -> Result<(OracleConfig, Mediator)> {
    let config = OracleConfig::from_env_and_file(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    let mediator = Mediator::from_config(&config).context("failed to build mediator")?;

    tracing::info!(
        api = ?config.upstream.api,
        endpoint = %config.upstream.endpoint,
        upstream_configured = config.upstream_configured(),
        cooldown_secs = config.oracle.cooldown_secs,
        timeout_secs = config.oracle.upstream_timeout_secs,
        "oracle configured"
    );

    Ok((config, mediator))
}
