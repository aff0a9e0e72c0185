//! CLI argument definitions for the oracle bot.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use oracle_core::config::DEFAULT_CONFIG_PATH;

/// Oracle -- a Telegram bot that answers questions, mystically.
#[derive(Parser)]
#[command(
    name = "oracle",
    version,
    about = "Oracle -- Telegram bot backed by a hosted language model",
    long_about = "Answers user questions through a hosted text-generation endpoint, \
                  rate-limited per user, with canned answers whenever the endpoint \
                  is slow, failing, or not configured."
)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the Telegram bot gateway (and the liveness web server).
    Bot {
        /// Telegram long-polling timeout in seconds.
        #[arg(long, default_value_t = 30)]
        poll_timeout: u64,

        /// Address to bind the liveness server to.
        #[arg(long, default_value = "0.0.0.0")]
        bind: String,

        /// Port for the liveness server.
        #[arg(long, short, env = "PORT", default_value_t = 8000)]
        port: u16,

        /// Do not start the liveness server.
        #[arg(long)]
        no_web: bool,
    },

    /// Start only the HTTP server (liveness, upstream probe, ask API).
    Serve {
        /// Address to bind the HTTP server to.
        #[arg(long, default_value = "0.0.0.0")]
        bind: String,

        /// Port to listen on.
        #[arg(long, short, env = "PORT", default_value_t = 8000)]
        port: u16,
    },

    /// Ask the oracle one question from the terminal.
    Ask {
        /// The question to ask.
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,

        /// User id to charge the cooldown to.
        #[arg(long, default_value = "cli")]
        user: String,
    },
}
