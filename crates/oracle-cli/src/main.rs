//! CLI entry point for the oracle bot.
//!
//! This binary provides the `oracle` command with subcommands for running
//! the Telegram gateway, serving the HTTP endpoints on their own, and asking
//! a single question from the terminal.

mod bot;
mod cli;
mod helpers;
mod messages;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, info};

use oracle_core::AnswerSource;
use oracle_web::{WebConfig, WebServer};

use crate::cli::{Cli, Commands};
use crate::helpers::{init_tracing, load_env_file, load_mediator};
use crate::messages::Messages;

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let env_file = load_env_file(None);
    let cli = Cli::parse();

    let default_level = match cli.command {
        Commands::Ask { .. } => "warn",
        _ => "info",
    };
    init_tracing(default_level);
    if let Some(path) = env_file {
        debug!(path = %path.display(), "loaded .env");
    }

    match cli.command {
        Commands::Bot {
            poll_timeout,
            bind,
            port,
            no_web,
        } => {
            let web = (!no_web).then_some(WebConfig {
                bind_addr: bind,
                port,
            });
            bot::cmd_bot(&cli.config, poll_timeout, web).await
        }
        Commands::Serve { bind, port } => cmd_serve(&cli.config, bind, port).await,
        Commands::Ask { question, user } => {
            cmd_ask(&cli.config, &question.join(" "), &user).await
        }
    }
}

// ---------------------------------------------------------------------------
// Subcommand: serve
// ---------------------------------------------------------------------------

async fn cmd_serve(config_path: &std::path::Path, bind: String, port: u16) -> Result<()> {
    let (_config, mediator) = load_mediator(config_path)?;

    let server = WebServer::new(
        WebConfig {
            bind_addr: bind,
            port,
        },
        mediator,
    );

    println!();
    println!("  Oracle HTTP server v{}", env!("CARGO_PKG_VERSION"));
    println!("  Listening on http://{}", server.addr());
    println!();

    tokio::select! {
        result = server.start() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: ask
// ---------------------------------------------------------------------------

async fn cmd_ask(config_path: &std::path::Path, question: &str, user: &str) -> Result<()> {
    let (_config, mediator) = load_mediator(config_path)?;
    let msgs = Messages::load(config_path);

    let answer = mediator.answer(user, question, chrono::Utc::now()).await;
    match answer.remaining_seconds {
        Some(remaining) if answer.blocked => println!("{}", msgs.cooldown(remaining)),
        _ => {
            println!("{}", answer.text);
            if answer.source == AnswerSource::Fallback {
                eprintln!("(upstream unavailable, answered from catalog)");
            }
        }
    }

    Ok(())
}
