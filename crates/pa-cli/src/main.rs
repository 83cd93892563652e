//! PamirAI Assistant
//!
//! Headless terminal front-end: reads queries and slash commands from stdin,
//! prints the conversation to stdout and logs to stderr.

use std::io::BufRead;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pa_core::config::{self, TomlConfigStore};
use pa_core::traits::ConfigStore;
use pa_orchestrator::{SessionOrchestrator, StdioSessionFactory};
use pamir_assistant::app::App;
use pamir_assistant::output::print_info;

#[derive(Parser)]
#[command(name = "pamir-assistant")]
#[command(author, version, about = "PamirAI Assistant - chat with local assistant servers")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "PAMIR_ASSISTANT_CONFIG")]
    config: Option<PathBuf>,

    /// Server to connect to at startup (number or name)
    #[arg(short, long)]
    server: Option<String>,

    /// Log level (overrides the configuration; RUST_LOG overrides both)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Run in foreground with debug logging
    #[arg(short, long)]
    foreground: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(config::default_config_path);
    let store = TomlConfigStore::open(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    let log_level = if cli.foreground {
        "debug".to_string()
    } else {
        cli.log_level
            .unwrap_or_else(|| store.snapshot().logging.level)
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or(log_level),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();

    tracing::info!("PamirAI Assistant starting (config: {:?})", config_path);

    let orchestrator = SessionOrchestrator::builder(store, StdioSessionFactory).build();
    let quit = CancellationToken::new();

    // Setup signal handlers
    let signal_quit = quit.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }

        signal_quit.cancel();
    });

    print_info("Type /help for commands");
    App::new(orchestrator, quit)
        .run(spawn_stdin_reader(), cli.server, true)
        .await;

    Ok(())
}

/// Read stdin lines on a dedicated thread.
///
/// Blocking stdin reads would otherwise hold up runtime shutdown.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(32);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}
