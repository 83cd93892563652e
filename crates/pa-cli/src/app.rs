//! Application shell
//!
//! Owns the orchestrator, the terminal view and the input monitor task, and
//! drives startup and the timeout-bounded shutdown sequence.

use std::io::Stdout;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use pa_core::time::{current_time_millis, elapsed_millis};
use pa_orchestrator::{SessionOrchestrator, ShutdownHandle};

use crate::commands::{self, Command, HELP};
use crate::output::{
    format_servers, format_status, print_error, print_info, print_success, print_warning,
    StatusSummary,
};
use crate::view::{self, TerminalView};

/// How long cleanup waits for the input monitor to stop
pub const INPUT_STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// Whether the input monitor keeps reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct App {
    orchestrator: SessionOrchestrator,
    quit: CancellationToken,
    input_cancel: CancellationToken,
    input_task: Option<JoinHandle<()>>,
    shutdown: Option<ShutdownHandle>,
    view: Option<Arc<TerminalView<Stdout>>>,
    started_at: u64,
}

impl App {
    /// `quit` is cancelled by a `/quit` command, end of input, or a signal
    pub fn new(orchestrator: SessionOrchestrator, quit: CancellationToken) -> Self {
        Self {
            orchestrator,
            quit,
            input_cancel: CancellationToken::new(),
            input_task: None,
            shutdown: None,
            view: None,
            started_at: current_time_millis(),
        }
    }

    pub fn orchestrator(&self) -> &SessionOrchestrator {
        &self.orchestrator
    }

    /// Attach the view, initialize the orchestrator and start reading input
    pub async fn initialize(&mut self, input: mpsc::Receiver<String>, render: bool) {
        let display_cfg = self.orchestrator.config().display;
        tracing::info!(
            "Display {}x{} (dark mode: {}, e-ink: {})",
            display_cfg.width,
            display_cfg.height,
            display_cfg.dark_mode,
            display_cfg.eink_enabled
        );

        if render {
            let view = Arc::new(TerminalView::new(std::io::stdout()));
            view::attach(Arc::clone(&view), &self.orchestrator);
            self.view = Some(view);
        }

        if !self.orchestrator.initialize().await {
            print_warning("No session available; fix the configuration and /apply");
        }
        self.start_input(input);
    }

    fn start_input(&mut self, mut input: mpsc::Receiver<String>) {
        let orchestrator = self.orchestrator.clone();
        let quit = self.quit.clone();
        let cancel = self.input_cancel.clone();

        self.input_task = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    line = input.recv() => {
                        let Some(line) = line else {
                            tracing::debug!("Input closed");
                            quit.cancel();
                            break;
                        };
                        if dispatch(&orchestrator, &line).await == Flow::Quit {
                            quit.cancel();
                            break;
                        }
                    }
                }
            }
            tracing::debug!("Input monitor stopped");
        }));
    }

    /// Connect to the server picked by `selector` (position or name)
    pub async fn connect(&self, selector: &str) -> bool {
        connect(&self.orchestrator, selector).await
    }

    /// Begin orchestrator shutdown
    pub fn handle_quit(&mut self) {
        if self.shutdown.is_none() {
            tracing::info!("Quit requested");
            self.shutdown = Some(self.orchestrator.shutdown());
        }
    }

    /// Wait for the shutdown cleanup and stop the input monitor
    pub async fn cleanup(&mut self) {
        if let Some(view) = &self.view {
            if let Err(e) = view.finish_response() {
                tracing::warn!("Failed to finish response line: {}", e);
            }
        }

        if let Some(handle) = self.shutdown.take() {
            let outcome = handle.wait().await;
            tracing::info!(
                "Session cleanup: {:?} (forced termination armed: {})",
                outcome.cleanup,
                outcome.forced_termination_armed
            );
        }

        self.input_cancel.cancel();
        if let Some(task) = self.input_task.take() {
            if tokio::time::timeout(INPUT_STOP_TIMEOUT, task).await.is_err() {
                tracing::warn!(
                    "Input monitor did not stop within {:?}",
                    INPUT_STOP_TIMEOUT
                );
            }
        }

        tracing::info!("Ran for {}s", elapsed_millis(self.started_at) / 1000);
    }

    /// Run until quit, then shut down
    pub async fn run(
        mut self,
        input: mpsc::Receiver<String>,
        server: Option<String>,
        render: bool,
    ) {
        self.initialize(input, render).await;
        if let Some(selector) = server {
            self.connect(&selector).await;
        }

        self.quit.cancelled().await;
        self.handle_quit();
        self.cleanup().await;
    }
}

async fn connect(orchestrator: &SessionOrchestrator, selector: &str) -> bool {
    let servers = orchestrator.available_servers();
    match commands::select_server(&servers, selector) {
        Some(server) => orchestrator.connect(server).await,
        None => {
            print_no_match(selector);
            false
        }
    }
}

fn print_no_match(selector: &str) {
    print_error(&format!("No server matches '{}' (see /servers)", selector));
}

/// Execute one input line
pub async fn dispatch(orchestrator: &SessionOrchestrator, line: &str) -> Flow {
    let command = match commands::parse(line) {
        Ok(command) => command,
        Err(e) => {
            print_error(&e.to_string());
            return Flow::Continue;
        }
    };

    match command {
        Command::Query(text) => {
            // Keep reading input so /stop can interrupt the response
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.submit_query(&text).await });
        }
        Command::Servers => {
            let servers = orchestrator.discover_servers();
            println!("{}", format_servers(&servers));
        }
        Command::Connect(selector) => {
            let servers = orchestrator.available_servers();
            match commands::select_server(&servers, &selector) {
                Some(server) => {
                    let orchestrator = orchestrator.clone();
                    let server = server.clone();
                    tokio::spawn(async move { orchestrator.connect(&server).await });
                }
                None => print_no_match(&selector),
            }
        }
        Command::Stop => drop(orchestrator.stop_response()),
        Command::Clear => orchestrator.clear_conversation(),
        Command::Apply => {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                if orchestrator.apply_configuration().await {
                    print_success("Configuration applied");
                }
            });
        }
        Command::ConfigGet { section, key } => {
            match orchestrator.config_value(&section, &key) {
                Some(value) => println!("{}.{} = {}", section, key, value),
                None => print_warning(&format!("{}.{} is not set", section, key)),
            }
        }
        Command::ConfigSet {
            section,
            key,
            value,
        } => match orchestrator.set_config_value(&section, &key, value) {
            Ok(()) => print_info(&format!(
                "{}.{} updated; /apply to use it, /save to keep it",
                section, key
            )),
            Err(e) => print_error(&e.to_string()),
        },
        Command::Save => match orchestrator.save_config() {
            Ok(()) => print_success(&format!(
                "Configuration saved to {}",
                orchestrator.config_path().display()
            )),
            Err(e) => print_error(&format!("Failed to save configuration: {}", e)),
        },
        Command::Status => {
            let status = orchestrator.status_text();
            let server = orchestrator.server_name();
            let config_path = orchestrator.config_path();
            print!(
                "{}",
                format_status(&StatusSummary {
                    status: &status,
                    connected: orchestrator.is_connected(),
                    server: server.as_deref(),
                    entries: orchestrator.conversation().len(),
                    config_path: &config_path,
                })
            );
        }
        Command::Help => println!("{}", HELP),
        Command::Quit => return Flow::Quit,
    }

    Flow::Continue
}
