//! Session orchestrator
//!
//! The [`SessionOrchestrator`] is the single point of coordination between
//! the UI surface and the RPC session. It owns the conversation log, the
//! status line, the connected/ready flags and at most one session handle.
//!
//! # Consistency Model
//!
//! All state lives behind one mutex that is never held across an `.await`.
//! Every mutation happens inside [`Inner::update`], which collects the
//! resulting [`OrchestratorEvent`]s and dispatches them once the lock has
//! been released. Suspension points are the session calls and explicit
//! settle delays; between them operations may interleave, which is what the
//! per-query [`StopFlag`] and the session generation counter guard against:
//!
//! - Stop flags are set under the state lock, and response handlers check
//!   them under the same lock, so no chunk can land after a stop request.
//!   A stop reaches every query still in flight, not only the newest one.
//! - Session-replacing operations bump the generation; work that resumes on
//!   a stale generation discards its result instead of touching state.
//! - Once shutdown has begun, a configuration change still in progress
//!   abandons itself at its next step and never installs a session.
//!
//! # Failure Policy
//!
//! Operations never return errors to the UI. Each failure becomes an
//! [`OrchestratorError`], rendered as an Error status plus an error entry in
//! the conversation log. Timeouts degrade to "proceed anyway" (teardown) or
//! "retry with backoff" (reconnection).

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use pa_core::config::AppConfig;
use pa_core::traits::{ConfigStore, ResponseEvent, ResponseHandler, RpcSession, SessionFactory};
use pa_core::{ConfigError, OrchestratorError, ServerDescriptor};

use crate::backoff::{Attempt, ReconnectSchedule};
use crate::conversation::{ConversationLog, LogEntry, Role};
use crate::deadline::Deadline;
use crate::discovery;
use crate::observer::{Observers, OrchestratorEvent, SubscriptionId};
use crate::status::SessionStatus;
use crate::stop::StopFlag;

/// Log text appended as soon as a stop is requested
pub const STOPPING_MESSAGE: &str = "Stopping response...";

/// Callback invoked when shutdown runs out of time
pub type TerminateHook = Arc<dyn Fn() + Send + Sync>;

/// Builder for [`SessionOrchestrator`]
pub struct OrchestratorBuilder {
    store: Box<dyn ConfigStore>,
    factory: Box<dyn SessionFactory>,
    terminate: TerminateHook,
}

impl OrchestratorBuilder {
    /// Replace the forced-termination action.
    ///
    /// The default exits the process with status 0.
    pub fn on_forced_termination<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.terminate = Arc::new(hook);
        self
    }

    pub fn build(self) -> SessionOrchestrator {
        let config = self.store.snapshot();
        SessionOrchestrator {
            inner: Arc::new(Inner {
                factory: self.factory,
                store: Mutex::new(self.store),
                observers: Observers::new(),
                terminate: self.terminate,
                state: Mutex::new(State::new(config)),
            }),
        }
    }
}

/// How the shutdown cleanup ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// The session released its resources in time
    Completed,
    /// The session reported an error while cleaning up
    Failed(String),
    /// Cleanup exceeded its budget and was abandoned
    TimedOut,
    /// There was nothing to clean up (no session, or a repeated shutdown)
    Skipped,
}

impl CleanupOutcome {
    /// Whether nothing is left behind
    pub fn is_clean(&self) -> bool {
        matches!(self, CleanupOutcome::Completed | CleanupOutcome::Skipped)
    }
}

/// Result of waiting on a [`ShutdownHandle`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownOutcome {
    pub cleanup: CleanupOutcome,
    /// Whether the forced termination is still armed (or already fired)
    pub forced_termination_armed: bool,
}

/// Tracks the asynchronous part of a shutdown
pub struct ShutdownHandle {
    cleanup: Option<JoinHandle<CleanupOutcome>>,
    deadline: Option<Deadline>,
}

impl ShutdownHandle {
    fn finished() -> Self {
        Self {
            cleanup: None,
            deadline: None,
        }
    }

    /// The forced-termination deadline, if this call scheduled one
    pub fn deadline(&self) -> Option<&Deadline> {
        self.deadline.as_ref()
    }

    /// Wait for the cleanup to end.
    ///
    /// A clean cleanup cancels the forced termination; a failed or timed-out
    /// one leaves it armed as the wall-clock fallback.
    pub async fn wait(mut self) -> ShutdownOutcome {
        let cleanup = match self.cleanup.take() {
            Some(handle) => handle
                .await
                .unwrap_or_else(|e| CleanupOutcome::Failed(e.to_string())),
            None => CleanupOutcome::Skipped,
        };

        let forced_termination_armed = match &self.deadline {
            Some(deadline) if cleanup.is_clean() => !deadline.cancel(),
            Some(_) => true,
            None => false,
        };

        ShutdownOutcome {
            cleanup,
            forced_termination_armed,
        }
    }
}

/// Coordinates the UI surface and the assistant server session.
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct SessionOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    factory: Box<dyn SessionFactory>,
    store: Mutex<Box<dyn ConfigStore>>,
    observers: Observers,
    terminate: TerminateHook,
    state: Mutex<State>,
}

struct State {
    status: SessionStatus,
    log: ConversationLog,
    connected: bool,
    ready: bool,
    shutting_down: bool,
    session: Option<Arc<dyn RpcSession>>,
    /// Bumped whenever the session handle is replaced or dropped
    generation: u64,
    server_name: Option<String>,
    /// Last server connected to; target of reconnects
    current_server: Option<ServerDescriptor>,
    servers: Vec<ServerDescriptor>,
    /// Query cycles that have not finished yet
    active: Vec<Arc<QueryContext>>,
    /// Configuration snapshot, refreshed only on reload
    config: AppConfig,
    pending: Vec<OrchestratorEvent>,
}

impl State {
    fn new(config: AppConfig) -> Self {
        Self {
            status: SessionStatus::Disconnected,
            log: ConversationLog::new(),
            connected: false,
            ready: false,
            shutting_down: false,
            session: None,
            generation: 0,
            server_name: None,
            current_server: None,
            servers: Vec::new(),
            active: Vec::new(),
            config,
            pending: Vec::new(),
        }
    }

    fn set_status(&mut self, status: SessionStatus) {
        tracing::debug!("Status: {}", status);
        self.pending
            .push(OrchestratorEvent::StatusChanged(status.to_string()));
        self.status = status;
    }

    fn push_log(&mut self, role: Role, text: impl Into<String>) -> u64 {
        let id = self.log.push(role, text);
        self.conversation_changed();
        id
    }

    fn conversation_changed(&mut self) {
        if self.pending.last() != Some(&OrchestratorEvent::ConversationChanged) {
            self.pending.push(OrchestratorEvent::ConversationChanged);
        }
    }

    fn set_connected(&mut self, connected: bool) {
        if self.connected != connected {
            self.connected = connected;
            self.pending
                .push(OrchestratorEvent::ConnectedChanged(connected));
        }
    }

    fn set_ready(&mut self, ready: bool) {
        if self.ready != ready {
            self.ready = ready;
            self.pending.push(OrchestratorEvent::ReadyChanged(ready));
        }
    }

    /// Drop the session handle; returns it so the caller can tear it down
    fn release_session(&mut self) -> Option<Arc<dyn RpcSession>> {
        self.generation += 1;
        self.set_connected(false);
        self.server_name = None;
        self.session.take()
    }

    fn install_session(&mut self, session: Arc<dyn RpcSession>) -> u64 {
        self.generation += 1;
        self.session = Some(session);
        self.generation
    }

    fn record_failure(&mut self, error: &OrchestratorError) {
        self.set_status(SessionStatus::error(error));
        self.push_log(Role::Error, error.to_string());
    }

    /// Stop every query in flight; returns their streaming placeholders
    fn stop_active(&mut self) -> Vec<u64> {
        self.active
            .drain(..)
            .filter_map(|ctx| {
                ctx.stop.set();
                ctx.placeholder
            })
            .collect()
    }

    fn finish_query(&mut self, ctx: &Arc<QueryContext>) {
        self.active.retain(|active| !Arc::ptr_eq(active, ctx));
    }
}

/// Per-query context shared with the response handler
struct QueryContext {
    stop: StopFlag,
    streaming: bool,
    placeholder: Option<u64>,
}

impl Inner {
    /// Mutate state under the lock, then notify observers
    fn update<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let (result, events) = {
            let mut state = self.state.lock();
            let result = f(&mut state);
            (result, std::mem::take(&mut state.pending))
        };
        self.observers.emit_all(&events);
        result
    }

    fn fail(&self, error: OrchestratorError) {
        tracing::error!("{}", error);
        self.update(|state| state.record_failure(&error));
    }

    fn note(&self, text: impl Into<String>) {
        let text = text.into();
        self.update(|state| state.push_log(Role::System, text));
    }

    fn config(&self) -> AppConfig {
        self.state.lock().config.clone()
    }

    /// Apply a response event of a query cycle
    fn handle_response(&self, ctx: &QueryContext, event: ResponseEvent) {
        self.update(|state| {
            if ctx.stop.is_set() {
                tracing::trace!("Dropping response data that arrived after a stop");
                return;
            }

            match (event, ctx.placeholder) {
                (ResponseEvent::Chunk(chunk), Some(placeholder)) => {
                    if !state.log.append_to(placeholder, &chunk) {
                        tracing::debug!("Streaming placeholder is gone, dropping chunk");
                        return;
                    }
                    state.conversation_changed();
                    if state.status != SessionStatus::Streaming {
                        state.set_status(SessionStatus::Streaming);
                    }
                }
                (ResponseEvent::Complete(text), Some(placeholder)) => {
                    // Only used when nothing was streamed into the placeholder
                    let empty = state
                        .log
                        .get(placeholder)
                        .map_or(false, |entry| entry.text.is_empty());
                    if empty && !text.is_empty() {
                        state.log.set_text(placeholder, text);
                        state.conversation_changed();
                    }
                }
                (ResponseEvent::Complete(text), None) => {
                    state.push_log(Role::Assistant, text);
                }
                (ResponseEvent::Chunk(_), None) => {
                    tracing::debug!(
                        "Ignoring chunk from session in non-streaming mode (streaming={})",
                        ctx.streaming
                    );
                }
            }
        });
    }
}

impl SessionOrchestrator {
    /// Start building an orchestrator from a configuration store and a
    /// session factory
    pub fn builder<S, F>(store: S, factory: F) -> OrchestratorBuilder
    where
        S: ConfigStore + 'static,
        F: SessionFactory + 'static,
    {
        OrchestratorBuilder {
            store: Box::new(store),
            factory: Box::new(factory),
            terminate: Arc::new(|| std::process::exit(0)),
        }
    }

    // ------------------------------------------------------------------
    // Observable surface
    // ------------------------------------------------------------------

    /// Register a change callback
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&OrchestratorEvent) + Send + Sync + 'static,
    {
        self.inner.observers.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.observers.unsubscribe(id)
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.state.lock().status.clone()
    }

    /// Display text of the current status
    pub fn status_text(&self) -> String {
        self.inner.state.lock().status.to_string()
    }

    pub fn conversation(&self) -> Vec<LogEntry> {
        self.inner.state.lock().log.snapshot()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state.lock().connected
    }

    pub fn is_ready(&self) -> bool {
        self.inner.state.lock().ready
    }

    /// Whether a session object currently exists
    pub fn has_session(&self) -> bool {
        self.inner.state.lock().session.is_some()
    }

    /// Name reported by the connected server
    pub fn server_name(&self) -> Option<String> {
        self.inner.state.lock().server_name.clone()
    }

    /// Result of the last discovery
    pub fn available_servers(&self) -> Vec<ServerDescriptor> {
        self.inner.state.lock().servers.clone()
    }

    /// Configuration snapshot sessions are built from
    pub fn config(&self) -> AppConfig {
        self.inner.config()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Build the first session, discover servers and mark the orchestrator
    /// ready.
    ///
    /// Returns false if no session could be constructed; the orchestrator
    /// is still usable and a later [`apply_configuration`] may succeed.
    ///
    /// [`apply_configuration`]: SessionOrchestrator::apply_configuration
    pub async fn initialize(&self) -> bool {
        tracing::info!("Initializing session orchestrator");
        self.inner
            .update(|state| state.set_status(SessionStatus::Initializing));

        let config = self.inner.config();
        let created = match self.inner.factory.create(&config) {
            Ok(session) => {
                self.inner.update(|state| {
                    state.install_session(session);
                });
                true
            }
            Err(e) => {
                self.inner
                    .fail(OrchestratorError::SessionUnavailable(e.to_string()));
                false
            }
        };

        self.discover_servers();

        self.inner.update(|state| {
            state.set_ready(true);
            if created {
                state.set_status(SessionStatus::Disconnected);
            }
        });
        created
    }

    /// Connect the session to `server`.
    ///
    /// Refused while another connect is in progress; callers serialize
    /// connects through the status line.
    pub async fn connect(&self, server: &ServerDescriptor) -> bool {
        let prepared = self.inner.update(|state| {
            if state.shutting_down {
                tracing::warn!("Ignoring connect to {} during shutdown", server.name);
                return Err(None);
            }
            if matches!(state.status, SessionStatus::Connecting { .. }) {
                tracing::warn!("Connect to {} refused: already connecting", server.name);
                return Err(None);
            }
            let Some(session) = state.session.clone() else {
                return Err(Some(OrchestratorError::SessionUnavailable(
                    "no session has been created".to_string(),
                )));
            };
            state.stop_active();
            state.set_connected(false);
            state.set_status(SessionStatus::Connecting {
                server: server.name.clone(),
            });
            state.push_log(Role::System, format!("Connecting to {}...", server.name));
            Ok((session, state.generation, state.config.clone()))
        });

        let (session, generation, config) = match prepared {
            Ok(prepared) => prepared,
            Err(Some(error)) => {
                self.inner.fail(error);
                return false;
            }
            Err(None) => return false,
        };

        let path = match resolve_server_path(&server.path, &config.mcp.server_dir) {
            Ok(path) => path,
            Err(error) => {
                self.inner.fail(error);
                return false;
            }
        };

        tracing::info!("Connecting to server {} at {:?}", server.name, path);
        match session.connect(&path).await {
            Ok(()) => self.finish_connect(&session, generation, server, None),
            Err(e) => {
                self.inner
                    .fail(OrchestratorError::ConnectionFailed(e.to_string()));
                false
            }
        }
    }

    /// Record a successful connect if the session is still current
    fn finish_connect(
        &self,
        session: &Arc<dyn RpcSession>,
        generation: u64,
        server: &ServerDescriptor,
        note: Option<&str>,
    ) -> bool {
        let name = session
            .server_name()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| server.name.clone());

        self.inner.update(|state| {
            if state.generation != generation {
                tracing::warn!("Session replaced while connecting to {}", name);
                return false;
            }
            state.server_name = Some(name.clone());
            state.current_server = Some(server.clone());
            state.set_connected(true);
            state.set_status(SessionStatus::Connected {
                server: name.clone(),
            });
            let text = match note {
                Some(note) => format!("{}, connected to {}", note, name),
                None => format!("Connected to {}", name),
            };
            state.push_log(Role::System, text);
            tracing::info!("Connected to {}", name);
            true
        })
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Submit user input.
    ///
    /// Blank input is ignored without any visible effect.
    pub async fn submit_query(&self, text: &str) {
        let query = text.trim();
        if query.is_empty() {
            tracing::debug!("Ignoring empty query");
            return;
        }

        let accepted = self.inner.update(|state| {
            if !state.connected || state.session.is_none() {
                return false;
            }
            state.push_log(Role::User, query);
            true
        });

        if !accepted {
            self.inner.fail(OrchestratorError::NotConnected);
            return;
        }

        self.process_query(query).await;
    }

    /// Send `text` to the session and collect the response into the log
    pub async fn process_query(&self, text: &str) {
        let prepared = self.inner.update(|state| {
            let session = state.session.clone().filter(|_| state.connected)?;

            let streaming = session.streaming_enabled();
            let placeholder = streaming.then(|| state.push_log(Role::Assistant, ""));
            state.set_status(SessionStatus::Processing);

            let ctx = Arc::new(QueryContext {
                stop: StopFlag::new(),
                streaming,
                placeholder,
            });
            state.active.push(Arc::clone(&ctx));
            Some((session, ctx))
        });

        let Some((session, ctx)) = prepared else {
            self.inner.fail(OrchestratorError::NotConnected);
            return;
        };

        let handler: ResponseHandler = {
            let inner: Weak<Inner> = Arc::downgrade(&self.inner);
            let ctx = Arc::clone(&ctx);
            Arc::new(move |event| {
                if let Some(inner) = inner.upgrade() {
                    inner.handle_response(&ctx, event);
                }
            })
        };

        tracing::debug!(streaming = ctx.streaming, "Processing query");
        let result = session.process_query(text, handler).await;

        let failure = self.inner.update(|state| {
            state.finish_query(&ctx);

            let failure = if ctx.stop.is_set() {
                // The stop request already reported Idle and owns the log
                if let Err(e) = &result {
                    tracing::debug!("Query ended after stop: {}", e);
                }
                None
            } else {
                match &result {
                    Ok(()) => {
                        state.set_status(SessionStatus::Idle);
                        None
                    }
                    Err(e) => {
                        if let Some(placeholder) = ctx.placeholder {
                            if state.log.remove_if_empty(placeholder) {
                                state.conversation_changed();
                            }
                        }
                        let error = OrchestratorError::ProcessingError(e.to_string());
                        state.record_failure(&error);
                        Some(error)
                    }
                }
            };

            state.pending.push(OrchestratorEvent::ResponseFinished);
            failure
        });

        if let Some(error) = failure {
            tracing::error!("{}", error);
        }
    }

    /// Stop the in-flight response.
    ///
    /// The stop flag, the "stopping" entry and the Idle status are applied
    /// before this returns; the session's own stop call runs on a spawned
    /// task whose handle is returned.
    pub fn stop_response(&self) -> JoinHandle<()> {
        let session = self.inner.update(|state| {
            for placeholder in state.stop_active() {
                state.log.remove_if_empty(placeholder);
            }
            state.push_log(Role::System, STOPPING_MESSAGE);
            state.set_status(SessionStatus::Idle);
            state.session.clone()
        });
        tracing::info!("Stop requested");

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let outcome = match session {
                Some(session) => session.stop_response().await,
                None => Ok(false),
            };

            inner.update(|state| {
                match outcome {
                    Ok(true) => {
                        state.push_log(Role::System, "Response stopped");
                    }
                    Ok(false) => {
                        state.push_log(Role::System, "No response was running");
                    }
                    Err(e) => {
                        tracing::warn!("Session failed to stop response: {}", e);
                        state.push_log(Role::System, format!("Failed to stop response: {}", e));
                    }
                }
                state.pending.push(OrchestratorEvent::ResponseFinished);
            });
        })
    }

    /// Reset the conversation log
    pub fn clear_conversation(&self) {
        self.inner.update(|state| {
            state.log.clear();
            state.conversation_changed();
        });
    }

    // ------------------------------------------------------------------
    // Servers
    // ------------------------------------------------------------------

    /// Rescan the server directory and publish the result
    pub fn discover_servers(&self) -> Vec<ServerDescriptor> {
        let dir = self.inner.config().mcp.server_dir;
        let servers = discovery::discover_servers(&dir);
        self.inner.update(|state| {
            state.servers = servers.clone();
            state.pending.push(OrchestratorEvent::ServersChanged);
        });
        servers
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    pub fn config_value(&self, section: &str, key: &str) -> Option<toml::Value> {
        self.inner.store.lock().get(section, key)
    }

    /// Write a configuration value in memory.
    ///
    /// Keys outside the configuration schema are rejected and never stored.
    /// The running session is unaffected until
    /// [`apply_configuration`](SessionOrchestrator::apply_configuration).
    pub fn set_config_value(
        &self,
        section: &str,
        key: &str,
        value: toml::Value,
    ) -> Result<(), ConfigError> {
        let result = self.inner.store.lock().set(section, key, value);
        if let Err(e) = &result {
            tracing::warn!("Config write {}.{} rejected: {}", section, key, e);
        }
        result
    }

    /// Persist the configuration store
    pub fn save_config(&self) -> Result<(), ConfigError> {
        let result = self.inner.store.lock().save(None);
        if let Err(e) = &result {
            tracing::error!("Failed to save configuration: {}", e);
        }
        result
    }

    pub fn config_path(&self) -> PathBuf {
        self.inner.store.lock().path().to_path_buf()
    }

    /// Tear down the session, reload configuration, build a new session and
    /// reconnect to the previously selected server.
    ///
    /// The conversation survives the rebuild. Returns whether the new
    /// configuration was applied and, if a server was selected, reconnected.
    pub async fn apply_configuration(&self) -> bool {
        tracing::info!("Applying configuration");

        // 1. Snapshot, and silence any response of the old session
        let begun = self.inner.update(|state| {
            if state.shutting_down {
                return None;
            }
            let snapshot = state.log.snapshot();
            state.stop_active();
            state.set_status(SessionStatus::Initializing);
            state.push_log(Role::System, "Applying configuration...");
            Some((snapshot, state.session.clone(), state.config.clone()))
        });
        let Some((snapshot, old_session, old_config)) = begun else {
            tracing::warn!("Ignoring configuration change during shutdown");
            return false;
        };

        // 2. Bounded graceful cleanup
        if let Some(session) = &old_session {
            let budget = old_config.orchestrator.cleanup_timeout;
            match tokio::time::timeout(budget, session.cleanup()).await {
                Ok(Ok(())) => tracing::debug!("Previous session cleaned up"),
                Ok(Err(e)) => {
                    tracing::warn!("Previous session cleanup failed: {}", e);
                    self.inner
                        .note(format!("Warning: session cleanup failed: {}", e));
                }
                Err(_) => {
                    tracing::warn!(
                        "{} after {:?}, continuing",
                        OrchestratorError::CleanupTimeout,
                        budget
                    );
                    self.inner
                        .note("Warning: session cleanup timed out, continuing");
                }
            }
        }

        // 3. Drop the old handle regardless of the cleanup outcome
        let proceed = self.inner.update(|state| {
            if state.shutting_down {
                return false;
            }
            state.release_session();
            true
        });
        drop(old_session);
        if !proceed {
            return self.abandon_apply("during session cleanup");
        }

        // 4. Let in-flight teardown settle
        tokio::time::sleep(old_config.orchestrator.settle_delay).await;
        if self.inner.state.lock().shutting_down {
            return self.abandon_apply("while settling");
        }

        // 5. Reload
        let reloaded = {
            let mut store = self.inner.store.lock();
            store.reload().map(|()| store.snapshot())
        };
        let (config, reload_ok) = match reloaded {
            Ok(config) => (config, true),
            Err(e) => {
                self.inner
                    .fail(OrchestratorError::ConfigurationError(e.to_string()));
                (old_config, false)
            }
        };

        // 6. New session from the (re)loaded configuration
        let session = match self.inner.factory.create(&config) {
            Ok(session) => session,
            Err(e) => {
                self.inner.update(|state| {
                    state.config = config;
                    state.log.restore(snapshot);
                    state.conversation_changed();
                });
                self.inner
                    .fail(OrchestratorError::SessionUnavailable(e.to_string()));
                return false;
            }
        };

        // 7. Install the session and restore the conversation
        let installed = self.inner.update(|state| {
            if state.shutting_down {
                return None;
            }
            state.config = config.clone();
            let generation = state.install_session(Arc::clone(&session));
            state.log.restore(snapshot);
            state.conversation_changed();
            Some((generation, state.current_server.clone()))
        });
        let Some((generation, server)) = installed else {
            drop(session);
            return self.abandon_apply("before installing the new session");
        };

        // 8. Reconnect
        let Some(server) = server else {
            self.inner.update(|state| {
                if reload_ok {
                    state.set_status(SessionStatus::Disconnected);
                }
                state.push_log(Role::System, "Configuration applied");
            });
            return reload_ok;
        };

        let connected = self
            .reconnect(&session, generation, &server, &config)
            .await;

        // 9. Report
        match connected {
            Ok(true) => {
                let note = if reload_ok {
                    "Configuration applied"
                } else {
                    "Previous configuration kept"
                };
                self.finish_connect(&session, generation, &server, Some(note)) && reload_ok
            }
            Ok(false) => self.abandon_apply("while reconnecting"),
            Err(error) => {
                self.inner.fail(error);
                false
            }
        }
    }

    fn abandon_apply(&self, stage: &str) -> bool {
        tracing::info!(
            "Configuration change abandoned {}: session replaced or shut down",
            stage
        );
        false
    }

    /// Connect with bounded attempts, per-attempt timeouts and backoff.
    ///
    /// `Ok(false)` means the session stopped being current (replaced or
    /// shut down) before a connection was made.
    async fn reconnect(
        &self,
        session: &Arc<dyn RpcSession>,
        generation: u64,
        server: &ServerDescriptor,
        config: &AppConfig,
    ) -> Result<bool, OrchestratorError> {
        let path = resolve_server_path(&server.path, &config.mcp.server_dir)?;
        let settings = &config.orchestrator;
        let schedule = ReconnectSchedule::new(settings.connect_attempts, &settings.backoff);
        let attempts = schedule.total();
        let mut last_error = String::new();

        for Attempt { number: attempt, delay, .. } in schedule {
            if !delay.is_zero() {
                tracing::debug!("Retrying in {:?}", delay);
                tokio::time::sleep(delay).await;
            }

            let current = self.inner.update(|state| {
                if state.shutting_down || state.generation != generation {
                    return false;
                }
                state.set_status(SessionStatus::Connecting {
                    server: server.name.clone(),
                });
                state.push_log(
                    Role::System,
                    format!(
                        "Reconnecting to {} (attempt {}/{})...",
                        server.name, attempt, attempts
                    ),
                );
                true
            });
            if !current {
                return Ok(false);
            }

            match tokio::time::timeout(settings.connect_timeout, session.connect(&path)).await {
                Ok(Ok(())) => return Ok(true),
                Ok(Err(e)) => {
                    tracing::warn!("Reconnect attempt {}/{} failed: {}", attempt, attempts, e);
                    last_error = e.to_string();
                }
                Err(_) => {
                    tracing::warn!(
                        "Reconnect attempt {}/{} timed out after {:?}",
                        attempt,
                        attempts,
                        settings.connect_timeout
                    );
                    last_error = format!("timed out after {:?}", settings.connect_timeout);
                }
            }
        }

        Err(OrchestratorError::ConnectionFailed(format!(
            "could not reconnect to {} after {} attempts: {}",
            server.name, attempts, last_error
        )))
    }

    // ------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------

    /// Begin shutdown.
    ///
    /// Blocks new operations immediately, disconnects every observer,
    /// starts a bounded best-effort cleanup of the session and arms a
    /// forced termination that fires after the configured delay unless a
    /// successful cleanup cancels it through [`ShutdownHandle::wait`].
    /// Repeated calls return an already finished handle.
    pub fn shutdown(&self) -> ShutdownHandle {
        let begun = self.inner.update(|state| {
            if state.shutting_down {
                return None;
            }
            state.shutting_down = true;
            state.stop_active();
            state.set_status(SessionStatus::ShuttingDown);
            state.push_log(Role::System, "Shutting down...");
            let session = state.release_session();
            Some((session, state.config.orchestrator.clone()))
        });

        let Some((session, settings)) = begun else {
            tracing::debug!("Shutdown already in progress");
            return ShutdownHandle::finished();
        };
        tracing::info!("Shutting down session orchestrator");

        let budget = settings.shutdown_cleanup_timeout;
        let cleanup = tokio::spawn(async move {
            let Some(session) = session else {
                return CleanupOutcome::Skipped;
            };
            match tokio::time::timeout(budget, session.cleanup()).await {
                Ok(Ok(())) => {
                    tracing::info!("Session cleanup complete");
                    CleanupOutcome::Completed
                }
                Ok(Err(e)) => {
                    tracing::warn!("Session cleanup failed: {}", e);
                    CleanupOutcome::Failed(e.to_string())
                }
                Err(_) => {
                    tracing::warn!("Session cleanup timed out after {:?}", budget);
                    CleanupOutcome::TimedOut
                }
            }
        });

        let disconnected = self.inner.observers.clear();
        tracing::debug!("Disconnected {} observers", disconnected);

        let terminate = Arc::clone(&self.inner.terminate);
        let delay = settings.forced_exit_delay;
        let deadline = Deadline::schedule(delay, move || {
            tracing::warn!("Shutdown did not finish within {:?}, forcing termination", delay);
            terminate();
        });

        ShutdownHandle {
            cleanup: Some(cleanup),
            deadline: Some(deadline),
        }
    }
}

/// Absolute path of a server definition.
///
/// Relative paths are resolved against `server_dir`.
fn resolve_server_path(path: &Path, server_dir: &Path) -> Result<PathBuf, OrchestratorError> {
    let candidate = if path.is_absolute() {
        path.to_path_buf()
    } else {
        server_dir.join(path)
    };

    candidate.canonicalize().map_err(|e| {
        OrchestratorError::ConnectionFailed(format!(
            "server {} not found: {}",
            candidate.display(),
            e
        ))
    })
}
