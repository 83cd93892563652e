//! Test doubles shared by the orchestrator integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use pa_core::config::{save_config, AppConfig, TomlConfigStore};
use pa_core::traits::{ResponseEvent, ResponseHandler, RpcSession, SessionFactory};
use pa_core::{ServerDescriptor, SessionError};
use pa_orchestrator::{LogEntry, SessionOrchestrator};

/// What the fake does when one of its async calls is made
#[derive(Debug, Clone)]
pub enum Behavior {
    Succeed,
    Fail(String),
    Hang,
}

impl Behavior {
    async fn run(self) -> Result<(), SessionError> {
        match self {
            Behavior::Succeed => Ok(()),
            Behavior::Fail(reason) => Err(SessionError::ConnectionLost(reason)),
            Behavior::Hang => std::future::pending().await,
        }
    }
}

/// Scripted step of an in-flight query
#[derive(Debug, Clone)]
pub enum Step {
    Chunk(String),
    /// Deliver the final text and finish the query
    Complete(String),
    /// Finish the query with a server error
    Fail(String),
}

/// Shared control panel for every session the fake factory creates
pub struct FakeControl {
    pub connect: Mutex<Behavior>,
    /// Consumed before falling back to `connect`
    pub connect_script: Mutex<VecDeque<Behavior>>,
    pub cleanup: Mutex<Behavior>,
    pub streaming: AtomicBool,
    pub fail_create: AtomicBool,
    pub server_name: Mutex<Option<String>>,
    pub created: AtomicUsize,
    pub live: AtomicUsize,
    pub connect_calls: AtomicUsize,
    pub cleanup_calls: AtomicUsize,
    pub stop_calls: AtomicUsize,
    pub query_started: Notify,
    steps_tx: mpsc::UnboundedSender<Step>,
    steps_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Step>>,
    last_handler: Mutex<Option<ResponseHandler>>,
    /// Handler of every query, in submission order
    handlers: Mutex<Vec<ResponseHandler>>,
}

impl FakeControl {
    pub fn new() -> Arc<Self> {
        let (steps_tx, steps_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            connect: Mutex::new(Behavior::Succeed),
            connect_script: Mutex::new(VecDeque::new()),
            cleanup: Mutex::new(Behavior::Succeed),
            streaming: AtomicBool::new(true),
            fail_create: AtomicBool::new(false),
            server_name: Mutex::new(None),
            created: AtomicUsize::new(0),
            live: AtomicUsize::new(0),
            connect_calls: AtomicUsize::new(0),
            cleanup_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            query_started: Notify::new(),
            steps_tx,
            steps_rx: tokio::sync::Mutex::new(steps_rx),
            last_handler: Mutex::new(None),
            handlers: Mutex::new(Vec::new()),
        })
    }

    /// Feed the next step to the in-flight query
    pub fn step(&self, step: Step) {
        self.steps_tx.send(step).expect("receiver lives in the control");
    }

    pub fn chunk(&self, text: &str) {
        self.step(Step::Chunk(text.to_string()));
    }

    pub fn complete(&self, text: &str) {
        self.step(Step::Complete(text.to_string()));
    }

    /// Invoke the handler of the last query directly, bypassing the script
    pub fn deliver_late(&self, event: ResponseEvent) {
        let handler = self.last_handler.lock().clone();
        if let Some(handler) = handler {
            handler(event);
        }
    }

    /// Invoke the handler of the `index`-th query (0-based)
    pub fn deliver_to(&self, index: usize, event: ResponseEvent) {
        let handler = self.handlers.lock().get(index).cloned();
        if let Some(handler) = handler {
            handler(event);
        }
    }

    /// Number of queries that reached the session
    pub fn queries_seen(&self) -> usize {
        self.handlers.lock().len()
    }

    pub fn live_sessions(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

pub struct FakeSession {
    control: Arc<FakeControl>,
    streaming: bool,
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        self.control.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RpcSession for FakeSession {
    async fn connect(&self, _server_path: &Path) -> Result<(), SessionError> {
        self.control.connect_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.control.connect_script.lock().pop_front();
        let behavior = scripted.unwrap_or_else(|| self.control.connect.lock().clone());
        behavior.run().await
    }

    async fn process_query(
        &self,
        _query: &str,
        on_event: ResponseHandler,
    ) -> Result<(), SessionError> {
        *self.control.last_handler.lock() = Some(Arc::clone(&on_event));
        self.control.handlers.lock().push(Arc::clone(&on_event));
        let mut steps = self.control.steps_rx.lock().await;
        self.control.query_started.notify_one();

        loop {
            match steps.recv().await {
                Some(Step::Chunk(text)) => on_event(ResponseEvent::Chunk(text)),
                Some(Step::Complete(text)) => {
                    on_event(ResponseEvent::Complete(text));
                    return Ok(());
                }
                Some(Step::Fail(message)) => return Err(SessionError::Server(message)),
                None => return Err(SessionError::ConnectionLost("script ended".into())),
            }
        }
    }

    async fn stop_response(&self) -> Result<bool, SessionError> {
        self.control.stop_calls.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn cleanup(&self) -> Result<(), SessionError> {
        self.control.cleanup_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.control.cleanup.lock().clone();
        behavior.run().await
    }

    fn server_name(&self) -> Option<String> {
        self.control.server_name.lock().clone()
    }

    fn streaming_enabled(&self) -> bool {
        self.streaming
    }
}

pub struct FakeFactory(pub Arc<FakeControl>);

impl SessionFactory for FakeFactory {
    fn create(&self, config: &AppConfig) -> Result<Arc<dyn RpcSession>, SessionError> {
        if self.0.fail_create.load(Ordering::SeqCst) {
            return Err(SessionError::Construction("factory disabled".into()));
        }
        self.0.created.fetch_add(1, Ordering::SeqCst);
        self.0.live.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeSession {
            control: Arc::clone(&self.0),
            streaming: config.llm.streaming && self.0.streaming.load(Ordering::SeqCst),
        }))
    }
}

/// An orchestrator wired to a fake session and a server directory on disk
pub struct Harness {
    pub orchestrator: SessionOrchestrator,
    pub control: Arc<FakeControl>,
    pub terminated: Arc<AtomicUsize>,
    pub dir: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config)
    }

    /// Build with a customized configuration written to disk
    pub fn with_config(customize: impl FnOnce(&mut AppConfig, &Path)) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let servers = dir.path().join("servers");
        std::fs::create_dir(&servers).expect("server dir");
        std::fs::write(
            servers.join("lights_server.py"),
            "SERVER_NAME = \"Lights\"\nSERVER_DESCRIPTION = \"Controls the lights\"\n",
        )
        .expect("server file");
        std::fs::write(servers.join("weather_server.py"), "print('sunny')\n")
            .expect("server file");

        let mut config = AppConfig::default();
        config.mcp.server_dir = servers;
        customize(&mut config, dir.path());

        let path = config_path(&dir);
        save_config(&path, &config).expect("save config");
        let store = TomlConfigStore::open(&path).expect("open config");

        let control = FakeControl::new();
        let terminated = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&terminated);
        let orchestrator = SessionOrchestrator::builder(store, FakeFactory(Arc::clone(&control)))
            .on_forced_termination(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build();

        Self {
            orchestrator,
            control,
            terminated,
            dir,
        }
    }

    pub fn config_path(&self) -> PathBuf {
        config_path(&self.dir)
    }

    pub fn server(&self, name: &str) -> ServerDescriptor {
        self.orchestrator
            .available_servers()
            .into_iter()
            .find(|s| s.name == name)
            .unwrap_or_else(|| panic!("server {} not discovered", name))
    }

    /// Initialize and connect to "Lights"
    pub async fn connected() -> Self {
        let harness = Self::new();
        assert!(harness.orchestrator.initialize().await);
        let lights = harness.server("Lights");
        assert!(harness.orchestrator.connect(&lights).await);
        harness
    }

    /// Submit `text` and answer it with `answer` in one piece
    pub async fn run_query(&self, text: &str, answer: &str) {
        let orchestrator = self.orchestrator.clone();
        let text = text.to_string();
        let query = tokio::spawn(async move { orchestrator.submit_query(&text).await });
        self.control.query_started.notified().await;
        self.control.complete(answer);
        query.await.expect("query task");
    }

    pub fn lines(&self) -> Vec<String> {
        render(&self.orchestrator.conversation())
    }

    pub fn last_line(&self) -> String {
        self.lines().pop().unwrap_or_default()
    }

    pub fn terminations(&self) -> usize {
        self.terminated.load(Ordering::SeqCst)
    }
}

/// Short timeouts so paused-clock tests stay readable
pub fn test_config(config: &mut AppConfig, _dir: &Path) {
    let settings = &mut config.orchestrator;
    settings.cleanup_timeout = Duration::from_secs(3);
    settings.settle_delay = Duration::from_millis(500);
    settings.connect_timeout = Duration::from_secs(10);
    settings.connect_attempts = 3;
    settings.shutdown_cleanup_timeout = Duration::from_secs(2);
    settings.forced_exit_delay = Duration::from_secs(3);
    settings.backoff.jitter = 0.0;
}

fn config_path(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().join("config.toml")
}

pub fn render(entries: &[LogEntry]) -> Vec<String> {
    entries.iter().map(|e| e.to_string()).collect()
}

/// Poll `condition` while letting spawned tasks run
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}
