//! Session backed by a server child process speaking JSON lines over stdio
//!
//! The server is launched from its definition file (`.py` through the
//! configured interpreter, `.sh` through `sh`, anything else directly) with
//! the language model settings passed as `PAMIR_LLM_*` environment
//! variables. It must announce itself with a `hello` line before the
//! connect times out.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio_util::codec::{FramedRead, FramedWrite};

use pa_core::config::AppConfig;
use pa_core::traits::{ResponseEvent, ResponseHandler, RpcSession, SessionFactory};
use pa_core::SessionError;
use pa_protocol::{ClientMessage, JsonLineCodec, ServerMessage};

/// Prefix of the environment variables carrying the LLM settings
pub const LLM_ENV_PREFIX: &str = "PAMIR_LLM_";

/// How long an exiting server may take before it is killed
const EXIT_GRACE: Duration = Duration::from_secs(1);

type Reader = FramedRead<ChildStdout, JsonLineCodec<ServerMessage>>;
type Writer = FramedWrite<ChildStdin, JsonLineCodec<ServerMessage>>;

/// [`RpcSession`] talking to a server child process
pub struct StdioSession {
    interpreter: String,
    env: Vec<(String, String)>,
    streaming: bool,
    handshake_timeout: Duration,
    child: tokio::sync::Mutex<Option<Child>>,
    writer: tokio::sync::Mutex<Option<Writer>>,
    /// Held for the whole of a query
    reader: tokio::sync::Mutex<Option<Reader>>,
    server_name: parking_lot::Mutex<Option<String>>,
}

impl StdioSession {
    /// Build an unconnected session from a configuration snapshot
    pub fn from_config(config: &AppConfig) -> Result<Self, SessionError> {
        let interpreter = config.mcp.python_interpreter.trim();
        if interpreter.is_empty() {
            return Err(SessionError::Construction(
                "mcp.python_interpreter is empty".to_string(),
            ));
        }

        Ok(Self {
            interpreter: interpreter.to_string(),
            env: llm_env(config),
            streaming: config.llm.streaming,
            handshake_timeout: config.orchestrator.connect_timeout,
            child: tokio::sync::Mutex::new(None),
            writer: tokio::sync::Mutex::new(None),
            reader: tokio::sync::Mutex::new(None),
            server_name: parking_lot::Mutex::new(None),
        })
    }

    fn command_for(&self, server_path: &Path) -> Command {
        let mut command = match server_path.extension().and_then(|ext| ext.to_str()) {
            Some("py") => {
                let mut command = Command::new(&self.interpreter);
                command.arg(server_path);
                command
            }
            Some("sh") => {
                let mut command = Command::new("sh");
                command.arg(server_path);
                command
            }
            _ => Command::new(server_path),
        };

        if let Some(dir) = server_path.parent() {
            command.current_dir(dir);
        }
        command
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    async fn send(&self, message: ClientMessage) -> Result<(), SessionError> {
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or(SessionError::NotConnected)?;
        writer.send(message).await?;
        Ok(())
    }
}

#[async_trait]
impl RpcSession for StdioSession {
    async fn connect(&self, server_path: &Path) -> Result<(), SessionError> {
        // One server per session
        self.cleanup().await?;

        tracing::debug!("Launching server {:?}", server_path);
        let mut child = self
            .command_for(server_path)
            .spawn()
            .map_err(|e| SessionError::SpawnFailed {
                path: server_path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SessionError::Handshake("server stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SessionError::Handshake("server stdout unavailable".to_string()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(target: "pa_orchestrator::server", "{}", line);
                }
            });
        }

        let mut reader = FramedRead::new(stdout, JsonLineCodec::new());
        let hello = tokio::time::timeout(self.handshake_timeout, reader.next())
            .await
            .map_err(|_| {
                SessionError::Handshake(format!(
                    "no hello within {:?}",
                    self.handshake_timeout
                ))
            })?;

        let name = match hello {
            Some(Ok(ServerMessage::Hello { name, description })) => {
                tracing::info!(
                    "Server {} ready ({})",
                    name,
                    description.as_deref().unwrap_or("no description")
                );
                name
            }
            Some(Ok(other)) => {
                return Err(SessionError::Handshake(format!(
                    "expected hello, got {:?}",
                    other
                )))
            }
            Some(Err(e)) => return Err(e.into()),
            None => {
                return Err(SessionError::Handshake(
                    "server exited before announcing itself".to_string(),
                ))
            }
        };

        *self.server_name.lock() = Some(name);
        *self.reader.lock().await = Some(reader);
        *self.writer.lock().await = Some(FramedWrite::new(stdin, JsonLineCodec::new()));
        *self.child.lock().await = Some(child);
        Ok(())
    }

    async fn process_query(
        &self,
        query: &str,
        on_event: ResponseHandler,
    ) -> Result<(), SessionError> {
        let mut reader = self.reader.lock().await;
        let reader = reader.as_mut().ok_or(SessionError::NotConnected)?;

        self.send(ClientMessage::query(query, self.streaming)).await?;

        // Chunks are folded into the final text when streaming is off
        let mut collected = String::new();
        loop {
            match reader.next().await {
                Some(Ok(ServerMessage::Chunk { text })) => {
                    if self.streaming {
                        on_event(ResponseEvent::Chunk(text));
                    } else {
                        collected.push_str(&text);
                    }
                }
                Some(Ok(ServerMessage::Done { text })) => {
                    on_event(ResponseEvent::Complete(text.unwrap_or(collected)));
                    return Ok(());
                }
                Some(Ok(ServerMessage::Error { message })) => {
                    return Err(SessionError::Server(message))
                }
                Some(Ok(ServerMessage::Stopped)) => tracing::debug!("Server acknowledged stop"),
                Some(Ok(ServerMessage::Hello { .. })) => tracing::debug!("Ignoring repeated hello"),
                Some(Err(e)) => return Err(e.into()),
                None => {
                    return Err(SessionError::ConnectionLost(
                        "server closed its output".to_string(),
                    ))
                }
            }
        }
    }

    async fn stop_response(&self) -> Result<bool, SessionError> {
        match self.send(ClientMessage::Stop).await {
            Ok(()) => Ok(true),
            Err(SessionError::NotConnected) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn cleanup(&self) -> Result<(), SessionError> {
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer.send(ClientMessage::Shutdown).await {
                tracing::debug!("Failed to send shutdown to server: {}", e);
            }
        }
        // An in-flight query keeps the reader until the server exits
        if let Ok(mut reader) = self.reader.try_lock() {
            reader.take();
        }
        self.server_name.lock().take();

        let child = self.child.lock().await.take();
        let Some(mut child) = child else {
            return Ok(());
        };

        match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
            Ok(Ok(status)) => tracing::debug!("Server exited with {}", status),
            Ok(Err(e)) => tracing::warn!("Failed to wait for server: {}", e),
            Err(_) => {
                tracing::warn!("Server did not exit within {:?}, killing it", EXIT_GRACE);
                child.kill().await?;
            }
        }
        Ok(())
    }

    fn server_name(&self) -> Option<String> {
        self.server_name.lock().clone()
    }

    fn streaming_enabled(&self) -> bool {
        self.streaming
    }
}

/// Builds [`StdioSession`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct StdioSessionFactory;

impl SessionFactory for StdioSessionFactory {
    fn create(&self, config: &AppConfig) -> Result<Arc<dyn RpcSession>, SessionError> {
        Ok(Arc::new(StdioSession::from_config(config)?))
    }
}

fn llm_env(config: &AppConfig) -> Vec<(String, String)> {
    let llm = &config.llm;
    let mut env = vec![
        ("PROVIDER", llm.provider.clone()),
        ("MODEL", llm.model.clone()),
        ("SERVER_URL", llm.server_url.clone()),
        ("TEMPERATURE", llm.temperature.to_string()),
        ("MAX_TOKENS", llm.max_tokens.to_string()),
        ("STREAMING", llm.streaming.to_string()),
    ];
    if !llm.api_key.is_empty() {
        env.push(("API_KEY", llm.api_key.clone()));
    }

    env.into_iter()
        .map(|(key, value)| (format!("{}{}", LLM_ENV_PREFIX, key), value))
        .collect()
}
