//! Application configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::duration_millis;

/// Full configuration of the assistant.
///
/// Sessions are constructed from a snapshot of this struct; the snapshot is
/// only refreshed when the configuration store is reloaded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Language model backend used by the server session
    pub llm: LlmConfig,
    /// Assistant server discovery and launching
    pub mcp: McpConfig,
    /// Timeouts and retry policy of the session orchestrator
    pub orchestrator: OrchestratorConfig,
    /// Display settings
    pub display: DisplayConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

/// Language model settings handed to the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub server_url: String,
    /// Empty when the provider needs no key
    pub api_key: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Deliver responses as incremental chunks
    pub streaming: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "llama-cpp".to_string(),
            model: "qwen2.5-3b-instruct".to_string(),
            server_url: "http://127.0.0.1:8000".to_string(),
            api_key: String::new(),
            temperature: 0.7,
            max_tokens: 4096,
            streaming: true,
        }
    }
}

/// Server discovery and launch settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct McpConfig {
    /// Directory scanned for `*_server` definitions
    pub server_dir: PathBuf,
    /// Interpreter used for `.py` server definitions
    pub python_interpreter: String,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            server_dir: PathBuf::from("mcp_server"),
            python_interpreter: "python3".to_string(),
        }
    }
}

/// Timeouts and retry policy for the session orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Budget for graceful session cleanup while applying configuration
    #[serde(with = "duration_millis")]
    pub cleanup_timeout: Duration,

    /// Pause after teardown so in-flight async work can settle
    #[serde(with = "duration_millis")]
    pub settle_delay: Duration,

    /// Budget for a single connect attempt during reconnection
    #[serde(with = "duration_millis")]
    pub connect_timeout: Duration,

    /// Number of connect attempts after a configuration change
    pub connect_attempts: u32,

    /// Budget for best-effort cleanup during shutdown
    #[serde(with = "duration_millis")]
    pub shutdown_cleanup_timeout: Duration,

    /// Delay after which shutdown forces termination
    #[serde(with = "duration_millis")]
    pub forced_exit_delay: Duration,

    /// Backoff between connect attempts
    pub backoff: BackoffConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cleanup_timeout: Duration::from_secs(3),
            settle_delay: Duration::from_millis(500),
            connect_timeout: Duration::from_secs(10),
            connect_attempts: 3,
            shutdown_cleanup_timeout: Duration::from_secs(2),
            forced_exit_delay: Duration::from_secs(3),
            backoff: BackoffConfig::default(),
        }
    }
}

/// Exponential backoff configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Initial delay
    #[serde(with = "duration_millis")]
    pub initial: Duration,

    /// Maximum delay
    #[serde(with = "duration_millis")]
    pub max: Duration,

    /// Multiplier for each retry
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

/// Display settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    pub dark_mode: bool,
    pub eink_enabled: bool,
    /// Frame capture interval in milliseconds
    pub eink_refresh_interval: u64,
    pub eink_buffer_size: u32,
    pub eink_dithering_enabled: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 240,
            height: 416,
            dark_mode: false,
            eink_enabled: false,
            eink_refresh_interval: 500,
            eink_buffer_size: 2,
            eink_dithering_enabled: true,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive (error, warn, info, debug, trace)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
