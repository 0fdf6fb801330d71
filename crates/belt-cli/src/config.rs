//! Configuration – reads/writes `~/.belt/config.toml`.
//!
//! Precedence, lowest first: built-in defaults, the config file, `BELT_*`
//! environment variables, command-line flags.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use belt_runtime::{LogFormat, RetryPolicy};
use belt_types::{BeltError, ModelEndpoint};
use serde::{Deserialize, Serialize};

/// Persisted configuration stored in `~/.belt/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the Ollama instance.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Model used to interpret commands (e.g. "phi").
    #[serde(default = "default_model")]
    pub model: String,

    /// Bootstrap attempts before giving up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Seconds between bootstrap attempts.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Deadline for each generation request, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Listen address of the command server.
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    #[serde(default)]
    pub log_format: LogFormat,

    /// OpenAI-compatible endpoint used by the control loop.
    #[serde(default = "default_chat_url")]
    pub chat_url: String,

    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Seconds between control-loop ticks.
    #[serde(default = "default_control_interval_secs")]
    pub control_interval_secs: u64,
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_model() -> String {
    "phi".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_retry_delay_secs() -> u64 {
    10
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_bind_address() -> SocketAddr {
    belt_server::DEFAULT_ADDR
}
fn default_chat_url() -> String {
    "http://localhost:1234".to_string()
}
fn default_chat_model() -> String {
    "llama-3.2-3b-instruct".to_string()
}
fn default_control_interval_secs() -> u64 {
    2
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ollama_url: default_ollama_url(),
            model: default_model(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            bind_address: default_bind_address(),
            log_format: LogFormat::default(),
            chat_url: default_chat_url(),
            chat_model: default_chat_model(),
            control_interval_secs: default_control_interval_secs(),
        }
    }
}

impl Config {
    pub fn endpoint(&self) -> ModelEndpoint {
        ModelEndpoint::new(&self.ollama_url, &self.model)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn control_interval(&self) -> Duration {
        Duration::from_secs(self.control_interval_secs)
    }

    /// # Errors
    ///
    /// Returns [`BeltError::Config`] when `max_retries` or
    /// `retry_delay_secs` is zero.
    pub fn retry_policy(&self) -> Result<RetryPolicy, BeltError> {
        Ok(RetryPolicy::new(
            self.max_retries,
            Duration::from_secs(self.retry_delay_secs),
        )?)
    }

    /// Reject settings that would make every request or tick misbehave.
    ///
    /// # Errors
    ///
    /// Returns [`BeltError::Config`] for a zero retry count, retry delay,
    /// request timeout, or control interval.
    pub fn validate(&self) -> Result<(), BeltError> {
        self.retry_policy()?;
        if self.request_timeout_secs == 0 {
            return Err(BeltError::Config(
                "request_timeout_secs must be positive".into(),
            ));
        }
        if self.control_interval_secs == 0 {
            return Err(BeltError::Config(
                "control_interval_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Return the path to `~/.belt/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".belt").join("config.toml")
}

/// Load the file at `path`.  `None` when it does not exist.
pub fn load_from(path: &Path) -> Result<Option<Config>, BeltError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        BeltError::Config(format!("failed to read config at {}: {e}", path.display()))
    })?;
    let cfg: Config = toml::from_str(&raw)
        .map_err(|e| BeltError::Config(format!("failed to parse {}: {e}", path.display())))?;
    Ok(Some(cfg))
}

/// Effective configuration: the file at `path` (or the default location),
/// falling back to defaults, with environment overrides applied.
pub fn resolve(path: Option<&Path>) -> Result<Config, BeltError> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config_path);
    let mut cfg = load_from(&path)?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Apply `BELT_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `BELT_OLLAMA_URL` | `ollama_url` |
/// | `BELT_MODEL` | `model` |
/// | `BELT_MAX_RETRIES` | `max_retries` |
/// | `BELT_RETRY_DELAY_SECS` | `retry_delay_secs` |
/// | `BELT_REQUEST_TIMEOUT_SECS` | `request_timeout_secs` |
/// | `BELT_BIND` | `bind_address` |
/// | `BELT_LOG_FORMAT` | `log_format` |
/// | `BELT_CHAT_URL` | `chat_url` |
/// | `BELT_CHAT_MODEL` | `chat_model` |
///
/// Values that fail to parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides_from(cfg, |key| std::env::var(key).ok());
}

pub(crate) fn apply_overrides_from(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("BELT_OLLAMA_URL") {
        cfg.ollama_url = v;
    }
    if let Some(v) = lookup("BELT_MODEL") {
        cfg.model = v;
    }
    if let Some(v) = lookup("BELT_MAX_RETRIES")
        && let Ok(n) = v.parse()
    {
        cfg.max_retries = n;
    }
    if let Some(v) = lookup("BELT_RETRY_DELAY_SECS")
        && let Ok(n) = v.parse()
    {
        cfg.retry_delay_secs = n;
    }
    if let Some(v) = lookup("BELT_REQUEST_TIMEOUT_SECS")
        && let Ok(n) = v.parse()
    {
        cfg.request_timeout_secs = n;
    }
    if let Some(v) = lookup("BELT_BIND")
        && let Ok(addr) = v.parse()
    {
        cfg.bind_address = addr;
    }
    if let Some(v) = lookup("BELT_LOG_FORMAT")
        && let Ok(format) = v.parse()
    {
        cfg.log_format = format;
    }
    if let Some(v) = lookup("BELT_CHAT_URL") {
        cfg.chat_url = v;
    }
    if let Some(v) = lookup("BELT_CHAT_MODEL") {
        cfg.chat_model = v;
    }
}

/// Write `cfg` to `path`, creating parent directories as needed.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), BeltError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            BeltError::Config(format!("failed to create {}: {e}", parent.display()))
        })?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| BeltError::Config(format!("failed to serialize config: {e}")))?;
    fs::write(path, raw).map_err(|e| {
        BeltError::Config(format!("failed to write config at {}: {e}", path.display()))
    })
}
