use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::config::io::ConfigError;
use crate::core::session::SessionOptions;

pub const DEFAULT_MODEL: &str = "echo";
pub const DEFAULT_PERSISTENCE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_STREAM_IDLE_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_CONVERSATION_LIMIT: usize = 50;
pub const DEFAULT_CHUNK_DELAY_MS: u64 = 30;

/// Keys accepted by `gabble set`/`gabble unset`.
pub const CONFIG_KEYS: &[&str] = &[
    "model",
    "max-output-tokens",
    "user",
    "data-dir",
    "persistence-timeout-secs",
    "stream-idle-timeout-secs",
    "conversation-limit",
    "chunk-delay-ms",
];

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    /// Model name passed to the completion backend
    pub model: Option<String>,
    pub max_output_tokens: Option<u32>,
    /// Local account name used to sign in
    pub user: Option<String>,
    /// Directory holding `conversations.json`
    pub data_dir: Option<PathBuf>,
    /// 0 disables the limit
    pub persistence_timeout_secs: Option<u64>,
    /// 0 disables the limit
    pub stream_idle_timeout_secs: Option<u64>,
    /// How many conversations to load at sign-in
    pub conversation_limit: Option<usize>,
    /// Pause between chunks of the built-in demo reply
    pub chunk_delay_ms: Option<u64>,
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}

fn optional_secs(secs: u64) -> Option<Duration> {
    Some(Duration::from_secs(secs)).filter(|limit| !limit.is_zero())
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|err| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: err.to_string(),
        })
}

impl Config {
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn persistence_timeout(&self) -> Option<Duration> {
        optional_secs(
            self.persistence_timeout_secs
                .unwrap_or(DEFAULT_PERSISTENCE_TIMEOUT_SECS),
        )
    }

    pub fn stream_idle_timeout(&self) -> Option<Duration> {
        optional_secs(
            self.stream_idle_timeout_secs
                .unwrap_or(DEFAULT_STREAM_IDLE_TIMEOUT_SECS),
        )
    }

    pub fn conversation_limit(&self) -> usize {
        self.conversation_limit.unwrap_or(DEFAULT_CONVERSATION_LIMIT)
    }

    pub fn chunk_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_delay_ms.unwrap_or(DEFAULT_CHUNK_DELAY_MS))
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            model: self.model().to_string(),
            max_output_tokens: self.max_output_tokens,
            persistence_timeout: self.persistence_timeout(),
            stream_idle_timeout: self.stream_idle_timeout(),
            conversation_limit: Some(self.conversation_limit()),
        }
    }

    /// Sets a key from its command-line spelling.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "model" => self.model = Some(value.trim().to_string()),
            "max-output-tokens" => self.max_output_tokens = Some(parse_value(key, value)?),
            "user" => self.user = Some(value.trim().to_string()),
            "data-dir" => self.data_dir = Some(PathBuf::from(value.trim())),
            "persistence-timeout-secs" => {
                self.persistence_timeout_secs = Some(parse_value(key, value)?)
            }
            "stream-idle-timeout-secs" => {
                self.stream_idle_timeout_secs = Some(parse_value(key, value)?)
            }
            "conversation-limit" => self.conversation_limit = Some(parse_value(key, value)?),
            "chunk-delay-ms" => self.chunk_delay_ms = Some(parse_value(key, value)?),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    pub fn unset(&mut self, key: &str) -> Result<(), ConfigError> {
        match key {
            "model" => self.model = None,
            "max-output-tokens" => self.max_output_tokens = None,
            "user" => self.user = None,
            "data-dir" => self.data_dir = None,
            "persistence-timeout-secs" => self.persistence_timeout_secs = None,
            "stream-idle-timeout-secs" => self.stream_idle_timeout_secs = None,
            "conversation-limit" => self.conversation_limit = None,
            "chunk-delay-ms" => self.chunk_delay_ms = None,
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }
}
