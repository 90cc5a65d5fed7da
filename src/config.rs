//! Configuration types for the voice command engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistConfig {
    /// HTTP/WebSocket listener settings.
    pub server: ServerConfig,
    /// Conversation gate settings (activation phrase, continuity window).
    pub conversation: ConversationConfig,
    /// Model endpoint settings.
    pub model: ModelConfig,
    /// Remote function broker settings.
    pub broker: BrokerConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8765,
        }
    }
}

/// Conversation gate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Phrase the transcription client listens for before forwarding an
    /// utterance when continuity mode is off. Surfaced to clients via
    /// `/status`; the engine itself never sees raw audio.
    pub activation_phrase: String,
    /// Seconds of inactivity before continuity mode expires.
    pub inactivity_timeout_secs: u64,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            activation_phrase: "sous".to_owned(),
            inactivity_timeout_secs: 15,
        }
    }
}

impl ConversationConfig {
    /// Inactivity window as a [`Duration`].
    #[must_use]
    pub fn inactivity_window(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }
}

/// Model endpoint configuration (OpenAI-compatible chat completions API).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Base URL of the model server (e.g. `http://localhost:1234`).
    pub api_url: String,
    /// Model identifier sent with each request.
    pub api_model: String,
    /// Bearer token (empty = no auth header).
    pub api_key: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens per completion.
    pub max_tokens: usize,
    /// Per-call deadline in seconds.
    pub request_timeout_secs: u64,
    /// Number of recent history entries included in each model call.
    pub history_window: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:1234".to_owned(),
            api_model: "local".to_owned(),
            api_key: String::new(),
            temperature: 0.7,
            max_tokens: 800,
            request_timeout_secs: 60,
            history_window: 10,
        }
    }
}

impl ModelConfig {
    /// Per-call deadline as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Remote function broker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Deadline in seconds for each remote function call. Callers cannot
    /// bypass this.
    pub call_timeout_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: 30,
        }
    }
}

impl BrokerConfig {
    /// Call deadline as a [`Duration`].
    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl AssistConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::AssistError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::AssistError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/sous/config.toml`.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("sous").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("sous")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/sous-config/config.toml")
        }
    }

    /// Socket address string for the listener.
    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
