//! Configuration types for the assistant core.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for the assistant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistConfig {
    /// Conversation session settings.
    pub chat: ChatConfig,
    /// Audio playback settings.
    pub audio: AudioConfig,
    /// Gemini API settings.
    pub gemini: GeminiConfig,
    /// Conversation history storage settings.
    pub storage: StorageConfig,
}

/// Conversation session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Number of recent log entries sent as context per request.
    pub context_window: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self { context_window: 15 }
    }
}

/// Audio playback configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output sample rate in Hz. Synthesized speech arrives at 24 kHz.
    pub output_sample_rate: u32,
    /// Number of output channels (1 = mono).
    pub output_channels: u16,
    /// Output device name (None = system default).
    pub output_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            output_sample_rate: 24_000,
            output_channels: 1,
            output_device: None,
        }
    }
}

/// Gemini API configuration.
///
/// The API key is never stored in the config file; it is resolved from the
/// environment variable named by `api_key_env`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    /// Base URL for the Generative Language API.
    pub api_url: String,
    /// Model used for ordinary chat requests.
    pub chat_model: String,
    /// Model used when thinking mode is on or for analysis profiles.
    pub reasoning_model: String,
    /// Model used for speech synthesis.
    pub tts_model: String,
    /// Prebuilt voice name for synthesized speech.
    pub voice: String,
    /// Thinking-token budget attached when thinking mode is on.
    pub thinking_budget: u32,
    /// Environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_url: "https://generativelanguage.googleapis.com/v1beta".into(),
            chat_model: "gemini-2.5-flash".into(),
            reasoning_model: "gemini-2.5-pro".into(),
            tts_model: "gemini-2.5-flash-preview-tts".into(),
            voice: "Kore".into(),
            thinking_budget: 32_768,
            api_key_env: "GEMINI_API_KEY".into(),
        }
    }
}

impl GeminiConfig {
    /// Resolve the API key from the configured environment variable.
    ///
    /// # Errors
    ///
    /// Returns a config error if the variable is unset or empty.
    pub fn resolve_api_key(&self) -> crate::error::Result<String> {
        let key = std::env::var(&self.api_key_env).map_err(|_| {
            crate::error::AssistError::Config(format!(
                "API key env var is missing: {}",
                self.api_key_env
            ))
        })?;
        if key.trim().is_empty() {
            return Err(crate::error::AssistError::Config(format!(
                "API key env var is empty: {}",
                self.api_key_env
            )));
        }
        Ok(key)
    }
}

/// Conversation history storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for history files (None = platform data dir).
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolve the history directory, falling back to the platform data dir.
    pub fn resolve_data_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.data_dir {
            return dir.clone();
        }
        dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("kinesia")
            .join("history")
    }
}

impl AssistConfig {
    /// Load configuration from a TOML file.
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

    /// Returns the default config file path: `~/.config/kinesia/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("kinesia").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("kinesia")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/kinesia-config/config.toml")
        }
    }
}
