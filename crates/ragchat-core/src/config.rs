use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{RagChatError, Result};

/// Top-level configuration for the chat core.
///
/// Loaded from `~/.ragchat/config.toml` by default. Each section corresponds
/// to one component of the orchestration layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RagChatConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub request: RequestConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

impl RagChatConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RagChatConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| RagChatError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Apply overrides from `RAGCHAT_*` environment variables.
    ///
    /// Priority: env vars > config file > defaults. Unparseable values are
    /// ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("RAGCHAT_BASE_URL") {
            self.backend.base_url = url;
        }
        if let Some(level) = lookup("RAGCHAT_LOG_LEVEL") {
            self.general.log_level = level;
        }
        if let Some(raw) = lookup("RAGCHAT_TIMEOUT_SECS") {
            match raw.parse::<u64>() {
                Ok(secs) => self.backend.timeout_secs = Some(secs),
                Err(_) => warn!(value = %raw, "Ignoring invalid RAGCHAT_TIMEOUT_SECS"),
            }
        }
    }
}

/// Default config file path for the current platform.
///
/// Priority: `RAGCHAT_CONFIG` env var > `~/.ragchat/config.toml`.
pub fn default_config_path() -> PathBuf {
    if let Ok(p) = std::env::var("RAGCHAT_CONFIG") {
        return PathBuf::from(p);
    }
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".ragchat").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".ragchat").join("config.toml");
    }
    PathBuf::from("config.toml")
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Remote question-answering backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL every endpoint path is joined onto.
    pub base_url: String,
    /// Per-request timeout in seconds. `None` waits indefinitely.
    pub timeout_secs: Option<u64>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            timeout_secs: None,
        }
    }
}

/// Named retry policy for question submissions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicyName {
    /// No automatic retry; the caller decides.
    #[default]
    Default,
    /// Fixed delay between attempts, bounded retries.
    Robust,
}

/// Question submission settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Number of source passages requested when the caller passes none.
    pub default_result_count: u32,
    /// Retry policy applied to each submission.
    pub retry_policy: RetryPolicyName,
    /// Retries allowed by the robust policy.
    pub max_retries: u32,
    /// Delay between robust retries in milliseconds.
    pub retry_delay_ms: u64,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            default_result_count: 3,
            retry_policy: RetryPolicyName::Default,
            max_retries: 2,
            retry_delay_ms: 1000,
        }
    }
}

/// Index status polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Age in seconds after which a cached snapshot is stale.
    pub stale_after_secs: u64,
    /// Background refresh interval. `None` or 0 disables polling.
    pub poll_interval_secs: Option<u64>,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: 300,
            poll_interval_secs: None,
        }
    }
}

/// Conversation presentation strings and limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Maximum characters kept from the first user message as title.
    pub title_max_chars: usize,
    /// Title shown until the first user message arrives.
    pub new_conversation_title: String,
    /// Content of an assistant placeholder awaiting its answer.
    pub placeholder_text: String,
    /// Content shown when a question could not be answered.
    pub error_text: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            title_max_chars: 50,
            new_conversation_title: "New conversation".to_string(),
            placeholder_text: "Thinking...".to_string(),
            error_text: "Sorry, something went wrong while answering your question. Please try again."
                .to_string(),
        }
    }
}
