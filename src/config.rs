//! Configuration management

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Minimum permission level needed to create or clear scheduled tasks
pub const DEFAULT_TASK_PERMISSION: u32 = 60;

/// Maximum chat message length in characters
pub const DEFAULT_MAX_MESSAGE_CHARS: usize = 2000;

/// Backend client settings
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL of the AI reply service
    pub base_url: String,

    /// Per-request timeout
    pub timeout: Duration,

    /// Attempts for retryable calls (chat, clear, list)
    pub max_retries: u32,

    /// Linear backoff step between attempts
    pub retry_delay: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:1478".to_string(),
            timeout: Duration::from_millis(30_000),
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub backend: BackendConfig,

    /// Permission threshold for task creation and clearing
    pub task_permission: u32,

    /// Message cap for chat input
    pub max_message_chars: usize,

    /// Command word (`.chat`, `/chat`)
    pub command_name: String,

    /// Check backend health before every chat call
    pub precheck_health: bool,

    /// TOML file backing the feature flags
    pub settings_path: PathBuf,

    /// Seed for the bot identifier when the settings store has none
    pub bot_identifier: Option<String>,

    /// User ids granted permission 100
    pub admin_users: Vec<String>,

    /// User ids granted the task permission threshold
    pub trusted_users: Vec<String>,

    /// Permission of the local console user
    pub console_permission: u32,

    /// Group the console host pretends to be in
    pub console_group: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            task_permission: DEFAULT_TASK_PERMISSION,
            max_message_chars: DEFAULT_MAX_MESSAGE_CHARS,
            command_name: "chat".to_string(),
            precheck_health: false,
            settings_path: default_settings_path(),
            bot_identifier: None,
            admin_users: Vec::new(),
            trusted_users: Vec::new(),
            console_permission: 100,
            console_group: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let base_url = std::env::var("CHATBRIDGE_BACKEND_URL")
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or(defaults.backend.base_url);

        let timeout = Duration::from_millis(env_parse("CHATBRIDGE_TIMEOUT_MS")?.unwrap_or(30_000));
        let max_retries = env_parse("CHATBRIDGE_MAX_RETRIES")?.unwrap_or(3);
        let retry_delay =
            Duration::from_millis(env_parse("CHATBRIDGE_RETRY_DELAY_MS")?.unwrap_or(1000));

        let task_permission =
            env_parse("CHATBRIDGE_TASK_PERMISSION")?.unwrap_or(DEFAULT_TASK_PERMISSION);
        let max_message_chars =
            env_parse("CHATBRIDGE_MAX_MESSAGE_CHARS")?.unwrap_or(DEFAULT_MAX_MESSAGE_CHARS);

        let command_name = std::env::var("CHATBRIDGE_COMMAND")
            .ok()
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .unwrap_or(defaults.command_name);

        let precheck_health = std::env::var("CHATBRIDGE_PRECHECK_HEALTH")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let settings_path = std::env::var("CHATBRIDGE_SETTINGS_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.settings_path);

        let bot_identifier = std::env::var("CHATBRIDGE_BOT_IDENTIFIER")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let console_permission =
            env_parse("CHATBRIDGE_CONSOLE_PERMISSION")?.unwrap_or(defaults.console_permission);

        let console_group = std::env::var("CHATBRIDGE_CONSOLE_GROUP")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(Self {
            backend: BackendConfig {
                base_url,
                timeout,
                max_retries,
                retry_delay,
            },
            task_permission,
            max_message_chars,
            command_name,
            precheck_health,
            settings_path,
            bot_identifier,
            admin_users: env_list("CHATBRIDGE_ADMIN_USERS"),
            trusted_users: env_list("CHATBRIDGE_TRUSTED_USERS"),
            console_permission,
            console_group,
        })
    }

    /// Permission level for a host user id, from the admin/trusted lists
    pub fn permission_for(&self, user_id: &str) -> u32 {
        if self.admin_users.iter().any(|u| u == user_id) {
            100
        } else if self.trusted_users.iter().any(|u| u == user_id) {
            self.task_permission
        } else {
            0
        }
    }
}

fn default_settings_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("chatbridge")
        .join("settings.toml")
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("invalid value for {}: {:?}", key, v)),
        _ => Ok(None),
    }
}

fn env_list(key: &str) -> Vec<String> {
    std::env::var(key)
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
