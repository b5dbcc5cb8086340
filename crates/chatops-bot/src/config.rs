//! Application configuration loaded from an optional file and environment variables.

use anyhow::{Context, Result};
use chatops_core::{DispatchSettings, Secrets};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Environment variable naming an optional configuration file.
pub const CONFIG_FILE_VAR: &str = "CHATOPS_CONFIG";

/// Prefix of configuration environment variables (`CHATOPS_BOT__NAME=...`).
pub const ENV_PREFIX: &str = "CHATOPS";

/// Application configuration.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Bot identity and routing
    #[serde(default)]
    pub bot: BotConfig,

    /// Dispatcher tuning
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Console transport
    #[serde(default)]
    pub console: ConsoleConfig,

    /// Free-form handler configuration, read through dotted paths
    #[serde(default = "empty_object")]
    pub handlers: Value,

    /// Secret sections, never logged
    #[serde(default)]
    pub secrets: HashMap<String, HashMap<String, SecretString>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Name the bot answers to
    #[serde(default = "default_bot_name")]
    pub name: String,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Channel for administrative notices
    #[serde(default)]
    pub admin_channel: Option<String>,

    /// Channel periodic jobs report to
    #[serde(default)]
    pub periodic_channel: Option<String>,

    /// Message kinds that get "did you mean" suggestions
    #[serde(default = "default_suggestable_kinds")]
    pub suggestable_kinds: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Concurrent broadcast and targeted dispatches
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Concurrent followup dispatches
    #[serde(default = "default_followup_workers")]
    pub followup_workers: usize,

    /// Upper bound between shutdown checks while a handler waits
    #[serde(default = "default_wait_check_delay", with = "humantime_serde")]
    pub wait_check_delay: Duration,

    /// Finished invocations kept per message kind
    #[serde(default)]
    pub max_history: HashMap<String, usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsoleConfig {
    /// User name attached to console messages
    #[serde(default = "default_console_user")]
    pub user_name: String,

    /// Channel name attached to console messages
    #[serde(default = "default_console_channel")]
    pub channel_name: String,

    /// Prompt printed before each line
    #[serde(default = "default_prompt")]
    pub prompt: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: default_bot_name(),
            log_level: default_log_level(),
            admin_channel: None,
            periodic_channel: None,
            suggestable_kinds: default_suggestable_kinds(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            followup_workers: default_followup_workers(),
            wait_check_delay: default_wait_check_delay(),
            max_history: HashMap::new(),
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            user_name: default_console_user(),
            channel_name: default_console_channel(),
            prompt: default_prompt(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot: BotConfig::default(),
            dispatch: DispatchConfig::default(),
            console: ConsoleConfig::default(),
            handlers: empty_object(),
            secrets: HashMap::new(),
        }
    }
}

// Default value functions
fn default_bot_name() -> String {
    "chatops".into()
}

fn default_log_level() -> String {
    "info".into()
}

fn default_suggestable_kinds() -> Vec<String> {
    vec!["slack".into(), "telnet".into()]
}

fn default_max_workers() -> usize {
    8
}

fn default_followup_workers() -> usize {
    2
}

fn default_wait_check_delay() -> Duration {
    Duration::from_millis(100)
}

fn default_console_user() -> String {
    "operator".into()
}

fn default_console_channel() -> String {
    "console".into()
}

fn default_prompt() -> String {
    "> ".into()
}

fn empty_object() -> Value {
    json!({})
}

impl DispatchConfig {
    /// Dispatcher settings, with suggestions limited to `suggestable_kinds`.
    pub fn settings(&self, suggestable_kinds: &[String]) -> DispatchSettings {
        DispatchSettings {
            max_workers: self.max_workers,
            followup_workers: self.followup_workers,
            max_history: self.max_history.clone(),
            suggestable_kinds: suggestable_kinds.iter().cloned().collect::<HashSet<_>>(),
        }
    }
}

impl Config {
    /// Load configuration from `$CHATOPS_CONFIG` (if set) and the environment.
    pub fn load() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder();
        if let Ok(path) = std::env::var(CONFIG_FILE_VAR) {
            builder = builder.add_source(config::File::with_name(&path));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    // Channel ids like "0123" must stay strings.
                    .try_parsing(false),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        config::Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// The tree handlers read through dotted paths (`bot.*`, `handlers.*`).
    pub fn tree(&self) -> Result<Value> {
        let bot = serde_json::to_value(&self.bot).context("Failed to serialize bot configuration")?;
        Ok(json!({
            "bot": bot,
            "handlers": self.handlers.clone(),
        }))
    }

    /// Move the secret sections out of the configuration.
    pub fn take_secrets(&mut self) -> Secrets {
        Secrets::new(std::mem::take(&mut self.secrets))
    }
}
