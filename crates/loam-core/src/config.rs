//! Shared configuration for Loam.
//!
//! Settings come from environment variables, optionally loaded from a
//! `.env` file by the binary before [`LoamConfig::from_env`] runs.
//!
//! # Storage Structure
//!
//! ```text
//! ~/.loam/
//! ├── .env          # Secrets (bot token, API key)
//! └── users/        # One JSON record per user
//!     └── 1234567.json
//! ```
//!
//! # Environment Variables
//!
//! - `TELEGRAM_BOT_TOKEN`: Bot token (required)
//! - `LOAM_ALLOWED_USERS`: Comma-separated Telegram user ids
//! - `LOAM_VAULT_PATH`: Vault root (default `~/loam/notes`)
//! - `LOAM_STATE_DIR`: Override the state directory
//! - `LOAM_CONTEXT_WINDOW`: Prior turns sent to the agent (default 50)
//! - `LOAM_MAX_UNSTARRED`: Unstarred sessions kept per folder (default 10)
//! - `LOAM_ARCHIVE_AFTER_DAYS`: Evict unstarred sessions idle this long
//! - `LOAM_FOLDER_AWARENESS`: Include the folder's note listing in prompts
//! - `OPENROUTER_API_KEY`: LLM key (required)
//! - `OPENROUTER_MODEL`: Model id
//! - `LOAM_AGENT_TIMEOUT_SECS`: Per-request agent timeout (default 120)

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use loam_models::UserId;
use loam_persistence::retention::DEFAULT_MAX_UNSTARRED;
use loam_persistence::RetentionPolicy;
use thiserror::Error;

pub const TELEGRAM_TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";
pub const ALLOWED_USERS_ENV: &str = "LOAM_ALLOWED_USERS";
pub const VAULT_PATH_ENV: &str = "LOAM_VAULT_PATH";
pub const STATE_DIR_ENV: &str = "LOAM_STATE_DIR";
pub const CONTEXT_WINDOW_ENV: &str = "LOAM_CONTEXT_WINDOW";
pub const MAX_UNSTARRED_ENV: &str = "LOAM_MAX_UNSTARRED";
pub const ARCHIVE_AFTER_ENV: &str = "LOAM_ARCHIVE_AFTER_DAYS";
pub const FOLDER_AWARENESS_ENV: &str = "LOAM_FOLDER_AWARENESS";
pub const OPENROUTER_API_KEY_ENV: &str = "OPENROUTER_API_KEY";
pub const OPENROUTER_MODEL_ENV: &str = "OPENROUTER_MODEL";
pub const AGENT_TIMEOUT_ENV: &str = "LOAM_AGENT_TIMEOUT_SECS";

/// Default state directory name under home.
const DEFAULT_STATE_DIR: &str = ".loam";

/// Default vault location.
const DEFAULT_VAULT_PATH: &str = "~/loam/notes";

pub const DEFAULT_CONTEXT_WINDOW: usize = 50;
pub const DEFAULT_MODEL: &str = "anthropic/claude-sonnet-4";
pub const DEFAULT_AGENT_TIMEOUT_SECS: u64 = 120;

/// Errors raised while reading configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is unset or empty.
    #[error("{0} is not set")]
    Missing(&'static str),

    /// A variable is set but cannot be parsed.
    #[error("invalid value for {name}: '{value}'")]
    Invalid { name: &'static str, value: String },
}

/// Get the Loam state directory.
///
/// The state directory is determined by:
/// 1. `LOAM_STATE_DIR` environment variable if set
/// 2. `~/.loam` if home directory is available
/// 3. `.loam` in current directory as fallback
pub fn state_dir() -> PathBuf {
    std::env::var(STATE_DIR_ENV)
        .map(|dir| expand_path(&dir))
        .unwrap_or_else(|_| default_state_dir())
}

fn default_state_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(DEFAULT_STATE_DIR))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR))
}

/// Get the `.env` file inside the state directory.
pub fn env_file() -> PathBuf {
    state_dir().join(".env")
}

/// Expands `~` and environment variables in a configured path.
pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::full(raw).map(|s| s.into_owned()).unwrap_or_else(|_| raw.to_string()))
}

/// Runtime configuration shared by the bot and its collaborators.
#[derive(Debug, Clone)]
pub struct LoamConfig {
    pub telegram_token: String,
    /// Users allowed to talk to the bot. Empty means nobody.
    pub allowed_users: BTreeSet<UserId>,
    pub vault_path: PathBuf,
    pub state_dir: PathBuf,
    /// Prior turns sent with each message.
    pub context_window: usize,
    pub retention: RetentionPolicy,
    pub folder_awareness: bool,
    pub openrouter_api_key: String,
    pub model: String,
    pub agent_timeout: Duration,
}

impl LoamConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which returns a variable's value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let telegram_token = get(TELEGRAM_TOKEN_ENV).ok_or(ConfigError::Missing(TELEGRAM_TOKEN_ENV))?;
        let openrouter_api_key =
            get(OPENROUTER_API_KEY_ENV).ok_or(ConfigError::Missing(OPENROUTER_API_KEY_ENV))?;

        let allowed_users = match get(ALLOWED_USERS_ENV) {
            Some(raw) => parse_user_list(&raw)?,
            None => BTreeSet::new(),
        };

        let vault_path = expand_path(&get(VAULT_PATH_ENV).unwrap_or_else(|| DEFAULT_VAULT_PATH.to_string()));
        let state_dir = get(STATE_DIR_ENV)
            .map(|dir| expand_path(&dir))
            .unwrap_or_else(default_state_dir);

        let context_window = parse_number(CONTEXT_WINDOW_ENV, get(CONTEXT_WINDOW_ENV))?
            .unwrap_or(DEFAULT_CONTEXT_WINDOW);
        let max_unstarred = parse_number(MAX_UNSTARRED_ENV, get(MAX_UNSTARRED_ENV))?
            .unwrap_or(DEFAULT_MAX_UNSTARRED);
        let archive_after = match get(ARCHIVE_AFTER_ENV) {
            Some(raw) => Some(parse_days(ARCHIVE_AFTER_ENV, raw)?),
            None => None,
        };

        let retention = RetentionPolicy {
            // 0 disables the count limit
            max_unstarred_per_folder: Some(max_unstarred).filter(|&n| n > 0),
            archive_after,
        };

        let folder_awareness = match get(FOLDER_AWARENESS_ENV) {
            Some(raw) => parse_bool(FOLDER_AWARENESS_ENV, &raw)?,
            None => false,
        };

        let model = get(OPENROUTER_MODEL_ENV).unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let timeout_secs = parse_number(AGENT_TIMEOUT_ENV, get(AGENT_TIMEOUT_ENV))?
            .map(|n: usize| n as u64)
            .unwrap_or(DEFAULT_AGENT_TIMEOUT_SECS);

        Ok(Self {
            telegram_token,
            allowed_users,
            vault_path,
            state_dir,
            context_window,
            retention,
            folder_awareness,
            openrouter_api_key,
            model,
            agent_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn parse_user_list(raw: &str) -> Result<BTreeSet<UserId>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>().map(UserId).map_err(|_| ConfigError::Invalid {
                name: ALLOWED_USERS_ENV,
                value: s.to_string(),
            })
        })
        .collect()
}

fn parse_number(name: &'static str, raw: Option<String>) -> Result<Option<usize>, ConfigError> {
    raw.map(|value| {
        value
            .parse::<usize>()
            .map_err(|_| ConfigError::Invalid { name, value })
    })
    .transpose()
}

/// Parses a whole number of days that fits a `chrono::Duration`.
fn parse_days(name: &'static str, value: String) -> Result<chrono::Duration, ConfigError> {
    value
        .parse::<i64>()
        .ok()
        .filter(|&days| days >= 0)
        .and_then(chrono::Duration::try_days)
        .ok_or(ConfigError::Invalid { name, value })
}

fn parse_bool(name: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: raw.to_string(),
        }),
    }
}
