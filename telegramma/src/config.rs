//! Bot configuration.
//!
//! Configuration is one JSON document. Top-level keys configure the chat
//! connection; each module reads its own object under `modules.<name>`.
//!
//! ```json
//! {
//!   "bot_token": "123:abc",
//!   "modules": {
//!     "twrpdtgen": {
//!       "github_username": "bot",
//!       "github_token": "ghp_x",
//!       "github_org": "TwrpDtGen"
//!     },
//!     "ci": { "script": "/opt/ci/build.sh" }
//!   }
//! }
//! ```

use crate::chat::{ChatId, TelegramConfig};
use crate::collaborators::GithubCredentials;
use crate::errors::ConfigurationError;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "TELEGRAMMA_CONFIG";
/// Environment variable overriding `bot_token`.
pub const BOT_TOKEN_ENV: &str = "TELEGRAMMA_BOT_TOKEN";
/// Configuration file used when [`CONFIG_PATH_ENV`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Top-level configuration document.
#[derive(Clone, Deserialize)]
pub struct BotConfig {
    /// Bot API token.
    #[serde(default)]
    pub bot_token: Option<String>,
    /// Bot API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Long-polling timeout, in seconds.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
    #[serde(default)]
    modules: HashMap<String, serde_json::Value>,
}

fn default_api_base() -> String {
    TelegramConfig::new(String::new()).api_base
}

fn default_poll_timeout() -> u64 {
    TelegramConfig::new(String::new()).poll_timeout_secs
}

impl std::fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig")
            .field("api_base", &self.api_base)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_base: default_api_base(),
            poll_timeout_secs: default_poll_timeout(),
            modules: HashMap::new(),
        }
    }
}

impl BotConfig {
    /// Parses a configuration document. `location` names it in errors.
    pub fn from_json(text: &str, location: &str) -> Result<Self, ConfigurationError> {
        serde_json::from_str(text).map_err(|source| ConfigurationError::Parse {
            location: location.to_string(),
            source,
        })
    }

    /// Reads and parses a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text, &path.display().to_string())
    }

    /// Loads the file named by `TELEGRAMMA_CONFIG` (default `config.json`)
    /// and applies `TELEGRAMMA_BOT_TOKEN`.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
        let config = Self::load(&path)?;
        Ok(config.with_bot_token_override(std::env::var(BOT_TOKEN_ENV).ok()))
    }

    /// Replaces the bot token when `token` is set and non-empty.
    #[must_use]
    pub fn with_bot_token_override(mut self, token: Option<String>) -> Self {
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            self.bot_token = Some(token);
        }
        self
    }

    /// Deserializes the `modules.<name>` object. An absent namespace yields
    /// the default value, so modules decide what is required.
    pub fn namespace<T: DeserializeOwned + Default>(
        &self,
        name: &str,
    ) -> Result<T, ConfigurationError> {
        match self.modules.get(name) {
            None | Some(serde_json::Value::Null) => Ok(T::default()),
            Some(value) => {
                serde_json::from_value(value.clone()).map_err(|source| ConfigurationError::Parse {
                    location: format!("modules.{name}"),
                    source,
                })
            }
        }
    }

    /// Builds the Bot API connection settings.
    pub fn telegram(&self) -> Result<TelegramConfig, ConfigurationError> {
        let token = present(self.bot_token.as_ref())
            .ok_or_else(|| ConfigurationError::missing("bot", vec!["bot_token".to_string()]))?;
        let mut telegram = TelegramConfig::new(token).with_api_base(self.api_base.clone());
        telegram.poll_timeout_secs = self.poll_timeout_secs;
        Ok(telegram)
    }
}

/// Settings of the `twrpdtgen` module.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TwrpdtgenConfig {
    /// Account used for git over HTTPS.
    #[serde(default)]
    pub github_username: Option<String>,
    /// Personal access token.
    #[serde(default)]
    pub github_token: Option<String>,
    /// Organization owning the generated repositories.
    #[serde(default)]
    pub github_org: Option<String>,
    /// Chat receiving a summary of every generated tree.
    #[serde(default)]
    pub chat_id: Option<ChatId>,
}

impl TwrpdtgenConfig {
    /// Namespace under `modules`.
    pub const NAMESPACE: &'static str = "twrpdtgen";

    /// Returns the GitHub credentials, or the list of absent keys.
    /// Empty strings count as absent.
    pub fn credentials(&self) -> Result<GithubCredentials, ConfigurationError> {
        let username = present(self.github_username.as_ref());
        let token = present(self.github_token.as_ref());
        let org = present(self.github_org.as_ref());

        match (username, token, org) {
            (Some(username), Some(token), Some(org)) => Ok(GithubCredentials {
                username: username.to_string(),
                token: token.to_string(),
                org: org.to_string(),
            }),
            _ => {
                let missing = [
                    ("github_username", username),
                    ("github_token", token),
                    ("github_org", org),
                ]
                .into_iter()
                .filter(|(_, value)| value.is_none())
                .map(|(key, _)| key.to_string())
                .collect();
                Err(ConfigurationError::missing(Self::NAMESPACE, missing))
            }
        }
    }

    /// Returns the broadcast chat, if one is configured.
    #[must_use]
    pub fn broadcast_chat(&self) -> Option<&ChatId> {
        self.chat_id.as_ref().filter(|id| !id.as_str().is_empty())
    }
}

/// Settings of the `ci` module.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CiConfig {
    /// Executable run for every job, with the project and arguments.
    #[serde(default)]
    pub script: Option<PathBuf>,
    /// Working directory of the script; inherited when unset.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl CiConfig {
    /// Namespace under `modules`.
    pub const NAMESPACE: &'static str = "ci";

    /// Returns the configured script.
    pub fn script(&self) -> Result<&Path, ConfigurationError> {
        self.script
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
            .ok_or_else(|| ConfigurationError::missing(Self::NAMESPACE, vec!["script".to_string()]))
    }
}

fn present(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.is_empty())
}
