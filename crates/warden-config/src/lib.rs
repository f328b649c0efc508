//! TOML configuration loading for the service (§6), with environment
//! variable overrides for the handful of values that are usually secrets
//! or deployment-specific (the action-log database URL and the pickle
//! key) rather than checked-in config.

#![deny(unsafe_code)]

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use warden_core::identity::UserId;

/// Errors loading or parsing a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file couldn't be read from disk.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// The file's contents aren't valid TOML, or are missing a required field.
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    /// `pickle_key` isn't valid base64.
    #[error("pickle_key is not valid base64: {0}")]
    PickleKeyEncoding(#[from] base64::DecodeError),
    /// No bots were configured; the service has nothing to run.
    #[error("config must declare at least one bot")]
    NoBots,
}

/// One managed bot: its Matrix user id and whether it should log
/// enforcement actions without actually calling the homeserver.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    pub user_id: UserId,
    #[serde(default)]
    pub dry_run: bool,
}

/// The raw, TOML-shaped config file (before base64-decoding the pickle key).
#[derive(Debug, Clone, Deserialize)]
struct RawConfig {
    database_url: String,
    pickle_key: String,
    bots: Vec<BotConfig>,
    webhook_url: Option<String>,
}

/// The service's full configuration: an action-log database connection
/// string, the crypto pickle key shared by every bot's `CryptoHelper`, the
/// set of managed bots, and an optional webhook URL for forwarded messages.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub pickle_key: Vec<u8>,
    pub bots: Vec<BotConfig>,
    pub webhook_url: Option<String>,
}

/// Environment variables that override the matching TOML field, for
/// deployments that inject secrets at runtime rather than checking them in.
const DATABASE_URL_VAR: &str = "WARDEN_DATABASE_URL";
const PICKLE_KEY_VAR: &str = "WARDEN_PICKLE_KEY";
const WEBHOOK_URL_VAR: &str = "WARDEN_WEBHOOK_URL";

impl Config {
    /// Parse a TOML document into a `Config`, applying any environment
    /// overrides present in the process's environment.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(text)?;
        Self::from_raw(raw)
    }

    /// Read and parse a config file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        if raw.bots.is_empty() {
            return Err(ConfigError::NoBots);
        }

        let database_url = std::env::var(DATABASE_URL_VAR).unwrap_or(raw.database_url);
        let pickle_key_text = std::env::var(PICKLE_KEY_VAR).unwrap_or(raw.pickle_key);
        let pickle_key = base64_decode(&pickle_key_text)?;
        let webhook_url = std::env::var(WEBHOOK_URL_VAR).ok().or(raw.webhook_url);

        Ok(Config { database_url, pickle_key, bots: raw.bots, webhook_url })
    }
}

fn base64_decode(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(text.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        database_url = "sqlite://warden.db"
        pickle_key = "cGlja2xlLWtleS1ieXRlcw=="

        [[bots]]
        user_id = "@moderator:example.org"
    "#;

    #[test]
    fn parses_a_minimal_config() {
        let config = Config::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.database_url, "sqlite://warden.db");
        assert_eq!(config.pickle_key, b"pickle-key-bytes");
        assert_eq!(config.bots.len(), 1);
        assert_eq!(config.bots[0].user_id, UserId::from("@moderator:example.org"));
        assert!(!config.bots[0].dry_run);
        assert!(config.webhook_url.is_none());
    }

    #[test]
    fn dry_run_defaults_to_false_but_can_be_set_per_bot() {
        let text = r#"
            database_url = "sqlite://warden.db"
            pickle_key = "cGlja2xlLWtleS1ieXRlcw=="

            [[bots]]
            user_id = "@watcher:example.org"
            dry_run = true

            [[bots]]
            user_id = "@enforcer:example.org"
        "#;
        let config = Config::from_toml_str(text).unwrap();
        assert!(config.bots[0].dry_run);
        assert!(!config.bots[1].dry_run);
    }

    #[test]
    fn rejects_a_config_with_no_bots() {
        let text = r#"
            database_url = "sqlite://warden.db"
            pickle_key = "cGlja2xlLWtleS1ieXRlcw=="
            bots = []
        "#;
        assert!(matches!(Config::from_toml_str(text), Err(ConfigError::NoBots)));
    }

    #[test]
    fn rejects_a_pickle_key_that_is_not_base64() {
        let text = r#"
            database_url = "sqlite://warden.db"
            pickle_key = "not valid base64 !!"

            [[bots]]
            user_id = "@moderator:example.org"
        "#;
        assert!(matches!(Config::from_toml_str(text), Err(ConfigError::PickleKeyEncoding(_))));
    }

    #[test]
    fn webhook_url_is_optional_but_parsed_when_present() {
        let text = r#"
            database_url = "sqlite://warden.db"
            pickle_key = "cGlja2xlLWtleS1ieXRlcw=="
            webhook_url = "https://hooks.example.org/warden"

            [[bots]]
            user_id = "@moderator:example.org"
        "#;
        let config = Config::from_toml_str(text).unwrap();
        assert_eq!(config.webhook_url.as_deref(), Some("https://hooks.example.org/warden"));
    }
}
