//! Process configuration from environment variables.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Phrase that makes the sender the administrator when none exists yet.
pub const DEFAULT_ADMIN_PHRASE: &str = "I am the consultation desk administrator";

/// Telegram transport settings. Present only when a bot token is configured.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    /// Usernames or numeric ids; `*` admits everyone.
    pub allowed_users: Vec<String>,
    pub poll_timeout_secs: u64,
}

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `None` runs the local CLI channel instead.
    pub telegram: Option<TelegramConfig>,
    pub db_path: PathBuf,
    pub http_port: u16,
    pub admin_phrase: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let telegram = match get("TELEGRAM_BOT_TOKEN") {
            Some(token) => {
                let allowed_users: Vec<String> = get("TELEGRAM_ALLOWED_USERS")
                    .unwrap_or_else(|| "*".to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                let poll_timeout_secs =
                    parse_or("TELEGRAM_POLL_TIMEOUT_SECS", get("TELEGRAM_POLL_TIMEOUT_SECS"), 30)?;
                Some(TelegramConfig {
                    bot_token: SecretString::from(token),
                    allowed_users,
                    poll_timeout_secs,
                })
            }
            None => None,
        };

        let db_path = get("CONSULT_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/consult-desk.db"));
        let http_port = parse_or("CONSULT_HTTP_PORT", get("CONSULT_HTTP_PORT"), 5000)?;
        let admin_phrase = get("CONSULT_ADMIN_PHRASE")
            .map(|p| p.trim().to_string())
            .unwrap_or_else(|| DEFAULT_ADMIN_PHRASE.to_string());

        Ok(Self {
            telegram,
            db_path,
            http_port,
            admin_phrase,
        })
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{value:?}: {e}"),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    fn config(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let cfg = config(&[]).unwrap();
        assert!(cfg.telegram.is_none());
        assert_eq!(cfg.db_path, PathBuf::from("./data/consult-desk.db"));
        assert_eq!(cfg.http_port, 5000);
        assert_eq!(cfg.admin_phrase, DEFAULT_ADMIN_PHRASE);
    }

    #[test]
    fn telegram_section_needs_token() {
        let cfg = config(&[
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("TELEGRAM_ALLOWED_USERS", "alice, 42,,"),
            ("TELEGRAM_POLL_TIMEOUT_SECS", "10"),
        ])
        .unwrap();
        let tg = cfg.telegram.unwrap();
        assert_eq!(tg.bot_token.expose_secret(), "123:abc");
        assert_eq!(tg.allowed_users, vec!["alice", "42"]);
        assert_eq!(tg.poll_timeout_secs, 10);

        let cfg = config(&[("TELEGRAM_BOT_TOKEN", "123:abc")]).unwrap();
        assert_eq!(cfg.telegram.unwrap().allowed_users, vec!["*"]);
    }

    #[test]
    fn blank_token_means_cli() {
        let cfg = config(&[("TELEGRAM_BOT_TOKEN", "  ")]).unwrap();
        assert!(cfg.telegram.is_none());
    }

    #[test]
    fn invalid_port_is_reported() {
        let err = config(&[("CONSULT_HTTP_PORT", "eighty")]).unwrap_err();
        match err {
            ConfigError::InvalidValue { key, .. } => assert_eq!(key, "CONSULT_HTTP_PORT"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn custom_phrase_is_trimmed() {
        let cfg = config(&[("CONSULT_ADMIN_PHRASE", "  open sesame ")]).unwrap();
        assert_eq!(cfg.admin_phrase, "open sesame");
    }
}
