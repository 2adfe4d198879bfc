//! Process configuration, loaded from environment variables.
//!
//! | Variable         | Required            | Meaning                                  |
//! |------------------|---------------------|------------------------------------------|
//! | `GRIDKIT_ENV`    | no (development)    | development \| staging \| production     |
//! | `ENCRYPTION_KEY` | outside development | 64-hex-char secret for the vault         |
//! | `DATABASE_URL`   | yes                 | SQLite connection string                 |
//! | `REDIS_URL`      | outside development | queue + rate-limit backing store         |
//! | `API_BASE_URL`   | yes                 | external prefix for webhook URLs         |
//! | `PORT`           | no (3000)           | HTTP listen port                         |

use {gridkit_common::Environment, secrecy::Secret};

pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {variable}: {reason}")]
    Invalid {
        variable: &'static str,
        reason: String,
    },
}

/// Resolved process configuration.
#[derive(Debug)]
pub struct Config {
    pub environment: Environment,
    /// 64-hex-char vault secret. `None` only in development, where the
    /// vault generates an ephemeral key and warns.
    pub encryption_key: Option<Secret<String>>,
    pub database_url: String,
    /// Queue backing store. `None` selects the in-process queue, which is
    /// only acceptable in development.
    pub redis_url: Option<String>,
    /// External URL prefix used to construct `webhookUrl` fields.
    pub api_base_url: String,
    pub port: u16,
}

impl Config {
    /// Load and validate configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`Config::from_env`] but with an injectable lookup, so tests
    /// never mutate process-global state.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let environment = Environment::parse_or_development(
            lookup("GRIDKIT_ENV").unwrap_or_default().trim(),
        );
        let strict = environment != Environment::Development;

        let encryption_key = match lookup("ENCRYPTION_KEY").filter(|v| !v.is_empty()) {
            Some(key) => {
                if key.len() != 64 || !key.chars().all(|c| c.is_ascii_hexdigit()) {
                    return Err(ConfigError::Invalid {
                        variable: "ENCRYPTION_KEY",
                        reason: "expected 64 hex characters (32 bytes)".into(),
                    });
                }
                Some(Secret::new(key))
            },
            // Refusing to start beats minting an ephemeral key that would
            // orphan every credential blob on restart.
            None if strict => return Err(ConfigError::Missing("ENCRYPTION_KEY")),
            None => None,
        };

        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let redis_url = lookup("REDIS_URL").filter(|v| !v.is_empty());
        if strict && redis_url.is_none() {
            return Err(ConfigError::Missing("REDIS_URL"));
        }

        let api_base_url = lookup("API_BASE_URL")
            .filter(|v| !v.is_empty())
            .map(|v| v.trim_end_matches('/').to_string())
            .ok_or(ConfigError::Missing("API_BASE_URL"))?;

        let port = match lookup("PORT").filter(|v| !v.is_empty()) {
            Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::Invalid {
                variable: "PORT",
                reason: e.to_string(),
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            environment,
            encryption_key,
            database_url,
            redis_url,
            api_base_url,
            port,
        })
    }

    /// URL a provider should deliver inbound callbacks to.
    #[must_use]
    pub fn webhook_url(&self, platform: &str, token: &str) -> String {
        format!("{}/webhooks/{platform}/{token}", self.api_base_url)
    }
}
