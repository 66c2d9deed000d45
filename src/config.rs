use std::env;

/// Typed configuration loaded from environment variables at startup.
#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    /// Bound on queued best-effort side effects; overflow drops with a warning.
    pub side_effect_queue_depth: usize,
    /// Per-request timeout. Must stay well under the ledger stale window.
    pub request_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            port: parse_env("PORT", "3000")?,
            database_url: require_env("DATABASE_URL")?,
            stripe_secret_key: require_env("STRIPE_SECRET_KEY")?,
            stripe_webhook_secret: require_env("STRIPE_WEBHOOK_SECRET")?,
            side_effect_queue_depth: parse_env("SIDE_EFFECT_QUEUE_DEPTH", "256")?,
            request_timeout_secs: parse_env("REQUEST_TIMEOUT_SECS", "30")?,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(String),
    #[error("invalid value for environment variable {var}: {source}")]
    InvalidValue {
        var: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVar(key.to_owned()))
}

fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = env::var(key).unwrap_or_else(|_| default.to_owned());
    raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        var: key.to_owned(),
        source: Box::new(e),
    })
}
