use std::net::SocketAddr;
use std::time::Duration;
use zeroize::Zeroizing;

use crate::auth::{DEFAULT_TOKEN_TTL, MIN_SECRET_LENGTH};
use crate::domain::services::settlement::DEFAULT_SETTLEMENT_DELAY;
use crate::persistence::DatabaseConfig;

/// Longest accepted token or cache lifetime (30 days)
pub const MAX_TTL_SECONDS: u64 = 30 * 24 * 60 * 60;

fn valid_ttl(secs: &u64) -> bool {
    (1..=MAX_TTL_SECONDS).contains(secs)
}

/// Startup configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("JWT_SECRET environment variable is not set")]
    MissingSecret,

    #[error("JWT_SECRET must be at least {min} bytes (found {found})")]
    WeakSecret { min: usize, found: usize },

    #[error("Invalid BIND_ADDRESS '{0}'")]
    InvalidBindAddress(String),
}

/// Configuration for the ledger server
#[derive(Clone)]
pub struct ServerConfig {
    pub bind_address: SocketAddr,
    pub jwt_secret: Zeroizing<String>,
    pub token_ttl: Duration,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    pub settlement_delay: Duration,
    pub rate_limit_per_minute: u32,
    pub max_body_bytes: usize,
    pub password_hash_cost: u32,
    pub database: DatabaseConfig,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_address", &self.bind_address)
            .field("jwt_secret", &"<redacted>")
            .field("token_ttl", &self.token_ttl)
            .field("cache_ttl", &self.cache_ttl)
            .field("cache_capacity", &self.cache_capacity)
            .field("settlement_delay", &self.settlement_delay)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("password_hash_cost", &self.password_hash_cost)
            .field("database", &self.database)
            .finish()
    }
}

impl ServerConfig {
    /// Defaults for everything except the signing secret
    pub fn with_secret(secret: impl Into<String>) -> Self {
        ServerConfig {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 3000)),
            jwt_secret: Zeroizing::new(secret.into()),
            token_ttl: DEFAULT_TOKEN_TTL,
            cache_ttl: Duration::from_secs(300),
            cache_capacity: 1024,
            settlement_delay: DEFAULT_SETTLEMENT_DELAY,
            rate_limit_per_minute: 600,
            max_body_bytes: 64 * 1024,
            password_hash_cost: bcrypt::DEFAULT_COST,
            database: DatabaseConfig::default(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Fails when `JWT_SECRET` is missing or too short; every other setting
    /// falls back to its default with a warning when unparseable.
    pub fn from_env() -> Result<ServerConfig, ConfigError> {
        let secret = std::env::var("JWT_SECRET").map_err(|_| ConfigError::MissingSecret)?;
        if secret.len() < MIN_SECRET_LENGTH {
            return Err(ConfigError::WeakSecret {
                min: MIN_SECRET_LENGTH,
                found: secret.len(),
            });
        }

        let mut config = ServerConfig::with_secret(secret);

        if let Ok(addr) = std::env::var("BIND_ADDRESS") {
            config.bind_address = addr
                .parse()
                .map_err(|_| ConfigError::InvalidBindAddress(addr.clone()))?;
        }

        if let Some(secs) = parse_env::<u64>("TOKEN_TTL_SECONDS", valid_ttl) {
            config.token_ttl = Duration::from_secs(secs);
        }

        if let Some(secs) = parse_env::<u64>("CACHE_TTL_SECONDS", valid_ttl) {
            config.cache_ttl = Duration::from_secs(secs);
        }

        if let Some(capacity) = parse_env::<usize>("CACHE_CAPACITY", |v| *v > 0) {
            config.cache_capacity = capacity;
        }

        if let Some(ms) = parse_env::<u64>("SETTLEMENT_DELAY_MS", |_| true) {
            config.settlement_delay = Duration::from_millis(ms);
        }

        if let Some(limit) = parse_env::<u32>("RATE_LIMIT_PER_MINUTE", |v| *v > 0) {
            config.rate_limit_per_minute = limit;
        }

        if let Some(bytes) = parse_env::<usize>("MAX_BODY_BYTES", |v| *v >= 1024) {
            config.max_body_bytes = bytes;
        }

        // bcrypt accepts costs 4 through 31
        if let Some(cost) = parse_env::<u32>("PASSWORD_HASH_COST", |v| (4..=31).contains(v)) {
            config.password_hash_cost = cost;
        }

        config.database = DatabaseConfig::from_env();

        Ok(config)
    }
}

fn parse_env<T>(name: &str, accept: impl Fn(&T) -> bool) -> Option<T>
where
    T: std::str::FromStr + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(name).ok()?;
    match raw.parse::<T>() {
        Ok(value) if accept(&value) => Some(value),
        Ok(value) => {
            tracing::warn!("Out-of-range {} value: {}, using default", name, value);
            None
        }
        Err(e) => {
            tracing::warn!("Failed to parse {} '{}': {}, using default", name, raw, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::with_secret("0123456789abcdef");
        assert_eq!(config.bind_address.to_string(), "127.0.0.1:3000");
        assert_eq!(config.token_ttl, Duration::from_secs(3600));
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.settlement_delay, Duration::from_secs(10));
        assert_eq!(config.max_body_bytes, 65536);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = ServerConfig::with_secret("super-secret-signing-key");
        assert!(!format!("{:?}", config).contains("super-secret-signing-key"));
    }

    #[test]
    fn test_parse_env_rejects_out_of_range() {
        std::env::set_var("TRADELEDGER_TEST_CAPACITY", "0");
        assert_eq!(parse_env::<usize>("TRADELEDGER_TEST_CAPACITY", |v| *v > 0), None);

        std::env::set_var("TRADELEDGER_TEST_CAPACITY", "not-a-number");
        assert_eq!(parse_env::<usize>("TRADELEDGER_TEST_CAPACITY", |v| *v > 0), None);

        std::env::set_var("TRADELEDGER_TEST_CAPACITY", "32");
        assert_eq!(parse_env::<usize>("TRADELEDGER_TEST_CAPACITY", |v| *v > 0), Some(32));
        std::env::remove_var("TRADELEDGER_TEST_CAPACITY");
    }

    #[test]
    fn test_ttl_overflowing_expiry_math_is_rejected() {
        std::env::set_var("TRADELEDGER_TEST_TTL", u64::MAX.to_string());
        assert_eq!(parse_env::<u64>("TRADELEDGER_TEST_TTL", valid_ttl), None);

        std::env::set_var("TRADELEDGER_TEST_TTL", (MAX_TTL_SECONDS + 1).to_string());
        assert_eq!(parse_env::<u64>("TRADELEDGER_TEST_TTL", valid_ttl), None);

        std::env::set_var("TRADELEDGER_TEST_TTL", "0");
        assert_eq!(parse_env::<u64>("TRADELEDGER_TEST_TTL", valid_ttl), None);

        std::env::set_var("TRADELEDGER_TEST_TTL", MAX_TTL_SECONDS.to_string());
        assert_eq!(
            parse_env::<u64>("TRADELEDGER_TEST_TTL", valid_ttl),
            Some(MAX_TTL_SECONDS)
        );
        std::env::remove_var("TRADELEDGER_TEST_TTL");
    }
}
