//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use paywall::db::DatabaseConfig;
use std::net::SocketAddr;
use std::str::FromStr;

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Storage backend
    pub storage: StorageMode,
    /// Database configuration (used when `storage` is `Postgres`)
    pub database: DatabaseConfig,
    /// Security configuration
    pub security: SecurityConfig,
    /// Per-IP request limits
    pub rate_limit: RateLimitConfig,
    /// Points credited on registration
    pub register_reward: i64,
    /// Prometheus exporter address; disabled when unset
    pub metrics_bind: Option<SocketAddr>,
    /// Administrator account created or promoted on startup
    pub admin: Option<AdminBootstrap>,
}

/// Where users, ledger and orders live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    Postgres,
    Memory,
}

impl FromStr for StorageMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(StorageMode::Postgres),
            "memory" | "mem" => Ok(StorageMode::Memory),
            other => Err(format!("unknown storage '{other}'")),
        }
    }
}

/// Security-related configuration
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// JWT signing secret (required)
    pub jwt_secret: String,
    /// Password hashing pepper (required)
    pub password_pepper: String,
}

/// Sliding-window limits applied per client IP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub per_second: usize,
    pub per_minute: usize,
    /// Key clients by `x-forwarded-for` instead of the socket peer. Only
    /// enable behind a reverse proxy that sets the header.
    pub trust_forwarded_for: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_second: 20,
            per_minute: 300,
            trust_forwarded_for: false,
        }
    }
}

/// Credentials of the bootstrap administrator
#[derive(Debug, Clone)]
pub struct AdminBootstrap {
    pub username: String,
    pub password: String,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `bind_override` - Optional bind address override (from CLI args)
    /// * `database_url_override` - Optional database URL override (from CLI args)
    /// * `storage_override` - Optional storage mode override (from CLI args)
    ///
    /// # Errors
    ///
    /// Returns error if required variables are missing or invalid
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
        storage_override: Option<StorageMode>,
    ) -> Result<Self, ConfigError> {
        let bind = match bind_override {
            Some(bind) => bind,
            None => parse_env_required_format("SERVER_BIND", "127.0.0.1:8000")?,
        };

        let storage = match storage_override {
            Some(storage) => storage,
            None => std::env::var("STORAGE")
                .ok()
                .map(|raw| {
                    raw.parse().map_err(|reason| ConfigError::Invalid {
                        var: "STORAGE".to_string(),
                        reason,
                    })
                })
                .transpose()?
                .unwrap_or(StorageMode::Postgres),
        };

        let database_url = database_url_override
            .or_else(|| std::env::var("DATABASE_URL").ok())
            .unwrap_or_else(|| DatabaseConfig::development().database_url);

        let database = DatabaseConfig {
            database_url,
            max_connections: parse_env_or("DB_MAX_CONNECTIONS", 20),
            min_connections: parse_env_or("DB_MIN_CONNECTIONS", 2),
            connection_timeout_secs: parse_env_or("DB_CONNECTION_TIMEOUT_SECS", 10),
            idle_timeout_secs: parse_env_or("DB_IDLE_TIMEOUT_SECS", 600),
            max_lifetime_secs: parse_env_or("DB_MAX_LIFETIME_SECS", 1800),
        };

        // Security configuration (REQUIRED)
        let jwt_secret = std::env::var("JWT_SECRET").map_err(|_| ConfigError::MissingRequired {
            var: "JWT_SECRET".to_string(),
            hint: "Generate with: openssl rand -hex 32".to_string(),
        })?;

        let password_pepper =
            std::env::var("PASSWORD_PEPPER").map_err(|_| ConfigError::MissingRequired {
                var: "PASSWORD_PEPPER".to_string(),
                hint: "Generate with: openssl rand -hex 16".to_string(),
            })?;

        let metrics_bind = std::env::var("METRICS_BIND")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(|v| {
                v.parse().map_err(|_| ConfigError::Invalid {
                    var: "METRICS_BIND".to_string(),
                    reason: format!("'{v}' is not a socket address"),
                })
            })
            .transpose()?;

        let admin = match (std::env::var("ADMIN_USERNAME"), std::env::var("ADMIN_PASSWORD")) {
            (Ok(username), Ok(password)) => Some(AdminBootstrap { username, password }),
            _ => None,
        };

        let config = ServerConfig {
            bind,
            storage,
            database,
            security: SecurityConfig {
                jwt_secret,
                password_pepper,
            },
            rate_limit: RateLimitConfig {
                per_second: parse_env_or("RATE_LIMIT_PER_SECOND", 20),
                per_minute: parse_env_or("RATE_LIMIT_PER_MINUTE", 300),
                trust_forwarded_for: parse_env_or("RATE_LIMIT_TRUST_PROXY", false),
            },
            register_reward: parse_env_or(
                "REGISTER_REWARD_POINTS",
                paywall::auth::DEFAULT_REGISTER_REWARD,
            ),
            metrics_bind,
            admin,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.security.jwt_secret.len() < 32 {
            return Err(ConfigError::Invalid {
                var: "JWT_SECRET".to_string(),
                reason: "Must be at least 32 characters (128-bit security)".to_string(),
            });
        }

        if self.security.password_pepper.len() < 16 {
            return Err(ConfigError::Invalid {
                var: "PASSWORD_PEPPER".to_string(),
                reason: "Must be at least 16 characters (64-bit security)".to_string(),
            });
        }

        if self.register_reward < 0 {
            return Err(ConfigError::Invalid {
                var: "REGISTER_REWARD_POINTS".to_string(),
                reason: "Must not be negative".to_string(),
            });
        }

        if self.rate_limit.per_second == 0 || self.rate_limit.per_minute == 0 {
            return Err(ConfigError::Invalid {
                var: "RATE_LIMIT_PER_SECOND / RATE_LIMIT_PER_MINUTE".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.rate_limit.per_second > self.rate_limit.per_minute {
            return Err(ConfigError::Invalid {
                var: "RATE_LIMIT_PER_SECOND".to_string(),
                reason: format!(
                    "Cannot exceed the per-minute limit ({})",
                    self.rate_limit.per_minute
                ),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parse a variable that must be well-formed when present
fn parse_env_required_format<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
{
    let raw = std::env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse().map_err(|_| ConfigError::Invalid {
        var: key.to_string(),
        reason: format!("'{raw}' could not be parsed"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ServerConfig {
        ServerConfig {
            bind: "127.0.0.1:8000".parse().unwrap(),
            storage: StorageMode::Memory,
            database: DatabaseConfig::with_url("test"),
            security: SecurityConfig {
                jwt_secret: "a".repeat(32),
                password_pepper: "a".repeat(16),
            },
            rate_limit: RateLimitConfig::default(),
            register_reward: 100,
            metrics_bind: None,
            admin: None,
        }
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingRequired {
            var: "JWT_SECRET".to_string(),
            hint: "Use openssl".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("JWT_SECRET"));
        assert!(msg.contains("Use openssl"));
    }

    #[test]
    fn test_valid_config() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_short_jwt_secret_rejected() {
        let mut config = config();
        config.security.jwt_secret = "short".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { var, .. }) if var == "JWT_SECRET"));
    }

    #[test]
    fn test_negative_reward_rejected() {
        let mut config = config();
        config.register_reward = -1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rate_limits_must_be_consistent() {
        let mut config = config();
        config.rate_limit = RateLimitConfig {
            per_second: 500,
            per_minute: 300,
            ..RateLimitConfig::default()
        };
        assert!(config.validate().is_err());

        config.rate_limit.per_second = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_storage_mode_parse() {
        assert_eq!("memory".parse(), Ok(StorageMode::Memory));
        assert_eq!("Postgres".parse(), Ok(StorageMode::Postgres));
        assert!("redis".parse::<StorageMode>().is_err());
    }
}
