//! Database configuration module.

/// Database configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub database_url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Connection timeout in seconds
    pub connection_timeout_secs: u64,

    /// Idle connection timeout in seconds
    pub idle_timeout_secs: u64,

    /// Maximum connection lifetime in seconds
    pub max_lifetime_secs: u64,
}

impl DatabaseConfig {
    /// Default pool settings for `database_url`
    pub fn with_url(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Self::development()
        }
    }

    /// Configuration for local development
    ///
    /// Uses `postgres://postgres@localhost/paywall` as the database URL
    pub fn development() -> Self {
        Self {
            database_url: "postgres://postgres@localhost/paywall".to_string(),
            max_connections: 20,
            min_connections: 2,
            connection_timeout_secs: 10,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::development()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_url_keeps_pool_defaults() {
        let config = DatabaseConfig::with_url("postgres://u@db/x");
        assert_eq!(config.database_url, "postgres://u@db/x");
        assert_eq!(config.max_connections, DatabaseConfig::default().max_connections);
    }
}
