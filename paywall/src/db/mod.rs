//! Storage: PostgreSQL connection pooling and the repository implementations.
//!
//! Managers depend only on the traits in [`repository`]. Two stores
//! implement all of them:
//!
//! - [`PgStore`]: PostgreSQL via sqlx; every money-moving operation runs in a
//!   single database transaction with the user row locked.
//! - [`MemoryStore`]: in-process store used by tests and the `memory`
//!   storage mode of the server; one mutex serialises each operation.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

pub mod config;
pub mod memory;
pub mod postgres;
pub mod repository;

pub use config::DatabaseConfig;
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use repository::{
    HealthCheck, LedgerRepository, RechargeRepository, ResourceRepository, Store, UserRepository,
};

/// Database connection pool wrapper
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use paywall::db::{Database, DatabaseConfig};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), sqlx::Error> {
    ///     let db = Database::new(&DatabaseConfig::with_url("postgres://localhost/paywall")).await?;
    ///     db.migrate().await?;
    ///     Ok(())
    /// }
    /// ```
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending migrations from `paywall/migrations`
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Check if the database connection is healthy
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Close the database connection pool
    pub async fn close(self) {
        self.pool.close().await;
    }
}
