//! Paywall server: points, paid resources and moderated recharge orders.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Error};
use paywall::{
    auth::AuthManager,
    db::{Database, MemoryStore, PgStore, Store},
};
use pico_args::Arguments;
use pw_server::{
    api::{self, AppState},
    config::{ServerConfig, StorageMode},
    logging, metrics,
};
use tracing::{info, warn};

const HELP: &str = "\
Run the paywall server

USAGE:
  pw_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:8000]
  --db-url     URL         Database connection string  [default: env DATABASE_URL]
  --storage    KIND        postgres | memory           [default: env STORAGE or postgres]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8080)
  DATABASE_URL             PostgreSQL connection string
  JWT_SECRET               JWT signing secret (required, >= 32 chars)
  PASSWORD_PEPPER          Password hashing pepper (required, >= 16 chars)
  REGISTER_REWARD_POINTS   Points credited on registration [default: 100]
  RATE_LIMIT_PER_SECOND    Per-IP burst limit [default: 20]
  RATE_LIMIT_PER_MINUTE    Per-IP sustained limit [default: 300]
  METRICS_BIND             Prometheus exporter address (optional)
  ADMIN_USERNAME           Administrator created or promoted on startup (optional)
  ADMIN_PASSWORD           Password for ADMIN_USERNAME
  (See .env file for all configuration options)
";

/// Interval between sweeps of idle rate limiter entries
const RATE_LIMIT_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let bind: Option<SocketAddr> = pargs.opt_value_from_str("--bind")?;
    let database_url: Option<String> = pargs.opt_value_from_str("--db-url")?;
    let storage: Option<StorageMode> = pargs.opt_value_from_str("--storage")?;

    logging::init();

    let config = ServerConfig::from_env(bind, database_url, storage)?;

    if let Some(addr) = config.metrics_bind {
        metrics::init_metrics(addr).map_err(|e| anyhow::anyhow!(e))?;
        info!("Prometheus metrics exposed at http://{}/metrics", addr);
    }

    let state = match config.storage {
        StorageMode::Postgres => {
            info!("Connecting to database");
            let db = Database::new(&config.database)
                .await
                .context("Failed to connect to database")?;
            db.migrate().await.context("Failed to run migrations")?;
            info!("Database connected and migrated");
            build_state(Arc::new(PgStore::new(Arc::new(db.pool().clone()))), &config)
        }
        StorageMode::Memory => {
            warn!("Using in-memory storage; all data is lost on shutdown");
            build_state(Arc::new(MemoryStore::new()), &config)
        }
    };

    if let Some(admin) = &config.admin {
        bootstrap_admin(&state.auth_manager, &admin.username, &admin.password).await?;
    }

    let limiter = state.rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(RATE_LIMIT_CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            let removed = limiter.cleanup().await;
            if removed > 0 {
                tracing::debug!("Dropped {} idle rate limiter entries", removed);
            }
        }
    });

    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Shutting down server...");

    Ok(())
}

fn build_state<S: Store + 'static>(store: Arc<S>, config: &ServerConfig) -> AppState {
    AppState::new(
        store,
        config.security.password_pepper.clone(),
        config.security.jwt_secret.clone(),
        config.register_reward,
        config.rate_limit,
    )
}

async fn bootstrap_admin(auth: &AuthManager, username: &str, password: &str) -> Result<(), Error> {
    let admin = auth
        .ensure_admin(username, password)
        .await
        .with_context(|| format!("Failed to bootstrap administrator '{username}'"))?;
    info!("Administrator '{}' ready (id {})", admin.username, admin.id);
    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", err);
        std::future::pending::<()>().await;
    }
}
