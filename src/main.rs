//! Libris Server - E-book Lending Library
//!
//! REST API server, cache and background job runner.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use libris_server::{
    api,
    config::{AppConfig, CacheBackend},
    jobs::{JobContext, JobRunner},
    repository::Repository,
    services::{
        cache::{Cache, MemoryCache},
        email::{Mailer, SmtpMailer},
        redis::RedisCache,
        Services,
    },
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_tracing(&config);

    tracing::info!("Starting Libris Server v{}", env!("CARGO_PKG_VERSION"));

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Connected to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    tracing::info!("Database migrations completed");

    let cache: Arc<dyn Cache> = match config.cache.backend {
        CacheBackend::Redis => {
            let redis = RedisCache::connect(&config.redis.url, &config.cache.namespace)
                .await
                .context("Failed to connect to Redis")?;
            tracing::info!("Connected to Redis");
            Arc::new(redis)
        }
        CacheBackend::Memory => {
            tracing::info!("Using in-process cache");
            Arc::new(MemoryCache::new())
        }
    };
    // Drop entries left by a previous run
    cache.clear().await.context("Failed to clear cache")?;

    let mailer: Arc<dyn Mailer> = Arc::new(SmtpMailer::new(config.email.clone()));

    let repository = Repository::new(pool);
    let services = Services::new(repository.clone(), &config, cache, mailer.clone());

    services
        .users
        .ensure_librarian(&config.seed)
        .await
        .context("Failed to seed librarian account")?;

    let jobs = JobRunner::start(JobContext::new(repository, mailer, &config), config.jobs.workers);
    let _schedules = jobs.start_schedules(&config);

    let addr = SocketAddr::new(
        config.server.host.parse().context("Invalid host address")?,
        config.server.port,
    );

    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
        jobs,
    };

    let app = api::router(state);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Install the global subscriber; returns the file writer guard when file logging is on
fn init_tracing(config: &AppConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("libris_server={},tower_http=debug", config.logging.level).into());

    let stdout = if config.logging.format == "json" {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    let (file, guard) = match &config.logging.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "libris-server.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout)
        .with(file)
        .init();

    guard
}
