use session_service::cache::{RedisSessionCache, SessionStore};
use session_service::config::Config;
use session_service::observability::metrics::init_metrics_recorder;
use session_service::repositories::{PgUserRepository, UserRepository};
use session_service::routes::{self, AppState};
use session_service::services::{RefreshRotator, TokenIssuer};
use session_service::tasks::DetachedTasks;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("Starting session service");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        access_token_ttl_seconds = config.access_token_ttl.as_secs(),
        refresh_token_ttl_seconds = config.refresh_token_ttl.as_secs(),
        user_cache_ttl_seconds = config.user_cache_ttl.as_secs(),
        rotation_mode = %config.rotation_mode,
        "Configuration loaded successfully"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        e
    })?;

    info!("Connecting to database...");
    let db_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .map_err(|e| {
            error!("Failed to connect to database: {}", e);
            e
        })?;

    sqlx::migrate!("../../migrations")
        .run(&db_pool)
        .await
        .map_err(|e| {
            error!("Failed to run database migrations: {}", e);
            e
        })?;

    info!("Database connection established");

    info!("Connecting to Redis...");
    let cache = RedisSessionCache::connect(&config.redis_url)
        .await
        .map_err(|e| {
            error!("Failed to connect to Redis: {}", e);
            e
        })?;

    info!("Redis connection established");

    let tasks = DetachedTasks::new(config.background_task_timeout);
    let sessions = SessionStore::new(
        Arc::new(cache),
        config.refresh_token_ttl,
        config.user_cache_ttl,
    );
    let users: Arc<dyn UserRepository> = Arc::new(PgUserRepository::new(db_pool));
    let issuer = Arc::new(TokenIssuer::new(
        config.jwt_secret.clone(),
        config.access_token_ttl,
        sessions.clone(),
        tasks.clone(),
    ));
    let rotator = Arc::new(RefreshRotator::new(
        issuer.clone(),
        sessions.clone(),
        users.clone(),
        tasks.clone(),
        config.rotation_mode,
    ));

    let bind_address = config.bind_address.clone();
    let shutdown_timeout = config.shutdown_timeout;

    let state = Arc::new(AppState {
        issuer,
        rotator,
        users,
        sessions,
        config,
    });

    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Session service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(
        in_flight = tasks.in_flight(),
        "Server stopped, draining background tasks"
    );
    tasks.drain(shutdown_timeout).await;

    info!("Session service shutdown complete");

    Ok(())
}

/// JSON output with `LOG_FORMAT=json`, human-readable otherwise.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "session_service=debug,tower_http=debug".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json");

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
