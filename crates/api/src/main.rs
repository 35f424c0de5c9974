use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use assetflow_api::background;
use assetflow_api::config::ServerConfig;
use assetflow_api::router::build_app_router;
use assetflow_api::state::AppState;
use assetflow_db::DbPool;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = ServerConfig::from_env();
    init_tracing(config.log_json);
    tracing::info!(
        host = %config.host,
        port = config.port,
        scheduler_host = %config.scheduler.host,
        retry_limit = config.scheduler.task_retry_limit,
        analyst_timeout_secs = config.scheduler.analyst_timeout_secs,
        "Loaded server configuration"
    );

    let pool = connect_database().await;

    let cancel = CancellationToken::new();
    let loops = background::spawn_all(&pool, &config.scheduler, &cancel);
    tracing::info!(loops = loops.len(), "Background maintenance started");

    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
    };
    serve(build_app_router(state, &config), &config).await;

    tracing::info!("Server drained, stopping background maintenance");
    cancel.cancel();
    stop_loops(loops, Duration::from_secs(config.shutdown_timeout_secs)).await;
    tracing::info!("Shutdown complete");
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "assetflow_api=debug,assetflow_pipeline=debug,tower_http=debug".into()
    });
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Connect, verify and migrate. Any failure stops startup.
async fn connect_database() -> DbPool {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = assetflow_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    assetflow_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    assetflow_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Database ready, migrations applied");
    pool
}

async fn serve(app: Router, config: &ServerConfig) {
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");
    tracing::info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

/// Wait for every loop to observe cancellation, up to `timeout`.
async fn stop_loops(loops: Vec<JoinHandle<()>>, timeout: Duration) {
    let results = tokio::time::timeout(timeout, futures::future::join_all(loops)).await;
    match results {
        Ok(results) => {
            for err in results.into_iter().filter_map(Result::err) {
                tracing::error!(error = %err, "Background loop ended abnormally");
            }
        }
        Err(_) => tracing::warn!(?timeout, "Background loops did not stop in time"),
    }
}

/// Resolves on SIGINT, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("SIGINT received, shutting down"),
        () = terminate => tracing::info!("SIGTERM received, shutting down"),
    }
}
