use std::sync::Arc;
use std::time::Duration;

use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use confbook_server::auth::ClaimIssuer;
use confbook_server::config::Config;
use confbook_server::middleware::RateLimiter;
use confbook_server::routes::create_routes;
use confbook_server::services::tickets::spawn_reconciler;
use confbook_server::state::AppState;
use confbook_server::store::PgStore;

const RATE_LIMIT_CLEANUP: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    let claims = ClaimIssuer::new(&config.jwt_secret)?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.tx_timeout)
        .connect(&config.database_url)
        .await?;

    tracing::info!("Successfully connected to database");

    sqlx::migrate!().run(&pool).await?;

    tracing::info!("Migrations run successfully");

    let state = AppState::new(Arc::new(PgStore::new(pool)), claims, config.tx_timeout);

    if let Some(interval) = config.reconcile_interval {
        spawn_reconciler(state.clone(), interval);
        tracing::info!(interval_secs = interval.as_secs(), "Ticket reconciler started");
    }

    let limiter = Arc::new(RateLimiter::new(config.rate_limit));
    Arc::clone(&limiter).spawn_cleanup(RATE_LIMIT_CLEANUP);

    let app = create_routes(state, limiter, &config.cors_allowed_origins, config.production);

    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Server running at http://{}", config.bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
