//! # TCM API Server
//!
//! Serves the REST API under `/v1` plus `GET /health`.
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgresql://localhost/tcm JWT_SECRET=... cargo run -p tcm-api
//! ```
//!
//! Set `LOG_FORMAT=json` for JSON log lines; `RUST_LOG` overrides the filter.

use anyhow::Context;
use tcm_api::{
    app::{build_router, AppState},
    config::Config,
};
use tcm_shared::db::{
    migrations::run_migrations,
    pool::{close_pool, create_pool, DatabaseConfig},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    tracing::info!("TCM API Server v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    let pool = create_pool(
        DatabaseConfig::new(config.database.url.clone())
            .with_max_connections(config.database.max_connections),
    )
    .await
    .context("failed to connect to the database")?;

    run_migrations(&pool).await.context("failed to run migrations")?;

    let address = config.bind_address();
    let state = AppState::new(pool.clone(), config);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {}", address))?;

    tracing::info!("Server listening on http://{}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    close_pool(pool).await;
    tracing::info!("Server stopped");

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tcm_api=debug,tcm_shared=info,tower_http=debug".into());

    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received, draining connections...");
}
