//! # TCM Worker
//!
//! Runs the token sweeper against the API's database until Ctrl-C.
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgresql://localhost/tcm cargo run -p tcm-worker
//! ```

use anyhow::Context;
use tcm_shared::db::pool::{close_pool, create_pool, DatabaseConfig};
use tcm_worker::sweeper::{SweeperConfig, TokenSweeper};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tcm_worker=debug,tcm_shared=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("TCM Worker v{} starting...", env!("CARGO_PKG_VERSION"));

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL environment variable is required")?;
    let config = SweeperConfig::from_env()?;

    let pool = create_pool(DatabaseConfig::new(database_url).with_max_connections(2))
        .await
        .context("failed to connect to the database")?;

    let sweeper = TokenSweeper::new(pool.clone(), config);

    let shutdown = sweeper.shutdown_token();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
        tracing::info!("Shutdown signal received, stopping...");
        shutdown.cancel();
    });

    sweeper.run().await?;

    close_pool(pool).await;
    Ok(())
}
