/// Health check endpoint
///
/// Provides a simple health check endpoint that verifies:
/// - The server is running
/// - Database connectivity
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
///
/// # Response
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "database": "connected",
///   "pool": { "active": 1, "idle": 3, "total": 4 }
/// }
/// ```

use crate::app::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tcm_shared::db::pool::{get_pool_stats, health_check as database_health};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Application version
    pub version: String,

    /// Database status
    pub database: String,

    pub pool: PoolResponse,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PoolResponse {
    pub active: usize,
    pub idle: usize,
    pub total: usize,
}

/// Health check handler
///
/// Answers 200 when the database is reachable and 503 otherwise, so load
/// balancers can take a degraded instance out of rotation.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let connected = match database_health(&state.db).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Database health check failed");
            false
        }
    };

    let stats = get_pool_stats(&state.db);
    let status = if connected {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: if connected { "healthy" } else { "degraded" }.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: if connected { "connected" } else { "disconnected" }.to_string(),
            pool: PoolResponse {
                active: stats.active_connections,
                idle: stats.idle_connections,
                total: stats.total_connections,
            },
        }),
    )
}
