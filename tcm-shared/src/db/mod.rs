/// Database layer for TCM
///
/// This module provides connection pooling and the migration runner. Models
/// live in the `models` module at crate root level.
///
/// # Modules
///
/// - `pool`: PostgreSQL connection pool management with health checks
/// - `migrations`: embedded migration runner
///
/// # Example
///
/// ```no_run
/// use tcm_shared::db::pool::{create_pool, DatabaseConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = DatabaseConfig::new(std::env::var("DATABASE_URL")?);
///     let pool = create_pool(config).await?;
///     Ok(())
/// }
/// ```

pub mod pool;
pub mod migrations;
