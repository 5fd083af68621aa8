//! Persistence layer for Gantry.
//!
//! Provides the key-value status store in two flavours: PostgreSQL for
//! multi-process deployments and an in-memory map for single-process runs.

pub mod error;
pub mod memory;
pub mod store;

pub use error::{DbError, DbResult};
pub use memory::MemoryStore;
pub use store::PgStore;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Create a new database connection pool.
pub async fn create_pool(database_url: &str) -> DbResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Run database migrations.
pub async fn run_migrations(pool: &PgPool) -> DbResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::debug!("Database migrations applied");
    Ok(())
}
