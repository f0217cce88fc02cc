//! Relational storage for sizing requests and results.
//!
//! The rest of the workspace talks to storage only through the
//! [`RowStore`](store::RowStore) trait. [`PgRowStore`](store::PgRowStore)
//! backs it with PostgreSQL; [`MemoryRowStore`](memory::MemoryRowStore)
//! keeps rows in process for dry runs and tests.

use sqlx::postgres::PgPoolOptions;

pub mod memory;
pub mod repositories;
pub mod row;
pub mod store;

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
}

/// Verify the pool can reach the database.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply the embedded migrations.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
