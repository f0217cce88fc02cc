//! The row-store seam between the calculation driver and storage.

use async_trait::async_trait;
use sqlx::PgPool;
use valvesize_core::codec::{ResultSet, SparseRow};
use valvesize_core::work_key::WorkKey;

use crate::repositories::{SizingRequestRepo, SizingResultRepo};

/// Errors surfaced by a [`RowStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A database query failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A column or table name failed identifier validation.
    #[error("Invalid column name: {0}")]
    InvalidColumn(String),

    /// The store refused the operation (used by the in-memory store).
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Keyed access to sizing requests and results.
///
/// Implementations must be safe to share across tasks.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Load the request row for `key`; an unknown key yields an empty map.
    async fn fetch_row(&self, key: &WorkKey) -> Result<SparseRow, StoreError>;

    /// Insert or update the result row for `key`. Not retried on failure.
    async fn upsert_result(&self, key: &WorkKey, result: &ResultSet) -> Result<(), StoreError>;

    /// Insert or update request columns ahead of a submission.
    async fn upsert_request(&self, key: &WorkKey, fields: &SparseRow) -> Result<(), StoreError>;
}

/// [`RowStore`] backed by PostgreSQL.
#[derive(Clone)]
pub struct PgRowStore {
    pool: PgPool,
}

impl PgRowStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RowStore for PgRowStore {
    async fn fetch_row(&self, key: &WorkKey) -> Result<SparseRow, StoreError> {
        SizingRequestRepo::fetch_row(&self.pool, key).await
    }

    async fn upsert_result(&self, key: &WorkKey, result: &ResultSet) -> Result<(), StoreError> {
        SizingResultRepo::upsert(&self.pool, key, result).await
    }

    async fn upsert_request(&self, key: &WorkKey, fields: &SparseRow) -> Result<(), StoreError> {
        SizingRequestRepo::upsert_fields(&self.pool, key, fields).await
    }
}
