//! Repository for the `sizing_requests` table.

use sqlx::PgPool;
use valvesize_core::codec::SparseRow;
use valvesize_core::work_key::WorkKey;

use super::bind_stored;
use crate::row::{build_upsert_sql, to_sparse_row};
use crate::store::StoreError;

const TABLE: &str = "sizing_requests";

/// Reads and writes sizing request rows.
pub struct SizingRequestRepo;

impl SizingRequestRepo {
    /// Fetch one request row as a sparse map.
    ///
    /// An unknown key yields an empty map, not an error.
    pub async fn fetch_row(pool: &PgPool, key: &WorkKey) -> Result<SparseRow, StoreError> {
        let sql = "SELECT * FROM sizing_requests WHERE request_id = $1 AND sheet_id = $2";
        let row = sqlx::query(sql)
            .bind(key.request_id())
            .bind(key.sheet_id())
            .fetch_optional(pool)
            .await?;

        match row {
            Some(row) => Ok(to_sparse_row(&row)?),
            None => Ok(SparseRow::new()),
        }
    }

    /// Insert or update the given request columns.
    pub async fn upsert_fields(
        pool: &PgPool,
        key: &WorkKey,
        fields: &SparseRow,
    ) -> Result<(), StoreError> {
        let columns: Vec<&str> = fields.keys().map(String::as_str).collect();
        let sql = build_upsert_sql(TABLE, &columns)?;

        let mut query = sqlx::query(&sql)
            .bind(key.request_id())
            .bind(key.sheet_id());
        for value in fields.values() {
            query = bind_stored(query, value);
        }

        query.execute(pool).await?;
        Ok(())
    }
}
