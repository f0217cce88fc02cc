//! Repository for the `sizing_results` table.

use sqlx::PgPool;
use valvesize_core::codec::ResultSet;
use valvesize_core::work_key::WorkKey;

use super::bind_stored;
use crate::row::build_upsert_sql;
use crate::store::StoreError;

const TABLE: &str = "sizing_results";

/// Reads and writes sizing result rows.
pub struct SizingResultRepo;

impl SizingResultRepo {
    /// Insert or update the result row for `key`.
    ///
    /// Columns missing from `result` keep whatever a previous run wrote.
    pub async fn upsert(
        pool: &PgPool,
        key: &WorkKey,
        result: &ResultSet,
    ) -> Result<(), StoreError> {
        let row = result.as_row();
        let columns: Vec<&str> = row.keys().map(String::as_str).collect();
        let sql = build_upsert_sql(TABLE, &columns)?;

        let mut query = sqlx::query(&sql)
            .bind(key.request_id())
            .bind(key.sheet_id());
        for value in row.values() {
            query = bind_stored(query, value);
        }

        let done = query.execute(pool).await?;
        tracing::debug!(
            work_key = %key,
            columns = columns.len(),
            rows_affected = done.rows_affected(),
            "Sizing result upserted",
        );
        Ok(())
    }
}
