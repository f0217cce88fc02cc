//! Schema-agnostic row mapping.
//!
//! Rows are read with `SELECT *` and turned into a [`SparseRow`] by
//! column type, and writes are built from whatever columns a sparse row
//! carries. Column names always come from the static field list or from a
//! caller-supplied map, so every name is checked with
//! [`is_safe_identifier`] before it is spliced into SQL.

use sqlx::postgres::PgRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};
use valvesize_core::codec::{SparseRow, StoredValue};

use crate::store::StoreError;

/// Key columns shared by both sizing tables.
pub const KEY_COLUMNS: [&str; 2] = ["request_id", "sheet_id"];

/// Bookkeeping columns that never participate in encoding.
const BOOKKEEPING_COLUMNS: [&str; 2] = ["created_at", "updated_at"];

/// Lower-case ASCII letters, digits and underscores, not starting with a digit.
pub fn is_safe_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Convert a fetched row into a sparse map.
///
/// NULL columns are left out. Key and bookkeeping columns are skipped.
/// Columns of types the codec has no scalar kind for are skipped with a
/// debug log rather than failing the whole fetch.
pub fn to_sparse_row(row: &PgRow) -> Result<SparseRow, sqlx::Error> {
    let mut out = SparseRow::new();

    for column in row.columns() {
        let name = column.name();
        if KEY_COLUMNS.contains(&name) || BOOKKEEPING_COLUMNS.contains(&name) {
            continue;
        }

        let idx = column.ordinal();
        if row.try_get_raw(idx)?.is_null() {
            continue;
        }

        let value = match column.type_info().name() {
            "BOOL" => StoredValue::Flag(row.try_get::<bool, _>(idx)?),
            "INT2" => StoredValue::Decimal(f64::from(row.try_get::<i16, _>(idx)?)),
            "INT4" => StoredValue::Decimal(f64::from(row.try_get::<i32, _>(idx)?)),
            "INT8" => StoredValue::Decimal(row.try_get::<i64, _>(idx)? as f64),
            "FLOAT4" => StoredValue::Decimal(f64::from(row.try_get::<f32, _>(idx)?)),
            "FLOAT8" => StoredValue::Decimal(row.try_get::<f64, _>(idx)?),
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
                StoredValue::Text(row.try_get::<String, _>(idx)?)
            }
            other => {
                tracing::debug!(
                    column = name,
                    pg_type = other,
                    "Skipping column of unsupported type",
                );
                continue;
            }
        };

        out.insert(name.to_string(), value);
    }

    Ok(out)
}

/// Build an insert-or-update statement keyed by `(request_id, sheet_id)`.
///
/// Placeholders `$1` and `$2` are the key; `$3..` follow `columns` in
/// order. On conflict every listed column is overwritten and
/// `updated_at` is refreshed; unlisted columns keep their values.
pub fn build_upsert_sql(table: &str, columns: &[&str]) -> Result<String, StoreError> {
    if !is_safe_identifier(table) {
        return Err(StoreError::InvalidColumn(table.to_string()));
    }
    if let Some(bad) = columns.iter().find(|c| {
        let c: &str = c;
        !is_safe_identifier(c) || KEY_COLUMNS.contains(&c) || BOOKKEEPING_COLUMNS.contains(&c)
    }) {
        return Err(StoreError::InvalidColumn(bad.to_string()));
    }

    let mut insert_cols = KEY_COLUMNS.to_vec();
    insert_cols.extend_from_slice(columns);

    let placeholders: Vec<String> = (1..=insert_cols.len()).map(|i| format!("${i}")).collect();

    let mut updates: Vec<String> = columns
        .iter()
        .map(|c| format!("{c} = EXCLUDED.{c}"))
        .collect();
    updates.push("updated_at = NOW()".to_string());

    Ok(format!(
        "INSERT INTO {table} ({}) VALUES ({}) \
         ON CONFLICT (request_id, sheet_id) DO UPDATE SET {}",
        insert_cols.join(", "),
        placeholders.join(", "),
        updates.join(", ")
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
