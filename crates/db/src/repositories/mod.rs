//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod sizing_request_repo;
pub mod sizing_result_repo;

pub use sizing_request_repo::SizingRequestRepo;
pub use sizing_result_repo::SizingResultRepo;

use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::Postgres;
use valvesize_core::codec::StoredValue;

/// Bind one sparse value with the SQL type matching its kind.
pub(crate) fn bind_stored<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &'q StoredValue,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        StoredValue::Flag(b) => query.bind(*b),
        StoredValue::Decimal(x) => query.bind(*x),
        StoredValue::Text(s) => query.bind(s.as_str()),
    }
}
