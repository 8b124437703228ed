//! Dynamic row decoding.
//!
//! Result sets have no compile-time shape: select lists are assembled at
//! runtime from schemas, joins and raw fragments. Each cell is decoded
//! by the engine's declared value type rather than through a typed
//! `FromRow` implementation.

use quarry_core::SqlValue;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};

use crate::error::Result;

/// Decodes every cell of a row into `(column_name, SqlValue)` pairs, in
/// select-list order.
pub(crate) fn decode_row(row: &SqliteRow) -> Result<Vec<(String, SqlValue)>> {
    let mut out = Vec::with_capacity(row.columns().len());
    for (i, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(i)?;
        let value = if raw.is_null() {
            SqlValue::Null
        } else {
            match raw.type_info().name() {
                "INTEGER" => SqlValue::Int(row.try_get(i)?),
                "REAL" => SqlValue::Float(row.try_get(i)?),
                "BLOB" => SqlValue::Blob(row.try_get(i)?),
                _ => SqlValue::Text(row.try_get(i)?),
            }
        };
        out.push((String::from(column.name()), value));
    }
    Ok(out)
}

/// Binds one decoded value to a query. The engine API is positional;
/// callers bind in the order [`quarry_core::Params::reindex`] emitted.
pub(crate) fn bind_value<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>>,
    value: SqlValue,
) -> sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>> {
    match value {
        SqlValue::Null => query.bind(Option::<i64>::None),
        SqlValue::Bool(b) => query.bind(b),
        SqlValue::Int(n) => query.bind(n),
        SqlValue::Float(f) => query.bind(f),
        SqlValue::Text(s) => query.bind(s),
        SqlValue::Blob(b) => query.bind(b),
    }
}
