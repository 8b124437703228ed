//! Bidirectional value transforms between logical and stored form.
//!
//! Every extended column type carries a get/set pair; per-column custom
//! transforms from the schema take precedence, with only the missing
//! half falling back to the type default. Columns the schema does not
//! know keep their values untouched.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value as Json};

use crate::error::{CoreError, Result};
use crate::schema::{ColumnType, TableSchema};
use crate::value::{date_from_millis, Arg, SqlValue};

/// Delimiter for stored string arrays. A non-printable control character
/// so that containment LIKEs cannot false-positive on ordinary text;
/// user data containing `\x1f` itself is explicitly unsupported.
pub const STR_ARRAY_SENTINEL: char = '\u{1f}';

/// Applies the set-transform for `column`, lowering a logical value to
/// its stored representation.
///
/// # Errors
///
/// `CoreError::Transform` when a custom transform rejects the value.
pub fn set_value(schema: &TableSchema, column: &str, value: Arg) -> Result<SqlValue> {
    if let Some(prop) = schema.prop(column) {
        if let Some(custom) = prop.transform.as_ref().and_then(|t| t.set.as_ref()) {
            return custom(value).map_err(|message| CoreError::Transform {
                column: String::from(column),
                message,
            });
        }
        return Ok(set_by_type(prop.col_type, value));
    }
    Ok(value.into_sql())
}

/// Applies the get-transform for `column`, lifting a stored value back
/// to its logical representation.
///
/// # Errors
///
/// `CoreError::Transform` when a custom transform rejects the value.
pub fn get_value(schema: &TableSchema, column: &str, value: SqlValue) -> Result<Arg> {
    if let Some(prop) = schema.prop(column) {
        if let Some(custom) = prop.transform.as_ref().and_then(|t| t.get.as_ref()) {
            return custom(value).map_err(|message| CoreError::Transform {
                column: String::from(column),
                message,
            });
        }
        return Ok(get_by_type(prop.col_type, value));
    }
    Ok(Arg::from_sql(value))
}

fn set_by_type(col_type: ColumnType, value: Arg) -> SqlValue {
    if value.is_null() {
        return SqlValue::Null;
    }
    match col_type {
        ColumnType::Date => match value {
            Arg::Date(d) => encode_date(&d),
            Arg::Int(millis) => encode_date(&date_from_millis(millis)),
            Arg::Text(s) => DateTime::parse_from_rfc3339(&s)
                .map_or(SqlValue::Null, |d| encode_date(&d.with_timezone(&Utc))),
            _ => SqlValue::Null,
        },
        ColumnType::Json => SqlValue::Text(arg_to_json(value).to_string()),
        ColumnType::StringArray => match value {
            Arg::StrArray(items) => encode_str_array(&items),
            Arg::Json(Json::Array(items)) => {
                let strings: Vec<String> = items
                    .into_iter()
                    .map(|v| match v {
                        Json::String(s) => s,
                        other => other.to_string(),
                    })
                    .collect();
                encode_str_array(&strings)
            }
            Arg::Text(s) => encode_str_array(std::slice::from_ref(&s)),
            _ => SqlValue::Null,
        },
        ColumnType::Boolean => match value {
            Arg::Bool(b) => SqlValue::Int(i64::from(b)),
            _ => SqlValue::Null,
        },
        _ => value.into_sql(),
    }
}

fn get_by_type(col_type: ColumnType, value: SqlValue) -> Arg {
    if value.is_null() {
        return Arg::Null;
    }
    match col_type {
        ColumnType::Date => match value {
            SqlValue::Text(s) => serde_json::from_str::<Json>(&s)
                .ok()
                .and_then(|v| v.get("$milli").and_then(Json::as_i64))
                .map_or(Arg::Null, |ms| Arg::Date(date_from_millis(ms))),
            // Earlier deployments stored plain epoch milliseconds.
            SqlValue::Int(ms) => Arg::Date(date_from_millis(ms)),
            _ => Arg::Null,
        },
        ColumnType::Json => match value {
            SqlValue::Text(s) => serde_json::from_str::<Json>(&s)
                .map_or(Arg::Null, |v| Arg::from_json(&v)),
            _ => Arg::Null,
        },
        ColumnType::StringArray => match value {
            SqlValue::Text(s) => {
                let inner = s
                    .strip_prefix(STR_ARRAY_SENTINEL)
                    .and_then(|s| s.strip_suffix(STR_ARRAY_SENTINEL))
                    .unwrap_or(&s);
                if inner.is_empty() {
                    Arg::StrArray(Vec::new())
                } else {
                    Arg::StrArray(
                        inner
                            .split(STR_ARRAY_SENTINEL)
                            .map(String::from)
                            .collect(),
                    )
                }
            }
            _ => Arg::Null,
        },
        ColumnType::Boolean => match value {
            SqlValue::Int(n) => Arg::Bool(n != 0),
            _ => Arg::Null,
        },
        _ => Arg::from_sql(value),
    }
}

/// Composite date encoding: readable RFC 3339 plus a sortable epoch
/// field, which the condition compiler addresses as `$.$milli`.
fn encode_date(d: &DateTime<Utc>) -> SqlValue {
    SqlValue::Text(
        json!({
            "$string": d.to_rfc3339_opts(SecondsFormat::Millis, true),
            "$milli": d.timestamp_millis(),
        })
        .to_string(),
    )
}

fn encode_str_array(items: &[String]) -> SqlValue {
    let mut out = String::new();
    out.push(STR_ARRAY_SENTINEL);
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(STR_ARRAY_SENTINEL);
        }
        out.push_str(item);
    }
    out.push(STR_ARRAY_SENTINEL);
    SqlValue::Text(out)
}

fn arg_to_json(value: Arg) -> Json {
    match value {
        Arg::Null => Json::Null,
        Arg::Bool(b) => Json::from(b),
        Arg::Int(n) => Json::from(n),
        Arg::Float(f) => Json::from(f),
        Arg::Text(s) => Json::from(s),
        Arg::Blob(b) => Json::from(b),
        Arg::Date(d) => Json::from(d.timestamp_millis()),
        Arg::Json(v) => v,
        Arg::StrArray(xs) => Json::from(xs),
    }
}
