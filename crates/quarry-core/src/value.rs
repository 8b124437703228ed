//! Value representations on either side of the storage boundary.
//!
//! `SqlValue` is what actually reaches the engine through a bound
//! parameter. `Arg` is the logical value callers work with; the extended
//! variants (dates, JSON documents, string arrays) only exist on this
//! side and are lowered by the transform registry or the condition
//! compiler before binding.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value as Json;

/// A value bound to a statement parameter.
///
/// Literal values never appear in statement text; they travel to the
/// engine exclusively as `SqlValue`s under a placeholder token.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// Text value.
    Text(String),
    /// Binary blob value.
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Returns whether this is the NULL value.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// A logical value, before set-transforms or after get-transforms.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// Absent / NULL.
    Null,
    /// Boolean, stored as INTEGER 0/1.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Float.
    Float(f64),
    /// Text.
    Text(String),
    /// Binary blob.
    Blob(Vec<u8>),
    /// Point in time, stored as the composite date encoding.
    Date(DateTime<Utc>),
    /// Arbitrary JSON document, stored as serialized TEXT.
    Json(Json),
    /// String array, stored sentinel-delimited for containment queries.
    StrArray(Vec<String>),
}

impl Arg {
    /// Lowers the value to its direct bound form, with no column
    /// transform involved.
    ///
    /// Dates become epoch milliseconds and JSON-like values are
    /// serialized to text; this is the fallback used for untyped columns
    /// and for condition operands.
    #[must_use]
    pub fn into_sql(self) -> SqlValue {
        match self {
            Self::Null => SqlValue::Null,
            Self::Bool(b) => SqlValue::Bool(b),
            Self::Int(n) => SqlValue::Int(n),
            Self::Float(f) => SqlValue::Float(f),
            Self::Text(s) => SqlValue::Text(s),
            Self::Blob(b) => SqlValue::Blob(b),
            Self::Date(d) => SqlValue::Int(d.timestamp_millis()),
            Self::Json(v) => SqlValue::Text(v.to_string()),
            Self::StrArray(xs) => SqlValue::Text(Json::from(xs).to_string()),
        }
    }

    /// Lifts a raw stored value back into a logical one, unchanged.
    #[must_use]
    pub fn from_sql(value: SqlValue) -> Self {
        match value {
            SqlValue::Null => Self::Null,
            SqlValue::Bool(b) => Self::Bool(b),
            SqlValue::Int(n) => Self::Int(n),
            SqlValue::Float(f) => Self::Float(f),
            SqlValue::Text(s) => Self::Text(s),
            SqlValue::Blob(b) => Self::Blob(b),
        }
    }

    /// Converts a JSON scalar or compound into the matching `Arg`.
    #[must_use]
    pub fn from_json(value: &Json) -> Self {
        match value {
            Json::Null => Self::Null,
            Json::Bool(b) => Self::Bool(*b),
            Json::Number(n) => n.as_i64().map_or_else(
                || Self::Float(n.as_f64().unwrap_or(0.0)),
                Self::Int,
            ),
            Json::String(s) => Self::Text(s.clone()),
            other => Self::Json(other.clone()),
        }
    }

    /// Returns whether this is the NULL value.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// Conversion into a logical argument value.
pub trait ToArg {
    /// Converts the value to an `Arg`.
    fn to_arg(self) -> Arg;
}

impl ToArg for Arg {
    fn to_arg(self) -> Arg {
        self
    }
}

impl ToArg for bool {
    fn to_arg(self) -> Arg {
        Arg::Bool(self)
    }
}

impl ToArg for i64 {
    fn to_arg(self) -> Arg {
        Arg::Int(self)
    }
}

impl ToArg for i32 {
    fn to_arg(self) -> Arg {
        Arg::Int(i64::from(self))
    }
}

impl ToArg for f64 {
    fn to_arg(self) -> Arg {
        Arg::Float(self)
    }
}

impl ToArg for String {
    fn to_arg(self) -> Arg {
        Arg::Text(self)
    }
}

impl ToArg for &str {
    fn to_arg(self) -> Arg {
        Arg::Text(String::from(self))
    }
}

impl ToArg for Vec<u8> {
    fn to_arg(self) -> Arg {
        Arg::Blob(self)
    }
}

impl ToArg for DateTime<Utc> {
    fn to_arg(self) -> Arg {
        Arg::Date(self)
    }
}

impl ToArg for Json {
    fn to_arg(self) -> Arg {
        Arg::from_json(&self)
    }
}

impl ToArg for Vec<String> {
    fn to_arg(self) -> Arg {
        Arg::StrArray(self)
    }
}

impl ToArg for &[&str] {
    fn to_arg(self) -> Arg {
        Arg::StrArray(self.iter().map(|s| String::from(*s)).collect())
    }
}

impl<T: ToArg> ToArg for Option<T> {
    fn to_arg(self) -> Arg {
        match self {
            Some(v) => v.to_arg(),
            None => Arg::Null,
        }
    }
}

/// Builds a UTC datetime from epoch milliseconds, clamping out-of-range
/// inputs to the epoch.
#[must_use]
pub fn date_from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_else(|| Utc.timestamp_millis_opt(0).single().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_lowers_to_millis() {
        let d = date_from_millis(1_735_689_600_000);
        assert_eq!(
            Arg::Date(d).into_sql(),
            SqlValue::Int(1_735_689_600_000)
        );
    }

    #[test]
    fn test_json_lowers_to_text() {
        let v = Arg::Json(serde_json::json!({"a": 1}));
        assert_eq!(v.into_sql(), SqlValue::Text(String::from("{\"a\":1}")));
    }

    #[test]
    fn test_from_json_scalars() {
        assert_eq!(Arg::from_json(&serde_json::json!(null)), Arg::Null);
        assert_eq!(Arg::from_json(&serde_json::json!(true)), Arg::Bool(true));
        assert_eq!(Arg::from_json(&serde_json::json!(42)), Arg::Int(42));
        assert_eq!(Arg::from_json(&serde_json::json!(2.5)), Arg::Float(2.5));
        assert_eq!(
            Arg::from_json(&serde_json::json!("x")),
            Arg::Text(String::from("x"))
        );
    }

    #[test]
    fn test_option_to_arg() {
        assert_eq!(None::<i64>.to_arg(), Arg::Null);
        assert_eq!(Some(7_i64).to_arg(), Arg::Int(7));
    }
}
