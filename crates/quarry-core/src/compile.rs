//! Compiles condition trees to WHERE-clause fragments.
//!
//! Output contains identifiers and operators only; every literal is
//! bound through the statement's [`Params`] and appears in the fragment
//! as a placeholder token. The same compiler serves reads and the
//! sub-selects of UPDATE and DELETE, which is why it works against a
//! slice of schemas: a joined query's string-array columns must be
//! recognized under both their bare names and their `table__column`
//! aliases.

use std::collections::HashSet;

use crate::cond::{Cond, FieldOp};
use crate::error::{CoreError, Result};
use crate::escape::escape_ident;
use crate::params::Params;
use crate::schema::TableSchema;
use crate::transform::STR_ARRAY_SENTINEL;
use crate::value::{Arg, SqlValue};

/// Compiles `cond` into a WHERE-clause fragment, drawing placeholders
/// from `params`.
///
/// `schemas` lists every table participating in the statement; the
/// first is the anchor table, the rest are joined.
///
/// # Errors
///
/// `CoreError::ParamCapacity` when the condition needs more
/// placeholders than the binder has left, `CoreError::InvalidCondition`
/// for a malformed collation name or JSON sub-field path.
pub fn compile(cond: &Cond, schemas: &[&TableSchema], params: &mut Params) -> Result<String> {
    let ctx = Ctx::new(schemas);
    compile_cond(cond, &ctx, params)
}

/// Name-resolution context for one statement.
struct Ctx {
    /// String-array columns under every name the condition grammar can
    /// address them by.
    str_array_cols: HashSet<String>,
    /// Participating table names, for `table__column` key resolution.
    tables: HashSet<String>,
}

impl Ctx {
    fn new(schemas: &[&TableSchema]) -> Self {
        let mut str_array_cols = HashSet::new();
        let mut tables = HashSet::new();
        for schema in schemas {
            tables.insert(schema.name.clone());
            for prop in schema.string_array_props() {
                str_array_cols.insert(String::from(prop));
                str_array_cols.insert(format!("{}__{}", schema.name, prop));
            }
        }
        Self {
            str_array_cols,
            tables,
        }
    }
}

fn compile_cond(cond: &Cond, ctx: &Ctx, params: &mut Params) -> Result<String> {
    match cond {
        Cond::And(items) => compile_composite(items, " AND ", ctx, params),
        Cond::Or(items) => compile_composite(items, " OR ", ctx, params),
        Cond::Field { key, op, collate } => {
            compile_field(key, op, collate.as_deref(), ctx, params)
        }
    }
}

fn compile_composite(
    items: &[Cond],
    joiner: &str,
    ctx: &Ctx,
    params: &mut Params,
) -> Result<String> {
    match items {
        [] => Ok(String::from("TRUE")),
        [single] => compile_cond(single, ctx, params),
        many => {
            let clauses = many
                .iter()
                .map(|c| compile_cond(c, ctx, params))
                .collect::<Result<Vec<_>>>()?;
            Ok(format!("({})", clauses.join(joiner)))
        }
    }
}

fn compile_field(
    key: &str,
    op: &FieldOp,
    collate: Option<&str>,
    ctx: &Ctx,
    params: &mut Params,
) -> Result<String> {
    let collate = collate_suffix(collate)?;
    let is_str_array = ctx.str_array_cols.contains(key);
    let col = resolve_key(key, ctx)?;

    match op {
        FieldOp::Eq(Arg::Null) => Ok(format!("{col} IS NULL")),
        FieldOp::Ne(Arg::Null) => Ok(format!("{col} IS NOT NULL")),
        FieldOp::Eq(value) if is_str_array => {
            Ok(containment_like(&col, value.clone(), &collate, params)?)
        }
        FieldOp::Eq(value) => comparison(&col, "=", value, &collate, params),
        FieldOp::Ne(value) => comparison(&col, "!=", value, &collate, params),
        FieldOp::Gt(value) => comparison(&col, ">", value, &collate, params),
        FieldOp::Gte(value) => comparison(&col, ">=", value, &collate, params),
        FieldOp::Lt(value) => comparison(&col, "<", value, &collate, params),
        FieldOp::Lte(value) => comparison(&col, "<=", value, &collate, params),
        FieldOp::Like(pattern) => {
            let token = params.add(pattern.clone().into_sql())?;
            Ok(format!("{col} LIKE {token}{collate}"))
        }
        FieldOp::NotLike(pattern) => {
            let token = params.add(pattern.clone().into_sql())?;
            Ok(format!("{col} NOT LIKE {token}{collate}"))
        }
        FieldOp::Substr(needle) => {
            let token = params.add(SqlValue::Text(escape_like(&operand_text(needle))))?;
            Ok(format!("{col} LIKE '%'||{token}||'%'{collate} ESCAPE '\\'"))
        }
        FieldOp::NotSubstr(needle) => {
            let token = params.add(SqlValue::Text(escape_like(&operand_text(needle))))?;
            Ok(format!("{col} NOT LIKE '%'||{token}||'%'{collate} ESCAPE '\\'"))
        }
        FieldOp::Exists(true) => Ok(format!("{col} IS NOT NULL")),
        FieldOp::Exists(false) => Ok(format!("{col} IS NULL")),
        FieldOp::In(values) if is_str_array => {
            containment_list(&col, values, " OR ", false, "FALSE", &collate, params)
        }
        FieldOp::In(values) => membership(&col, values, false, &collate, params),
        FieldOp::NotIn(values) if is_str_array => {
            containment_list(&col, values, " AND ", true, "TRUE", &collate, params)
        }
        FieldOp::NotIn(values) => membership(&col, values, true, &collate, params),
        FieldOp::Contains(values) if is_str_array => {
            containment_list(&col, values, " AND ", false, "TRUE", &collate, params)
        }
        // an empty bare array constrains nothing, on any column kind
        FieldOp::Contains(values) if values.is_empty() => Ok(String::from("TRUE")),
        FieldOp::Contains(values) => membership(&col, values, false, &collate, params),
    }
}

/// Resolves a condition key to a column expression. A `table__column`
/// key naming a participating table becomes the qualified column (so
/// the same condition compiles in sub-selects where the select alias
/// does not exist); a dotted key addresses a sub-field of a JSON column
/// through `json_extract`.
fn resolve_key(key: &str, ctx: &Ctx) -> Result<String> {
    if let Some((table, column)) = key.split_once("__") {
        if ctx.tables.contains(table) {
            return Ok(format!("{}.{}", escape_ident(table), escape_ident(column)));
        }
    }
    match key.split_once('.') {
        Some((col, path)) => {
            // the path lands inside a quoted json_extract argument, so
            // it is restricted to characters that cannot break out of it
            let safe = path
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.' | '[' | ']'));
            if !safe {
                return Err(CoreError::InvalidCondition(format!(
                    "invalid json path '{key}'"
                )));
            }
            Ok(format!("json_extract({}, '$.{path}')", escape_ident(col)))
        }
        None => Ok(escape_ident(key)),
    }
}

/// Scalar comparison. A date operand redirects the comparison to the
/// sortable `$milli` field of the composite encoding and binds epoch
/// milliseconds.
fn comparison(
    col: &str,
    op: &str,
    value: &Arg,
    collate: &str,
    params: &mut Params,
) -> Result<String> {
    if let Arg::Date(d) = value {
        let token = params.add(SqlValue::Int(d.timestamp_millis()))?;
        return Ok(format!("json_extract({col}, '$.$milli') {op} {token}{collate}"));
    }
    let token = params.add(value.clone().into_sql())?;
    Ok(format!("{col} {op} {token}{collate}"))
}

/// One sentinel-anchored containment LIKE against a string-array column.
fn containment_like(
    col: &str,
    value: Arg,
    collate: &str,
    params: &mut Params,
) -> Result<String> {
    let token = params.add(value.into_sql())?;
    Ok(format!(
        "{col} LIKE '%{s}'||{token}||'{s}%'{collate}",
        s = STR_ARRAY_SENTINEL
    ))
}

/// Containment over a list of tokens: OR-joined for membership,
/// AND-joined for all-of and for negation.
fn containment_list(
    col: &str,
    values: &[Arg],
    joiner: &str,
    negate: bool,
    empty: &str,
    collate: &str,
    params: &mut Params,
) -> Result<String> {
    if values.is_empty() {
        return Ok(String::from(empty));
    }
    let like = if negate { "NOT LIKE" } else { "LIKE" };
    let mut clauses = Vec::with_capacity(values.len());
    for value in values {
        let token = params.add(value.clone().into_sql())?;
        clauses.push(format!(
            "{col} {like} '%{s}'||{token}||'{s}%'{collate}",
            s = STR_ARRAY_SENTINEL
        ));
    }
    if clauses.len() == 1 {
        Ok(clauses.remove(0))
    } else {
        Ok(format!("({})", clauses.join(joiner)))
    }
}

/// Plain-column membership. A single-element list degrades to an
/// equality comparison, and an empty list to a constant.
fn membership(
    col: &str,
    values: &[Arg],
    negate: bool,
    collate: &str,
    params: &mut Params,
) -> Result<String> {
    match values {
        [] => Ok(String::from(if negate { "TRUE" } else { "FALSE" })),
        [single] => {
            let op = if negate { "!=" } else { "=" };
            comparison(col, op, single, collate, params)
        }
        many => {
            let mut tokens = Vec::with_capacity(many.len());
            for value in many {
                tokens.push(params.add(value.clone().into_sql())?);
            }
            let op = if negate { "NOT IN" } else { "IN" };
            Ok(format!("{col} {op} ({}){collate}", tokens.join(", ")))
        }
    }
}

fn collate_suffix(collate: Option<&str>) -> Result<String> {
    match collate {
        None => Ok(String::new()),
        Some(name)
            if !name.is_empty()
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') =>
        {
            Ok(format!(" COLLATE {name}"))
        }
        Some(name) => Err(CoreError::InvalidCondition(format!(
            "invalid collation name '{name}'"
        ))),
    }
}

/// Substring operands are matched literally: LIKE metacharacters in the
/// needle are backslash-escaped before binding, and the emitted LIKE
/// carries the matching ESCAPE clause.
fn escape_like(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len());
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn operand_text(value: &Arg) -> String {
    match value {
        Arg::Text(s) => s.clone(),
        Arg::Int(n) => n.to_string(),
        Arg::Float(f) => f.to_string(),
        Arg::Bool(b) => b.to_string(),
        Arg::Json(v) => v.to_string(),
        Arg::Date(d) => d.timestamp_millis().to_string(),
        Arg::StrArray(items) => items.join(","),
        Arg::Null | Arg::Blob(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnType, PropDef, TableSchema};
    use crate::value::date_from_millis;
    use serde_json::json;

    fn card_schema() -> TableSchema {
        TableSchema::builder("card")
            .primary("_id", ColumnType::Text)
            .prop("front", PropDef::new(ColumnType::Text))
            .prop("order", PropDef::new(ColumnType::Integer).nullable())
            .prop("nextReview", PropDef::new(ColumnType::Date).nullable())
            .prop("stat", PropDef::new(ColumnType::Json).nullable())
            .prop("tags", PropDef::new(ColumnType::StringArray).nullable())
            .build()
            .unwrap()
    }

    fn lower(cond: &Cond) -> (String, Vec<SqlValue>) {
        let schema = card_schema();
        let mut params = Params::new();
        let clause = compile(cond, &[&schema], &mut params).unwrap();
        params.reindex(&clause).unwrap()
    }

    #[test]
    fn test_scalar_equality() {
        let (sql, values) = lower(&Cond::eq("front", "Lorem"));
        assert_eq!(sql, "front = ?");
        assert_eq!(values, vec![SqlValue::Text(String::from("Lorem"))]);
    }

    #[test]
    fn test_literal_never_lands_in_statement_text() {
        let hostile = "x'; DROP TABLE card; --";
        let (sql, values) = lower(&Cond::eq("front", hostile));
        assert_eq!(sql, "front = ?");
        assert_eq!(values, vec![SqlValue::Text(String::from(hostile))]);
    }

    #[test]
    fn test_flat_document_is_parenthesized_conjunction() {
        let cond = Cond::parse(&json!({"front": "a", "order": 2})).unwrap();
        let (sql, values) = lower(&cond);
        assert_eq!(sql, "(front = ? AND \"order\" = ?)");
        assert_eq!(
            values,
            vec![SqlValue::Text(String::from("a")), SqlValue::Int(2)]
        );
    }

    #[test]
    fn test_or_document() {
        let cond = Cond::parse(&json!({"$or": [{"front": "a"}, {"front": "b"}]})).unwrap();
        let (sql, _) = lower(&cond);
        assert_eq!(sql, "(front = ? OR front = ?)");
    }

    #[test]
    fn test_empty_document_is_true() {
        let cond = Cond::parse(&json!({})).unwrap();
        let (sql, values) = lower(&cond);
        assert_eq!(sql, "TRUE");
        assert!(values.is_empty());
    }

    #[test]
    fn test_keyword_column_is_quoted() {
        let (sql, _) = lower(&Cond::gt("order", 3_i64));
        assert_eq!(sql, "\"order\" > ?");
    }

    #[test]
    fn test_dotted_key_addresses_json_subfield() {
        let (sql, values) = lower(&Cond::gte("stat.streak", 3_i64));
        assert_eq!(sql, "json_extract(stat, '$.streak') >= ?");
        assert_eq!(values, vec![SqlValue::Int(3)]);
    }

    #[test]
    fn test_date_comparison_targets_milli_field() {
        let d = date_from_millis(1_735_689_600_000);
        let (sql, values) = lower(&Cond::gt("nextReview", d));
        assert_eq!(sql, "json_extract(nextReview, '$.$milli') > ?");
        assert_eq!(values, vec![SqlValue::Int(1_735_689_600_000)]);
    }

    #[test]
    fn test_null_equality_uses_is_null() {
        let cond = Cond::parse(&json!({"nextReview": null})).unwrap();
        let (sql, values) = lower(&cond);
        assert_eq!(sql, "nextReview IS NULL");
        assert!(values.is_empty());
    }

    #[test]
    fn test_exists() {
        let (sql, values) = lower(&Cond::exists("nextReview", true));
        assert_eq!(sql, "nextReview IS NOT NULL");
        assert!(values.is_empty());
        let (sql, _) = lower(&Cond::exists("nextReview", false));
        assert_eq!(sql, "nextReview IS NULL");
    }

    #[test]
    fn test_str_array_equality_is_containment() {
        let (sql, values) = lower(&Cond::eq("tags", "hanzi"));
        assert_eq!(sql, "tags LIKE '%\u{1f}'||?||'\u{1f}%'");
        assert_eq!(values, vec![SqlValue::Text(String::from("hanzi"))]);
    }

    #[test]
    fn test_str_array_alias_is_detected() {
        let (sql, _) = lower(&Cond::eq("card__tags", "hanzi"));
        assert_eq!(sql, "card.tags LIKE '%\u{1f}'||?||'\u{1f}%'");
    }

    #[test]
    fn test_str_array_in_is_disjunctive_containment() {
        let (sql, _) = lower(&Cond::is_in("tags", vec!["a", "b"]));
        assert_eq!(
            sql,
            "(tags LIKE '%\u{1f}'||?||'\u{1f}%' OR tags LIKE '%\u{1f}'||?||'\u{1f}%')"
        );
    }

    #[test]
    fn test_str_array_bare_array_is_conjunctive_containment() {
        let cond = Cond::parse(&json!({"tags": ["a", "b"]})).unwrap();
        let (sql, _) = lower(&cond);
        assert_eq!(
            sql,
            "(tags LIKE '%\u{1f}'||?||'\u{1f}%' AND tags LIKE '%\u{1f}'||?||'\u{1f}%')"
        );
    }

    #[test]
    fn test_plain_membership() {
        let (sql, values) = lower(&Cond::is_in("order", vec![1_i64, 2, 3]));
        assert_eq!(sql, "\"order\" IN (?, ?, ?)");
        assert_eq!(
            values,
            vec![SqlValue::Int(1), SqlValue::Int(2), SqlValue::Int(3)]
        );
    }

    #[test]
    fn test_single_element_membership_degrades_to_equality() {
        let (sql, _) = lower(&Cond::is_in("order", vec![7_i64]));
        assert_eq!(sql, "\"order\" = ?");
        let (sql, _) = lower(&Cond::not_in("order", vec![7_i64]));
        assert_eq!(sql, "\"order\" != ?");
    }

    #[test]
    fn test_empty_membership_is_constant() {
        let (sql, _) = lower(&Cond::is_in("order", Vec::<i64>::new()));
        assert_eq!(sql, "FALSE");
        let (sql, _) = lower(&Cond::not_in("order", Vec::<i64>::new()));
        assert_eq!(sql, "TRUE");
    }

    #[test]
    fn test_empty_bare_array_matches_everything() {
        // plain column and string-array column agree
        let cond = Cond::parse(&json!({"order": []})).unwrap();
        let (sql, _) = lower(&cond);
        assert_eq!(sql, "TRUE");
        let cond = Cond::parse(&json!({"tags": []})).unwrap();
        let (sql, _) = lower(&cond);
        assert_eq!(sql, "TRUE");
    }

    #[test]
    fn test_hostile_json_path_rejected() {
        let schema = card_schema();
        let mut params = Params::new();
        let err = compile(
            &Cond::eq("stat.streak') OR 1=1 --", 1_i64),
            &[&schema],
            &mut params,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidCondition(_)));
    }

    #[test]
    fn test_substr_escapes_like_metacharacters() {
        let (sql, values) = lower(&Cond::substr("front", "100%_done"));
        assert_eq!(sql, "front LIKE '%'||?||'%' ESCAPE '\\'");
        assert_eq!(
            values,
            vec![SqlValue::Text(String::from("100\\%\\_done"))]
        );
    }

    #[test]
    fn test_substr_escapes_backslash_itself() {
        let (_, values) = lower(&Cond::substr("front", "a\\b"));
        assert_eq!(values, vec![SqlValue::Text(String::from("a\\\\b"))]);
    }

    #[test]
    fn test_collate_is_appended() {
        let (sql, _) = lower(&Cond::like("front", "a%").collate("NOCASE"));
        assert_eq!(sql, "front LIKE ? COLLATE NOCASE");
    }

    #[test]
    fn test_malformed_collation_rejected() {
        let schema = card_schema();
        let mut params = Params::new();
        let err = compile(
            &Cond::eq("front", "a").collate("NOCASE; DROP TABLE card"),
            &[&schema],
            &mut params,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidCondition(_)));
    }

    #[test]
    fn test_nested_composites_are_parenthesized() {
        let cond = Cond::parse(&json!({
            "$or": [
                {"front": "a", "order": 1},
                {"tags": {"$in": ["x"]}}
            ]
        }))
        .unwrap();
        let (sql, _) = lower(&cond);
        assert_eq!(
            sql,
            "((front = ? AND \"order\" = ?) OR tags LIKE '%\u{1f}'||?||'\u{1f}%')"
        );
    }

    #[test]
    fn test_placeholder_capacity_enforced() {
        let schema = card_schema();
        let mut params = Params::with_capacity(2);
        let err = compile(
            &Cond::is_in("order", vec![1_i64, 2, 3]),
            &[&schema],
            &mut params,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::ParamCapacity { capacity: 2 }));
    }

    #[test]
    fn test_unknown_operator_binds_serialized_object() {
        let cond = Cond::parse(&json!({"front": {"$regex": "^a"}})).unwrap();
        let (sql, values) = lower(&cond);
        assert_eq!(sql, "front = ?");
        assert_eq!(
            values,
            vec![SqlValue::Text(String::from("{\"$regex\":\"^a\"}"))]
        );
    }
}
