//! Condition documents as a typed expression tree.
//!
//! Callers either assemble conditions through the builder constructors
//! (`Cond::eq(..).and(..)`) or hand over a MongoDB-style JSON document
//! (`Cond::parse`). Either way the operator grammar is normalized into
//! this tagged union before compilation; no stringly-typed operator keys
//! survive past parsing.

use serde_json::{Map, Value as Json};

use crate::error::{CoreError, Result};
use crate::value::{Arg, ToArg};

/// A query condition node.
#[derive(Debug, Clone, PartialEq)]
pub enum Cond {
    /// Conjunction of sub-conditions; empty compiles to `TRUE`.
    And(Vec<Cond>),
    /// Disjunction of sub-conditions; empty compiles to `TRUE`.
    Or(Vec<Cond>),
    /// A single field constraint.
    Field {
        /// Column path; a `.` addresses a JSON-embedded sub-field.
        key: String,
        /// The constraint applied to the field.
        op: FieldOp,
        /// Optional collation applied to the comparison.
        collate: Option<String>,
    },
}

/// Per-field operators.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    /// Equality; string-array columns compile to a containment test.
    Eq(Arg),
    /// Inequality.
    Ne(Arg),
    /// Greater than.
    Gt(Arg),
    /// Greater than or equal.
    Gte(Arg),
    /// Less than.
    Lt(Arg),
    /// Less than or equal.
    Lte(Arg),
    /// LIKE with a caller-supplied pattern.
    Like(Arg),
    /// NOT LIKE with a caller-supplied pattern.
    NotLike(Arg),
    /// Substring match: wrapped-wildcard LIKE with metacharacters
    /// escaped in the operand.
    Substr(Arg),
    /// Negated substring match.
    NotSubstr(Arg),
    /// `IS NOT NULL` when true, `IS NULL` when false; binds nothing.
    Exists(bool),
    /// Set membership; disjunctive containment on string-array columns.
    In(Vec<Arg>),
    /// Negated set membership.
    NotIn(Vec<Arg>),
    /// A bare array value: membership on plain columns, conjunctive
    /// containment (every listed token present) on string-array columns.
    Contains(Vec<Arg>),
}

impl Cond {
    fn field(key: &str, op: FieldOp) -> Self {
        Self::Field {
            key: String::from(key),
            op,
            collate: None,
        }
    }

    /// field = value
    pub fn eq<V: ToArg>(key: &str, value: V) -> Self {
        Self::field(key, FieldOp::Eq(value.to_arg()))
    }

    /// field != value
    pub fn ne<V: ToArg>(key: &str, value: V) -> Self {
        Self::field(key, FieldOp::Ne(value.to_arg()))
    }

    /// field > value
    pub fn gt<V: ToArg>(key: &str, value: V) -> Self {
        Self::field(key, FieldOp::Gt(value.to_arg()))
    }

    /// field >= value
    pub fn gte<V: ToArg>(key: &str, value: V) -> Self {
        Self::field(key, FieldOp::Gte(value.to_arg()))
    }

    /// field < value
    pub fn lt<V: ToArg>(key: &str, value: V) -> Self {
        Self::field(key, FieldOp::Lt(value.to_arg()))
    }

    /// field <= value
    pub fn lte<V: ToArg>(key: &str, value: V) -> Self {
        Self::field(key, FieldOp::Lte(value.to_arg()))
    }

    /// field LIKE pattern
    pub fn like<V: ToArg>(key: &str, pattern: V) -> Self {
        Self::field(key, FieldOp::Like(pattern.to_arg()))
    }

    /// field NOT LIKE pattern
    pub fn nlike<V: ToArg>(key: &str, pattern: V) -> Self {
        Self::field(key, FieldOp::NotLike(pattern.to_arg()))
    }

    /// Substring containment.
    pub fn substr<V: ToArg>(key: &str, needle: V) -> Self {
        Self::field(key, FieldOp::Substr(needle.to_arg()))
    }

    /// Negated substring containment.
    pub fn nsubstr<V: ToArg>(key: &str, needle: V) -> Self {
        Self::field(key, FieldOp::NotSubstr(needle.to_arg()))
    }

    /// NULL-ness check.
    #[must_use]
    pub fn exists(key: &str, present: bool) -> Self {
        Self::field(key, FieldOp::Exists(present))
    }

    /// Set membership.
    pub fn is_in<V: ToArg>(key: &str, values: Vec<V>) -> Self {
        Self::field(
            key,
            FieldOp::In(values.into_iter().map(ToArg::to_arg).collect()),
        )
    }

    /// Negated set membership.
    pub fn not_in<V: ToArg>(key: &str, values: Vec<V>) -> Self {
        Self::field(
            key,
            FieldOp::NotIn(values.into_iter().map(ToArg::to_arg).collect()),
        )
    }

    /// Bare-array semantics: membership on plain columns, conjunctive
    /// token containment on string-array columns.
    pub fn contains<V: ToArg>(key: &str, values: Vec<V>) -> Self {
        Self::field(
            key,
            FieldOp::Contains(values.into_iter().map(ToArg::to_arg).collect()),
        )
    }

    /// Conjunction of conditions.
    #[must_use]
    pub fn all(conds: Vec<Cond>) -> Self {
        Self::And(conds)
    }

    /// Disjunction of conditions.
    #[must_use]
    pub fn any(conds: Vec<Cond>) -> Self {
        Self::Or(conds)
    }

    /// Combines with another condition under AND, flattening nested
    /// conjunctions.
    #[must_use]
    pub fn and(self, other: Cond) -> Self {
        match self {
            Self::And(mut conds) => {
                conds.push(other);
                Self::And(conds)
            }
            first => Self::And(vec![first, other]),
        }
    }

    /// Combines with another condition under OR, flattening nested
    /// disjunctions.
    #[must_use]
    pub fn or(self, other: Cond) -> Self {
        match self {
            Self::Or(mut conds) => {
                conds.push(other);
                Self::Or(conds)
            }
            first => Self::Or(vec![first, other]),
        }
    }

    /// Attaches a COLLATE modifier to a field condition; no-op on
    /// composites.
    #[must_use]
    pub fn collate(mut self, collation: &str) -> Self {
        if let Self::Field { collate, .. } = &mut self {
            *collate = Some(String::from(collation));
        }
        self
    }

    /// Parses a MongoDB-style condition document.
    ///
    /// Accepted shapes: `{"$or": [..]}`, `{"$and": [..]}`, or a flat
    /// mapping of column path to scalar, bare array, or operator object.
    /// An operator object may carry a `$collate` modifier next to its
    /// operator key. Unrecognized `$`-operators degrade to equality
    /// against the JSON-serialized object.
    ///
    /// # Errors
    ///
    /// `CoreError::InvalidCondition` when the document is not an object,
    /// `$or`/`$and` is not an array, `$in`/`$nin` is given a non-array,
    /// or `$exists`/`$collate` carry the wrong type.
    pub fn parse(doc: &Json) -> Result<Self> {
        let Json::Object(map) = doc else {
            return Err(CoreError::InvalidCondition(String::from(
                "condition document must be an object",
            )));
        };

        if let Some(branches) = map.get("$or") {
            return Self::parse_composite(branches, "$or").map(Self::Or);
        }
        if let Some(branches) = map.get("$and") {
            return Self::parse_composite(branches, "$and").map(Self::And);
        }

        let mut fields = Vec::with_capacity(map.len());
        for (key, value) in map {
            fields.push(Self::parse_field(key, value)?);
        }
        if fields.len() == 1 {
            Ok(fields.remove(0))
        } else {
            Ok(Self::And(fields))
        }
    }

    fn parse_composite(branches: &Json, op: &str) -> Result<Vec<Self>> {
        let Json::Array(items) = branches else {
            return Err(CoreError::InvalidCondition(format!(
                "{op} requires an array of sub-conditions"
            )));
        };
        items.iter().map(Self::parse).collect()
    }

    fn parse_field(key: &str, value: &Json) -> Result<Self> {
        match value {
            Json::Array(items) => Ok(Self::field(
                key,
                FieldOp::Contains(items.iter().map(Arg::from_json).collect()),
            )),
            Json::Object(map) => Self::parse_operator_object(key, map),
            scalar => Ok(Self::eq(key, Arg::from_json(scalar))),
        }
    }

    fn parse_operator_object(key: &str, map: &Map<String, Json>) -> Result<Self> {
        let mut rest = map.clone();
        let collate = match rest.remove("$collate") {
            None => None,
            Some(Json::String(name)) => Some(name),
            Some(_) => {
                return Err(CoreError::InvalidCondition(String::from(
                    "$collate requires a collation name",
                )))
            }
        };

        let op = if rest.len() == 1 {
            let (op_key, operand) = rest.iter().next().map(|(k, v)| (k.clone(), v.clone()))
                .unwrap_or((String::new(), Json::Null));
            match op_key.as_str() {
                "$eq" => Some(FieldOp::Eq(Arg::from_json(&operand))),
                "$ne" => Some(FieldOp::Ne(Arg::from_json(&operand))),
                "$gt" => Some(FieldOp::Gt(Arg::from_json(&operand))),
                "$gte" => Some(FieldOp::Gte(Arg::from_json(&operand))),
                "$lt" => Some(FieldOp::Lt(Arg::from_json(&operand))),
                "$lte" => Some(FieldOp::Lte(Arg::from_json(&operand))),
                "$like" => Some(FieldOp::Like(Arg::from_json(&operand))),
                "$nlike" => Some(FieldOp::NotLike(Arg::from_json(&operand))),
                "$substr" => Some(FieldOp::Substr(Arg::from_json(&operand))),
                "$nsubstr" => Some(FieldOp::NotSubstr(Arg::from_json(&operand))),
                "$exists" => match operand {
                    Json::Bool(present) => Some(FieldOp::Exists(present)),
                    _ => {
                        return Err(CoreError::InvalidCondition(String::from(
                            "$exists requires a boolean",
                        )))
                    }
                },
                "$in" | "$nin" => {
                    let Json::Array(items) = operand else {
                        return Err(CoreError::InvalidCondition(format!(
                            "{op_key} requires an array"
                        )));
                    };
                    let args = items.iter().map(Arg::from_json).collect();
                    Some(if op_key == "$in" {
                        FieldOp::In(args)
                    } else {
                        FieldOp::NotIn(args)
                    })
                }
                _ => None,
            }
        } else {
            None
        };

        // Anything unrecognized binds as equality against the serialized
        // object: a documented leniency for callers passing non-standard
        // shapes, not an error.
        let op = op.unwrap_or_else(|| FieldOp::Eq(Arg::Json(Json::Object(rest))));

        Ok(Self::Field {
            key: String::from(key),
            op,
            collate,
        })
    }
}
