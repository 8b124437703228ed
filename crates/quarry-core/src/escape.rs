//! Reserved-word escaping for SQL identifiers.
//!
//! Identifiers are interpolated into statement text (values never are),
//! so any segment that collides with a SQLite keyword must be wrapped in
//! double quotes before interpolation.

use std::sync::LazyLock;

use regex::Regex;

/// The full SQLite reserved-word list.
///
/// <https://www.sqlite.org/lang_keywords.html>
const KEYWORDS: &[&str] = &[
    "ABORT",
    "ACTION",
    "ADD",
    "AFTER",
    "ALL",
    "ALTER",
    "ALWAYS",
    "ANALYZE",
    "AND",
    "AS",
    "ASC",
    "ATTACH",
    "AUTOINCREMENT",
    "BEFORE",
    "BEGIN",
    "BETWEEN",
    "BY",
    "CASCADE",
    "CASE",
    "CAST",
    "CHECK",
    "COLLATE",
    "COLUMN",
    "COMMIT",
    "CONFLICT",
    "CONSTRAINT",
    "CREATE",
    "CROSS",
    "CURRENT",
    "CURRENT_DATE",
    "CURRENT_TIME",
    "CURRENT_TIMESTAMP",
    "DATABASE",
    "DEFAULT",
    "DEFERRABLE",
    "DEFERRED",
    "DELETE",
    "DESC",
    "DETACH",
    "DISTINCT",
    "DO",
    "DROP",
    "EACH",
    "ELSE",
    "END",
    "ESCAPE",
    "EXCEPT",
    "EXCLUDE",
    "EXCLUSIVE",
    "EXISTS",
    "EXPLAIN",
    "FAIL",
    "FILTER",
    "FIRST",
    "FOLLOWING",
    "FOR",
    "FOREIGN",
    "FROM",
    "FULL",
    "GENERATED",
    "GLOB",
    "GROUP",
    "GROUPS",
    "HAVING",
    "IF",
    "IGNORE",
    "IMMEDIATE",
    "IN",
    "INDEX",
    "INDEXED",
    "INITIALLY",
    "INNER",
    "INSERT",
    "INSTEAD",
    "INTERSECT",
    "INTO",
    "IS",
    "ISNULL",
    "JOIN",
    "KEY",
    "LAST",
    "LEFT",
    "LIKE",
    "LIMIT",
    "MATCH",
    "NATURAL",
    "NO",
    "NOT",
    "NOTHING",
    "NOTNULL",
    "NULL",
    "NULLS",
    "OF",
    "OFFSET",
    "ON",
    "OR",
    "ORDER",
    "OTHERS",
    "OUTER",
    "OVER",
    "PARTITION",
    "PLAN",
    "PRAGMA",
    "PRECEDING",
    "PRIMARY",
    "QUERY",
    "RAISE",
    "RANGE",
    "RECURSIVE",
    "REFERENCES",
    "REGEXP",
    "REINDEX",
    "RELEASE",
    "RENAME",
    "REPLACE",
    "RESTRICT",
    "RIGHT",
    "ROLLBACK",
    "ROW",
    "ROWS",
    "SAVEPOINT",
    "SELECT",
    "SET",
    "TABLE",
    "TEMP",
    "TEMPORARY",
    "THEN",
    "TIES",
    "TO",
    "TRANSACTION",
    "TRIGGER",
    "UNBOUNDED",
    "UNION",
    "UNIQUE",
    "UPDATE",
    "USING",
    "VACUUM",
    "VALUES",
    "VIEW",
    "VIRTUAL",
    "WHEN",
    "WHERE",
    "WINDOW",
    "WITH",
    "WITHOUT",
];

/// Characters allowed inside an unquoted identifier segment.
///
/// <https://stackoverflow.com/questions/31788990>
const IDENT_CHARS: &str = "A-Z0-9_$:";

static KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    // A keyword only needs quoting when delimited by non-identifier
    // characters on both sides. Quote characters count as delimiters that
    // suppress the match, which is what makes escaping idempotent.
    let pattern = format!(
        "(?i)(^|[^{chars}\"\\)])({kw})($|[^{chars}\"\\(])",
        chars = IDENT_CHARS,
        kw = KEYWORDS.join("|"),
    );
    Regex::new(&pattern).expect("keyword pattern is valid")
});

/// Escapes SQLite reserved words inside a plain or dotted identifier.
///
/// Each dot-separated segment is checked independently, so `card.order`
/// becomes `card."order"` while non-keyword segments pass through
/// unchanged. Applying the function to its own output is a no-op.
#[must_use]
pub fn escape_ident(name: &str) -> String {
    let mut out = String::from(name);
    // Consuming boundary characters means adjacent keywords need a second
    // pass (e.g. `order.group`).
    loop {
        let replaced = KEYWORD_RE
            .replace_all(&out, |caps: &regex::Captures<'_>| {
                format!("{}\"{}\"{}", &caps[1], &caps[2], &caps[3])
            })
            .into_owned();
        if replaced == out {
            return out;
        }
        out = replaced;
    }
}
