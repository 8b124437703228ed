//! DDL generation from table schemas.
//!
//! Everything is `IF NOT EXISTS`, so table initialization is idempotent
//! and safe to repeat on every startup. Literal defaults are the one
//! place values are rendered into statement text; they come from schema
//! declarations, not callers, and are quoted here.

use crate::error::Result;
use crate::escape::escape_ident;
use crate::schema::{ColumnType, DefaultValue, PrimaryName, PropDef, TableSchema};
use crate::transform::STR_ARRAY_SENTINEL;
use crate::value::{Arg, SqlValue};

/// Renders the CREATE TABLE statement for a schema.
///
/// # Errors
///
/// Currently infallible; the signature leaves room for dialect checks.
pub fn create_table_sql(schema: &TableSchema) -> Result<String> {
    let mut defs: Vec<String> = Vec::with_capacity(schema.props.len() + 2);

    if let (PrimaryName::Single(name), Some(col_type)) =
        (&schema.primary.name, schema.primary.col_type)
    {
        let mut def = format!("{} {} PRIMARY KEY", escape_ident(name), col_type.storage());
        if schema.primary.autoincrement {
            def.push_str(" AUTOINCREMENT");
        }
        if let Some(default) = &schema.primary.default {
            if let Some(clause) = default_clause(default) {
                def.push(' ');
                def.push_str(&clause);
            }
        }
        defs.push(def);
    }

    for (name, prop) in &schema.props {
        defs.push(column_def(name, prop));
    }

    if let PrimaryName::Composite(keys) = &schema.primary.name {
        let cols: Vec<String> = keys.iter().map(|k| escape_ident(k)).collect();
        defs.push(format!("PRIMARY KEY ({})", cols.join(", ")));
    }

    let mut sql = format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        escape_ident(&schema.name),
        defs.join(", ")
    );
    if schema.without_rowid {
        sql.push_str(" WITHOUT ROWID");
    }
    Ok(sql)
}

/// Renders the CREATE INDEX statements for a schema: per-column named
/// UNIQUEs and indexes, then the composite ones.
#[must_use]
pub fn create_index_sql(schema: &TableSchema) -> Vec<String> {
    let table = escape_ident(&schema.name);
    let mut out = Vec::new();

    for (name, prop) in &schema.props {
        if let Some(constraint) = &prop.unique {
            out.push(index_stmt(constraint, true, &table, &[name]));
        }
        if let Some(index) = &prop.index {
            out.push(index_stmt(index, false, &table, &[name]));
        }
    }
    for constraint in &schema.unique {
        let keys: Vec<&str> = constraint.keys.iter().map(String::as_str).collect();
        out.push(index_stmt(&constraint.name, true, &table, &keys));
    }
    for index in &schema.index {
        let keys: Vec<&str> = index.keys.iter().map(String::as_str).collect();
        out.push(index_stmt(&index.name, false, &table, &keys));
    }
    out
}

fn index_stmt(name: &str, unique: bool, table: &str, keys: &[&str]) -> String {
    let cols: Vec<String> = keys.iter().map(|k| escape_ident(k)).collect();
    format!(
        "CREATE {}INDEX IF NOT EXISTS {} ON {table} ({})",
        if unique { "UNIQUE " } else { "" },
        escape_ident(name),
        cols.join(", ")
    )
}

fn column_def(name: &str, prop: &PropDef) -> String {
    let mut def = format!("{} {}", escape_ident(name), prop.col_type.storage());
    if !prop.nullable {
        def.push_str(" NOT NULL");
    }
    if let Some(default) = &prop.default {
        if let Some(clause) = default_clause(default) {
            def.push(' ');
            def.push_str(&clause);
        }
    }
    if let Some(collation) = &prop.collate {
        def.push_str(" COLLATE ");
        def.push_str(collation);
    }
    if let Some(target) = &prop.references {
        def.push_str(" REFERENCES ");
        def.push_str(target);
    }
    if prop.col_type == ColumnType::StringArray && prop.default.is_none() && !prop.nullable {
        // NOT NULL string arrays start out empty rather than failing the
        // first insert that omits them.
        def.push_str(&format!(" DEFAULT '{s}{s}'", s = STR_ARRAY_SENTINEL));
    }
    def
}

/// Renders a DDL DEFAULT clause. Provider defaults resolve at create
/// time instead and contribute nothing here.
fn default_clause(default: &DefaultValue) -> Option<String> {
    match default {
        DefaultValue::RawSql(sql) => Some(format!("DEFAULT ({sql})")),
        DefaultValue::Value(value) => Some(format!("DEFAULT {}", literal(value))),
        DefaultValue::Provider(_) => None,
    }
}

fn literal(value: &Arg) -> String {
    match value.clone().into_sql() {
        SqlValue::Null => String::from("NULL"),
        SqlValue::Bool(b) => String::from(if b { "1" } else { "0" }),
        SqlValue::Int(n) => n.to_string(),
        SqlValue::Float(f) => f.to_string(),
        SqlValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
        SqlValue::Blob(bytes) => {
            let hex: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
            format!("X'{hex}'")
        }
    }
}
