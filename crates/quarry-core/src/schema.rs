//! Static entity metadata.
//!
//! A `TableSchema` is built once per entity through the declarative
//! builder, before any runtime table object exists, and is immutable
//! afterwards. Everything downstream — DDL generation, the condition
//! compiler's string-array detection, transform lookup — reads from it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;

use crate::error::{CoreError, Result};
use crate::value::{Arg, SqlValue};

/// A partial entity record, keyed by logical column name.
pub type Entry = BTreeMap<String, Arg>;

/// Computes a column value from the partial entry being written.
pub type ValueProvider = Arc<dyn Fn(&Entry) -> Arg + Send + Sync>;

/// Closed set of column storage types: the four SQLite native types plus
/// the extended logical types that alias onto them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Native TEXT.
    Text,
    /// Native INTEGER.
    Integer,
    /// Native REAL.
    Real,
    /// Native BLOB.
    Blob,
    /// Logical boolean, stored as INTEGER 0/1.
    Boolean,
    /// Logical datetime, stored as composite JSON TEXT.
    Date,
    /// Arbitrary JSON document, stored as TEXT.
    Json,
    /// String array, stored as sentinel-delimited TEXT.
    StringArray,
}

impl ColumnType {
    /// Resolves a friendly type alias to a column type.
    ///
    /// Accepts the native names, class-style names (`String`, `Number`,
    /// `Object`...), and the short aliases (`str`, `int`, `bool`...).
    #[must_use]
    pub fn from_alias(alias: &str) -> Option<Self> {
        match alias {
            "TEXT" | "String" | "str" | "string" => Some(Self::Text),
            "INTEGER" | "int" | "integer" => Some(Self::Integer),
            "REAL" | "Number" | "float" => Some(Self::Real),
            "BLOB" | "ArrayBuffer" | "bin" | "binary" => Some(Self::Blob),
            "Boolean" | "boolean" | "bool" => Some(Self::Boolean),
            "Date" => Some(Self::Date),
            "JSON" | "Object" => Some(Self::Json),
            "StringArray" => Some(Self::StringArray),
            _ => None,
        }
    }

    /// The native SQLite storage type this column declares in DDL.
    #[must_use]
    pub const fn storage(self) -> &'static str {
        match self {
            Self::Text | Self::Date | Self::Json | Self::StringArray => "TEXT",
            Self::Integer | Self::Boolean => "INTEGER",
            Self::Real => "REAL",
            Self::Blob => "BLOB",
        }
    }
}

/// A column default, resolved either in DDL or at create time.
#[derive(Clone)]
pub enum DefaultValue {
    /// A literal, rendered into the DDL DEFAULT clause.
    Value(Arg),
    /// Trusted raw SQL rendered verbatim into the DEFAULT clause.
    RawSql(String),
    /// Computed per-row at create time from the partial entry.
    Provider(ValueProvider),
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::RawSql(s) => f.debug_tuple("RawSql").field(s).finish(),
            Self::Provider(_) => f.write_str("Provider(..)"),
        }
    }
}

/// Custom per-column transform halves. An unspecified half falls back to
/// the registry default for the column's type.
#[derive(Clone, Default)]
pub struct CustomTransform {
    /// Stored representation to logical value.
    pub get: Option<Arc<dyn Fn(SqlValue) -> std::result::Result<Arg, String> + Send + Sync>>,
    /// Logical value to stored representation.
    pub set: Option<Arc<dyn Fn(Arg) -> std::result::Result<SqlValue, String> + Send + Sync>>,
}

impl fmt::Debug for CustomTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomTransform")
            .field("get", &self.get.as_ref().map(|_| ".."))
            .field("set", &self.set.as_ref().map(|_| ".."))
            .finish()
    }
}

/// One non-primary column definition.
#[derive(Clone)]
pub struct PropDef {
    /// Storage type.
    pub col_type: ColumnType,
    /// Whether NULL is allowed (NOT NULL otherwise).
    pub nullable: bool,
    /// Named single-column UNIQUE constraint.
    pub unique: Option<String>,
    /// Named single-column index.
    pub index: Option<String>,
    /// COLLATE clause for the column.
    pub collate: Option<String>,
    /// REFERENCES clause target, e.g. `deck(id)`.
    pub references: Option<String>,
    /// Default, applied in DDL or at create time.
    pub default: Option<DefaultValue>,
    /// Provider applied on update when the field is not set explicitly.
    pub on_update: Option<ValueProvider>,
    /// Provider applied on both create and update when unset.
    pub on_change: Option<ValueProvider>,
    /// Custom transform overriding the type default.
    pub transform: Option<CustomTransform>,
}

impl fmt::Debug for PropDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropDef")
            .field("col_type", &self.col_type)
            .field("nullable", &self.nullable)
            .field("unique", &self.unique)
            .field("index", &self.index)
            .field("collate", &self.collate)
            .field("references", &self.references)
            .field("default", &self.default)
            .field("on_update", &self.on_update.as_ref().map(|_| ".."))
            .field("on_change", &self.on_change.as_ref().map(|_| ".."))
            .field("transform", &self.transform)
            .finish()
    }
}

impl PropDef {
    /// Creates a NOT NULL column of the given type.
    #[must_use]
    pub fn new(col_type: ColumnType) -> Self {
        Self {
            col_type,
            nullable: false,
            unique: None,
            index: None,
            collate: None,
            references: None,
            default: None,
            on_update: None,
            on_change: None,
            transform: None,
        }
    }

    /// Allows NULL for this column.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Adds a named single-column UNIQUE constraint.
    #[must_use]
    pub fn unique(mut self, name: &str) -> Self {
        self.unique = Some(String::from(name));
        self
    }

    /// Adds a named single-column index.
    #[must_use]
    pub fn index(mut self, name: &str) -> Self {
        self.index = Some(String::from(name));
        self
    }

    /// Sets the column COLLATE clause.
    #[must_use]
    pub fn collate(mut self, collation: &str) -> Self {
        self.collate = Some(String::from(collation));
        self
    }

    /// Sets the REFERENCES target.
    #[must_use]
    pub fn references(mut self, target: &str) -> Self {
        self.references = Some(String::from(target));
        self
    }

    /// Sets a literal default.
    #[must_use]
    pub fn default_value(mut self, value: Arg) -> Self {
        self.default = Some(DefaultValue::Value(value));
        self
    }

    /// Sets a trusted raw-SQL default.
    #[must_use]
    pub fn default_raw(mut self, sql: &str) -> Self {
        self.default = Some(DefaultValue::RawSql(String::from(sql)));
        self
    }

    /// Sets a create-time default provider.
    #[must_use]
    pub fn default_provider(
        mut self,
        provider: impl Fn(&Entry) -> Arg + Send + Sync + 'static,
    ) -> Self {
        self.default = Some(DefaultValue::Provider(Arc::new(provider)));
        self
    }

    /// Sets an update-time provider for unset fields.
    #[must_use]
    pub fn on_update(
        mut self,
        provider: impl Fn(&Entry) -> Arg + Send + Sync + 'static,
    ) -> Self {
        self.on_update = Some(Arc::new(provider));
        self
    }

    /// Sets a provider applied on both create and update when unset.
    #[must_use]
    pub fn on_change(
        mut self,
        provider: impl Fn(&Entry) -> Arg + Send + Sync + 'static,
    ) -> Self {
        self.on_change = Some(Arc::new(provider));
        self
    }

    /// Overrides the type-default transform for this column.
    #[must_use]
    pub fn transform(mut self, transform: CustomTransform) -> Self {
        self.transform = Some(transform);
        self
    }
}

/// Primary key column name(s).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimaryName {
    /// Single-column primary key.
    Single(String),
    /// Composite primary key.
    Composite(Vec<String>),
}

/// Primary key definition.
#[derive(Debug, Clone)]
pub struct PrimaryDef {
    /// Key column name(s).
    pub name: PrimaryName,
    /// Storage type when the key declares its own column; `None` for a
    /// composite key over existing props.
    pub col_type: Option<ColumnType>,
    /// AUTOINCREMENT flag; only valid for single INTEGER keys.
    pub autoincrement: bool,
    /// Default value for the key column.
    pub default: Option<DefaultValue>,
}

/// A named composite constraint (UNIQUE or index).
#[derive(Debug, Clone)]
pub struct NamedKeys {
    /// Constraint/index name.
    pub name: String,
    /// The columns it spans, in order.
    pub keys: Vec<String>,
}

/// A lightweight column reference used in select, join and sort clauses.
///
/// Never owns data; resolves lazily through the owning table's schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Physical name of the owning table.
    pub table: String,
    /// Column name within that table.
    pub name: String,
}

impl Column {
    /// Creates a column handle.
    #[must_use]
    pub fn new(table: &str, name: &str) -> Self {
        Self {
            table: String::from(table),
            name: String::from(name),
        }
    }

    /// The dotted `table.column` form, before identifier escaping.
    #[must_use]
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.table, self.name)
    }

    /// The `table__column` alias form used to disambiguate joined
    /// result sets.
    #[must_use]
    pub fn alias(&self) -> String {
        format!("{}__{}", self.table, self.name)
    }
}

/// Immutable description of one entity table.
#[derive(Debug, Clone)]
pub struct TableSchema {
    /// Physical table name.
    pub name: String,
    /// Primary key definition.
    pub primary: PrimaryDef,
    /// Column definitions in declaration order.
    pub props: Vec<(String, PropDef)>,
    /// Named composite UNIQUE constraints.
    pub unique: Vec<NamedKeys>,
    /// Named composite indexes.
    pub index: Vec<NamedKeys>,
    /// Synthesize a `createdAt` timestamp column.
    pub created_at: bool,
    /// Synthesize an `updatedAt` timestamp column.
    pub updated_at: bool,
    /// Emit WITHOUT ROWID in DDL.
    pub without_rowid: bool,
}

impl TableSchema {
    /// Starts building a schema for the named table.
    #[must_use]
    pub fn builder(name: &str) -> TableSchemaBuilder {
        TableSchemaBuilder {
            name: String::from(name),
            primary: None,
            props: Vec::new(),
            unique: Vec::new(),
            index: Vec::new(),
            created_at: false,
            updated_at: false,
            without_rowid: false,
        }
    }

    /// Looks up a column definition by logical name.
    #[must_use]
    pub fn prop(&self, name: &str) -> Option<&PropDef> {
        self.props.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// The column name destructive operations key on: the single primary
    /// key when one is declared, `ROWID` otherwise.
    #[must_use]
    pub fn primary_key_name(&self) -> &str {
        match &self.primary.name {
            PrimaryName::Single(name) => name,
            PrimaryName::Composite(_) => "ROWID",
        }
    }

    /// Names of all string-array columns, for containment compilation.
    pub fn string_array_props(&self) -> impl Iterator<Item = &str> {
        self.props
            .iter()
            .filter(|(_, p)| p.col_type == ColumnType::StringArray)
            .map(|(k, _)| k.as_str())
    }
}

/// Declarative builder producing a validated [`TableSchema`].
#[derive(Debug)]
pub struct TableSchemaBuilder {
    name: String,
    primary: Option<PrimaryDef>,
    props: Vec<(String, PropDef)>,
    unique: Vec<NamedKeys>,
    index: Vec<NamedKeys>,
    created_at: bool,
    updated_at: bool,
    without_rowid: bool,
}

impl TableSchemaBuilder {
    /// Declares a single-column primary key of the given type.
    #[must_use]
    pub fn primary(mut self, name: &str, col_type: ColumnType) -> Self {
        self.primary = Some(PrimaryDef {
            name: PrimaryName::Single(String::from(name)),
            col_type: Some(col_type),
            autoincrement: false,
            default: None,
        });
        self
    }

    /// Declares an AUTOINCREMENT INTEGER primary key.
    #[must_use]
    pub fn primary_auto(mut self, name: &str) -> Self {
        self.primary = Some(PrimaryDef {
            name: PrimaryName::Single(String::from(name)),
            col_type: Some(ColumnType::Integer),
            autoincrement: true,
            default: None,
        });
        self
    }

    /// Declares a composite primary key over already-declared props.
    #[must_use]
    pub fn primary_composite(mut self, keys: &[&str]) -> Self {
        self.primary = Some(PrimaryDef {
            name: PrimaryName::Composite(keys.iter().map(|k| String::from(*k)).collect()),
            col_type: None,
            autoincrement: false,
            default: None,
        });
        self
    }

    /// Adds a column.
    #[must_use]
    pub fn prop(mut self, name: &str, def: PropDef) -> Self {
        self.props.push((String::from(name), def));
        self
    }

    /// Adds a named composite UNIQUE constraint.
    #[must_use]
    pub fn unique(mut self, name: &str, keys: &[&str]) -> Self {
        self.unique.push(NamedKeys {
            name: String::from(name),
            keys: keys.iter().map(|k| String::from(*k)).collect(),
        });
        self
    }

    /// Adds a named composite index.
    #[must_use]
    pub fn index(mut self, name: &str, keys: &[&str]) -> Self {
        self.index.push(NamedKeys {
            name: String::from(name),
            keys: keys.iter().map(|k| String::from(*k)).collect(),
        });
        self
    }

    /// Enables both `createdAt` and `updatedAt` timestamp columns.
    #[must_use]
    pub fn timestamps(mut self) -> Self {
        self.created_at = true;
        self.updated_at = true;
        self
    }

    /// Emits WITHOUT ROWID in the table DDL.
    #[must_use]
    pub fn without_rowid(mut self) -> Self {
        self.without_rowid = true;
        self
    }

    /// Validates and produces the immutable schema.
    ///
    /// # Errors
    ///
    /// `CoreError::Schema` for duplicate columns, AUTOINCREMENT on a
    /// non-INTEGER or composite key, or constraints over undeclared
    /// columns.
    pub fn build(mut self) -> Result<TableSchema> {
        if self.created_at {
            self.props.push((
                String::from("createdAt"),
                PropDef::new(ColumnType::Date).default_provider(|_| Arg::Date(Utc::now())),
            ));
        }
        if self.updated_at {
            self.props.push((
                String::from("updatedAt"),
                PropDef::new(ColumnType::Date)
                    .nullable()
                    .on_change(|_| Arg::Date(Utc::now())),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for (name, _) in &self.props {
            if !seen.insert(name.as_str()) {
                return Err(CoreError::Schema(format!(
                    "duplicate column '{name}' in table '{}'",
                    self.name
                )));
            }
        }

        let primary = self.primary.unwrap_or(PrimaryDef {
            name: PrimaryName::Single(String::from("ROWID")),
            col_type: None,
            autoincrement: false,
            default: None,
        });

        if primary.autoincrement {
            match (&primary.name, primary.col_type) {
                (PrimaryName::Single(_), Some(t)) if t.storage() == "INTEGER" => {}
                _ => {
                    return Err(CoreError::Schema(format!(
                        "AUTOINCREMENT requires a single INTEGER primary key in table '{}'",
                        self.name
                    )))
                }
            }
        }

        if let PrimaryName::Composite(keys) = &primary.name {
            for key in keys {
                if !seen.contains(key.as_str()) {
                    return Err(CoreError::Schema(format!(
                        "composite primary key references undeclared column '{key}'"
                    )));
                }
            }
        }

        for constraint in self.unique.iter().chain(self.index.iter()) {
            for key in &constraint.keys {
                if !seen.contains(key.as_str()) {
                    return Err(CoreError::Schema(format!(
                        "constraint '{}' references undeclared column '{key}'",
                        constraint.name
                    )));
                }
            }
        }

        Ok(TableSchema {
            name: self.name,
            primary,
            props: self.props,
            unique: self.unique,
            index: self.index,
            created_at: self.created_at,
            updated_at: self.updated_at,
            without_rowid: self.without_rowid,
        })
    }
}
