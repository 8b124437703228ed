//! # quarry-core
//!
//! The pure SQL-text layer of the quarry object mapper: condition
//! compilation, parameter binding, identifier escaping, value
//! transforms and DDL generation. Nothing in this crate touches a
//! database; it produces statement text plus bound values for the
//! runtime crate to execute.
//!
//! ## Condition compilation
//!
//! Conditions are MongoDB-style documents (or the equivalent typed
//! builders) compiled to parameterized WHERE fragments:
//!
//! ```rust
//! use quarry_core::{compile, ColumnType, Cond, Params, PropDef, TableSchema};
//!
//! let schema = TableSchema::builder("card")
//!     .primary("_id", ColumnType::Text)
//!     .prop("front", PropDef::new(ColumnType::Text))
//!     .build()
//!     .unwrap();
//!
//! let mut params = Params::new();
//! let clause = compile(
//!     &Cond::eq("front", "Lorem ipsum"),
//!     &[&schema],
//!     &mut params,
//! )
//! .unwrap();
//!
//! // clause = "front = $xxxxxx"; the literal travels only as a bound value
//! let (sql, values) = params.reindex(&clause).unwrap();
//! assert_eq!(sql, "front = ?");
//! ```
//!
//! ## Injection stance
//!
//! Caller values never reach statement text. Identifiers pass through
//! keyword escaping, values through the placeholder pool; the only
//! rendered literals are schema-declared DDL defaults.

pub mod compile;
pub mod cond;
pub mod ddl;
pub mod error;
pub mod escape;
pub mod params;
pub mod schema;
pub mod transform;
pub mod value;

pub use compile::compile;
pub use cond::{Cond, FieldOp};
pub use ddl::{create_index_sql, create_table_sql};
pub use error::{CoreError, Result};
pub use escape::escape_ident;
pub use params::{Params, DEFAULT_CAPACITY};
pub use schema::{
    Column, ColumnType, CustomTransform, DefaultValue, Entry, NamedKeys, PrimaryDef, PrimaryName,
    PropDef, TableSchema, TableSchemaBuilder, ValueProvider,
};
pub use transform::{get_value, set_value, STR_ARRAY_SENTINEL};
pub use value::{date_from_millis, Arg, SqlValue, ToArg};
