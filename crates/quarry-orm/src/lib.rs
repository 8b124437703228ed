//! # quarry-orm
//!
//! The runtime half of the quarry object mapper: schema-driven tables
//! over an embedded SQLite pool, with MongoDB-style conditions compiled
//! by `quarry-core`.
//!
//! ```ignore
//! use quarry_core::{ColumnType, Cond, PropDef, TableSchema};
//! use quarry_orm::{CreateOptions, Db, Table};
//!
//! let card = Table::new(
//!     TableSchema::builder("card")
//!         .primary("_id", ColumnType::Text)
//!         .prop("front", PropDef::new(ColumnType::Text))
//!         .prop("tags", PropDef::new(ColumnType::StringArray).nullable())
//!         .timestamps()
//!         .build()?,
//! );
//!
//! let db = Db::connect("sqlite::memory:").await?;
//! db.init(&[&card]).await?;
//!
//! card.create(db.pool(), entry, &CreateOptions::default()).await?;
//!
//! let due = db
//!     .query(&card)
//!     .filter(Cond::eq("tags", "hanzi"))
//!     .sort("front", false)
//!     .all()
//!     .await?;
//! ```
//!
//! Writes flow find-first: the orchestrator compiles the condition once
//! into per-table primary-key sub-selects, and `UPDATE`/`DELETE`
//! statements wrap those, reusing the same parameter binder.

pub mod db;
pub mod error;
pub mod events;
mod row;
pub mod table;

pub use db::{Db, FindIds, JoinKind, JoinOn, JoinSpec, Query, SelectExpr, SetSpec};
pub use error::{OrmError, Result};
pub use events::SqlEvent;
pub use table::{CreateOptions, Table};
