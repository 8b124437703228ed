//! Runtime table handle: DDL initialization and write paths.

use quarry_core::{
    create_index_sql, create_table_sql, escape_ident, set_value, Column, DefaultValue, Entry,
    Params, SqlValue, TableSchema,
};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::Result;
use crate::events::{emit, Observer, SqlEvent};
use crate::row::bind_value;

/// Primary keys bound per write statement; leaves headroom under the
/// binder's 999-token pool for the SET list.
const ID_CHUNK: usize = 900;

fn id_tokens(params: &mut Params, ids: &[SqlValue]) -> Result<Vec<String>> {
    ids.iter()
        .map(|id| Ok(params.add(id.clone())?))
        .collect()
}

/// Options for [`Table::create`].
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Append `ON CONFLICT DO NOTHING`: constraint collisions insert
    /// nothing instead of failing.
    pub ignore_errors: bool,
    /// Trusted raw SQL appended to the statement.
    pub postfix: Option<String>,
}

/// A runtime handle over one table schema.
///
/// Owns the write paths (create, and the id-list driven update and
/// delete the orchestrator feeds). Reads go through
/// [`crate::db::Db::query`].
pub struct Table {
    schema: TableSchema,
    observers: Vec<Observer>,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("schema", &self.schema)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl Table {
    /// Wraps a schema in a runtime handle.
    #[must_use]
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            observers: Vec::new(),
        }
    }

    /// The underlying schema.
    #[must_use]
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Physical table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    /// A column handle for select, join and sort clauses.
    #[must_use]
    pub fn col(&self, name: &str) -> Column {
        Column::new(&self.schema.name, name)
    }

    /// Registers a statement observer. Observers run synchronously in
    /// registration order.
    pub fn on_event(&mut self, observer: impl Fn(&SqlEvent) + Send + Sync + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Creates the table and its indexes, idempotently.
    ///
    /// Initialization across related tables is sequential; the caller
    /// supplies dependency order.
    ///
    /// # Errors
    ///
    /// `OrmError::Database` when the engine rejects the DDL.
    pub async fn init(&self, pool: &SqlitePool) -> Result<()> {
        let table_sql = create_table_sql(&self.schema)?;
        emit(&self.observers, &SqlEvent::BuildSql {
            stmt: table_sql.clone(),
        });
        debug!(sql = %table_sql, "creating table");
        sqlx::query(&table_sql).execute(pool).await?;

        for index_sql in create_index_sql(&self.schema) {
            emit(&self.observers, &SqlEvent::BuildSql {
                stmt: index_sql.clone(),
            });
            debug!(sql = %index_sql, "creating index");
            sqlx::query(&index_sql).execute(pool).await?;
        }
        info!(table = %self.schema.name, "table initialized");
        Ok(())
    }

    /// Inserts one entry, returning `last_insert_rowid`.
    ///
    /// Omitted fields are filled from create-time default providers and
    /// on-change providers; set-transforms lower every value before
    /// binding.
    ///
    /// # Errors
    ///
    /// `OrmError::Core` for transform or capacity failures,
    /// `OrmError::Database` for engine errors. Constraint violations
    /// propagate verbatim unless `options.ignore_errors` is set.
    pub async fn create(
        &self,
        pool: &SqlitePool,
        entry: Entry,
        options: &CreateOptions,
    ) -> Result<i64> {
        let entry = self.fill_create(entry);
        emit(&self.observers, &SqlEvent::PreCreate {
            table: self.schema.name.clone(),
            entry: entry.clone(),
        });

        let mut params = Params::new();
        let mut stmt = if entry.is_empty() {
            format!(
                "INSERT INTO {} DEFAULT VALUES",
                escape_ident(&self.schema.name)
            )
        } else {
            let mut cols = Vec::with_capacity(entry.len());
            let mut tokens = Vec::with_capacity(entry.len());
            for (key, value) in entry {
                let stored = set_value(&self.schema, &key, value)?;
                cols.push(escape_ident(&key));
                tokens.push(params.add(stored)?);
            }
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                escape_ident(&self.schema.name),
                cols.join(", "),
                tokens.join(", ")
            )
        };
        if options.ignore_errors {
            stmt.push_str(" ON CONFLICT DO NOTHING");
        }
        if let Some(postfix) = &options.postfix {
            stmt.push(' ');
            stmt.push_str(postfix);
        }

        emit(&self.observers, &SqlEvent::CreateSql {
            stmt: stmt.clone(),
            params: params.snapshot(),
        });

        let (sql, values) = params.reindex(&stmt)?;
        debug!(sql = %sql, "executing insert");
        let mut query = sqlx::query(&sql);
        for value in values {
            query = bind_value(query, value);
        }
        let result = query.execute(pool).await?;
        Ok(result.last_insert_rowid())
    }

    /// Updates every row whose primary key appears in `ids`.
    ///
    /// The orchestrator resolves the id lists before any write runs, so
    /// a statement against one table cannot disturb what a later table's
    /// condition would have matched. Keys bind in chunks to stay inside
    /// the placeholder pool.
    ///
    /// # Errors
    ///
    /// `OrmError::Core` for transform or capacity failures,
    /// `OrmError::Database` for engine errors.
    pub async fn update_by_ids(
        &self,
        pool: &SqlitePool,
        ids: &[SqlValue],
        set: Entry,
    ) -> Result<u64> {
        let set = self.fill_update(set);
        emit(&self.observers, &SqlEvent::PreUpdate {
            table: self.schema.name.clone(),
            set: set.clone(),
        });
        if set.is_empty() || ids.is_empty() {
            return Ok(0);
        }

        let mut changed = 0;
        for chunk in ids.chunks(ID_CHUNK) {
            let mut params = Params::new();
            let mut assignments = Vec::with_capacity(set.len());
            for (key, value) in &set {
                let stored = set_value(&self.schema, key, value.clone())?;
                let token = params.add(stored)?;
                assignments.push(format!("{} = {token}", escape_ident(key)));
            }
            let stmt = format!(
                "UPDATE {} SET {} WHERE {} IN ({})",
                escape_ident(&self.schema.name),
                assignments.join(", "),
                escape_ident(self.schema.primary_key_name()),
                id_tokens(&mut params, chunk)?.join(", ")
            );

            emit(&self.observers, &SqlEvent::UpdateSql {
                stmt: stmt.clone(),
                params: params.snapshot(),
            });

            let (sql, values) = params.reindex(&stmt)?;
            debug!(sql = %sql, "executing update");
            let mut query = sqlx::query(&sql);
            for value in values {
                query = bind_value(query, value);
            }
            changed += query.execute(pool).await?.rows_affected();
        }
        Ok(changed)
    }

    /// Deletes every row whose primary key appears in `ids`.
    ///
    /// # Errors
    ///
    /// `OrmError::Core` for capacity failures, `OrmError::Database` for
    /// engine errors.
    pub async fn delete_by_ids(&self, pool: &SqlitePool, ids: &[SqlValue]) -> Result<u64> {
        emit(&self.observers, &SqlEvent::PreDelete {
            table: self.schema.name.clone(),
        });
        if ids.is_empty() {
            return Ok(0);
        }

        let mut removed = 0;
        for chunk in ids.chunks(ID_CHUNK) {
            let mut params = Params::new();
            let stmt = format!(
                "DELETE FROM {} WHERE {} IN ({})",
                escape_ident(&self.schema.name),
                escape_ident(self.schema.primary_key_name()),
                id_tokens(&mut params, chunk)?.join(", ")
            );
            emit(&self.observers, &SqlEvent::DeleteSql {
                stmt: stmt.clone(),
                params: params.snapshot(),
            });

            let (sql, values) = params.reindex(&stmt)?;
            debug!(sql = %sql, "executing delete");
            let mut query = sqlx::query(&sql);
            for value in values {
                query = bind_value(query, value);
            }
            removed += query.execute(pool).await?.rows_affected();
        }
        Ok(removed)
    }

    /// Fills omitted fields from create-time providers: the primary
    /// key's default, column default providers, then on-change
    /// providers. Literal and raw-SQL defaults stay in the DDL.
    fn fill_create(&self, mut entry: Entry) -> Entry {
        if let Some(DefaultValue::Provider(provider)) = &self.schema.primary.default {
            let pk = self.schema.primary_key_name();
            if !entry.contains_key(pk) {
                let value = provider(&entry);
                entry.insert(String::from(pk), value);
            }
        }
        for (name, prop) in &self.schema.props {
            if entry.contains_key(name) {
                continue;
            }
            if let Some(DefaultValue::Provider(provider)) = &prop.default {
                let value = provider(&entry);
                entry.insert(name.clone(), value);
            } else if let Some(provider) = &prop.on_change {
                let value = provider(&entry);
                entry.insert(name.clone(), value);
            }
        }
        entry
    }

    /// Fills unset fields from on-update and on-change providers.
    fn fill_update(&self, mut set: Entry) -> Entry {
        for (name, prop) in &self.schema.props {
            if set.contains_key(name) {
                continue;
            }
            let provider = prop.on_update.as_ref().or(prop.on_change.as_ref());
            if let Some(provider) = provider {
                let value = provider(&set);
                set.insert(name.clone(), value);
            }
        }
        set
    }
}
