//! Query orchestrator: joined reads and the find-then-write chains.
//!
//! `Db` owns the connection pool; `Query` is a consumable builder that
//! renders one SELECT (or the per-table id sub-selects that UPDATE and
//! DELETE reuse). Statement text carries identifiers and placeholder
//! tokens only; raw select fragments and postfixes are the documented
//! trusted escape hatches.

use std::collections::HashMap;

use futures::future::try_join_all;
use futures::TryStreamExt;
use quarry_core::{
    compile, escape_ident, get_value, Arg, Column, Cond, Entry, Params, SqlValue, TableSchema,
};
use sqlx::sqlite::SqliteRow;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{OrmError, Result};
use crate::events::{emit, Observer, SqlEvent};
use crate::row::{bind_value, decode_row};
use crate::table::Table;

/// Join flavors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// INNER JOIN.
    Inner,
    /// LEFT JOIN.
    Left,
    /// CROSS JOIN (no ON clause).
    Cross,
    /// NATURAL JOIN (ON clause inferred by the engine).
    Natural,
}

/// How a join is keyed.
#[derive(Debug, Clone)]
pub enum JoinOn {
    /// Equality between two columns.
    Columns(Column, Column),
    /// Trusted raw ON fragment.
    Raw(String),
    /// No ON clause (cross and natural joins).
    None,
}

/// One joined table.
#[derive(Debug)]
pub struct JoinSpec<'a> {
    /// Join flavor.
    pub kind: JoinKind,
    /// The joined table.
    pub table: &'a Table,
    /// Join key.
    pub on: JoinOn,
}

/// One select-list expression.
#[derive(Debug, Clone)]
pub enum SelectExpr {
    /// A schema column; its table's get-transform runs on the result.
    Col(Column),
    /// Trusted raw fragment; the result decodes without a transform.
    Raw(String),
}

/// A shared or per-table set map for [`Query::update`].
#[derive(Debug, Clone)]
pub enum SetSpec {
    /// One map applied to every target table, filtered per table to the
    /// columns it declares (`table__column` keys address one table
    /// explicitly).
    All(Entry),
    /// Explicit per-table maps; absent tables are skipped.
    PerTable(HashMap<String, Entry>),
}

/// Per-table primary-key sub-selects sharing one binder. The
/// orchestrator executes these into literal id lists before feeding
/// [`Table::update_by_ids`] and [`Table::delete_by_ids`].
#[derive(Debug, Clone)]
pub struct FindIds {
    /// `(table name, sub-select SQL)` per participating table.
    pub targets: Vec<(String, String)>,
    /// The binder holding every placeholder the sub-selects reference.
    pub params: Params,
}

/// Connection-pool owner and entry point for reads.
pub struct Db {
    pool: SqlitePool,
    observers: Vec<Observer>,
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl Db {
    /// Connects a pool to the given SQLite URL.
    ///
    /// # Errors
    ///
    /// `OrmError::Database` when the pool cannot connect.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(url).await?;
        info!(url = %url, "database connected");
        Ok(Self::new(pool))
    }

    /// Wraps an existing pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            observers: Vec::new(),
        }
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Registers a find-statement observer.
    pub fn on_event(&mut self, observer: impl Fn(&SqlEvent) + Send + Sync + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Initializes tables strictly sequentially, in the given
    /// dependency order.
    ///
    /// # Errors
    ///
    /// `OrmError::Database` when DDL fails; initialization stops at the
    /// first failure.
    pub async fn init(&self, tables: &[&Table]) -> Result<()> {
        for table in tables {
            table.init(&self.pool).await?;
        }
        Ok(())
    }

    /// Starts a query anchored on `table`.
    #[must_use]
    pub fn query<'a>(&'a self, table: &'a Table) -> Query<'a> {
        Query {
            db: self,
            table,
            joins: Vec::new(),
            select: Vec::new(),
            cond: Cond::And(Vec::new()),
            sort: None,
            limit: None,
            offset: None,
            postfix: None,
        }
    }
}

/// A consumable query builder.
#[derive(Debug)]
pub struct Query<'a> {
    db: &'a Db,
    table: &'a Table,
    joins: Vec<JoinSpec<'a>>,
    select: Vec<(String, SelectExpr)>,
    cond: Cond,
    sort: Option<(String, bool)>,
    limit: Option<u64>,
    offset: Option<u64>,
    postfix: Option<String>,
}

impl<'a> Query<'a> {
    /// Adds a join with an explicit kind and key.
    #[must_use]
    pub fn join(mut self, kind: JoinKind, table: &'a Table, on: JoinOn) -> Self {
        self.joins.push(JoinSpec { kind, table, on });
        self
    }

    /// INNER JOIN on a column equality.
    #[must_use]
    pub fn inner_join(self, table: &'a Table, left: Column, right: Column) -> Self {
        self.join(JoinKind::Inner, table, JoinOn::Columns(left, right))
    }

    /// LEFT JOIN on a column equality.
    #[must_use]
    pub fn left_join(self, table: &'a Table, left: Column, right: Column) -> Self {
        self.join(JoinKind::Left, table, JoinOn::Columns(left, right))
    }

    /// CROSS JOIN.
    #[must_use]
    pub fn cross_join(self, table: &'a Table) -> Self {
        self.join(JoinKind::Cross, table, JoinOn::None)
    }

    /// NATURAL JOIN.
    #[must_use]
    pub fn natural_join(self, table: &'a Table) -> Self {
        self.join(JoinKind::Natural, table, JoinOn::None)
    }

    /// Sets the condition; the default matches everything.
    #[must_use]
    pub fn filter(mut self, cond: Cond) -> Self {
        self.cond = cond;
        self
    }

    /// Adds a schema column to the select list under its
    /// `table__column` alias.
    #[must_use]
    pub fn select_col(mut self, col: Column) -> Self {
        self.select.push((col.alias(), SelectExpr::Col(col)));
        self
    }

    /// Adds a select expression under an explicit alias.
    #[must_use]
    pub fn select(mut self, alias: &str, expr: SelectExpr) -> Self {
        self.select.push((String::from(alias), expr));
        self
    }

    /// Sorts by one key, descending when `desc`. The key may be a
    /// bare column, a select alias, or a dotted `table.column` path.
    #[must_use]
    pub fn sort(mut self, key: &str, desc: bool) -> Self {
        self.sort = Some((String::from(key), desc));
        self
    }

    /// Sorts by a column handle, rendered fully qualified.
    #[must_use]
    pub fn sort_col(self, col: &Column, desc: bool) -> Self {
        self.sort(&col.qualified(), desc)
    }

    /// Caps the result count.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips leading rows.
    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Appends a trusted raw fragment to the statement.
    #[must_use]
    pub fn postfix(mut self, sql: &str) -> Self {
        self.postfix = Some(String::from(sql));
        self
    }

    /// Runs the query and returns every row as a logical entry.
    ///
    /// # Errors
    ///
    /// `OrmError::Core` for compile or transform failures,
    /// `OrmError::Database` for engine errors.
    pub async fn all(self) -> Result<Vec<Entry>> {
        let (sql, values, alias_map) = self.lower()?;
        debug!(sql = %sql, "executing select");
        let mut query = sqlx::query(&sql);
        for value in values {
            query = bind_value(query, value);
        }
        let rows = query.fetch_all(&self.db.pool).await?;
        rows.iter()
            .map(|row| self.lift_row(row, &alias_map))
            .collect()
    }

    /// Runs the query with `LIMIT 1` and returns the first row, if any.
    ///
    /// # Errors
    ///
    /// Same as [`Query::all`].
    pub async fn first(self) -> Result<Option<Entry>> {
        let mut rows = self.limit(1).all().await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    /// Counts matching rows without fetching them.
    ///
    /// # Errors
    ///
    /// Same as [`Query::all`].
    pub async fn count(self) -> Result<i64> {
        let mut params = Params::new();
        self.emit_pre_find();
        let where_clause = compile(&self.cond, &self.schemas(), &mut params)?;
        let stmt = format!(
            "SELECT COUNT(*) FROM {} WHERE {where_clause}",
            self.from_clause()
        );
        self.emit_find_sql(&stmt, &params);
        let (sql, values) = params.reindex(&stmt)?;
        debug!(sql = %sql, "executing count");
        let mut query = sqlx::query(&sql);
        for value in values {
            query = bind_value(query, value);
        }
        let row = query.fetch_one(&self.db.pool).await?;
        Ok(sqlx::Row::try_get(&row, 0)?)
    }

    /// Streams matching rows through a callback without materializing
    /// the whole result set. Returns the number of rows visited.
    ///
    /// # Errors
    ///
    /// Same as [`Query::all`].
    pub async fn each<F>(self, mut f: F) -> Result<u64>
    where
        F: FnMut(Entry),
    {
        let (sql, values, alias_map) = self.lower()?;
        debug!(sql = %sql, "streaming select");
        let mut query = sqlx::query(&sql);
        for value in values {
            query = bind_value(query, value);
        }
        let mut rows = query.fetch(&self.db.pool);
        let mut visited = 0;
        while let Some(row) = rows.try_next().await? {
            f(self.lift_row(&row, &alias_map)?);
            visited += 1;
        }
        Ok(visited)
    }

    /// Compiles the condition once and renders, per participating
    /// table, a sub-select of that table's primary keys.
    ///
    /// # Errors
    ///
    /// `OrmError::Core` for compile failures.
    pub fn find_ids(&self) -> Result<FindIds> {
        let mut params = Params::new();
        let where_clause = compile(&self.cond, &self.schemas(), &mut params)?;
        let from = self.from_clause();
        let targets = self
            .tables()
            .iter()
            .map(|table| {
                let schema = table.schema();
                let sub = format!(
                    "SELECT DISTINCT {}.{} FROM {from} WHERE {where_clause}",
                    escape_ident(&schema.name),
                    escape_ident(schema.primary_key_name())
                );
                (schema.name.clone(), sub)
            })
            .collect();
        Ok(FindIds { targets, params })
    }

    /// Updates matching rows in every target table. Every table's id
    /// list is resolved before the first UPDATE runs; the per-table
    /// statements then dispatch concurrently and the affected-row counts
    /// are summed.
    ///
    /// # Errors
    ///
    /// Same as [`Query::all`], plus transform failures from set maps.
    pub async fn update(self, set: &SetSpec) -> Result<u64> {
        let targets = self.resolve_ids().await?;
        let tables = self.tables();
        let mut pending = Vec::with_capacity(targets.len());
        for (name, ids) in &targets {
            let Some(table) = tables.iter().find(|t| t.name() == name) else {
                continue;
            };
            let entry = match set {
                SetSpec::All(entry) => set_for_table(table.schema(), entry),
                SetSpec::PerTable(map) => map.get(name).cloned().unwrap_or_default(),
            };
            if entry.is_empty() {
                continue;
            }
            pending.push(table.update_by_ids(&self.db.pool, ids, entry));
        }
        let counts = try_join_all(pending).await?;
        Ok(counts.into_iter().sum())
    }

    /// Deletes matching rows from every target table. Every table's id
    /// list is resolved before the first DELETE runs, so a delete
    /// against one table cannot remove the join rows a later table's
    /// condition depends on.
    ///
    /// # Errors
    ///
    /// Same as [`Query::all`].
    pub async fn delete(self) -> Result<u64> {
        let targets = self.resolve_ids().await?;
        let tables = self.tables();
        let mut pending = Vec::with_capacity(targets.len());
        for (name, ids) in &targets {
            let Some(table) = tables.iter().find(|t| t.name() == name) else {
                continue;
            };
            pending.push(table.delete_by_ids(&self.db.pool, ids));
        }
        let counts = try_join_all(pending).await?;
        Ok(counts.into_iter().sum())
    }

    /// Executes the [`Query::find_ids`] sub-selects into literal id
    /// lists, all of them before any write statement runs.
    async fn resolve_ids(&self) -> Result<Vec<(String, Vec<SqlValue>)>> {
        let FindIds { targets, params } = self.find_ids()?;
        let mut out = Vec::with_capacity(targets.len());
        for (name, sub) in targets {
            let (sql, values) = params.reindex(&sub)?;
            debug!(sql = %sql, "resolving write targets");
            let mut query = sqlx::query(&sql);
            for value in values {
                query = bind_value(query, value);
            }
            let rows = query.fetch_all(&self.db.pool).await?;
            let mut ids = Vec::with_capacity(rows.len());
            for row in &rows {
                let mut decoded = decode_row(row)?;
                ids.push(decoded.swap_remove(0).1);
            }
            out.push((name, ids));
        }
        Ok(out)
    }

    fn tables(&self) -> Vec<&'a Table> {
        let mut out = Vec::with_capacity(self.joins.len() + 1);
        out.push(self.table);
        out.extend(self.joins.iter().map(|j| j.table));
        out
    }

    fn schemas(&self) -> Vec<&'a TableSchema> {
        self.tables().into_iter().map(Table::schema).collect()
    }

    /// Renders the full SELECT, lowers it to positional form and
    /// returns the alias map for result transforms.
    fn lower(&self) -> Result<(String, Vec<SqlValue>, HashMap<String, Column>)> {
        self.emit_pre_find();
        let mut params = Params::new();
        let (select_clause, alias_map) = self.select_clause()?;
        let where_clause = compile(&self.cond, &self.schemas(), &mut params)?;

        let mut stmt = format!(
            "SELECT {select_clause} FROM {} WHERE {where_clause}",
            self.from_clause()
        );
        if let Some((key, desc)) = &self.sort {
            stmt.push_str(" ORDER BY ");
            stmt.push_str(&escape_ident(key));
            stmt.push_str(if *desc { " DESC" } else { " ASC" });
        }
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => stmt.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => stmt.push_str(&format!(" LIMIT {limit}")),
            // SQLite only accepts OFFSET after a LIMIT
            (None, Some(offset)) => stmt.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }
        if let Some(postfix) = &self.postfix {
            stmt.push(' ');
            stmt.push_str(postfix);
        }

        self.emit_find_sql(&stmt, &params);
        let (sql, values) = params.reindex(&stmt)?;
        Ok((sql, values, alias_map))
    }

    fn select_clause(&self) -> Result<(String, HashMap<String, Column>)> {
        let mut alias_map = HashMap::new();

        if self.select.is_empty() {
            if self.joins.is_empty() {
                return Ok((String::from("*"), alias_map));
            }
            // joined select-all: every column of every table, aliased to
            // keep same-named columns apart
            let mut exprs = Vec::new();
            for schema in self.schemas() {
                let mut names: Vec<&str> = Vec::new();
                if schema.prop(schema.primary_key_name()).is_none()
                    && schema.primary_key_name() != "ROWID"
                {
                    names.push(schema.primary_key_name());
                }
                names.extend(schema.props.iter().map(|(k, _)| k.as_str()));
                for name in names {
                    let col = Column::new(&schema.name, name);
                    exprs.push(format!(
                        "{}.{} AS {}",
                        escape_ident(&col.table),
                        escape_ident(&col.name),
                        escape_ident(&col.alias())
                    ));
                    alias_map.insert(col.alias(), col);
                }
            }
            return Ok((exprs.join(", "), alias_map));
        }

        let schemas = self.schemas();
        let mut exprs = Vec::with_capacity(self.select.len());
        for (alias, expr) in &self.select {
            match expr {
                SelectExpr::Col(col) => {
                    if !schemas.iter().any(|s| s.name == col.table) {
                        return Err(OrmError::UnknownColumn(col.qualified()));
                    }
                    exprs.push(format!(
                        "{}.{} AS {}",
                        escape_ident(&col.table),
                        escape_ident(&col.name),
                        escape_ident(alias)
                    ));
                    alias_map.insert(alias.clone(), col.clone());
                }
                SelectExpr::Raw(sql) => {
                    exprs.push(format!("{sql} AS {}", escape_ident(alias)));
                }
            }
        }
        Ok((exprs.join(", "), alias_map))
    }

    fn from_clause(&self) -> String {
        let mut out = escape_ident(self.table.name());
        for join in &self.joins {
            let table = escape_ident(join.table.name());
            match (join.kind, &join.on) {
                (JoinKind::Cross, _) => out.push_str(&format!(" CROSS JOIN {table}")),
                (JoinKind::Natural, _) => out.push_str(&format!(" NATURAL JOIN {table}")),
                (kind, on) => {
                    let keyword = if kind == JoinKind::Left {
                        "LEFT JOIN"
                    } else {
                        "JOIN"
                    };
                    let on_sql = match on {
                        JoinOn::Columns(left, right) => format!(
                            "{}.{} = {}.{}",
                            escape_ident(&left.table),
                            escape_ident(&left.name),
                            escape_ident(&right.table),
                            escape_ident(&right.name)
                        ),
                        JoinOn::Raw(sql) => sql.clone(),
                        JoinOn::None => String::from("TRUE"),
                    };
                    out.push_str(&format!(" {keyword} {table} ON {on_sql}"));
                }
            }
        }
        out
    }

    /// Lifts one decoded row to logical values: aliases mapping to a
    /// known column run that table's get-transform, `table__column`
    /// aliases resolve by prefix, everything else resolves against the
    /// anchor table.
    fn lift_row(&self, row: &SqliteRow, alias_map: &HashMap<String, Column>) -> Result<Entry> {
        let schemas = self.schemas();
        let base = schemas[0];
        let mut entry = Entry::new();
        for (alias, value) in decode_row(row)? {
            let lifted = if let Some(col) = alias_map.get(&alias) {
                let schema = schemas
                    .iter()
                    .find(|s| s.name == col.table)
                    .copied()
                    .unwrap_or(base);
                get_value(schema, &col.name, value)?
            } else if let Some((table, name)) = alias.split_once("__") {
                match schemas.iter().find(|s| s.name == table) {
                    Some(schema) => get_value(schema, name, value)?,
                    None => Arg::from_sql(value),
                }
            } else {
                get_value(base, &alias, value)?
            };
            entry.insert(alias, lifted);
        }
        Ok(entry)
    }

    fn emit_pre_find(&self) {
        emit(&self.db.observers, &SqlEvent::PreFind {
            table: String::from(self.table.name()),
            cond: self.cond.clone(),
        });
    }

    fn emit_find_sql(&self, stmt: &str, params: &Params) {
        emit(&self.db.observers, &SqlEvent::FindSql {
            stmt: String::from(stmt),
            params: params.snapshot(),
        });
    }
}

/// Filters a shared set map down to one table: bare keys must be
/// declared columns, `table__column` keys must name this table.
fn set_for_table(schema: &TableSchema, entry: &Entry) -> Entry {
    let mut out = Entry::new();
    for (key, value) in entry {
        if let Some((table, name)) = key.split_once("__") {
            if table == schema.name {
                out.insert(String::from(name), value.clone());
            }
        } else if schema.prop(key).is_some() || key == schema.primary_key_name() {
            out.insert(key.clone(), value.clone());
        }
    }
    out
}
