//! Statement lifecycle events.
//!
//! Tables and the query orchestrator each hold an explicit, ordered
//! observer list; registration is the only mutation and happens before
//! the object is shared. Observers run synchronously in registration
//! order, before the statement executes, and cannot veto it.

use quarry_core::{Cond, Entry, SqlValue};

/// A statement lifecycle event.
///
/// `*Sql` variants carry the final statement text and a sorted snapshot
/// of its bound parameters; `Pre*` variants fire earlier, with the
/// logical inputs.
#[derive(Debug, Clone)]
pub enum SqlEvent {
    /// DDL statement about to run during table initialization.
    BuildSql {
        /// Statement text.
        stmt: String,
    },
    /// A create is about to be assembled for `entry`.
    PreCreate {
        /// Target table.
        table: String,
        /// The partial entry, after provider fills.
        entry: Entry,
    },
    /// INSERT statement about to execute.
    CreateSql {
        /// Statement text with placeholder tokens.
        stmt: String,
        /// Bound parameters, sorted by token.
        params: Vec<(String, SqlValue)>,
    },
    /// An update is about to be assembled for `set`.
    PreUpdate {
        /// Target table.
        table: String,
        /// The set map, after provider fills.
        set: Entry,
    },
    /// UPDATE statement about to execute.
    UpdateSql {
        /// Statement text with placeholder tokens.
        stmt: String,
        /// Bound parameters, sorted by token.
        params: Vec<(String, SqlValue)>,
    },
    /// A delete is about to be assembled.
    PreDelete {
        /// Target table.
        table: String,
    },
    /// DELETE statement about to execute.
    DeleteSql {
        /// Statement text with placeholder tokens.
        stmt: String,
        /// Bound parameters, sorted by token.
        params: Vec<(String, SqlValue)>,
    },
    /// A find is about to be compiled.
    PreFind {
        /// Anchor table.
        table: String,
        /// The condition about to compile.
        cond: Cond,
    },
    /// SELECT statement about to execute.
    FindSql {
        /// Statement text with placeholder tokens.
        stmt: String,
        /// Bound parameters, sorted by token.
        params: Vec<(String, SqlValue)>,
    },
}

/// A registered event observer.
pub type Observer = Box<dyn Fn(&SqlEvent) + Send + Sync>;

/// Fires an event to each observer in registration order.
pub(crate) fn emit(observers: &[Observer], event: &SqlEvent) {
    for observer in observers {
        observer(event);
    }
}
