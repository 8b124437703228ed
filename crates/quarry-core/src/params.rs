//! Per-statement parameter binding.
//!
//! Every compiled statement owns one `Params` instance. Placeholder
//! tokens come from a pre-shuffled pool of random names generated at
//! construction, so merging two fragments compiled against the same
//! `Params` (a find sub-select plus an UPDATE's SET list) can never
//! collide, and two statements compiled concurrently never share a
//! token namespace.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use rand::{rng, Rng};
use regex::Regex;

use crate::error::{CoreError, Result};
use crate::value::SqlValue;

/// Default pool capacity, matching SQLite's
/// `SQLITE_LIMIT_VARIABLE_NUMBER` default of 999.
pub const DEFAULT_CAPACITY: usize = 999;

const TOKEN_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Fixed suffix length keeps any token from being a prefix of another.
const TOKEN_LEN: usize = 6;

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$[A-Za-z0-9]{6}").expect("token pattern is valid")
});

/// A pool of placeholder tokens and the values bound to them while one
/// statement is being compiled.
#[derive(Debug, Clone)]
pub struct Params {
    pool: Vec<String>,
    values: HashMap<String, Option<SqlValue>>,
    capacity: usize,
}

impl Default for Params {
    fn default() -> Self {
        Self::new()
    }
}

impl Params {
    /// Creates a binder with the default 999-token capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a binder with an explicit capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let mut rng = rng();
        let mut seen = HashSet::with_capacity(capacity);
        while seen.len() < capacity {
            let mut token = String::with_capacity(TOKEN_LEN + 1);
            token.push('$');
            for _ in 0..TOKEN_LEN {
                token.push(TOKEN_CHARS[rng.random_range(0..TOKEN_CHARS.len())] as char);
            }
            seen.insert(token);
        }
        let mut pool: Vec<String> = seen.into_iter().collect();
        // HashSet iteration order is already arbitrary; the shuffle makes
        // the draw order independent of the hasher.
        for i in (1..pool.len()).rev() {
            pool.swap(i, rng.random_range(0..=i));
        }
        Self {
            pool,
            values: HashMap::new(),
            capacity,
        }
    }

    /// Binds a value and returns the placeholder token it lives under.
    ///
    /// # Errors
    ///
    /// `CoreError::ParamCapacity` when the pool is exhausted.
    pub fn add(&mut self, value: SqlValue) -> Result<String> {
        let token = self.reserve()?;
        self.values.insert(token.clone(), Some(value));
        Ok(token)
    }

    /// Draws a token without binding a value yet.
    ///
    /// The caller must supply the value through [`Params::bind`] before
    /// the statement is lowered for execution.
    ///
    /// # Errors
    ///
    /// `CoreError::ParamCapacity` when the pool is exhausted.
    pub fn reserve(&mut self) -> Result<String> {
        let token = self.pool.pop().ok_or(CoreError::ParamCapacity {
            capacity: self.capacity,
        })?;
        self.values.insert(token.clone(), None);
        Ok(token)
    }

    /// Binds a value under a previously reserved token.
    pub fn bind(&mut self, token: &str, value: SqlValue) {
        self.values.insert(String::from(token), Some(value));
    }

    /// Number of tokens drawn so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no tokens have been drawn.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Bound tokens and values, sorted by token, for observability hooks.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, SqlValue)> {
        let mut out: Vec<(String, SqlValue)> = self
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone().unwrap_or(SqlValue::Null)))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Lowers a compiled statement to positional form.
    ///
    /// The engine binding API is positional, so each occurrence of a
    /// token this binder issued is rewritten to `?` and its value
    /// emitted at the matching index. A `$` run the binder never issued
    /// stays verbatim; trusted raw fragments may legitimately contain
    /// `$` identifiers.
    ///
    /// # Errors
    ///
    /// `CoreError::UnboundPlaceholder` if the statement references a
    /// token that was reserved but never bound.
    pub fn reindex(&self, stmt: &str) -> Result<(String, Vec<SqlValue>)> {
        let mut out = String::with_capacity(stmt.len());
        let mut ordered = Vec::with_capacity(self.values.len());
        let mut last = 0;
        for m in TOKEN_RE.find_iter(stmt) {
            let token = m.as_str();
            let Some(slot) = self.values.get(token) else {
                continue;
            };
            let value = slot
                .clone()
                .ok_or_else(|| CoreError::UnboundPlaceholder(String::from(token)))?;
            out.push_str(&stmt[last..m.start()]);
            out.push('?');
            ordered.push(value);
            last = m.end();
        }
        out.push_str(&stmt[last..]);
        Ok((out, ordered))
    }
}
