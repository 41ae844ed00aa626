//! Relational store contract
//!
//! The search core only needs three things from the authoritative store:
//! run a parameterized `SELECT`, run an `INSERT ... RETURNING id`, and
//! report which SQL dialect to render. Rows come back as column/value maps
//! so the same record mapping works for every backend.

use std::collections::BTreeMap;

use super::dialect::SqlDialect;
use super::filter::{SqlQuery, SqlValue};
use crate::error::{MemError, Result};
use crate::types::{JsonMap, RecordId};

/// Column/value map for one result row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordRow {
    columns: BTreeMap<String, SqlValue>,
}

impl RecordRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, value: SqlValue) {
        self.columns.insert(column.into(), value);
    }

    pub fn with(mut self, column: &str, value: impl Into<SqlValue>) -> Self {
        self.insert(column, value.into());
        self
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns.get(column)
    }

    /// Integer column; integral text and reals are accepted
    pub fn get_i64(&self, column: &str) -> Result<i64> {
        match self.get(column) {
            Some(SqlValue::Integer(i)) => Ok(*i),
            Some(SqlValue::Real(f)) if f.fract() == 0.0 => Ok(*f as i64),
            Some(SqlValue::Text(s)) => s.trim().parse().map_err(|_| {
                MemError::Storage(format!("column '{}' is not an integer: {:?}", column, s))
            }),
            Some(other) => Err(MemError::Storage(format!(
                "column '{}' is not an integer: {:?}",
                column, other
            ))),
            None => Err(MemError::Storage(format!("missing column '{}'", column))),
        }
    }

    /// Record id column, which every row must carry
    pub fn id(&self) -> Result<RecordId> {
        self.get_i64("id")
    }

    /// Text column; `NULL` and absent columns read as empty
    pub fn get_text(&self, column: &str) -> String {
        match self.get(column) {
            Some(SqlValue::Text(s)) => s.clone(),
            Some(SqlValue::Integer(i)) => i.to_string(),
            Some(SqlValue::Real(f)) => f.to_string(),
            Some(SqlValue::Null) | None => String::new(),
        }
    }

    /// Required, non-empty text column
    pub fn require_text(&self, column: &str) -> Result<String> {
        let value = self.get_text(column);
        if value.is_empty() {
            return Err(MemError::Storage(format!("column '{}' is empty", column)));
        }
        Ok(value)
    }

    /// JSON array of strings stored as text; malformed values read as empty
    pub fn get_string_list(&self, column: &str) -> Vec<String> {
        let raw = self.get_text(column);
        if raw.trim().is_empty() {
            return Vec::new();
        }
        serde_json::from_str::<Vec<serde_json::Value>>(&raw)
            .map(|items| {
                items
                    .into_iter()
                    .filter_map(|item| match item {
                        serde_json::Value::String(s) => Some(s),
                        serde_json::Value::Null => None,
                        other => Some(other.to_string()),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// JSON object stored as text; non-object text is kept under `raw`
    pub fn get_json_map(&self, column: &str) -> JsonMap {
        let raw = self.get_text(column);
        if raw.trim().is_empty() {
            return JsonMap::new();
        }
        match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
            _ => JsonMap::from([("raw".to_string(), serde_json::Value::String(raw))]),
        }
    }
}

/// The authoritative relational store
///
/// Implementations are synchronous and take `&self`; concurrent readers are
/// left to the underlying engine. Errors are always fatal to the caller.
pub trait RelationalStore: Send + Sync {
    /// Dialect used to render queries for this store
    fn dialect(&self) -> SqlDialect;

    /// Create tables and indexes if they do not exist
    fn init_schema(&self) -> Result<()>;

    /// Run a `SELECT` and return every row
    fn fetch_rows(&self, query: &SqlQuery) -> Result<Vec<RecordRow>>;

    /// Run an `INSERT ... RETURNING id` and return the new id
    fn insert_returning_id(&self, query: &SqlQuery) -> Result<RecordId>;

    /// Human-readable location, for logs
    fn describe(&self) -> String {
        self.dialect().to_string()
    }
}
