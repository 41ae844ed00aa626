//! Parameterized query building shared by both SQL dialects
//!
//! Conditions are accumulated in order together with their bound values, so
//! placeholder numbering (`$n` on PostgreSQL) always lines up with `params`.
//!
//! ```
//! use codex_mem::storage::{SqlBuilder, SqlDialect};
//!
//! let mut builder = SqlBuilder::new(SqlDialect::Postgres);
//! builder.eq("project", "engine");
//! builder.contains_ci("tags", "auth");
//! let query = builder.select("id", "memories", Some("id DESC"), Some(5));
//! assert_eq!(
//!     query.sql,
//!     "SELECT id FROM memories WHERE project = $1 AND tags ILIKE $2 ESCAPE '\\' ORDER BY id DESC LIMIT $3"
//! );
//! assert_eq!(query.params.len(), 3);
//! ```

use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};

use super::dialect::{like_pattern, SqlDialect};
use crate::types::RecordId;

/// A bound parameter or a column value read back from a store
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<usize> for SqlValue {
    fn from(v: usize) -> Self {
        SqlValue::Integer(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

impl From<ValueRef<'_>> for SqlValue {
    fn from(v: ValueRef<'_>) -> Self {
        match v {
            ValueRef::Null | ValueRef::Blob(_) => SqlValue::Null,
            ValueRef::Integer(i) => SqlValue::Integer(i),
            ValueRef::Real(f) => SqlValue::Real(f),
            ValueRef::Text(bytes) => SqlValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        }
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            SqlValue::Real(f) => ToSqlOutput::Owned(Value::Real(*f)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

/// Rendered SQL plus its parameters in placeholder order
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// Builder for `SELECT ... WHERE a AND b ...` and `INSERT ... RETURNING id`
pub struct SqlBuilder {
    dialect: SqlDialect,
    conditions: Vec<String>,
    params: Vec<SqlValue>,
}

impl SqlBuilder {
    pub fn new(dialect: SqlDialect) -> Self {
        Self {
            dialect,
            conditions: Vec::new(),
            params: Vec::new(),
        }
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    /// Bind a value and return its placeholder
    pub fn bind(&mut self, value: impl Into<SqlValue>) -> String {
        self.params.push(value.into());
        self.dialect.placeholder(self.params.len())
    }

    /// Add a raw condition; any placeholders in it must already be bound
    pub fn push_condition(&mut self, condition: impl Into<String>) {
        self.conditions.push(condition.into());
    }

    pub fn eq(&mut self, column: &str, value: impl Into<SqlValue>) {
        let ph = self.bind(value);
        self.push_condition(format!("{} = {}", column, ph));
    }

    pub fn at_least(&mut self, column: &str, value: i64) {
        let ph = self.bind(value);
        self.push_condition(format!("{} >= {}", column, ph));
    }

    pub fn at_most(&mut self, column: &str, value: i64) {
        let ph = self.bind(value);
        self.push_condition(format!("{} <= {}", column, ph));
    }

    /// Case-insensitive substring match on one column
    pub fn contains_ci(&mut self, column: &str, needle: &str) {
        let ph = self.bind(like_pattern(needle));
        let condition = self.dialect.contains_ci(column, &ph);
        self.push_condition(condition);
    }

    /// Case-insensitive substring match on any of `columns`
    pub fn any_contains_ci(&mut self, columns: &[&str], needle: &str) {
        let parts: Vec<String> = columns
            .iter()
            .map(|column| {
                let ph = self.bind(like_pattern(needle));
                self.dialect.contains_ci(column, &ph)
            })
            .collect();
        self.push_or(parts);
    }

    /// The JSON array in `column` holds exactly `value`
    pub fn json_array_has(&mut self, column: &str, value: &str) {
        let ph = self.bind(value);
        let condition = self.dialect.json_array_has(column, &ph);
        self.push_condition(condition);
    }

    /// Some element of the JSON arrays in `columns` contains `needle`, ignoring case
    pub fn json_arrays_contain_ci(&mut self, columns: &[&str], needle: &str) {
        let parts: Vec<String> = columns
            .iter()
            .map(|column| {
                let ph = self.bind(like_pattern(needle));
                self.dialect.json_array_contains_ci(column, &ph)
            })
            .collect();
        self.push_or(parts);
    }

    /// `column IN (...)`; an empty id list matches nothing
    pub fn in_ids(&mut self, column: &str, ids: &[RecordId]) {
        if ids.is_empty() {
            self.push_condition("1 = 0");
            return;
        }
        let placeholders: Vec<String> = ids.iter().map(|id| self.bind(*id)).collect();
        self.push_condition(format!("{} IN ({})", column, placeholders.join(", ")));
    }

    fn push_or(&mut self, parts: Vec<String>) {
        match parts.len() {
            0 => {}
            1 => self.conditions.extend(parts),
            _ => self.push_condition(format!("({})", parts.join(" OR "))),
        }
    }

    /// Finish as a `SELECT`; the limit is bound last
    pub fn select(
        mut self,
        columns: &str,
        table: &str,
        order_by: Option<&str>,
        limit: Option<usize>,
    ) -> SqlQuery {
        let mut sql = format!("SELECT {} FROM {}", columns, table);
        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.conditions.join(" AND "));
        }
        if let Some(order) = order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(order);
        }
        if let Some(limit) = limit {
            let ph = self.bind(limit);
            sql.push_str(" LIMIT ");
            sql.push_str(&ph);
        }
        SqlQuery {
            sql,
            params: self.params,
        }
    }

    /// `INSERT INTO table (...) VALUES (...) RETURNING id`
    pub fn insert(dialect: SqlDialect, table: &str, values: Vec<(&str, SqlValue)>) -> SqlQuery {
        let mut builder = SqlBuilder::new(dialect);
        let mut columns = Vec::with_capacity(values.len());
        let mut placeholders = Vec::with_capacity(values.len());
        for (column, value) in values {
            columns.push(column);
            placeholders.push(builder.bind(value));
        }
        SqlQuery {
            sql: format!(
                "INSERT INTO {} ({}) VALUES ({}) RETURNING id",
                table,
                columns.join(", "),
                placeholders.join(", ")
            ),
            params: builder.params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_without_conditions() {
        let query = SqlBuilder::new(SqlDialect::Sqlite).select("id", "memories", None, Some(10));
        assert_eq!(query.sql, "SELECT id FROM memories LIMIT ?");
        assert_eq!(query.params, vec![SqlValue::Integer(10)]);
    }

    #[test]
    fn test_or_group_binds_per_column() {
        let mut builder = SqlBuilder::new(SqlDialect::Postgres);
        builder.eq("project", "p");
        builder.any_contains_ci(&["summary", "details"], "jwt");
        let query = builder.select("id", "memories", None, None);
        assert_eq!(
            query.sql,
            "SELECT id FROM memories WHERE project = $1 AND (summary ILIKE $2 ESCAPE '\\' OR details ILIKE $3 ESCAPE '\\')"
        );
        assert_eq!(
            query.params,
            vec![
                SqlValue::from("p"),
                SqlValue::from("%jwt%"),
                SqlValue::from("%jwt%"),
            ]
        );
    }

    #[test]
    fn test_in_ids() {
        let mut builder = SqlBuilder::new(SqlDialect::Postgres);
        builder.eq("project", "p");
        builder.in_ids("id", &[4, 9]);
        let query = builder.select("id", "t", None, None);
        assert!(query.sql.ends_with("project = $1 AND id IN ($2, $3)"));

        let mut builder = SqlBuilder::new(SqlDialect::Sqlite);
        builder.in_ids("id", &[]);
        let query = builder.select("id", "t", None, None);
        assert!(query.sql.ends_with("WHERE 1 = 0"));
        assert!(query.params.is_empty());
    }

    #[test]
    fn test_insert_returning() {
        let query = SqlBuilder::insert(
            SqlDialect::Postgres,
            "conversation_turns",
            vec![("project", "p".into()), ("created_at_epoch", 5i64.into())],
        );
        assert_eq!(
            query.sql,
            "INSERT INTO conversation_turns (project, created_at_epoch) VALUES ($1, $2) RETURNING id"
        );
    }

    #[test]
    fn test_option_into_null() {
        assert_eq!(SqlValue::from(None::<String>), SqlValue::Null);
        assert_eq!(SqlValue::from(Some("x")), SqlValue::Text("x".into()));
    }
}
