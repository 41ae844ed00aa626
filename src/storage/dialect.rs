//! SQL dialect differences between SQLite and PostgreSQL
//!
//! Only the fragments the filtered queries need: placeholders,
//! case-insensitive substring matching and JSON array predicates over
//! columns that hold JSON text.

use serde::{Deserialize, Serialize};

/// Escape character used by every generated `LIKE`/`ILIKE`
pub const LIKE_ESCAPE: char = '\\';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    Sqlite,
    Postgres,
}

impl SqlDialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            SqlDialect::Sqlite => "sqlite",
            SqlDialect::Postgres => "postgres",
        }
    }

    /// Placeholder for the `n`th bound parameter (1-based)
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            SqlDialect::Sqlite => "?".to_string(),
            SqlDialect::Postgres => format!("${}", n),
        }
    }

    /// `column` contains the pattern bound at `ph`, ignoring case
    pub fn contains_ci(&self, column: &str, ph: &str) -> String {
        match self {
            // SQLite LIKE is case-insensitive for ASCII by default
            SqlDialect::Sqlite => format!("{} LIKE {} ESCAPE '\\'", column, ph),
            SqlDialect::Postgres => format!("{} ILIKE {} ESCAPE '\\'", column, ph),
        }
    }

    /// The JSON array stored in `column` has an element equal to `ph`
    pub fn json_array_has(&self, column: &str, ph: &str) -> String {
        match self {
            SqlDialect::Sqlite => format!(
                "EXISTS (SELECT 1 FROM json_each({}) WHERE json_each.value = {})",
                column, ph
            ),
            SqlDialect::Postgres => format!(
                "EXISTS (SELECT 1 FROM jsonb_array_elements_text(COALESCE(NULLIF({}, ''), '[]')::jsonb) AS elem(value) WHERE elem.value = {})",
                column, ph
            ),
        }
    }

    /// Some element of the JSON array in `column` contains the pattern at `ph`, ignoring case
    pub fn json_array_contains_ci(&self, column: &str, ph: &str) -> String {
        match self {
            SqlDialect::Sqlite => format!(
                "EXISTS (SELECT 1 FROM json_each({}) WHERE json_each.value LIKE {} ESCAPE '\\')",
                column, ph
            ),
            SqlDialect::Postgres => format!(
                "EXISTS (SELECT 1 FROM jsonb_array_elements_text(COALESCE(NULLIF({}, ''), '[]')::jsonb) AS elem(value) WHERE elem.value ILIKE {} ESCAPE '\\')",
                column, ph
            ),
        }
    }
}

impl std::fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build a `%needle%` pattern with LIKE wildcards in `needle` escaped
pub fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for ch in needle.chars() {
        if ch == '%' || ch == '_' || ch == LIKE_ESCAPE {
            pattern.push(LIKE_ESCAPE);
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(SqlDialect::Sqlite.placeholder(3), "?");
        assert_eq!(SqlDialect::Postgres.placeholder(3), "$3");
    }

    #[test]
    fn test_contains_operator() {
        assert_eq!(
            SqlDialect::Sqlite.contains_ci("tags", "?"),
            "tags LIKE ? ESCAPE '\\'"
        );
        assert!(SqlDialect::Postgres
            .contains_ci("tags", "$1")
            .starts_with("tags ILIKE $1"));
    }

    #[test]
    fn test_json_membership() {
        assert!(SqlDialect::Sqlite
            .json_array_has("concepts", "?")
            .contains("json_each(concepts)"));
        assert!(SqlDialect::Postgres
            .json_array_has("concepts", "$2")
            .contains("jsonb_array_elements_text"));
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("auth"), "%auth%");
        assert_eq!(like_pattern("100%_done"), "%100\\%\\_done%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }
}
