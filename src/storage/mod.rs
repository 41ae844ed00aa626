//! Storage engine for codex-mem
//!
//! The relational store is the source of truth for memories and conversation
//! turns. SQLite is built in; PostgreSQL is available behind the `postgres`
//! feature. Both render queries through the same [`SqlBuilder`].

mod backend;
mod connection;
mod dialect;
mod filter;
mod migrations;
#[cfg(feature = "postgres")]
mod postgres;
pub mod queries;

use std::path::PathBuf;
use std::sync::Arc;

pub use backend::{RecordRow, RelationalStore};
pub use connection::Storage;
pub use dialect::{like_pattern, SqlDialect};
pub use filter::{SqlBuilder, SqlQuery, SqlValue};
pub use migrations::SCHEMA_VERSION;
#[cfg(feature = "postgres")]
pub use postgres::PgStorage;

use crate::error::{MemError, Result};

const SQLITE_SCHEME: &str = "sqlite://";

/// Where the relational store lives, parsed from a database URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseTarget {
    /// `sqlite://<path>`; `:memory:` opens a private in-memory database
    Sqlite(PathBuf),
    /// Any other URL is handed to the PostgreSQL driver
    Postgres(String),
}

impl DatabaseTarget {
    pub fn parse(url: &str) -> Result<Self> {
        let url = url.trim();
        if url.is_empty() {
            return Err(MemError::Config("database URL is empty".to_string()));
        }
        match url.strip_prefix(SQLITE_SCHEME) {
            Some("") => Err(MemError::Config(format!(
                "database URL '{}' has no path",
                url
            ))),
            Some(path) => Ok(DatabaseTarget::Sqlite(PathBuf::from(
                shellexpand::tilde(path).to_string(),
            ))),
            None => Ok(DatabaseTarget::Postgres(url.to_string())),
        }
    }

    pub fn dialect(&self) -> SqlDialect {
        match self {
            DatabaseTarget::Sqlite(_) => SqlDialect::Sqlite,
            DatabaseTarget::Postgres(_) => SqlDialect::Postgres,
        }
    }
}

/// Open the relational store for `url`
///
/// SQLite databases are migrated on open. PostgreSQL schemas are only
/// created by an explicit `init_schema` call.
pub fn open_store(url: &str) -> Result<Arc<dyn RelationalStore>> {
    match DatabaseTarget::parse(url)? {
        DatabaseTarget::Sqlite(path) => {
            let storage = Storage::open(&path)?;
            tracing::debug!("Opened {}", storage.describe());
            Ok(Arc::new(storage))
        }
        #[cfg(feature = "postgres")]
        DatabaseTarget::Postgres(url) => {
            let storage = PgStorage::connect(&url)?;
            tracing::debug!("Opened {}", storage.describe());
            Ok(Arc::new(storage))
        }
        #[cfg(not(feature = "postgres"))]
        DatabaseTarget::Postgres(_) => Err(MemError::Config(
            "PostgreSQL URLs need codex-mem built with the `postgres` feature".to_string(),
        )),
    }
}
