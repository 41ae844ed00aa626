//! SQLite connection management with WAL mode support
//!
//! A single connection behind a mutex; file databases run in WAL mode so
//! readers are not blocked while the CLI appends records.

use parking_lot::Mutex;
use rusqlite::{params_from_iter, Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::backend::{RecordRow, RelationalStore};
use super::dialect::SqlDialect;
use super::filter::{SqlQuery, SqlValue};
use super::migrations::run_migrations;
use crate::error::Result;
use crate::types::RecordId;

const MEMORY_PATH: &str = ":memory:";

/// SQLite-backed relational store
#[derive(Clone)]
pub struct Storage {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl Storage {
    /// Open or create a database file and bring its schema up to date
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str() == MEMORY_PATH {
            return Self::open_in_memory();
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA busy_timeout=30000;
            PRAGMA temp_store=MEMORY;
            "#,
        )?;
        run_migrations(&conn)?;

        Ok(Self {
            path: path.to_path_buf(),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database (tests, dry runs)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA temp_store=MEMORY;")?;
        run_migrations(&conn)?;

        Ok(Self {
            path: PathBuf::from(MEMORY_PATH),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Execute a function with the connection
    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Execute a function inside a transaction
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == MEMORY_PATH
    }
}

impl RelationalStore for Storage {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    fn init_schema(&self) -> Result<()> {
        self.with_transaction(run_migrations)
    }

    fn fetch_rows(&self, query: &SqlQuery) -> Result<Vec<RecordRow>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare_cached(&query.sql)?;
            let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

            let rows = stmt.query_map(params_from_iter(query.params.iter()), |row| {
                let mut record = RecordRow::new();
                for (idx, name) in columns.iter().enumerate() {
                    record.insert(name.as_str(), SqlValue::from(row.get_ref(idx)?));
                }
                Ok(record)
            })?;

            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Into::into)
        })
    }

    fn insert_returning_id(&self, query: &SqlQuery) -> Result<RecordId> {
        self.with_connection(|conn| {
            let id = conn.query_row(&query.sql, params_from_iter(query.params.iter()), |row| {
                row.get::<_, i64>(0)
            })?;
            Ok(id)
        })
    }

    fn describe(&self) -> String {
        format!("sqlite://{}", self.path.display())
    }
}
