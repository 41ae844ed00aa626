//! PostgreSQL relational store
//!
//! sqlx is async; the store keeps a private runtime and blocks on each call
//! so it can sit behind the same synchronous contract as the SQLite store.

use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Postgres, Row, TypeInfo};
use std::sync::Arc;
use tokio::runtime::Runtime;

use super::backend::{RecordRow, RelationalStore};
use super::dialect::SqlDialect;
use super::filter::{SqlQuery, SqlValue};
use super::migrations::POSTGRES_SCHEMA;
use crate::error::{MemError, Result};
use crate::types::RecordId;

const MAX_CONNECTIONS: u32 = 4;

pub struct PgStorage {
    pool: PgPool,
    rt: Arc<Runtime>,
    url: String,
}

impl PgStorage {
    /// Connect to `url`; the schema is not touched until [`RelationalStore::init_schema`]
    pub fn connect(url: &str) -> Result<Self> {
        let rt = Runtime::new()?;
        let pool = rt.block_on(
            PgPoolOptions::new()
                .max_connections(MAX_CONNECTIONS)
                .connect(url),
        )?;

        Ok(Self {
            pool,
            rt: Arc::new(rt),
            url: redact(url),
        })
    }
}

fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &[SqlValue],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Integer(i) => query.bind(*i),
            SqlValue::Real(f) => query.bind(*f),
            SqlValue::Text(s) => query.bind(s.clone()),
        };
    }
    query
}

fn record_from_pg(row: &PgRow) -> Result<RecordRow> {
    let mut record = RecordRow::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = match column.type_info().name() {
            "INT8" => SqlValue::from(row.try_get::<Option<i64>, _>(idx)?),
            "INT4" => SqlValue::from(row.try_get::<Option<i32>, _>(idx)?.map(i64::from)),
            "INT2" => SqlValue::from(row.try_get::<Option<i16>, _>(idx)?.map(i64::from)),
            "FLOAT8" => SqlValue::from(row.try_get::<Option<f64>, _>(idx)?),
            "FLOAT4" => SqlValue::from(row.try_get::<Option<f32>, _>(idx)?.map(f64::from)),
            _ => SqlValue::from(row.try_get::<Option<String>, _>(idx)?),
        };
        record.insert(column.name(), value);
    }
    Ok(record)
}

/// Hide the password part of a connection URL
fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            let credentials = &url[scheme_end + 3..at];
            match credentials.split_once(':') {
                Some((user, _)) => format!("{}{}:***{}", &url[..scheme_end + 3], user, &url[at..]),
                None => url.to_string(),
            }
        }
        _ => url.to_string(),
    }
}

impl RelationalStore for PgStorage {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Postgres
    }

    fn init_schema(&self) -> Result<()> {
        self.rt.block_on(async {
            let mut tx = self.pool.begin().await?;
            for statement in POSTGRES_SCHEMA {
                sqlx::query(statement).execute(&mut *tx).await?;
            }
            tx.commit().await?;
            Ok::<_, MemError>(())
        })
    }

    fn fetch_rows(&self, query: &SqlQuery) -> Result<Vec<RecordRow>> {
        self.rt.block_on(async {
            let rows = bind_params(sqlx::query(&query.sql), &query.params)
                .fetch_all(&self.pool)
                .await?;
            rows.iter().map(record_from_pg).collect::<Result<Vec<_>>>()
        })
    }

    fn insert_returning_id(&self, query: &SqlQuery) -> Result<RecordId> {
        self.rt.block_on(async {
            let row = bind_params(sqlx::query(&query.sql), &query.params)
                .fetch_one(&self.pool)
                .await?;
            let id: i64 = row.try_get(0)?;
            Ok::<_, MemError>(id)
        })
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}
