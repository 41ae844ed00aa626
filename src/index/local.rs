//! Local persistent vector index
//!
//! Documents live in a small SQLite database next to the relational store
//! (`<data_dir>/vector-db/index.db`). Queries apply the exact metadata filter
//! in SQL and rank the survivors by cosine similarity in process.

use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{
    validate_filter_key, Candidate, IndexDocument, IndexFilter, SemanticIndex, SemanticOutcome,
    RECORD_ID_KEY,
};
use crate::embedding::{cosine_similarity, create_embedder, Embedder};
use crate::error::Result;

const INDEX_FILE: &str = "index.db";

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS index_documents (
        collection TEXT NOT NULL,
        doc_id TEXT NOT NULL,
        document TEXT NOT NULL,
        metadata_json TEXT NOT NULL DEFAULT '{}',
        embedding BLOB NOT NULL,
        model TEXT NOT NULL,
        updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY (collection, doc_id)
    );
"#;

pub struct LocalVectorIndex {
    conn: Arc<Mutex<Connection>>,
    embedder: Arc<dyn Embedder>,
    path: PathBuf,
}

impl LocalVectorIndex {
    /// Open or create the index inside `dir`
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(INDEX_FILE);
        let conn = Connection::open(&path)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA busy_timeout=30000;
            "#,
        )?;
        Self::from_connection(conn, path)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, PathBuf::from(":memory:"))
    }

    fn from_connection(conn: Connection, path: PathBuf) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            embedder: create_embedder("tfidf")?,
            path,
        })
    }

    /// Number of documents in `collection`
    pub fn len(&self, collection: &str) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM index_documents WHERE collection = ?",
            params![collection],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn is_empty(&self, collection: &str) -> Result<bool> {
        Ok(self.len(collection)? == 0)
    }

    fn ranked(
        &self,
        collection: &str,
        text: &str,
        top_k: usize,
        filter: &IndexFilter,
    ) -> Result<Vec<Candidate>> {
        let mut sql = String::from(
            "SELECT doc_id, metadata_json, embedding FROM index_documents WHERE collection = ?",
        );
        let mut values: Vec<&str> = vec![collection];
        for (key, value) in filter {
            validate_filter_key(key)?;
            sql.push_str(&format!(
                " AND CAST(json_extract(metadata_json, '$.\"{}\"') AS TEXT) = ?",
                key
            ));
            values.push(value);
        }
        sql.push_str(" ORDER BY doc_id");

        let query_vec = self.embedder.embed(text)?;

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
            Ok((row.get::<_, String>(1)?, row.get::<_, Vec<u8>>(2)?))
        })?;

        let mut scored = Vec::new();
        for row in rows {
            let (metadata, blob) = row?;
            let external_id = serde_json::from_str::<serde_json::Value>(&metadata)
                .ok()
                .and_then(|meta| meta.get(RECORD_ID_KEY).cloned())
                .unwrap_or(serde_json::Value::Null);
            let similarity = cosine_similarity(&query_vec, &decode_embedding(&blob));
            scored.push(Candidate::new(external_id, 1.0 - similarity));
        }

        // Stable: equal distances keep doc_id order
        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        scored.truncate(top_k.max(1));
        Ok(scored)
    }
}

impl SemanticIndex for LocalVectorIndex {
    fn query(
        &self,
        collection: &str,
        text: &str,
        top_k: usize,
        filter: &IndexFilter,
    ) -> SemanticOutcome {
        match self.ranked(collection, text, top_k, filter) {
            Ok(candidates) => SemanticOutcome::Candidates(candidates),
            Err(e) => {
                tracing::warn!("Local vector query on '{}' failed: {}", collection, e);
                SemanticOutcome::unavailable(e.to_string())
            }
        }
    }

    fn upsert(&self, collection: &str, document: &IndexDocument) -> Result<()> {
        let embedding = encode_embedding(&self.embedder.embed(&document.text)?);
        let metadata = serde_json::to_string(&document.metadata)?;

        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO index_documents (collection, doc_id, document, metadata_json, embedding, model)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(collection, doc_id) DO UPDATE SET
                document = excluded.document,
                metadata_json = excluded.metadata_json,
                embedding = excluded.embedding,
                model = excluded.model,
                updated_at = CURRENT_TIMESTAMP
            "#,
            params![
                collection,
                document.doc_id,
                document.text,
                metadata,
                embedding,
                self.embedder.model_name()
            ],
        )?;
        Ok(())
    }

    fn is_available(&self) -> bool {
        true
    }

    fn describe(&self) -> String {
        format!("local ({})", self.path.display())
    }
}

fn encode_embedding(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
