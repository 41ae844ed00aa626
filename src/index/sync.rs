//! Keeping the semantic index in step with the relational store
//!
//! Index writes are best-effort after an insert and explicit during backfill.
//! The two stores may diverge in between; search re-validates every candidate.

use serde::Serialize;

use super::SemanticIndex;
use crate::error::{MemError, Result};
use crate::search::{MemoryKind, RecordKind, SearchConfig, TurnKind};
use crate::storage::queries::{list_memories, list_turns};
use crate::storage::RelationalStore;

/// Outcome of a backfill run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    /// Documents written to the index
    pub synced: usize,
    /// Rows read from the relational store
    pub rows: usize,
}

/// Upsert one record; failures are logged and reported as `false`
pub fn sync_record<K: RecordKind>(
    index: &dyn SemanticIndex,
    config: &SearchConfig,
    record: &K::Record,
) -> bool {
    if !config.semantic_enabled || !index.is_available() {
        return false;
    }

    let document = K::index_document(record);
    match index.upsert(K::collection(config), &document) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(
                kind = K::NAME,
                doc_id = %document.doc_id,
                "Semantic index sync failed: {}",
                e
            );
            false
        }
    }
}

fn backfill<K: RecordKind>(
    index: &dyn SemanticIndex,
    config: &SearchConfig,
    records: Vec<K::Record>,
) -> Result<BackfillReport> {
    let collection = K::collection(config);
    let mut report = BackfillReport {
        synced: 0,
        rows: records.len(),
    };

    for record in &records {
        index.upsert(collection, &K::index_document(record))?;
        report.synced += 1;
    }

    tracing::info!(
        kind = K::NAME,
        collection,
        synced = report.synced,
        rows = report.rows,
        "Backfill complete"
    );
    Ok(report)
}

fn ensure_writable(index: &dyn SemanticIndex, config: &SearchConfig) -> Result<()> {
    if !config.semantic_enabled || !index.is_available() {
        return Err(MemError::Index(format!(
            "semantic index is not available: {}",
            index.describe()
        )));
    }
    Ok(())
}

/// Re-index memories newest first
pub fn backfill_memories(
    store: &dyn RelationalStore,
    index: &dyn SemanticIndex,
    config: &SearchConfig,
    project: Option<&str>,
    limit: Option<usize>,
) -> Result<BackfillReport> {
    ensure_writable(index, config)?;
    let records = list_memories(store, project, limit)?;
    backfill::<MemoryKind>(index, config, records)
}

/// Re-index conversation turns newest first
pub fn backfill_turns(
    store: &dyn RelationalStore,
    index: &dyn SemanticIndex,
    config: &SearchConfig,
    project: Option<&str>,
    session_id: Option<&str>,
    limit: Option<usize>,
) -> Result<BackfillReport> {
    ensure_writable(index, config)?;
    let records = list_turns(store, project, session_id, limit)?;
    backfill::<TurnKind>(index, config, records)
}
