//! Semantic index: a non-authoritative similarity index over record text
//!
//! The relational store stays the source of truth. The index only proposes
//! candidate ids, which search re-validates through hydration. A failing or
//! missing index is reported as [`SemanticOutcome::Unavailable`] and never as
//! an error, so callers can degrade with an ordinary `match`.

mod local;
mod sync;

pub use local::LocalVectorIndex;
pub use sync::{backfill_memories, backfill_turns, sync_record, BackfillReport};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::Settings;
use crate::error::{MemError, Result};

/// Metadata key carrying the relational id of an indexed record
pub const RECORD_ID_KEY: &str = "record_id";

/// Exact-match metadata constraints, e.g. `{project, session_id}`
pub type IndexFilter = BTreeMap<String, String>;

/// One ranked candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Relational id as stored in metadata; not guaranteed to be an integer
    pub external_id: Value,
    /// Smaller is closer
    pub distance: f32,
}

impl Candidate {
    pub fn new(external_id: impl Into<Value>, distance: f32) -> Self {
        Self {
            external_id: external_id.into(),
            distance,
        }
    }
}

/// Result of a semantic query
#[derive(Debug, Clone, PartialEq)]
pub enum SemanticOutcome {
    /// Candidates, best match first (possibly empty)
    Candidates(Vec<Candidate>),
    /// The index could not answer this call
    Unavailable(String),
}

impl SemanticOutcome {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        SemanticOutcome::Unavailable(reason.into())
    }
}

/// A record rendered for indexing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    /// Stable document id (`mem_<id>`, `turn_<id>`)
    pub doc_id: String,
    pub text: String,
    pub metadata: serde_json::Map<String, Value>,
}

/// Contract the search orchestrator relies on
pub trait SemanticIndex: Send + Sync {
    /// Rank documents in `collection` against `text`
    ///
    /// `top_k` is a hint. Implementations must not panic or return errors;
    /// every failure becomes [`SemanticOutcome::Unavailable`].
    fn query(&self, collection: &str, text: &str, top_k: usize, filter: &IndexFilter)
        -> SemanticOutcome;

    /// Insert or replace one document
    fn upsert(&self, collection: &str, document: &IndexDocument) -> Result<()>;

    fn is_available(&self) -> bool;

    fn describe(&self) -> String;
}

/// Stand-in used when vector search is turned off or cannot be opened
#[derive(Debug, Clone)]
pub struct DisabledIndex {
    reason: String,
}

impl DisabledIndex {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Default for DisabledIndex {
    fn default() -> Self {
        Self::new("semantic index disabled")
    }
}

impl SemanticIndex for DisabledIndex {
    fn query(&self, _: &str, _: &str, _: usize, _: &IndexFilter) -> SemanticOutcome {
        SemanticOutcome::Unavailable(self.reason.clone())
    }

    fn upsert(&self, _: &str, _: &IndexDocument) -> Result<()> {
        Err(MemError::Index(self.reason.clone()))
    }

    fn is_available(&self) -> bool {
        false
    }

    fn describe(&self) -> String {
        format!("disabled ({})", self.reason)
    }
}

/// Open the index configured in `settings`
///
/// Never fails: an index that cannot be opened is replaced by a
/// [`DisabledIndex`] carrying the reason.
pub fn open_index(settings: &Settings) -> Arc<dyn SemanticIndex> {
    if !settings.vector_enabled {
        return Arc::new(DisabledIndex::default());
    }

    match settings.vector_provider.trim().to_lowercase().as_str() {
        "none" | "" => Arc::new(DisabledIndex::new("no vector provider configured")),
        "local" | "tfidf" => match LocalVectorIndex::open(&settings.vector_dir()) {
            Ok(index) => Arc::new(index),
            Err(e) => {
                tracing::warn!("Semantic index unavailable, continuing without it: {}", e);
                Arc::new(DisabledIndex::new(e.to_string()))
            }
        },
        other => {
            tracing::warn!("Unknown vector provider '{}', semantic index disabled", other);
            Arc::new(DisabledIndex::new(format!("unknown vector provider '{}'", other)))
        }
    }
}

/// Metadata keys are embedded in JSON paths, so only `[A-Za-z0-9_-]` is allowed
pub fn validate_filter_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(MemError::InvalidInput(
            "metadata filter key cannot be empty".to_string(),
        ));
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(MemError::InvalidInput(format!(
            "invalid metadata filter key '{}': use letters, digits, '_' or '-'",
            key
        )));
    }
    Ok(())
}
