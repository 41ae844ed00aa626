//! Record variant descriptors
//!
//! Search is written once over [`RecordKind`]; memories and conversation
//! turns only differ in table, columns, text fields, exact filters and the
//! way they are rendered for the semantic index.

use serde::Serialize;
use serde_json::{json, Value};

use super::SearchConfig;
use crate::error::Result;
use crate::index::{IndexDocument, IndexFilter, RECORD_ID_KEY};
use crate::storage::queries::{
    memory_from_row, turn_from_row, MEMORY_COLUMNS, MEMORY_TABLE, TURN_COLUMNS, TURN_TABLE,
};
use crate::storage::{RecordRow, SqlBuilder};
use crate::types::{ConversationTurn, Memory, MemoryFilters, RecordId, TurnFilters};

pub trait RecordKind {
    type Record: Clone + Serialize + Send;
    type Filters: Clone + Default + Send + Sync;

    /// Short name for logs
    const NAME: &'static str;
    const TABLE: &'static str;
    const COLUMNS: &'static str;
    /// Prefix of semantic index document ids
    const DOC_PREFIX: &'static str;

    /// Semantic index collection holding this kind
    fn collection(config: &SearchConfig) -> &str;

    fn from_row(row: &RecordRow) -> Result<Self::Record>;

    fn record_id(record: &Self::Record) -> RecordId;

    /// Case-insensitive substring match over the searchable text fields
    fn push_text_match(builder: &mut SqlBuilder, text: &str);

    /// Every present exact filter, as SQL conditions
    fn push_filters(builder: &mut SqlBuilder, filters: &Self::Filters);

    /// Metadata constraints passed to the semantic index
    fn index_filter(project: &str, filters: &Self::Filters) -> IndexFilter;

    fn index_document(record: &Self::Record) -> IndexDocument;

    fn doc_id(id: RecordId) -> String {
        format!("{}{}", Self::DOC_PREFIX, id)
    }
}

fn metadata_map(value: Value) -> serde_json::Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}

/// Standalone memories
pub struct MemoryKind;

impl RecordKind for MemoryKind {
    type Record = Memory;
    type Filters = MemoryFilters;

    const NAME: &'static str = "memory";
    const TABLE: &'static str = MEMORY_TABLE;
    const COLUMNS: &'static str = MEMORY_COLUMNS;
    const DOC_PREFIX: &'static str = "mem_";

    fn collection(config: &SearchConfig) -> &str {
        &config.memory_collection
    }

    fn from_row(row: &RecordRow) -> Result<Memory> {
        memory_from_row(row)
    }

    fn record_id(record: &Memory) -> RecordId {
        record.id
    }

    fn push_text_match(builder: &mut SqlBuilder, text: &str) {
        builder.any_contains_ci(&["summary", "details"], text);
    }

    fn push_filters(builder: &mut SqlBuilder, filters: &MemoryFilters) {
        if let Some(memory_type) = &filters.memory_type {
            builder.eq("type", memory_type.as_str());
        }
        if let Some(tags) = &filters.tags {
            builder.contains_ci("tags", tags);
        }
        if let Some(concept) = &filters.concept {
            builder.json_array_has("concepts", concept);
        }
        if let Some(file) = &filters.file {
            builder.json_arrays_contain_ci(&["files_read", "files_modified"], file);
        }
    }

    fn index_filter(project: &str, _filters: &MemoryFilters) -> IndexFilter {
        IndexFilter::from([("project".to_string(), project.to_string())])
    }

    fn index_document(record: &Memory) -> IndexDocument {
        let combined = format!("{}\n\n{}", record.summary, record.details);
        let text = match combined.trim() {
            "" => record.summary.clone(),
            trimmed => trimmed.to_string(),
        };

        IndexDocument {
            doc_id: Self::doc_id(record.id),
            text,
            metadata: metadata_map(json!({
                RECORD_ID_KEY: record.id,
                "project": record.project,
                "type": record.memory_type,
                "tags": record.tags,
                "created_at_epoch": record.created_at_epoch,
            })),
        }
    }
}

/// Conversation turns
pub struct TurnKind;

impl RecordKind for TurnKind {
    type Record = ConversationTurn;
    type Filters = TurnFilters;

    const NAME: &'static str = "turn";
    const TABLE: &'static str = TURN_TABLE;
    const COLUMNS: &'static str = TURN_COLUMNS;
    const DOC_PREFIX: &'static str = "turn_";

    fn collection(config: &SearchConfig) -> &str {
        &config.turn_collection
    }

    fn from_row(row: &RecordRow) -> Result<ConversationTurn> {
        turn_from_row(row)
    }

    fn record_id(record: &ConversationTurn) -> RecordId {
        record.id
    }

    fn push_text_match(builder: &mut SqlBuilder, text: &str) {
        builder.contains_ci("content", text);
    }

    fn push_filters(builder: &mut SqlBuilder, filters: &TurnFilters) {
        if let Some(session_id) = &filters.session_id {
            builder.eq("session_id", session_id.as_str());
        }
        if let Some(role) = filters.role {
            builder.eq("role", role.as_str());
        }
    }

    fn index_filter(project: &str, filters: &TurnFilters) -> IndexFilter {
        let mut filter = IndexFilter::from([("project".to_string(), project.to_string())]);
        if let Some(session_id) = &filters.session_id {
            filter.insert("session_id".to_string(), session_id.clone());
        }
        filter
    }

    fn index_document(record: &ConversationTurn) -> IndexDocument {
        IndexDocument {
            doc_id: Self::doc_id(record.id),
            text: record.content.clone(),
            metadata: metadata_map(json!({
                RECORD_ID_KEY: record.id,
                "project": record.project,
                "session_id": record.session_id,
                "role": record.role.as_str(),
                "created_at_epoch": record.created_at_epoch,
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JsonMap, Role};
    use chrono::Utc;

    fn memory() -> Memory {
        Memory {
            id: 7,
            created_at: Utc::now(),
            created_at_epoch: 100,
            project: "p".into(),
            memory_type: "decision".into(),
            tags: "Auth, Security".into(),
            summary: "Rotate JWT keys".into(),
            details: "".into(),
            concepts: vec!["jwt".into()],
            files_read: vec![],
            files_modified: vec!["src/Auth/keys.rs".into()],
            metadata: JsonMap::new(),
        }
    }

    #[test]
    fn test_memory_document() {
        let doc = MemoryKind::index_document(&memory());
        assert_eq!(doc.doc_id, "mem_7");
        assert_eq!(doc.text, "Rotate JWT keys");
        assert_eq!(doc.metadata[RECORD_ID_KEY], 7);
        assert_eq!(doc.metadata["type"], "decision");
    }

    #[test]
    fn test_turn_index_filter_and_document() {
        let turn = ConversationTurn {
            id: 3,
            created_at: Utc::now(),
            created_at_epoch: 5,
            project: "p".into(),
            session_id: "s1".into(),
            role: Role::Assistant,
            content: "done".into(),
            context: JsonMap::new(),
            metadata: JsonMap::new(),
        };
        let filters = TurnFilters {
            session_id: Some("s1".into()),
            role: Some(Role::Assistant),
        };
        let filter = TurnKind::index_filter("p", &filters);
        assert_eq!(filter.get("session_id").map(String::as_str), Some("s1"));
        assert_eq!(TurnKind::index_document(&turn).doc_id, "turn_3");
    }
}
