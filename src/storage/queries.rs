//! Record insertion and row mapping for memories and conversation turns

use chrono::{DateTime, TimeZone, Utc};

use super::backend::{RecordRow, RelationalStore};
use super::filter::{SqlBuilder, SqlValue};
use crate::error::{MemError, Result};
use crate::types::{
    ConversationTurn, CreateMemoryInput, CreateTurnInput, JsonMap, Memory, Role,
    DEFAULT_MEMORY_TYPE,
};

pub const MEMORY_TABLE: &str = "memories";
pub const TURN_TABLE: &str = "conversation_turns";

pub const MEMORY_COLUMNS: &str = "id, created_at, created_at_epoch, project, type, tags, summary, details, concepts, files_read, files_modified, metadata_json";
pub const TURN_COLUMNS: &str =
    "id, created_at, created_at_epoch, project, session_id, role, content, context_json, metadata_json";

/// Newest first, ties broken by id
pub const NEWEST_FIRST: &str = "created_at_epoch DESC, id DESC";

/// Creation time from the RFC 3339 column, falling back to the epoch column
fn created_at_from_row(row: &RecordRow, epoch: i64) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&row.get_text("created_at"))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| Utc.timestamp_opt(epoch, 0).single())
        .unwrap_or_default()
}

pub fn memory_from_row(row: &RecordRow) -> Result<Memory> {
    let created_at_epoch = row.get_i64("created_at_epoch")?;
    let memory_type = match row.get_text("type") {
        t if t.is_empty() => DEFAULT_MEMORY_TYPE.to_string(),
        t => t,
    };

    Ok(Memory {
        id: row.id()?,
        created_at: created_at_from_row(row, created_at_epoch),
        created_at_epoch,
        project: row.require_text("project")?,
        memory_type,
        tags: row.get_text("tags"),
        summary: row.get_text("summary"),
        details: row.get_text("details"),
        concepts: row.get_string_list("concepts"),
        files_read: row.get_string_list("files_read"),
        files_modified: row.get_string_list("files_modified"),
        metadata: row.get_json_map("metadata_json"),
    })
}

pub fn turn_from_row(row: &RecordRow) -> Result<ConversationTurn> {
    let created_at_epoch = row.get_i64("created_at_epoch")?;
    let role: Role = row
        .get_text("role")
        .parse()
        .map_err(MemError::Storage)?;

    Ok(ConversationTurn {
        id: row.id()?,
        created_at: created_at_from_row(row, created_at_epoch),
        created_at_epoch,
        project: row.require_text("project")?,
        session_id: row.get_text("session_id"),
        role,
        content: row.get_text("content"),
        context: row.get_json_map("context_json"),
        metadata: row.get_json_map("metadata_json"),
    })
}

fn require(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(MemError::InvalidInput(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

fn json_text<T: serde::Serialize>(value: &T) -> Result<SqlValue> {
    Ok(SqlValue::Text(serde_json::to_string(value)?))
}

/// Insert a memory and return it with its assigned id
pub fn create_memory(store: &dyn RelationalStore, input: &CreateMemoryInput) -> Result<Memory> {
    let project = require("project", &input.project)?;
    let summary = require("summary", &input.summary)?;
    let memory_type = input
        .memory_type
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_MEMORY_TYPE)
        .to_string();

    let created_at = input.created_at.unwrap_or_else(Utc::now);
    let created_at_epoch = created_at.timestamp();

    let query = SqlBuilder::insert(
        store.dialect(),
        MEMORY_TABLE,
        vec![
            ("created_at", created_at.to_rfc3339().into()),
            ("created_at_epoch", created_at_epoch.into()),
            ("project", project.as_str().into()),
            ("type", memory_type.as_str().into()),
            ("tags", input.tags.as_str().into()),
            ("summary", summary.as_str().into()),
            ("details", input.details.as_str().into()),
            ("concepts", json_text(&input.concepts)?),
            ("files_read", json_text(&input.files_read)?),
            ("files_modified", json_text(&input.files_modified)?),
            ("metadata_json", json_text(&input.metadata)?),
        ],
    );
    let id = store.insert_returning_id(&query)?;
    tracing::debug!(id, project = %project, "Stored memory");

    Ok(Memory {
        id,
        created_at,
        created_at_epoch,
        project,
        memory_type,
        tags: input.tags.clone(),
        summary,
        details: input.details.clone(),
        concepts: input.concepts.clone(),
        files_read: input.files_read.clone(),
        files_modified: input.files_modified.clone(),
        metadata: input.metadata.clone(),
    })
}

/// Insert a conversation turn and return it with its assigned id
pub fn create_turn(
    store: &dyn RelationalStore,
    input: &CreateTurnInput,
) -> Result<ConversationTurn> {
    let project = require("project", &input.project)?;
    let session_id = require("session_id", &input.session_id)?;
    if input.content.trim().is_empty() {
        return Err(MemError::InvalidInput("content is required".to_string()));
    }

    let created_at = input.created_at.unwrap_or_else(Utc::now);
    let created_at_epoch = created_at.timestamp();

    let query = SqlBuilder::insert(
        store.dialect(),
        TURN_TABLE,
        vec![
            ("created_at", created_at.to_rfc3339().into()),
            ("created_at_epoch", created_at_epoch.into()),
            ("project", project.as_str().into()),
            ("session_id", session_id.as_str().into()),
            ("role", input.role.as_str().into()),
            ("content", input.content.as_str().into()),
            ("context_json", json_text(&input.context)?),
            ("metadata_json", json_text(&input.metadata)?),
        ],
    );
    let id = store.insert_returning_id(&query)?;
    tracing::debug!(id, project = %project, session = %session_id, "Stored conversation turn");

    Ok(ConversationTurn {
        id,
        created_at,
        created_at_epoch,
        project,
        session_id,
        role: input.role,
        content: input.content.clone(),
        context: input.context.clone(),
        metadata: input.metadata.clone(),
    })
}

/// Memories newest first, optionally restricted to one project
pub fn list_memories(
    store: &dyn RelationalStore,
    project: Option<&str>,
    limit: Option<usize>,
) -> Result<Vec<Memory>> {
    let mut builder = SqlBuilder::new(store.dialect());
    if let Some(project) = project {
        builder.eq("project", project);
    }
    let query = builder.select(MEMORY_COLUMNS, MEMORY_TABLE, Some(NEWEST_FIRST), limit);
    store
        .fetch_rows(&query)?
        .iter()
        .map(memory_from_row)
        .collect()
}

/// Turns newest first, optionally restricted to a project and session
pub fn list_turns(
    store: &dyn RelationalStore,
    project: Option<&str>,
    session_id: Option<&str>,
    limit: Option<usize>,
) -> Result<Vec<ConversationTurn>> {
    let mut builder = SqlBuilder::new(store.dialect());
    if let Some(project) = project {
        builder.eq("project", project);
    }
    if let Some(session_id) = session_id {
        builder.eq("session_id", session_id);
    }
    let query = builder.select(TURN_COLUMNS, TURN_TABLE, Some(NEWEST_FIRST), limit);
    store.fetch_rows(&query)?.iter().map(turn_from_row).collect()
}

/// Parse a JSON object argument; anything else is kept under `raw`
pub fn lenient_json_map(raw: &str) -> JsonMap {
    if raw.trim().is_empty() {
        return JsonMap::new();
    }
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
        _ => JsonMap::from([(
            "raw".to_string(),
            serde_json::Value::String(raw.to_string()),
        )]),
    }
}

/// Parse a JSON object argument, rejecting anything that is not an object
pub fn strict_json_map(field: &str, raw: &str) -> Result<JsonMap> {
    if raw.trim().is_empty() {
        return Ok(JsonMap::new());
    }
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => Ok(map.into_iter().collect()),
        Ok(_) => Err(MemError::InvalidInput(format!(
            "{} must be a JSON object",
            field
        ))),
        Err(e) => Err(MemError::InvalidInput(format!(
            "{} is not valid JSON: {}",
            field, e
        ))),
    }
}
