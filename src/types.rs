//! Core types for codex-mem

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Store-assigned identifier shared by memories and conversation turns
pub type RecordId = i64;

/// Open key-value map stored as a JSON object
pub type JsonMap = HashMap<String, serde_json::Value>;

/// Category assigned to memories created without an explicit type
pub const DEFAULT_MEMORY_TYPE: &str = "discovery";

/// A standalone memory recorded for a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    /// Unique identifier, never reused
    pub id: RecordId,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Creation time in epoch seconds, used for ordering and range filters
    pub created_at_epoch: i64,
    /// Project namespace
    pub project: String,
    /// Category tag (e.g. "discovery", "decision", "bugfix")
    #[serde(rename = "type")]
    pub memory_type: String,
    /// Free-text label string
    #[serde(default)]
    pub tags: String,
    pub summary: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub concepts: Vec<String>,
    #[serde(default)]
    pub files_read: Vec<String>,
    #[serde(default)]
    pub files_modified: Vec<String>,
    #[serde(default)]
    pub metadata: JsonMap,
}

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::System, Role::User, Role::Assistant, Role::Tool];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "tool" => Ok(Role::Tool),
            _ => Err(format!(
                "Unknown role: {} (expected system, user, assistant or tool)",
                s
            )),
        }
    }
}

/// One turn of a conversation session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: RecordId,
    pub created_at: DateTime<Utc>,
    pub created_at_epoch: i64,
    pub project: String,
    /// Groups turns into one conversation
    pub session_id: String,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub context: JsonMap,
    #[serde(default)]
    pub metadata: JsonMap,
}

/// Input for creating a memory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateMemoryInput {
    pub project: String,
    /// Defaults to [`DEFAULT_MEMORY_TYPE`]
    #[serde(default, rename = "type")]
    pub memory_type: Option<String>,
    #[serde(default)]
    pub tags: String,
    pub summary: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub concepts: Vec<String>,
    #[serde(default)]
    pub files_read: Vec<String>,
    #[serde(default)]
    pub files_modified: Vec<String>,
    #[serde(default)]
    pub metadata: JsonMap,
    /// Creation time override (defaults to now)
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Input for recording a conversation turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTurnInput {
    pub project: String,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub context: JsonMap,
    #[serde(default)]
    pub metadata: JsonMap,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Retrieval strategy requested by a caller, or executed by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategy {
    /// Hybrid when query text is present
    #[default]
    Auto,
    /// Exact filters plus substring match, no semantic index
    #[serde(alias = "sqlite")]
    Relational,
    /// Semantic index candidates hydrated from the relational store
    #[serde(alias = "chroma")]
    Semantic,
    /// Semantic ranking restricted to the relational eligibility set
    Hybrid,
}

impl SearchStrategy {
    /// Lenient parse: case-insensitive, accepts legacy names, unknown names resolve to `Auto`
    pub fn parse_lenient(s: &str) -> Self {
        Self::parse_str(s).unwrap_or(SearchStrategy::Auto)
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" | "" => Some(SearchStrategy::Auto),
            "relational" | "sqlite" | "sql" => Some(SearchStrategy::Relational),
            "semantic" | "chroma" | "vector" => Some(SearchStrategy::Semantic),
            "hybrid" => Some(SearchStrategy::Hybrid),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchStrategy::Auto => "auto",
            SearchStrategy::Relational => "relational",
            SearchStrategy::Semantic => "semantic",
            SearchStrategy::Hybrid => "hybrid",
        }
    }
}

impl std::fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SearchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s).ok_or_else(|| format!("Unknown search strategy: {}", s))
    }
}

/// Exact filters for memory searches
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryFilters {
    /// Exact category match
    #[serde(default, rename = "type")]
    pub memory_type: Option<String>,
    /// Case-insensitive substring of the tags string
    #[serde(default)]
    pub tags: Option<String>,
    /// Exact membership in `concepts`
    #[serde(default)]
    pub concept: Option<String>,
    /// Case-insensitive substring of any read or modified path
    #[serde(default)]
    pub file: Option<String>,
}

/// Exact filters for conversation turn searches
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnFilters {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
}

/// A search over one record kind, scoped to one project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest<F> {
    pub project: String,
    /// Free text; absent or blank means "filters only"
    #[serde(default)]
    pub query: Option<String>,
    /// Result cap
    pub limit: usize,
    #[serde(default)]
    pub strategy: SearchStrategy,
    #[serde(default)]
    pub filters: F,
    /// Inclusive lower bound (epoch seconds or ISO-8601)
    #[serde(default)]
    pub since: Option<String>,
    /// Inclusive upper bound; date-only values cover the whole day
    #[serde(default)]
    pub until: Option<String>,
}

impl<F: Default> SearchRequest<F> {
    pub fn new(project: impl Into<String>, limit: usize) -> Self {
        Self {
            project: project.into(),
            query: None,
            limit,
            strategy: SearchStrategy::Auto,
            filters: F::default(),
            since: None,
            until: None,
        }
    }
}

impl<F> SearchRequest<F> {
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_strategy(mut self, strategy: SearchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_filters(mut self, filters: F) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_range(mut self, since: Option<String>, until: Option<String>) -> Self {
        self.since = since;
        self.until = until;
        self
    }

    /// Trimmed query text, `None` when absent or blank
    pub fn query_text(&self) -> Option<&str> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
    }
}

pub type MemorySearchRequest = SearchRequest<MemoryFilters>;
pub type TurnSearchRequest = SearchRequest<TurnFilters>;

/// Bounded, ordered search output with strategy provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult<R> {
    pub records: Vec<R>,
    /// Strategy actually executed (never `auto`)
    pub strategy_used: SearchStrategy,
    pub used_semantic_index: bool,
    /// Semantic retrieval was attempted but abandoned for relational results
    pub fell_back: bool,
}

impl<R> SearchResult<R> {
    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
