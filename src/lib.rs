//! codex-mem - project-scoped memory for coding agents
//!
//! Memories and conversation turns are appended to a relational store and
//! retrieved by exact filters, substring match and, when a semantic index is
//! available, similarity ranking. Semantic results are always re-validated
//! against the relational store, and degraded searches say so in their
//! provenance.

pub mod config;
pub mod embedding;
pub mod error;
pub mod index;
pub mod search;
pub mod storage;
pub mod types;

pub use config::Settings;
pub use error::{MemError, Result};
pub use index::{open_index, SemanticIndex, SemanticOutcome};
pub use search::{SearchConfig, SearchOrchestrator};
pub use storage::{open_store, RelationalStore, Storage};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
