//! Hybrid search over memories and conversation turns
//!
//! - Time bounds are parsed leniently ([`parse_epoch`])
//! - The relational store answers exact filters and substring matches
//! - The semantic index proposes ranked candidates, which are intersected
//!   with the relational eligibility set and hydrated in rank order
//! - Semantic failures degrade to relational search and are reported in
//!   the result's provenance

mod hydrate;
mod orchestrator;
mod record;
mod relational;
mod time_range;

pub use hydrate::{hydrate, normalize_id, normalize_ids};
pub use orchestrator::SearchOrchestrator;
pub use record::{MemoryKind, RecordKind, TurnKind};
pub use relational::filtered_query;
pub use time_range::{parse_epoch, TimeRange};

use crate::config::Settings;

/// Orchestrator configuration, fixed at construction
#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    /// Consult the semantic index at all
    pub semantic_enabled: bool,
    /// Collection holding memories
    pub memory_collection: String,
    /// Collection holding conversation turns
    pub turn_collection: String,
    /// Semantic candidates requested per result slot
    pub candidate_multiplier: usize,
    /// Eligibility rows fetched per result slot in hybrid mode
    pub eligibility_multiplier: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            semantic_enabled: true,
            memory_collection: "codex-mem".to_string(),
            turn_collection: "codex-mem-turns".to_string(),
            candidate_multiplier: 4,
            eligibility_multiplier: 6,
        }
    }
}

impl SearchConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            semantic_enabled: settings.semantic_enabled(),
            memory_collection: settings.vector_collection.clone(),
            turn_collection: settings.vector_collection_turns.clone(),
            ..Self::default()
        }
    }

    /// Relational only
    pub fn relational_only() -> Self {
        Self {
            semantic_enabled: false,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_settings() {
        let mut settings = Settings::with_data_dir("/tmp/cm");
        settings.vector_collection = "mems".into();
        settings.vector_provider = "none".into();

        let config = SearchConfig::from_settings(&settings);
        assert!(!config.semantic_enabled);
        assert_eq!(config.memory_collection, "mems");
        assert_eq!(config.turn_collection, "codex-mem-turns");
        assert_eq!(config.candidate_multiplier, 4);
        assert_eq!(config.eligibility_multiplier, 6);
    }
}
