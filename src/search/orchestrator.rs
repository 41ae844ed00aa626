//! Search orchestration
//!
//! Strategy is resolved once per call:
//!
//! 1. No query text: relational filters only, whatever was requested.
//! 2. `relational`: filters plus substring match on the text fields.
//! 3. `semantic`: semantic candidates hydrated in rank order.
//! 4. `hybrid` / `auto`: semantic candidates intersected with the relational
//!    eligibility set; an empty intersection returns the eligibility set.
//!
//! An unavailable semantic index turns 3 and 4 into 2 with `fell_back` set.
//! Relational errors always propagate.

use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

use super::hydrate::{hydrate, normalize_ids};
use super::record::{MemoryKind, RecordKind, TurnKind};
use super::relational::filtered_query;
use super::time_range::TimeRange;
use super::SearchConfig;
use crate::error::Result;
use crate::index::{SemanticIndex, SemanticOutcome};
use crate::storage::RelationalStore;
use crate::types::{
    ConversationTurn, Memory, MemorySearchRequest, RecordId, SearchRequest, SearchResult,
    SearchStrategy, TurnSearchRequest,
};

/// Hybrid search over one relational store and one semantic index
#[derive(Clone)]
pub struct SearchOrchestrator {
    store: Arc<dyn RelationalStore>,
    index: Arc<dyn SemanticIndex>,
    config: SearchConfig,
}

fn finish<R>(
    records: Vec<R>,
    strategy_used: SearchStrategy,
    used_semantic_index: bool,
    fell_back: bool,
) -> SearchResult<R> {
    SearchResult {
        records,
        strategy_used,
        used_semantic_index,
        fell_back,
    }
}

impl SearchOrchestrator {
    pub fn new(
        store: Arc<dyn RelationalStore>,
        index: Arc<dyn SemanticIndex>,
        config: SearchConfig,
    ) -> Self {
        Self {
            store,
            index,
            config,
        }
    }

    pub fn search_memories(&self, request: &MemorySearchRequest) -> Result<SearchResult<Memory>> {
        self.search::<MemoryKind>(request)
    }

    pub fn search_turns(
        &self,
        request: &TurnSearchRequest,
    ) -> Result<SearchResult<ConversationTurn>> {
        self.search::<TurnKind>(request)
    }

    /// Run one search for record kind `K`
    pub fn search<K: RecordKind>(
        &self,
        request: &SearchRequest<K::Filters>,
    ) -> Result<SearchResult<K::Record>> {
        let store = self.store.as_ref();
        let range = TimeRange::from_bounds(request.since.as_deref(), request.until.as_deref());

        let Some(text) = request.query_text() else {
            tracing::debug!(kind = K::NAME, "No query text, filters only");
            let records = filtered_query::<K>(store, request, &range, false, None)?;
            return Ok(finish(records, SearchStrategy::Relational, false, false));
        };

        if request.strategy == SearchStrategy::Relational {
            let records = filtered_query::<K>(store, request, &range, true, None)?;
            return Ok(finish(records, SearchStrategy::Relational, false, false));
        }

        if !self.config.semantic_enabled {
            tracing::debug!(
                kind = K::NAME,
                requested = %request.strategy,
                "Semantic index disabled, using relational search"
            );
            let records = filtered_query::<K>(store, request, &range, true, None)?;
            return Ok(finish(records, SearchStrategy::Relational, false, false));
        }

        let top_k = request
            .limit
            .saturating_mul(self.config.candidate_multiplier);
        let filter = K::index_filter(&request.project, &request.filters);
        let collection = K::collection(&self.config);

        let candidates = match self.index.query(collection, text, top_k, &filter) {
            SemanticOutcome::Candidates(candidates) => candidates,
            SemanticOutcome::Unavailable(reason) => {
                tracing::warn!(
                    kind = K::NAME,
                    requested = %request.strategy,
                    "Semantic index unavailable, falling back to relational search: {}",
                    reason
                );
                let records = filtered_query::<K>(store, request, &range, true, None)?;
                return Ok(finish(records, SearchStrategy::Relational, false, true));
            }
        };

        let raw_ids: Vec<Value> = candidates.into_iter().map(|c| c.external_id).collect();
        tracing::debug!(
            kind = K::NAME,
            requested = %request.strategy,
            candidates = raw_ids.len(),
            top_k,
            "Semantic candidates received"
        );

        if request.strategy == SearchStrategy::Semantic {
            let records = hydrate::<K>(store, &raw_ids, request, &range, SearchStrategy::Semantic)?;
            return Ok(finish(records, SearchStrategy::Semantic, true, false));
        }

        // Hybrid and auto
        let eligibility_cap = request
            .limit
            .saturating_mul(self.config.eligibility_multiplier);
        let eligible = filtered_query::<K>(store, request, &range, false, Some(eligibility_cap))?;
        let eligible_ids: HashSet<RecordId> = eligible.iter().map(K::record_id).collect();

        let ranked: Vec<Value> = normalize_ids(&raw_ids)
            .into_iter()
            .filter(|id| eligible_ids.contains(id))
            .map(Value::from)
            .collect();

        if ranked.is_empty() {
            tracing::debug!(
                kind = K::NAME,
                eligible = eligible.len(),
                "No semantic candidate is eligible, returning most recent matches"
            );
            let records = eligible.into_iter().take(request.limit).collect();
            return Ok(finish(records, SearchStrategy::Hybrid, true, false));
        }

        let records = hydrate::<K>(store, &ranked, request, &range, SearchStrategy::Hybrid)?;
        Ok(finish(records, SearchStrategy::Hybrid, true, false))
    }
}
