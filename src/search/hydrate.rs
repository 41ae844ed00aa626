//! Hydration: semantic candidate ids back into full records
//!
//! The semantic index is not authoritative. Ids it returns may be malformed,
//! duplicated, stale or outside the caller's filters, so every id is checked
//! again against the relational store before it reaches a result. The
//! lookup carries the same predicates as the filtered query.

use serde_json::Value;
use std::collections::{HashMap, HashSet};

use super::record::RecordKind;
use super::relational::{filtered_query, scoped_builder};
use super::time_range::TimeRange;
use crate::error::Result;
use crate::storage::RelationalStore;
use crate::types::{RecordId, SearchRequest, SearchStrategy};

/// Ids bound per lookup statement, well under SQLite's variable limit
const ID_CHUNK: usize = 500;

/// Integer id from an index value
///
/// Accepts integers, integral floats and numeric strings (surrounding
/// whitespace allowed). Everything else is rejected.
pub fn normalize_id(value: &Value) -> Option<RecordId> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Normalize ids in order, dropping invalid ids and repeats (first one wins)
pub fn normalize_ids(values: &[Value]) -> Vec<RecordId> {
    let mut seen = HashSet::new();
    values
        .iter()
        .filter_map(normalize_id)
        .filter(|id| seen.insert(*id))
        .collect()
}

/// Resolve ranked ids into records of kind `K`, keeping the given order
///
/// An empty id list yields an empty result for the semantic strategy and a
/// full free-text relational search for every other caller.
pub fn hydrate<K: RecordKind>(
    store: &dyn RelationalStore,
    raw_ids: &[Value],
    request: &SearchRequest<K::Filters>,
    range: &TimeRange,
    strategy: SearchStrategy,
) -> Result<Vec<K::Record>> {
    let ids = normalize_ids(raw_ids);

    if ids.is_empty() {
        if strategy == SearchStrategy::Semantic {
            return Ok(Vec::new());
        }
        return filtered_query::<K>(store, request, range, true, None);
    }

    let mut by_id: HashMap<RecordId, K::Record> = HashMap::with_capacity(ids.len());
    for chunk in ids.chunks(ID_CHUNK) {
        let mut builder = scoped_builder::<K>(store, request, range, false);
        builder.in_ids("id", chunk);
        let query = builder.select(K::COLUMNS, K::TABLE, None, None);

        for row in store.fetch_rows(&query)? {
            let record = K::from_row(&row)?;
            by_id.insert(K::record_id(&record), record);
        }
        // Chunks follow rank order, so later ones cannot displace these
        if by_id.len() >= request.limit {
            break;
        }
    }

    let records: Vec<K::Record> = ids
        .iter()
        .filter_map(|id| by_id.remove(id))
        .take(request.limit)
        .collect();

    tracing::debug!(
        kind = K::NAME,
        candidates = ids.len(),
        hydrated = records.len(),
        "Hydrated semantic candidates"
    );
    Ok(records)
}
