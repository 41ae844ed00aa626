//! End-to-end search behavior against an in-memory relational store
//!
//! The semantic side is scripted so ranking and failure modes are exact.
//!
//! Run with: cargo test --test search_tests

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use codex_mem::index::{
    sync_record, Candidate, IndexDocument, IndexFilter, LocalVectorIndex, SemanticIndex,
    SemanticOutcome,
};
use codex_mem::search::{
    hydrate, MemoryKind, SearchConfig, SearchOrchestrator, TimeRange, TurnKind,
};
use codex_mem::storage::queries::{create_memory, create_turn};
use codex_mem::storage::Storage;
use codex_mem::types::*;
use codex_mem::Result;

// ============================================================================
// FIXTURES
// ============================================================================

/// Semantic index answering every query with a fixed script
struct ScriptedIndex {
    reply: Option<Vec<Value>>,
    filters: Mutex<Vec<IndexFilter>>,
}

impl ScriptedIndex {
    fn returning(ids: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(ids),
            filters: Mutex::new(Vec::new()),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            filters: Mutex::new(Vec::new()),
        })
    }
}

impl SemanticIndex for ScriptedIndex {
    fn query(&self, _: &str, _: &str, _: usize, filter: &IndexFilter) -> SemanticOutcome {
        self.filters.lock().push(filter.clone());
        match &self.reply {
            Some(ids) => SemanticOutcome::Candidates(
                ids.iter()
                    .enumerate()
                    .map(|(rank, id)| Candidate::new(id.clone(), rank as f32 / 10.0))
                    .collect(),
            ),
            None => SemanticOutcome::unavailable("connection refused"),
        }
    }

    fn upsert(&self, _: &str, _: &IndexDocument) -> Result<()> {
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.reply.is_some()
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

fn at(rfc3339: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(rfc3339)
        .unwrap()
        .with_timezone(&Utc)
}

fn memory(project: &str, summary: &str, memory_type: &str, minute: u32) -> CreateMemoryInput {
    CreateMemoryInput {
        project: project.into(),
        summary: summary.into(),
        memory_type: Some(memory_type.into()),
        created_at: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap()),
        ..Default::default()
    }
}

/// Nine memories in project "p" (ids 1..=9, older ids first); 2 and 9 are
/// decisions, and id 10 lives in project "other"
fn seeded() -> Arc<Storage> {
    let storage = Storage::open_in_memory().unwrap();
    for i in 1..=9u32 {
        let kind = if i == 2 || i == 9 { "decision" } else { "discovery" };
        let summary = if i % 2 == 0 {
            format!("JWT refresh note {}", i)
        } else {
            format!("cache eviction note {}", i)
        };
        create_memory(&storage, &memory("p", &summary, kind, i)).unwrap();
    }
    create_memory(&storage, &memory("other", "JWT elsewhere", "decision", 30)).unwrap();
    Arc::new(storage)
}

fn orchestrator(storage: Arc<Storage>, index: Arc<dyn SemanticIndex>) -> SearchOrchestrator {
    SearchOrchestrator::new(storage, index, SearchConfig::default())
}

fn ids<R>(result: &SearchResult<R>, id: impl Fn(&R) -> i64) -> Vec<i64> {
    result.records.iter().map(id).collect()
}

fn memory_ids(result: &SearchResult<Memory>) -> Vec<i64> {
    ids(result, |m| m.id)
}

const ALL_STRATEGIES: [SearchStrategy; 4] = [
    SearchStrategy::Auto,
    SearchStrategy::Relational,
    SearchStrategy::Semantic,
    SearchStrategy::Hybrid,
];

// ============================================================================
// STRATEGY RESOLUTION
// ============================================================================

#[test]
fn test_no_query_is_relational_for_every_strategy() {
    let index = ScriptedIndex::returning(vec![json!(1)]);
    let search = orchestrator(seeded(), index.clone());

    for strategy in ALL_STRATEGIES {
        for query in [None, Some("   ")] {
            let mut request = MemorySearchRequest::new("p", 3).with_strategy(strategy);
            request.query = query.map(String::from);
            let result = search.search_memories(&request).unwrap();

            assert_eq!(result.strategy_used, SearchStrategy::Relational);
            assert!(!result.used_semantic_index);
            assert!(!result.fell_back);
            assert_eq!(memory_ids(&result), vec![9, 8, 7]);
        }
    }
    assert!(index.filters.lock().is_empty(), "index must not be queried");
}

#[test]
fn test_relational_strategy_never_touches_index() {
    let index = ScriptedIndex::returning(vec![json!(1)]);
    let search = orchestrator(seeded(), index.clone());

    let request = MemorySearchRequest::new("p", 10)
        .with_query("jwt")
        .with_strategy(SearchStrategy::Relational);
    let result = search.search_memories(&request).unwrap();

    assert_eq!(memory_ids(&result), vec![8, 6, 4, 2]);
    assert_eq!(result.strategy_used, SearchStrategy::Relational);
    assert!(index.filters.lock().is_empty());
}

// ============================================================================
// HYBRID
// ============================================================================

#[test]
fn test_hybrid_keeps_semantic_rank_within_eligibility() {
    let search = orchestrator(seeded(), ScriptedIndex::returning(vec![json!(5), json!(2), json!(9)]));

    let request = MemorySearchRequest::new("p", 10)
        .with_query("token rotation")
        .with_filters(MemoryFilters {
            memory_type: Some("decision".into()),
            ..Default::default()
        });
    let result = search.search_memories(&request).unwrap();

    assert_eq!(memory_ids(&result), vec![2, 9]);
    assert_eq!(result.strategy_used, SearchStrategy::Hybrid);
    assert!(result.used_semantic_index);
    assert!(!result.fell_back);
}

#[test]
fn test_hybrid_disjoint_candidates_return_eligibility_set() {
    let search = orchestrator(seeded(), ScriptedIndex::returning(vec![json!(10), json!(404)]));

    for strategy in [SearchStrategy::Auto, SearchStrategy::Hybrid] {
        let request = MemorySearchRequest::new("p", 4)
            .with_query("anything")
            .with_strategy(strategy);
        let result = search.search_memories(&request).unwrap();

        // Most recent eligible rows, regardless of text match
        assert_eq!(memory_ids(&result), vec![9, 8, 7, 6], "{}", strategy);
        assert_eq!(result.strategy_used, SearchStrategy::Hybrid);
        assert!(result.used_semantic_index);
        assert!(!result.fell_back);
    }
}

#[test]
fn test_hydrate_without_valid_ids_runs_free_text_query() {
    let storage = seeded();
    let request = MemorySearchRequest::new("p", 10).with_query("jwt");
    let range = TimeRange::default();

    let relational = orchestrator(storage.clone(), ScriptedIndex::failing())
        .search_memories(&request.clone().with_strategy(SearchStrategy::Relational))
        .unwrap();
    let hydrated = hydrate::<MemoryKind>(
        storage.as_ref(),
        &[json!("x"), json!(null)],
        &request,
        &range,
        SearchStrategy::Hybrid,
    )
    .unwrap();

    assert_eq!(hydrated, relational.records);
    assert_eq!(memory_ids(&relational), vec![8, 6, 4, 2]);

    let semantic = hydrate::<MemoryKind>(
        storage.as_ref(),
        &[json!("x")],
        &request,
        &range,
        SearchStrategy::Semantic,
    )
    .unwrap();
    assert!(semantic.is_empty());
}

#[test]
fn test_hybrid_normalizes_candidate_ids() {
    let search = orchestrator(
        seeded(),
        ScriptedIndex::returning(vec![
            json!("4"),
            json!(null),
            json!(4),
            json!(" 6 "),
            json!("mem_x"),
            json!(1.0),
        ]),
    );

    let request = MemorySearchRequest::new("p", 10).with_query("jwt");
    let result = search.search_memories(&request).unwrap();
    assert_eq!(memory_ids(&result), vec![4, 6, 1]);
}

// ============================================================================
// SEMANTIC
// ============================================================================

#[test]
fn test_semantic_without_candidates_is_empty() {
    let search = orchestrator(seeded(), ScriptedIndex::returning(Vec::new()));

    let request = MemorySearchRequest::new("p", 10)
        .with_query("jwt")
        .with_strategy(SearchStrategy::Semantic);
    let result = search.search_memories(&request).unwrap();

    assert!(result.is_empty());
    assert_eq!(result.strategy_used, SearchStrategy::Semantic);
    assert!(result.used_semantic_index);
    assert!(!result.fell_back);
}

#[test]
fn test_semantic_drops_foreign_and_stale_ids() {
    // 10 belongs to another project, 77 was never stored
    let search = orchestrator(
        seeded(),
        ScriptedIndex::returning(vec![json!(10), json!(3), json!(77), json!(1)]),
    );

    let request = MemorySearchRequest::new("p", 10)
        .with_query("cache")
        .with_strategy(SearchStrategy::Semantic);
    let result = search.search_memories(&request).unwrap();
    assert_eq!(memory_ids(&result), vec![3, 1]);
}

#[test]
fn test_semantic_reapplies_filters() {
    let search = orchestrator(
        seeded(),
        ScriptedIndex::returning(vec![json!(9), json!(3), json!(2)]),
    );

    let request = MemorySearchRequest::new("p", 10)
        .with_query("anything")
        .with_strategy(SearchStrategy::Semantic)
        .with_filters(MemoryFilters {
            memory_type: Some("decision".into()),
            ..Default::default()
        });
    let result = search.search_memories(&request).unwrap();
    assert_eq!(memory_ids(&result), vec![9, 2]);
}

#[test]
fn test_semantic_hydrates_more_ids_than_one_statement_binds() {
    // Far beyond SQLite's bound variable limit
    let mut ranked: Vec<Value> = (1000..=40_000).map(Value::from).collect();
    ranked.extend([json!(9), json!(4), json!(6)]);
    let search = orchestrator(seeded(), ScriptedIndex::returning(ranked));

    let request = MemorySearchRequest::new("p", 2)
        .with_query("anything")
        .with_strategy(SearchStrategy::Semantic);
    let result = search.search_memories(&request).unwrap();
    assert_eq!(memory_ids(&result), vec![9, 4]);

    let all: Vec<Value> = (1..=40_000).map(Value::from).collect();
    let search = orchestrator(seeded(), ScriptedIndex::returning(all));
    let request = MemorySearchRequest::new("p", 10)
        .with_query("anything")
        .with_strategy(SearchStrategy::Semantic);
    let result = search.search_memories(&request).unwrap();
    assert_eq!(memory_ids(&result), (1..=9).collect::<Vec<_>>());
}

#[test]
fn test_tag_filter_agrees_across_strategies() {
    let storage = Storage::open_in_memory().unwrap();
    for (minute, tags) in ["équipe backend", "Équipe backend", "frontend"].into_iter().enumerate() {
        create_memory(
            &storage,
            &CreateMemoryInput {
                project: "p".into(),
                summary: "standup notes".into(),
                tags: tags.into(),
                created_at: Some(Utc.with_ymd_and_hms(2024, 5, 2, 8, minute as u32, 0).unwrap()),
                ..Default::default()
            },
        )
        .unwrap();
    }
    let search = orchestrator(
        Arc::new(storage),
        ScriptedIndex::returning(vec![json!(1), json!(2), json!(3)]),
    );

    for (needle, expected) in [("ÉQUIPE", vec![2]), ("BACKEND", vec![1, 2])] {
        let filters = MemoryFilters {
            tags: Some(needle.into()),
            ..Default::default()
        };
        let baseline = search
            .search_memories(
                &MemorySearchRequest::new("p", 10)
                    .with_query("standup")
                    .with_strategy(SearchStrategy::Relational)
                    .with_filters(filters.clone()),
            )
            .unwrap();

        for strategy in [SearchStrategy::Semantic, SearchStrategy::Hybrid] {
            let request = MemorySearchRequest::new("p", 10)
                .with_query("standup")
                .with_strategy(strategy)
                .with_filters(filters.clone());
            let result = search.search_memories(&request).unwrap();

            let mut got = memory_ids(&result);
            got.sort_unstable();
            let mut want = memory_ids(&baseline);
            want.sort_unstable();
            assert_eq!(got, want, "{} with tags {}", strategy, needle);
            assert_eq!(got, expected, "{} with tags {}", strategy, needle);
        }
    }
}

// ============================================================================
// DEGRADATION
// ============================================================================

#[test]
fn test_unavailable_index_matches_relational_with_fell_back() {
    let storage = seeded();
    let relational = orchestrator(storage.clone(), ScriptedIndex::returning(Vec::new()))
        .search_memories(
            &MemorySearchRequest::new("p", 10)
                .with_query("note")
                .with_strategy(SearchStrategy::Relational),
        )
        .unwrap();

    let failing = orchestrator(storage, ScriptedIndex::failing());
    for strategy in [SearchStrategy::Auto, SearchStrategy::Semantic, SearchStrategy::Hybrid] {
        let request = MemorySearchRequest::new("p", 10)
            .with_query("note")
            .with_strategy(strategy);
        let result = failing.search_memories(&request).unwrap();

        assert_eq!(result.records, relational.records);
        assert_eq!(result.strategy_used, SearchStrategy::Relational);
        assert!(!result.used_semantic_index);
        assert!(result.fell_back);
    }
}

// ============================================================================
// BOUNDS AND STABILITY
// ============================================================================

#[test]
fn test_results_never_exceed_limit() {
    let all: Vec<Value> = (1..=10).map(Value::from).collect();
    let search = orchestrator(seeded(), ScriptedIndex::returning(all));

    for limit in [0, 1, 2, 5, 50] {
        for strategy in ALL_STRATEGIES {
            let request = MemorySearchRequest::new("p", limit)
                .with_query("note")
                .with_strategy(strategy);
            let result = search.search_memories(&request).unwrap();
            assert!(
                result.count() <= limit,
                "{} returned {} for limit {}",
                strategy,
                result.count(),
                limit
            );
            assert!(result.records.iter().all(|m| m.project == "p"));
        }
    }
}

#[test]
fn test_repeated_search_is_stable() {
    let search = orchestrator(seeded(), ScriptedIndex::returning(vec![json!(8), json!(2)]));
    let request = MemorySearchRequest::new("p", 5).with_query("jwt");

    let first = search.search_memories(&request).unwrap();
    let second = search.search_memories(&request).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_date_only_until_covers_whole_day() {
    let storage = Storage::open_in_memory().unwrap();
    for stamp in [
        "2024-03-01T00:00:00Z",
        "2024-03-01T23:59:59Z",
        "2024-03-02T00:00:00Z",
    ] {
        create_memory(
            &storage,
            &CreateMemoryInput {
                project: "p".into(),
                summary: format!("entry at {}", stamp),
                created_at: Some(at(stamp)),
                ..Default::default()
            },
        )
        .unwrap();
    }
    let search = orchestrator(Arc::new(storage), ScriptedIndex::returning(vec![json!(3), json!(1), json!(2)]));

    let first_day = MemorySearchRequest::new("p", 10)
        .with_range(Some("2024-03-01".into()), Some("2024-03-01".into()));
    assert_eq!(memory_ids(&search.search_memories(&first_day).unwrap()), vec![2, 1]);

    // Hydrated candidates are held to the same range
    let hybrid = first_day.clone().with_query("entry");
    assert_eq!(memory_ids(&search.search_memories(&hybrid).unwrap()), vec![1, 2]);

    let second_day = MemorySearchRequest::new("p", 10).with_range(Some("2024-03-02".into()), None);
    assert_eq!(memory_ids(&search.search_memories(&second_day).unwrap()), vec![3]);

    // Unparseable bounds are ignored
    let garbage = MemorySearchRequest::new("p", 10).with_range(Some("yesterday".into()), None);
    assert_eq!(search.search_memories(&garbage).unwrap().count(), 3);
}

// ============================================================================
// CONVERSATION TURNS
// ============================================================================

fn seeded_turns() -> Arc<Storage> {
    let storage = Storage::open_in_memory().unwrap();
    let turns = [
        ("s1", Role::User, "how do I rotate the JWT secret"),
        ("s1", Role::Assistant, "rotate it with the admin CLI"),
        ("s2", Role::User, "JWT expiry is too short"),
        ("s2", Role::Tool, "config read"),
    ];
    for (minute, (session, role, content)) in turns.into_iter().enumerate() {
        create_turn(
            &storage,
            &CreateTurnInput {
                project: "p".into(),
                session_id: session.into(),
                role,
                content: content.into(),
                context: Default::default(),
                metadata: Default::default(),
                created_at: Some(Utc.with_ymd_and_hms(2024, 5, 1, 9, minute as u32, 0).unwrap()),
            },
        )
        .unwrap();
    }
    Arc::new(storage)
}

#[test]
fn test_turn_search_scopes_index_and_rows_to_session() {
    let index = ScriptedIndex::returning(vec![json!(3), json!(1), json!(2)]);
    let search = orchestrator(seeded_turns(), index.clone());

    let request = TurnSearchRequest::new("p", 10)
        .with_query("jwt")
        .with_filters(TurnFilters {
            session_id: Some("s1".into()),
            role: None,
        });
    let result = search.search_turns(&request).unwrap();

    assert_eq!(ids(&result, |t| t.id), vec![1, 2]);
    assert_eq!(result.strategy_used, SearchStrategy::Hybrid);

    let filters = index.filters.lock();
    assert_eq!(filters[0].get("project").map(String::as_str), Some("p"));
    assert_eq!(filters[0].get("session_id").map(String::as_str), Some("s1"));
}

#[test]
fn test_turn_relational_role_filter() {
    let search = orchestrator(seeded_turns(), ScriptedIndex::failing());

    let request = TurnSearchRequest::new("p", 10)
        .with_query("JWT")
        .with_filters(TurnFilters {
            session_id: None,
            role: Some(Role::User),
        });
    let result = search.search_turns(&request).unwrap();

    assert_eq!(ids(&result, |t| t.id), vec![3, 1]);
    assert!(result.fell_back);
}

// ============================================================================
// LOCAL VECTOR INDEX
// ============================================================================

#[test]
fn test_local_index_end_to_end() {
    let storage = Arc::new(Storage::open_in_memory().unwrap());
    let index = Arc::new(LocalVectorIndex::open_in_memory().unwrap());
    let config = SearchConfig::default();

    let summaries = [
        "database migration for postgres tables",
        "jwt token refresh flow for the login service",
        "flaky integration test in the billing suite",
    ];
    for (minute, summary) in summaries.into_iter().enumerate() {
        let created = create_memory(&*storage, &memory("p", summary, "discovery", minute as u32)).unwrap();
        assert!(sync_record::<MemoryKind>(index.as_ref(), &config, &created));
    }
    let turn = create_turn(
        &*storage,
        &CreateTurnInput {
            project: "p".into(),
            session_id: "s".into(),
            role: Role::User,
            content: "jwt token refresh".into(),
            context: Default::default(),
            metadata: Default::default(),
            created_at: None,
        },
    )
    .unwrap();
    assert!(sync_record::<TurnKind>(index.as_ref(), &config, &turn));

    let search = SearchOrchestrator::new(storage, index, config);

    let request = MemorySearchRequest::new("p", 1).with_query("jwt token refresh");
    let result = search.search_memories(&request).unwrap();
    assert_eq!(result.strategy_used, SearchStrategy::Hybrid);
    assert!(result.used_semantic_index);
    assert_eq!(result.records[0].summary, summaries[1]);

    // Other projects see nothing
    let request = MemorySearchRequest::new("q", 5)
        .with_query("jwt token refresh")
        .with_strategy(SearchStrategy::Semantic);
    assert!(search.search_memories(&request).unwrap().is_empty());

    let request = TurnSearchRequest::new("p", 5).with_query("refresh");
    let result = search.search_turns(&request).unwrap();
    assert_eq!(ids(&result, |t| t.id), vec![turn.id]);
}
