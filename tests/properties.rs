//! Invariants, round-trip laws, and boundary behavior for the memory engine,
//! independent of the S1-S6 end-to-end scenarios in `tests/scenarios.rs`.

use memnesis::engine::RememberOutcome;
use memnesis::graph::GraphNode;
use memnesis::types::{EntityStatus, EntityType, Priority};
use memnesis::MemoryEngine;

fn written_id(outcome: RememberOutcome) -> String {
    match outcome {
        RememberOutcome::Written { id } => id,
        RememberOutcome::ConflictsFound { conflicts } => {
            panic!("expected a write, got conflicts: {conflicts:?}")
        }
    }
}

fn remember(engine: &MemoryEngine, content: &str, importance: f32) -> String {
    written_id(engine.remember(content, "note", importance, None, None, None, false, &[]).unwrap())
}

#[test]
fn graph_memory_node_mirrors_record_fields() {
    let engine = MemoryEngine::in_memory(32).unwrap();
    let id = written_id(
        engine
            .remember(
                "Use feature flags to roll out risky migrations gradually",
                "decision",
                0.7,
                Some("payments".to_string()),
                Some("backend-lead".to_string()),
                None,
                false,
                &[],
            )
            .unwrap(),
    );

    match engine.graph().node(&id).expect("memory node should exist in the graph") {
        GraphNode::Memory(node) => {
            assert_eq!(node.id, id);
            assert_eq!(node.memory_type, "decision");
            assert_eq!(node.project.as_deref(), Some("payments"));
            assert_eq!(node.source_role.as_deref(), Some("backend-lead"));
        }
        GraphNode::Entity(_) => panic!("expected a memory node"),
    }
}

#[test]
fn add_entity_is_idempotent_on_type_and_name() {
    let engine = MemoryEngine::in_memory(32).unwrap();
    let a = engine.add_entity(EntityType::Goal, "Ship MVP", EntityStatus::Active, Some(Priority::P0), None).unwrap();
    let b = engine.add_entity(EntityType::Goal, "ship mvp", EntityStatus::Active, None, None).unwrap();
    assert_eq!(a.id, b.id, "same type+name must canonicalize to the same entity id regardless of case");
}

#[test]
fn access_and_surface_counts_increase_by_one_per_recall() {
    let engine = MemoryEngine::in_memory(32).unwrap();
    let id = remember(&engine, "Prefer structured logging over println for service code", 0.5);

    for expected in 1..=3 {
        let results = engine.recall("structured logging", 10, None, &[], None, true).unwrap();
        let hit = results.iter().find(|r| r.id == id).unwrap();
        assert_eq!(hit.access_count, expected);
    }
}

#[test]
fn validated_flips_exactly_at_the_fifth_surfacing_and_never_reverts() {
    let engine = MemoryEngine::in_memory(32).unwrap();
    let id = remember(&engine, "Batch writes to reduce fsync overhead on spinning disks", 0.5);

    for _ in 0..4 {
        engine.recall("batch writes fsync", 10, None, &[], None, true).unwrap();
        assert!(!engine.get_current_memory(&id).unwrap().validated);
    }
    engine.recall("batch writes fsync", 10, None, &[], None, true).unwrap();
    assert!(engine.get_current_memory(&id).unwrap().validated);

    // Surfacing it further must not un-validate it.
    for _ in 0..3 {
        engine.recall("batch writes fsync", 10, None, &[], None, true).unwrap();
        assert!(engine.get_current_memory(&id).unwrap().validated);
    }
}

#[test]
fn importance_is_clamped_to_the_unit_interval() {
    let engine = MemoryEngine::in_memory(32).unwrap();
    let too_low = remember(&engine, "Negative importance should clamp to zero", -1.0);
    let too_high = remember(&engine, "Excess importance should clamp to one", 2.0);
    let in_range = remember(&engine, "In-range importance should be unchanged", 0.42);

    assert_eq!(engine.get_current_memory(&too_low).unwrap().importance, 0.0);
    assert_eq!(engine.get_current_memory(&too_high).unwrap().importance, 1.0);
    assert_eq!(engine.get_current_memory(&in_range).unwrap().importance, 0.42);
}

#[test]
fn supersede_chains_resolve_to_the_newest_version() {
    let engine = MemoryEngine::in_memory(32).unwrap();
    let r1 = remember(&engine, "Cache layer: LRU with a 10k entry cap", 0.6);
    let r2 = written_id(
        engine
            .remember(
                "Cache layer: LRU with a 50k entry cap",
                "decision",
                0.6,
                None,
                None,
                None,
                false,
                std::slice::from_ref(&r1),
            )
            .unwrap(),
    );
    let r3 = written_id(
        engine
            .remember(
                "Cache layer: LFU replacing the LRU cache entirely",
                "decision",
                0.6,
                None,
                None,
                None,
                false,
                std::slice::from_ref(&r2),
            )
            .unwrap(),
    );

    assert_eq!(engine.get_current_memory(&r1).unwrap().id, r3, "chain of two supersedes must resolve through both hops");
    assert_eq!(engine.get_current_memory(&r2).unwrap().id, r3);
    assert_eq!(engine.get_current_memory(&r3).unwrap().id, r3, "a current memory supersedes to itself");
}

#[test]
fn update_then_get_reflects_new_content_and_recall_finds_it() {
    let engine = MemoryEngine::in_memory(32).unwrap();
    let id = remember(&engine, "Original wording about deploy cadence", 0.5);

    engine.update(&id, Some("Rewritten wording about release cadence"), None, Some(0.9)).unwrap();

    let memory = engine.get_current_memory(&id).unwrap();
    assert_eq!(memory.content, "Rewritten wording about release cadence");
    assert_eq!(memory.importance, 0.9);

    let results = engine.recall("release cadence", 10, None, &[], None, true).unwrap();
    assert!(results.iter().any(|r| r.id == id), "recall should index the updated embedding, not the stale one");
}

#[test]
fn delete_removes_the_memory_from_recall_and_the_graph() {
    let engine = MemoryEngine::in_memory(32).unwrap();
    let id = remember(&engine, "Transient note about a one-off spike investigation", 0.3);
    assert!(engine.graph().node(&id).is_some());

    engine.delete(&id).unwrap();

    assert!(engine.get_current_memory(&id).is_err(), "deleted memory must not be gettable");
    assert!(engine.graph().node(&id).is_none(), "deleted memory must be removed from the graph");

    let results = engine.recall("one-off spike investigation", 10, None, &[], None, true).unwrap();
    assert!(!results.iter().any(|r| r.id == id));
}

#[test]
fn empty_query_recall_returns_no_results_without_erroring() {
    let engine = MemoryEngine::in_memory(32).unwrap();
    remember(&engine, "Something searchable for the corpus to not be empty", 0.5);

    let results = engine.recall("", 10, None, &[], None, true).unwrap();
    assert!(results.is_empty());
}

#[test]
fn recall_with_zero_limit_returns_nothing() {
    let engine = MemoryEngine::in_memory(32).unwrap();
    remember(&engine, "A memory that would otherwise match the query below", 0.5);

    let results = engine.recall("memory that would otherwise match", 0, None, &[], None, true).unwrap();
    assert!(results.is_empty());
}

#[test]
fn recall_is_deterministic_across_repeated_calls_given_fixed_inputs() {
    let engine = MemoryEngine::in_memory(32).unwrap();
    for i in 0..5 {
        remember(&engine, &format!("Load balancing strategy variant {i}"), 0.5);
    }

    // Compare two independently-seeded engines so side effects from one call
    // can't leak into the other: same content in, same ranking out.
    let other = MemoryEngine::in_memory(32).unwrap();
    for i in 0..5 {
        other.remember(&format!("Load balancing strategy variant {i}"), "note", 0.5, None, None, None, false, &[]).unwrap();
    }

    let a = engine.recall("load balancing strategy", 10, None, &[], None, true).unwrap();
    let b = other.recall("load balancing strategy", 10, None, &[], None, true).unwrap();

    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(b.iter()) {
        assert!((x.relevance - y.relevance).abs() < 1e-6, "identical inputs must score identically");
    }
}

#[test]
fn remember_rejects_empty_content() {
    let engine = MemoryEngine::in_memory(32).unwrap();
    let err = engine.remember("   ", "note", 0.5, None, None, None, false, &[]).unwrap_err();
    assert!(err.to_string().contains("empty"));
}
