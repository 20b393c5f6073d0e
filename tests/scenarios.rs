//! Concrete end-to-end scenarios (S1-S6) exercising the memory engine through
//! its public API, one test per scenario.

use memnesis::engine::RememberOutcome;
use memnesis::MemoryEngine;

fn written_id(outcome: RememberOutcome) -> String {
    match outcome {
        RememberOutcome::Written { id } => id,
        RememberOutcome::ConflictsFound { conflicts } => {
            panic!("expected a write, got conflicts: {conflicts:?}")
        }
    }
}

#[test]
fn s1_universal_vs_project_scoped_context() {
    let engine = MemoryEngine::in_memory(64).unwrap();

    let universal = written_id(
        engine
            .remember(
                "README-driven development keeps the contract honest before the code exists",
                "philosophy",
                0.9,
                None,
                None,
                None,
                false,
                &[],
            )
            .unwrap(),
    );
    let scoped = written_id(
        engine
            .remember(
                "engram MVP scope is hybrid search plus a knowledge graph, nothing else",
                "decision",
                0.9,
                Some("engram-mcp".to_string()),
                None,
                None,
                false,
                &[],
            )
            .unwrap(),
    );

    let in_project = engine.context("approach", Some("/mnt/dev/ai/engram-mcp/src"), 10, None).unwrap();
    let ids: Vec<&str> = in_project.iter().map(|r| r.id.as_str()).collect();
    assert!(ids.contains(&universal.as_str()));
    assert!(ids.contains(&scoped.as_str()));
    assert_eq!(ids[0], scoped, "project-scoped memory should rank first in its own project");

    let outside_project = engine.context("approach", Some("/mnt/dev/ai/hallo2/src"), 10, None).unwrap();
    let outside_ids: Vec<&str> = outside_project.iter().map(|r| r.id.as_str()).collect();
    assert!(outside_ids.contains(&universal.as_str()));
    assert!(!outside_ids.contains(&scoped.as_str()));
}

#[test]
fn s2_supersede_chain() {
    let engine = MemoryEngine::in_memory(64).unwrap();

    let r1 = written_id(
        engine.remember("Use SQLite for MVP", "decision", 0.8, None, None, None, false, &[]).unwrap(),
    );
    let r2 = written_id(
        engine
            .remember(
                "Use Postgres for MVP",
                "decision",
                0.8,
                None,
                None,
                None,
                false,
                std::slice::from_ref(&r1),
            )
            .unwrap(),
    );

    let results = engine.recall("database choice", 10, None, &[], None, true).unwrap();
    let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
    assert!(ids.contains(&r2.as_str()));
    assert!(!ids.contains(&r1.as_str()), "superseded memory must not resurface in recall");

    let old = engine.get_current_memory(&r1).unwrap();
    assert_eq!(old.id, r2, "current version of R1 should resolve to R2");

    assert_eq!(engine.graph().current_version(&r1).unwrap(), r2);
}

#[test]
fn s3_role_affinity_boosts_matching_role() {
    let engine = MemoryEngine::in_memory(64).unwrap();
    // Two memories with identical content and importance, differing only in
    // source_role, so a single recall() call scores both with every other
    // component (similarity, age, keyword overlap) held equal.
    let content = "GPU scheduling prefers batching over eager dispatch";
    let own_role = written_id(
        engine.remember(content, "pattern", 0.6, None, Some("gpu-specialist".to_string()), None, false, &[]).unwrap(),
    );
    let other_role = written_id(
        engine.remember(content, "pattern", 0.6, None, Some("studioflow".to_string()), None, false, &[]).unwrap(),
    );

    let results = engine.recall("GPU scheduling", 10, None, &[], Some("gpu-specialist"), true).unwrap();
    let own = results.iter().find(|r| r.id == own_role).unwrap();
    let other = results.iter().find(|r| r.id == other_role).unwrap();

    assert_eq!(own.role_affinity, 1.15);
    assert_eq!(other.role_affinity, 1.0);
    assert!(
        (own.relevance / other.relevance - 1.15).abs() < 1e-6,
        "role affinity should scale relevance by exactly 1.15 when other components match"
    );
}

#[test]
fn s4_implicit_validation_after_five_surfacings() {
    let engine = MemoryEngine::in_memory(64).unwrap();
    let id = written_id(
        engine
            .remember("Retry with exponential backoff on transient failures", "pattern", 0.5, None, None, None, false, &[])
            .unwrap(),
    );

    for _ in 0..4 {
        let results = engine.recall("exponential backoff retry", 10, None, &[], None, true).unwrap();
        assert!(results.iter().any(|r| r.id == id));
    }
    let memory = engine.get_current_memory(&id).unwrap();
    assert!(!memory.validated, "should not validate before the 5th surfacing");

    let results = engine.recall("exponential backoff retry", 10, None, &[], None, true).unwrap();
    assert!(results.iter().any(|r| r.id == id));

    let memory = engine.get_current_memory(&id).unwrap();
    assert!(memory.validated, "5th surfacing should flip validated to true");
}

#[test]
fn s5_auto_extraction_creates_goal_and_blocker_entities() {
    let engine = MemoryEngine::in_memory(64).unwrap();
    written_id(
        engine
            .remember(
                "Goal: ship MVP. Blocker: shiny object syndrome.",
                "decision",
                0.7,
                None,
                None,
                None,
                false,
                &[],
            )
            .unwrap(),
    );

    let goal_memories =
        engine.get_by_entity(memnesis::types::EntityType::Goal, "ship mvp", 10).unwrap();
    assert_eq!(goal_memories.len(), 1);

    let blocker_memories =
        engine.get_by_entity(memnesis::types::EntityType::Blocker, "shiny object syndrome", 10).unwrap();
    assert_eq!(blocker_memories.len(), 1);
}

#[test]
fn s6_importance_scales_relevance_within_expected_window() {
    let engine = MemoryEngine::in_memory(64).unwrap();
    let content = "The onboarding flow needs a progress indicator for long-running imports";

    let hi = written_id(
        engine.remember(content, "note", 1.0, None, None, None, false, &[]).unwrap(),
    );
    let lo = written_id(
        engine.remember(content, "note", 0.1, None, None, None, false, &[]).unwrap(),
    );

    let results = engine.recall(content, 10, None, &[], None, true).unwrap();
    let hi_score = results.iter().find(|r| r.id == hi).unwrap().relevance;
    let lo_score = results.iter().find(|r| r.id == lo).unwrap().relevance;

    assert!(hi_score > lo_score);
    let ratio = hi_score / lo_score;
    assert!((1.5..=1.9).contains(&ratio), "importance multiplier ratio {ratio} out of window");
}
