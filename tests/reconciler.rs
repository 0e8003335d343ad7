mod common;

use std::sync::Arc;

use common::*;
use ledger_anchor::anchor::{canonical_hash, lookup_by_content_hash, PassOutcome, Reconciler};
use ledger_anchor::error::AnchorError;
use ledger_anchor::ledger::{Deadline, Ledger};
use ledger_anchor::state::memory::MemoryStore;
use ledger_anchor::state::models::{
    AnchorRecord, BatchSettlement, EntityKind, InterviewStatus, ProjectStatus, RowSettlement,
};
use ledger_anchor::state::{AnchorStore, RecordStore};

fn reconciler(store: &Arc<MemoryStore>, ledger: Arc<dyn Ledger>) -> Reconciler {
    Reconciler::new(store.clone(), ledger)
}

fn anchored(outcome: PassOutcome) -> ledger_anchor::anchor::BatchReport {
    match outcome {
        PassOutcome::Anchored(report) => report,
        other => panic!("expected an anchored batch, got {other:?}"),
    }
}

#[tokio::test]
async fn test_single_project_end_to_end() {
    let store = Arc::new(MemoryStore::new());
    let project = store.create_project(new_project("alpha")).await.unwrap();
    assert_eq!(project.id, 1);

    let ledger = ScriptedLedger::with_script(vec![Step::Ok("0xabc")]);
    let report = anchored(
        reconciler(&store, ledger.clone())
            .run_pass(EntityKind::Project)
            .await
            .unwrap(),
    );

    assert_eq!(report.ledger_tx_ref, "0xabc");
    assert_eq!(report.settled, 1);
    assert!(report.superseded.is_empty());

    let stored = store.project(1).await.unwrap();
    assert!(stored.anchor.anchored);
    assert_eq!(stored.anchor.ledger_tx_ref.as_deref(), Some("0xabc"));
    assert_eq!(stored.anchor.batch_key.as_deref(), Some(report.batch_key.as_str()));

    let expected_hash = canonical_hash(&AnchorRecord::from(project)).unwrap();
    assert_eq!(stored.anchor.content_hash.as_deref(), Some(expected_hash.as_str()));

    let saves = ledger.saves();
    assert_eq!(saves.len(), 1);
    assert_eq!(saves[0].key, report.batch_key);
    assert_eq!(saves[0].values, vec![expected_hash]);
    assert_eq!(saves[0].type_tag, 1);

    let audit = store.audit_entries().await;
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].entity_label, "project");
    assert_eq!(audit[0].ledger_tx_ref, "0xabc");
    assert_eq!(audit[0].batch_key, report.batch_key);
    assert_eq!(audit[0].anchored_at, block_time());
}

#[tokio::test]
async fn test_stored_hash_survives_anchoring() {
    let store = Arc::new(MemoryStore::new());
    store.create_project(new_project("alpha")).await.unwrap();

    reconciler(&store, ScriptedLedger::new())
        .run_pass(EntityKind::Project)
        .await
        .unwrap();

    // Re-hashing the now-anchored row gives the hash it was anchored with.
    let stored = store.project(1).await.unwrap();
    let rehashed = canonical_hash(&AnchorRecord::from(stored.clone())).unwrap();
    assert_eq!(stored.anchor.content_hash, Some(rehashed));
}

#[tokio::test]
async fn test_pass_anchors_every_row_in_one_batch() {
    let store = Arc::new(MemoryStore::new());
    for name in ["a", "b", "c"] {
        store.create_project(new_project(name)).await.unwrap();
    }
    let resume = store.create_resume(new_resume("dave")).await.unwrap();

    let ledger = ScriptedLedger::new();
    let report = anchored(
        reconciler(&store, ledger.clone())
            .run_pass(EntityKind::Project)
            .await
            .unwrap(),
    );
    assert_eq!(report.settled, 3);

    for id in 1..=3 {
        let p = store.project(id).await.unwrap();
        assert!(p.anchor.anchored);
        assert_eq!(p.anchor.batch_key.as_deref(), Some(report.batch_key.as_str()));
    }

    let saves = ledger.saves();
    assert_eq!(saves.len(), 1);
    assert_eq!(saves[0].values.len(), 3);
    assert_eq!(store.audit_entries().await.len(), 1);

    // Unrelated types are untouched.
    let untouched = store.resume(resume.id).await.unwrap();
    assert!(!untouched.anchor.anchored);
    assert_eq!(untouched.anchor.batch_key, None);
}

#[tokio::test]
async fn test_tick_on_clean_state_is_a_noop() {
    let store = Arc::new(MemoryStore::new());
    let ledger = ScriptedLedger::new();

    let outcomes = reconciler(&store, ledger.clone()).run_tick().await.unwrap();
    assert_eq!(
        outcomes,
        vec![
            PassOutcome::Idle { kind: EntityKind::Project },
            PassOutcome::Idle { kind: EntityKind::Resume },
            PassOutcome::Idle { kind: EntityKind::Interview },
        ]
    );
    assert!(ledger.saves().is_empty());
    assert!(store.audit_entries().await.is_empty());
}

#[tokio::test]
async fn test_second_tick_after_anchoring_is_a_noop() {
    let store = Arc::new(MemoryStore::new());
    store.create_project(new_project("alpha")).await.unwrap();
    store.create_interview(new_interview("round one")).await.unwrap();

    let ledger = ScriptedLedger::new();
    let reconciler = reconciler(&store, ledger.clone());
    reconciler.run_tick().await.unwrap();
    assert_eq!(ledger.saves().len(), 2);

    reconciler.run_tick().await.unwrap();
    assert_eq!(ledger.saves().len(), 2);
    assert_eq!(store.audit_entries().await.len(), 2);
}

#[tokio::test]
async fn test_tick_uses_type_tags_in_order() {
    let store = Arc::new(MemoryStore::new());
    store.create_interview(new_interview("round one")).await.unwrap();
    store.create_resume(new_resume("erin")).await.unwrap();
    store.create_project(new_project("alpha")).await.unwrap();

    let ledger = ScriptedLedger::new();
    reconciler(&store, ledger.clone()).run_tick().await.unwrap();

    let tags: Vec<u64> = ledger.saves().iter().map(|s| s.type_tag).collect();
    assert_eq!(tags, vec![1, 2, 3]);

    let labels: Vec<String> = store
        .audit_entries()
        .await
        .into_iter()
        .map(|e| e.entity_label)
        .collect();
    assert_eq!(labels, vec!["project", "resume", "interview"]);
}

#[tokio::test]
async fn test_mutation_reanchors_under_new_key() {
    let store = Arc::new(MemoryStore::new());
    store.create_project(new_project("alpha")).await.unwrap();

    let reconciler = reconciler(&store, ScriptedLedger::new());
    let first = anchored(reconciler.run_pass(EntityKind::Project).await.unwrap());
    let before = store.project(1).await.unwrap();

    let mutated = store
        .set_project_status(1, ProjectStatus::Closed)
        .await
        .unwrap();
    assert!(!mutated.anchor.anchored);
    assert_eq!(mutated.anchor.content_hash, None);

    let second = anchored(reconciler.run_pass(EntityKind::Project).await.unwrap());
    let after = store.project(1).await.unwrap();

    assert!(after.anchor.anchored);
    assert_ne!(first.batch_key, second.batch_key);
    assert_ne!(before.anchor.content_hash, after.anchor.content_hash);
    assert_eq!(store.audit_entries().await.len(), 2);
}

#[tokio::test]
async fn test_failed_save_leaves_rows_for_next_tick() {
    let store = Arc::new(MemoryStore::new());
    store.create_project(new_project("alpha")).await.unwrap();
    store.create_resume(new_resume("frank")).await.unwrap();

    let ledger = ScriptedLedger::with_script(vec![Step::Fail]);
    let reconciler = reconciler(&store, ledger.clone());

    let err = reconciler.run_tick().await.unwrap_err();
    assert!(matches!(err, AnchorError::LedgerWrite(_)));

    // Nothing settled, nothing audited, and the resume pass never ran.
    assert!(!store.project(1).await.unwrap().anchor.anchored);
    assert!(!store.resume(2).await.unwrap().anchor.anchored);
    assert!(store.audit_entries().await.is_empty());
    assert!(ledger.saves().is_empty());

    let outcomes = reconciler.run_tick().await.unwrap();
    assert_eq!(outcomes.len(), 3);
    assert!(store.project(1).await.unwrap().anchor.anchored);
    assert!(store.resume(2).await.unwrap().anchor.anchored);
    assert_eq!(store.audit_entries().await.len(), 2);
}

#[tokio::test]
async fn test_failed_settlement_resubmits_next_tick() {
    let store = Arc::new(MemoryStore::new());
    store.create_project(new_project("alpha")).await.unwrap();

    let ledger = ScriptedLedger::new();
    let reconciler = reconciler(&store, ledger.clone());

    store.set_fail_settlement(true);
    let err = reconciler.run_pass(EntityKind::Project).await.unwrap_err();
    assert!(matches!(err, AnchorError::Database(_)));
    assert!(!store.project(1).await.unwrap().anchor.anchored);
    assert!(store.audit_entries().await.is_empty());
    assert_eq!(ledger.saves().len(), 1);

    store.set_fail_settlement(false);
    anchored(reconciler.run_pass(EntityKind::Project).await.unwrap());

    // At-least-once on the ledger, exactly once in the store.
    let saves = ledger.saves();
    assert_eq!(saves.len(), 2);
    assert_ne!(saves[0].key, saves[1].key);
    assert_eq!(saves[0].values, saves[1].values);
    assert_eq!(store.audit_entries().await.len(), 1);
    assert_eq!(
        store.project(1).await.unwrap().anchor.batch_key.as_deref(),
        Some(saves[1].key.as_str())
    );
}

#[tokio::test(start_paused = true)]
async fn test_hung_ledger_times_out_and_aborts_tick() {
    let store = Arc::new(MemoryStore::new());
    store.create_project(new_project("alpha")).await.unwrap();
    store.create_interview(new_interview("round one")).await.unwrap();

    let scripted = ScriptedLedger::with_script(vec![Step::Hang]);
    let bounded: Arc<dyn Ledger> = Arc::new(Deadline::new(scripted.clone(), DEADLINE));
    let reconciler = reconciler(&store, bounded);

    let err = reconciler.run_tick().await.unwrap_err();
    assert!(matches!(err, AnchorError::Timeout { operation: "save", .. }));
    assert!(!store.project(1).await.unwrap().anchor.anchored);
    assert!(!store.interview(2).await.unwrap().anchor.anchored);
    assert!(store.audit_entries().await.is_empty());

    reconciler.run_tick().await.unwrap();
    assert!(store.project(1).await.unwrap().anchor.anchored);
    assert!(store.interview(2).await.unwrap().anchor.anchored);
}

#[tokio::test]
async fn test_row_mutated_mid_pass_is_superseded() {
    let store = Arc::new(MemoryStore::new());
    store.create_project(new_project("alpha")).await.unwrap();
    store.create_project(new_project("beta")).await.unwrap();

    let ledger = ScriptedLedger::with_store(vec![Step::MutateProject(1, "0xdef")], store.clone());
    let reconciler = reconciler(&store, ledger.clone());

    let report = anchored(reconciler.run_pass(EntityKind::Project).await.unwrap());
    assert_eq!(report.settled, 1);
    assert_eq!(report.superseded, vec![1]);

    let changed = store.project(1).await.unwrap();
    assert!(!changed.anchor.anchored);
    assert_eq!(changed.status, ProjectStatus::Proceeding);
    assert!(store.project(2).await.unwrap().anchor.anchored);

    let retry = anchored(reconciler.run_pass(EntityKind::Project).await.unwrap());
    assert_eq!(retry.settled, 1);
    let changed = store.project(1).await.unwrap();
    assert!(changed.anchor.anchored);
    assert_eq!(
        changed.anchor.content_hash,
        Some(canonical_hash(&AnchorRecord::from(changed.clone())).unwrap())
    );
}

#[tokio::test]
async fn test_reapplied_settlement_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let interview = store.create_interview(new_interview("round one")).await.unwrap();
    let hash = canonical_hash(&AnchorRecord::from(interview.clone())).unwrap();

    let batch = BatchSettlement {
        kind: EntityKind::Interview,
        batch_key: "k".repeat(64),
        ledger_tx_ref: "0x77".into(),
        anchored_at: block_time(),
        rows: vec![RowSettlement {
            id: interview.id,
            revision: interview.revision,
            content_hash: hash.clone(),
        }],
    };

    let first = store.settle_batch(&batch).await.unwrap();
    let state_after_first = store.interview(interview.id).await.unwrap();
    let second = store.settle_batch(&batch).await.unwrap();
    let state_after_second = store.interview(interview.id).await.unwrap();

    assert_eq!(state_after_first, state_after_second);
    assert_eq!(first.audit, second.audit);
    assert_eq!(store.audit_entries().await.len(), 1);
    assert_eq!(state_after_second.anchor.content_hash, Some(hash));
}

#[tokio::test]
async fn test_interview_status_change_invalidates() {
    let store = Arc::new(MemoryStore::new());
    store.create_interview(new_interview("round one")).await.unwrap();
    reconciler(&store, ScriptedLedger::new())
        .run_tick()
        .await
        .unwrap();
    assert!(store.interview(1).await.unwrap().anchor.anchored);

    let updated = store
        .set_interview_status(1, InterviewStatus::Accepted, Some("strong".into()))
        .await
        .unwrap();
    assert!(!updated.anchor.anchored);
    assert_eq!(store.scan_unanchored(EntityKind::Interview).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_lookup_returns_ledger_values() {
    let store = Arc::new(MemoryStore::new());
    store.create_project(new_project("alpha")).await.unwrap();
    store.create_project(new_project("beta")).await.unwrap();

    let ledger = ScriptedLedger::new();
    reconciler(&store, ledger.clone())
        .run_pass(EntityKind::Project)
        .await
        .unwrap();

    let hash = store.project(2).await.unwrap().anchor.content_hash.unwrap();
    let result = lookup_by_content_hash(store.as_ref(), Some(ledger.as_ref() as &dyn Ledger), &hash)
        .await
        .unwrap();

    assert_eq!(result.entity, EntityKind::Project);
    assert_eq!(result.values.len(), 2);
    assert!(result.contains_hash);
    assert_eq!(result.block_number, "42");
}

#[tokio::test]
async fn test_lookup_without_ledger_is_unavailable() {
    let store = Arc::new(MemoryStore::new());
    let err = lookup_by_content_hash(store.as_ref(), None, &"0".repeat(64))
        .await
        .unwrap_err();
    assert!(matches!(err, AnchorError::LedgerUnavailable));
}

#[tokio::test]
async fn test_lookup_of_unknown_hash_is_not_found() {
    let store = Arc::new(MemoryStore::new());
    let ledger = ScriptedLedger::new();
    let err = lookup_by_content_hash(store.as_ref(), Some(ledger.as_ref() as &dyn Ledger), &"0".repeat(64))
        .await
        .unwrap_err();
    assert!(matches!(err, AnchorError::NotFound(_)));
}
