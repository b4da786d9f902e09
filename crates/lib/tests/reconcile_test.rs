//! # Reconciler Tests
//!
//! Pull-then-push behavior between the Embedded and Durable stores: pruning of absent
//! records, guest-chat exclusion, idempotency, per-record error collection, collections
//! whose pull fails and the unreachable-remote short circuit.

mod common;

use crate::common::setup_tracing;
use axiant::{
    constants::GUEST_OWNER_ID,
    providers::db::durable::Collection,
    types::OriginProvider,
    Reconciler,
};
use axiant_test_utils::{sample_chat, sample_fact, sample_user, TestSetup};
use serde_json::json;

#[tokio::test]
async fn test_pull_replaces_local_tables_with_remote() {
    setup_tracing();
    let setup = TestSetup::new().await.unwrap();
    let records_handle = setup.pool.get().await.unwrap();
    let remote = records_handle.records();
    remote
        .upsert_user(&sample_user("u1", "ada@example.com"))
        .await
        .unwrap();
    remote
        .upsert_fact(&sample_fact("moon is cheese", OriginProvider::Google))
        .await
        .unwrap();
    remote
        .upsert_chat(&sample_chat("c1", "u1", "Moon is cheese"))
        .await
        .unwrap();

    let report = Reconciler::new(setup.embedded.clone(), setup.pool.clone())
        .reconcile_all()
        .await;

    assert!(report.is_clean(), "unexpected errors: {:?}", report.errors);
    assert_eq!(report.per_collection.users.pulled, 1);
    assert_eq!(report.per_collection.facts.pulled, 1);
    assert_eq!(report.per_collection.chats.pulled, 1);
    assert!(setup
        .embedded
        .find_user_by_email("ada@example.com")
        .await
        .unwrap()
        .is_some());
    assert!(setup.embedded.find_fact("moon is cheese").await.unwrap().is_some());
    assert_eq!(setup.embedded.list_chats().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_empty_remote_prunes_local_only_records() {
    setup_tracing();
    let setup = TestSetup::new().await.unwrap();
    setup
        .embedded
        .upsert_fact(&sample_fact("stale claim", OriginProvider::Serper))
        .await
        .unwrap();
    setup
        .embedded
        .upsert_fact(&sample_fact("another stale claim", OriginProvider::Serper))
        .await
        .unwrap();
    setup
        .embedded
        .upsert_chat(&sample_chat("local-only", "u1", "Something said"))
        .await
        .unwrap();
    setup
        .embedded
        .upsert_user(&sample_user("u1", "ada@example.com"))
        .await
        .unwrap();

    let report = Reconciler::new(setup.embedded.clone(), setup.pool.clone())
        .reconcile_all()
        .await;

    // Pull runs before push, so records only the Embedded Store knows are gone.
    assert_eq!(report.per_collection.facts.pruned, 2);
    assert_eq!(report.per_collection.chats.pruned, 1);
    assert_eq!(report.per_collection.users.pruned, 1);
    assert_eq!(report.per_collection.facts.pushed, 0);
    assert!(setup.embedded.list_facts().await.unwrap().is_empty());
    assert!(setup.embedded.list_chats().await.unwrap().is_empty());
    assert!(setup.embedded.list_users().await.unwrap().is_empty());
    assert!(setup.remote.snapshot(Collection::FactChecks).is_empty());
}

#[tokio::test]
async fn test_guest_chats_are_kept_locally_and_never_pushed() {
    setup_tracing();
    let setup = TestSetup::new().await.unwrap();
    setup
        .pool
        .get()
        .await
        .unwrap()
        .records()
        .upsert_chat(&sample_chat("c-user", "u1", "Claim from a user"))
        .await
        .unwrap();
    setup
        .embedded
        .upsert_chat(&sample_chat("c-guest", GUEST_OWNER_ID, "Claim from a guest"))
        .await
        .unwrap();

    let report = Reconciler::new(setup.embedded.clone(), setup.pool.clone())
        .reconcile_all()
        .await;

    assert!(report.is_clean(), "unexpected errors: {:?}", report.errors);
    assert_eq!(report.per_collection.chats.pruned, 0);
    assert_eq!(report.per_collection.chats.pushed, 1);

    let local: Vec<String> = setup
        .embedded
        .list_chats()
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert!(local.contains(&"c-guest".to_string()));
    assert!(local.contains(&"c-user".to_string()));

    let remote = setup.remote.snapshot(Collection::Chats);
    assert_eq!(remote.len(), 1);
    assert_eq!(remote[0]["id"], "c-user");
}

#[tokio::test]
async fn test_second_run_changes_nothing() {
    setup_tracing();
    let setup = TestSetup::new().await.unwrap();
    let handle = setup.pool.get().await.unwrap();
    handle
        .records()
        .upsert_fact(&sample_fact("earth is flat", OriginProvider::Google))
        .await
        .unwrap();
    handle
        .records()
        .upsert_user(&sample_user("u1", "ada@example.com"))
        .await
        .unwrap();
    let reconciler = Reconciler::new(setup.embedded.clone(), setup.pool.clone());

    let first = reconciler.reconcile_all().await;
    let local_after_first = setup.embedded.list_facts().await.unwrap();
    let remote_after_first = setup.remote.snapshot(Collection::FactChecks);

    let second = reconciler.reconcile_all().await;

    assert!(first.is_clean() && second.is_clean());
    assert_eq!(second.per_collection.facts.pruned, 0);
    assert_eq!(second.per_collection.users.pruned, 0);
    assert_eq!(second.per_collection, first.per_collection);
    assert_eq!(setup.embedded.list_facts().await.unwrap(), local_after_first);
    assert_eq!(setup.remote.snapshot(Collection::FactChecks), remote_after_first);
}

#[tokio::test]
async fn test_record_failure_is_collected_and_batch_continues() {
    setup_tracing();
    let setup = TestSetup::new().await.unwrap();
    let handle = setup.pool.get().await.unwrap();
    for query in ["claim one", "claim two", "claim three"] {
        handle
            .records()
            .upsert_fact(&sample_fact(query, OriginProvider::Serper))
            .await
            .unwrap();
    }
    setup.remote.fail_upserts_for("claim two");

    let report = Reconciler::new(setup.embedded.clone(), setup.pool.clone())
        .reconcile_all()
        .await;

    assert_eq!(report.per_collection.facts.pulled, 3);
    assert_eq!(report.per_collection.facts.pushed, 2);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("claim two"), "{:?}", report.errors);
}

#[tokio::test]
async fn test_unreachable_remote_changes_nothing() {
    setup_tracing();
    let setup = TestSetup::new().await.unwrap();
    setup
        .embedded
        .upsert_fact(&sample_fact("kept locally", OriginProvider::Google))
        .await
        .unwrap();
    setup.remote.set_reachable(false);

    let report = Reconciler::new(setup.embedded.clone(), setup.pool.clone())
        .reconcile_all()
        .await;

    assert!(!report.is_clean());
    assert!(report.errors[0].starts_with("durable store unavailable"));
    assert_eq!(report.per_collection, Default::default());
    assert_eq!(setup.embedded.list_facts().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_pull_does_not_restore_remote_deletes() {
    setup_tracing();
    let setup = TestSetup::new().await.unwrap();
    // Deleted remotely, still cached locally.
    setup
        .embedded
        .upsert_fact(&sample_fact("retracted claim", OriginProvider::Google))
        .await
        .unwrap();
    setup
        .embedded
        .upsert_user(&sample_user("u1", "ada@example.com"))
        .await
        .unwrap();
    setup.remote.fail_scans_of(Collection::FactChecks);

    let report = Reconciler::new(setup.embedded.clone(), setup.pool.clone())
        .reconcile_all()
        .await;

    assert!(
        report.errors.iter().any(|e| e.starts_with("pull facts")),
        "{:?}",
        report.errors
    );
    assert_eq!(report.per_collection.facts.pushed, 0);
    assert!(setup.remote.snapshot(Collection::FactChecks).is_empty());
    // The fact table is left as it was.
    assert!(setup
        .embedded
        .find_fact("retracted claim")
        .await
        .unwrap()
        .is_some());
    // Other collections still reconcile: the local-only user is pruned.
    assert_eq!(report.per_collection.users.pruned, 1);
    assert!(setup.remote.snapshot(Collection::Users).is_empty());
}

#[tokio::test]
async fn test_blank_key_document_is_rejected_and_rest_converges() {
    setup_tracing();
    let setup = TestSetup::new().await.unwrap();
    let handle = setup.pool.get().await.unwrap();
    handle
        .upsert(Collection::FactChecks, "", &json!({"query": "", "rating": "False"}))
        .await
        .unwrap();
    handle
        .records()
        .upsert_fact(&sample_fact("valid claim", OriginProvider::Google))
        .await
        .unwrap();
    setup
        .embedded
        .upsert_fact(&sample_fact("stale claim", OriginProvider::Serper))
        .await
        .unwrap();

    let report = Reconciler::new(setup.embedded.clone(), setup.pool.clone())
        .reconcile_all()
        .await;

    assert_eq!(report.per_collection.facts.pulled, 1);
    assert_eq!(report.per_collection.facts.pruned, 1);
    assert_eq!(report.errors.len(), 1, "{:?}", report.errors);
    assert!(report.errors[0].contains("blank query"), "{:?}", report.errors);
    assert!(setup.embedded.find_fact("valid claim").await.unwrap().is_some());
    assert!(setup.embedded.find_fact("stale claim").await.unwrap().is_none());
}

#[tokio::test]
async fn test_report_serializes_in_camel_case() {
    setup_tracing();
    let setup = TestSetup::new().await.unwrap();

    let report = Reconciler::new(setup.embedded.clone(), setup.pool.clone())
        .reconcile_all()
        .await;
    let json = serde_json::to_value(&report).unwrap();

    assert!(json.get("perCollection").is_some());
    assert!(json.get("durationMs").is_some());
    assert_eq!(json["perCollection"]["facts"]["pulled"], 0);
}
