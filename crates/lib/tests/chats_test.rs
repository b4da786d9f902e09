//! # Chat and Analysis Tests
//!
//! Guest versus authenticated persistence, history fallback, owner-scoped deletes and
//! the end-to-end analysis flow with its chat cache.

mod common;

use crate::common::setup_tracing;
use axiant::{
    constants::GUEST_OWNER_ID,
    prompts::{CLAIM_ANALYSIS_SYSTEM_PROMPT, CLAIM_ANALYSIS_USER_PROMPT},
    providers::db::durable::Collection,
    types::{OriginTier, SideWrite, StoreTarget, VerdictLabel},
    AnalysisRequest, Analyzer, CacheError,
};
use axiant_test_utils::{sample_chat, MockAiProvider, TestSetup};

#[tokio::test]
async fn test_guest_chat_stays_local() {
    setup_tracing();
    let setup = TestSetup::new().await.unwrap();
    let core = setup.builder().build().unwrap();
    let chat = sample_chat("", "", "Bananas are berries");

    let saved = core.chats.save(chat).await.unwrap();

    assert_eq!(saved.value.owner_id, GUEST_OWNER_ID);
    assert!(!saved.value.id.is_empty(), "an id is assigned");
    assert!(matches!(
        saved.side_writes.as_slice(),
        [SideWrite::Skipped {
            target: StoreTarget::Durable,
            ..
        }]
    ));
    assert_eq!(setup.embedded.list_chats().await.unwrap().len(), 1);
    assert!(setup.remote.snapshot(Collection::Chats).is_empty());
}

#[tokio::test]
async fn test_authenticated_chat_is_written_to_both_stores() {
    setup_tracing();
    let setup = TestSetup::new().await.unwrap();
    let core = setup.builder().build().unwrap();

    let saved = core
        .chats
        .save(sample_chat("c1", "u1", "Bananas are berries"))
        .await
        .unwrap();

    assert_eq!(
        saved.side_writes,
        vec![SideWrite::Applied {
            target: StoreTarget::Embedded
        }]
    );
    assert_eq!(setup.remote.snapshot(Collection::Chats).len(), 1);
    let hit = core
        .chats
        .lookup_text("  BANANAS are berries", "u1")
        .await
        .unwrap();
    assert_eq!(hit.value.unwrap().origin, OriginTier::Embedded);
}

#[tokio::test]
async fn test_authenticated_save_fails_when_durable_is_down() {
    setup_tracing();
    let setup = TestSetup::new().await.unwrap();
    setup.remote.set_reachable(false);
    let core = setup.builder().build().unwrap();

    let err = core
        .chats
        .save(sample_chat("c1", "u1", "Bananas are berries"))
        .await
        .unwrap_err();

    assert!(err.is_connectivity(), "got {err:?}");
    assert!(
        setup.embedded.list_chats().await.unwrap().is_empty(),
        "nothing is written locally when the primary write fails"
    );
}

#[tokio::test]
async fn test_save_rejects_empty_chat() {
    setup_tracing();
    let setup = TestSetup::new().await.unwrap();
    let core = setup.builder().build().unwrap();

    let err = core
        .chats
        .save(sample_chat("c1", "u1", "   "))
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::Validation(_)));
}

#[tokio::test]
async fn test_history_falls_back_to_embedded_store() {
    setup_tracing();
    let setup = TestSetup::new().await.unwrap();
    let core = setup.builder().build().unwrap();
    core.chats
        .save(sample_chat("c1", "u1", "First claim"))
        .await
        .unwrap();
    core.chats
        .save(sample_chat("c2", "u1", "Second claim"))
        .await
        .unwrap();
    core.chats
        .save(sample_chat("c3", "u2", "Someone else's claim"))
        .await
        .unwrap();

    let online = core.chats.history("u1").await.unwrap();
    assert_eq!(online.len(), 2);

    setup.remote.set_reachable(false);
    let offline = core.chats.history("u1").await.unwrap();
    assert_eq!(offline.len(), 2);
    assert!(offline.iter().all(|c| c.owner_id == "u1"));
}

#[tokio::test]
async fn test_delete_only_removes_own_chats() {
    setup_tracing();
    let setup = TestSetup::new().await.unwrap();
    let core = setup.builder().build().unwrap();
    core.chats
        .save(sample_chat("c1", "u1", "Mine"))
        .await
        .unwrap();

    let foreign = core.chats.delete("c1", "u2").await.unwrap();
    assert!(!foreign.value);
    assert_eq!(setup.remote.snapshot(Collection::Chats).len(), 1);

    let own = core.chats.delete("c1", "u1").await.unwrap();
    assert!(own.value);
    assert!(setup.remote.snapshot(Collection::Chats).is_empty());
    assert!(setup.embedded.list_chats().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_analysis_is_cached_per_owner() {
    setup_tracing();
    let setup = TestSetup::new().await.unwrap();
    let ai = MockAiProvider::new();
    ai.add_response(
        "Disinformation Analyst",
        r#"{"label": "Disinformation", "score": 91, "reason": "No evidence supports it."}"#,
    );
    let core = setup
        .builder()
        .analyzer(Analyzer::new(
            Box::new(ai.clone()),
            CLAIM_ANALYSIS_SYSTEM_PROMPT.to_string(),
            CLAIM_ANALYSIS_USER_PROMPT.to_string(),
        ))
        .build()
        .unwrap();
    let request = || AnalysisRequest {
        text: "The moon is made of cheese".to_string(),
        image_base64: None,
    };

    // 1. A fresh claim is analyzed and saved.
    let first = core.analysis.analyze(request(), "u1").await.unwrap();
    assert_eq!(first.value.origin, OriginTier::Provider);
    assert_eq!(first.value.chat.verdict_label, VerdictLabel::False);
    assert_eq!(first.value.chat.confidence_score, 91);
    assert_eq!(setup.remote.snapshot(Collection::Chats).len(), 1);

    // 2. The same owner asking again is served from the Embedded Store.
    let second = core.analysis.analyze(request(), "u1").await.unwrap();
    assert_eq!(second.value.origin, OriginTier::Embedded);
    assert_eq!(second.value.chat.id, first.value.chat.id);
    assert_eq!(ai.get_calls().len(), 1);

    // 3. Another owner gets a fresh analysis.
    let other = core.analysis.analyze(request(), "u2").await.unwrap();
    assert_eq!(other.value.origin, OriginTier::Provider);
    assert_eq!(ai.get_calls().len(), 2);
}

#[tokio::test]
async fn test_analysis_survives_model_outage() {
    setup_tracing();
    let setup = TestSetup::new().await.unwrap();
    // No programmed response: every call fails.
    let ai = MockAiProvider::new();
    let core = setup
        .builder()
        .analyzer(Analyzer::new(
            Box::new(ai),
            CLAIM_ANALYSIS_SYSTEM_PROMPT.to_string(),
            CLAIM_ANALYSIS_USER_PROMPT.to_string(),
        ))
        .build()
        .unwrap();

    let result = core
        .analysis
        .analyze(
            AnalysisRequest {
                text: "Cats can see infrared".to_string(),
                image_base64: None,
            },
            GUEST_OWNER_ID,
        )
        .await
        .unwrap();

    assert_eq!(result.value.chat.verdict_label, VerdictLabel::Unverified);
    assert_eq!(result.value.chat.confidence_score, 0);
    assert!(result.value.chat.reason_text.contains("unavailable"));
}

#[tokio::test]
async fn test_analysis_result_kept_when_save_fails() {
    setup_tracing();
    let setup = TestSetup::new().await.unwrap();
    setup.remote.set_reachable(false);
    let core = setup.builder().build().unwrap();

    let result = core
        .analysis
        .analyze(
            AnalysisRequest {
                text: "Water boils at 50 degrees".to_string(),
                image_base64: None,
            },
            "u1",
        )
        .await
        .unwrap();

    assert_eq!(result.value.origin, OriginTier::Provider);
    assert!(result
        .side_writes
        .iter()
        .any(|w| matches!(w, SideWrite::Failed { target: StoreTarget::Durable, .. })));
}

#[tokio::test]
async fn test_analysis_requires_text_or_image() {
    setup_tracing();
    let setup = TestSetup::new().await.unwrap();
    let core = setup.builder().build().unwrap();

    let err = core
        .analysis
        .analyze(AnalysisRequest::default(), "u1")
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::Validation(_)));
}
