#![allow(dead_code)]
//! # Common Test Utilities
//!
//! Shared helpers for the integration tests: tracing setup and ready-made provider
//! payloads, so each test only spells out what it is about.

use axiant::providers::facts::{
    GoogleClaimsResponse, ProviderPayload, SerperNewsResponse,
};
use serde_json::json;
use std::sync::Once;

static INIT: Once = Once::new();

/// Initializes the tracing subscriber once per test binary.
pub fn setup_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A Google Fact Check answer with one claim and one review.
pub fn google_payload(claim: &str, rating: &str) -> ProviderPayload {
    let resp: GoogleClaimsResponse = serde_json::from_value(json!({
        "claims": [{
            "text": claim,
            "claimant": "Social media",
            "claimReview": [{
                "publisher": {"name": "PolitiFact"},
                "url": "https://politifact.com/check",
                "textualRating": rating,
                "reviewDate": "2024-02-01T00:00:00Z"
            }]
        }]
    }))
    .expect("valid google payload");
    ProviderPayload::GoogleFactCheck(resp)
}

/// A Serper news answer with one article.
pub fn serper_payload(title: &str, source: &str) -> ProviderPayload {
    let resp: SerperNewsResponse = serde_json::from_value(json!({
        "news": [{
            "title": title,
            "link": format!("https://{source}.example/article"),
            "snippet": format!("{title}, reports {source}."),
            "source": source,
            "date": "2 days ago"
        }]
    }))
    .expect("valid serper payload");
    ProviderPayload::SerperNews(resp)
}
