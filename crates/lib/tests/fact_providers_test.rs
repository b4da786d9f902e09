//! # Fact Provider HTTP Tests
//!
//! Runs each external fact/news provider against a mock HTTP server to check the
//! request it sends and how it maps the answer, an empty answer and a failure.

mod common;

use axiant::{
    providers::facts::{build_fact_providers, FactSourceConfig, FactSourcesConfig},
    types::OriginProvider,
    CacheError,
};
use common::setup_tracing;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn source(server: &MockServer) -> FactSourceConfig {
    FactSourceConfig {
        api_key: Some("test-key".to_string()),
        base_url: Some(server.uri()),
    }
}

#[tokio::test]
async fn test_google_fact_check_maps_first_review() {
    // --- 1. Arrange ---
    setup_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1alpha1/claims:search"))
        .and(query_param("key", "test-key"))
        .and(query_param("query", "earth is flat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "claims": [{
                "text": "The Earth is flat",
                "claimant": "Viral post",
                "claimReview": [{
                    "publisher": {"name": "Full Fact"},
                    "url": "https://fullfact.org/flat",
                    "textualRating": "False",
                    "reviewDate": "2024-05-01T00:00:00Z"
                }]
            }]
        })))
        .mount(&server)
        .await;
    let config = FactSourcesConfig {
        google: source(&server),
        ..Default::default()
    };
    let providers = build_fact_providers(&config, Duration::from_secs(5)).unwrap();
    let google = providers.authoritative.expect("google is configured");

    // --- 2. Act ---
    let payload = google.query("earth is flat").await.unwrap().unwrap();
    let entry = payload.into_entry("earth is flat").unwrap().unwrap();

    // --- 3. Assert ---
    assert_eq!(entry.origin_provider, OriginProvider::Google);
    assert_eq!(entry.publisher, "Full Fact");
    assert_eq!(entry.rating, "False");
    assert_eq!(entry.claimant, "Viral post");
    assert!(providers.secondary.is_empty());
}

#[tokio::test]
async fn test_google_without_claims_is_empty() {
    // --- 1. Arrange ---
    setup_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1alpha1/claims:search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    let config = FactSourcesConfig {
        google: source(&server),
        ..Default::default()
    };
    let providers = build_fact_providers(&config, Duration::from_secs(5)).unwrap();

    // --- 2. Act ---
    let result = providers.authoritative.unwrap().query("obscure").await;

    // --- 3. Assert ---
    assert!(matches!(result, Ok(None)), "got {result:?}");
}

#[tokio::test]
async fn test_serper_sends_key_header_and_maps_news() {
    // --- 1. Arrange ---
    setup_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/news"))
        .and(header("X-API-KEY", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "news": [{
                "title": "Tesla names new chief",
                "link": "https://news.example/tesla",
                "snippet": "The board met on Monday.",
                "source": "Reuters",
                "date": "1 day ago"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    let config = FactSourcesConfig {
        serper: source(&server),
        ..Default::default()
    };
    let providers = build_fact_providers(&config, Duration::from_secs(5)).unwrap();

    // --- 2. Act ---
    let payload = providers.secondary[0]
        .query("tesla ceo")
        .await
        .unwrap()
        .unwrap();
    let snippets = payload.snippets();
    let entry = payload.into_entry("tesla ceo").unwrap().unwrap();

    // --- 3. Assert ---
    assert!(providers.authoritative.is_none());
    assert_eq!(entry.origin_provider, OriginProvider::Serper);
    assert_eq!(entry.publisher, "Reuters");
    assert_eq!(entry.url, "https://news.example/tesla");
    assert_eq!(snippets.len(), 1);
    assert!(snippets[0].contains("The board met on Monday."));
}

#[tokio::test]
async fn test_gnews_maps_articles() {
    // --- 1. Arrange ---
    setup_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/search"))
        .and(query_param("token", "test-key"))
        .and(query_param("q", "floods in assam"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "totalArticles": 1,
            "articles": [{
                "title": "Floods hit Assam",
                "description": "Thousands displaced.",
                "url": "https://gnews.example/assam",
                "publishedAt": "2024-07-01T08:00:00Z",
                "source": {"name": "The Hindu", "url": "https://thehindu.com"}
            }]
        })))
        .mount(&server)
        .await;
    let config = FactSourcesConfig {
        gnews: source(&server),
        ..Default::default()
    };
    let providers = build_fact_providers(&config, Duration::from_secs(5)).unwrap();

    // --- 2. Act ---
    let entry = providers.secondary[0]
        .query("floods in assam")
        .await
        .unwrap()
        .unwrap()
        .into_entry("floods in assam")
        .unwrap()
        .unwrap();

    // --- 3. Assert ---
    assert_eq!(entry.origin_provider, OriginProvider::GNews);
    assert_eq!(entry.publisher, "The Hindu");
    assert_eq!(entry.date, "2024-07-01T08:00:00Z");
}

#[tokio::test]
async fn test_brave_maps_web_results() {
    // --- 1. Arrange ---
    setup_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/res/v1/web/search"))
        .and(header("X-Subscription-Token", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "web": {"results": [{
                "title": "Is coffee dehydrating?",
                "description": "Not in normal amounts.",
                "url": "https://web.example/coffee"
            }]}
        })))
        .mount(&server)
        .await;
    let config = FactSourcesConfig {
        brave: source(&server),
        ..Default::default()
    };
    let providers = build_fact_providers(&config, Duration::from_secs(5)).unwrap();

    // --- 2. Act ---
    let entry = providers.secondary[0]
        .query("coffee dehydrates")
        .await
        .unwrap()
        .unwrap()
        .into_entry("coffee dehydrates")
        .unwrap()
        .unwrap();

    // --- 3. Assert ---
    assert_eq!(entry.origin_provider, OriginProvider::Brave);
    assert_eq!(entry.url, "https://web.example/coffee");
}

#[tokio::test]
async fn test_error_status_is_connectivity_and_bad_body_is_parse_error() {
    // --- 1. Arrange ---
    setup_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/news"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v4/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;
    let config = FactSourcesConfig {
        serper: source(&server),
        gnews: source(&server),
        ..Default::default()
    };
    let providers = build_fact_providers(&config, Duration::from_secs(5)).unwrap();
    assert_eq!(providers.secondary.len(), 2);

    // --- 2. Act ---
    let serper = providers.secondary[0].query("anything").await;
    let gnews = providers.secondary[1].query("anything").await;

    // --- 3. Assert ---
    assert!(matches!(serper, Err(CacheError::Connectivity(_))), "got {serper:?}");
    assert!(
        matches!(gnews, Err(CacheError::ProviderParse { ref provider, .. }) if provider == "gnews"),
        "got {gnews:?}"
    );
}

#[tokio::test]
async fn test_providers_without_keys_are_skipped() {
    setup_tracing();
    let config = FactSourcesConfig {
        serper: FactSourceConfig {
            api_key: Some("   ".to_string()),
            base_url: None,
        },
        ..Default::default()
    };

    let providers = build_fact_providers(&config, Duration::from_secs(5)).unwrap();

    assert!(providers.authoritative.is_none());
    assert!(providers.secondary.is_empty());
}
