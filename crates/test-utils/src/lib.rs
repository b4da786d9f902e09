use anyhow::Result;
use async_trait::async_trait;
use axiant::{
    errors::CacheError,
    providers::{
        ai::AiProvider,
        db::{
            durable::{DurablePool, MemoryConnector, MemoryDurableStore},
            sqlite::EmbeddedStore,
        },
        facts::{FactProvider, ProviderPayload},
    },
    types::{ChatRecord, FactCheckEntry, OriginProvider, User, VerdictLabel},
    AxiantCoreBuilder,
};
use chrono::Utc;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// --- Test Setup ---

/// An isolated in-memory Embedded Store plus an in-memory Durable Store behind a pool.
pub struct TestSetup {
    pub embedded: EmbeddedStore,
    /// The remote side. Flip reachability or inject failures through it.
    pub remote: MemoryDurableStore,
    pub pool: DurablePool,
}

impl TestSetup {
    pub async fn new() -> Result<Self> {
        let embedded = EmbeddedStore::open(":memory:").await?;
        let remote = MemoryDurableStore::new();
        let pool = DurablePool::new(
            Arc::new(MemoryConnector::new(remote.clone())),
            Duration::from_secs(1),
        )
        .with_reconnect_cooldown(Duration::ZERO);
        Ok(Self {
            embedded,
            remote,
            pool,
        })
    }

    /// A core builder already wired to both stores.
    pub fn builder(&self) -> AxiantCoreBuilder {
        AxiantCoreBuilder::new()
            .embedded(self.embedded.clone())
            .durable(self.pool.clone())
    }
}

// --- Fixtures ---

pub fn sample_fact(query: &str, provider: OriginProvider) -> FactCheckEntry {
    FactCheckEntry {
        query: query.trim().to_lowercase(),
        claim_text: query.to_string(),
        claimant: "Someone".to_string(),
        rating: "False".to_string(),
        publisher: "Snopes".to_string(),
        date: "2024-01-01".to_string(),
        url: "https://example.com/check".to_string(),
        origin_provider: provider,
        created_at: Utc::now(),
    }
}

pub fn sample_chat(id: &str, owner_id: &str, text: &str) -> ChatRecord {
    ChatRecord {
        id: id.to_string(),
        owner_id: owner_id.to_string(),
        claim_text: text.to_string(),
        image_base64: None,
        image_hash: None,
        verdict_label: VerdictLabel::False,
        confidence_score: 87,
        reason_text: "Contradicted by multiple sources.".to_string(),
        fact_check: None,
        created_at: Utc::now(),
    }
}

pub fn sample_user(id: &str, email: &str) -> User {
    User {
        id: id.to_string(),
        username: email.split('@').next().unwrap_or("user").to_string(),
        email: email.to_string(),
        password_digest: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdHNhbHQ$aGFzaGhhc2g".to_string(),
        is_verified: true,
        otp: None,
        otp_expires_at: None,
        reset_token: None,
        reset_token_expires_at: None,
        created_at: Utc::now(),
    }
}

// --- Mock AI Provider ---

#[derive(Clone, Debug)]
pub struct MockAiProvider {
    responses: Arc<Mutex<HashMap<String, String>>>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockAiProvider {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Pre-programs a response for a specific prompt.
    /// The key should be a unique substring of the system prompt.
    pub fn add_response(&self, key: &str, response: &str) {
        let mut responses = self.responses.lock().unwrap();
        responses.insert(key.to_string(), response.to_string());
    }

    /// Retrieves the recorded calls for assertion.
    pub fn get_calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockAiProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AiProvider for MockAiProvider {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String, CacheError> {
        let mut calls = self.calls.lock().unwrap();
        calls.push((system_prompt.to_string(), user_prompt.to_string()));

        let responses = self.responses.lock().unwrap();
        for (key, response) in responses.iter() {
            if system_prompt.contains(key) {
                return Ok(response.clone());
            }
        }

        Err(CacheError::AiApi(format!(
            "MockAiProvider: No response programmed for system prompt. Got: '{system_prompt}'"
        )))
    }
}

// --- Scripted Fact Provider ---

#[derive(Clone, Debug)]
enum Script {
    Empty,
    Payload(ProviderPayload),
    Fail(String),
}

/// A fact provider that answers every query the same way and counts its calls.
#[derive(Clone, Debug)]
pub struct ScriptedFactProvider {
    name: String,
    script: Script,
    calls: Arc<AtomicUsize>,
}

impl ScriptedFactProvider {
    fn with_script(name: &str, script: Script) -> Self {
        Self {
            name: name.to_string(),
            script,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Answers, but with nothing.
    pub fn empty(name: &str) -> Self {
        Self::with_script(name, Script::Empty)
    }

    pub fn answering(name: &str, payload: ProviderPayload) -> Self {
        Self::with_script(name, Script::Payload(payload))
    }

    /// Fails every call as if the service were unreachable.
    pub fn failing(name: &str) -> Self {
        Self::with_script(name, Script::Fail(format!("{name} is down")))
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FactProvider for ScriptedFactProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(&self, _text: &str) -> Result<Option<ProviderPayload>, CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Empty => Ok(None),
            Script::Payload(payload) => Ok(Some(payload.clone())),
            Script::Fail(message) => Err(CacheError::Connectivity(message.clone())),
        }
    }
}
