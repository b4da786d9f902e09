use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::constants::GUEST_OWNER_ID;

/// A user account as held by both stores.
///
/// Field names on the wire follow the documents already present in the Durable Store
/// (`password`, `isVerified`, `otpExpires`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    /// Unique, compared case-sensitively as stored.
    pub email: String,
    #[serde(rename = "password")]
    pub password_digest: String,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otp: Option<String>,
    #[serde(
        default,
        rename = "otpExpires",
        skip_serializing_if = "Option::is_none"
    )]
    pub otp_expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_token: Option<String>,
    #[serde(
        default,
        rename = "resetTokenExpires",
        skip_serializing_if = "Option::is_none"
    )]
    pub reset_token_expires_at: Option<DateTime<Utc>>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// The verdict attached to an analysis event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictLabel {
    True,
    False,
    Misleading,
    #[default]
    Unverified,
}

impl VerdictLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictLabel::True => "TRUE",
            VerdictLabel::False => "FALSE",
            VerdictLabel::Misleading => "MISLEADING",
            VerdictLabel::Unverified => "UNVERIFIED",
        }
    }

    /// Parses a stored label. Anything unknown is `Unverified`.
    pub fn from_stored(value: &str) -> Self {
        match value.trim().to_uppercase().as_str() {
            "TRUE" => VerdictLabel::True,
            "FALSE" => VerdictLabel::False,
            "MISLEADING" => VerdictLabel::Misleading,
            _ => VerdictLabel::Unverified,
        }
    }
}

impl fmt::Display for VerdictLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance tag of a fact-check cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OriginProvider {
    LocalManual,
    Google,
    Serper,
    GNews,
    Brave,
    AiAgent,
    CacheLocalSync,
    MongoSync,
    Other(String),
}

impl OriginProvider {
    pub fn as_str(&self) -> &str {
        match self {
            OriginProvider::LocalManual => "local-manual",
            OriginProvider::Google => "google",
            OriginProvider::Serper => "serper",
            OriginProvider::GNews => "gnews",
            OriginProvider::Brave => "brave",
            OriginProvider::AiAgent => "ai-agent",
            OriginProvider::CacheLocalSync => "cache-local-sync",
            OriginProvider::MongoSync => "mongo-sync",
            OriginProvider::Other(s) => s,
        }
    }
}

impl From<String> for OriginProvider {
    fn from(value: String) -> Self {
        match value.as_str() {
            "local-manual" => OriginProvider::LocalManual,
            "google" => OriginProvider::Google,
            "serper" => OriginProvider::Serper,
            "gnews" => OriginProvider::GNews,
            "brave" => OriginProvider::Brave,
            // Older documents were tagged plain "ai".
            "ai-agent" | "ai" => OriginProvider::AiAgent,
            "cache-local-sync" => OriginProvider::CacheLocalSync,
            "mongo-sync" => OriginProvider::MongoSync,
            _ => OriginProvider::Other(value),
        }
    }
}

impl From<OriginProvider> for String {
    fn from(value: OriginProvider) -> Self {
        value.as_str().to_string()
    }
}

fn default_origin() -> OriginProvider {
    OriginProvider::MongoSync
}

/// A shared, ownerless fact-check cache entry keyed by its normalized query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactCheckEntry {
    /// Lowercased, trimmed query. The cache key.
    #[serde(default)]
    pub query: String,
    #[serde(default, rename = "text")]
    pub claim_text: String,
    #[serde(default)]
    pub claimant: String,
    #[serde(default)]
    pub rating: String,
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_origin", rename = "source")]
    pub origin_provider: OriginProvider,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// An analysis event, exclusively owned by `owner_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRecord {
    pub id: String,
    #[serde(rename = "userId")]
    pub owner_id: String,
    #[serde(rename = "text")]
    pub claim_text: String,
    #[serde(
        default,
        rename = "base64Image",
        skip_serializing_if = "Option::is_none"
    )]
    pub image_base64: Option<String>,
    #[serde(default, rename = "imageHash", skip_serializing_if = "Option::is_none")]
    pub image_hash: Option<String>,
    #[serde(rename = "label", deserialize_with = "deserialize_label")]
    pub verdict_label: VerdictLabel,
    #[serde(rename = "score", deserialize_with = "deserialize_score")]
    pub confidence_score: u8,
    #[serde(rename = "reason")]
    pub reason_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fact_check: Option<FactCheckEntry>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl ChatRecord {
    pub fn is_guest(&self) -> bool {
        self.owner_id == GUEST_OWNER_ID
    }
}

fn deserialize_label<'de, D>(deserializer: D) -> Result<VerdictLabel, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(VerdictLabel::from_stored(&raw))
}

/// Scores written by other clients are sometimes floats; clamp into 0..=100.
fn deserialize_score<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    Ok(clamp_score(raw))
}

pub fn clamp_score(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, 100.0) as u8
}

/// The tier a cached record was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginTier {
    Embedded,
    Durable,
    Provider,
}

/// A record returned by the cache waterfall.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "record", rename_all = "camelCase")]
pub enum CachedRecord {
    Chat(ChatRecord),
    Fact(FactCheckEntry),
}

/// A cache hit together with the tier that served it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheHit {
    pub record: CachedRecord,
    pub origin: OriginTier,
}

/// The store a best-effort side write was aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreTarget {
    Embedded,
    Durable,
}

/// What happened to a best-effort side write.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SideWrite {
    Applied { target: StoreTarget },
    Skipped { target: StoreTarget, reason: String },
    Failed { target: StoreTarget, error: String },
}

impl SideWrite {
    pub fn is_failed(&self) -> bool {
        matches!(self, SideWrite::Failed { .. })
    }
}

/// The result of a primary operation, kept apart from the outcome of its side writes.
///
/// A failed side write never turns the primary result into an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome<T> {
    pub value: T,
    pub side_writes: Vec<SideWrite>,
}

impl<T> Outcome<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            side_writes: Vec::new(),
        }
    }

    pub fn with_side_write(mut self, side_write: SideWrite) -> Self {
        self.side_writes.push(side_write);
        self
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            side_writes: self.side_writes,
        }
    }
}

/// A reusable configuration for a specific AI provider instance.
#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    /// The type of provider (e.g., "gemini", "local").
    pub provider: String,
    /// The API URL. Optional for providers like Gemini where it can be derived.
    pub api_url: Option<String>,
    /// The API key, which can be null for local providers.
    pub api_key: Option<String>,
    pub model_name: String,
}
