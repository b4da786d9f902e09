use thiserror::Error;

/// Custom error types for the cache, provider and reconciliation layers.
///
/// A cache miss is never an error: lookups return `Ok(None)` instead.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The Durable Store or an external provider could not be reached in time.
    #[error("Connectivity error: {0}")]
    Connectivity(String),
    /// The request was malformed and rejected before any store access.
    #[error("Validation error: {0}")]
    Validation(String),
    /// A uniqueness constraint would be violated.
    #[error("Conflict: {0}")]
    Conflict(String),
    /// A provider answered with a payload that could not be understood.
    #[error("Provider '{provider}' returned an unparseable payload: {message}")]
    ProviderParse { provider: String, message: String },
    /// The embedded store rejected an operation.
    #[error("Embedded store operation failed: {0}")]
    Storage(String),
    /// The Durable Store rejected an operation while reachable.
    #[error("Durable store operation failed: {0}")]
    Durable(String),
    #[error("Failed to build Reqwest client: {0}")]
    ReqwestClientBuild(reqwest::Error),
    #[error("Failed to send request to AI provider: {0}")]
    AiRequest(reqwest::Error),
    #[error("Failed to deserialize AI provider response: {0}")]
    AiDeserialization(reqwest::Error),
    #[error("AI provider returned an error: {0}")]
    AiApi(String),
    #[error("AI provider is not configured: {0}")]
    MissingAiProvider(String),
    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl CacheError {
    /// Whether the failure means "this tier is unavailable, try the next one".
    pub fn is_connectivity(&self) -> bool {
        matches!(self, CacheError::Connectivity(_))
    }
}

impl From<turso::Error> for CacheError {
    fn from(err: turso::Error) -> Self {
        CacheError::Storage(err.to_string())
    }
}
