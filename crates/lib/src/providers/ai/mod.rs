pub mod gemini;
pub mod local;

use crate::errors::CacheError;
use async_trait::async_trait;
use dyn_clone::DynClone;
use std::fmt::Debug;

/// A trait for interacting with an AI provider.
///
/// This trait defines a common interface for text generation across different Large
/// Language Models (e.g., Gemini, OpenAI-compatible endpoints such as Groq).
#[async_trait]
pub trait AiProvider: Send + Sync + Debug + DynClone {
    /// Generates a response from a given system and user prompt.
    ///
    /// The result should be a string containing the AI's response.
    async fn generate(&self, system_prompt: &str, user_prompt: &str)
        -> Result<String, CacheError>;
}

dyn_clone::clone_trait_object!(AiProvider);

/// Extracts the first JSON object from a model reply.
///
/// Tries a fenced code block first, then falls back to the outermost braces. `Ok(None)`
/// when the reply contains no object at all.
pub fn extract_json_object(reply: &str) -> Result<Option<serde_json::Value>, CacheError> {
    let re = regex::Regex::new(r"```(?:json)?\s*(\{[\s\S]*?\})\s*```")?;
    let candidate = match re.captures(reply).and_then(|c| c.get(1)) {
        Some(m) => m.as_str(),
        None => match (reply.find('{'), reply.rfind('}')) {
            (Some(start), Some(end)) if start < end => &reply[start..=end],
            _ => return Ok(None),
        },
    };
    let value: serde_json::Value = serde_json::from_str(candidate.trim())?;
    Ok(value.is_object().then_some(value))
}
