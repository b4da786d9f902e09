use crate::{errors::CacheError, providers::ai::AiProvider};
use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, time::Duration};
use tracing::debug;

// --- OpenAI-compatible request and response structures ---

#[derive(Serialize)]
struct LocalAiRequest<'a> {
    messages: Vec<LocalAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    temperature: f32,
    max_tokens: i32,
    stream: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct LocalAiMessage {
    role: String,
    content: String,
}

#[derive(Deserialize, Debug)]
struct LocalAiResponse {
    choices: Vec<LocalAiChoice>,
}

#[derive(Deserialize, Debug)]
struct LocalAiChoice {
    message: LocalAiMessage,
}

// --- Local Provider implementation ---

/// A provider for a local or OpenAI-compatible chat completions API (Groq, Ollama, ...).
#[derive(Clone, Debug)]
pub struct LocalAiProvider {
    client: ReqwestClient,
    api_url: String,
    api_key: Option<String>,
    model: Option<String>,
}

impl LocalAiProvider {
    /// Creates a new `LocalAiProvider` whose requests give up after `timeout`.
    pub fn new(
        api_url: String,
        api_key: Option<String>,
        model: Option<String>,
        timeout: Duration,
    ) -> Result<Self, CacheError> {
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(CacheError::ReqwestClientBuild)?;
        Ok(Self {
            client,
            api_url,
            api_key,
            model,
        })
    }
}

#[async_trait]
impl AiProvider for LocalAiProvider {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, CacheError> {
        let messages = vec![
            LocalAiMessage {
                role: "system".to_string(),
                content: system_prompt.to_string(),
            },
            LocalAiMessage {
                role: "user".to_string(),
                content: user_prompt.to_string(),
            },
        ];

        let request_body = LocalAiRequest {
            messages,
            model: self.model.as_deref(),
            temperature: 0.1,
            max_tokens: 1024,
            stream: false,
        };

        let mut request_builder = self.client.post(&self.api_url);

        if let Some(key) = &self.api_key {
            request_builder = request_builder.bearer_auth(key);
        }

        debug!(url = %self.api_url, model = ?self.model, "--> Sending chat completion request");

        let response = request_builder
            .json(&request_body)
            .send()
            .await
            .map_err(CacheError::AiRequest)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(CacheError::AiApi(format!("{status}: {error_text}")));
        }

        let local_ai_response: LocalAiResponse = response
            .json()
            .await
            .map_err(CacheError::AiDeserialization)?;

        let raw_response = local_ai_response
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .unwrap_or_default();

        Ok(raw_response)
    }
}
