//! # AI Provider Factory
//!
//! This module centralizes the creation of AI provider instances from configuration,
//! so that every consumer (server, sync CLI, tests) builds them the same way.

use crate::{
    errors::CacheError,
    providers::ai::{gemini::GeminiProvider, local::LocalAiProvider, AiProvider},
    types::ProviderConfig,
};
use std::{collections::HashMap, time::Duration};
use tracing::info;

/// Creates one AI provider instance from its configuration entry.
///
/// - `gemini`: requires an API key; the URL is derived from the model name if not set.
/// - `local`: any OpenAI-compatible chat completions endpoint; the URL is required.
pub fn create_provider(
    name: &str,
    config: &ProviderConfig,
    timeout: Duration,
) -> Result<Box<dyn AiProvider>, CacheError> {
    let provider: Box<dyn AiProvider> = match config.provider.as_str() {
        "gemini" => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                CacheError::MissingAiProvider(format!(
                    "api_key is required for gemini provider '{name}'"
                ))
            })?;
            let api_url = config.api_url.clone().unwrap_or_else(|| {
                format!(
                    "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
                    config.model_name
                )
            });
            Box::new(GeminiProvider::new(api_url, api_key, timeout)?)
        }
        "local" => {
            let api_url = config.api_url.clone().ok_or_else(|| {
                CacheError::MissingAiProvider(format!(
                    "api_url is required for local provider '{name}'. Please set LOCAL_AI_API_URL in your .env file."
                ))
            })?;
            Box::new(LocalAiProvider::new(
                api_url,
                config.api_key.clone(),
                Some(config.model_name.clone()),
                timeout,
            )?)
        }
        other => {
            return Err(CacheError::MissingAiProvider(format!(
                "Unsupported AI provider type '{other}' for provider '{name}'"
            )));
        }
    };
    info!(provider = %name, kind = %config.provider, model = %config.model_name, "Configured AI provider.");
    Ok(provider)
}

/// Instantiates every configured provider, keyed by its configuration name.
pub fn create_providers(
    configs: &HashMap<String, ProviderConfig>,
    timeout: Duration,
) -> Result<HashMap<String, Box<dyn AiProvider>>, CacheError> {
    configs
        .iter()
        .map(|(name, config)| Ok((name.clone(), create_provider(name, config, timeout)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: &str, api_url: Option<&str>, api_key: Option<&str>) -> ProviderConfig {
        ProviderConfig {
            provider: provider.to_string(),
            api_url: api_url.map(String::from),
            api_key: api_key.map(String::from),
            model_name: "llama-3.3-70b-versatile".to_string(),
        }
    }

    #[test]
    fn local_provider_requires_url() {
        let err = create_provider("groq", &config("local", None, None), Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, CacheError::MissingAiProvider(_)));
    }

    #[test]
    fn gemini_provider_requires_key() {
        assert!(create_provider("g", &config("gemini", None, None), Duration::from_secs(1)).is_err());
        assert!(
            create_provider("g", &config("gemini", None, Some("k")), Duration::from_secs(1)).is_ok()
        );
    }

    #[test]
    fn unknown_provider_kind_is_rejected() {
        assert!(create_provider("x", &config("bedrock", Some("u"), None), Duration::from_secs(1))
            .is_err());
    }
}
