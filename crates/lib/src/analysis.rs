//! # Claim Analysis
//!
//! [`Analyzer`] asks a language model to classify a claim. [`AnalysisService`] ties the
//! whole request together: the owner's chat cache, then a fact-check lookup and a model
//! verdict, then saving the new chat record.

use crate::{
    chats::ChatService,
    errors::CacheError,
    fact_check::{FactCheckFound, FactChecker},
    keys::image_content_hash,
    prompts::render,
    providers::ai::{extract_json_object, AiProvider},
    types::{
        clamp_score, CachedRecord, ChatRecord, OriginTier, Outcome, SideWrite, StoreTarget,
        VerdictLabel,
    },
};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A model verdict on one claim.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisVerdict {
    pub label: VerdictLabel,
    pub score: u8,
    pub reason: String,
}

impl AnalysisVerdict {
    fn unverified(reason: &str) -> Self {
        Self {
            label: VerdictLabel::Unverified,
            score: 0,
            reason: reason.to_string(),
        }
    }
}

/// Maps the model's free-form category onto a verdict label.
pub fn map_label(raw: &str) -> VerdictLabel {
    let label = raw.trim().to_lowercase();
    let has = |needle: &str| label.contains(needle);
    let verified = has("verified") && !has("unverified");
    if has("scientific fact") || has("factual") || verified || has("general knowledge") || label == "true" {
        VerdictLabel::True
    } else if has("disinformation") || has("fake") || label == "false" {
        VerdictLabel::False
    } else if has("deceptive") || has("misleading") {
        VerdictLabel::Misleading
    } else {
        VerdictLabel::Unverified
    }
}

/// Classifies claims with the configured model.
#[derive(Debug, Clone)]
pub struct Analyzer {
    provider: Box<dyn AiProvider>,
    system_prompt: String,
    user_prompt: String,
}

impl Analyzer {
    pub fn new(provider: Box<dyn AiProvider>, system_prompt: String, user_prompt: String) -> Self {
        Self {
            provider,
            system_prompt,
            user_prompt,
        }
    }

    /// Never fails: model or parse errors produce an `UNVERIFIED` verdict with score 0.
    pub async fn analyze(&self, claim: &str, context: &str) -> AnalysisVerdict {
        let user_prompt = render(&self.user_prompt, claim, context);
        let reply = match self.provider.generate(&self.system_prompt, &user_prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(component = "analyzer", error = %e, "Claim analysis failed.");
                return AnalysisVerdict::unverified("Analysis failed: the AI service is unavailable.");
            }
        };
        debug!(reply = %reply, "<-- Claim analysis reply");

        match extract_json_object(&reply) {
            Ok(Some(obj)) => parse_verdict(&obj),
            Ok(None) => {
                warn!(component = "analyzer", "Reply contained no JSON object.");
                AnalysisVerdict::unverified("Unable to analyze the claim.")
            }
            Err(e) => {
                warn!(component = "analyzer", error = %e, "Reply could not be parsed.");
                AnalysisVerdict::unverified("Unable to analyze the claim.")
            }
        }
    }
}

fn parse_verdict(obj: &Value) -> AnalysisVerdict {
    let label = obj
        .get("label")
        .and_then(Value::as_str)
        .map(map_label)
        .unwrap_or_default();
    // Scores come back as numbers or numeric strings.
    let score = match obj.get("score") {
        Some(Value::Number(n)) => n.as_f64().map(clamp_score).unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse::<f64>().map(clamp_score).unwrap_or(0),
        _ => 0,
    };
    let reason = obj
        .get("reason")
        .and_then(Value::as_str)
        .filter(|r| !r.trim().is_empty())
        .unwrap_or("No reason given.")
        .to_string();
    AnalysisVerdict {
        label,
        score,
        reason,
    }
}

/// An analysis request: claim text, an image, or both.
#[derive(Debug, Clone, Default)]
pub struct AnalysisRequest {
    pub text: String,
    pub image_base64: Option<String>,
}

/// The stored (or cached) chat record and how it was obtained.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub chat: ChatRecord,
    /// `embedded`/`durable` for a cached chat, `provider` for a fresh analysis.
    pub origin: OriginTier,
    pub fact_source: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AnalysisService {
    chats: ChatService,
    facts: FactChecker,
    analyzer: Option<Analyzer>,
}

impl AnalysisService {
    pub fn new(chats: ChatService, facts: FactChecker, analyzer: Option<Analyzer>) -> Self {
        Self {
            chats,
            facts,
            analyzer,
        }
    }

    /// Analyzes a claim for `owner_id`, reusing the owner's earlier result when cached.
    ///
    /// Store and provider outages never fail the request; only invalid input does.
    pub async fn analyze(
        &self,
        request: AnalysisRequest,
        owner_id: &str,
    ) -> Result<Outcome<AnalysisResult>, CacheError> {
        let text = request.text.trim().to_string();
        let image = request.image_base64.filter(|i| !i.trim().is_empty());
        if text.is_empty() && image.is_none() {
            return Err(CacheError::Validation(
                "Claim text or an image is required".to_string(),
            ));
        }

        let cached = match &image {
            Some(image) => self.chats.lookup_image(image, owner_id).await?,
            None => self.chats.lookup_text(&text, owner_id).await?,
        };
        let mut side_writes = cached.side_writes;
        if let Some(hit) = cached.value {
            if let CachedRecord::Chat(chat) = hit.record {
                info!(chat_id = %chat.id, owner = %owner_id, origin = ?hit.origin, "Analysis served from chat cache.");
                return Ok(Outcome {
                    value: AnalysisResult {
                        fact_source: None,
                        chat,
                        origin: hit.origin,
                    },
                    side_writes,
                });
            }
        }

        let (found, context) = if text.is_empty() {
            (None, Vec::new())
        } else {
            let checked = self.facts.check_with_context(&text).await?;
            side_writes.extend(checked.side_writes);
            (checked.value.found, checked.value.context)
        };

        let verdict = match &self.analyzer {
            Some(analyzer) => {
                analyzer
                    .analyze(&text, &analysis_context(found.as_ref(), &context))
                    .await
            }
            None => AnalysisVerdict::unverified("Unable to analyze: no AI provider is configured."),
        };

        let chat = ChatRecord {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            claim_text: text,
            image_hash: image.as_deref().map(image_content_hash),
            image_base64: image,
            verdict_label: verdict.label,
            confidence_score: verdict.score,
            reason_text: verdict.reason,
            fact_check: found.as_ref().map(|f| f.entry.clone()),
            created_at: Utc::now(),
        };
        let fact_source = found.map(|f| f.source);

        // The verdict is returned even when it cannot be stored.
        let chat = match self.chats.save(chat.clone()).await {
            Ok(saved) => {
                side_writes.extend(saved.side_writes);
                saved.value
            }
            Err(e) => {
                warn!(component = "chats", chat_id = %chat.id, error = %e, "Analysis result not saved.");
                side_writes.push(SideWrite::Failed {
                    target: StoreTarget::Durable,
                    error: e.to_string(),
                });
                chat
            }
        };

        Ok(Outcome {
            value: AnalysisResult {
                chat,
                origin: OriginTier::Provider,
                fact_source,
            },
            side_writes,
        })
    }
}

fn analysis_context(found: Option<&FactCheckFound>, snippets: &[String]) -> String {
    let mut lines = Vec::new();
    if let Some(found) = found {
        let entry = &found.entry;
        lines.push(format!(
            "Fact check by {}: rated \"{}\" ({})",
            entry.publisher, entry.rating, entry.claim_text
        ));
    }
    lines.extend(snippets.iter().take(5).cloned());
    lines.join("\n")
}
