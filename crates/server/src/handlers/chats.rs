//! # Chat Handlers
//!
//! Owner-scoped chat lookups, history, saves and deletes. The owner is always the
//! caller resolved by [`AuthenticatedUser`]; guests share the guest sentinel.

use super::{settle, AppError, AppState};
use crate::auth::middleware::AuthenticatedUser;
use axiant::{
    fact_check::{SOURCE_CACHE_CLOUD, SOURCE_CACHE_LOCAL},
    types::{CacheHit, CachedRecord, FactCheckEntry, OriginTier, VerdictLabel},
    ChatRecord,
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChatQuery {
    pub q: Option<String>,
    pub image_hash: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct DeleteChatQuery {
    pub id: Option<String>,
}

/// The body of `POST /api/chats`. The owner and id are assigned by the server.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChatInput {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub base64_image: Option<String>,
    #[serde(default)]
    pub image_hash: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub fact_check: Option<FactCheckEntry>,
}

impl ChatInput {
    fn into_record(self, owner_id: &str) -> ChatRecord {
        ChatRecord {
            id: String::new(),
            owner_id: owner_id.to_string(),
            claim_text: self.text.trim().to_string(),
            image_base64: self.base64_image.filter(|i| !i.trim().is_empty()),
            image_hash: self.image_hash.filter(|h| !h.trim().is_empty()),
            verdict_label: self
                .label
                .as_deref()
                .map(VerdictLabel::from_stored)
                .unwrap_or(VerdictLabel::Unverified),
            confidence_score: self.score.unwrap_or(0.0).round().clamp(0.0, 100.0) as u8,
            reason_text: self.reason,
            fact_check: self.fact_check,
            created_at: Utc::now(),
        }
    }
}

fn source_tag(origin: OriginTier) -> &'static str {
    match origin {
        OriginTier::Embedded => SOURCE_CACHE_LOCAL,
        OriginTier::Durable => SOURCE_CACHE_CLOUD,
        OriginTier::Provider => "provider",
    }
}

fn hit_body(hit: Option<CacheHit>) -> Value {
    match hit {
        Some(CacheHit {
            record: CachedRecord::Chat(chat),
            origin,
        }) => json!({ "success": true, "data": chat, "source": source_tag(origin) }),
        _ => json!({ "success": true, "data": null }),
    }
}

/// `?imageHash=` and `?q=` look up the caller's cached chat; no parameter lists
/// their newest chats.
pub async fn list_chats_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ChatQuery>,
) -> Result<Json<Value>, AppError> {
    let chats = &app_state.core.chats;

    if let Some(hash) = query.image_hash.filter(|h| !h.trim().is_empty()) {
        let hit = settle(
            chats.lookup_image_hash(&hash, user.owner_id()).await?,
            "chat image lookup",
        );
        return Ok(Json(hit_body(hit)));
    }

    if let Some(text) = query.q.filter(|q| !q.trim().is_empty()) {
        let hit = settle(
            chats.lookup_text(&text, user.owner_id()).await?,
            "chat text lookup",
        );
        return Ok(Json(hit_body(hit)));
    }

    let history = chats.history(user.owner_id()).await?;
    Ok(Json(json!({ "success": true, "data": history })))
}

/// Saves a chat for the caller.
pub async fn create_chat_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<ChatInput>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let record = payload.into_record(user.owner_id());
    let chat = settle(app_state.core.chats.save(record).await?, "chat save");
    info!(chat_id = %chat.id, owner = %chat.owner_id, "Saved chat.");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": chat })),
    ))
}

/// Deletes one of the caller's chats. Chats of other owners are left untouched.
pub async fn delete_chat_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<DeleteChatQuery>,
) -> Result<Json<Value>, AppError> {
    let id = query
        .id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Chat ID is required".to_string()))?;

    let removed = settle(
        app_state.core.chats.delete(&id, user.owner_id()).await?,
        "chat delete",
    );
    info!(chat_id = %id, owner = %user.owner_id(), removed, "Chat delete requested.");
    Ok(Json(json!({
        "success": true,
        "message": "Chat deleted successfully",
    })))
}
