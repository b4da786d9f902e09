//! # Fact-Check and Analysis Handlers
//!
//! `/api/fact-check` runs the cache waterfall and the provider chain for a claim;
//! `/api/analyze` classifies a claim or image for the caller and stores the result
//! as one of their chats.

use super::{settle, AppError, AppState};
use crate::auth::middleware::AuthenticatedUser;
use axiant::{AnalysisRequest, CacheError};
use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

#[derive(Deserialize, Debug, Default)]
pub struct FactCheckRequest {
    #[serde(default)]
    pub query: String,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub image_base64: Option<String>,
}

/// Looks up a fact-check: `{found: true, ...entry, source}` or `{found: false, message}`.
pub async fn fact_check_handler(
    State(app_state): State<AppState>,
    Json(payload): Json<FactCheckRequest>,
) -> Result<Json<Value>, AppError> {
    info!(query = %payload.query, "Received fact-check request.");
    let found = settle(
        app_state.core.facts.check(&payload.query).await?,
        "fact-check",
    );

    let Some(found) = found else {
        return Ok(Json(json!({
            "found": false,
            "message": "No fact checks found.",
        })));
    };

    let mut body = serde_json::to_value(&found.entry).map_err(CacheError::from)?;
    if let Some(fields) = body.as_object_mut() {
        fields.insert("found".to_string(), Value::Bool(true));
        fields.insert("source".to_string(), Value::String(found.source));
    }
    Ok(Json(body))
}

/// Analyzes a claim for the caller, reusing their cached chat when there is one.
pub async fn analyze_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<AnalyzeRequest>,
) -> Result<Json<Value>, AppError> {
    info!(owner = %user.owner_id(), has_image = payload.image_base64.is_some(), "Received analyze request.");
    let request = AnalysisRequest {
        text: payload.text,
        image_base64: payload.image_base64,
    };
    let result = settle(
        app_state
            .core
            .analysis
            .analyze(request, user.owner_id())
            .await?,
        "analyze",
    );
    Ok(Json(json!({ "success": true, "data": result })))
}
