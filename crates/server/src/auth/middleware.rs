//! # Authentication Middleware
//!
//! This module provides the `AuthenticatedUser` extractor that resolves the caller's
//! owner id from an optional `Authorization: Bearer <token>` header:
//! 1.  **No Token Present**: Resolves to the guest sentinel.
//! 2.  **Valid Token Present**: Resolves to the token's subject.
//! 3.  **Invalid/Expired Token Present**: Rejects the request with a `401 Unauthorized`.

use super::Claims;
use crate::state::AppState;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use core_access::GUEST_USER_IDENTIFIER;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde_json::json;
use tracing::{debug, warn};

/// The owner id of the current caller: an account id, or the guest sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

impl AuthenticatedUser {
    pub fn owner_id(&self) -> &str {
        &self.0
    }

    pub fn is_guest(&self) -> bool {
        self.0 == GUEST_USER_IDENTIFIER
    }
}

/// A custom rejection type for authentication failures.
pub struct AuthError(StatusCode, String);

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

/// Decodes and validates a session token, returning its subject.
pub fn decode_subject(token: &str, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims.sub)
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let bearer_header =
            Option::<TypedHeader<Authorization<Bearer>>>::from_request_parts(parts, state)
                .await
                .map_err(|e| {
                    warn!("Unexpected error during header extraction: {}", e);
                    AuthError(
                        StatusCode::BAD_REQUEST,
                        "Invalid Authorization header format.".to_string(),
                    )
                })?;

        let Some(TypedHeader(Authorization(bearer))) = bearer_header else {
            debug!("No Authorization header found, using guest user.");
            return Ok(AuthenticatedUser(GUEST_USER_IDENTIFIER.to_string()));
        };

        let subject = decode_subject(bearer.token(), state.jwt_secret()).map_err(|e| {
            warn!("JWT validation failed: {}", e);
            AuthError(StatusCode::UNAUTHORIZED, "Invalid token".to_string())
        })?;

        // A token minted for the sentinel must not unlock the synced paths.
        if subject.trim().is_empty() || subject == GUEST_USER_IDENTIFIER {
            return Err(AuthError(
                StatusCode::UNAUTHORIZED,
                "Invalid token".to_string(),
            ));
        }

        Ok(AuthenticatedUser(subject))
    }
}
