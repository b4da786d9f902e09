//! # Session Tokens
//!
//! HS256 JSON Web Tokens carrying the account id as `sub`, valid for seven days.

pub mod middleware;

use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};

/// How long an issued session token stays valid.
pub const TOKEN_TTL_DAYS: i64 = 7;

/// Represents the claims we expect to find in the JWT.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// The subject of the token: the account id.
    pub sub: String,
    /// The expiration timestamp.
    pub exp: usize,
}

/// Signs a session token for `user_id`.
pub fn issue_token(user_id: &str, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let exp = (Utc::now() + Duration::days(TOKEN_TTL_DAYS)).timestamp() as usize;
    let claims = Claims {
        sub: user_id.to_string(),
        exp,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}
