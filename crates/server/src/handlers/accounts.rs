//! # Account Route Handlers
//!
//! Signup, email verification, login and password reset over the account service.
//! A successful login returns a signed session token.

use super::{settle, AppError, AppState};
use crate::auth::issue_token;
use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

#[derive(Deserialize, Debug, Default)]
pub struct SignupRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct VerifyRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub otp: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct ForgotPasswordRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub otp: String,
    #[serde(default)]
    pub new_password: String,
}

pub async fn signup_handler(
    State(app_state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let user = settle(
        app_state
            .accounts
            .signup(&payload.username, &payload.email, &payload.password)
            .await?,
        "signup",
    );
    info!(user_id = %user.id, "Account created.");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "User created. Please verify your email.",
            "userId": user.id,
        })),
    ))
}

pub async fn verify_handler(
    State(app_state): State<AppState>,
    Json(payload): Json<VerifyRequest>,
) -> Result<Json<Value>, AppError> {
    settle(
        app_state
            .accounts
            .verify(&payload.email, &payload.otp)
            .await?,
        "verify",
    );
    Ok(Json(json!({
        "success": true,
        "message": "Email verified successfully",
    })))
}

pub async fn login_handler(
    State(app_state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<Value>, AppError> {
    let user = app_state
        .accounts
        .login(&payload.email, &payload.password)
        .await?;
    let token = issue_token(&user.id, app_state.jwt_secret())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to sign session token: {e}")))?;
    info!(user_id = %user.id, "Login succeeded.");
    Ok(Json(json!({
        "success": true,
        "token": token,
        "user": {
            "id": user.id,
            "username": user.username,
            "email": user.email,
        },
    })))
}

pub async fn forgot_password_handler(
    State(app_state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<Value>, AppError> {
    settle(
        app_state.accounts.forgot_password(&payload.email).await?,
        "forgot-password",
    );
    Ok(Json(json!({
        "success": true,
        "message": "Password reset OTP sent to email",
    })))
}

pub async fn reset_password_handler(
    State(app_state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<Value>, AppError> {
    settle(
        app_state
            .accounts
            .reset_password(&payload.email, &payload.otp, &payload.new_password)
            .await?,
        "reset-password",
    );
    Ok(Json(json!({
        "success": true,
        "message": "Password reset successfully",
    })))
}
