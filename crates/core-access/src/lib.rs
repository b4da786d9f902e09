//! # Core Access Crate
//!
//! This crate is the central authority for account identity: signup, email verification,
//! login and password reset. It owns the account state machine
//!
//! ```text
//! unverified --(valid OTP)--> verified --(forgot password)--> reset pending --(valid token)--> verified
//! ```
//!
//! and writes every state change to the Durable Store first (aborting if that fails) and
//! to the Embedded Store afterwards on a best-effort basis. Session tokens are the
//! caller's concern.

pub mod notify;
pub mod password;

pub use axiant::constants::GUEST_OWNER_ID as GUEST_USER_IDENTIFIER;
pub use notify::{LogNotifier, OtpNotifier};
pub use password::{generate_code, Argon2Hasher, PasswordHasher};

use axiant::{
    constants::CODE_TTL_MINUTES,
    providers::db::{durable::DurablePool, sqlite::EmbeddedStore},
    types::StoreTarget,
    CacheError, Outcome, SideWrite, User,
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AccountError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Email already exists: {0}")]
    Conflict(String),
    #[error("User not found: {0}")]
    NotFound(String),
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Email not verified. Please verify your account.")]
    NotVerified,
    #[error("User already verified")]
    AlreadyVerified,
    #[error("Invalid or expired code: {0}")]
    InvalidCode(String),
    #[error("Account store unreachable: {0}")]
    Connectivity(String),
    #[error("Account store error: {0}")]
    Storage(String),
    #[error("Password hashing failed: {0}")]
    Hashing(String),
}

impl From<CacheError> for AccountError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Connectivity(msg) => AccountError::Connectivity(msg),
            CacheError::Validation(msg) => AccountError::Validation(msg),
            CacheError::Conflict(msg) => AccountError::Conflict(msg),
            other => AccountError::Storage(other.to_string()),
        }
    }
}

/// The result of checking an email and password pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum CredentialCheck {
    Ok { user_id: String },
    /// The password matched but the account has not been verified yet.
    NotVerified,
    /// Unknown email or wrong password.
    Invalid,
}

#[derive(Debug, Clone, Copy)]
enum CodeKind {
    Verification,
    PasswordReset,
}

/// Drives the account state machine over both stores.
#[derive(Debug, Clone)]
pub struct AccountService {
    embedded: EmbeddedStore,
    durable: DurablePool,
    hasher: Arc<dyn PasswordHasher>,
    notifier: Arc<dyn OtpNotifier>,
    code_ttl: Duration,
}

impl AccountService {
    /// Uses Argon2id digests and logs codes instead of sending them.
    pub fn new(embedded: EmbeddedStore, durable: DurablePool) -> Self {
        Self {
            embedded,
            durable,
            hasher: Arc::new(Argon2Hasher),
            notifier: Arc::new(LogNotifier),
            code_ttl: Duration::minutes(CODE_TTL_MINUTES),
        }
    }

    pub fn with_hasher(mut self, hasher: Arc<dyn PasswordHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn OtpNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_code_ttl(mut self, ttl: Duration) -> Self {
        self.code_ttl = ttl;
        self
    }

    /// Creates an unverified account and issues its verification code.
    pub async fn signup(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<Outcome<User>, AccountError> {
        let username = username.trim();
        let email = email.trim();
        if username.is_empty() {
            return Err(AccountError::Validation("Username is required".to_string()));
        }
        if !email.contains('@') {
            return Err(AccountError::Validation("A valid email is required".to_string()));
        }
        if password.is_empty() {
            return Err(AccountError::Validation("Password is required".to_string()));
        }

        // Uniqueness is decided by the Durable Store; signup needs it reachable.
        let handle = self.durable.get().await?;
        if handle.records().find_user_by_email(email).await?.is_some() {
            return Err(AccountError::Conflict(email.to_string()));
        }

        let code = generate_code();
        let user = User {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            email: email.to_string(),
            password_digest: self.hasher.hash(password)?,
            is_verified: false,
            otp: Some(code.clone()),
            otp_expires_at: Some(self.expiry()),
            reset_token: None,
            reset_token_expires_at: None,
            created_at: Utc::now(),
        };
        let outcome = self.persist(user).await?;
        info!(user_id = %outcome.value.id, email = %email, "Account created; awaiting verification.");
        self.deliver(CodeKind::Verification, &outcome.value, &code)
            .await;
        Ok(outcome)
    }

    /// Verifies an account with the code sent at signup.
    ///
    /// A wrong or expired code leaves the account unverified.
    pub async fn verify(&self, email: &str, otp: &str) -> Result<Outcome<User>, AccountError> {
        let mut user = self.require_user(email).await?;
        if user.is_verified {
            return Err(AccountError::AlreadyVerified);
        }
        if !code_matches(user.otp.as_deref(), user.otp_expires_at, otp) {
            return Err(AccountError::InvalidCode("Invalid or expired OTP".to_string()));
        }
        user.is_verified = true;
        user.otp = None;
        user.otp_expires_at = None;
        let outcome = self.persist(user).await?;
        info!(user_id = %outcome.value.id, "Account verified.");
        Ok(outcome)
    }

    /// Checks a password without changing any state.
    ///
    /// The password is checked before the verification state, so a wrong password on an
    /// unverified account is still `Invalid`.
    pub async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<CredentialCheck, AccountError> {
        let Some(user) = self.find_user(email).await? else {
            return Ok(CredentialCheck::Invalid);
        };
        let matches = self
            .hasher
            .verify(password, &user.password_digest)
            .unwrap_or_else(|e| {
                warn!(user_id = %user.id, error = %e, "Stored password digest is unreadable.");
                false
            });
        if !matches {
            return Ok(CredentialCheck::Invalid);
        }
        if !user.is_verified {
            return Ok(CredentialCheck::NotVerified);
        }
        Ok(CredentialCheck::Ok { user_id: user.id })
    }

    /// Returns the account for a valid, verified login.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AccountError> {
        match self.verify_credentials(email, password).await? {
            CredentialCheck::Ok { .. } => self.require_user(email).await,
            CredentialCheck::NotVerified => {
                info!(email = %email.trim(), "Login refused: account not verified.");
                Err(AccountError::NotVerified)
            }
            CredentialCheck::Invalid => {
                info!(email = %email.trim(), "Login refused: invalid credentials.");
                Err(AccountError::InvalidCredentials)
            }
        }
    }

    /// Issues a password-reset code.
    pub async fn forgot_password(&self, email: &str) -> Result<Outcome<()>, AccountError> {
        let mut user = self.require_user(email).await?;
        let code = generate_code();
        user.reset_token = Some(code.clone());
        user.reset_token_expires_at = Some(self.expiry());
        let outcome = self.persist(user).await?;
        self.deliver(CodeKind::PasswordReset, &outcome.value, &code)
            .await;
        Ok(outcome.map(|_| ()))
    }

    /// Sets a new password when `token` matches the pending reset code.
    pub async fn reset_password(
        &self,
        email: &str,
        token: &str,
        new_password: &str,
    ) -> Result<Outcome<()>, AccountError> {
        if new_password.is_empty() {
            return Err(AccountError::Validation("New password is required".to_string()));
        }
        let mut user = self.require_user(email).await?;
        if !code_matches(user.reset_token.as_deref(), user.reset_token_expires_at, token) {
            return Err(AccountError::InvalidCode("Invalid or expired reset token".to_string()));
        }
        user.password_digest = self.hasher.hash(new_password)?;
        user.reset_token = None;
        user.reset_token_expires_at = None;
        let outcome = self.persist(user).await?;
        info!(user_id = %outcome.value.id, "Password reset.");
        Ok(outcome.map(|_| ()))
    }

    /// Reads an account, from the Durable Store when reachable, else the Embedded Store.
    pub async fn find_user(&self, email: &str) -> Result<Option<User>, AccountError> {
        let email = email.trim();
        let remote = match self.durable.get().await {
            Ok(handle) => handle.records().find_user_by_email(email).await,
            Err(e) => Err(e),
        };
        match remote {
            Ok(user) => Ok(user),
            Err(e) if e.is_connectivity() => {
                warn!(component = "durable", error = %e, "Account lookup falls back to embedded store.");
                Ok(self.embedded.find_user_by_email(email).await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Reads an account by id with the same fallback as [`AccountService::find_user`].
    pub async fn find_user_by_id(&self, id: &str) -> Result<Option<User>, AccountError> {
        let remote = match self.durable.get().await {
            Ok(handle) => handle.records().find_user_by_id(id).await,
            Err(e) => Err(e),
        };
        match remote {
            Ok(user) => Ok(user),
            Err(e) if e.is_connectivity() => {
                warn!(component = "durable", error = %e, "Account lookup falls back to embedded store.");
                Ok(self.embedded.find_user_by_id(id).await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn require_user(&self, email: &str) -> Result<User, AccountError> {
        self.find_user(email)
            .await?
            .ok_or_else(|| AccountError::NotFound(email.trim().to_string()))
    }

    /// Durable Store first, aborting on failure; then the Embedded Store, best effort.
    async fn persist(&self, user: User) -> Result<Outcome<User>, AccountError> {
        let handle = self.durable.get().await?;
        handle.records().upsert_user(&user).await?;
        let side_write = match self.embedded.upsert_user(&user).await {
            Ok(()) => SideWrite::Applied {
                target: StoreTarget::Embedded,
            },
            Err(e) => {
                warn!(component = "embedded", user_id = %user.id, error = %e, "Local account copy failed.");
                SideWrite::Failed {
                    target: StoreTarget::Embedded,
                    error: e.to_string(),
                }
            }
        };
        Ok(Outcome::new(user).with_side_write(side_write))
    }

    async fn deliver(&self, kind: CodeKind, user: &User, code: &str) {
        let result = match kind {
            CodeKind::Verification => self.notifier.send_verification(user, code).await,
            CodeKind::PasswordReset => self.notifier.send_password_reset(user, code).await,
        };
        if let Err(e) = result {
            warn!(component = "notifier", user_id = %user.id, error = %e, "Failed to deliver code.");
        }
    }

    fn expiry(&self) -> DateTime<Utc> {
        Utc::now() + self.code_ttl
    }
}

fn code_matches(expected: Option<&str>, expires_at: Option<DateTime<Utc>>, presented: &str) -> bool {
    let Some(expected) = expected else {
        return false;
    };
    let unexpired = expires_at.is_none_or(|at| at > Utc::now());
    !presented.is_empty() && expected == presented.trim() && unexpired
}
