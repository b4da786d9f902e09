//! Password digests and one-time codes.
//!
//! Digests are Argon2id PHC strings, the format already stored for existing accounts.

use crate::AccountError;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Argon2,
};
use rand::Rng;
use std::fmt::Debug;

/// Turns plain passwords into digests and checks them.
pub trait PasswordHasher: Send + Sync + Debug {
    fn hash(&self, plain: &str) -> Result<String, AccountError>;

    /// `Ok(false)` for a wrong password; `Err` only for an unreadable digest.
    fn verify(&self, plain: &str, digest: &str) -> Result<bool, AccountError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2Hasher;

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, plain: &str) -> Result<String, AccountError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(plain.as_bytes(), &salt)
            .map(|digest| digest.to_string())
            .map_err(|e| AccountError::Hashing(e.to_string()))
    }

    fn verify(&self, plain: &str, digest: &str) -> Result<bool, AccountError> {
        let parsed = PasswordHash::new(digest).map_err(|e| AccountError::Hashing(e.to_string()))?;
        Ok(Argon2::default()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok())
    }
}

/// A 6-digit numeric code in `100000..=999999`.
pub fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}
