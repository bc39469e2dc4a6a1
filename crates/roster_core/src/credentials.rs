//! Password digest utility used by member provisioning.
//!
//! # Responsibility
//! - Produce salted Argon2 digests in PHC string form.
//! - Verify secrets against stored digests.
//!
//! # Invariants
//! - `verify_secret(s, &hash_secret(s)?)` is `true` for every `s`.
//! - Malformed stored digests verify as `false`, never panic.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Hashing failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    Hash(String),
}

impl Display for CredentialError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hash(message) => write!(f, "password hashing failed: {message}"),
        }
    }
}

impl Error for CredentialError {}

/// PHC-format password digest (`$argon2id$v=19$...`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordDigest(String);

impl PasswordDigest {
    /// Wraps a digest loaded from storage without validating it.
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Hashes `secret` with a fresh random salt.
pub fn hash_secret(secret: &str) -> Result<PasswordDigest, CredentialError> {
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())
        .map_err(|err| CredentialError::Hash(err.to_string()))?;
    let hash = Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|err| CredentialError::Hash(err.to_string()))?;
    Ok(PasswordDigest(hash.to_string()))
}

/// Whether a stored value is a crypt-style digest (`$<scheme>$...`) rather
/// than a legacy plaintext secret. Covers PHC strings and bcrypt/sha-crypt.
pub fn is_stored_digest(stored: &str) -> bool {
    stored.starts_with('$') || PasswordHash::new(stored).is_ok()
}

/// Checks `secret` against a stored digest.
pub fn verify_secret(secret: &str, digest: &PasswordDigest) -> bool {
    match PasswordHash::new(digest.as_str()) {
        Ok(parsed) => Argon2::default()
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}
