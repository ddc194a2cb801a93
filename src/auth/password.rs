//! Salted one-way password hashing
//!
//! Argon2id with a per-password random salt. Hashing is CPU-heavy, so both
//! operations run on the blocking thread pool to keep request handling
//! responsive under concurrent logins.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use crate::error::{Error, Result};

/// Hash a plaintext password for storage.
pub async fn hash(password: &str) -> Result<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| Error::PasswordHash(e.to_string()))
    })
    .await
    .map_err(|e| Error::Internal(format!("Hashing task failed: {}", e)))?
}

/// Verify a plaintext password against a stored hash.
///
/// Returns `Ok(false)` for a mismatch; only a malformed stored hash is an
/// error.
pub async fn verify(password: &str, stored_hash: &str) -> Result<bool> {
    let password = password.to_string();
    let stored_hash = stored_hash.to_string();
    tokio::task::spawn_blocking(move || {
        let parsed =
            PasswordHash::new(&stored_hash).map_err(|e| Error::PasswordHash(e.to_string()))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    })
    .await
    .map_err(|e| Error::Internal(format!("Hashing task failed: {}", e)))?
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_is_salted_and_one_way() {
        let first = hash("pw123").await.unwrap();
        let second = hash("pw123").await.unwrap();

        // Random salts produce distinct hashes for the same input
        assert_ne!(first, second);
        assert!(!first.contains("pw123"));
    }

    #[tokio::test]
    async fn test_verify_right_and_wrong() {
        let stored = hash("right").await.unwrap();

        assert!(verify("right", &stored).await.unwrap());
        assert!(!verify("wrong", &stored).await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_rejects_malformed_hash() {
        assert!(verify("pw", "not-a-hash").await.is_err());
    }
}
