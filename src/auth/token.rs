//! Signed session tokens
//!
//! Self-contained HS256 claims `{sub, role, iat, exp}` with a fixed validity
//! window. No server-side session table: possession of a token with a valid
//! signature and unexpired window is the whole claim. The signing secret is
//! process-wide configuration loaded once at startup.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::store::{Role, User};

/// Claims carried inside an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id
    pub sub: String,
    /// Role at issuance time
    pub role: Role,
    /// Issued-at, seconds since epoch
    pub iat: i64,
    /// Expiry, seconds since epoch
    pub exp: i64,
}

/// Token signing and verification keys derived from the server secret.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenKeys {
    pub fn new(secret: &str, ttl_minutes: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::minutes(ttl_minutes),
        }
    }

    /// Issue a token for a user.
    pub fn issue(&self, user: &User) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.clone(),
            role: user.role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| Error::Internal(format!("Token encoding failed: {}", e)))
    }

    /// Verify a token's signature and expiry, returning its claims.
    ///
    /// An expired-but-otherwise-valid token fails with `TokenExpired`; any
    /// tampering or structural problem fails with `InvalidToken`. Both map
    /// to the same unauthorized signal at the HTTP boundary.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let validation = Validation::new(Algorithm::HS256);

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => Error::TokenExpired,
                _ => Error::InvalidToken,
            })
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user() -> User {
        User {
            id: "u-1".to_string(),
            username: "alice".to_string(),
            email: "alice@x.com".to_string(),
            password_hash: String::new(),
            role: Role::User,
            created_at: Utc::now().to_rfc3339(),
        }
    }

    #[test]
    fn test_issue_verify_roundtrip() {
        let keys = TokenKeys::new("secret", 1440);
        let token = keys.issue(&test_user()).unwrap();

        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.sub, "u-1");
        assert_eq!(claims.role, Role::User);
        assert!(claims.exp > claims.iat);
        assert_eq!(claims.exp - claims.iat, 1440 * 60);
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let keys = TokenKeys::new("secret", 1440);
        let other = TokenKeys::new("other-secret", 1440);

        let token = keys.issue(&test_user()).unwrap();
        assert!(matches!(
            other.verify(&token).unwrap_err(),
            Error::InvalidToken
        ));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let keys = TokenKeys::new("secret", 1440);
        assert!(matches!(
            keys.verify("not.a.token").unwrap_err(),
            Error::InvalidToken
        ));
    }

    #[test]
    fn test_tampered_payload_is_invalid() {
        let keys = TokenKeys::new("secret", 1440);
        let token = keys.issue(&test_user()).unwrap();

        // Flip a character in the payload segment
        let mut parts: Vec<String> = token.split('.').map(String::from).collect();
        let mut payload: Vec<u8> = parts[1].clone().into_bytes();
        payload[0] = if payload[0] == b'A' { b'B' } else { b'A' };
        parts[1] = String::from_utf8(payload).unwrap();
        let tampered = parts.join(".");

        assert!(matches!(
            keys.verify(&tampered).unwrap_err(),
            Error::InvalidToken
        ));
    }

    #[test]
    fn test_expired_token() {
        // Negative TTL pushes expiry beyond the validation leeway
        let keys = TokenKeys::new("secret", -5);
        let token = keys.issue(&test_user()).unwrap();

        assert!(matches!(
            keys.verify(&token).unwrap_err(),
            Error::TokenExpired
        ));
    }
}
