//! User rows and the credential store
//!
//! Registration computes a salted one-way password hash before insert; the
//! plaintext never touches storage or logs. Verification collapses
//! unknown-username and wrong-password into one `InvalidCredentials` signal.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::info;
use uuid::Uuid;

use crate::auth::password;
use crate::error::{Error, Result};

// ─────────────────────────────────────────────────────────────────
// Role
// ─────────────────────────────────────────────────────────────────

/// Access role of a user. Never settable through any exposed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("Unknown role '{}'. Valid: user, admin", s)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// User
// ─────────────────────────────────────────────────────────────────

/// A user row. Immutable after registration.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: String,
}

// ─────────────────────────────────────────────────────────────────
// UserStore
// ─────────────────────────────────────────────────────────────────

/// Credential store: user CRUD plus register/verify.
#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register a new user with the default `user` role.
    ///
    /// Fails with `UsernameTaken` when the username already exists. The
    /// UNIQUE constraints on username and email back the check, so a racing
    /// duplicate insert surfaces the same error instead of a raw database
    /// failure.
    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<User> {
        if self.find_by_username(username).await?.is_some() {
            return Err(Error::UsernameTaken);
        }

        let password_hash = password::hash(password).await?;
        let user = User {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash,
            role: Role::User,
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        let inserted = sqlx::query(
            r#"
            INSERT INTO users (id, username, email, password_hash, role, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role)
        .bind(&user.created_at)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => {
                info!(user_id = %user.id, username = %user.username, "User registered");
                Ok(user)
            }
            Err(e) if is_unique_violation(&e) => Err(Error::UsernameTaken),
            Err(e) => Err(e.into()),
        }
    }

    /// Verify a username/password pair.
    ///
    /// Both unknown username and wrong password fail with the same
    /// `InvalidCredentials` error, preventing username enumeration through
    /// the error message.
    pub async fn verify(&self, username: &str, password_text: &str) -> Result<User> {
        let user = self
            .find_by_username(username)
            .await?
            .ok_or(Error::InvalidCredentials)?;

        if !password::verify(password_text, &user.password_hash).await? {
            return Err(Error::InvalidCredentials);
        }

        Ok(user)
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.message().contains("UNIQUE constraint failed"))
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
