//! Persona rows and the persona store
//!
//! At most one persona per owner, backed by a UNIQUE constraint on
//! `user_id`. Instructions are capped at a fixed character count; the cap is
//! applied on append here and on ingest by the caller.

use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::error::{Error, Result};

/// A persona row: the stored free-text instructions used to role-play a
/// user-specific character.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Persona {
    pub id: String,
    pub user_id: String,
    pub instructions: String,
    pub created_at: String,
}

/// Store for persona documents, one per owner.
#[derive(Clone)]
pub struct PersonaStore {
    pool: SqlitePool,
    max_chars: usize,
}

impl PersonaStore {
    pub fn new(pool: SqlitePool, max_chars: usize) -> Self {
        Self { pool, max_chars }
    }

    /// Hard cap on stored instructions, in characters.
    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    pub async fn get(&self, owner: &str) -> Result<Option<Persona>> {
        let persona = sqlx::query_as::<_, Persona>("SELECT * FROM personas WHERE user_id = ?")
            .bind(owner)
            .fetch_optional(&self.pool)
            .await?;
        Ok(persona)
    }

    /// Replace the owner's persona instructions wholesale, creating the row
    /// if absent. Truncation is the caller's responsibility; `text` must
    /// already fit the cap.
    pub async fn upsert_full(&self, owner: &str, text: &str) -> Result<()> {
        debug_assert!(text.chars().count() <= self.max_chars);

        sqlx::query(
            r#"
            INSERT INTO personas (id, user_id, instructions, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET instructions = excluded.instructions
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(owner)
        .bind(text)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Append `addition` to the owner's instructions with a newline join,
    /// keeping only the most recent `max_chars` characters.
    ///
    /// Fails with `NoPersona` when the owner has no persona; appends never
    /// create one.
    pub async fn append_and_cap(&self, owner: &str, addition: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let current: Option<(String,)> =
            sqlx::query_as("SELECT instructions FROM personas WHERE user_id = ?")
                .bind(owner)
                .fetch_optional(&mut *tx)
                .await?;

        let instructions = current.ok_or(Error::NoPersona)?.0;
        let joined = format!("{}\n{}", instructions, addition);
        let capped = suffix_chars(joined.trim(), self.max_chars);

        sqlx::query("UPDATE personas SET instructions = ? WHERE user_id = ?")
            .bind(capped)
            .bind(owner)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

/// Keep the last `n` characters of `s`, respecting char boundaries.
fn suffix_chars(s: &str, n: usize) -> &str {
    let count = s.chars().count();
    if count <= n {
        return s;
    }
    let skip = count - n;
    match s.char_indices().nth(skip) {
        Some((idx, _)) => &s[idx..],
        None => "",
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
