//! Persistent storage layer
//!
//! SQLite-backed stores for users and personas. The schema is created at
//! startup; ids are UUIDv4 strings and timestamps are RFC 3339 UTC strings.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::error::Result;

pub mod personas;
pub mod users;

pub use personas::{Persona, PersonaStore};
pub use users::{Role, User, UserStore};

/// Open a connection pool for the given connection string and ensure the
/// schema exists.
pub async fn connect(url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    init_schema(&pool).await?;
    Ok(pool)
}

/// Create tables if they do not exist.
///
/// `personas.user_id` carries a UNIQUE constraint: the one-persona-per-owner
/// invariant is enforced by storage, so concurrent first uploads collapse
/// into an upsert instead of duplicating rows.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id            TEXT PRIMARY KEY,
            username      TEXT NOT NULL UNIQUE,
            email         TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            role          TEXT NOT NULL DEFAULT 'user',
            created_at    TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS personas (
            id           TEXT PRIMARY KEY,
            user_id      TEXT NOT NULL UNIQUE REFERENCES users(id),
            instructions TEXT NOT NULL,
            created_at   TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    init_schema(&pool).await.unwrap();
    pool
}
