//! Error types for the persona server
//!
//! A single central error enum covers every failure the server can surface.
//! Classification helpers decide what a client is allowed to see
//! (`public_message`) and whether a startup error should abort the process.

use thiserror::Error;

/// Result type alias for server operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the server
#[derive(Error, Debug)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Configuration / startup errors
    // ─────────────────────────────────────────────────────────────

    /// Configuration error (missing secret, bad file, invalid value)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    // ─────────────────────────────────────────────────────────────
    // Authentication / authorization
    // ─────────────────────────────────────────────────────────────

    /// Registration with a username that already exists
    #[error("Username taken")]
    UsernameTaken,

    /// Unknown username or wrong password. Deliberately a single variant so
    /// the two causes cannot be told apart by the caller.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Token is structurally invalid, tampered with, or its subject no
    /// longer resolves to a user
    #[error("Invalid token")]
    InvalidToken,

    /// Token was valid once but its validity window has passed
    #[error("Token expired")]
    TokenExpired,

    /// Authenticated but lacking the required role
    #[error("Admin access required")]
    Forbidden,

    /// Password hashing failed
    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    // ─────────────────────────────────────────────────────────────
    // Persona ingestion
    // ─────────────────────────────────────────────────────────────

    /// Uploaded document is not a PDF
    #[error("PDF only allowed")]
    UnsupportedMediaType,

    /// Uploaded document exceeds the size cap
    #[error("File too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Document parsed but yielded no text
    #[error("Could not extract text from PDF")]
    NoExtractableText,

    // ─────────────────────────────────────────────────────────────
    // Dialogue
    // ─────────────────────────────────────────────────────────────

    /// The caller has never uploaded a persona
    #[error("No persona found")]
    NoPersona,

    /// Transport-level or provider-side failure of the model call,
    /// including timeouts
    #[error("Provider call failed: {0}")]
    Provider(String),

    /// Provider replied, but no JSON object could be recovered from the text
    #[error("Provider response format error: {0}")]
    ResponseFormat(String),

    /// Provider returned a well-formed object with an empty answer
    #[error("Provider returned empty answer")]
    EmptyAnswer,

    // ─────────────────────────────────────────────────────────────
    // Admission control / storage / internal
    // ─────────────────────────────────────────────────────────────

    /// Request rejected by the rate limiter
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Database failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Short, non-leaking message safe to return to a client.
    ///
    /// Storage, hashing, and internal failures are collapsed to a generic
    /// message; provider raw output and persona text never appear here.
    pub fn public_message(&self) -> String {
        match self {
            Error::UsernameTaken => "Username taken".to_string(),
            Error::InvalidCredentials => "Invalid credentials".to_string(),
            Error::InvalidToken => "Invalid token".to_string(),
            Error::TokenExpired => "Token expired".to_string(),
            Error::Forbidden => "Admin access required".to_string(),
            Error::UnsupportedMediaType => "PDF only allowed".to_string(),
            Error::PayloadTooLarge { max, .. } => {
                format!("File too large (max {}MB)", max / (1024 * 1024))
            }
            Error::NoExtractableText => "Could not extract text from PDF".to_string(),
            Error::NoPersona => "No persona found".to_string(),
            Error::Provider(_) => "LLM provider error".to_string(),
            Error::ResponseFormat(_) => "LLM response format error".to_string(),
            Error::EmptyAnswer => "LLM returned empty answer".to_string(),
            Error::RateLimited => "Rate limit exceeded. Try again later.".to_string(),
            _ => "Internal server error".to_string(),
        }
    }

    /// Whether this error should abort startup rather than be served
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_) | Error::Io(_) | Error::Toml(_))
    }

    /// Format the error for terminal display (startup failures)
    pub fn format_for_terminal(&self) -> String {
        format!("\x1b[31mError\x1b[0m: {}\n", self)
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
