//! Configuration system for the persona server
//!
//! Supports multiple configuration sources with the following precedence
//! (highest to lowest):
//! 1. Environment variables (PERSONA_* prefix, plus the conventional
//!    DATABASE_URL / SECRET_KEY / OPENAI_API_KEY names)
//! 2. Configuration file (TOML)
//! 3. Default values
//!
//! The signing secret, the database connection string, and the provider API
//! key are required; the process refuses to start without them.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP server settings
    pub server: ServerSettings,

    /// Persistent store settings
    pub database: DatabaseSettings,

    /// Token issuance settings
    pub auth: AuthSettings,

    /// Model provider settings
    pub provider: ProviderSettings,

    /// Persona ingestion caps
    pub ingest: IngestSettings,

    /// Per-identity rate limits
    pub limits: LimitSettings,

    /// Logging configuration
    pub logging: LoggingSettings,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Socket address to bind (e.g. "127.0.0.1:8080")
    pub bind: String,
}

/// Persistent store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Connection string (e.g. "sqlite://persona.db")
    pub url: String,
}

/// Token issuance settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Server-held signing secret for access tokens. Required.
    pub secret_key: String,

    /// Token validity window in minutes
    pub token_ttl_minutes: i64,
}

/// Model provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// API base URL (e.g. "https://api.openai.com/v1")
    pub base_url: String,

    /// API key. Required.
    pub api_key: String,

    /// Model identifier
    pub model: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Sampling temperature
    pub temperature: f32,

    /// Completion token cap
    pub max_tokens: u32,
}

/// Persona ingestion caps
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    /// Hard cap on stored persona instructions, in characters
    pub max_persona_chars: usize,

    /// Maximum accepted upload size, in bytes
    pub max_pdf_bytes: usize,
}

/// Per-identity rate limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitSettings {
    /// Persona uploads allowed per minute per identity
    pub upload_per_minute: u32,

    /// Questions allowed per minute per identity
    pub ask_per_minute: u32,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

// Default implementations

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            database: DatabaseSettings::default(),
            auth: AuthSettings::default(),
            provider: ProviderSettings::default(),
            ingest: IngestSettings::default(),
            limits: LimitSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self { url: String::new() }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            token_ttl_minutes: 1440,
        }
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 60,
            temperature: 0.4,
            max_tokens: 250,
        }
    }
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            max_persona_chars: 30_000,
            max_pdf_bytes: 5 * 1024 * 1024,
        }
    }
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            upload_per_minute: 5,
            ask_per_minute: 30,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_files: 5,
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        // 1. Load from config file if it exists
        if let Some(path) = Self::find_config_file(config_path)? {
            debug!(path = %path.display(), "Loading configuration file");
            let content = fs::read_to_string(&path)
                .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;
            config = toml::from_str(&content)
                .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        // 2. Apply environment variable overrides
        config.apply_env_overrides();

        // 3. Validate
        config.validate()?;

        Ok(config)
    }

    /// Find the configuration file to use
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        // If explicit path provided, use it (error if not found)
        if let Some(path) = explicit_path {
            let expanded = shellexpand::tilde(path);
            let path = PathBuf::from(expanded.as_ref());
            if path.exists() {
                return Ok(Some(path));
            } else {
                return Err(Error::Config(format!(
                    "Configuration file not found: {}",
                    path.display()
                )));
            }
        }

        // Search in standard locations
        let search_paths = [
            PathBuf::from("persona-server.toml"),
            PathBuf::from("config.toml"),
            dirs::config_dir()
                .map(|p| p.join("persona-server").join("server.toml"))
                .unwrap_or_default(),
            PathBuf::from("/etc/persona-server/server.toml"),
        ];

        for path in &search_paths {
            if path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path.clone()));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("PERSONA_BIND") {
            self.server.bind = val;
        }

        // Conventional names first, prefixed names win if both are set
        if let Ok(val) = std::env::var("DATABASE_URL") {
            self.database.url = val;
        }
        if let Ok(val) = std::env::var("PERSONA_DATABASE_URL") {
            self.database.url = val;
        }

        if let Ok(val) = std::env::var("SECRET_KEY") {
            self.auth.secret_key = val;
        }
        if let Ok(val) = std::env::var("PERSONA_SECRET_KEY") {
            self.auth.secret_key = val;
        }
        if let Ok(val) = std::env::var("PERSONA_TOKEN_TTL_MINUTES") {
            if let Ok(n) = val.parse() {
                self.auth.token_ttl_minutes = n;
            }
        }

        if let Ok(val) = std::env::var("OPENAI_API_KEY") {
            self.provider.api_key = val;
        }
        if let Ok(val) = std::env::var("PERSONA_PROVIDER_API_KEY") {
            self.provider.api_key = val;
        }
        if let Ok(val) = std::env::var("PERSONA_PROVIDER_BASE_URL") {
            self.provider.base_url = val;
        }
        if let Ok(val) = std::env::var("PERSONA_PROVIDER_MODEL") {
            self.provider.model = val;
        }
        if let Ok(val) = std::env::var("PERSONA_PROVIDER_TIMEOUT_SECS") {
            if let Ok(n) = val.parse() {
                self.provider.timeout_secs = n;
            }
        }

        if let Ok(val) = std::env::var("PERSONA_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("PERSONA_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("PERSONA_LOG_JSON") {
            self.logging.json_format = val.to_lowercase() == "true" || val == "1";
        }
    }

    /// Validate the configuration.
    ///
    /// The required process-wide secrets are checked here so the server
    /// refuses to start rather than run insecurely.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.database.url.is_empty() {
            missing.push("DATABASE_URL");
        }
        if self.auth.secret_key.is_empty() {
            missing.push("SECRET_KEY");
        }
        if self.provider.api_key.is_empty() {
            missing.push("OPENAI_API_KEY");
        }
        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "Missing required configuration: {}",
                missing.join(", ")
            )));
        }

        if self.server.bind.parse::<std::net::SocketAddr>().is_err() {
            return Err(Error::Config(format!(
                "Invalid bind address '{}'",
                self.server.bind
            )));
        }

        if self.auth.token_ttl_minutes <= 0 {
            return Err(Error::Config(
                "token_ttl_minutes must be positive".to_string(),
            ));
        }

        if self.ingest.max_persona_chars == 0 || self.ingest.max_pdf_bytes == 0 {
            return Err(Error::Config(
                "ingest caps must be non-zero".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        Ok(())
    }
}

/// Initialize a new configuration file with defaults
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path
        .map(|p| PathBuf::from(shellexpand::tilde(p).into_owned()))
        .unwrap_or_else(|| PathBuf::from("persona-server.toml"));

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Configuration file already exists: {} (use --force to overwrite)",
            config_path.display()
        )));
    }

    if let Some(parent) = config_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let config = AppConfig::default();
    let content = toml::to_string_pretty(&config)?;
    fs::write(&config_path, content)?;

    Ok(config_path)
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
