//! Data layer configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `ATELIER_DATABASE_URL` - `PostgreSQL` connection string (only when
//!   `ATELIER_STORE=postgres`; falls back to `DATABASE_URL`)
//!
//! ## Optional
//! - `ATELIER_STORE` - `memory` or `postgres` (default: memory)
//! - `ATELIER_DB_MAX_CONNECTIONS` - Pool size (default: 10)
//! - `ATELIER_ENV` - Deployment environment (default: development)
//! - `ATELIER_DEV_OWNER` - Owner identity signed in at startup, bypassing
//!   authentication. Refused in production.
//! - `ATELIER_LOG_FORMAT` - `text` or `json` (default: text)

use core::fmt;
use std::str::FromStr;

use secrecy::SecretString;
use thiserror::Error;

use atelier_core::OwnerId;

/// Default pool size.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

const PRODUCTION: &str = "production";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Which document store backend to run against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StoreBackend {
    /// In-process store; state is lost on exit.
    #[default]
    Memory,
    /// `PostgreSQL` JSONB table with `LISTEN/NOTIFY`.
    Postgres,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(format!("unknown store backend: {other}")),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Data layer configuration.
///
/// Implements `Debug` manually to redact the database URL.
#[derive(Clone)]
pub struct DataConfig {
    /// Store backend
    pub store: StoreBackend,
    /// `PostgreSQL` connection URL (contains password)
    pub database_url: Option<SecretString>,
    /// Pool size for the postgres backend
    pub max_connections: u32,
    /// Deployment environment name
    pub environment: String,
    /// Owner signed in at startup without authentication
    pub dev_owner: Option<OwnerId>,
    /// Log output format
    pub log_format: LogFormat,
}

impl fmt::Debug for DataConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataConfig")
            .field("store", &self.store)
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("max_connections", &self.max_connections)
            .field("environment", &self.environment)
            .field("dev_owner", &self.dev_owner)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl DataConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let store = parse_var(&env, "ATELIER_STORE", StoreBackend::default())?;
        let database_url = match store {
            StoreBackend::Postgres => Some(env.get_database_url("ATELIER_DATABASE_URL")?),
            StoreBackend::Memory => env.get_optional_database_url("ATELIER_DATABASE_URL"),
        };
        let max_connections = env
            .get_env_or_default("ATELIER_DB_MAX_CONNECTIONS", "10")
            .parse::<u32>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("ATELIER_DB_MAX_CONNECTIONS".to_string(), e.to_string())
            })?;
        if max_connections == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "ATELIER_DB_MAX_CONNECTIONS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let environment = env.get_env_or_default("ATELIER_ENV", "development");
        let log_format = parse_var(&env, "ATELIER_LOG_FORMAT", LogFormat::default())?;

        let dev_owner = env
            .get_optional_env("ATELIER_DEV_OWNER")
            .map(|raw| {
                OwnerId::parse(&raw).map_err(|e| {
                    ConfigError::InvalidEnvVar("ATELIER_DEV_OWNER".to_string(), e.to_string())
                })
            })
            .transpose()?;
        if dev_owner.is_some() && environment == PRODUCTION {
            return Err(ConfigError::InvalidEnvVar(
                "ATELIER_DEV_OWNER".to_string(),
                "authentication bypass is not allowed in production".to_string(),
            ));
        }

        Ok(Self {
            store,
            database_url,
            max_connections,
            environment,
            dev_owner,
            log_format,
        })
    }

    /// In-memory store, development environment, nobody signed in.
    #[must_use]
    pub fn development() -> Self {
        Self {
            store: StoreBackend::Memory,
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            environment: "development".to_string(),
            dev_owner: None,
            log_format: LogFormat::Text,
        }
    }

    /// Whether this is a production deployment.
    #[must_use]
    pub fn is_production(&self) -> bool {
        self.environment == PRODUCTION
    }
}

// =============================================================================
// Helper functions
// =============================================================================

struct Env<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Env<'_> {
    /// Get a required environment variable.
    fn get_required_env(&self, key: &str) -> Result<String, ConfigError> {
        (self.0)(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    /// Get an optional environment variable. Blank values count as unset.
    fn get_optional_env(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    /// Get an environment variable with a default value.
    fn get_env_or_default(&self, key: &str, default: &str) -> String {
        self.get_optional_env(key)
            .unwrap_or_else(|| default.to_string())
    }

    /// Get database URL with fallback to generic `DATABASE_URL`.
    fn get_database_url(&self, primary_key: &str) -> Result<SecretString, ConfigError> {
        match self.get_optional_database_url(primary_key) {
            Some(url) => Ok(url),
            None => self.get_required_env(primary_key).map(SecretString::from),
        }
    }

    fn get_optional_database_url(&self, primary_key: &str) -> Option<SecretString> {
        self.get_optional_env(primary_key)
            .or_else(|| self.get_optional_env("DATABASE_URL"))
            .map(SecretString::from)
    }
}

fn parse_var<T>(env: &Env<'_>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr<Err = String>,
{
    env.get_optional_env(key).map_or(Ok(default), |raw| {
        raw.parse()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e))
    })
}
