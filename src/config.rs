//! Configuration management
//!
//! Loads configuration from config.toml with support for:
//! - Moderation API endpoint, model, and deadline
//! - Server binding settings
//! - Storage backend selection
//! - Upload directory and reward parameters

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

/// Main configuration structure matching config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub moderation: ModerationConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub uploads: UploadsConfig,
    pub rewards: RewardsConfig,
}

/// Moderation API configuration. The credential itself is only ever read from
/// the MODERATION_API_KEY environment variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationConfig {
    pub endpoint: String,
    pub model: String,
    /// End-to-end budget for one moderation check, covering all retries.
    pub timeout_secs: u64,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Database configuration. DATABASE_URL in the environment selects the
/// PostgreSQL backend; otherwise the embedded SQLite file below is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> String {
    "civic-reports.db".to_string()
}

/// Upload storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadsConfig {
    /// Root directory; stored files land under `<root>/uploads/issues/`.
    pub root: String,
}

/// Reward system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardsConfig {
    /// Points credited to a submitter per accepted report
    pub points_per_report: i64,
}

impl Config {
    /// Load from config.toml or use defaults
    pub fn load() -> Result<Self> {
        Self::load_from("config.toml")
    }

    /// Load from specific path
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")
        } else {
            // Use embedded default config
            toml::from_str(DEFAULT_CONFIG).context("Failed to parse default config")
        }
    }

    /// Get the moderation API key from the environment, if configured.
    pub fn moderation_api_key(&self) -> Option<String> {
        match std::env::var("MODERATION_API_KEY") {
            Ok(key) if !key.trim().is_empty() => Some(key),
            _ => None,
        }
    }

    /// Get the PostgreSQL connection string, if one is configured.
    pub fn database_url(&self) -> Option<String> {
        match std::env::var("DATABASE_URL") {
            Ok(url) if !url.is_empty() => Some(url),
            _ => None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        // The embedded default config is validated at compile time,
        // so this should never fail. Using a fallback for robustness.
        toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|_| Self {
            moderation: ModerationConfig {
                endpoint: "https://api.openai.com/v1/moderations".to_string(),
                model: "omni-moderation-latest".to_string(),
                timeout_secs: 40,
            },
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig::default(),
            uploads: UploadsConfig {
                root: "wwwroot".to_string(),
            },
            rewards: RewardsConfig {
                points_per_report: 10,
            },
        })
    }
}
