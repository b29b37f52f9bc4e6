//! Backend service configuration.
//!
//! Settings come from an optional TOML file and are then overridden by
//! command-line flags and environment variables (see the service binary).
//! The token signing secret is never read from the file.
//!
//! ```toml
//! port = 8002
//! db_path = "/var/lib/healthbar/healthbar.db"
//! upload_path = "/var/lib/healthbar/uploads"
//! token_ttl_secs = 86400
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default bearer token lifetime (24 hours).
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 24 * 60 * 60;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML or has the wrong shape.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Configuration shared by all backend services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Listen port. `None` selects the service's default port.
    pub port: Option<u16>,

    /// `SQLite` database file shared by all services.
    pub db_path: PathBuf,

    /// Root directory of the prescription blob store.
    pub upload_path: PathBuf,

    /// Bearer token lifetime in seconds.
    pub token_ttl_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: None,
            db_path: PathBuf::from("healthbar.db"),
            upload_path: PathBuf::from("./uploads"),
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token_ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "token_ttl_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
