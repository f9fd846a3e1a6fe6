//! Runtime configuration.
//!
//! Loaded from a JSON file. The password may come from the environment so
//! the file can be shared without secrets.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::attachment::CollisionPolicy;
use crate::error::{Error, Result};

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "MAILINTAKE_CONFIG";

/// Environment variable overriding the configured password.
pub const PASSWORD_ENV: &str = "MAILINTAKE_PASSWORD";

/// Configuration file used when [`CONFIG_PATH_ENV`] is unset.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Mail server connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImapConfig {
    /// Server hostname.
    #[serde(alias = "servidor")]
    pub host: String,
    /// Server port.
    #[serde(default = "default_port", alias = "porta")]
    pub port: u16,
    /// Login name.
    #[serde(alias = "email")]
    pub username: String,
    /// Login password.
    #[serde(default, alias = "senha", skip_serializing)]
    pub password: String,
    /// Use implicit TLS.
    #[serde(default = "default_tls", alias = "isSSL")]
    pub tls: bool,
}

/// Attachment storage settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentConfig {
    /// Directory for attachment content. Metadata only when unset.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// What to do when a file of the same name exists.
    #[serde(default)]
    pub collision: CollisionPolicy,
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Mail server.
    #[serde(flatten)]
    pub imap: ImapConfig,
    /// Folders to scan, in order.
    #[serde(default = "default_folders")]
    pub folders: Vec<String>,
    /// `SQLite` database. Records go to stdout as JSON lines when unset.
    #[serde(default)]
    pub database_url: Option<String>,
    /// Attachment storage.
    #[serde(default)]
    pub attachments: AttachmentConfig,
    /// Charset for parts with a missing or unknown charset.
    #[serde(default = "default_charset")]
    pub default_charset: String,
}

const fn default_port() -> u16 {
    993
}

const fn default_tls() -> bool {
    true
}

fn default_folders() -> Vec<String> {
    vec!["INBOX".to_string()]
}

fn default_charset() -> String {
    "iso-8859-1".to_string()
}

impl Config {
    /// Returns the configuration file path, honoring [`CONFIG_PATH_ENV`].
    #[must_use]
    pub fn path() -> PathBuf {
        std::env::var_os(CONFIG_PATH_ENV)
            .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from)
    }

    /// Loads and validates a configuration file.
    ///
    /// [`PASSWORD_ENV`] replaces the file's password when set.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or fails
    /// validation.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_json(&content)?;

        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            debug!("Using password from {PASSWORD_ENV}");
            config.imap.password = password;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parses a configuration without validating it.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or misses required fields.
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Checks that the configuration can drive a scan.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.imap.host.trim().is_empty() {
            return Err(Error::Config("host must not be empty".to_string()));
        }
        if self.imap.port == 0 {
            return Err(Error::Config("port must not be 0".to_string()));
        }
        if self.imap.username.trim().is_empty() {
            return Err(Error::Config("username must not be empty".to_string()));
        }
        if self.folders.is_empty() || self.folders.iter().any(|f| f.trim().is_empty()) {
            return Err(Error::Config(
                "folders must list at least one non-empty name".to_string(),
            ));
        }
        if self.database_url.as_deref().is_some_and(|u| u.trim().is_empty()) {
            return Err(Error::Config("database_url must not be empty".to_string()));
        }
        Ok(())
    }
}
