//! Error types for the core library.

use std::fmt;

use thiserror::Error;

/// Errors raised by a mailbox session.
#[derive(Debug, Error)]
pub enum MailboxError {
    /// The server could not be reached or the TLS handshake failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The server rejected the credentials.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// A mailbox command was rejected or the session broke while running it.
    #[error("{command} failed: {reason}")]
    Command {
        /// Command name, e.g. `SELECT`.
        command: &'static str,
        /// Server or transport message.
        reason: String,
    },
}

impl MailboxError {
    /// Wraps a failure of the named command.
    pub fn command(command: &'static str, reason: impl fmt::Display) -> Self {
        Self::Command {
            command,
            reason: reason.to_string(),
        }
    }
}

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Mailbox operation failed.
    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A record sink could not accept a record.
    #[error("Persistence error: {0}")]
    Persistence(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_error_display() {
        let err = MailboxError::command("SELECT", "NO [NONEXISTENT] Unknown folder");
        assert_eq!(err.to_string(), "SELECT failed: NO [NONEXISTENT] Unknown folder");

        let err: Error = err.into();
        assert!(err.to_string().starts_with("Mailbox error: SELECT failed"));
    }
}
