//! Error types for MIME operations.

/// Result type alias for MIME operations.
pub type Result<T> = std::result::Result<T, Error>;

/// MIME error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid transfer encoding payload.
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Base64 decode error.
    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// Invalid content type.
    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    /// Missing boundary in multipart message.
    #[error("Missing boundary in multipart message")]
    MissingBoundary,

    /// Invalid multipart structure.
    #[error("Invalid multipart structure: {0}")]
    InvalidMultipart(String),

    /// Parse error.
    #[error("Parse error: {0}")]
    Parse(String),
}

impl Error {
    /// Returns true for failures while reversing a transfer encoding.
    ///
    /// These are recovered locally by falling back to the undecoded bytes.
    #[must_use]
    pub const fn is_decode(&self) -> bool {
        matches!(self, Self::InvalidEncoding(_) | Self::Base64Decode(_))
    }

    /// Returns true for structural failures of a single part.
    ///
    /// The affected part is skipped and traversal continues.
    #[must_use]
    pub const fn is_parse(&self) -> bool {
        !self.is_decode()
    }
}
