//! Record persistence.
//!
//! A [`RecordSink`] accepts one [`ProcessedEmail`] per message, then one
//! call per attachment. The pipeline marks a message seen only after both
//! succeed.

mod json;
mod sqlite;

pub use json::JsonLinesSink;
pub use sqlite::{SqliteRecordSink, StoredAttachment, StoredEmail};

use crate::error::Result;
use crate::model::ProcessedEmail;

/// Identifier of a persisted email record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId(pub i64);

/// Destination for processed emails.
#[allow(async_fn_in_trait)]
pub trait RecordSink {
    /// Persists an email, replacing any earlier record with the same key.
    async fn persist(&self, email: &ProcessedEmail) -> Result<RecordId>;

    /// Persists one attachment of a record returned by [`persist`](Self::persist).
    async fn persist_attachment(
        &self,
        record: RecordId,
        filename: &str,
        locator: Option<&str>,
    ) -> Result<()>;
}
