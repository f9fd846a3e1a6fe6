//! JSON lines output.

use std::io::Write;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, PoisonError};

use super::{RecordId, RecordSink};
use crate::error::{Error, Result};
use crate::model::ProcessedEmail;

/// Writes one JSON object per email to a writer.
///
/// Each record carries its attachment names, so per-attachment calls write
/// nothing.
#[derive(Debug)]
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
    next_id: AtomicI64,
}

impl<W: Write> JsonLinesSink<W> {
    /// Creates a sink writing to `writer`.
    pub const fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
            next_id: AtomicI64::new(1),
        }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write> RecordSink for JsonLinesSink<W> {
    async fn persist(&self, email: &ProcessedEmail) -> Result<RecordId> {
        let line = serde_json::to_vec(&email.record())?;

        let mut writer = self
            .writer
            .lock()
            .map_err(|_| Error::Persistence("output writer poisoned".to_string()))?;
        writer.write_all(&line)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        drop(writer);

        Ok(RecordId(self.next_id.fetch_add(1, Ordering::Relaxed)))
    }

    async fn persist_attachment(
        &self,
        _record: RecordId,
        _filename: &str,
        _locator: Option<&str>,
    ) -> Result<()> {
        Ok(())
    }
}
