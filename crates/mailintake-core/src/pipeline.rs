//! The ingestion pipeline.
//!
//! For each configured folder: select it, find unseen messages, fetch them
//! in batches without touching flags, then take each message through
//! `Fetched -> Parsed -> Persisted -> MarkedSeen`. A message that fails to
//! persist stays unseen and is picked up again by the next scan.

use std::fmt;

use futures::StreamExt;
use mailintake_mime::encoding::decode_encoded_words;
use mailintake_mime::{MimeNode, Walker};
use tracing::{debug, error, info, warn};

use crate::attachment::AttachmentSink;
use crate::error::{MailboxError, Result};
use crate::mailbox::MailboxClient;
use crate::model::{
    AttachmentDescriptor, MailMessage, MessageId, ProcessedEmail, RecordKey, normalize_date,
};
use crate::record::{RecordId, RecordSink};

/// Messages fetched per mailbox round trip.
const FETCH_BATCH: usize = 100;

/// Processing stage of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageState {
    /// Delivered by the mailbox.
    Fetched,
    /// MIME tree walked and attachments stored.
    Parsed,
    /// Record and attachments persisted.
    Persisted,
    /// Seen flag set. Terminal.
    MarkedSeen,
    /// Processing stopped before persistence. Terminal; the message stays
    /// unseen.
    Failed,
}

impl fmt::Display for MessageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fetched => "fetched",
            Self::Parsed => "parsed",
            Self::Persisted => "persisted",
            Self::MarkedSeen => "marked-seen",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Where one message ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageOutcome {
    /// The message.
    pub id: MessageId,
    /// Last state reached.
    pub state: MessageState,
    /// Why the message did not reach [`MessageState::MarkedSeen`].
    pub error: Option<String>,
}

/// Result of scanning one folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderReport {
    /// Folder name.
    pub folder: String,
    /// Unseen messages found.
    pub unseen: usize,
    /// Per-message outcomes, in fetch order.
    pub outcomes: Vec<MessageOutcome>,
    /// Error that ended the folder scan early.
    pub error: Option<String>,
}

impl FolderReport {
    fn new(folder: &str) -> Self {
        Self {
            folder: folder.to_string(),
            unseen: 0,
            outcomes: Vec::new(),
            error: None,
        }
    }

    /// Counts messages that ended in `state`.
    #[must_use]
    pub fn count(&self, state: MessageState) -> usize {
        self.outcomes.iter().filter(|o| o.state == state).count()
    }

    /// Returns true if the folder was scanned and every message marked seen.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.error.is_none() && self.count(MessageState::MarkedSeen) == self.outcomes.len()
    }
}

/// Result of a scan over all folders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// One entry per folder, in scan order.
    pub folders: Vec<FolderReport>,
}

impl ScanReport {
    /// Counts messages across all folders that ended in `state`.
    #[must_use]
    pub fn count(&self, state: MessageState) -> usize {
        self.folders.iter().map(|f| f.count(state)).sum()
    }

    /// Returns true if no folder or message failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.folders.iter().all(FolderReport::is_clean)
    }
}

/// Drives mailbox, attachment storage and record persistence.
pub struct IngestPipeline<M, A, R> {
    mailbox: M,
    attachments: A,
    records: R,
    walker: Walker,
}

impl<M, A, R> IngestPipeline<M, A, R>
where
    M: MailboxClient,
    A: AttachmentSink,
    R: RecordSink,
{
    /// Creates a pipeline over an open mailbox session.
    pub const fn new(mailbox: M, attachments: A, records: R, walker: Walker) -> Self {
        Self {
            mailbox,
            attachments,
            records,
            walker,
        }
    }

    /// Returns the record sink.
    pub const fn records(&self) -> &R {
        &self.records
    }

    /// Takes the pipeline apart.
    pub fn into_parts(self) -> (M, A, R) {
        (self.mailbox, self.attachments, self.records)
    }

    /// Scans the folders in order.
    ///
    /// A folder that cannot be scanned is reported and the next one is
    /// tried.
    pub async fn run(&mut self, folders: &[String]) -> ScanReport {
        let mut report = ScanReport::default();
        for folder in folders {
            report.folders.push(self.scan_folder(folder).await);
        }
        report
    }

    /// Scans one folder.
    pub async fn scan_folder(&mut self, folder: &str) -> FolderReport {
        let mut report = FolderReport::new(folder);

        if let Err(e) = self.try_scan_folder(folder, &mut report).await {
            error!(folder, error = %e, "Folder scan aborted");
            report.error = Some(e.to_string());
        }

        info!(
            folder,
            unseen = report.unseen,
            marked_seen = report.count(MessageState::MarkedSeen),
            failed = report.count(MessageState::Failed),
            not_marked = report.count(MessageState::Persisted),
            "Folder scanned"
        );
        report
    }

    async fn try_scan_folder(
        &mut self,
        folder: &str,
        report: &mut FolderReport,
    ) -> std::result::Result<(), MailboxError> {
        let status = self.mailbox.select_folder(folder).await?;
        debug!(folder, exists = status.exists, uid_validity = ?status.uid_validity, "Selected");

        let ids = self.mailbox.search_unseen().await?;
        report.unseen = ids.len();
        if ids.is_empty() {
            return Ok(());
        }

        // Each batch is processed and marked before the next is fetched
        for batch in ids.chunks(FETCH_BATCH) {
            let mut messages = self.mailbox.fetch(batch).await?;
            while let Some(message) = messages.next().await {
                let outcome = self.handle_message(folder, status.uid_validity, message).await;
                report.outcomes.push(outcome);
            }
        }

        if report.outcomes.len() < ids.len() {
            warn!(
                folder,
                expected = ids.len(),
                received = report.outcomes.len(),
                "Fewer messages fetched than found unseen"
            );
        }
        Ok(())
    }

    async fn handle_message(
        &mut self,
        folder: &str,
        uid_validity: Option<u32>,
        message: MailMessage,
    ) -> MessageOutcome {
        let id = message.id;
        debug!(folder, uid = %id, state = %MessageState::Fetched, "State changed");

        let email = self.process_message(folder, uid_validity, &message).await;
        debug!(folder, uid = %id, state = %MessageState::Parsed, "State changed");

        if let Err(e) = self.persist(&email).await {
            error!(folder, uid = %id, error = %e, "Persisting failed, message left unseen");
            return MessageOutcome {
                id,
                state: MessageState::Failed,
                error: Some(e.to_string()),
            };
        }
        debug!(folder, uid = %id, state = %MessageState::Persisted, "State changed");

        match self.mailbox.mark_seen(id).await {
            Ok(()) => {
                debug!(folder, uid = %id, state = %MessageState::MarkedSeen, "State changed");
                MessageOutcome {
                    id,
                    state: MessageState::MarkedSeen,
                    error: None,
                }
            }
            Err(e) => {
                error!(folder, uid = %id, error = %e, "Persisted but could not mark seen");
                MessageOutcome {
                    id,
                    state: MessageState::Persisted,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Turns a fetched message into a processed email.
    ///
    /// Attachments are stored as they are found. A storage failure is
    /// logged and leaves that attachment without a locator.
    pub async fn process_message(
        &self,
        folder: &str,
        uid_validity: Option<u32>,
        message: &MailMessage,
    ) -> ProcessedEmail {
        let root = MimeNode::parse(&message.body);
        let extraction = self.walker.walk(&root);
        if extraction.skipped_parts > 0 {
            warn!(
                folder,
                uid = %message.id,
                skipped = extraction.skipped_parts,
                "Some parts could not be decoded"
            );
        }

        let headers = root.headers();
        let subject = message
            .subject
            .as_deref()
            .or_else(|| headers.get("subject"))
            .map(|s| decode_encoded_words(s, self.walker.resolver()))
            .unwrap_or_default();
        let date = normalize_date(
            message.date.as_deref().or_else(|| headers.get("date")),
            message.internal_date,
        );

        let mut attachments = Vec::with_capacity(extraction.attachments.len());
        for attachment in extraction.attachments {
            let locator = match self
                .attachments
                .store(&attachment.filename, &attachment.data)
                .await
            {
                Ok(locator) => locator,
                Err(e) => {
                    warn!(
                        folder,
                        uid = %message.id,
                        filename = %attachment.filename,
                        error = %e,
                        "Storing attachment failed"
                    );
                    None
                }
            };
            attachments.push(AttachmentDescriptor {
                filename: attachment.filename,
                locator,
            });
        }

        ProcessedEmail {
            key: RecordKey {
                folder: folder.to_string(),
                uid_validity,
                uid: message.id,
            },
            subject,
            date,
            message: extraction.text,
            attachments,
        }
    }

    async fn persist(&self, email: &ProcessedEmail) -> Result<RecordId> {
        let id = self.records.persist(email).await?;
        for attachment in &email.attachments {
            self.records
                .persist_attachment(id, &attachment.filename, attachment.locator.as_deref())
                .await?;
        }
        Ok(id)
    }
}
