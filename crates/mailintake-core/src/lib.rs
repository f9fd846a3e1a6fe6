//! # mailintake-core
//!
//! Mailbox scanning for mailintake.
//!
//! This crate connects the MIME decoding in `mailintake-mime` to a mail
//! server and to storage:
//!
//! - **Mailbox**: IMAP session behind the [`MailboxClient`] trait
//! - **Attachments**: directory storage or metadata only
//! - **Records**: `SQLite` or JSON lines
//! - **Pipeline**: unseen messages are marked seen only once persisted
//!
//! ## Example
//!
//! ```ignore
//! use mailintake_core::{Config, FsAttachmentSink, ImapMailbox, IngestPipeline, SqliteRecordSink};
//! use mailintake_mime::{CharsetResolver, Walker};
//!
//! let config = Config::load(&Config::path())?;
//! let mailbox = ImapMailbox::connect(&config.imap).await?;
//! let records = SqliteRecordSink::new("mail.db").await?;
//! let attachments = FsAttachmentSink::new("attachments", Default::default());
//! let walker = Walker::new(CharsetResolver::new());
//!
//! let mut pipeline = IngestPipeline::new(mailbox, attachments, records, walker);
//! let report = pipeline.run(&config.folders).await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod attachment;
pub mod config;
pub mod error;
pub mod mailbox;
pub mod model;
pub mod pipeline;
pub mod record;

pub use attachment::{AttachmentSink, CollisionPolicy, FsAttachmentSink, MetadataOnlySink};
pub use config::{AttachmentConfig, Config, ImapConfig};
pub use error::{Error, MailboxError, Result};
pub use mailbox::{ImapMailbox, MailboxClient, MessageStream};
pub use model::{
    AttachmentDescriptor, EmailRecord, FolderStatus, MailMessage, MessageId, ProcessedEmail,
    RecordKey,
};
pub use pipeline::{FolderReport, IngestPipeline, MessageOutcome, MessageState, ScanReport};
pub use record::{JsonLinesSink, RecordId, RecordSink, SqliteRecordSink};
