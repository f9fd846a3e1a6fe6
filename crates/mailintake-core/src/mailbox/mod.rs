//! Mailbox access.
//!
//! [`MailboxClient`] is the seam between the ingestion pipeline and a mail
//! server. [`ImapMailbox`] implements it over IMAP; tests substitute an
//! in-memory mailbox.

mod imap;
mod stream;

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

pub use imap::ImapMailbox;
pub use stream::{ImapStream, connect_plain, connect_tls, create_tls_connector};

use crate::error::MailboxError;
use crate::model::{FolderStatus, MailMessage, MessageId};

/// Operations the pipeline needs from a mailbox session.
///
/// Implementations own one authenticated session. Calls are sequential:
/// a folder must be selected before searching, fetching or marking.
#[allow(async_fn_in_trait)]
pub trait MailboxClient {
    /// Selects a folder for the calls that follow.
    async fn select_folder(&mut self, name: &str) -> Result<FolderStatus, MailboxError>;

    /// Returns the messages of the selected folder without the seen flag,
    /// in ascending order.
    async fn search_unseen(&mut self) -> Result<Vec<MessageId>, MailboxError>;

    /// Fetches the given messages without changing their flags.
    ///
    /// The whole batch may be buffered, so callers bound memory by the
    /// number of ids they pass. A transport error after the first message
    /// ends the stream early and is logged; messages already delivered stay
    /// valid.
    async fn fetch(&mut self, ids: &[MessageId]) -> Result<MessageStream, MailboxError>;

    /// Sets the seen flag on one message.
    async fn mark_seen(&mut self, id: MessageId) -> Result<(), MailboxError>;
}

/// Finite stream of fetched messages.
///
/// Yields each message at most once and never blocks once the producer is
/// done.
#[derive(Debug)]
pub struct MessageStream {
    rx: mpsc::Receiver<MailMessage>,
}

impl MessageStream {
    /// Creates a stream and the sender feeding it.
    ///
    /// The buffer holds `capacity` messages so a producer that knows its
    /// count never waits on the consumer.
    #[must_use]
    pub fn channel(capacity: usize) -> (mpsc::Sender<MailMessage>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx })
    }

    /// Creates a stream over already available messages.
    #[must_use]
    pub fn from_messages(messages: Vec<MailMessage>) -> Self {
        let (tx, stream) = Self::channel(messages.len());
        for message in messages {
            if tx.try_send(message).is_err() {
                break;
            }
        }
        stream
    }
}

impl Stream for MessageStream {
    type Item = MailMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
