//! IMAP implementation of [`MailboxClient`].

use std::pin::pin;

use async_imap::Session;
use async_imap::types::Fetch;
use futures::TryStreamExt;
use mailintake_mime::encoding::raw_header_text;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};

use super::stream::{ImapStream, connect_plain, connect_tls};
use super::{MailboxClient, MessageStream};
use crate::config::ImapConfig;
use crate::error::MailboxError;
use crate::model::{FolderStatus, MailMessage, MessageId};

/// Fetch items for one message. `BODY.PEEK[]` leaves `\Seen` untouched.
const FETCH_QUERY: &str = "(UID ENVELOPE INTERNALDATE BODY.PEEK[])";

/// An authenticated IMAP session.
pub struct ImapMailbox {
    session: Session<ImapStream>,
}

impl ImapMailbox {
    /// Connects and logs in.
    ///
    /// # Errors
    ///
    /// Returns [`MailboxError::Connection`] if the server cannot be reached
    /// and [`MailboxError::Authentication`] if the login is rejected.
    pub async fn connect(config: &ImapConfig) -> Result<Self, MailboxError> {
        let stream = if config.tls {
            connect_tls(&config.host, config.port).await
        } else {
            connect_plain(&config.host, config.port).await
        }
        .map_err(|e| MailboxError::Connection(format!("{}:{}: {e}", config.host, config.port)))?;

        debug!(host = %config.host, port = config.port, tls = stream.is_tls(), "Connected");

        let client = async_imap::Client::new(stream);
        let session = client
            .login(&config.username, &config.password)
            .await
            .map_err(|(e, _)| MailboxError::Authentication(e.to_string()))?;

        info!(host = %config.host, username = %config.username, "Logged in");
        Ok(Self { session })
    }

    /// Ends the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not acknowledge the logout.
    pub async fn logout(mut self) -> Result<(), MailboxError> {
        self.session
            .logout()
            .await
            .map_err(|e| MailboxError::command("LOGOUT", e))
    }
}

impl MailboxClient for ImapMailbox {
    async fn select_folder(&mut self, name: &str) -> Result<FolderStatus, MailboxError> {
        let mailbox = self
            .session
            .select(name)
            .await
            .map_err(|e| MailboxError::command("SELECT", e))?;

        Ok(FolderStatus {
            exists: mailbox.exists,
            uid_validity: mailbox.uid_validity,
        })
    }

    async fn search_unseen(&mut self) -> Result<Vec<MessageId>, MailboxError> {
        let uids = self
            .session
            .uid_search("UNSEEN")
            .await
            .map_err(|e| MailboxError::command("SEARCH", e))?;

        let mut ids: Vec<MessageId> = uids.into_iter().map(MessageId).collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn fetch(&mut self, ids: &[MessageId]) -> Result<MessageStream, MailboxError> {
        let (tx, stream) = MessageStream::channel(ids.len());

        let fetches = self
            .session
            .uid_fetch(uid_set(ids), FETCH_QUERY)
            .await
            .map_err(|e| MailboxError::command("FETCH", e))?;
        let mut fetches = pin!(fetches);

        loop {
            match fetches.try_next().await {
                Ok(Some(fetch)) => {
                    let Some(message) = to_mail_message(&fetch) else {
                        debug!(seq = fetch.message, "Ignoring FETCH response without body");
                        continue;
                    };
                    match tx.try_send(message) {
                        Ok(()) => {}
                        Err(TrySendError::Full(message)) => {
                            warn!(uid = %message.id, "Server returned more messages than requested");
                        }
                        Err(TrySendError::Closed(_)) => break,
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "FETCH interrupted, ending message stream early");
                    break;
                }
            }
        }

        Ok(stream)
    }

    async fn mark_seen(&mut self, id: MessageId) -> Result<(), MailboxError> {
        let updates = self
            .session
            .uid_store(id.to_string(), "+FLAGS.SILENT (\\Seen)")
            .await
            .map_err(|e| MailboxError::command("STORE", e))?;

        updates
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| MailboxError::command("STORE", e))?;
        Ok(())
    }
}

fn uid_set(ids: &[MessageId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Builds a message from a FETCH response carrying a UID and a body.
fn to_mail_message(fetch: &Fetch) -> Option<MailMessage> {
    let uid = fetch.uid?;
    let body = fetch.body()?.to_vec();
    let envelope = fetch.envelope();

    Some(MailMessage {
        id: MessageId(uid),
        seq: fetch.message,
        subject: envelope
            .and_then(|e| e.subject.as_deref())
            .map(raw_header_text),
        date: envelope.and_then(|e| e.date.as_deref()).map(raw_header_text),
        internal_date: fetch.internal_date(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uid_set() {
        assert_eq!(uid_set(&[MessageId(4), MessageId(8), MessageId(15)]), "4,8,15");
        assert_eq!(uid_set(&[MessageId(16)]), "16");
    }

    #[test]
    fn test_fetch_query_peeks() {
        assert!(FETCH_QUERY.contains("BODY.PEEK[]"));
        assert!(!FETCH_QUERY.contains("RFC822"));
    }
}
