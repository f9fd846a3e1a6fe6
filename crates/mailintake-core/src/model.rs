//! Message and record types.

use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Identifier of a message within a selected folder.
///
/// This is the server's UID: stable across sessions while the folder's
/// UIDVALIDITY is unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(pub u32);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status reported when a folder is selected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FolderStatus {
    /// Number of messages in the folder.
    pub exists: u32,
    /// UIDVALIDITY, if the server reported one.
    pub uid_validity: Option<u32>,
}

/// A message as delivered by the mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    /// Stable identifier, used to mark the message seen.
    pub id: MessageId,
    /// Sequence number in the current session.
    pub seq: u32,
    /// Envelope subject, possibly RFC 2047 encoded.
    pub subject: Option<String>,
    /// Envelope date, unparsed.
    pub date: Option<String>,
    /// Server receive time.
    pub internal_date: Option<DateTime<FixedOffset>>,
    /// The full raw message.
    pub body: Vec<u8>,
}

impl MailMessage {
    /// Creates a message with only an identifier and raw content.
    #[must_use]
    pub const fn new(id: MessageId, body: Vec<u8>) -> Self {
        Self {
            id,
            seq: 0,
            subject: None,
            date: None,
            internal_date: None,
            body,
        }
    }
}

/// An attachment as recorded alongside an email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentDescriptor {
    /// Name from the part headers.
    pub filename: String,
    /// Where the content was stored, if it was.
    pub locator: Option<String>,
}

/// Uniquely identifies a processed email across runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    /// Folder the message was found in.
    pub folder: String,
    /// Folder UIDVALIDITY at the time of the scan.
    pub uid_validity: Option<u32>,
    /// Message UID.
    pub uid: MessageId,
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.folder,
            self.uid_validity.unwrap_or_default(),
            self.uid
        )
    }
}

/// The persisted outcome of processing one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedEmail {
    /// Idempotency key.
    pub key: RecordKey,
    /// Decoded subject.
    pub subject: String,
    /// Normalized date, see [`normalize_date`].
    pub date: String,
    /// Selected body text.
    pub message: String,
    /// Attachments in document order.
    pub attachments: Vec<AttachmentDescriptor>,
}

impl ProcessedEmail {
    /// Returns the serializable form of this email.
    #[must_use]
    pub fn record(&self) -> EmailRecord<'_> {
        let downloaded_files = self
            .attachments
            .iter()
            .any(|a| a.locator.is_some())
            .then(|| {
                self.attachments
                    .iter()
                    .map(|a| a.locator.as_deref())
                    .collect()
            });

        EmailRecord {
            subject: &self.subject,
            date: &self.date,
            message: &self.message,
            attachments: self.attachments.iter().map(|a| a.filename.as_str()).collect(),
            downloaded_files,
        }
    }
}

/// Wire shape of a processed email.
///
/// `attachments` is always a list. `downloaded_files` is present only when
/// at least one attachment was stored, and lines up with `attachments`.
#[derive(Debug, Serialize)]
pub struct EmailRecord<'a> {
    /// Decoded subject.
    pub subject: &'a str,
    /// Normalized date.
    pub date: &'a str,
    /// Selected body text.
    pub message: &'a str,
    /// Attachment filenames.
    pub attachments: Vec<&'a str>,
    /// Storage locators, `null` where storing failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloaded_files: Option<Vec<Option<&'a str>>>,
}

/// Normalizes a message date to RFC 3339.
///
/// The header date is tried first, ignoring a trailing comment such as
/// `(UTC)`. If it does not parse, the server receive time is used, and if
/// that is missing too the raw header text is kept.
#[must_use]
pub fn normalize_date(raw: Option<&str>, internal: Option<DateTime<FixedOffset>>) -> String {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty());

    if let Some(parsed) = raw.and_then(|r| DateTime::parse_from_rfc2822(strip_comment(r)).ok()) {
        return parsed.to_rfc3339();
    }
    if let Some(internal) = internal {
        return internal.to_rfc3339();
    }
    raw.unwrap_or_default().to_string()
}

fn strip_comment(date: &str) -> &str {
    if date.ends_with(')')
        && let Some(open) = date.rfind('(')
    {
        return date[..open].trim_end();
    }
    date
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn email(attachments: Vec<AttachmentDescriptor>) -> ProcessedEmail {
        ProcessedEmail {
            key: RecordKey {
                folder: "INBOX".to_string(),
                uid_validity: Some(7),
                uid: MessageId(42),
            },
            subject: "Hello".to_string(),
            date: "2024-01-02T03:04:05+00:00".to_string(),
            message: "Body".to_string(),
            attachments,
        }
    }

    #[test]
    fn test_normalize_date_rfc2822() {
        assert_eq!(
            normalize_date(Some("Tue, 1 Jul 2003 10:52:37 +0200"), None),
            "2003-07-01T10:52:37+02:00"
        );
    }

    #[test]
    fn test_normalize_date_strips_comment() {
        assert_eq!(
            normalize_date(Some("Tue, 1 Jul 2003 10:52:37 +0000 (UTC)"), None),
            "2003-07-01T10:52:37+00:00"
        );
    }

    #[test]
    fn test_normalize_date_falls_back_to_internal() {
        let internal = DateTime::parse_from_rfc3339("2024-05-06T07:08:09-03:00").unwrap();
        assert_eq!(
            normalize_date(Some("sometime last week"), Some(internal)),
            "2024-05-06T07:08:09-03:00"
        );
        assert_eq!(normalize_date(None, Some(internal)), "2024-05-06T07:08:09-03:00");
    }

    #[test]
    fn test_normalize_date_keeps_raw() {
        assert_eq!(normalize_date(Some("  yesterday "), None), "yesterday");
        assert_eq!(normalize_date(None, None), "");
    }

    #[test]
    fn test_record_without_attachments() {
        let json = serde_json::to_value(email(Vec::new()).record()).unwrap();
        assert_eq!(json["attachments"], serde_json::json!([]));
        assert!(json.get("downloaded_files").is_none());
        assert_eq!(json["subject"], "Hello");
    }

    #[test]
    fn test_record_metadata_only() {
        let json = serde_json::to_value(
            email(vec![AttachmentDescriptor {
                filename: "a.pdf".to_string(),
                locator: None,
            }])
            .record(),
        )
        .unwrap();
        assert_eq!(json["attachments"], serde_json::json!(["a.pdf"]));
        assert!(json.get("downloaded_files").is_none());
    }

    #[test]
    fn test_record_downloaded_files_aligned() {
        let json = serde_json::to_value(
            email(vec![
                AttachmentDescriptor {
                    filename: "a.pdf".to_string(),
                    locator: Some("/tmp/a.pdf".to_string()),
                },
                AttachmentDescriptor {
                    filename: "b.pdf".to_string(),
                    locator: None,
                },
            ])
            .record(),
        )
        .unwrap();
        assert_eq!(
            json["downloaded_files"],
            serde_json::json!(["/tmp/a.pdf", null])
        );
    }

    #[test]
    fn test_record_key_display() {
        assert_eq!(email(Vec::new()).key.to_string(), "INBOX/7/42");
    }
}
