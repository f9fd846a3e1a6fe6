//! `SQLite` record storage.

use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::debug;

use super::{RecordId, RecordSink};
use crate::error::Result;
use crate::model::{ProcessedEmail, RecordKey};

/// An email as read back from the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEmail {
    /// Row id.
    pub id: RecordId,
    /// Decoded subject.
    pub subject: String,
    /// Normalized date.
    pub date: String,
    /// Body text.
    pub message: String,
    /// Attachments in insertion order.
    pub attachments: Vec<StoredAttachment>,
}

/// An attachment row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAttachment {
    /// Attachment name.
    pub filename: String,
    /// Where the content was stored.
    pub locator: Option<String>,
}

/// Persists processed emails in `SQLite`.
///
/// Records are keyed by folder, UIDVALIDITY and UID, so processing the same
/// message twice updates one row.
#[derive(Debug, Clone)]
pub struct SqliteRecordSink {
    pool: SqlitePool,
}

impl SqliteRecordSink {
    /// Opens (or creates) the database.
    ///
    /// `database` is either a `sqlite:` URL or a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn new(database: &str) -> Result<Self> {
        let url = if database.starts_with("sqlite:") {
            database.to_string()
        } else {
            format!("sqlite:{database}?mode=rwc")
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let sink = Self { pool };
        sink.initialize().await?;
        Ok(sink)
    }

    /// Creates an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let sink = Self { pool };
        sink.initialize().await?;
        Ok(sink)
    }

    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS processed_emails (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                folder TEXT NOT NULL,
                uid_validity INTEGER NOT NULL DEFAULT 0,
                uid INTEGER NOT NULL,
                subject TEXT NOT NULL DEFAULT '',
                date TEXT NOT NULL DEFAULT '',
                message TEXT NOT NULL DEFAULT '',
                processed_at TEXT NOT NULL,
                UNIQUE(folder, uid_validity, uid)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS email_attachments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email_id INTEGER NOT NULL REFERENCES processed_emails(id) ON DELETE CASCADE,
                filename TEXT NOT NULL,
                locator TEXT
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_attachments_email
            ON email_attachments(email_id)
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Looks up the record stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find(&self, key: &RecordKey) -> Result<Option<StoredEmail>> {
        let row = sqlx::query(
            r"
            SELECT id, subject, date, message
            FROM processed_emails
            WHERE folder = ? AND uid_validity = ? AND uid = ?
            ",
        )
        .bind(&key.folder)
        .bind(i64::from(key.uid_validity.unwrap_or_default()))
        .bind(i64::from(key.uid.0))
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let id = RecordId(row.get("id"));

        let attachments = sqlx::query(
            r"
            SELECT filename, locator
            FROM email_attachments
            WHERE email_id = ?
            ORDER BY id
            ",
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| StoredAttachment {
            filename: row.get("filename"),
            locator: row.get("locator"),
        })
        .collect();

        Ok(Some(StoredEmail {
            id,
            subject: row.get("subject"),
            date: row.get("date"),
            message: row.get("message"),
            attachments,
        }))
    }

    /// Counts stored emails.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count(&self) -> Result<i64> {
        let row = sqlx::query(r"SELECT COUNT(*) as count FROM processed_emails")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("count"))
    }
}

impl RecordSink for SqliteRecordSink {
    async fn persist(&self, email: &ProcessedEmail) -> Result<RecordId> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r"
            INSERT INTO processed_emails
                (folder, uid_validity, uid, subject, date, message, processed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(folder, uid_validity, uid) DO UPDATE SET
                subject = excluded.subject,
                date = excluded.date,
                message = excluded.message,
                processed_at = excluded.processed_at
            RETURNING id
            ",
        )
        .bind(&email.key.folder)
        .bind(i64::from(email.key.uid_validity.unwrap_or_default()))
        .bind(i64::from(email.key.uid.0))
        .bind(&email.subject)
        .bind(&email.date)
        .bind(&email.message)
        .bind(Utc::now().to_rfc3339())
        .fetch_one(&mut *tx)
        .await?;
        let id = RecordId(row.get("id"));

        // A re-processed message gets its attachment rows rewritten
        sqlx::query(r"DELETE FROM email_attachments WHERE email_id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(key = %email.key, id = id.0, "Persisted email");
        Ok(id)
    }

    async fn persist_attachment(
        &self,
        record: RecordId,
        filename: &str,
        locator: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO email_attachments (email_id, filename, locator)
            VALUES (?, ?, ?)
            ",
        )
        .bind(record.0)
        .bind(filename)
        .bind(locator)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{AttachmentDescriptor, MessageId};

    fn email(uid: u32, subject: &str) -> ProcessedEmail {
        ProcessedEmail {
            key: RecordKey {
                folder: "INBOX".to_string(),
                uid_validity: Some(100),
                uid: MessageId(uid),
            },
            subject: subject.to_string(),
            date: "2024-01-15T10:30:00+00:00".to_string(),
            message: "Hello".to_string(),
            attachments: vec![AttachmentDescriptor {
                filename: "a.pdf".to_string(),
                locator: None,
            }],
        }
    }

    #[tokio::test]
    async fn test_persist_and_find() {
        let sink = SqliteRecordSink::in_memory().await.unwrap();
        let email = email(7, "First");

        let id = sink.persist(&email).await.unwrap();
        sink.persist_attachment(id, "a.pdf", Some("/tmp/a.pdf"))
            .await
            .unwrap();
        sink.persist_attachment(id, "b.txt", None).await.unwrap();

        let stored = sink.find(&email.key).await.unwrap().unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(stored.subject, "First");
        assert_eq!(stored.message, "Hello");
        assert_eq!(
            stored.attachments,
            vec![
                StoredAttachment {
                    filename: "a.pdf".to_string(),
                    locator: Some("/tmp/a.pdf".to_string()),
                },
                StoredAttachment {
                    filename: "b.txt".to_string(),
                    locator: None,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_persist_twice_updates_one_row() {
        let sink = SqliteRecordSink::in_memory().await.unwrap();

        let first = sink.persist(&email(7, "First")).await.unwrap();
        sink.persist_attachment(first, "a.pdf", None).await.unwrap();
        let second = sink.persist(&email(7, "Second")).await.unwrap();
        sink.persist_attachment(second, "a.pdf", None).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(sink.count().await.unwrap(), 1);

        let stored = sink.find(&email(7, "").key).await.unwrap().unwrap();
        assert_eq!(stored.subject, "Second");
        assert_eq!(stored.attachments.len(), 1);
    }

    #[tokio::test]
    async fn test_uid_validity_separates_records() {
        let sink = SqliteRecordSink::in_memory().await.unwrap();
        let mut other = email(7, "Other generation");
        other.key.uid_validity = Some(101);

        sink.persist(&email(7, "First")).await.unwrap();
        sink.persist(&other).await.unwrap();
        sink.persist(&email(3, "Earlier")).await.unwrap();

        assert_eq!(sink.count().await.unwrap(), 3);
        let first = sink.find(&email(7, "").key).await.unwrap().unwrap();
        assert_eq!(first.subject, "First");
        let stored = sink.find(&other.key).await.unwrap().unwrap();
        assert_eq!(stored.subject, "Other generation");
    }

    #[tokio::test]
    async fn test_find_missing() {
        let sink = SqliteRecordSink::in_memory().await.unwrap();
        assert!(sink.find(&email(1, "").key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mail.db");

        let sink = SqliteRecordSink::new(path.to_str().unwrap()).await.unwrap();
        sink.persist(&email(1, "On disk")).await.unwrap();
        drop(sink);

        let reopened = SqliteRecordSink::new(path.to_str().unwrap()).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
    }
}
