//! `mailintake` - batch mailbox ingestion
//!
//! Scans the configured folders once, persists every unseen message and
//! marks it seen. Meant to be run by a scheduler.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use anyhow::Context;
use mailintake_core::{
    AttachmentSink, Config, FsAttachmentSink, ImapMailbox, IngestPipeline, JsonLinesSink,
    MessageState, MetadataOnlySink, RecordSink, ScanReport, SqliteRecordSink,
};
use mailintake_mime::{CharsetResolver, Walker};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries JSON records
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "mailintake=info,mailintake_core=info,mailintake_mime=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let path = Config::path();
    let config =
        Config::load(&path).with_context(|| format!("loading {}", path.display()))?;

    info!(
        host = %config.imap.host,
        folders = ?config.folders,
        "Starting mailintake"
    );

    let walker = Walker::new(CharsetResolver::with_fallback_label(&config.default_charset));

    // The record store is opened before the mailbox session
    let report = match config.database_url.as_deref() {
        Some(database) => {
            let Some(records) = open_database(database).await else {
                return Ok(());
            };
            connect_and_scan(records, walker, &config).await?
        }
        None => connect_and_scan(JsonLinesSink::new(std::io::stdout()), walker, &config).await?,
    };

    log_report(&report);
    Ok(())
}

/// Opens the record database, logging why it could not be opened.
async fn open_database(database: &str) -> Option<SqliteRecordSink> {
    match SqliteRecordSink::new(database).await {
        Ok(records) => Some(records),
        Err(e) => {
            error!(database, error = %e, "Opening database failed, nothing scanned");
            None
        }
    }
}

async fn connect_and_scan<R: RecordSink>(
    records: R,
    walker: Walker,
    config: &Config,
) -> anyhow::Result<ScanReport> {
    let mailbox = ImapMailbox::connect(&config.imap)
        .await
        .context("opening mailbox session")?;

    let report = match &config.attachments.directory {
        Some(directory) => {
            let attachments = FsAttachmentSink::new(directory, config.attachments.collision);
            scan(IngestPipeline::new(mailbox, attachments, records, walker), config).await
        }
        None => scan(IngestPipeline::new(mailbox, MetadataOnlySink, records, walker), config).await,
    };
    Ok(report)
}

async fn scan<A: AttachmentSink, R: RecordSink>(
    mut pipeline: IngestPipeline<ImapMailbox, A, R>,
    config: &Config,
) -> ScanReport {
    let report = pipeline.run(&config.folders).await;

    let (mailbox, _, _) = pipeline.into_parts();
    if let Err(e) = mailbox.logout().await {
        warn!(error = %e, "Logout failed");
    }
    report
}

fn log_report(report: &ScanReport) {
    let incomplete = report.folders.iter().filter(|f| f.error.is_some()).count();
    if incomplete > 0 {
        error!(incomplete, "Some folders were not scanned completely");
    }

    info!(
        folders = report.folders.len(),
        marked_seen = report.count(MessageState::MarkedSeen),
        failed = report.count(MessageState::Failed),
        not_marked = report.count(MessageState::Persisted),
        "Scan finished"
    );
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_database_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mail.db");

        assert!(open_database(path.to_str().unwrap()).await.is_some());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_unopenable_database_is_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"").unwrap();

        let path = blocker.join("mail.db");
        assert!(open_database(path.to_str().unwrap()).await.is_none());
    }
}
