//! Attachment storage.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Longest stored file name, in characters.
const MAX_FILENAME_CHARS: usize = 150;

/// Name used when a sanitized file name ends up empty.
const FALLBACK_FILENAME: &str = "attachment";

/// Upper bound on `name_N.ext` candidates before giving up.
const MAX_SUFFIX: u32 = 10_000;

/// Destination for attachment content.
#[allow(async_fn_in_trait)]
pub trait AttachmentSink {
    /// Stores one attachment.
    ///
    /// Returns where the content was stored, or `None` if this sink keeps
    /// no content.
    async fn store(&self, filename: &str, data: &[u8]) -> Result<Option<String>>;
}

/// Keeps attachment names only.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataOnlySink;

impl AttachmentSink for MetadataOnlySink {
    async fn store(&self, _filename: &str, _data: &[u8]) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Behavior when a file with the target name already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Write to `name_1.ext`, `name_2.ext`, ... instead.
    #[default]
    Suffix,
    /// Replace the existing file.
    Overwrite,
}

/// Writes attachments into a directory.
///
/// The directory is created on first use.
#[derive(Debug)]
pub struct FsAttachmentSink {
    root: PathBuf,
    policy: CollisionPolicy,
    ready: OnceCell<()>,
}

impl FsAttachmentSink {
    /// Creates a sink writing into `root`.
    pub fn new(root: impl Into<PathBuf>, policy: CollisionPolicy) -> Self {
        Self {
            root: root.into(),
            policy,
            ready: OnceCell::new(),
        }
    }

    /// Returns the target directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn ensure_root(&self) -> io::Result<()> {
        self.ready
            .get_or_try_init(|| async {
                tokio::fs::create_dir_all(&self.root).await?;
                info!(directory = %self.root.display(), "Attachment directory ready");
                Ok::<(), io::Error>(())
            })
            .await?;
        Ok(())
    }

    async fn write_unique(&self, name: &str, data: &[u8]) -> io::Result<PathBuf> {
        let (stem, ext) = split_extension(name);

        for i in 0..=MAX_SUFFIX {
            let candidate = match (i, ext) {
                (0, _) => self.root.join(name),
                (_, "") => self.root.join(format!("{stem}_{i}")),
                (_, ext) => self.root.join(format!("{stem}_{i}.{ext}")),
            };

            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
                .await
            {
                Ok(file) => {
                    write_or_remove(&candidate, file, data).await?;
                    return Ok(candidate);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e),
            }
        }

        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free name for {name} in {}", self.root.display()),
        ))
    }
}

impl AttachmentSink for FsAttachmentSink {
    async fn store(&self, filename: &str, data: &[u8]) -> Result<Option<String>> {
        self.ensure_root().await?;

        let name = sanitize_filename(filename);
        let path = match self.policy {
            CollisionPolicy::Overwrite => {
                let path = self.root.join(&name);
                tokio::fs::write(&path, data).await?;
                path
            }
            CollisionPolicy::Suffix => self.write_unique(&name, data).await?,
        };

        debug!(path = %path.display(), bytes = data.len(), "Stored attachment");
        Ok(Some(path.display().to_string()))
    }
}

/// Writes `data` to a file just created at `path`.
///
/// On failure the file is removed so no partial content is left behind.
async fn write_or_remove<W>(path: &Path, mut file: W, data: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let written = async {
        file.write_all(data).await?;
        file.flush().await
    }
    .await;

    if let Err(e) = written {
        drop(file);
        if let Err(remove) = tokio::fs::remove_file(path).await {
            warn!(path = %path.display(), error = %remove, "Removing partial attachment failed");
        }
        return Err(e);
    }
    Ok(())
}

/// Turns an attachment name into a safe single path component.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);

    let cleaned: String = base
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .take(MAX_FILENAME_CHARS)
        .collect();

    let trimmed = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if trimmed.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        trimmed.to_string()
    }
}

fn split_extension(name: &str) -> (&str, &str) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, ext),
        _ => (name, ""),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\x\\a.doc"), "a.doc");
        assert_eq!(sanitize_filename("what?.txt"), "what_.txt");
        assert_eq!(sanitize_filename("tab\there"), "tab_here");
        assert_eq!(sanitize_filename(".."), "attachment");
        assert_eq!(sanitize_filename("  "), "attachment");
        assert_eq!(sanitize_filename("relatório.pdf"), "relatório.pdf");
        assert_eq!(sanitize_filename(&"a".repeat(400)).chars().count(), 150);
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("a.tar.gz"), ("a.tar", "gz"));
        assert_eq!(split_extension("README"), ("README", ""));
        assert_eq!(split_extension(".profile"), (".profile", ""));
    }

    #[tokio::test]
    async fn test_metadata_only_sink() {
        assert_eq!(MetadataOnlySink.store("a.pdf", b"x").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_creates_directory_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested").join("attachments");
        let sink = FsAttachmentSink::new(&root, CollisionPolicy::Suffix);
        assert!(!root.exists());

        let locator = sink.store("a.txt", b"hello").await.unwrap().unwrap();
        assert!(root.is_dir());
        assert_eq!(std::fs::read(&locator).unwrap(), b"hello");
        assert_eq!(sink.root(), root.as_path());
    }

    #[tokio::test]
    async fn test_suffix_policy_keeps_both() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FsAttachmentSink::new(dir.path(), CollisionPolicy::Suffix);

        let first = sink.store("doc.pdf", b"one").await.unwrap().unwrap();
        let second = sink.store("doc.pdf", b"two").await.unwrap().unwrap();
        let third = sink.store("doc.pdf", b"three").await.unwrap().unwrap();

        assert!(first.ends_with("doc.pdf"));
        assert!(second.ends_with("doc_1.pdf"));
        assert!(third.ends_with("doc_2.pdf"));
        assert_eq!(std::fs::read(&first).unwrap(), b"one");
        assert_eq!(std::fs::read(&second).unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_overwrite_policy_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FsAttachmentSink::new(dir.path(), CollisionPolicy::Overwrite);

        let first = sink.store("doc.pdf", b"one").await.unwrap().unwrap();
        let second = sink.store("doc.pdf", b"two").await.unwrap().unwrap();

        assert_eq!(first, second);
        assert_eq!(std::fs::read(&second).unwrap(), b"two");
    }

    /// Accepts a few bytes, then fails.
    struct ShortWriter {
        accepted: usize,
    }

    impl AsyncWrite for ShortWriter {
        fn poll_write(
            mut self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &[u8],
        ) -> std::task::Poll<io::Result<usize>> {
            if self.accepted >= 4 {
                return std::task::Poll::Ready(Err(io::Error::other("disk full")));
            }
            let n = buf.len().min(4 - self.accepted);
            self.accepted += n;
            std::task::Poll::Ready(Ok(n))
        }

        fn poll_flush(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_failed_write_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        std::fs::write(&path, b"part").unwrap();

        let err = write_or_remove(&path, ShortWriter { accepted: 0 }, b"far too long")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "disk full");
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_successful_write_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        let file = tokio::fs::File::create(&path).await.unwrap();

        write_or_remove(&path, file, b"hello").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_unwritable_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"").unwrap();

        let sink = FsAttachmentSink::new(blocker.join("sub"), CollisionPolicy::Suffix);
        assert!(sink.store("a.txt", b"x").await.is_err());
    }
}
