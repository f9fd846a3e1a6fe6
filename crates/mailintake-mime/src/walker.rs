//! MIME tree traversal and body-text selection.
//!
//! The walker visits leaf parts depth-first in source order and returns an
//! [`Extraction`]: one canonical body text plus the attachments found, in
//! order. Plain text always wins over HTML regardless of where the parts sit
//! in the tree; HTML-derived text is only a placeholder until a non-empty
//! `text/plain` part shows up.

use crate::charset::CharsetResolver;
use crate::classify::{AttachmentPart, ClassifiedPart, InlinePart, classify};
use crate::encoding::decode_transfer_lossy;
use crate::html::extract_text;
use crate::part::MimeNode;

/// Where the canonical text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextSource {
    /// No textual part produced any text.
    #[default]
    None,
    /// Text extracted from an HTML part.
    Html,
    /// A `text/plain` part.
    Plain,
}

/// An attachment found during traversal, transfer-decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedAttachment {
    /// Declared filename.
    pub filename: String,
    /// `type/subtype` of the part.
    pub content_type: String,
    /// Decoded bytes.
    pub data: Vec<u8>,
}

/// Result of walking one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Canonical body text (empty when none was found).
    pub text: String,
    /// Origin of [`Extraction::text`].
    pub text_source: TextSource,
    /// Attachments in traversal order, duplicates included.
    pub attachments: Vec<ExtractedAttachment>,
    /// Parts skipped because they could not be parsed.
    pub skipped_parts: usize,
}

impl Extraction {
    fn offer_plain(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() || self.text_source == TextSource::Plain {
            return;
        }
        self.text = text.to_string();
        self.text_source = TextSource::Plain;
    }

    const fn wants_html(&self) -> bool {
        matches!(self.text_source, TextSource::None)
    }

    fn offer_html(&mut self, text: String) {
        if self.wants_html() && !text.is_empty() {
            self.text = text;
            self.text_source = TextSource::Html;
        }
    }
}

/// Walks MIME trees with a given charset resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct Walker {
    resolver: CharsetResolver,
}

impl Walker {
    /// Creates a walker.
    #[must_use]
    pub const fn new(resolver: CharsetResolver) -> Self {
        Self { resolver }
    }

    /// Returns the resolver used for body and header decoding.
    #[must_use]
    pub const fn resolver(&self) -> &CharsetResolver {
        &self.resolver
    }

    /// Parses and walks a raw message.
    #[must_use]
    pub fn walk_bytes(&self, raw: &[u8]) -> Extraction {
        self.walk(&MimeNode::parse(raw))
    }

    /// Walks a parsed tree.
    ///
    /// Malformed containers and unclassifiable parts are logged and skipped.
    #[must_use]
    pub fn walk(&self, root: &MimeNode) -> Extraction {
        let mut extraction = Extraction::default();
        let mut stack = vec![root];

        while let Some(node) = stack.pop() {
            match node {
                MimeNode::Multipart { children, .. } => stack.extend(children.iter().rev()),
                MimeNode::Malformed { reason, .. } => {
                    tracing::warn!(reason = %reason, "Skipping malformed MIME part");
                    extraction.skipped_parts += 1;
                }
                MimeNode::Leaf(part) => match classify(part, &self.resolver) {
                    Ok(ClassifiedPart::Attachment(attachment)) => {
                        extraction.attachments.push(decode_attachment(&attachment));
                    }
                    Ok(ClassifiedPart::Inline(inline)) => self.visit_inline(&inline, &mut extraction),
                    Err(e) => {
                        tracing::warn!(error = %e, "Skipping unreadable MIME part");
                        extraction.skipped_parts += 1;
                    }
                },
            }
        }

        extraction
    }

    fn visit_inline(&self, part: &InlinePart<'_>, extraction: &mut Extraction) {
        let is_plain = part.is_plain_text();
        if !is_plain && !(part.is_html() && extraction.wants_html()) {
            tracing::debug!(mime_type = %part.mime_type, "Ignoring inline part");
            return;
        }

        let bytes = decode_transfer_lossy(part.body, part.transfer_encoding);
        let text = self
            .resolver
            .decode(part.charset.as_deref().unwrap_or_default(), &bytes);

        if is_plain {
            extraction.offer_plain(&text);
        } else {
            extraction.offer_html(extract_text(&text));
        }
    }
}

fn decode_attachment(part: &AttachmentPart<'_>) -> ExtractedAttachment {
    ExtractedAttachment {
        filename: part.filename.clone(),
        content_type: part.content_type.essence(),
        data: decode_transfer_lossy(part.body, part.transfer_encoding),
    }
}
