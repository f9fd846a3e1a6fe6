//! Part classification.
//!
//! Every leaf part is classified exactly once as either inline content or an
//! attachment. A part is an attachment if and only if it declares a filename.

use crate::charset::CharsetResolver;
use crate::content_type::{ContentDisposition, ContentType, extended_parameter};
use crate::encoding::TransferEncoding;
use crate::error::Result;
use crate::part::Part;

/// An inline (displayable) part.
#[derive(Debug, Clone)]
pub struct InlinePart<'a> {
    /// Lower-cased `Content-Type` header value, parameters included.
    pub mime_type: String,
    /// Parsed content type.
    pub content_type: ContentType,
    /// Declared charset, trimmed of quotes and whitespace.
    pub charset: Option<String>,
    /// Declared transfer encoding.
    pub transfer_encoding: TransferEncoding,
    /// Undecoded body.
    pub body: &'a [u8],
}

impl InlinePart<'_> {
    /// Returns true for `text/plain` content.
    #[must_use]
    pub fn is_plain_text(&self) -> bool {
        self.mime_type.contains("text/plain")
    }

    /// Returns true for `text/html` content.
    #[must_use]
    pub fn is_html(&self) -> bool {
        self.mime_type.contains("text/html")
    }
}

/// A part to be stored as a file.
#[derive(Debug, Clone)]
pub struct AttachmentPart<'a> {
    /// Declared filename, decoded.
    pub filename: String,
    /// Content type, `application/octet-stream` when unusable.
    pub content_type: ContentType,
    /// Declared transfer encoding.
    pub transfer_encoding: TransferEncoding,
    /// Undecoded body.
    pub body: &'a [u8],
}

/// Result of classifying one leaf part.
#[derive(Debug, Clone)]
pub enum ClassifiedPart<'a> {
    /// Displayable content.
    Inline(InlinePart<'a>),
    /// Downloadable file.
    Attachment(AttachmentPart<'a>),
}

/// Classifies a leaf part.
///
/// The filename is looked up in the `Content-Disposition` `filename`
/// parameter first, then in the `Content-Type` `name` parameter.
///
/// # Errors
///
/// Returns a parse error if an inline part has an invalid content type.
pub fn classify<'a>(part: &'a Part, resolver: &CharsetResolver) -> Result<ClassifiedPart<'a>> {
    let transfer_encoding = part.transfer_encoding();
    let content_type = part.content_type();

    if let Some(filename) = declared_filename(part, content_type.as_ref().ok(), resolver) {
        let content_type = content_type
            .unwrap_or_else(|_| ContentType::new("application", "octet-stream"));
        return Ok(ClassifiedPart::Attachment(AttachmentPart {
            filename,
            content_type,
            transfer_encoding,
            body: &part.body,
        }));
    }

    let content_type = content_type?;
    let mime_type = part
        .headers
        .get("content-type")
        .map_or_else(|| content_type.essence(), str::to_lowercase);
    let charset = content_type
        .charset()
        .map(|c| c.trim_matches(|ch: char| ch == '"' || ch.is_whitespace()).to_string())
        .filter(|c| !c.is_empty());

    Ok(ClassifiedPart::Inline(InlinePart {
        mime_type,
        content_type,
        charset,
        transfer_encoding,
        body: &part.body,
    }))
}

fn declared_filename(
    part: &Part,
    content_type: Option<&ContentType>,
    resolver: &CharsetResolver,
) -> Option<String> {
    let from_disposition = part
        .headers
        .get("content-disposition")
        .map(ContentDisposition::parse)
        .and_then(|cd| extended_parameter(&cd.parameters, "filename", resolver));

    from_disposition
        .or_else(|| content_type.and_then(|ct| extended_parameter(&ct.parameters, "name", resolver)))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}
