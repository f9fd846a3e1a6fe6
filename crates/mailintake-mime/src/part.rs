//! MIME part tree.
//!
//! A message is parsed into an immutable tree of [`MimeNode`]s. Parsing never
//! fails as a whole: a container whose structure cannot be understood becomes
//! a [`MimeNode::Malformed`] node and its siblings are unaffected.

use crate::content_type::ContentType;
use crate::encoding::{TransferEncoding, decode_transfer};
use crate::error::{Error, Result};
use crate::header::Headers;

/// Maximum nesting of `multipart/*` containers.
pub const MAX_DEPTH: usize = 64;

/// A leaf part: headers plus the undecoded body.
#[derive(Debug, Clone)]
pub struct Part {
    /// Part headers.
    pub headers: Headers,
    /// Part body (raw, still transfer-encoded).
    pub body: Vec<u8>,
}

impl Part {
    /// Creates a new part.
    #[must_use]
    pub const fn new(headers: Headers, body: Vec<u8>) -> Self {
        Self { headers, body }
    }

    /// Gets the content type, defaulting to `text/plain`.
    ///
    /// # Errors
    ///
    /// Returns an error if the content type header is present but invalid.
    pub fn content_type(&self) -> Result<ContentType> {
        self.headers
            .get("content-type")
            .map_or_else(|| Ok(ContentType::default()), ContentType::parse)
    }

    /// Gets the transfer encoding.
    #[must_use]
    pub fn transfer_encoding(&self) -> TransferEncoding {
        self.headers
            .get("content-transfer-encoding")
            .map_or(TransferEncoding::SevenBit, TransferEncoding::parse)
    }

    /// Reverses the transfer encoding of the body.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not valid for its transfer encoding.
    pub fn decode_body(&self) -> Result<Vec<u8>> {
        decode_transfer(&self.body, self.transfer_encoding())
    }
}

/// One node of a message's part tree.
#[derive(Debug, Clone)]
pub enum MimeNode {
    /// A content-bearing part.
    Leaf(Part),
    /// A `multipart/*` container with ordered children.
    Multipart {
        /// Container headers.
        headers: Headers,
        /// Container content type.
        content_type: ContentType,
        /// Child nodes in source order.
        children: Vec<Self>,
    },
    /// A container whose structure could not be parsed.
    Malformed {
        /// Headers of the node, as far as they could be read.
        headers: Headers,
        /// Why the node was rejected.
        reason: String,
    },
}

impl MimeNode {
    /// Parses a complete message (or part) into a tree.
    #[must_use]
    pub fn parse(raw: &[u8]) -> Self {
        parse_node(raw, 0)
    }

    /// Returns the node's headers.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        match self {
            Self::Leaf(part) => &part.headers,
            Self::Multipart { headers, .. } | Self::Malformed { headers, .. } => headers,
        }
    }

    /// Returns the children of a container, or an empty slice.
    #[must_use]
    pub fn children(&self) -> &[Self] {
        match self {
            Self::Multipart { children, .. } => children,
            _ => &[],
        }
    }
}

fn parse_node(raw: &[u8], depth: usize) -> MimeNode {
    let (header_block, body) = split_headers_body(raw);
    let headers = Headers::parse_bytes(header_block);

    let content_type = match headers.get("content-type").map(ContentType::parse) {
        Some(Ok(ct)) if ct.is_multipart() => ct,
        // Leaves keep their raw headers; the classifier reports bad types
        _ => return MimeNode::Leaf(Part::new(headers, body.to_vec())),
    };

    if depth >= MAX_DEPTH {
        return MimeNode::Malformed {
            headers,
            reason: format!("multipart nesting deeper than {MAX_DEPTH}"),
        };
    }

    let Some(boundary) = content_type.boundary().filter(|b| !b.is_empty()) else {
        return MimeNode::Malformed {
            headers,
            reason: Error::MissingBoundary.to_string(),
        };
    };

    match split_multipart(body, boundary) {
        Ok(parts) => {
            let children = parts.into_iter().map(|p| parse_node(p, depth + 1)).collect();
            MimeNode::Multipart {
                headers,
                content_type,
                children,
            }
        }
        Err(e) => MimeNode::Malformed {
            headers,
            reason: e.to_string(),
        },
    }
}

/// Returns `(line_without_terminator, next_line_start)` for the line at `pos`.
fn line_at(data: &[u8], pos: usize) -> (&[u8], usize) {
    let end = data[pos..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(data.len(), |i| pos + i);
    let next = if end < data.len() { end + 1 } else { end };
    let line = &data[pos..end];
    (line.strip_suffix(b"\r").unwrap_or(line), next)
}

/// Splits raw content at the first empty line.
///
/// Content whose first line is not a header is treated as all body.
fn split_headers_body(raw: &[u8]) -> (&[u8], &[u8]) {
    let (first, _) = line_at(raw, 0);
    if !first.is_empty() && !looks_like_header(first) {
        return (&[], raw);
    }

    let mut pos = 0;
    while pos < raw.len() {
        let (line, next) = line_at(raw, pos);
        if line.is_empty() {
            return (&raw[..pos], &raw[next..]);
        }
        pos = next;
    }

    (raw, &[])
}

fn looks_like_header(line: &[u8]) -> bool {
    line.iter()
        .position(|&b| b == b':')
        .is_some_and(|colon| colon > 0 && line[..colon].iter().all(|b| b.is_ascii_graphic()))
}

/// Splits a multipart body into the raw bytes of its parts.
///
/// The preamble and epilogue are discarded. A missing close delimiter is
/// tolerated; the last part then runs to the end of the body.
fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Result<Vec<&'a [u8]>> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();

    let mut parts = Vec::new();
    let mut current: Option<usize> = None;
    let mut found = false;
    let mut closed = false;
    let mut pos = 0;

    while pos < body.len() {
        let (line, next) = line_at(body, pos);
        let line = trim_trailing_blanks(line);

        if let Some(rest) = line.strip_prefix(delimiter)
            && (rest.is_empty() || rest == b"--")
        {
            found = true;
            if let Some(start) = current.take() {
                parts.push(&body[start..content_end(body, start, pos)]);
            }
            if rest == b"--" {
                closed = true;
                break;
            }
            current = Some(next);
        }

        pos = next;
    }

    if !found {
        return Err(Error::InvalidMultipart(format!(
            "no delimiter for boundary '{boundary}'"
        )));
    }

    if !closed && let Some(start) = current {
        tracing::debug!(boundary, "Multipart body has no close delimiter");
        parts.push(&body[start..]);
    }

    Ok(parts)
}

fn trim_trailing_blanks(line: &[u8]) -> &[u8] {
    let end = line
        .iter()
        .rposition(|b| !matches!(b, b' ' | b'\t'))
        .map_or(0, |i| i + 1);
    &line[..end]
}

/// The line break before a delimiter belongs to the delimiter.
fn content_end(body: &[u8], start: usize, delimiter_pos: usize) -> usize {
    let mut end = delimiter_pos;
    if end > start && body[end - 1] == b'\n' {
        end -= 1;
        if end > start && body[end - 1] == b'\r' {
            end -= 1;
        }
    }
    end
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn leaf_body(node: &MimeNode) -> &[u8] {
        match node {
            MimeNode::Leaf(part) => &part.body,
            other => panic!("expected leaf, got {other:?}"),
        }
    }

    #[test]
    fn test_single_part() {
        let node = MimeNode::parse(b"Subject: hi\r\nContent-Type: text/plain\r\n\r\nHello\r\n");
        assert_eq!(leaf_body(&node), b"Hello\r\n");
        assert_eq!(node.headers().get("subject"), Some("hi"));
    }

    #[test]
    fn test_no_headers() {
        let node = MimeNode::parse(b"just a body line\nsecond");
        assert_eq!(leaf_body(&node), b"just a body line\nsecond");
        assert!(node.headers().get("content-type").is_none());
    }

    #[test]
    fn test_multipart_split() {
        let raw = concat!(
            "Content-Type: multipart/mixed; boundary=\"XX\"\r\n",
            "\r\n",
            "preamble\r\n",
            "--XX\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "one\r\n",
            "--XX  \r\n",
            "\r\n",
            "two\r\n",
            "--XX--\r\n",
            "epilogue\r\n"
        );
        let node = MimeNode::parse(raw.as_bytes());
        let children = node.children();
        assert_eq!(children.len(), 2);
        assert_eq!(leaf_body(&children[0]), b"one");
        assert_eq!(leaf_body(&children[1]), b"two");
    }

    #[test]
    fn test_nested_multipart() {
        let raw = concat!(
            "Content-Type: multipart/mixed; boundary=outer\n",
            "\n",
            "--outer\n",
            "Content-Type: multipart/alternative; boundary=inner\n",
            "\n",
            "--inner\n",
            "Content-Type: text/plain\n",
            "\n",
            "plain\n",
            "--inner\n",
            "Content-Type: text/html\n",
            "\n",
            "<p>html</p>\n",
            "--inner--\n",
            "--outer\n",
            "Content-Type: application/pdf; name=a.pdf\n",
            "\n",
            "PDF\n",
            "--outer--\n"
        );
        let node = MimeNode::parse(raw.as_bytes());
        assert_eq!(node.children().len(), 2);
        let inner = &node.children()[0];
        assert_eq!(inner.children().len(), 2);
        assert_eq!(leaf_body(&inner.children()[1]), b"<p>html</p>");
    }

    #[test]
    fn test_boundary_prefix_is_not_delimiter() {
        let raw = concat!(
            "Content-Type: multipart/mixed; boundary=ab\n\n",
            "--ab\n\n",
            "--abc is content\n",
            "--ab--\n"
        );
        let node = MimeNode::parse(raw.as_bytes());
        assert_eq!(node.children().len(), 1);
        assert_eq!(leaf_body(&node.children()[0]), b"--abc is content");
    }

    #[test]
    fn test_missing_close_delimiter() {
        let raw = "Content-Type: multipart/mixed; boundary=b\n\n--b\n\nlast part\n";
        let node = MimeNode::parse(raw.as_bytes());
        assert_eq!(node.children().len(), 1);
        assert_eq!(leaf_body(&node.children()[0]), b"last part\n");
    }

    #[test]
    fn test_missing_boundary_is_malformed() {
        let node = MimeNode::parse(b"Content-Type: multipart/mixed\r\n\r\nbody");
        assert!(matches!(node, MimeNode::Malformed { .. }));
    }

    #[test]
    fn test_absent_delimiter_is_malformed() {
        let node = MimeNode::parse(b"Content-Type: multipart/mixed; boundary=zz\r\n\r\nno parts");
        let MimeNode::Malformed { reason, .. } = node else {
            panic!("expected malformed node");
        };
        assert!(reason.contains("zz"));
    }

    #[test]
    fn test_depth_guard() {
        let mut raw = String::new();
        for level in 0..=MAX_DEPTH {
            raw.push_str(&format!(
                "Content-Type: multipart/mixed; boundary=b{level}\n\n--b{level}\n"
            ));
        }
        raw.push_str("\nleaf\n");
        let mut node = MimeNode::parse(raw.as_bytes());
        let mut depth = 0;
        while let [child] = node.children() {
            node = child.clone();
            depth += 1;
        }
        assert_eq!(depth, MAX_DEPTH);
        assert!(matches!(node, MimeNode::Malformed { .. }));
    }

    #[test]
    fn test_part_decode_body() {
        let mut headers = Headers::new();
        headers.add("Content-Transfer-Encoding", "base64");
        let part = Part::new(headers, b"SGk=".to_vec());
        assert_eq!(part.decode_body().unwrap(), b"Hi");
        assert_eq!(part.content_type().unwrap().essence(), "text/plain");
    }
}
