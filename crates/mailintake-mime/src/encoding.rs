//! Transfer and header decoding.
//!
//! Reverses Base64 and Quoted-Printable content transfer encodings (RFC 2045)
//! and decodes RFC 2047 encoded-words and RFC 2231 extended parameter values.

use std::fmt;

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

use crate::charset::CharsetResolver;
use crate::error::{Error, Result};

/// Base64 engine that tolerates missing padding and stray trailing bits.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    #[default]
    SevenBit,
    /// 8-bit binary.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses a `Content-Transfer-Encoding` token.
    ///
    /// Unknown tokens are treated as identity encodings.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::SevenBit,
        }
    }

    /// Returns true if bytes pass through unchanged.
    #[must_use]
    pub const fn is_identity(self) -> bool {
        !matches!(self, Self::Base64 | Self::QuotedPrintable)
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
            Self::Base64 => write!(f, "base64"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// Reverses a transfer encoding.
///
/// # Errors
///
/// Returns a decode error if the payload is not valid for its encoding.
pub fn decode_transfer(data: &[u8], encoding: TransferEncoding) -> Result<Vec<u8>> {
    match encoding {
        TransferEncoding::Base64 => decode_base64(data),
        TransferEncoding::QuotedPrintable => decode_quoted_printable(data),
        _ => Ok(data.to_vec()),
    }
}

/// Reverses a transfer encoding, keeping the original bytes on failure.
///
/// The failure is logged so one bad payload never aborts a message.
#[must_use]
pub fn decode_transfer_lossy(data: &[u8], encoding: TransferEncoding) -> Vec<u8> {
    decode_transfer(data, encoding).unwrap_or_else(|e| {
        tracing::warn!(
            encoding = %encoding,
            error = %e,
            "Transfer decoding failed, using undecoded bytes"
        );
        data.to_vec()
    })
}

/// Decodes Base64 data, ignoring embedded whitespace and line breaks.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &[u8]) -> Result<Vec<u8>> {
    let cleaned: Vec<u8> = data
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    LENIENT_BASE64.decode(cleaned).map_err(Into::into)
}

/// Decodes Quoted-Printable data (RFC 2045).
///
/// Soft line breaks are removed and trailing whitespace on encoded lines is
/// dropped.
///
/// # Errors
///
/// Returns an error if the input contains invalid escape sequences.
pub fn decode_quoted_printable(data: &[u8]) -> Result<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len());
    let mut i = 0;

    while i < data.len() {
        match data[i] {
            b'=' => {
                let rest = &data[i + 1..];
                let ws = leading_blanks(rest);
                match rest.get(ws) {
                    // Soft line break
                    Some(b'\r') if rest.get(ws + 1) == Some(&b'\n') => {
                        i += ws + 3;
                        continue;
                    }
                    Some(b'\n') => {
                        i += ws + 2;
                        continue;
                    }
                    None => break,
                    Some(_) => {}
                }

                match (rest.first().and_then(hex_value), rest.get(1).and_then(hex_value)) {
                    (Some(high), Some(low)) => {
                        result.push((high << 4) | low);
                        i += 3;
                    }
                    _ => {
                        return Err(Error::InvalidEncoding(format!(
                            "Invalid escape sequence at byte {i}"
                        )));
                    }
                }
            }
            b' ' | b'\t' => {
                let ws = leading_blanks(&data[i..]);
                let after = &data[i + ws..];
                // Trailing whitespace was added in transport
                if !(after.is_empty() || after.starts_with(b"\r\n") || after.starts_with(b"\n")) {
                    result.extend_from_slice(&data[i..i + ws]);
                }
                i += ws;
            }
            byte => {
                result.push(byte);
                i += 1;
            }
        }
    }

    Ok(result)
}

fn leading_blanks(data: &[u8]) -> usize {
    data.iter().take_while(|b| matches!(b, b' ' | b'\t')).count()
}

fn hex_value(byte: &u8) -> Option<u8> {
    char::from(*byte)
        .to_digit(16)
        .and_then(|d| u8::try_from(d).ok())
}

/// Converts raw header bytes to text without losing any byte.
///
/// UTF-8 is accepted as is; any other 8-bit content is read as Latin-1.
#[must_use]
pub fn raw_header_text(raw: &[u8]) -> String {
    match std::str::from_utf8(raw) {
        Ok(text) => text.to_string(),
        Err(_) => raw.iter().copied().map(char::from).collect(),
    }
}

/// Decodes RFC 2047 encoded-words embedded in a header value.
///
/// Whitespace between adjacent encoded-words is removed. Anything that does
/// not parse as an encoded-word is kept verbatim.
#[must_use]
pub fn decode_encoded_words(value: &str, resolver: &CharsetResolver) -> String {
    let mut result = String::with_capacity(value.len());
    let mut rest = value;
    let mut after_word = false;

    while let Some(start) = rest.find("=?") {
        let (before, candidate) = rest.split_at(start);
        if let Some((decoded, consumed)) = decode_encoded_word(candidate, resolver) {
            if !(after_word && before.trim().is_empty()) {
                result.push_str(before);
            }
            result.push_str(&decoded);
            rest = &candidate[consumed..];
            after_word = true;
        } else {
            result.push_str(before);
            result.push_str("=?");
            rest = &candidate[2..];
            after_word = false;
        }
    }

    result.push_str(rest);
    result
}

/// Decodes one `=?charset?enc?text?=` word at the start of `s`.
///
/// Returns the decoded text and the number of bytes consumed.
fn decode_encoded_word(s: &str, resolver: &CharsetResolver) -> Option<(String, usize)> {
    let body = s.strip_prefix("=?")?;
    let (charset, after) = body.split_once('?')?;
    let (encoding, after) = after.split_once('?')?;
    let end = after.find("?=")?;
    let text = &after[..end];

    if charset.is_empty() || text.contains(char::is_whitespace) {
        return None;
    }

    let bytes = match encoding {
        "B" | "b" => decode_base64(text.as_bytes()).ok()?,
        "Q" | "q" => decode_quoted_printable(text.replace('_', " ").as_bytes()).ok()?,
        _ => return None,
    };

    // RFC 2231 allows a language suffix: charset*lang
    let charset = charset.split_once('*').map_or(charset, |(c, _)| c);
    let consumed = s.len() - after[end + 2..].len();
    Some((resolver.decode(charset, &bytes), consumed))
}

/// Decodes percent-encoded octets of an RFC 2231 value.
///
/// Malformed escapes are kept literally.
#[must_use]
pub fn percent_decode(value: &str) -> Vec<u8> {
    let bytes = value.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%'
            && let (Some(high), Some(low)) = (
                bytes.get(i + 1).and_then(hex_value),
                bytes.get(i + 2).and_then(hex_value),
            )
        {
            result.push((high << 4) | low);
            i += 3;
        } else {
            result.push(bytes[i]);
            i += 1;
        }
    }

    result
}
