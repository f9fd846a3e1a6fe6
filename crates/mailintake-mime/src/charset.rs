//! Character set resolution.
//!
//! Maps a declared `charset` parameter to a decoding transform. Resolution
//! never fails: empty, unknown or unsupported labels degrade to a fixed
//! fallback transform (ISO-8859-1 unless configured otherwise).

use encoding_rs::{Encoding, WINDOWS_1252};

/// A decoding transform from bytes to text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    /// ISO-8859-1. Every byte maps to the code point of the same value.
    Latin1,
    /// A decoder provided by `encoding_rs`.
    Encoding(&'static Encoding),
}

impl Charset {
    /// Windows-1252, the superset of Latin-1 most mailers actually emit.
    pub const WINDOWS_1252: Self = Self::Encoding(WINDOWS_1252);

    /// Canonical name of the transform.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Latin1 => "iso-8859-1",
            Self::Encoding(encoding) => encoding.name(),
        }
    }

    /// Decodes bytes into text.
    ///
    /// Malformed sequences become U+FFFD; this never fails.
    #[must_use]
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Self::Latin1 => bytes.iter().copied().map(char::from).collect(),
            Self::Encoding(encoding) => {
                let (text, had_errors) = encoding.decode_with_bom_removal(bytes);
                if had_errors {
                    tracing::debug!(
                        charset = encoding.name(),
                        "Malformed sequences replaced while decoding"
                    );
                }
                text.into_owned()
            }
        }
    }
}

/// Resolves declared charset names to decoding transforms.
///
/// Passed explicitly to the walker; there is no process-wide registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharsetResolver {
    fallback: Charset,
}

impl Default for CharsetResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl CharsetResolver {
    /// Creates a resolver that falls back to ISO-8859-1.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            fallback: Charset::Latin1,
        }
    }

    /// Creates a resolver with a custom fallback transform.
    #[must_use]
    pub const fn with_fallback(fallback: Charset) -> Self {
        Self { fallback }
    }

    /// Creates a resolver whose fallback is looked up by label.
    ///
    /// An unusable label keeps ISO-8859-1 as the fallback.
    #[must_use]
    pub fn with_fallback_label(label: &str) -> Self {
        let fallback = lookup(&normalize(label)).unwrap_or(Charset::Latin1);
        Self { fallback }
    }

    /// Returns the fallback transform.
    #[must_use]
    pub const fn fallback(&self) -> Charset {
        self.fallback
    }

    /// Resolves a charset name, case-insensitively.
    ///
    /// Surrounding quotes and whitespace are ignored.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Charset {
        let label = normalize(name);
        if label.is_empty() {
            tracing::debug!(fallback = self.fallback.name(), "No charset declared");
            return self.fallback;
        }

        lookup(&label).unwrap_or_else(|| {
            tracing::warn!(
                charset = %label,
                fallback = self.fallback.name(),
                "Unsupported charset, using fallback"
            );
            self.fallback
        })
    }

    /// Resolves `name` and decodes `bytes` with the result.
    #[must_use]
    pub fn decode(&self, name: &str, bytes: &[u8]) -> String {
        self.resolve(name).decode(bytes)
    }
}

fn lookup(label: &str) -> Option<Charset> {
    match label {
        "" => None,
        "iso-8859-1" | "latin1" => Some(Charset::Latin1),
        "windows-1252" => Some(Charset::WINDOWS_1252),
        other => Encoding::for_label_no_replacement(other.as_bytes()).map(Charset::Encoding),
    }
}

fn normalize(name: &str) -> String {
    name.trim_matches(|c: char| c == '"' || c == '\'' || c.is_whitespace())
        .to_ascii_lowercase()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_windows_1252_curly_quotes() {
        let resolver = CharsetResolver::new();
        let text = resolver.decode("windows-1252", b"\x93quoted\x94");
        assert_eq!(text, "\u{201C}quoted\u{201D}");
        assert!(!text.contains('\u{FFFD}'));
    }

    #[test]
    fn test_aliases_case_insensitive() {
        let resolver = CharsetResolver::new();
        assert_eq!(resolver.resolve("ISO-8859-1"), Charset::Latin1);
        assert_eq!(resolver.resolve("Latin1"), Charset::Latin1);
        assert_eq!(resolver.resolve("Windows-1252"), Charset::WINDOWS_1252);
    }

    #[test]
    fn test_quoted_name() {
        let resolver = CharsetResolver::new();
        assert_eq!(resolver.resolve(" \"windows-1252\" "), Charset::WINDOWS_1252);
    }

    #[test]
    fn test_empty_and_unknown_fall_back() {
        let resolver = CharsetResolver::new();
        assert_eq!(resolver.resolve(""), Charset::Latin1);
        assert_eq!(resolver.resolve("x-no-such-charset"), Charset::Latin1);
        assert_eq!(resolver.decode("", b"caf\xe9"), "café");
    }

    #[test]
    fn test_known_labels_use_encoding_rs() {
        let resolver = CharsetResolver::new();
        assert_eq!(resolver.resolve("utf-8").name(), "UTF-8");
        assert_eq!(resolver.decode("UTF-8", "Héllo".as_bytes()), "Héllo");
        assert_eq!(resolver.decode("koi8-r", b"\xf0\xd2\xc9"), "При");
    }

    #[test]
    fn test_custom_fallback() {
        let resolver = CharsetResolver::with_fallback_label("utf-8");
        assert_eq!(resolver.fallback().name(), "UTF-8");
        assert_eq!(resolver.resolve("bogus").name(), "UTF-8");

        let resolver = CharsetResolver::with_fallback_label("bogus");
        assert_eq!(resolver.fallback(), Charset::Latin1);
    }

    #[test]
    fn test_latin1_maps_every_byte() {
        let bytes: Vec<u8> = (0..=255).collect();
        let text = Charset::Latin1.decode(&bytes);
        assert_eq!(text.chars().count(), 256);
        assert_eq!(text.chars().last().unwrap(), '\u{FF}');
    }
}
