//! MIME content type and disposition handling.

use std::collections::HashMap;

use crate::charset::CharsetResolver;
use crate::encoding::{decode_encoded_words, percent_decode};
use crate::error::{Error, Result};

/// Header parameters keyed by lower-cased name.
pub type Parameters = HashMap<String, String>;

/// MIME content type with parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Main type (e.g., "text", "image", "multipart").
    pub main_type: String,
    /// Subtype (e.g., "plain", "html", "jpeg").
    pub sub_type: String,
    /// Parameters (e.g., charset=utf-8, boundary=xxx).
    pub parameters: Parameters,
}

impl Default for ContentType {
    /// `text/plain` without a charset, the RFC 2045 default.
    fn default() -> Self {
        Self::new("text", "plain")
    }
}

impl ContentType {
    /// Creates a new content type.
    #[must_use]
    pub fn new(main_type: impl Into<String>, sub_type: impl Into<String>) -> Self {
        Self {
            main_type: main_type.into(),
            sub_type: sub_type.into(),
            parameters: HashMap::new(),
        }
    }

    /// Returns `type/subtype` in lower case, without parameters.
    #[must_use]
    pub fn essence(&self) -> String {
        format!("{}/{}", self.main_type, self.sub_type)
    }

    /// Returns the charset parameter if present.
    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.parameters.get("charset").map(String::as_str)
    }

    /// Returns the boundary parameter if present.
    #[must_use]
    pub fn boundary(&self) -> Option<&str> {
        self.parameters.get("boundary").map(String::as_str)
    }

    /// Checks if this is a multipart content type.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("multipart")
    }

    /// Parses a content type string.
    ///
    /// Format: `type/subtype; param1=value1; param2="value 2"`
    ///
    /// # Errors
    ///
    /// Returns an error if the `type/subtype` token is missing or incomplete.
    pub fn parse(s: &str) -> Result<Self> {
        let (type_str, params) = s.split_once(';').unwrap_or((s, ""));

        let (main_type, sub_type) = type_str
            .trim()
            .split_once('/')
            .ok_or_else(|| Error::InvalidContentType(format!("Missing subtype in '{s}'")))?;

        let main_type = main_type.trim().to_lowercase();
        let sub_type = sub_type.trim().to_lowercase();
        if main_type.is_empty() || sub_type.is_empty() {
            return Err(Error::InvalidContentType(format!("Empty type in '{s}'")));
        }

        Ok(Self {
            main_type,
            sub_type,
            parameters: parse_parameters(params),
        })
    }
}

/// Parsed `Content-Disposition` header.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContentDisposition {
    /// Disposition type, lower-cased ("inline", "attachment", ...).
    pub kind: String,
    /// Disposition parameters.
    pub parameters: Parameters,
}

impl ContentDisposition {
    /// Parses a disposition header value. Never fails.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let (kind, params) = s.split_once(';').unwrap_or((s, ""));
        Self {
            kind: kind.trim().to_lowercase(),
            parameters: parse_parameters(params),
        }
    }
}

/// Parses `; key=value; key="quoted; value"` parameter lists.
///
/// Keys are lower-cased; quoted values are unquoted and unescaped. Entries
/// without `=` are ignored.
#[must_use]
pub fn parse_parameters(s: &str) -> Parameters {
    let mut parameters = HashMap::new();
    let mut chars = s.chars().peekable();

    loop {
        // Skip separators
        while chars.next_if(|c| *c == ';' || c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(c) = chars.next_if(|c| *c != '=' && *c != ';') {
            key.push(c);
        }
        if chars.next_if_eq(&'=').is_none() {
            continue;
        }

        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        let mut value = String::new();
        if chars.next_if_eq(&'"').is_some() {
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => break,
                    _ => value.push(c),
                }
            }
            // Ignore junk between closing quote and the next separator
            while chars.next_if(|c| *c != ';').is_some() {}
        } else {
            while let Some(c) = chars.next_if(|c| *c != ';') {
                value.push(c);
            }
            value = value.trim_end().to_string();
        }

        let key = key.trim().to_lowercase();
        if !key.is_empty() {
            parameters.insert(key, value);
        }
    }

    parameters
}

/// Reads a parameter that may use RFC 2231 or RFC 2047 encoding.
///
/// Resolution order: `name*` (extended), `name*0*`/`name*0` continuations,
/// then the plain `name`, whose value may contain encoded-words.
#[must_use]
pub fn extended_parameter(
    parameters: &Parameters,
    name: &str,
    resolver: &CharsetResolver,
) -> Option<String> {
    if let Some(value) = parameters.get(&format!("{name}*")) {
        return Some(decode_extended_value(value, resolver));
    }

    if let Some(value) = continued_parameter(parameters, name, resolver) {
        return Some(value);
    }

    parameters
        .get(name)
        .map(|value| decode_encoded_words(value, resolver))
}

/// Decodes `charset'language'percent-encoded` values.
fn decode_extended_value(value: &str, resolver: &CharsetResolver) -> String {
    let mut pieces = value.splitn(3, '\'');
    match (pieces.next(), pieces.next(), pieces.next()) {
        (Some(charset), Some(_language), Some(encoded)) => {
            resolver.decode(charset, &percent_decode(encoded))
        }
        _ => resolver.decode("", &percent_decode(value)),
    }
}

/// Joins `name*0`, `name*1*`, ... segments.
fn continued_parameter(
    parameters: &Parameters,
    name: &str,
    resolver: &CharsetResolver,
) -> Option<String> {
    let mut bytes = Vec::new();
    let mut charset = String::new();
    let mut index = 0;

    loop {
        if let Some(segment) = parameters.get(&format!("{name}*{index}*")) {
            let encoded = if index == 0 {
                let mut pieces = segment.splitn(3, '\'');
                match (pieces.next(), pieces.next(), pieces.next()) {
                    (Some(cs), Some(_), Some(rest)) => {
                        charset = cs.to_string();
                        rest
                    }
                    _ => segment.as_str(),
                }
            } else {
                segment.as_str()
            };
            bytes.extend(percent_decode(encoded));
        } else if let Some(segment) = parameters.get(&format!("{name}*{index}")) {
            bytes.extend_from_slice(segment.as_bytes());
        } else {
            break;
        }
        index += 1;
    }

    if index == 0 {
        return None;
    }

    if charset.is_empty() {
        // Plain segments carry no charset; they are ASCII or raw UTF-8
        return Some(String::from_utf8_lossy(&bytes).into_owned());
    }
    Some(resolver.decode(&charset, &bytes))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_parse() {
        let ct = ContentType::parse("Text/Plain; charset=utf-8").unwrap();
        assert_eq!(ct.main_type, "text");
        assert_eq!(ct.sub_type, "plain");
        assert_eq!(ct.charset(), Some("utf-8"));
        assert_eq!(ct.essence(), "text/plain");
    }

    #[test]
    fn test_content_type_parse_quoted() {
        let ct = ContentType::parse("multipart/mixed; boundary=\"----=_Part;123\"").unwrap();
        assert!(ct.is_multipart());
        assert_eq!(ct.boundary(), Some("----=_Part;123"));
    }

    #[test]
    fn test_content_type_parse_invalid() {
        assert!(ContentType::parse("garbage").is_err());
        assert!(ContentType::parse("/plain").is_err());
    }

    #[test]
    fn test_parse_parameters_spacing_and_escapes() {
        let params = parse_parameters(" ; Name = \"a \\\"b\\\"\" ;flag; size=12 ");
        assert_eq!(params.get("name").map(String::as_str), Some("a \"b\""));
        assert_eq!(params.get("size").map(String::as_str), Some("12"));
        assert!(!params.contains_key("flag"));
    }

    #[test]
    fn test_disposition_parse() {
        let cd = ContentDisposition::parse("Attachment; filename=\"report.pdf\"");
        assert_eq!(cd.kind, "attachment");
        assert_eq!(cd.parameters.get("filename").map(String::as_str), Some("report.pdf"));
    }

    #[test]
    fn test_extended_parameter_rfc2231() {
        let resolver = CharsetResolver::new();
        let params = parse_parameters("filename*=UTF-8''na%C3%AFve.txt");
        assert_eq!(
            extended_parameter(&params, "filename", &resolver).as_deref(),
            Some("naïve.txt")
        );
    }

    #[test]
    fn test_extended_parameter_continuations() {
        let resolver = CharsetResolver::new();
        let params =
            parse_parameters("filename*0*=iso-8859-1''caf%E9; filename*1=\"_menu\"; filename*2=.txt");
        assert_eq!(
            extended_parameter(&params, "filename", &resolver).as_deref(),
            Some("café_menu.txt")
        );
    }

    #[test]
    fn test_extended_parameter_encoded_word() {
        let resolver = CharsetResolver::new();
        let params = parse_parameters("name=\"=?utf-8?B?w6l0w6kucGRm?=\"");
        assert_eq!(extended_parameter(&params, "name", &resolver).as_deref(), Some("été.pdf"));
        assert_eq!(extended_parameter(&params, "filename", &resolver), None);
    }
}
