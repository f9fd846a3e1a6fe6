//! Plain text extraction from HTML bodies.
//!
//! Concatenates the document's text nodes in order. Markup, comments,
//! declarations and the contents of `<script>`/`<style>` are dropped and
//! character references are decoded. Malformed markup never fails: an
//! unterminated tag or comment swallows the rest of the input.

/// Elements whose content is raw text rather than document text.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Extracts the trimmed text content of an HTML document.
#[must_use]
pub fn extract_text(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(lt) = rest.find('<') {
        push_text(&mut text, &rest[..lt]);
        let markup = &rest[lt..];

        rest = if let Some(comment) = markup.strip_prefix("<!--") {
            comment.find("-->").map_or("", |end| &comment[end + 3..])
        } else if markup.starts_with("<!") || markup.starts_with("<?") {
            skip_tag(markup)
        } else if let Some((name, closing)) = tag_name(markup) {
            let after = skip_tag(markup);
            let raw = RAW_TEXT_ELEMENTS
                .iter()
                .any(|e| e.eq_ignore_ascii_case(name));
            if raw && !closing {
                skip_raw_text(after, name)
            } else {
                after
            }
        } else {
            // A '<' that does not open a tag is text
            text.push('<');
            &markup[1..]
        };
    }

    push_text(&mut text, rest);
    text.trim().to_string()
}

/// Returns the element name and whether the tag is a closing tag.
fn tag_name(markup: &str) -> Option<(&str, bool)> {
    let inner = &markup[1..];
    let (inner, closing) = inner
        .strip_prefix('/')
        .map_or((inner, false), |s| (s, true));

    if !inner.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return None;
    }
    let end = inner
        .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
        .unwrap_or(inner.len());
    Some((&inner[..end], closing))
}

/// Skips past the `>` that closes the tag starting at `markup`.
///
/// Quoted attribute values may contain `>`.
fn skip_tag(markup: &str) -> &str {
    let mut quote: Option<char> = None;
    for (i, c) in markup.char_indices().skip(1) {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '>') => return &markup[i + 1..],
            (None, _) => {}
        }
    }
    ""
}

/// Skips raw text up to and including `</name>`.
fn skip_raw_text<'a>(html: &'a str, name: &str) -> &'a str {
    let lower = html.to_ascii_lowercase();
    let close = format!("</{}", name.to_ascii_lowercase());
    lower
        .find(&close)
        .map_or("", |start| skip_tag(&html[start..]))
}

/// Appends a text run, decoding character references.
///
/// Every HTML5 named reference is known; unknown names and malformed
/// references are kept as written.
fn push_text(out: &mut String, raw: &str) {
    html_escape::decode_html_entities_to_string(raw, out);
}
