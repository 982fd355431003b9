use std::borrow::Cow;

/// Removes markup tags from an HTML fragment, keeping only text nodes.
///
/// Entities are left untouched; decode afterwards with [`decode_entities`]
/// so that escaped angle brackets are not mistaken for tags.
pub fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    let mut quote: Option<char> = None;

    for c in html.chars() {
        match (in_tag, quote, c) {
            (false, _, '<') => in_tag = true,
            (false, _, _) => out.push(c),
            (true, None, '>') => in_tag = false,
            (true, None, '"' | '\'') => quote = Some(c),
            (true, Some(q), _) if q == c => quote = None,
            (true, _, _) => {}
        }
    }

    out
}

/// Decodes HTML character references (named, decimal and hexadecimal).
///
/// Ampersands that do not start a known reference are kept literally.
pub fn decode_entities(s: &str) -> Cow<'_, str> {
    html_escape::decode_html_entities(s)
}

/// Escapes `<`, `>` and `&` for inclusion in HTML text.
pub fn escape_html(s: &str) -> Cow<'_, str> {
    html_escape::encode_text(s)
}

/// Escapes a value for a double-quoted HTML attribute.
pub fn escape_attr(s: &str) -> Cow<'_, str> {
    html_escape::encode_double_quoted_attribute(s)
}

/// Turns a markup title into plain text: tags stripped, entities decoded,
/// whitespace trimmed.
pub fn html_to_text(html: &str) -> String {
    decode_entities(&strip_tags(html)).trim().to_string()
}

/// Strips C0 control characters (other than tab, newline and carriage return)
/// and DEL from feed-supplied text.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let is_control = |c: char| (c < ' ' && !matches!(c, '\t' | '\n' | '\r')) || c == '\u{7f}';

    if !s.chars().any(is_control) {
        return Cow::Borrowed(s);
    }

    Cow::Owned(s.chars().filter(|c| !is_control(*c)).collect())
}

/// Number of visible characters in an HTML fragment.
pub fn text_length(html: &str) -> usize {
    decode_entities(&strip_tags(html)).trim().chars().count()
}
