//! Syndication format decoders.
//!
//! [`parse_feed`] turns raw response bytes into a [`ParsedFeed`]. The dialect is
//! picked by [`detect_format`] from structural markers (the root element name,
//! or a JSON object), then handed to the matching decoder:
//!
//! - [`atom`] - Atom 1.0 (and the media RSS extension)
//! - [`rss`] - RSS 2.0, 0.9x and RDF/RSS 1.0
//! - [`json`] - JSON Feed 1.0/1.1
//!
//! Every decoder produces entries with a content hash (see [`entry_hash`]) used
//! by storage to skip entries that were already seen.

mod atom;
mod date;
mod json;
mod media;
mod rss;
mod xml;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::content::rewrite::{convert_text_links, nl2br};
use crate::util::{escape_html, strip_control_chars};

// ============================================================================
// Types
// ============================================================================

/// Feed-level metadata plus its entries, as decoded from one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFeed {
    pub title: String,
    /// URL declared by the document itself (`rel="self"`), may be empty.
    pub feed_url: String,
    pub site_url: String,
    pub entries: Vec<ParsedEntry>,
}

/// One entry in canonical form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedEntry {
    /// SHA-256 hex digest over (URL or title) and content.
    pub hash: String,
    pub title: String,
    pub url: String,
    pub comments_url: String,
    pub author: String,
    pub date: Option<DateTime<Utc>>,
    /// HTML content.
    pub content: String,
    pub enclosures: Vec<Enclosure>,
}

/// Media attachment referenced by an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enclosure {
    pub url: String,
    pub mime_type: String,
    /// Size in bytes, 0 when unknown.
    pub size: i64,
}

/// Dialect detected from a document's structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    Atom,
    Rss,
    Rdf,
    Json,
    Unknown,
}

impl FeedFormat {
    /// Subscription type reported to callers. RDF feeds report as `rss`.
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedFormat::Atom => "atom",
            FeedFormat::Rss | FeedFormat::Rdf => "rss",
            FeedFormat::Json => "json",
            FeedFormat::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for FeedFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    /// Neither an XML dialect nor a JSON feed.
    #[error("unsupported feed format")]
    UnknownFormat,
    /// The XML document is not well-formed.
    #[error("invalid XML document: {0}")]
    Xml(String),
    /// The JSON document does not match the JSON Feed shape.
    #[error("invalid JSON feed: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Entry Points
// ============================================================================

/// Decodes a feed document.
///
/// `base_url` is the URL the document was fetched from (after redirects). It is
/// used to resolve relative links when the feed does not declare a site URL.
///
/// # Errors
///
/// Returns [`ParseError::UnknownFormat`] when no dialect is recognized, and
/// [`ParseError::Xml`] / [`ParseError::Json`] when the top-level document is
/// malformed. Problems inside individual entries never fail the whole feed.
pub fn parse_feed(base_url: &str, bytes: &[u8]) -> Result<ParsedFeed, ParseError> {
    parse_text(base_url, &decode_document(bytes))
}

/// Like [`parse_feed`] for a document already decoded to UTF-8 (for example
/// with the charset announced by the HTTP response).
pub fn parse_text(base_url: &str, text: &str) -> Result<ParsedFeed, ParseError> {
    let text = text.trim_start_matches('\u{feff}').trim_start();

    let mut feed = match detect_format(text) {
        FeedFormat::Atom => atom::parse(base_url, text)?,
        FeedFormat::Rss | FeedFormat::Rdf => rss::parse(base_url, text)?,
        FeedFormat::Json => json::parse(base_url, text)?,
        FeedFormat::Unknown => return Err(ParseError::UnknownFormat),
    };

    feed.title = strip_control_chars(feed.title.trim()).into_owned();
    for entry in &mut feed.entries {
        entry.title = strip_control_chars(&entry.title).into_owned();
    }

    Ok(feed)
}

/// Guesses the dialect of an already-decoded document.
pub fn detect_format(text: &str) -> FeedFormat {
    let text = text.trim_start_matches('\u{feff}').trim_start();

    if text.starts_with('{') {
        return FeedFormat::Json;
    }

    match xml::root_name(text).as_deref() {
        Some("feed") => FeedFormat::Atom,
        Some("rss") => FeedFormat::Rss,
        Some("rdf:RDF") | Some("RDF") => FeedFormat::Rdf,
        _ => FeedFormat::Unknown,
    }
}

/// Identity hash of an entry: URL when present, else title, followed by content.
pub fn entry_hash(url: &str, title: &str, content: &str) -> String {
    let key = if url.is_empty() { title } else { url };
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Plain text to HTML: escaped, bare URLs linked, newlines as `<br>`.
pub(crate) fn text_to_html(text: &str) -> String {
    nl2br(&convert_text_links(&escape_html(text.trim())))
}

/// Converts raw bytes to UTF-8 using the byte-order mark or the XML
/// declaration's `encoding`, defaulting to UTF-8.
pub fn decode_document(bytes: &[u8]) -> String {
    if let Some((encoding, bom_len)) = encoding_rs::Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        return text.into_owned();
    }

    let encoding = declared_xml_encoding(bytes)
        .and_then(|label| encoding_rs::Encoding::for_label(label.as_bytes()))
        .unwrap_or(encoding_rs::UTF_8);

    let (text, _) = encoding.decode_without_bom_handling(bytes);
    text.into_owned()
}

fn declared_xml_encoding(bytes: &[u8]) -> Option<String> {
    let head = &bytes[..bytes.len().min(256)];
    let head = String::from_utf8_lossy(head);
    let decl_end = head.find("?>")?;
    let decl = &head[..decl_end];
    if !decl.trim_start().starts_with("<?xml") {
        return None;
    }

    let start = decl.find("encoding")? + "encoding".len();
    let rest = decl[start..].trim_start().strip_prefix('=')?.trim_start();
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let value = &rest[1..];
    let end = value.find(quote)?;
    Some(value[..end].trim().to_string())
}

// ============================================================================
// Tests
// ============================================================================
