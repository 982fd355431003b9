//! JSON Feed 1.0 / 1.1 decoder.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::date::parse_date;
use super::{entry_hash, text_to_html, Enclosure, ParseError, ParsedEntry, ParsedFeed};
use crate::util::{absolute_url, html_to_text};

// Fields that are null or of the wrong type decode as empty.

fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JsonFeed {
    #[serde(deserialize_with = "text")]
    title: String,
    #[serde(deserialize_with = "text")]
    home_page_url: String,
    #[serde(deserialize_with = "text")]
    feed_url: String,
    #[serde(deserialize_with = "lenient")]
    author: Option<JsonAuthor>,
    #[serde(deserialize_with = "lenient")]
    authors: Vec<JsonAuthor>,
    #[serde(deserialize_with = "lenient")]
    items: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JsonAuthor {
    #[serde(deserialize_with = "text")]
    name: String,
    #[serde(deserialize_with = "text")]
    url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JsonItem {
    #[serde(deserialize_with = "text")]
    url: String,
    #[serde(deserialize_with = "text")]
    external_url: String,
    #[serde(deserialize_with = "text")]
    title: String,
    #[serde(deserialize_with = "text")]
    content_html: String,
    #[serde(deserialize_with = "text")]
    content_text: String,
    #[serde(deserialize_with = "text")]
    summary: String,
    #[serde(deserialize_with = "text")]
    date_published: String,
    #[serde(deserialize_with = "text")]
    date_modified: String,
    #[serde(deserialize_with = "lenient")]
    author: Option<JsonAuthor>,
    #[serde(deserialize_with = "lenient")]
    authors: Vec<JsonAuthor>,
    #[serde(deserialize_with = "lenient")]
    attachments: Vec<JsonAttachment>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JsonAttachment {
    #[serde(deserialize_with = "text")]
    url: String,
    #[serde(deserialize_with = "text")]
    mime_type: String,
    size_in_bytes: Option<Value>,
}

impl JsonAuthor {
    fn display(&self) -> Option<String> {
        let name = self.name.trim();
        if !name.is_empty() {
            return Some(name.to_string());
        }
        let url = self.url.trim();
        (!url.is_empty()).then(|| url.to_string())
    }
}

fn author_of(single: &Option<JsonAuthor>, many: &[JsonAuthor]) -> Option<String> {
    single
        .iter()
        .chain(many)
        .find_map(JsonAuthor::display)
}

pub(super) fn parse(base_url: &str, text: &str) -> Result<ParsedFeed, ParseError> {
    let doc: JsonFeed = serde_json::from_str(text)?;

    let site_url = absolute_url(base_url, doc.home_page_url.trim()).unwrap_or_default();
    let feed_url = absolute_url(base_url, doc.feed_url.trim()).unwrap_or_default();

    let mut title = html_to_text(&doc.title);
    if title.is_empty() {
        title = site_url.clone();
    }

    let feed_author = author_of(&doc.author, &doc.authors).unwrap_or_default();
    let entry_base = if site_url.is_empty() {
        base_url
    } else {
        site_url.as_str()
    };

    let entries = doc
        .items
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<JsonItem>(value) {
            Ok(item) => Some(parse_item(&item, entry_base, &feed_author)),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping malformed JSON Feed item");
                None
            }
        })
        .collect();

    Ok(ParsedFeed {
        title,
        feed_url,
        site_url,
        entries,
    })
}

fn parse_item(item: &JsonItem, base_url: &str, feed_author: &str) -> ParsedEntry {
    let raw_url = if item.url.trim().is_empty() {
        item.external_url.trim()
    } else {
        item.url.trim()
    };
    let url = absolute_url(base_url, raw_url).unwrap_or_default();

    let mut title = html_to_text(&item.title);
    if title.is_empty() {
        title = url.clone();
    }

    let content = if !item.content_html.trim().is_empty() {
        item.content_html.trim().to_string()
    } else if !item.content_text.trim().is_empty() {
        text_to_html(&item.content_text)
    } else {
        item.summary.trim().to_string()
    };

    let date = parse_date(&item.date_published).or_else(|| parse_date(&item.date_modified));

    let author = author_of(&item.author, &item.authors).unwrap_or_else(|| feed_author.to_string());

    let mut enclosures: Vec<Enclosure> = Vec::new();
    for attachment in &item.attachments {
        let Some(url) = absolute_url(base_url, attachment.url.trim()) else {
            continue;
        };
        if enclosures.iter().any(|e| e.url == url) {
            continue;
        }
        let size = attachment
            .size_in_bytes
            .as_ref()
            .and_then(Value::as_i64)
            .filter(|n| *n >= 0)
            .unwrap_or(0);
        enclosures.push(Enclosure {
            url,
            mime_type: attachment.mime_type.trim().to_string(),
            size,
        });
    }

    ParsedEntry {
        hash: entry_hash(&url, &title, &content),
        title,
        url,
        comments_url: String::new(),
        author,
        date,
        content,
        enclosures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    const BASE: &str = "https://example.org/feed.json";

    #[test]
    fn test_feed_and_items() {
        let data = r#"{
            "version": "https://jsonfeed.org/version/1.1",
            "title": "My Example Feed",
            "home_page_url": "https://example.org/",
            "feed_url": "https://example.org/feed.json",
            "authors": [{"name": "Feed Author"}],
            "items": [
                {
                    "id": "2",
                    "content_text": "This is a second item. https://example.org/x",
                    "url": "https://example.org/second-item"
                },
                {
                    "id": 1,
                    "title": "First",
                    "content_html": "<p>Hello, world!</p>",
                    "external_url": "/first",
                    "date_published": "2003-12-13T18:30:02Z",
                    "author": {"name": "Item Author"},
                    "attachments": [
                        {"url": "https://example.org/a.m4a", "mime_type": "audio/x-m4a", "size_in_bytes": 89970236},
                        {"url": "", "mime_type": "audio/x-m4a"}
                    ]
                }
            ]
        }"#;

        let feed = parse(BASE, data).unwrap();
        assert_eq!(feed.title, "My Example Feed");
        assert_eq!(feed.site_url, "https://example.org/");
        assert_eq!(feed.feed_url, "https://example.org/feed.json");
        assert_eq!(feed.entries.len(), 2);

        let second = &feed.entries[0];
        assert_eq!(second.title, "https://example.org/second-item");
        assert_eq!(
            second.content,
            r#"This is a second item. <a href="https://example.org/x">https://example.org/x</a>"#
        );
        assert_eq!(second.author, "Feed Author");
        assert_eq!(second.date, None);

        let first = &feed.entries[1];
        assert_eq!(first.url, "https://example.org/first");
        assert_eq!(first.content, "<p>Hello, world!</p>");
        assert_eq!(first.author, "Item Author");
        assert_eq!(
            first.date,
            Some(Utc.with_ymd_and_hms(2003, 12, 13, 18, 30, 2).unwrap())
        );
        assert_eq!(first.enclosures.len(), 1);
        assert_eq!(first.enclosures[0].size, 89_970_236);
    }

    #[test]
    fn test_summary_and_modified_fallbacks() {
        let data = r#"{"items": [{"url": "https://x/1", "summary": "Short", "date_modified": "2003-12-13T18:30:02Z"}]}"#;
        let feed = parse(BASE, data).unwrap();
        assert_eq!(feed.entries[0].content, "Short");
        assert_eq!(feed.entries[0].date.map(|d| d.timestamp()), Some(1_071_340_202));
    }

    #[test]
    fn test_null_field_keeps_feed() {
        let data = r#"{"items": [
            {"url": "https://x/1", "title": "Good", "content_html": "<p>a</p>"},
            {"url": "https://x/2", "title": "Nulls", "summary": null, "author": null, "authors": null}
        ]}"#;
        let feed = parse(BASE, data).unwrap();
        assert_eq!(feed.entries.len(), 2);
        assert_eq!(feed.entries[0].title, "Good");
        assert_eq!(feed.entries[1].title, "Nulls");
        assert_eq!(feed.entries[1].content, "");
    }

    #[test]
    fn test_wrong_typed_fields_keep_feed() {
        let data = r#"{"title": null, "items": [
            {"url": "https://x/1", "title": "Good"},
            {"url": "https://x/2", "title": 2024, "attachments": "none"},
            "not an item"
        ]}"#;
        let feed = parse(BASE, data).unwrap();
        assert_eq!(feed.title, "");
        assert_eq!(feed.entries.len(), 2);
        assert_eq!(feed.entries[0].title, "Good");
        assert_eq!(feed.entries[0].url, "https://x/1");
        assert_eq!(feed.entries[1].title, "2024");
        assert!(feed.entries[1].enclosures.is_empty());
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(parse(BASE, "{not json"), Err(ParseError::Json(_))));
    }
}
