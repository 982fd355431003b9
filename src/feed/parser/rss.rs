//! RSS 2.0 / 0.9x and RDF (RSS 1.0) decoder.
//!
//! RDF documents keep their `item` elements next to `channel` under the root
//! instead of inside it; both layouts are accepted.

use super::date::parse_date;
use super::xml::{parse_document, Element};
use super::{entry_hash, media, Enclosure, ParseError, ParsedEntry, ParsedFeed};
use crate::util::{absolute_url, html_to_text, is_absolute_url};

const CHANNEL: &[&str] = &["channel", "rss:channel"];
const ITEM: &[&str] = &["item", "rss:item"];
const TITLE: &[&str] = &["title", "rss:title", "dc:title"];
const LINK: &[&str] = &["link", "rss:link"];
const ATOM_LINK: &[&str] = &["atom:link", "atom10:link"];
const ORIG_LINK: &[&str] = &["feedburner:origLink"];
const GUID: &[&str] = &["guid"];
const CONTENT: &[&str] = &["content:encoded"];
const DESCRIPTION: &[&str] = &["description", "rss:description"];
const DATE: &[&str] = &["pubDate", "dc:date"];
const AUTHOR: &[&str] = &["author", "dc:creator", "itunes:author"];
const CHANNEL_AUTHOR: &[&str] = &["managingEditor", "dc:creator", "itunes:author", "webMaster"];
const COMMENTS: &[&str] = &["comments"];
const ENCLOSURE: &[&str] = &["enclosure"];

pub(super) fn parse(base_url: &str, text: &str) -> Result<ParsedFeed, ParseError> {
    let root = parse_document(text).map_err(ParseError::Xml)?;
    let channel = root
        .child(CHANNEL)
        .ok_or_else(|| ParseError::Xml("missing <channel> element".to_string()))?;

    let site_url = channel
        .child_text(LINK)
        .or_else(|| atom_link(channel, |rel| rel.is_empty() || rel == "alternate"))
        .and_then(|href| absolute_url(base_url, &href))
        .unwrap_or_default();

    let feed_url = atom_link(channel, |rel| rel == "self")
        .and_then(|href| absolute_url(base_url, &href))
        .unwrap_or_default();

    let mut title = channel
        .child_text(TITLE)
        .map(|t| html_to_text(&t))
        .unwrap_or_default();
    if title.is_empty() {
        title = site_url.clone();
    }

    let channel_author = channel
        .child_text(CHANNEL_AUTHOR)
        .map(|a| author_name(&a))
        .unwrap_or_default();

    let entry_base = if site_url.is_empty() {
        base_url
    } else {
        site_url.as_str()
    };

    let entries = channel
        .children_named(ITEM)
        .chain(root.children_named(ITEM))
        .map(|item| parse_item(item, entry_base, &channel_author))
        .collect();

    Ok(ParsedFeed {
        title,
        feed_url,
        site_url,
        entries,
    })
}

fn parse_item(item: &Element, base_url: &str, channel_author: &str) -> ParsedEntry {
    let url = item_url(item)
        .and_then(|u| absolute_url(base_url, &u))
        .unwrap_or_default();

    let media = media::collect(item, base_url);

    let content = item
        .child_text(CONTENT)
        .or_else(|| item.child_text(DESCRIPTION))
        .unwrap_or_else(|| media.description.clone());

    let mut title = item
        .child_text(TITLE)
        .map(|t| html_to_text(&t))
        .unwrap_or_default();
    if title.is_empty() {
        title = url.clone();
    }

    let author = item
        .child_text(AUTHOR)
        .map(|a| author_name(&a))
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| channel_author.to_string());

    let date = item
        .children_named(DATE)
        .find_map(|d| parse_date(&d.text()));

    let comments_url = item
        .child_text(COMMENTS)
        .filter(|c| is_absolute_url(c))
        .unwrap_or_default();

    let mut enclosures: Vec<Enclosure> = Vec::new();
    for enclosure in item.children_named(ENCLOSURE) {
        let Some(url) = enclosure
            .attr_value("url")
            .and_then(|u| absolute_url(base_url, u))
        else {
            continue;
        };
        if enclosures.iter().any(|e| e.url == url) {
            continue;
        }
        enclosures.push(Enclosure {
            url,
            mime_type: enclosure.attr_value("type").unwrap_or_default().to_string(),
            size: enclosure
                .attr_value("length")
                .map(media::parse_size)
                .unwrap_or(0),
        });
    }
    for enclosure in media.enclosures {
        if !enclosures.iter().any(|e| e.url == enclosure.url) {
            enclosures.push(enclosure);
        }
    }

    ParsedEntry {
        hash: entry_hash(&url, &title, &content),
        title,
        url,
        comments_url,
        author,
        date,
        content,
        enclosures,
    }
}

/// Entry URL by preference: feedburner original link, `<link>`, an alternate
/// `atom:link`, then a permalink `<guid>`.
fn item_url(item: &Element) -> Option<String> {
    item.child_text(ORIG_LINK)
        .or_else(|| item.child_text(LINK))
        .or_else(|| atom_link(item, |rel| rel.is_empty() || rel == "alternate"))
        .or_else(|| {
            item.children_named(GUID)
                .find(|g| g.attr("isPermaLink").map(str::trim) != Some("false"))
                .map(|g| g.text().trim().to_string())
                .filter(|g| is_absolute_url(g))
        })
}

fn atom_link(parent: &Element, rel_matches: impl Fn(&str) -> bool) -> Option<String> {
    parent
        .children_named(ATOM_LINK)
        .chain(parent.children_named(LINK))
        .filter(|l| rel_matches(l.attr("rel").unwrap_or("").trim()))
        .find_map(|l| l.attr_value("href"))
        .map(str::to_string)
}

/// `jdoe@example.org (John Doe)` → `John Doe`; anything else unchanged.
fn author_name(raw: &str) -> String {
    let raw = html_to_text(raw);
    if let (Some(open), true) = (raw.find('('), raw.ends_with(')')) {
        let name = raw[open + 1..raw.len() - 1].trim();
        if !name.is_empty() {
            return name.to_string();
        }
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    const BASE: &str = "http://example.org/rss.xml";

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom" xmlns:content="http://purl.org/rss/1.0/modules/content/" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel>
    <title>Example &amp; Friends</title>
    <link>https://example.org/</link>
    <atom:link href="https://example.org/rss.xml" rel="self" type="application/rss+xml"/>
    <managingEditor>editor@example.org (The Editor)</managingEditor>
    <item>
      <title>First &lt;b&gt;post&lt;/b&gt;</title>
      <link>/posts/1</link>
      <description>&lt;p&gt;Summary&lt;/p&gt;</description>
      <content:encoded><![CDATA[<p>Full text</p>]]></content:encoded>
      <pubDate>Sat, 13 Dec 2003 18:30:02 GMT</pubDate>
      <comments>https://example.org/posts/1#comments</comments>
      <enclosure url="https://example.org/a.mp3" type="audio/mpeg" length="42"/>
      <enclosure url="" type="audio/mpeg" length="1"/>
    </item>
    <item>
      <guid isPermaLink="true">https://example.org/posts/2</guid>
      <description>Second</description>
      <dc:creator>Jane</dc:creator>
      <dc:date>2003-12-14T10:00:00Z</dc:date>
      <comments>not a url</comments>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_channel_metadata() {
        let feed = parse(BASE, SAMPLE).unwrap();
        assert_eq!(feed.title, "Example & Friends");
        assert_eq!(feed.site_url, "https://example.org/");
        assert_eq!(feed.feed_url, "https://example.org/rss.xml");
        assert_eq!(feed.entries.len(), 2);
    }

    #[test]
    fn test_first_item() {
        let feed = parse(BASE, SAMPLE).unwrap();
        let entry = &feed.entries[0];
        assert_eq!(entry.title, "First post");
        assert_eq!(entry.url, "https://example.org/posts/1");
        assert_eq!(entry.content, "<p>Full text</p>");
        assert_eq!(entry.author, "The Editor");
        assert_eq!(
            entry.date,
            Some(Utc.with_ymd_and_hms(2003, 12, 13, 18, 30, 2).unwrap())
        );
        assert_eq!(entry.comments_url, "https://example.org/posts/1#comments");
        assert_eq!(
            entry.enclosures,
            vec![Enclosure {
                url: "https://example.org/a.mp3".into(),
                mime_type: "audio/mpeg".into(),
                size: 42,
            }]
        );
    }

    #[test]
    fn test_second_item_fallbacks() {
        let feed = parse(BASE, SAMPLE).unwrap();
        let entry = &feed.entries[1];
        assert_eq!(entry.url, "https://example.org/posts/2");
        assert_eq!(entry.title, "https://example.org/posts/2");
        assert_eq!(entry.content, "Second");
        assert_eq!(entry.author, "Jane");
        assert_eq!(
            entry.date,
            Some(Utc.with_ymd_and_hms(2003, 12, 14, 10, 0, 0).unwrap())
        );
        assert_eq!(entry.comments_url, "");
    }

    #[test]
    fn test_rdf_items_at_root() {
        let data = r#"<?xml version="1.0"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#" xmlns="http://purl.org/rss/1.0/">
  <channel><title>RDF</title><link>http://example.org/</link></channel>
  <item><title>One</title><link>http://example.org/1</link></item>
  <item><title>Two</title><link>http://example.org/2</link></item>
</rdf:RDF>"#;
        let feed = parse(BASE, data).unwrap();
        assert_eq!(feed.title, "RDF");
        let titles: Vec<_> = feed.entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["One", "Two"]);
    }

    #[test]
    fn test_missing_channel_is_error() {
        assert!(matches!(
            parse(BASE, "<rss version=\"2.0\"></rss>"),
            Err(ParseError::Xml(_))
        ));
    }

    #[test]
    fn test_feed_without_title_uses_site_url() {
        let feed = parse(
            BASE,
            "<rss><channel><link>http://example.org/</link></channel></rss>",
        )
        .unwrap();
        assert_eq!(feed.title, "http://example.org/");
    }

    #[test]
    fn test_bad_enclosure_length_is_zero() {
        let feed = parse(
            BASE,
            r#"<rss><channel><item><link>http://x/1</link><enclosure url="http://x/a.ogg" type="audio/ogg" length="n/a"/></item></channel></rss>"#,
        )
        .unwrap();
        assert_eq!(feed.entries[0].enclosures[0].size, 0);
    }
}
