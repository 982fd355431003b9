//! Atom 1.0 decoder.

use super::date::parse_date;
use super::xml::{parse_document, Element};
use super::{entry_hash, media, Enclosure, ParseError, ParsedEntry, ParsedFeed};
use crate::util::{absolute_url, escape_html, html_to_text, is_absolute_url};

const ENTRY: &[&str] = &["entry", "atom:entry"];
const LINK: &[&str] = &["link", "atom:link"];
const TITLE: &[&str] = &["title", "atom:title"];
const CONTENT: &[&str] = &["content", "atom:content"];
const SUMMARY: &[&str] = &["summary", "atom:summary"];
const PUBLISHED: &[&str] = &["published", "atom:published"];
const UPDATED: &[&str] = &["updated", "atom:updated"];
const AUTHOR: &[&str] = &["author", "atom:author"];
const NAME: &[&str] = &["name", "atom:name"];
const EMAIL: &[&str] = &["email", "atom:email"];

pub(super) fn parse(base_url: &str, text: &str) -> Result<ParsedFeed, ParseError> {
    let root = parse_document(text).map_err(ParseError::Xml)?;

    let site_url = link_href(&root, is_alternate, base_url).unwrap_or_default();
    let feed_url = link_href(&root, |rel| rel == "self", base_url).unwrap_or_default();

    let mut title = root.child(TITLE).map(title_text).unwrap_or_default();
    if title.is_empty() {
        title = site_url.clone();
    }

    let feed_author = author(&root);
    let entry_base = if site_url.is_empty() {
        base_url
    } else {
        site_url.as_str()
    };

    let entries = root
        .children_named(ENTRY)
        .map(|entry| parse_entry(entry, entry_base, &feed_author))
        .collect();

    Ok(ParsedFeed {
        title,
        feed_url,
        site_url,
        entries,
    })
}

fn parse_entry(entry: &Element, base_url: &str, feed_author: &str) -> ParsedEntry {
    let url = link_href(entry, is_alternate, base_url).unwrap_or_default();

    let date = entry
        .child_text(PUBLISHED)
        .and_then(|d| parse_date(&d))
        .or_else(|| entry.child_text(UPDATED).and_then(|d| parse_date(&d)));

    let mut author = author(entry);
    if author.is_empty() {
        author = feed_author.to_string();
    }

    let media = media::collect(entry, base_url);

    let mut content = entry
        .child(CONTENT)
        .map(content_html)
        .filter(|c| !c.is_empty())
        .or_else(|| entry.child(SUMMARY).map(content_html).filter(|c| !c.is_empty()))
        .unwrap_or_default();
    if content.is_empty() {
        content = media.description.clone();
    }

    let mut enclosures = link_enclosures(entry, base_url);
    for enclosure in media.enclosures {
        if !enclosures.iter().any(|e| e.url == enclosure.url) {
            enclosures.push(enclosure);
        }
    }

    let mut title = entry.child(TITLE).map(title_text).unwrap_or_default();
    if title.is_empty() {
        title = url.clone();
    }

    ParsedEntry {
        hash: entry_hash(&url, &title, &content),
        title,
        comments_url: comments_url(entry),
        url,
        author,
        date,
        content,
        enclosures,
    }
}

fn is_alternate(rel: &str) -> bool {
    rel.is_empty() || rel == "alternate"
}

fn link_href(parent: &Element, rel_matches: impl Fn(&str) -> bool, base_url: &str) -> Option<String> {
    parent
        .children_named(LINK)
        .filter(|link| rel_matches(link.attr("rel").unwrap_or("").trim()))
        .find_map(|link| link.attr_value("href"))
        .and_then(|href| absolute_url(base_url, href))
}

fn link_enclosures(entry: &Element, base_url: &str) -> Vec<Enclosure> {
    let mut out: Vec<Enclosure> = Vec::new();
    for link in entry
        .children_named(LINK)
        .filter(|l| l.attr("rel") == Some("enclosure"))
    {
        let Some(url) = link.attr_value("href").and_then(|h| absolute_url(base_url, h)) else {
            continue;
        };
        if out.iter().any(|e| e.url == url) {
            continue;
        }
        out.push(Enclosure {
            url,
            mime_type: link.attr_value("type").unwrap_or_default().to_string(),
            size: link.attr_value("length").map(media::parse_size).unwrap_or(0),
        });
    }
    out
}

/// `rel="replies"` pointing at an HTML page (not the comments feed).
fn comments_url(entry: &Element) -> String {
    entry
        .children_named(LINK)
        .filter(|l| l.attr("rel") == Some("replies"))
        .filter(|l| {
            matches!(
                l.attr("type").map(str::trim),
                Some("text/html") | Some("application/xhtml+xml")
            )
        })
        .filter_map(|l| l.attr_value("href"))
        .find(|href| is_absolute_url(href))
        .map(str::to_string)
        .unwrap_or_default()
}

fn author(parent: &Element) -> String {
    parent
        .children_named(AUTHOR)
        .find_map(|a| a.child_text(NAME).or_else(|| a.child_text(EMAIL)))
        .unwrap_or_default()
}

fn construct_type(el: &Element) -> &str {
    el.attr("type").map(str::trim).unwrap_or("text")
}

fn title_text(el: &Element) -> String {
    match construct_type(el) {
        "html" | "text/html" => html_to_text(&el.text()),
        "xhtml" | "application/xhtml+xml" => html_to_text(&el.inner_xml()),
        _ => el.text().trim().to_string(),
    }
}

fn content_html(el: &Element) -> String {
    match construct_type(el) {
        "html" | "text/html" => el.text().trim().to_string(),
        "xhtml" | "application/xhtml+xml" => el.inner_xml().trim().to_string(),
        _ => escape_html(el.text().trim()).into_owned(),
    }
}
