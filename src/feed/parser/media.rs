//! Media RSS extension (`media:group`, `media:content`, `media:thumbnail`,
//! `media:description`), shared by the Atom and RSS decoders.

use super::xml::Element;
use super::{text_to_html, Enclosure};
use crate::util::absolute_url;

const THUMBNAIL: &[&str] = &["media:thumbnail"];
const CONTENT: &[&str] = &["media:content"];
const DESCRIPTION: &[&str] = &["media:description"];
const GROUP: &[&str] = &["media:group"];

#[derive(Debug, Default)]
pub(crate) struct Media {
    /// Description converted to HTML, empty when absent.
    pub description: String,
    pub enclosures: Vec<Enclosure>,
}

/// Collects media elements found directly under `item` or inside its
/// `media:group` children. Thumbnails come before content elements.
pub(crate) fn collect(item: &Element, base_url: &str) -> Media {
    let scopes: Vec<&Element> = std::iter::once(item)
        .chain(item.children_named(GROUP))
        .collect();

    let mut media = Media::default();

    for scope in &scopes {
        for thumb in scope.children_named(THUMBNAIL) {
            push_enclosure(&mut media.enclosures, thumb, base_url, "image/*", None);
        }
    }

    for scope in &scopes {
        for content in scope.children_named(CONTENT) {
            push_enclosure(&mut media.enclosures, content, base_url, "", Some("fileSize"));
        }
    }

    media.description = scopes
        .iter()
        .find_map(|scope| scope.child_text(DESCRIPTION))
        .map(|text| text_to_html(&text))
        .unwrap_or_default();

    media
}

fn push_enclosure(
    out: &mut Vec<Enclosure>,
    el: &Element,
    base_url: &str,
    default_type: &str,
    size_attr: Option<&str>,
) {
    let Some(url) = el.attr_value("url").and_then(|u| absolute_url(base_url, u)) else {
        return;
    };

    if out.iter().any(|e| e.url == url) {
        return;
    }

    let mime_type = el
        .attr_value("type")
        .unwrap_or(default_type)
        .to_string();
    let size = size_attr
        .and_then(|attr| el.attr_value(attr))
        .map(parse_size)
        .unwrap_or(0);

    out.push(Enclosure {
        url,
        mime_type,
        size,
    });
}

/// Byte length attribute; anything that is not a non-negative integer is 0.
pub(crate) fn parse_size(value: &str) -> i64 {
    value.trim().parse::<i64>().ok().filter(|n| *n >= 0).unwrap_or(0)
}
