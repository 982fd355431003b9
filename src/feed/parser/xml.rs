//! Minimal XML element tree used by the Atom and RSS decoders.
//!
//! Feeds are small enough to hold in memory, and both decoders need random
//! access (first `link` with a given `rel`, fallbacks across siblings), so the
//! document is read once with `quick_xml` into [`Element`] nodes. Text is
//! decoded with HTML entity rules so `&nbsp;` and friends survive, and an
//! unknown reference such as `a&b` is kept literally instead of failing.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::util::{decode_entities, escape_attr, escape_html};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Element {
    /// Qualified name as written in the document (`media:content`, `link`).
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> Self {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let attrs = start
            .attributes()
            .with_checks(false)
            .flatten()
            .map(|attr| {
                let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                let raw = String::from_utf8_lossy(&attr.value);
                (key, decode_entities(&raw).into_owned())
            })
            .collect();

        Self {
            name,
            attrs,
            children: Vec::new(),
        }
    }

    /// Name without its namespace prefix.
    pub fn local_name(&self) -> &str {
        self.name
            .split_once(':')
            .map(|(_, local)| local)
            .unwrap_or(&self.name)
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Attribute value, trimmed, `None` when missing or blank.
    pub fn attr_value(&self, key: &str) -> Option<&str> {
        self.attr(key).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
    }

    /// Direct children whose qualified name is one of `names`.
    pub fn children_named<'a>(
        &'a self,
        names: &'a [&'a str],
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.elements().filter(move |el| names.contains(&el.name.as_str()))
    }

    pub fn child(&self, names: &[&str]) -> Option<&Element> {
        self.elements().find(|el| names.contains(&el.name.as_str()))
    }

    /// Trimmed text of the first matching child, `None` when missing or blank.
    pub fn child_text(&self, names: &[&str]) -> Option<String> {
        self.children_named(names)
            .map(|el| el.text().trim().to_string())
            .find(|t| !t.is_empty())
    }

    /// Concatenated text of all descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                Node::Text(t) => out.push_str(t),
                Node::Element(el) => el.collect_text(out),
            }
        }
    }

    /// Children serialized back to markup, as written in an `xhtml` construct.
    pub fn inner_xml(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            write_node(node, &mut out);
        }
        out
    }
}

fn write_node(node: &Node, out: &mut String) {
    match node {
        Node::Text(t) => out.push_str(&escape_html(t)),
        Node::Element(el) => {
            out.push('<');
            out.push_str(&el.name);
            for (k, v) in &el.attrs {
                out.push(' ');
                out.push_str(k);
                out.push_str("=\"");
                out.push_str(&escape_attr(v));
                out.push('"');
            }
            if el.children.is_empty() {
                out.push_str("/>");
                return;
            }
            out.push('>');
            for child in &el.children {
                write_node(child, out);
            }
            out.push_str("</");
            out.push_str(&el.name);
            out.push('>');
        }
    }
}

/// Reads a whole document and returns its root element.
///
/// # Errors
///
/// Returns a description of the first syntax error, a document without a
/// root element, or one that ends with unclosed elements.
pub(crate) fn parse_document(text: &str) -> Result<Element, String> {
    let mut reader = Reader::from_str(text);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| format!("{} at position {}", e, reader.buffer_position()))?;

        match event {
            Event::Start(start) => stack.push(Element::from_start(&start)),
            Event::Empty(start) => {
                let el = Element::from_start(&start);
                attach(&mut stack, &mut root, Node::Element(el));
            }
            Event::End(_) => {
                if let Some(el) = stack.pop() {
                    attach(&mut stack, &mut root, Node::Element(el));
                }
            }
            Event::Text(t) => {
                if let Some(parent) = stack.last_mut() {
                    let raw = String::from_utf8_lossy(&t);
                    parent
                        .children
                        .push(Node::Text(decode_entities(&raw).into_owned()));
                }
            }
            Event::CData(t) => {
                if let Some(parent) = stack.last_mut() {
                    parent
                        .children
                        .push(Node::Text(String::from_utf8_lossy(&t).into_owned()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(format!("unexpected end of document inside <{}>", open.name));
    }

    root.ok_or_else(|| "document has no root element".to_string())
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, node: Node) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => {
            if root.is_none() {
                if let Node::Element(el) = node {
                    *root = Some(el);
                }
            }
        }
    }
}

/// Name of the first element in the document, without building a tree.
pub(crate) fn root_name(text: &str) -> Option<String> {
    let mut reader = Reader::from_str(text);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Some(String::from_utf8_lossy(e.name().as_ref()).into_owned());
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tree_and_text() {
        let root = parse_document(r#"<a x="1"><b>one</b><c/>two</a>"#).unwrap();
        assert_eq!(root.name, "a");
        assert_eq!(root.attr("x"), Some("1"));
        assert_eq!(root.elements().count(), 2);
        assert_eq!(root.text(), "onetwo");
        assert_eq!(root.child_text(&["b"]).as_deref(), Some("one"));
    }

    #[test]
    fn test_entities_in_text_and_attributes() {
        let root = parse_document(r#"<a href="http://example.org/a&b">x&nbsp;y &amp; z</a>"#)
            .unwrap();
        assert_eq!(root.attr("href"), Some("http://example.org/a&b"));
        assert_eq!(root.text(), "x\u{a0}y & z");
    }

    #[test]
    fn test_cdata_is_literal() {
        let root = parse_document("<t><![CDATA[<p>&amp;</p>]]></t>").unwrap();
        assert_eq!(root.text(), "<p>&amp;</p>");
    }

    #[test]
    fn test_inner_xml_roundtrips_markup() {
        let root = parse_document(r#"<s><div class="x"><p>Some &lt;text&gt;</p><br/></div></s>"#)
            .unwrap();
        assert_eq!(
            root.inner_xml(),
            r#"<div class="x"><p>Some &lt;text&gt;</p><br/></div>"#
        );
    }

    #[test]
    fn test_local_name() {
        let root = parse_document("<media:group/>").unwrap();
        assert_eq!(root.local_name(), "group");
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(parse_document("garbage").is_err());
        assert!(parse_document("<open><child></child>").is_err());
        assert!(parse_document("<a></b>").is_err());
    }

    #[test]
    fn test_root_name() {
        assert_eq!(root_name("<?xml version=\"1.0\"?><rss/>").as_deref(), Some("rss"));
        assert_eq!(root_name("{\"a\":1}"), None);
    }
}
