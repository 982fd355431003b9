//! Entry content rewriter.
//!
//! A rule list is a comma-separated string of identifiers, each optionally
//! followed by quoted arguments: `add_image_title, replace("foo"|"bar")`.
//! Identifiers map to plain `fn` transforms in a registry; unknown names are
//! skipped. `add_pdf_download_link` always runs last.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::rules::DomainRules;
use crate::util::{absolute_url, decode_entities, escape_attr, escape_html};

/// A rewrite transform: `(entry_url, content, args) -> content`.
pub type RuleFn = fn(&str, &str, &[String]) -> String;

const PDF_RULE: &str = "add_pdf_download_link";

static IMG_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<img\b[^>]*>").unwrap());
static ANCHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)<a\b([^>]*)>(.*?)</a>"#).unwrap());
static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\s([a-z_:][-a-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .unwrap()
});
static SRC_ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\ssrc\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'>]+)"#).unwrap()
});
static TEXT_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(^|\s)(https?://[^\s<>"']+)"#).unwrap());
static YOUTUBE_WATCH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"youtube\.com/watch\?(?:.*&)?v=([\w-]+)").unwrap());

const LAZY_IMAGE_ATTRIBUTES: &[&str] = &[
    "data-src",
    "data-original",
    "data-orig",
    "data-url",
    "data-lazy-src",
];

// ============================================================================
// Rule lists
// ============================================================================

/// One parsed item of a rule list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSpec {
    pub name: String,
    pub args: Vec<String>,
}

impl RuleSpec {
    /// Splits a rule list on top-level commas. Commas inside quoted arguments
    /// do not split.
    pub fn parse_list(list: &str) -> Vec<RuleSpec> {
        split_outside_quotes(list, ',')
            .into_iter()
            .filter_map(|item| RuleSpec::parse(&item))
            .collect()
    }

    /// Parses `name` or `name("a"|"b")`.
    pub fn parse(item: &str) -> Option<RuleSpec> {
        let item = item.trim();
        if item.is_empty() {
            return None;
        }

        let Some((name, rest)) = item.split_once('(') else {
            return Some(RuleSpec {
                name: item.to_string(),
                args: Vec::new(),
            });
        };

        let inner = rest.trim_end().strip_suffix(')').unwrap_or(rest);
        let args = split_outside_quotes(inner, '|')
            .into_iter()
            .map(|arg| unquote(arg.trim()).to_string())
            .collect();

        Some(RuleSpec {
            name: name.trim().to_string(),
            args,
        })
    }
}

fn split_outside_quotes(input: &str, separator: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in input.chars() {
        match quote {
            Some(q) if c == q => {
                quote = None;
                current.push(c);
            }
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                current.push(c);
            }
            None if c == separator => parts.push(std::mem::take(&mut current)),
            None => current.push(c),
        }
    }
    parts.push(current);
    parts
}

fn unquote(arg: &str) -> &str {
    for q in ['"', '\''] {
        if let Some(inner) = arg.strip_prefix(q).and_then(|a| a.strip_suffix(q)) {
            return inner;
        }
    }
    arg
}

// ============================================================================
// Rewriter
// ============================================================================

pub struct Rewriter {
    registry: HashMap<&'static str, RuleFn>,
    domain_rules: DomainRules,
}

impl Rewriter {
    pub fn new(domain_rules: DomainRules) -> Self {
        let mut registry: HashMap<&'static str, RuleFn> = HashMap::new();
        registry.insert("add_image_title", add_image_title);
        registry.insert("add_mailto_subject", add_mailto_subject);
        registry.insert("add_dynamic_image", add_dynamic_image);
        registry.insert("add_youtube_video", add_youtube_video);
        registry.insert(PDF_RULE, add_pdf_download_link);
        registry.insert("nl2br", |_, content, _| nl2br(content));
        registry.insert("convert_text_link", |_, content, _| {
            convert_text_links(content)
        });
        registry.insert("convert_text_links", |_, content, _| {
            convert_text_links(content)
        });
        registry.insert("replace", replace);

        Self {
            registry,
            domain_rules,
        }
    }

    /// Applies `custom_rules` (or the domain table's rules for `entry_url` when
    /// empty) followed by the PDF download link rule.
    pub fn rewrite(&self, entry_url: &str, content: &str, custom_rules: &str) -> String {
        let list = if custom_rules.trim().is_empty() {
            self.domain_rules.lookup(entry_url).unwrap_or("")
        } else {
            custom_rules
        };

        let mut specs = RuleSpec::parse_list(list);
        specs.retain(|spec| spec.name != PDF_RULE);
        specs.push(RuleSpec {
            name: PDF_RULE.to_string(),
            args: Vec::new(),
        });

        tracing::debug!(
            entry_url,
            rules = ?specs.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            "Applying rewrite rules"
        );

        let mut content = content.to_string();
        for spec in &specs {
            match self.registry.get(spec.name.as_str()) {
                Some(rule) => content = rule(entry_url, &content, &spec.args),
                None => tracing::debug!(rule = %spec.name, "Ignoring unknown rewrite rule"),
            }
        }
        content
    }
}

impl Default for Rewriter {
    fn default() -> Self {
        Self::new(DomainRules::default_rewrite())
    }
}

// ============================================================================
// Tag helpers
// ============================================================================

fn tag_attr(tag: &str, name: &str) -> Option<String> {
    ATTRIBUTE.captures_iter(tag).find_map(|caps| {
        if !caps[1].eq_ignore_ascii_case(name) {
            return None;
        }
        let raw = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map(|m| m.as_str())
            .unwrap_or("");
        Some(decode_entities(raw).into_owned())
    })
}

fn insert_attr(tag: &str, name: &str, value: &str) -> String {
    let attr = format!(" {}=\"{}\"", name, escape_attr(value));
    let (head, tail) = match tag.strip_suffix("/>") {
        Some(head) => (head.trim_end(), " />"),
        None => (tag.strip_suffix('>').unwrap_or(tag), ">"),
    };
    format!("{head}{attr}{tail}")
}

// ============================================================================
// Rules
// ============================================================================

/// Copies `alt` into a missing `title` on images.
fn add_image_title(_entry_url: &str, content: &str, _args: &[String]) -> String {
    IMG_TAG
        .replace_all(content, |caps: &Captures| {
            let tag = &caps[0];
            match (tag_attr(tag, "title"), tag_attr(tag, "alt")) {
                (None, Some(alt)) if !alt.trim().is_empty() => insert_attr(tag, "title", &alt),
                _ => tag.to_string(),
            }
        })
        .into_owned()
}

/// Appends ` [subject]` to the text of `mailto:` links carrying a subject.
fn add_mailto_subject(_entry_url: &str, content: &str, _args: &[String]) -> String {
    ANCHOR
        .replace_all(content, |caps: &Captures| {
            let whole = &caps[0];
            let Some(href) = tag_attr(&format!("<a{}>", &caps[1]), "href") else {
                return whole.to_string();
            };
            if !href.to_ascii_lowercase().starts_with("mailto:") {
                return whole.to_string();
            }
            let subject = url::Url::parse(&href).ok().and_then(|u| {
                u.query_pairs()
                    .find(|(k, _)| k.eq_ignore_ascii_case("subject"))
                    .map(|(_, v)| v.into_owned())
            });
            match subject {
                Some(subject) if !subject.trim().is_empty() => {
                    let suffix = format!(" [{}]", escape_html(subject.trim()));
                    if caps[2].ends_with(&suffix) {
                        whole.to_string()
                    } else {
                        format!("<a{}>{}{}</a>", &caps[1], &caps[2], suffix)
                    }
                }
                _ => whole.to_string(),
            }
        })
        .into_owned()
}

/// Gives lazy-loaded images a real `src`.
fn add_dynamic_image(_entry_url: &str, content: &str, _args: &[String]) -> String {
    IMG_TAG
        .replace_all(content, |caps: &Captures| {
            let tag = &caps[0];
            let has_real_src = tag_attr(tag, "src")
                .map(|src| {
                    let src = src.trim();
                    !src.is_empty() && !src.starts_with("data:")
                })
                .unwrap_or(false);
            if has_real_src {
                return tag.to_string();
            }

            let Some(lazy) = LAZY_IMAGE_ATTRIBUTES
                .iter()
                .filter_map(|name| tag_attr(tag, name))
                .find(|v| !v.trim().is_empty())
            else {
                return tag.to_string();
            };

            let without_src = SRC_ATTRIBUTE.replace(tag, "");
            insert_attr(&without_src, "src", lazy.trim())
        })
        .into_owned()
}

/// Prepends an embedded player when the entry itself is a YouTube video.
fn add_youtube_video(entry_url: &str, content: &str, _args: &[String]) -> String {
    let Some(caps) = YOUTUBE_WATCH.captures(entry_url) else {
        return content.to_string();
    };
    let embed = format!("https://www.youtube-nocookie.com/embed/{}", &caps[1]);
    if content.contains(&embed) {
        return content.to_string();
    }
    format!(
        r#"<iframe width="650" height="350" frameborder="0" src="{embed}" allowfullscreen></iframe><p>{content}</p>"#
    )
}

/// Appends a download link for each PDF referenced by the entry.
fn add_pdf_download_link(entry_url: &str, content: &str, _args: &[String]) -> String {
    let mut targets: Vec<String> = Vec::new();

    if is_pdf(entry_url) {
        targets.push(entry_url.to_string());
    }
    for caps in ANCHOR.captures_iter(content) {
        let Some(href) = tag_attr(&format!("<a{}>", &caps[1]), "href") else {
            continue;
        };
        if !is_pdf(&href) {
            continue;
        }
        let Some(href) = absolute_url(entry_url, &href) else {
            continue;
        };
        if !targets.contains(&href) {
            targets.push(href);
        }
    }

    let mut out = content.to_string();
    for target in targets {
        let marker = format!(r#"<a href="{}" download>"#, escape_attr(&target));
        if !out.contains(&marker) {
            out.push_str(&format!("<p>{marker}Download PDF</a></p>"));
        }
    }
    out
}

fn is_pdf(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.to_ascii_lowercase().ends_with(".pdf")
}

/// Regex replacement: `replace("pattern"|"replacement")`.
fn replace(_entry_url: &str, content: &str, args: &[String]) -> String {
    let [pattern, replacement] = args else {
        tracing::warn!(args = ?args, "replace rule expects two arguments");
        return content.to_string();
    };
    match Regex::new(pattern) {
        Ok(re) => re.replace_all(content, replacement.as_str()).into_owned(),
        Err(e) => {
            tracing::warn!(pattern = %pattern, error = %e, "Invalid replace pattern");
            content.to_string()
        }
    }
}

/// Newlines become `<br>`.
pub fn nl2br(content: &str) -> String {
    content.replace("\r\n", "<br>").replace('\n', "<br>")
}

/// Bare `http(s)://` URLs at the start of the text or after whitespace become
/// anchors.
pub fn convert_text_links(content: &str) -> String {
    TEXT_LINK
        .replace_all(content, r#"$1<a href="$2">$2</a>"#)
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rewriter() -> Rewriter {
        Rewriter::new(DomainRules::default())
    }

    #[test]
    fn test_parse_rule_list() {
        let specs = RuleSpec::parse_list(r#" nl2br , replace("a,b"|"c"), , add_image_title"#);
        assert_eq!(
            specs,
            vec![
                RuleSpec { name: "nl2br".into(), args: vec![] },
                RuleSpec {
                    name: "replace".into(),
                    args: vec!["a,b".into(), "c".into()]
                },
                RuleSpec { name: "add_image_title".into(), args: vec![] },
            ]
        );
    }

    #[test]
    fn test_unknown_rule_is_ignored() {
        let out = rewriter().rewrite("https://example.org/", "<p>x</p>", "no_such_rule");
        assert_eq!(out, "<p>x</p>");
    }

    #[test]
    fn test_domain_rules_used_without_custom_rules() {
        let r = Rewriter::default();
        let out = r.rewrite("https://xkcd.com/1/", r#"<img src="a.png" alt="Joke">"#, "");
        assert_eq!(out, r#"<img src="a.png" alt="Joke" title="Joke">"#);
    }

    #[test]
    fn test_custom_rules_override_domain_rules() {
        let r = Rewriter::default();
        let out = r.rewrite("https://xkcd.com/1/", "a\nb", "nl2br");
        assert_eq!(out, "a<br>b");
    }

    #[test]
    fn test_add_image_title_keeps_existing_title() {
        let html = r#"<img src="a.png" alt="alt" title="t"/>"#;
        assert_eq!(add_image_title("", html, &[]), html);
        assert_eq!(
            add_image_title("", r#"<img src="a.png" alt="a &amp; b"/>"#, &[]),
            r#"<img src="a.png" alt="a &amp; b" title="a &amp; b" />"#
        );
    }

    #[test]
    fn test_add_mailto_subject() {
        let html = r#"<a href="mailto:a@example.org?subject=Hello%20there">Write</a>"#;
        let once = add_mailto_subject("", html, &[]);
        assert_eq!(
            once,
            r#"<a href="mailto:a@example.org?subject=Hello%20there">Write [Hello there]</a>"#
        );
        assert_eq!(add_mailto_subject("", &once, &[]), once);
    }

    #[test]
    fn test_add_dynamic_image() {
        let html = r#"<img data-src="https://x/real.png" src="data:image/gif;base64,R0">"#;
        let once = add_dynamic_image("", html, &[]);
        assert_eq!(once, r#"<img data-src="https://x/real.png" src="https://x/real.png">"#);
        assert_eq!(add_dynamic_image("", &once, &[]), once);

        let untouched = r#"<img src="https://x/a.png" data-src="https://x/b.png">"#;
        assert_eq!(add_dynamic_image("", untouched, &[]), untouched);
    }

    #[test]
    fn test_add_youtube_video() {
        let out = add_youtube_video("https://www.youtube.com/watch?v=1234", "Video", &[]);
        assert_eq!(
            out,
            r#"<iframe width="650" height="350" frameborder="0" src="https://www.youtube-nocookie.com/embed/1234" allowfullscreen></iframe><p>Video</p>"#
        );
        assert_eq!(add_youtube_video("https://www.youtube.com/watch?v=1234", &out, &[]), out);
        assert_eq!(add_youtube_video("https://example.org/", "Video", &[]), "Video");
    }

    #[test]
    fn test_pdf_link_always_applied_once() {
        let r = rewriter();
        let out = r.rewrite("https://example.org/paper.pdf", "Abstract", "");
        assert_eq!(
            out,
            r#"Abstract<p><a href="https://example.org/paper.pdf" download>Download PDF</a></p>"#
        );
        assert_eq!(r.rewrite("https://example.org/paper.pdf", &out, ""), out);
    }

    #[test]
    fn test_pdf_links_in_content_resolved() {
        let out = add_pdf_download_link(
            "https://example.org/post",
            r#"<a href="/files/a.PDF?x=1">a</a>"#,
            &[],
        );
        assert!(out.ends_with(
            r#"<p><a href="https://example.org/files/a.PDF?x=1" download>Download PDF</a></p>"#
        ));
    }

    #[test]
    fn test_convert_text_links() {
        assert_eq!(
            convert_text_links("see https://example.org/a and http://x.org"),
            r#"see <a href="https://example.org/a">https://example.org/a</a> and <a href="http://x.org">http://x.org</a>"#
        );
        let linked = r#"<a href="https://example.org/">https://example.org/</a>"#;
        assert_eq!(convert_text_links(linked), linked);
    }

    #[test]
    fn test_nl2br() {
        assert_eq!(nl2br("a\nb\r\nc"), "a<br>b<br>c");
    }

    #[test]
    fn test_replace_rule() {
        let r = rewriter();
        assert_eq!(
            r.rewrite("https://example.org/", "<p>ads here</p>", r#"replace("ads\s+"|"")"#),
            "<p>here</p>"
        );
        assert_eq!(
            r.rewrite("https://example.org/", "keep", r#"replace("("|"x")"#),
            "keep"
        );
    }
}
