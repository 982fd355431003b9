//! Main-content extraction for pages without a scraper rule.
//!
//! Paragraph-like elements (`p`, `pre`, `td`) add a score to their parent and
//! half of it to their grandparent. Candidates start from a tag weight plus
//! class/id hints, are scaled by how much of their text is link text, and the
//! best one (together with qualifying siblings) is returned.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

static UNLIKELY_CANDIDATES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)banner|breadcrumbs|combx|comment|community|cover-wrap|disqus|extra|foot|header|legends|menu|modal|related|remark|replies|rss|shoutbox|sidebar|skyscraper|social|sponsor|supplemental|ad-break|agegate|pagination|pager|popup|yom-remote",
    )
    .unwrap()
});
static MAYBE_CANDIDATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)and|article|body|column|main|shadow").unwrap());
static POSITIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)article|body|content|entry|hentry|h-entry|main|page|pagination|post|text|blog|story")
        .unwrap()
});
static NEGATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)hidden|^hid$| hid$| hid |^hid |banner|combx|comment|com-|contact|foot|footer|footnote|masthead|media|meta|modal|outbrain|promo|related|scroll|share|shoutbox|sidebar|skyscraper|sponsor|shopping|tags|tool|widget|byline|author|dateline|writtenby|p-author",
    )
    .unwrap()
});

static ALL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("*").unwrap());
static PARAGRAPHS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("p, pre, td").unwrap());
static LINKS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());

const MIN_PARAGRAPH_LENGTH: usize = 25;

/// Returns the HTML of the most content-like subtree, wrapped in a `<div>`,
/// or `None` when no paragraph scored.
pub fn extract_content(page: &str) -> Option<String> {
    let mut document = Html::parse_document(page);
    remove_noise(&mut document);

    let mut scores = HashMap::new();
    for paragraph in document.select(&PARAGRAPHS) {
        let text_len = inner_text(paragraph).chars().count();
        if text_len < MIN_PARAGRAPH_LENGTH {
            continue;
        }

        let Some(parent) = parent_element(paragraph) else {
            continue;
        };
        let grandparent = parent_element(parent);

        let text = inner_text(paragraph);
        let score = 1.0 + text.matches(',').count() as f64 + (text_len / 100).min(3) as f64;

        *scores
            .entry(parent.id())
            .or_insert_with(|| initial_score(parent)) += score;
        if let Some(grandparent) = grandparent {
            *scores
                .entry(grandparent.id())
                .or_insert_with(|| initial_score(grandparent)) += score / 2.0;
        }
    }

    for (id, score) in scores.iter_mut() {
        if let Some(el) = document.tree.get(*id).and_then(ElementRef::wrap) {
            *score *= 1.0 - link_density(el);
        }
    }

    // ties go to the earliest candidate in document order
    let mut best: Option<(ElementRef, f64)> = None;
    for el in document.select(&ALL) {
        let Some(&score) = scores.get(&el.id()) else {
            continue;
        };
        if best.map_or(true, |(_, top_score)| score > top_score) {
            best = Some((el, score));
        }
    }
    let (top, top_score) = best?;
    let top_id = top.id();

    tracing::debug!(
        tag = top.value().name(),
        score = top_score,
        candidates = scores.len(),
        "Readability picked top candidate"
    );

    let threshold = (top_score * 0.2).max(10.0);
    let top_class = top.value().attr("class").unwrap_or("");

    let siblings: Vec<ElementRef> = match parent_element(top) {
        Some(parent) => parent.children().filter_map(ElementRef::wrap).collect(),
        None => vec![top],
    };

    let mut output = String::from("<div>");
    for sibling in siblings {
        let keep = if sibling.id() == top_id {
            true
        } else {
            let mut bonus = 0.0;
            if !top_class.is_empty() && sibling.value().attr("class") == Some(top_class) {
                bonus += top_score * 0.2;
            }
            let score = scores.get(&sibling.id()).copied().unwrap_or(0.0) + bonus;
            score >= threshold || is_loose_paragraph(sibling)
        };
        if keep {
            output.push_str(&sibling.html());
        }
    }
    output.push_str("</div>");

    Some(output)
}

fn remove_noise(document: &mut Html) {
    let doomed: Vec<_> = document
        .select(&ALL)
        .filter(|el| {
            let name = el.value().name();
            if matches!(name, "script" | "style" | "noscript") {
                return true;
            }
            if matches!(name, "html" | "body" | "article" | "main") {
                return false;
            }
            let hints = class_and_id(*el);
            !hints.is_empty()
                && UNLIKELY_CANDIDATES.is_match(&hints)
                && !MAYBE_CANDIDATE.is_match(&hints)
        })
        .map(|el| el.id())
        .collect();

    for id in doomed {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }
}

fn initial_score(el: ElementRef) -> f64 {
    let tag_weight = match el.value().name() {
        "div" => 5.0,
        "pre" | "td" | "blockquote" => 3.0,
        "address" | "ol" | "ul" | "dl" | "dd" | "dt" | "li" | "form" => -3.0,
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "th" => -5.0,
        _ => 0.0,
    };
    tag_weight + class_weight(el)
}

fn class_weight(el: ElementRef) -> f64 {
    let mut weight = 0.0;
    for hint in [el.value().attr("class"), el.value().attr("id")]
        .into_iter()
        .flatten()
        .filter(|h| !h.is_empty())
    {
        if NEGATIVE.is_match(hint) {
            weight -= 25.0;
        }
        if POSITIVE.is_match(hint) {
            weight += 25.0;
        }
    }
    weight
}

/// Share of the element's text that sits inside links.
fn link_density(el: ElementRef) -> f64 {
    let total = inner_text(el).chars().count();
    if total == 0 {
        return 0.0;
    }
    let linked: usize = el
        .select(&LINKS)
        .map(|a| inner_text(a).chars().count())
        .sum();
    linked as f64 / total as f64
}

fn is_loose_paragraph(el: ElementRef) -> bool {
    if el.value().name() != "p" {
        return false;
    }
    let text = inner_text(el);
    let len = text.chars().count();
    let density = link_density(el);
    (len > 80 && density < 0.25) || (len > 0 && len <= 80 && density == 0.0 && text.ends_with('.'))
}

fn parent_element(el: ElementRef) -> Option<ElementRef> {
    el.parent().and_then(ElementRef::wrap)
}

fn class_and_id(el: ElementRef) -> String {
    let class = el.value().attr("class").unwrap_or("");
    let id = el.value().attr("id").unwrap_or("");
    format!("{class} {id}").trim().to_string()
}

fn inner_text(el: ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}
