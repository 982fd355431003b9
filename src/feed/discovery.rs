//! Subscription finder: tells whether a URL is a feed, or lists the feeds a
//! web page advertises through `<link type="...">` elements.

use scraper::{Html, Selector};
use thiserror::Error;

use super::parser::{detect_format, FeedFormat};
use crate::http::{Credentials, FetchError, FetchRequest, HttpClient};
use crate::util::{absolute_url, strip_control_chars};

/// Link types advertised by HTML pages and the subscription kind they map to.
const LINK_TYPES: &[(&str, &str)] = &[
    ("application/rss+xml", "rss"),
    ("application/atom+xml", "atom"),
    ("application/json", "json"),
];

/// A feed found at or referenced by a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub title: String,
    pub url: String,
    /// `rss`, `atom` or `json`.
    pub kind: String,
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("You are not authorized to access this resource (invalid username/password)")]
    Unauthorized,
    #[error("Unable to fetch this resource (Status Code = 403)")]
    Forbidden,
    #[error("Resource not found (404), this URL doesn't exist")]
    NotFound,
    #[error("Unable to fetch this resource (Status Code = {0})")]
    HttpStatus(u16),
    #[error("Unable to fetch this resource: {0}")]
    Fetch(#[source] FetchError),
    #[error("Unable to analyze this page: {0}")]
    UnreadablePage(String),
}

impl DiscoveryError {
    /// Message key for user-facing localization.
    pub fn translation_key(&self) -> &'static str {
        match self {
            DiscoveryError::InvalidUrl(_) => "error.invalid_url",
            DiscoveryError::Unauthorized => "error.http_unauthorized",
            DiscoveryError::Forbidden => "error.http_forbidden",
            DiscoveryError::NotFound => "error.http_not_found",
            DiscoveryError::HttpStatus(_) => "error.http_status",
            DiscoveryError::Fetch(_) => "error.http_fetch",
            DiscoveryError::UnreadablePage(_) => "error.unreadable_page",
        }
    }
}

impl From<FetchError> for DiscoveryError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::InvalidUrl(msg) => DiscoveryError::InvalidUrl(msg),
            FetchError::Unauthorized => DiscoveryError::Unauthorized,
            FetchError::Forbidden => DiscoveryError::Forbidden,
            FetchError::NotFound => DiscoveryError::NotFound,
            FetchError::HttpStatus(code) => DiscoveryError::HttpStatus(code),
            other => DiscoveryError::Fetch(other),
        }
    }
}

/// Finds the subscriptions available at `url`.
///
/// A feed document yields itself (titled and addressed by the URL reached
/// after redirects). An HTML page yields its advertised feed links in
/// document order; links without a resolvable `href` are dropped. An empty
/// list means the page advertises nothing.
///
/// # Errors
///
/// HTTP failures map to the matching [`DiscoveryError`] variant; bodies that
/// are not text are [`DiscoveryError::UnreadablePage`].
pub async fn find_subscriptions(
    client: &HttpClient,
    url: &str,
    user_agent: &str,
    credentials: Option<Credentials>,
) -> Result<Vec<Subscription>, DiscoveryError> {
    let request = FetchRequest::new(url)
        .user_agent(user_agent)
        .credentials(credentials);
    let response = client.fetch(request).await?;

    let mime = response.mime_type();
    if !is_textual(&mime) {
        return Err(DiscoveryError::UnreadablePage(format!(
            "unsupported content type {mime}"
        )));
    }

    let text = response.text();
    let format = detect_format(&text);
    if format != FeedFormat::Unknown {
        tracing::debug!(url = %response.effective_url, format = %format, "URL is a feed");
        return Ok(vec![Subscription {
            title: response.effective_url.clone(),
            url: response.effective_url,
            kind: format.as_str().to_string(),
        }]);
    }

    let subscriptions = parse_link_elements(&response.effective_url, &text)?;
    tracing::debug!(
        url = %response.effective_url,
        found = subscriptions.len(),
        "Scanned page for feed links"
    );
    Ok(subscriptions)
}

fn is_textual(mime: &str) -> bool {
    mime.is_empty()
        || mime.starts_with("text/")
        || mime.contains("xml")
        || mime.contains("json")
        || mime.contains("html")
}

/// Feed links declared by an HTML document, resolved against `base_url`.
pub fn parse_link_elements(base_url: &str, page: &str) -> Result<Vec<Subscription>, DiscoveryError> {
    let selector = Selector::parse("link[type]")
        .map_err(|e| DiscoveryError::UnreadablePage(e.to_string()))?;
    let document = Html::parse_document(page);

    let mut subscriptions = Vec::new();
    for link in document.select(&selector) {
        let link_type = link.value().attr("type").unwrap_or("").trim().to_ascii_lowercase();
        let Some((_, kind)) = LINK_TYPES.iter().find(|(t, _)| *t == link_type) else {
            continue;
        };

        let Some(href) = link
            .value()
            .attr("href")
            .and_then(|href| absolute_url(base_url, href))
        else {
            continue;
        };

        let title = link
            .value()
            .attr("title")
            .map(|t| strip_control_chars(t.trim()).into_owned())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| href.clone());

        subscriptions.push(Subscription {
            title,
            url: href,
            kind: kind.to_string(),
        });
    }

    Ok(subscriptions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpSettings;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> HttpClient {
        HttpClient::new(HttpSettings {
            allow_private_networks: true,
            ..HttpSettings::default()
        })
        .unwrap()
    }

    #[test]
    fn test_link_elements_in_document_order() {
        let page = r#"<html><head>
            <link rel="stylesheet" type="text/css" href="/style.css">
            <link rel="alternate" type="application/atom+xml" title="Atom" href="/atom.xml">
            <link rel="alternate" type="application/rss+xml" href="//cdn.example.org/rss.xml">
            <link rel="alternate" type="application/json" title=" JSON " href="https://example.org/feed.json">
            <link rel="alternate" type="application/rss+xml" title="Broken">
        </head></html>"#;

        let subs = parse_link_elements("https://example.org/blog/", page).unwrap();
        assert_eq!(
            subs,
            vec![
                Subscription {
                    title: "Atom".into(),
                    url: "https://example.org/atom.xml".into(),
                    kind: "atom".into(),
                },
                Subscription {
                    title: "https://cdn.example.org/rss.xml".into(),
                    url: "https://cdn.example.org/rss.xml".into(),
                    kind: "rss".into(),
                },
                Subscription {
                    title: "JSON".into(),
                    url: "https://example.org/feed.json".into(),
                    kind: "json".into(),
                },
            ]
        );
    }

    #[test]
    fn test_type_match_ignores_case() {
        let page = r#"<link type="Application/RSS+XML" href="/f">"#;
        let subs = parse_link_elements("https://example.org/", page).unwrap();
        assert_eq!(subs.len(), 1);
    }

    #[tokio::test]
    async fn test_feed_url_returns_itself() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(
                        r#"<?xml version="1.0"?><rss version="2.0"><channel><title>T</title></channel></rss>"#,
                        "application/xml",
                    ),
            )
            .mount(&server)
            .await;

        let url = format!("{}/feed.xml", server.uri());
        let subs = find_subscriptions(&client(), &url, "", None).await.unwrap();
        assert_eq!(
            subs,
            vec![Subscription {
                title: url.clone(),
                url,
                kind: "rss".into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_malformed_feed_is_still_a_feed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/broken.json"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"version": "https://jsonfeed.org/version/1.1", "items": [{"title": "#,
                "application/feed+json",
            ))
            .mount(&server)
            .await;

        let url = format!("{}/broken.json", server.uri());
        let subs = find_subscriptions(&client(), &url, "", None).await.unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].url, url);
        assert_eq!(subs[0].kind, "json");
    }

    #[tokio::test]
    async fn test_binary_page_is_unreadable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(vec![0x89, b'P', b'N', b'G'], "image/png"),
            )
            .mount(&server)
            .await;

        let err = find_subscriptions(&client(), &server.uri(), "", None)
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Unable to analyze this page: "));
        assert_eq!(err.translation_key(), "error.unreadable_page");
    }

    #[tokio::test]
    async fn test_http_errors_are_distinct() {
        let server = MockServer::start().await;
        for (code, route) in [(401, "/401"), (403, "/403"), (404, "/404"), (502, "/502")] {
            Mock::given(path(route))
                .respond_with(ResponseTemplate::new(code))
                .mount(&server)
                .await;
        }
        let client = client();
        let find = |route: &'static str| {
            let url = format!("{}{route}", server.uri());
            let client = client.clone();
            async move { find_subscriptions(&client, &url, "", None).await }
        };

        assert!(matches!(find("/401").await, Err(DiscoveryError::Unauthorized)));
        assert!(matches!(find("/403").await, Err(DiscoveryError::Forbidden)));
        assert!(matches!(find("/404").await, Err(DiscoveryError::NotFound)));
        assert!(matches!(find("/502").await, Err(DiscoveryError::HttpStatus(502))));
    }
}
