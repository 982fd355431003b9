//! Outbound HTTP for feeds, subscription discovery and page scraping.
//!
//! One [`HttpClient`] is shared by every worker. Each fetch is bounded by the
//! configured timeout (connect through last body byte) and body size cap, and
//! targets are checked against private networks unless explicitly allowed.

use std::sync::LazyLock;
use std::time::Duration;

use futures::StreamExt;
use regex::Regex;
use reqwest::header::{
    CONTENT_TYPE, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED, USER_AGENT,
};
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

use crate::util::validate_url;

const MAX_REDIRECTS: usize = 5;

static META_CHARSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?\s*([a-z0-9_:.\-]+)"#).unwrap()
});

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// DNS, connection, TLS or protocol failure.
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Access unauthorized (HTTP 401)")]
    Unauthorized,
    #[error("Access forbidden (HTTP 403)")]
    Forbidden,
    #[error("Resource not found (HTTP 404)")]
    NotFound,
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

impl FetchError {
    /// HTTP status behind the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::HttpStatus(code) => Some(*code),
            FetchError::Unauthorized => Some(401),
            FetchError::Forbidden => Some(403),
            FetchError::NotFound => Some(404),
            _ => None,
        }
    }

    fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => FetchError::Unauthorized,
            StatusCode::FORBIDDEN => FetchError::Forbidden,
            StatusCode::NOT_FOUND => FetchError::NotFound,
            other => FetchError::HttpStatus(other.as_u16()),
        }
    }
}

/// HTTP basic credentials attached to a feed.
#[derive(Debug)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

/// Static client settings.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub max_body_size: usize,
    /// Sent when a request does not carry its own user agent.
    pub user_agent: String,
    /// Permit loopback and private addresses (local testing only).
    pub allow_private_networks: bool,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            max_body_size: 15 * 1024 * 1024,
            user_agent: concat!("rivulet/", env!("CARGO_PKG_VERSION")).to_string(),
            allow_private_networks: false,
        }
    }
}

/// A single GET.
#[derive(Debug, Default)]
pub struct FetchRequest {
    pub url: String,
    pub user_agent: Option<String>,
    pub credentials: Option<Credentials>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Per-request user agent; blank values fall back to the client default.
    pub fn user_agent(mut self, user_agent: &str) -> Self {
        let user_agent = user_agent.trim();
        if !user_agent.is_empty() {
            self.user_agent = Some(user_agent.to_string());
        }
        self
    }

    pub fn credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials.filter(|c| !c.username.is_empty());
        self
    }

    /// Conditional request validators from a previous response.
    pub fn validators(mut self, etag: &str, last_modified: &str) -> Self {
        self.etag = Some(etag.trim().to_string()).filter(|v| !v.is_empty());
        self.last_modified = Some(last_modified.trim().to_string()).filter(|v| !v.is_empty());
        self
    }
}

/// A successful (2xx) or not-modified (304) response with its body.
#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: u16,
    /// Final URL after redirects.
    pub effective_url: String,
    pub content_type: String,
    pub etag: String,
    pub last_modified: String,
    pub body: Vec<u8>,
}

impl FetchedResponse {
    pub fn is_not_modified(&self) -> bool {
        self.status == StatusCode::NOT_MODIFIED.as_u16()
    }

    /// Whether the server moved us away from `requested_url`.
    ///
    /// Both sides are compared in normalized form, so `https://Example.com`
    /// and `https://example.com/` are the same location.
    pub fn is_redirected(&self, requested_url: &str) -> bool {
        match (Url::parse(requested_url.trim()), Url::parse(&self.effective_url)) {
            (Ok(requested), Ok(effective)) => requested != effective,
            _ => self.effective_url != requested_url,
        }
    }

    /// Content type without parameters, lowercased.
    pub fn mime_type(&self) -> String {
        self.content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase()
    }

    /// Body decoded to UTF-8.
    ///
    /// The charset comes from the `Content-Type` header, then a `<meta>`
    /// declaration or the XML declaration in the first kilobyte, and
    /// defaults to UTF-8.
    pub fn text(&self) -> String {
        let encoding = self
            .header_charset()
            .or_else(|| self.sniffed_charset())
            .and_then(|label| encoding_rs::Encoding::for_label(label.as_bytes()));

        match encoding {
            Some(encoding) => {
                let (text, _, _) = encoding.decode(&self.body);
                text.into_owned()
            }
            None => crate::feed::decode_document(&self.body),
        }
    }

    fn header_charset(&self) -> Option<String> {
        self.content_type.split(';').skip(1).find_map(|param| {
            let (key, value) = param.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("charset")
                .then(|| value.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
        })
    }

    fn sniffed_charset(&self) -> Option<String> {
        let head = &self.body[..self.body.len().min(1024)];
        let head = String::from_utf8_lossy(head);
        META_CHARSET
            .captures(&head)
            .map(|caps| caps[1].to_string())
    }
}

/// Shared outbound client.
#[derive(Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    settings: HttpSettings,
}

impl HttpClient {
    pub fn new(settings: HttpSettings) -> Result<Self, FetchError> {
        let inner = reqwest::Client::builder()
            .redirect(redirect_policy(settings.allow_private_networks))
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(settings.timeout)
            .build()?;

        Ok(Self { inner, settings })
    }

    pub fn settings(&self) -> &HttpSettings {
        &self.settings
    }

    /// Performs a GET.
    ///
    /// # Errors
    ///
    /// Statuses of 400 and above become [`FetchError::Unauthorized`],
    /// [`FetchError::Forbidden`], [`FetchError::NotFound`] or
    /// [`FetchError::HttpStatus`]. 304 is returned as a response.
    pub async fn fetch(&self, request: FetchRequest) -> Result<FetchedResponse, FetchError> {
        let url = validate_url(&request.url, self.settings.allow_private_networks)
            .map_err(|e| FetchError::InvalidUrl(e.to_string()))?;

        let user_agent = request
            .user_agent
            .as_deref()
            .unwrap_or(&self.settings.user_agent);

        let mut builder = self.inner.get(url).header(USER_AGENT, user_agent);
        if let Some(credentials) = &request.credentials {
            builder = builder.basic_auth(
                &credentials.username,
                Some(credentials.password.expose_secret()),
            );
        }
        if let Some(etag) = &request.etag {
            builder = builder.header(IF_NONE_MATCH, etag);
        }
        if let Some(last_modified) = &request.last_modified {
            builder = builder.header(IF_MODIFIED_SINCE, last_modified);
        }

        let timeout = self.settings.timeout;
        let max_body_size = self.settings.max_body_size;

        tokio::time::timeout(timeout, async move {
            let response = builder.send().await?;
            let status = response.status();

            tracing::debug!(
                url = %request.url,
                effective_url = %response.url(),
                status = status.as_u16(),
                "Fetched"
            );

            if status.as_u16() >= 400 {
                return Err(FetchError::from_status(status));
            }

            let header = |name: reqwest::header::HeaderName| {
                response
                    .headers()
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string()
            };
            let content_type = header(CONTENT_TYPE);
            let etag = header(ETAG);
            let last_modified = header(LAST_MODIFIED);
            let effective_url = response.url().to_string();

            let body = if status == StatusCode::NOT_MODIFIED {
                Vec::new()
            } else {
                read_limited_bytes(response, max_body_size).await?
            };

            Ok(FetchedResponse {
                status: status.as_u16(),
                effective_url,
                content_type,
                etag,
                last_modified,
                body,
            })
        })
        .await
        .map_err(|_| FetchError::Timeout(timeout))?
    }
}

/// Bounded redirects with loop detection; redirect targets get the same
/// address checks as the original URL.
fn redirect_policy(allow_private_networks: bool) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("Too many redirects");
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev == url) {
            return attempt.error("Redirect loop detected");
        }

        if let Err(e) = validate_url(url.as_str(), allow_private_networks) {
            return attempt.error(e);
        }

        tracing::debug!(
            from = %attempt.previous().last().map(|u| u.as_str()).unwrap_or("initial"),
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );

        attempt.follow()
    })
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
