//! Full-page content fetcher for truncated feed entries.

use scraper::{Html, Selector};
use thiserror::Error;

use super::readability;
use super::rules::DomainRules;
use crate::http::{FetchError, FetchRequest, HttpClient};

#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("Unable to download web page: {0}")]
    ServerFailure(#[source] FetchError),
    #[error("Unable to download web page: {0}")]
    Fetch(#[source] FetchError),
    #[error("This resource is not a HTML document ({0})")]
    NotHtml(String),
    #[error("Invalid scraper rule {rules:?}: {message}")]
    InvalidSelector { rules: String, message: String },
    #[error("No content found on the page")]
    NoContent,
}

impl From<FetchError> for ScraperError {
    fn from(e: FetchError) -> Self {
        match e.status() {
            Some(_) => ScraperError::ServerFailure(e),
            None => ScraperError::Fetch(e),
        }
    }
}

/// Downloads pages and cuts out their main content.
pub struct Scraper {
    client: HttpClient,
    domain_rules: DomainRules,
}

impl Scraper {
    pub fn new(client: HttpClient, domain_rules: DomainRules) -> Self {
        Self {
            client,
            domain_rules,
        }
    }

    /// Fetches `page_url` and extracts its content.
    ///
    /// `rules` is a CSS selector list; when empty the domain table is
    /// consulted with the URL reached after redirects, and without any rule
    /// the readability heuristic is used.
    pub async fn fetch(
        &self,
        page_url: &str,
        rules: &str,
        user_agent: &str,
    ) -> Result<String, ScraperError> {
        let response = self
            .client
            .fetch(FetchRequest::new(page_url).user_agent(user_agent))
            .await?;

        if !is_html(&response.content_type) {
            return Err(ScraperError::NotHtml(response.content_type));
        }

        let page = response.text();
        let rules = if rules.trim().is_empty() {
            self.domain_rules
                .lookup(&response.effective_url)
                .unwrap_or("")
        } else {
            rules
        };

        if rules.trim().is_empty() {
            tracing::debug!(url = %response.effective_url, "Using readability");
            readability::extract_content(&page).ok_or(ScraperError::NoContent)
        } else {
            tracing::debug!(url = %response.effective_url, rules, "Using scraper rules");
            select_content(&page, rules)
        }
    }
}

fn is_html(content_type: &str) -> bool {
    let content_type = content_type.trim().to_ascii_lowercase();
    content_type.starts_with("text/html") || content_type.starts_with("application/xhtml+xml")
}

/// Outer HTML of every element matching `rules`, in document order.
pub fn select_content(page: &str, rules: &str) -> Result<String, ScraperError> {
    let selector = Selector::parse(rules).map_err(|e| ScraperError::InvalidSelector {
        rules: rules.to_string(),
        message: e.to_string(),
    })?;

    let document = Html::parse_document(page);
    Ok(document.select(&selector).map(|el| el.html()).collect())
}
