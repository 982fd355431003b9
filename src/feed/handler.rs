//! Feed refresh orchestration: fetch, parse, deduplicate, rewrite, scrape
//! and persist one feed.

use std::fmt;
use std::future::Future;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use super::parser::{detect_format, parse_text, FeedFormat, ParseError, ParsedEntry};
use crate::content::{Rewriter, Scraper};
use crate::http::{Credentials, FetchError, FetchRequest, HttpClient};
use crate::storage::{Database, DatabaseError, Feed, FeedRefreshUpdate, Job};
use crate::util::text_length;
use crate::worker::JobHandler;

/// Where a refresh currently is, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStage {
    Fetching,
    FormatDetecting,
    Parsing,
    Deduplicating,
    Rewriting,
    Scraping,
    Persisting,
    Done,
    Failed,
}

impl RefreshStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshStage::Fetching => "fetching",
            RefreshStage::FormatDetecting => "format_detecting",
            RefreshStage::Parsing => "parsing",
            RefreshStage::Deduplicating => "deduplicating",
            RefreshStage::Rewriting => "rewriting",
            RefreshStage::Scraping => "scraping",
            RefreshStage::Persisting => "persisting",
            RefreshStage::Done => "done",
            RefreshStage::Failed => "failed",
        }
    }
}

impl fmt::Display for RefreshStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("feed {feed_id} of user {user_id} not found")]
    FeedNotFound { user_id: i64, feed_id: i64 },
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Outcome of a successful refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub feed_id: i64,
    /// The server answered 304; nothing was parsed.
    pub not_modified: bool,
    /// Entries in the payload.
    pub received: usize,
    /// Entries actually inserted.
    pub inserted: usize,
    /// Entries whose content was replaced by the scraped page.
    pub scraped: usize,
}

/// Knobs of the refresh pipeline that do not live on the feed itself.
#[derive(Debug, Clone, Default)]
pub struct HandlerSettings {
    /// Scrape entries whose visible text is shorter than this; 0 disables.
    pub min_content_length: usize,
}

/// Refreshes feeds; implements [`JobHandler`] for the worker pool.
pub struct FeedHandler {
    db: Database,
    client: HttpClient,
    rewriter: Rewriter,
    scraper: Scraper,
    settings: HandlerSettings,
}

impl FeedHandler {
    pub fn new(
        db: Database,
        client: HttpClient,
        rewriter: Rewriter,
        scraper: Scraper,
        settings: HandlerSettings,
    ) -> Self {
        Self {
            db,
            client,
            rewriter,
            scraper,
            settings,
        }
    }

    /// Refreshes one feed.
    ///
    /// Fetch and parse failures are recorded on the feed (error counter +1,
    /// message stored) and returned. Storage failures are returned without
    /// touching the feed.
    pub async fn refresh_feed(
        &self,
        user_id: i64,
        feed_id: i64,
    ) -> Result<RefreshSummary, RefreshError> {
        let feed = self
            .db
            .feed_by_id(user_id, feed_id)
            .await?
            .ok_or(RefreshError::FeedNotFound { user_id, feed_id })?;

        match self.run(&feed).await {
            Ok(summary) => {
                tracing::info!(
                    feed_id,
                    stage = %RefreshStage::Done,
                    not_modified = summary.not_modified,
                    received = summary.received,
                    inserted = summary.inserted,
                    "Feed refreshed"
                );
                Ok(summary)
            }
            Err(RefreshError::Database(e)) => Err(RefreshError::Database(e)),
            Err(e) => {
                let count = self.db.record_feed_error(feed_id, &e.to_string()).await?;
                tracing::warn!(
                    feed_id,
                    stage = %RefreshStage::Failed,
                    error = %e,
                    parsing_error_count = count,
                    "Feed refresh failed"
                );
                Err(e)
            }
        }
    }

    async fn run(&self, feed: &Feed) -> Result<RefreshSummary, RefreshError> {
        let mut summary = RefreshSummary {
            feed_id: feed.id,
            ..Default::default()
        };

        tracing::debug!(feed_id = feed.id, stage = %RefreshStage::Fetching, url = %feed.feed_url);
        let request = FetchRequest::new(&feed.feed_url)
            .user_agent(&feed.user_agent)
            .credentials(credentials(feed))
            .validators(&feed.etag_header, &feed.last_modified_header);
        let response = self.client.fetch(request).await?;

        if response.is_redirected(&feed.feed_url) {
            tracing::info!(
                feed_id = feed.id,
                from = %feed.feed_url,
                to = %response.effective_url,
                "Feed moved"
            );
            if let Err(e) = self.db.update_feed_url(feed.id, &response.effective_url).await {
                tracing::warn!(feed_id = feed.id, error = %e, "Failed to store new feed URL");
            }
        }

        if response.is_not_modified() {
            self.db.touch_feed(feed.id).await?;
            summary.not_modified = true;
            return Ok(summary);
        }

        tracing::debug!(feed_id = feed.id, stage = %RefreshStage::FormatDetecting);
        let text = response.text();
        let format = detect_format(&text);
        if format == FeedFormat::Unknown {
            return Err(ParseError::UnknownFormat.into());
        }

        tracing::debug!(feed_id = feed.id, stage = %RefreshStage::Parsing, format = %format);
        let parsed = parse_text(&response.effective_url, &text)?;
        summary.received = parsed.entries.len();

        tracing::debug!(feed_id = feed.id, stage = %RefreshStage::Deduplicating);
        let mut entries = self.new_entries(feed.id, parsed.entries).await?;

        tracing::debug!(feed_id = feed.id, stage = %RefreshStage::Rewriting, count = entries.len());
        for entry in &mut entries {
            entry.content = self
                .rewriter
                .rewrite(&entry.url, &entry.content, &feed.rewrite_rules);
        }

        summary.scraped = self.scrape_entries(feed, &mut entries).await;

        tracing::debug!(feed_id = feed.id, stage = %RefreshStage::Persisting);
        let update = FeedRefreshUpdate {
            title: parsed.title,
            site_url: parsed.site_url,
            feed_url: String::new(),
            etag_header: response.etag,
            last_modified_header: response.last_modified,
        };
        summary.inserted = self
            .db
            .complete_feed_refresh(feed.id, &update, &entries)
            .await?;

        Ok(summary)
    }

    /// Drops entries already stored for the feed and repeats within the payload.
    async fn new_entries(
        &self,
        feed_id: i64,
        entries: Vec<ParsedEntry>,
    ) -> Result<Vec<ParsedEntry>, DatabaseError> {
        let hashes: Vec<&str> = entries.iter().map(|e| e.hash.as_str()).collect();
        let mut seen = self.db.existing_hashes(feed_id, &hashes).await?;

        let before = entries.len();
        let fresh: Vec<ParsedEntry> = entries
            .into_iter()
            .filter(|e| seen.insert(e.hash.clone()))
            .collect();

        tracing::debug!(feed_id, fresh = fresh.len(), skipped = before - fresh.len());
        Ok(fresh)
    }

    /// Replaces entry content with the scraped page where the feed asks for
    /// it or the content is too short. Returns how many entries changed.
    async fn scrape_entries(&self, feed: &Feed, entries: &mut [ParsedEntry]) -> usize {
        let min = self.settings.min_content_length;
        let mut scraped = 0;

        for entry in entries.iter_mut() {
            let wanted = feed.crawler || (min > 0 && text_length(&entry.content) < min);
            if !wanted || entry.url.is_empty() {
                continue;
            }

            tracing::debug!(feed_id = feed.id, stage = %RefreshStage::Scraping, url = %entry.url);
            match self
                .scraper
                .fetch(&entry.url, &feed.scraper_rules, &feed.user_agent)
                .await
            {
                Ok(content) => {
                    entry.content =
                        self.rewriter
                            .rewrite(&entry.url, &content, &feed.rewrite_rules);
                    scraped += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        feed_id = feed.id,
                        url = %entry.url,
                        error = %e,
                        "Scraping failed, keeping feed content"
                    );
                }
            }
        }

        scraped
    }
}

fn credentials(feed: &Feed) -> Option<Credentials> {
    if feed.username.is_empty() {
        return None;
    }
    Some(Credentials {
        username: feed.username.clone(),
        password: SecretString::from(feed.password.expose_secret().to_owned()),
    })
}

impl JobHandler for FeedHandler {
    fn handle(&self, job: Job) -> impl Future<Output = ()> + Send {
        async move {
            if let Err(e) = self.refresh_feed(job.user_id, job.feed_id).await {
                tracing::error!(
                    user_id = job.user_id,
                    feed_id = job.feed_id,
                    error = %e,
                    "Job failed"
                );
            }
        }
    }
}
