use secrecy::ExposeSecret;
use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{DatabaseError, Feed, FeedDbRow, FeedRefreshUpdate, NewFeed};
use crate::feed::ParsedEntry;

const FEED_COLUMNS: &str = "id, user_id, category_id, feed_url, site_url, title, checked_at, \
     etag_header, last_modified_header, parsing_error_count, parsing_error_msg, scraper_rules, \
     rewrite_rules, crawler, user_agent, username, password, disabled, polling_interval_minutes";

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Insert a subscription and return its id.
    pub async fn create_feed(&self, feed: &NewFeed) -> Result<i64, DatabaseError> {
        let password = feed
            .password
            .as_ref()
            .map(|p| p.expose_secret().to_string())
            .unwrap_or_default();

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO feeds (
                user_id, feed_url, title, site_url, crawler, scraper_rules, rewrite_rules,
                user_agent, username, password, polling_interval_minutes
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
        "#,
        )
        .bind(feed.user_id)
        .bind(&feed.feed_url)
        .bind(&feed.title)
        .bind(&feed.site_url)
        .bind(feed.crawler)
        .bind(&feed.scraper_rules)
        .bind(&feed.rewrite_rules)
        .bind(&feed.user_agent)
        .bind(&feed.username)
        .bind(password)
        .bind(feed.polling_interval_minutes)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(feed_id = id, user_id = feed.user_id, url = %feed.feed_url, "Feed created");
        Ok(id)
    }

    /// Load a feed owned by `user_id`.
    pub async fn feed_by_id(&self, user_id: i64, feed_id: i64) -> Result<Option<Feed>, DatabaseError> {
        let row: Option<FeedDbRow> = sqlx::query_as(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE id = ? AND user_id = ?"
        ))
        .bind(feed_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(FeedDbRow::into_feed))
    }

    pub async fn set_feed_disabled(&self, feed_id: i64, disabled: bool) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE feeds SET disabled = ? WHERE id = ?")
            .bind(disabled)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record a failed refresh: bump the error counter by one, store the
    /// message and mark the feed as checked. Returns the new counter.
    pub async fn record_feed_error(&self, feed_id: i64, message: &str) -> Result<i64, DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        let count: Option<(i64,)> = sqlx::query_as(
            "UPDATE feeds SET parsing_error_count = parsing_error_count + 1,
                              parsing_error_msg = ?, checked_at = ?
             WHERE id = ? RETURNING parsing_error_count",
        )
        .bind(message)
        .bind(now)
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?;

        count.map(|(c,)| c).ok_or(DatabaseError::NotFound {
            what: "feed",
            id: feed_id,
        })
    }

    /// Record a check that found nothing new (HTTP 304): clears the error
    /// state and bumps `checked_at`.
    pub async fn touch_feed(&self, feed_id: i64) -> Result<(), DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            "UPDATE feeds SET checked_at = ?, parsing_error_count = 0, parsing_error_msg = ''
             WHERE id = ?",
        )
        .bind(now)
        .bind(feed_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Point a feed at a new URL (after a permanent redirect).
    pub async fn update_feed_url(&self, feed_id: i64, feed_url: &str) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE feeds SET feed_url = ? WHERE id = ?")
            .bind(feed_url)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Complete a feed refresh atomically: insert new entries (and their
    /// enclosures), update feed metadata, clear the error state.
    ///
    /// Entries whose `(feed_id, hash)` already exists are skipped and left
    /// untouched, which also absorbs a concurrent refresh of the same feed.
    ///
    /// # Returns
    ///
    /// The number of newly inserted entries.
    pub async fn complete_feed_refresh(
        &self,
        feed_id: i64,
        update: &FeedRefreshUpdate,
        entries: &[ParsedEntry],
    ) -> Result<usize, DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let user_id: Option<(i64,)> = sqlx::query_as("SELECT user_id FROM feeds WHERE id = ?")
            .bind(feed_id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some((user_id,)) = user_id else {
            return Err(DatabaseError::NotFound {
                what: "feed",
                id: feed_id,
            });
        };

        let mut inserted: usize = 0;
        for entry in entries {
            let entry_id: Option<(i64,)> = sqlx::query_as(
                r#"
                INSERT INTO entries (
                    user_id, feed_id, hash, title, url, comments_url, author, content,
                    published_at, status, starred, created_at, changed_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'unread', 0, ?, ?)
                ON CONFLICT(feed_id, hash) DO NOTHING
                RETURNING id
            "#,
            )
            .bind(user_id)
            .bind(feed_id)
            .bind(&entry.hash)
            .bind(&entry.title)
            .bind(&entry.url)
            .bind(&entry.comments_url)
            .bind(&entry.author)
            .bind(&entry.content)
            .bind(entry.date.map(|d| d.timestamp()))
            .bind(now)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?;

            let Some((entry_id,)) = entry_id else {
                continue;
            };
            inserted += 1;

            if entry.enclosures.is_empty() {
                continue;
            }
            let mut builder: QueryBuilder<sqlx::Sqlite> =
                QueryBuilder::new("INSERT INTO enclosures (entry_id, url, mime_type, size) ");
            builder.push_values(&entry.enclosures, |mut b, enclosure| {
                b.push_bind(entry_id)
                    .push_bind(&enclosure.url)
                    .push_bind(&enclosure.mime_type)
                    .push_bind(enclosure.size);
            });
            builder.build().execute(&mut *tx).await?;
        }

        sqlx::query(
            r#"
            UPDATE feeds SET
                title = CASE WHEN title = '' THEN ? ELSE title END,
                site_url = CASE WHEN ? = '' THEN site_url ELSE ? END,
                feed_url = CASE WHEN ? = '' THEN feed_url ELSE ? END,
                etag_header = ?,
                last_modified_header = ?,
                checked_at = ?,
                parsing_error_count = 0,
                parsing_error_msg = ''
            WHERE id = ?
        "#,
        )
        .bind(&update.title)
        .bind(&update.site_url)
        .bind(&update.site_url)
        .bind(&update.feed_url)
        .bind(&update.feed_url)
        .bind(&update.etag_header)
        .bind(&update.last_modified_header)
        .bind(now)
        .bind(feed_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(inserted)
    }
}
