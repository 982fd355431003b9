use secrecy::SecretString;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds the database lock
    #[error("Database is locked by another process")]
    Locked,

    #[error("Database migration failed: {0}")]
    Migration(String),

    #[error("{what} {id} not found")]
    NotFound { what: &'static str, id: i64 },

    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Classifies lock-related sqlx errors as [`DatabaseError::Locked`].
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14)
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::Locked;
        }

        DatabaseError::Other(err)
    }
}

// ============================================================================
// Feeds
// ============================================================================

/// A subscription as stored.
#[derive(Debug)]
pub struct Feed {
    pub id: i64,
    pub user_id: i64,
    pub category_id: Option<i64>,
    pub feed_url: String,
    pub site_url: String,
    pub title: String,
    /// Unix seconds of the last completed check.
    pub checked_at: Option<i64>,
    pub etag_header: String,
    pub last_modified_header: String,
    pub parsing_error_count: i64,
    pub parsing_error_msg: String,
    pub scraper_rules: String,
    pub rewrite_rules: String,
    /// Always fetch the original page for new entries.
    pub crawler: bool,
    pub user_agent: String,
    pub username: String,
    pub password: SecretString,
    pub disabled: bool,
    /// Overrides the global polling frequency when set.
    pub polling_interval_minutes: Option<i64>,
}

/// Internal row type for feed queries (used by sqlx FromRow).
/// Converts to [`Feed`] via `into_feed()`, moving the password into a secret.
#[derive(sqlx::FromRow)]
pub(crate) struct FeedDbRow {
    pub id: i64,
    pub user_id: i64,
    pub category_id: Option<i64>,
    pub feed_url: String,
    pub site_url: String,
    pub title: String,
    pub checked_at: Option<i64>,
    pub etag_header: String,
    pub last_modified_header: String,
    pub parsing_error_count: i64,
    pub parsing_error_msg: String,
    pub scraper_rules: String,
    pub rewrite_rules: String,
    pub crawler: bool,
    pub user_agent: String,
    pub username: String,
    pub password: String,
    pub disabled: bool,
    pub polling_interval_minutes: Option<i64>,
}

impl FeedDbRow {
    pub(crate) fn into_feed(self) -> Feed {
        Feed {
            id: self.id,
            user_id: self.user_id,
            category_id: self.category_id,
            feed_url: self.feed_url,
            site_url: self.site_url,
            title: self.title,
            checked_at: self.checked_at,
            etag_header: self.etag_header,
            last_modified_header: self.last_modified_header,
            parsing_error_count: self.parsing_error_count,
            parsing_error_msg: self.parsing_error_msg,
            scraper_rules: self.scraper_rules,
            rewrite_rules: self.rewrite_rules,
            crawler: self.crawler,
            user_agent: self.user_agent,
            username: self.username,
            password: SecretString::from(self.password),
            disabled: self.disabled,
            polling_interval_minutes: self.polling_interval_minutes,
        }
    }
}

/// Input for [`Database::create_feed`](super::Database::create_feed).
#[derive(Debug, Default)]
pub struct NewFeed {
    pub user_id: i64,
    pub feed_url: String,
    pub title: String,
    pub site_url: String,
    pub crawler: bool,
    pub scraper_rules: String,
    pub rewrite_rules: String,
    pub user_agent: String,
    pub username: String,
    pub password: Option<SecretString>,
    pub polling_interval_minutes: Option<i64>,
}

impl NewFeed {
    pub fn new(user_id: i64, feed_url: impl Into<String>) -> Self {
        Self {
            user_id,
            feed_url: feed_url.into(),
            ..Default::default()
        }
    }
}

/// Feed metadata written by a successful refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedRefreshUpdate {
    /// Only applied when the stored title is empty.
    pub title: String,
    pub site_url: String,
    pub feed_url: String,
    pub etag_header: String,
    pub last_modified_header: String,
}

// ============================================================================
// Entries
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Unread,
    Read,
    Removed,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Unread => "unread",
            EntryStatus::Read => "read",
            EntryStatus::Removed => "removed",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unread" => Ok(EntryStatus::Unread),
            "read" => Ok(EntryStatus::Read),
            "removed" => Ok(EntryStatus::Removed),
            other => Err(format!("unknown entry status: {other}")),
        }
    }
}

/// A stored entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub id: i64,
    pub user_id: i64,
    pub feed_id: i64,
    pub hash: String,
    pub title: String,
    pub url: String,
    pub comments_url: String,
    pub author: String,
    pub content: String,
    pub published_at: Option<i64>,
    pub status: EntryStatus,
    pub starred: bool,
    pub created_at: i64,
    pub changed_at: i64,
    pub enclosures: Vec<StoredEnclosure>,
}

/// Internal row type for entry queries; enclosures are loaded separately.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EntryDbRow {
    pub id: i64,
    pub user_id: i64,
    pub feed_id: i64,
    pub hash: String,
    pub title: String,
    pub url: String,
    pub comments_url: String,
    pub author: String,
    pub content: String,
    pub published_at: Option<i64>,
    pub status: String,
    pub starred: bool,
    pub created_at: i64,
    pub changed_at: i64,
}

impl EntryDbRow {
    pub(crate) fn into_entry(self, enclosures: Vec<StoredEnclosure>) -> Entry {
        let status = self.status.parse().unwrap_or_else(|e: String| {
            tracing::warn!(entry_id = self.id, error = %e, "Treating entry as unread");
            EntryStatus::Unread
        });
        Entry {
            id: self.id,
            user_id: self.user_id,
            feed_id: self.feed_id,
            hash: self.hash,
            title: self.title,
            url: self.url,
            comments_url: self.comments_url,
            author: self.author,
            content: self.content,
            published_at: self.published_at,
            status,
            starred: self.starred,
            created_at: self.created_at,
            changed_at: self.changed_at,
            enclosures,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct StoredEnclosure {
    pub id: i64,
    pub entry_id: i64,
    pub url: String,
    pub mime_type: String,
    pub size: i64,
}

// ============================================================================
// Jobs
// ============================================================================

/// One feed to refresh. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::FromRow)]
pub struct Job {
    pub user_id: i64,
    pub feed_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_status_round_trip() {
        for status in [EntryStatus::Unread, EntryStatus::Read, EntryStatus::Removed] {
            assert_eq!(status.as_str().parse::<EntryStatus>(), Ok(status));
        }
        assert!("archived".parse::<EntryStatus>().is_err());
    }

    #[test]
    fn test_feed_debug_redacts_password() {
        let row = FeedDbRow {
            id: 1,
            user_id: 1,
            category_id: None,
            feed_url: "https://example.org/feed".into(),
            site_url: String::new(),
            title: String::new(),
            checked_at: None,
            etag_header: String::new(),
            last_modified_header: String::new(),
            parsing_error_count: 0,
            parsing_error_msg: String::new(),
            scraper_rules: String::new(),
            rewrite_rules: String::new(),
            crawler: false,
            user_agent: String::new(),
            username: "me".into(),
            password: "hunter2".into(),
            disabled: false,
            polling_interval_minutes: None,
        };
        let debug = format!("{:?}", row.into_feed());
        assert!(!debug.contains("hunter2"));
    }
}
