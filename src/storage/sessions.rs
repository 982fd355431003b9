use super::schema::Database;
use super::types::DatabaseError;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

fn cutoff(days: u32) -> i64 {
    chrono::Utc::now().timestamp() - i64::from(days) * SECONDS_PER_DAY
}

impl Database {
    // ========================================================================
    // Users and Sessions
    // ========================================================================

    pub async fn create_user(&self, username: &str) -> Result<i64, DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        let (id,): (i64,) =
            sqlx::query_as("INSERT INTO users (username, created_at) VALUES (?, ?) RETURNING id")
                .bind(username)
                .bind(now)
                .fetch_one(&self.pool)
                .await?;
        Ok(id)
    }

    /// Store an anonymous session token.
    pub async fn create_session(&self, token: &str) -> Result<i64, DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        let (id,): (i64,) =
            sqlx::query_as("INSERT INTO sessions (token, created_at) VALUES (?, ?) RETURNING id")
                .bind(token)
                .bind(now)
                .fetch_one(&self.pool)
                .await?;
        Ok(id)
    }

    pub async fn create_user_session(&self, user_id: i64, token: &str) -> Result<i64, DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO user_sessions (user_id, token, created_at) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(user_id)
        .bind(token)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    // ========================================================================
    // Cleanup
    // ========================================================================

    /// Delete anonymous sessions older than `days`.
    pub async fn clean_old_sessions(&self, days: u32) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM sessions WHERE created_at < ?")
            .bind(cutoff(days))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete user sessions older than `days`.
    pub async fn clean_old_user_sessions(&self, days: u32) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE created_at < ?")
            .bind(cutoff(days))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Mark read, unstarred entries older than `days` as removed. Age is the
    /// publication date, or the insertion date when the feed gave none.
    pub async fn archive_entries(&self, days: u32) -> Result<u64, DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            "UPDATE entries SET status = 'removed', changed_at = ?
             WHERE status = 'read' AND starred = 0
               AND COALESCE(published_at, created_at) < ?",
        )
        .bind(now)
        .bind(cutoff(days))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use crate::feed::ParsedEntry;
    use crate::storage::{Database, EntryStatus, FeedRefreshUpdate, NewFeed};
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;

    async fn backdate(db: &Database, table: &str, id: i64, days: i64) {
        let at = (Utc::now() - Duration::days(days)).timestamp();
        sqlx::query(&format!("UPDATE {table} SET created_at = ? WHERE id = ?"))
            .bind(at)
            .bind(id)
            .execute(&db.pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_clean_old_sessions() {
        let db = Database::open(":memory:").await.unwrap();
        let user_id = db.create_user("alice").await.unwrap();

        let old = db.create_session("old").await.unwrap();
        db.create_session("fresh").await.unwrap();
        backdate(&db, "sessions", old, 31).await;

        let old_user = db.create_user_session(user_id, "u-old").await.unwrap();
        db.create_user_session(user_id, "u-fresh").await.unwrap();
        backdate(&db, "user_sessions", old_user, 45).await;

        assert_eq!(db.clean_old_sessions(30).await.unwrap(), 1);
        assert_eq!(db.clean_old_sessions(30).await.unwrap(), 0);
        assert_eq!(db.clean_old_user_sessions(30).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_archive_read_unstarred_only() {
        let db = Database::open(":memory:").await.unwrap();
        let user_id = db.create_user("alice").await.unwrap();
        let feed_id = db
            .create_feed(&NewFeed::new(user_id, "https://example.com/feed"))
            .await
            .unwrap();

        let old = Utc::now() - Duration::days(90);
        let entries: Vec<ParsedEntry> = ["read-old", "starred-old", "unread-old", "read-new"]
            .iter()
            .map(|h| ParsedEntry {
                hash: h.to_string(),
                date: (!h.ends_with("new")).then_some(old),
                ..Default::default()
            })
            .collect();
        db.complete_feed_refresh(feed_id, &FeedRefreshUpdate::default(), &entries)
            .await
            .unwrap();

        for entry in db.entries_for_feed(feed_id).await.unwrap() {
            if entry.hash.starts_with("read") || entry.hash == "starred-old" {
                db.set_entry_status(entry.id, EntryStatus::Read).await.unwrap();
            }
            if entry.hash == "starred-old" {
                db.set_entry_starred(entry.id, true).await.unwrap();
            }
        }

        assert_eq!(db.archive_entries(60).await.unwrap(), 1);

        let statuses: Vec<(String, EntryStatus)> = db
            .entries_for_feed(feed_id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| (e.hash, e.status))
            .collect();
        assert!(statuses.contains(&("read-old".into(), EntryStatus::Removed)));
        assert!(statuses.contains(&("starred-old".into(), EntryStatus::Read)));
        assert!(statuses.contains(&("unread-old".into(), EntryStatus::Unread)));
        assert!(statuses.contains(&("read-new".into(), EntryStatus::Read)));
    }
}
