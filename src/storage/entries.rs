use std::collections::{HashMap, HashSet};

use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{DatabaseError, Entry, EntryDbRow, EntryStatus, StoredEnclosure};

impl Database {
    // ========================================================================
    // Entry Operations
    // ========================================================================

    /// Which of `hashes` are already stored for `feed_id`.
    pub async fn existing_hashes(
        &self,
        feed_id: i64,
        hashes: &[&str],
    ) -> Result<HashSet<String>, DatabaseError> {
        let mut found = HashSet::new();
        if hashes.is_empty() {
            return Ok(found);
        }

        // SQLite caps bound parameters per statement
        const CHUNK: usize = 500;
        for chunk in hashes.chunks(CHUNK) {
            let mut builder: QueryBuilder<sqlx::Sqlite> =
                QueryBuilder::new("SELECT hash FROM entries WHERE feed_id = ");
            builder.push_bind(feed_id);
            builder.push(" AND hash IN (");
            let mut separated = builder.separated(", ");
            for hash in chunk {
                separated.push_bind(*hash);
            }
            separated.push_unseparated(")");

            let rows: Vec<(String,)> = builder.build_query_as().fetch_all(&self.pool).await?;
            found.extend(rows.into_iter().map(|(h,)| h));
        }

        Ok(found)
    }

    /// All entries of a feed with their enclosures, newest first.
    pub async fn entries_for_feed(&self, feed_id: i64) -> Result<Vec<Entry>, DatabaseError> {
        let rows: Vec<EntryDbRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, feed_id, hash, title, url, comments_url, author, content,
                   published_at, status, starred, created_at, changed_at
            FROM entries
            WHERE feed_id = ?
            ORDER BY COALESCE(published_at, created_at) DESC, id DESC
        "#,
        )
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;

        let enclosures: Vec<StoredEnclosure> = sqlx::query_as(
            r#"
            SELECT e.id, e.entry_id, e.url, e.mime_type, e.size
            FROM enclosures e
            JOIN entries n ON n.id = e.entry_id
            WHERE n.feed_id = ?
            ORDER BY e.id
        "#,
        )
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;

        let mut by_entry: HashMap<i64, Vec<StoredEnclosure>> = HashMap::new();
        for enclosure in enclosures {
            by_entry.entry(enclosure.entry_id).or_default().push(enclosure);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let enclosures = by_entry.remove(&row.id).unwrap_or_default();
                row.into_entry(enclosures)
            })
            .collect())
    }

    pub async fn set_entry_status(
        &self,
        entry_id: i64,
        status: EntryStatus,
    ) -> Result<bool, DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query("UPDATE entries SET status = ?, changed_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(now)
            .bind(entry_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_entry_starred(&self, entry_id: i64, starred: bool) -> Result<bool, DatabaseError> {
        let result = sqlx::query("UPDATE entries SET starred = ? WHERE id = ?")
            .bind(starred)
            .bind(entry_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::feed::ParsedEntry;
    use crate::storage::{Database, EntryStatus, FeedRefreshUpdate, NewFeed};

    async fn db_with_entries(hashes: &[&str]) -> (Database, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let user_id = db.create_user("alice").await.unwrap();
        let feed_id = db
            .create_feed(&NewFeed::new(user_id, "https://example.com/feed"))
            .await
            .unwrap();
        let entries: Vec<ParsedEntry> = hashes
            .iter()
            .map(|h| ParsedEntry {
                hash: h.to_string(),
                title: h.to_string(),
                ..Default::default()
            })
            .collect();
        db.complete_feed_refresh(feed_id, &FeedRefreshUpdate::default(), &entries)
            .await
            .unwrap();
        (db, feed_id)
    }

    #[tokio::test]
    async fn test_existing_hashes() {
        let (db, feed_id) = db_with_entries(&["a", "b"]).await;
        let found = db.existing_hashes(feed_id, &["a", "c"]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(found.contains("a"));

        assert!(db.existing_hashes(feed_id + 1, &["a"]).await.unwrap().is_empty());
        assert!(db.existing_hashes(feed_id, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_status_and_star() {
        let (db, feed_id) = db_with_entries(&["a"]).await;
        let id = db.entries_for_feed(feed_id).await.unwrap()[0].id;

        assert!(db.set_entry_status(id, EntryStatus::Read).await.unwrap());
        assert!(db.set_entry_starred(id, true).await.unwrap());

        let entry = &db.entries_for_feed(feed_id).await.unwrap()[0];
        assert_eq!(entry.status, EntryStatus::Read);
        assert!(entry.starred);
        assert!(!db.set_entry_status(9999, EntryStatus::Read).await.unwrap());
    }
}
