use super::schema::Database;
use super::types::{DatabaseError, Job};

impl Database {
    /// Select the next feeds to refresh.
    ///
    /// A feed is due when it is enabled, its error counter is below
    /// `error_limit` (0 disables the limit) and it was never checked or was
    /// last checked at least its polling interval ago. The interval is the
    /// feed's own override, else `polling_frequency_minutes`. Least recently
    /// checked feeds come first.
    pub async fn new_batch(
        &self,
        batch_size: usize,
        error_limit: i64,
        polling_frequency_minutes: i64,
    ) -> Result<Vec<Job>, DatabaseError> {
        if batch_size == 0 {
            return Ok(Vec::new());
        }

        let now = chrono::Utc::now().timestamp();
        let jobs: Vec<Job> = sqlx::query_as(
            r#"
            SELECT user_id, id AS feed_id
            FROM feeds
            WHERE disabled = 0
              AND (? = 0 OR parsing_error_count < ?)
              AND (checked_at IS NULL
                   OR checked_at <= ? - COALESCE(polling_interval_minutes, ?) * 60)
            ORDER BY checked_at IS NOT NULL, checked_at ASC, id ASC
            LIMIT ?
        "#,
        )
        .bind(error_limit)
        .bind(error_limit)
        .bind(now)
        .bind(polling_frequency_minutes)
        .bind(i64::try_from(batch_size).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        tracing::debug!(count = jobs.len(), batch_size, "Selected feed batch");
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, Job, NewFeed};
    use pretty_assertions::assert_eq;

    async fn setup(feeds: usize) -> (Database, i64, Vec<i64>) {
        let db = Database::open(":memory:").await.unwrap();
        let user_id = db.create_user("alice").await.unwrap();
        let mut ids = Vec::new();
        for i in 0..feeds {
            let id = db
                .create_feed(&NewFeed::new(user_id, format!("https://example.com/{i}.xml")))
                .await
                .unwrap();
            ids.push(id);
        }
        (db, user_id, ids)
    }

    async fn set_checked(db: &Database, feed_id: i64, secs_ago: i64) {
        let at = chrono::Utc::now().timestamp() - secs_ago;
        sqlx::query("UPDATE feeds SET checked_at = ? WHERE id = ?")
            .bind(at)
            .bind(feed_id)
            .execute(&db.pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_batch_limit_and_never_checked_first() {
        let (db, user_id, ids) = setup(25).await;
        set_checked(&db, ids[0], 7200).await;

        let jobs = db.new_batch(10, 0, 60).await.unwrap();
        assert_eq!(jobs.len(), 10);
        assert!(jobs.iter().all(|j| j.user_id == user_id));
        assert!(!jobs.contains(&Job { user_id, feed_id: ids[0] }));
    }

    #[tokio::test]
    async fn test_recently_checked_feed_not_due() {
        let (db, _, ids) = setup(2).await;
        set_checked(&db, ids[0], 60).await;
        set_checked(&db, ids[1], 3 * 3600).await;

        let jobs = db.new_batch(10, 0, 60).await.unwrap();
        assert_eq!(jobs.iter().map(|j| j.feed_id).collect::<Vec<_>>(), vec![ids[1]]);
    }

    #[tokio::test]
    async fn test_oldest_check_first() {
        let (db, _, ids) = setup(3).await;
        set_checked(&db, ids[0], 2 * 3600).await;
        set_checked(&db, ids[1], 5 * 3600).await;
        set_checked(&db, ids[2], 3 * 3600).await;

        let order: Vec<i64> = db
            .new_batch(10, 0, 60)
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.feed_id)
            .collect();
        assert_eq!(order, vec![ids[1], ids[2], ids[0]]);
    }

    #[tokio::test]
    async fn test_per_feed_interval_override() {
        let db = Database::open(":memory:").await.unwrap();
        let user_id = db.create_user("alice").await.unwrap();
        let mut new = NewFeed::new(user_id, "https://example.com/slow.xml");
        new.polling_interval_minutes = Some(24 * 60);
        let slow = db.create_feed(&new).await.unwrap();
        set_checked(&db, slow, 3 * 3600).await;

        assert!(db.new_batch(10, 0, 60).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_error_limit_and_disabled_excluded() {
        let (db, _, ids) = setup(3).await;
        for _ in 0..3 {
            db.record_feed_error(ids[0], "bad").await.unwrap();
        }
        // record_feed_error also marks the feed checked
        set_checked(&db, ids[0], 3 * 3600).await;
        db.set_feed_disabled(ids[1], true).await.unwrap();

        let limited: Vec<i64> = db
            .new_batch(10, 3, 60)
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.feed_id)
            .collect();
        assert_eq!(limited, vec![ids[2]]);

        let unlimited = db.new_batch(10, 0, 60).await.unwrap();
        assert_eq!(unlimited.len(), 2);
    }
}
