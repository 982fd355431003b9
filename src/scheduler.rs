//! Periodic tasks: feed batch selection and database cleanup.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::storage::Database;
use crate::worker::JobQueue;

/// Timing and selection knobs of the two loops.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub polling_frequency: Duration,
    pub batch_size: usize,
    /// Feeds with this many consecutive errors are skipped; 0 disables.
    pub error_limit: i64,
    pub cleanup_frequency: Duration,
    pub archive_read_days: u32,
    pub remove_sessions_days: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            polling_frequency: Duration::from_secs(60 * 60),
            batch_size: 10,
            error_limit: 3,
            cleanup_frequency: Duration::from_secs(24 * 60 * 60),
            archive_read_days: 60,
            remove_sessions_days: 30,
        }
    }
}

impl SchedulerSettings {
    fn polling_minutes(&self) -> i64 {
        i64::try_from(self.polling_frequency.as_secs() / 60).unwrap_or(i64::MAX)
    }
}

pub struct Scheduler;

impl Scheduler {
    /// Spawns the feed and cleanup loops. Each fires one period after start.
    pub fn start(db: Database, queue: JobQueue, settings: SchedulerSettings) -> SchedulerHandle {
        tracing::info!(
            polling_frequency_secs = settings.polling_frequency.as_secs(),
            cleanup_frequency_secs = settings.cleanup_frequency.as_secs(),
            batch_size = settings.batch_size,
            "Scheduler started"
        );

        let feeds = {
            let db = db.clone();
            let settings = settings.clone();
            tokio::spawn(async move {
                let period = settings.polling_frequency.max(Duration::from_secs(1));
                let mut timer = interval_at(Instant::now() + period, period);
                timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    timer.tick().await;
                    run_feed_tick(
                        &db,
                        &queue,
                        settings.batch_size,
                        settings.error_limit,
                        settings.polling_minutes(),
                    )
                    .await;
                }
            })
        };

        let cleanup = tokio::spawn(async move {
            let period = settings.cleanup_frequency.max(Duration::from_secs(1));
            let mut timer = interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                timer.tick().await;
                run_cleanup_tick(&db, settings.archive_read_days, settings.remove_sessions_days)
                    .await;
            }
        });

        SchedulerHandle {
            feeds: Some(feeds),
            cleanup: Some(cleanup),
        }
    }
}

/// Stops the loops; dropping it leaves them running.
pub struct SchedulerHandle {
    feeds: Option<JoinHandle<()>>,
    cleanup: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn stop_feeds(&mut self) {
        if let Some(task) = self.feeds.take() {
            task.abort();
            tracing::info!("Feed scheduler stopped");
        }
    }

    pub fn stop_cleanup(&mut self) {
        if let Some(task) = self.cleanup.take() {
            task.abort();
            tracing::info!("Cleanup scheduler stopped");
        }
    }

    /// Stops both loops and waits for the tasks to finish.
    pub async fn shutdown(mut self) {
        let tasks: Vec<_> = [self.feeds.take(), self.cleanup.take()]
            .into_iter()
            .flatten()
            .collect();
        for task in &tasks {
            task.abort();
        }
        for task in tasks {
            // cancellation is the expected outcome
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    tracing::error!(error = %e, "Scheduler task failed");
                }
            }
        }
    }
}

/// One feed tick: select a batch and queue it. Returns how many jobs were
/// queued; failures are logged and the tick skipped.
pub async fn run_feed_tick(
    db: &Database,
    queue: &JobQueue,
    batch_size: usize,
    error_limit: i64,
    polling_frequency_minutes: i64,
) -> usize {
    let jobs = match db
        .new_batch(batch_size, error_limit, polling_frequency_minutes)
        .await
    {
        Ok(jobs) => jobs,
        Err(e) => {
            tracing::error!(error = %e, "Failed to select feed batch");
            return 0;
        }
    };

    if jobs.is_empty() {
        return 0;
    }

    match queue.push(jobs).await {
        Ok(queued) => {
            tracing::info!(queued, "Feed batch queued");
            queued
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to queue feed batch");
            0
        }
    }
}

/// One cleanup pass. Each step is attempted and logged on its own.
pub async fn run_cleanup_tick(db: &Database, archive_read_days: u32, remove_sessions_days: u32) {
    match db.clean_old_sessions(remove_sessions_days).await {
        Ok(n) => tracing::info!(removed = n, "Cleaned old sessions"),
        Err(e) => tracing::error!(error = %e, "Failed to clean old sessions"),
    }

    match db.clean_old_user_sessions(remove_sessions_days).await {
        Ok(n) => tracing::info!(removed = n, "Cleaned old user sessions"),
        Err(e) => tracing::error!(error = %e, "Failed to clean old user sessions"),
    }

    match db.archive_entries(archive_read_days).await {
        Ok(n) => tracing::info!(archived = n, "Archived read entries"),
        Err(e) => tracing::error!(error = %e, "Failed to archive read entries"),
    }
}
