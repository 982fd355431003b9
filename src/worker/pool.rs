use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use super::JobHandler;
use crate::storage::Job;

#[derive(Debug, Error)]
#[error("job queue is closed")]
pub struct QueueClosed;

/// Sending half of the pool's queue. Cheap to clone.
#[derive(Clone)]
pub struct JobQueue {
    sender: mpsc::Sender<Job>,
}

impl JobQueue {
    /// Enqueues `jobs` in order, waiting for room when the queue is full.
    ///
    /// Returns how many jobs were queued.
    pub async fn push(&self, jobs: Vec<Job>) -> Result<usize, QueueClosed> {
        let mut queued = 0;
        for job in jobs {
            self.sender.send(job).await.map_err(|_| QueueClosed)?;
            queued += 1;
        }
        Ok(queued)
    }
}

pub struct WorkerPool {
    queue: JobQueue,
    stop: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `size` workers sharing a queue of `capacity` jobs. Both are
    /// raised to at least one.
    pub fn start<H: JobHandler>(size: usize, capacity: usize, handler: Arc<H>) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let (stop, _) = watch::channel(false);

        let workers = (0..size.max(1))
            .map(|id| {
                let receiver = Arc::clone(&receiver);
                let stop = stop.subscribe();
                let handler = Arc::clone(&handler);
                tokio::spawn(run_worker(id, receiver, stop, handler))
            })
            .collect::<Vec<_>>();

        tracing::info!(workers = workers.len(), capacity, "Worker pool started");

        Self {
            queue: JobQueue { sender },
            stop,
            workers,
        }
    }

    pub fn queue(&self) -> JobQueue {
        self.queue.clone()
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Closes the queue, lets the workers finish what was already queued and
    /// waits for them.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        drop(self.queue);

        for (id, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.await {
                tracing::error!(worker = id, error = %e, "Worker task failed");
            }
        }
        tracing::info!("Worker pool stopped");
    }
}

async fn run_worker<H: JobHandler>(
    id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    mut stop: watch::Receiver<bool>,
    handler: Arc<H>,
) {
    loop {
        let job = {
            let mut rx = receiver.lock().await;
            tokio::select! {
                biased;
                job = rx.recv() => job,
                _ = stop.changed() => {
                    // closed: buffered jobs are still delivered, then None
                    rx.close();
                    rx.recv().await
                }
            }
        };

        let Some(job) = job else {
            break;
        };

        tracing::debug!(worker = id, user_id = job.user_id, feed_id = job.feed_id, "Job started");
        handler.handle(job).await;
    }

    tracing::debug!(worker = id, "Worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Counting {
        handled: AtomicUsize,
    }

    impl JobHandler for Counting {
        fn handle(&self, _job: Job) -> impl Future<Output = ()> + Send {
            async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                self.handled.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn jobs(n: i64) -> Vec<Job> {
        (1..=n).map(|feed_id| Job { user_id: 1, feed_id }).collect()
    }

    #[tokio::test]
    async fn test_all_queued_jobs_run_before_shutdown_returns() {
        let handler = Arc::new(Counting::default());
        let pool = WorkerPool::start(3, 4, Arc::clone(&handler));
        assert_eq!(pool.size(), 3);

        let queued = pool.queue().push(jobs(20)).await.unwrap();
        assert_eq!(queued, 20);

        pool.shutdown().await;
        assert_eq!(handler.handled.load(Ordering::SeqCst), 20);
    }

    #[tokio::test]
    async fn test_push_after_shutdown_fails() {
        let handler = Arc::new(Counting::default());
        let pool = WorkerPool::start(2, 2, handler);
        let queue = pool.queue();
        pool.shutdown().await;

        assert!(queue.push(jobs(1)).await.is_err());
        assert_eq!(queue.push(Vec::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_zero_sizes_are_raised() {
        let handler = Arc::new(Counting::default());
        let pool = WorkerPool::start(0, 0, Arc::clone(&handler));
        assert_eq!(pool.size(), 1);
        pool.queue().push(jobs(3)).await.unwrap();
        pool.shutdown().await;
        assert_eq!(handler.handled.load(Ordering::SeqCst), 3);
    }
}
