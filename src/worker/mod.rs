//! Fixed-size pool of tasks draining a bounded job queue.

mod pool;

use std::future::Future;

use crate::storage::Job;

pub use pool::{JobQueue, QueueClosed, WorkerPool};

/// Work performed for each dequeued job.
///
/// A handler owns its error reporting: the pool only awaits the returned
/// future and moves on to the next job.
pub trait JobHandler: Send + Sync + 'static {
    fn handle(&self, job: Job) -> impl Future<Output = ()> + Send;
}
