//! Background feed poller.
//!
//! A [`scheduler::Scheduler`] selects due feeds from [`storage::Database`] and
//! queues them on a [`worker::WorkerPool`], whose workers run
//! [`feed::FeedHandler::refresh_feed`]: fetch over [`http::HttpClient`], parse,
//! deduplicate, rewrite and optionally scrape entry content, then persist.

pub mod config;
pub mod content;
pub mod feed;
pub mod http;
pub mod scheduler;
pub mod storage;
pub mod util;
pub mod worker;
