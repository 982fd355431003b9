//! SQLite persistence for feeds, entries, sessions and batch selection.

mod entries;
mod feeds;
mod jobs;
mod schema;
mod sessions;
mod types;

pub use schema::Database;
pub use types::{
    DatabaseError, Entry, EntryStatus, Feed, FeedRefreshUpdate, Job, NewFeed, StoredEnclosure,
};
