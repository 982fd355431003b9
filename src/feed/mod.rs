//! Feed documents and their lifecycle.
//!
//! - [`parser`] decodes Atom, RSS, RDF and JSON Feed documents into
//!   [`ParsedFeed`] values
//! - [`find_subscriptions`] tells which feeds a URL offers
//! - [`FeedHandler`] runs one refresh from fetch to storage

mod discovery;
mod handler;
pub mod parser;

pub use discovery::{find_subscriptions, parse_link_elements, DiscoveryError, Subscription};
pub use handler::{FeedHandler, HandlerSettings, RefreshError, RefreshStage, RefreshSummary};
pub use parser::{
    decode_document, detect_format, entry_hash, parse_feed, parse_text, Enclosure, FeedFormat,
    ParseError, ParsedEntry, ParsedFeed,
};
