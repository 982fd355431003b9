//! Entry content enrichment.
//!
//! - [`rewrite`] - rule-driven HTML transforms applied to every new entry
//! - [`scraper`] - fetches the original page when the feed only carries a teaser
//! - [`readability`] - main-content heuristic used by the scraper without rules
//! - [`rules`] - per-domain rule tables shared by both

pub mod readability;
pub mod rewrite;
pub mod rules;
pub mod scraper;

pub use rewrite::{RuleSpec, Rewriter};
pub use rules::{DomainRule, DomainRules};
pub use self::scraper::{Scraper, ScraperError};
