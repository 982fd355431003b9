//! Utility functions shared by the parsers, rewriter and fetchers.
//!
//! - **URL handling**: SSRF validation, relative URL resolution, domain lookup
//! - **Text processing**: tag stripping, entity decoding, escaping

mod text;
mod urls;

pub use text::{
    decode_entities, escape_attr, escape_html, html_to_text, strip_control_chars, strip_tags,
    text_length,
};
pub use urls::{absolute_url, domain, is_absolute_url, validate_url, UrlValidationError};
