//! Feed retrieval: turning RSS, Atom and YouTube channel URLs into [`Post`]s.
//!
//! - [`parser`] - `feed-rs` based conversion of feed documents
//! - [`youtube`] - channel page to Atom feed resolution
//! - [`filter`] - per-URL keyword and label filters
//! - [`source`] - the [`FeedSource`] seam and its HTTP implementation

pub mod filter;
pub mod parser;
mod source;
mod youtube;

use chrono::{DateTime, Utc};

pub use filter::{PostFilter, PostFilterConfig};
pub use parser::{parse_feed, ParseResult};
pub use source::{FeedSource, HttpFeedSource, SourceError};

/// A single feed item ready to be announced.
///
/// Plain value; two posts are the same item when link and publish time match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub title: String,
    pub link: String,
    pub description: String,
    pub author: String,
    pub published: DateTime<Utc>,
    pub image_url: Option<String>,
    /// Label of the feed the post came from (feed or channel title).
    pub tag: String,
    /// Categories attached to the item.
    pub labels: Vec<String>,
}

/// How a configured URL is retrieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    Rss,
    Youtube,
}

impl FeedKind {
    pub fn is_youtube(self) -> bool {
        matches!(self, FeedKind::Youtube)
    }
}
