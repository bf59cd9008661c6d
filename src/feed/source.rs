use super::parser::{parse_feed, ParseResult};
use super::{youtube, FeedKind, Post};
use crate::http::ResilientClient;
use crate::observe::UNREACHABLE;
use crate::shutdown::Cancelled;
use crate::util::mask_secrets;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors produced while retrieving one feed URL.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
    /// No complete response could be obtained (connection, DNS, TLS,
    /// timeout, or a body over the size limit)
    #[error("feed unreachable")]
    Unreachable,
    /// Response with a non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Document is not a feed `feed-rs` understands
    #[error("Parse error: {0}")]
    Parse(String),
    /// YouTube channel page without an RSS alternate link
    #[error("no feed link found on channel page")]
    NoFeedLink,
}

impl SourceError {
    /// Status code reported for this failure in the cycle summary.
    pub fn report_code(&self) -> i32 {
        match self {
            SourceError::HttpStatus(code) => i32::from(*code),
            SourceError::Unreachable => UNREACHABLE,
            _ => 200,
        }
    }
}

/// Where the state engine gets posts from.
///
/// The HTTP implementation is [`HttpFeedSource`]; tests substitute scripted
/// sources.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_posts(
        &self,
        url: &str,
        kind: FeedKind,
        cancel: &CancellationToken,
    ) -> Result<Vec<Post>, SourceError>;
}

/// Fetches feeds through a [`ResilientClient`] and parses them with `feed-rs`.
#[derive(Debug, Clone)]
pub struct HttpFeedSource {
    client: Arc<ResilientClient>,
    description_limit: usize,
}

impl HttpFeedSource {
    pub fn new(client: Arc<ResilientClient>, description_limit: usize) -> Self {
        Self {
            client,
            description_limit,
        }
    }

    async fn fetch_rss(&self, url: &str, cancel: &CancellationToken) -> Result<Vec<Post>, SourceError> {
        let bytes = fetch_body(&self.client, url, cancel).await?;
        let ParseResult { posts, skipped } =
            parse_feed(&bytes, self.description_limit).map_err(|e| SourceError::Parse(e.to_string()))?;

        if skipped > 0 {
            tracing::debug!(url = %mask_secrets(url), skipped = skipped, "Entries without a date skipped");
        }
        Ok(posts)
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch_posts(
        &self,
        url: &str,
        kind: FeedKind,
        cancel: &CancellationToken,
    ) -> Result<Vec<Post>, SourceError> {
        match kind {
            FeedKind::Rss => self.fetch_rss(url, cancel).await,
            FeedKind::Youtube => {
                youtube::fetch_latest(&self.client, url, self.description_limit, cancel).await
            }
        }
    }
}

/// GETs `url` through the client and returns the whole body.
pub(super) async fn fetch_body(
    client: &ResilientClient,
    url: &str,
    cancel: &CancellationToken,
) -> Result<Vec<u8>, SourceError> {
    let page = client
        .fetch_with_fallback(url, cancel)
        .await?
        .ok_or(SourceError::Unreachable)?;

    if !page.status.is_success() {
        return Err(SourceError::HttpStatus(page.status.as_u16()));
    }
    Ok(page.body)
}
