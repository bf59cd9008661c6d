//! YouTube channel resolution.
//!
//! A channel is configured either by its Atom feed URL
//! (`https://www.youtube.com/feeds/videos.xml?channel_id=...`) or by its page
//! URL. Pages advertise the feed through an `application/rss+xml` alternate
//! link, which is scraped and then fetched like any other feed.

use super::parser::{parse_feed, ParseResult};
use super::source::{fetch_body, SourceError};
use super::Post;
use crate::http::ResilientClient;
use regex::Regex;
use std::sync::OnceLock;
use tokio_util::sync::CancellationToken;

const ALTERNATE_LINK_PATTERN: &str = r#"(?i)<link\b[^>]*\btype\s*=\s*["']application/rss\+xml["'][^>]*>"#;
const HREF_PATTERN: &str = r#"(?i)\bhref\s*=\s*["']([^"']+)["']"#;

static ALTERNATE_LINK_RE: OnceLock<Option<(Regex, Regex)>> = OnceLock::new();

fn link_patterns() -> Option<&'static (Regex, Regex)> {
    ALTERNATE_LINK_RE
        .get_or_init(|| {
            let link = Regex::new(ALTERNATE_LINK_PATTERN).ok()?;
            let href = Regex::new(HREF_PATTERN).ok()?;
            Some((link, href))
        })
        .as_ref()
}

/// Finds the channel's feed URL in its HTML page.
pub(super) fn extract_feed_link(html: &str) -> Option<String> {
    let (link_re, href_re) = link_patterns()?;
    let tag = link_re.find(html)?;
    let href = href_re.captures(tag.as_str())?.get(1)?;
    Some(html_escape::decode_html_entities(href.as_str()).into_owned())
}

/// Returns the channel's most recent upload, or nothing for an empty channel.
pub(super) async fn fetch_latest(
    client: &ResilientClient,
    url: &str,
    description_limit: usize,
    cancel: &CancellationToken,
) -> Result<Vec<Post>, SourceError> {
    let feed_url = if url.contains("xml") {
        url.to_string()
    } else {
        let page = fetch_body(client, url, cancel).await?;
        let html = String::from_utf8_lossy(&page);
        extract_feed_link(&html).ok_or(SourceError::NoFeedLink)?
    };

    let bytes = fetch_body(client, &feed_url, cancel).await?;
    let ParseResult { posts, .. } =
        parse_feed(&bytes, description_limit).map_err(|e| SourceError::Parse(e.to_string()))?;

    Ok(posts.into_iter().max_by_key(|p| p.published).into_iter().collect())
}
