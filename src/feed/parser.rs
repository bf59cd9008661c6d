use super::Post;
use crate::util::{html_to_text, strip_control_chars, truncate_chars};
use feed_rs::model::Entry;
use feed_rs::parser;

/// Posts extracted from one feed document.
#[derive(Debug, Default)]
pub struct ParseResult {
    pub posts: Vec<Post>,
    /// Entries dropped because they carried no publish or update time.
    pub skipped: usize,
}

/// Parses an RSS, Atom or JSON feed into posts.
///
/// Descriptions are reduced to plain text and cut to `description_limit`
/// characters. Entries without any timestamp cannot be ordered against a
/// baseline, so they are skipped and counted.
pub fn parse_feed(bytes: &[u8], description_limit: usize) -> Result<ParseResult, parser::ParseFeedError> {
    let feed = parser::parse(bytes)?;

    let tag = feed
        .title
        .as_ref()
        .map(|t| html_to_text(&t.content))
        .unwrap_or_default();
    let feed_image = feed
        .logo
        .as_ref()
        .or(feed.icon.as_ref())
        .map(|img| img.uri.clone());
    let feed_author = feed.authors.first().map(|p| p.name.clone());

    let mut result = ParseResult::default();
    for entry in &feed.entries {
        match build_post(entry, &tag, feed_image.as_deref(), feed_author.as_deref(), description_limit) {
            Some(post) => result.posts.push(post),
            None => result.skipped += 1,
        }
    }

    Ok(result)
}

fn build_post(
    entry: &Entry,
    tag: &str,
    feed_image: Option<&str>,
    feed_author: Option<&str>,
    description_limit: usize,
) -> Option<Post> {
    let published = entry.published.or(entry.updated)?;

    let title = entry
        .title
        .as_ref()
        .map(|t| html_to_text(&t.content))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Untitled".to_string());

    let link = entry
        .links
        .first()
        .map(|l| l.href.clone())
        .or_else(|| entry.id.starts_with("http").then(|| entry.id.clone()))
        .unwrap_or_default();

    let raw_description = entry
        .summary
        .as_ref()
        .map(|s| s.content.as_str())
        .or_else(|| entry.content.as_ref().and_then(|c| c.body.as_deref()))
        .or_else(|| {
            entry
                .media
                .iter()
                .find_map(|m| m.description.as_ref().map(|d| d.content.as_str()))
        })
        .unwrap_or_default();
    let text = html_to_text(raw_description);
    let description = truncate_chars(&strip_control_chars(&text), description_limit).into_owned();

    let author = entry
        .authors
        .first()
        .map(|p| p.name.clone())
        .or_else(|| feed_author.map(str::to_string))
        .unwrap_or_default();

    let image_url = entry
        .media
        .iter()
        .flat_map(|m| m.thumbnails.iter())
        .map(|t| t.image.uri.clone())
        .next()
        .or_else(|| feed_image.map(str::to_string));

    let labels = entry
        .categories
        .iter()
        .map(|c| c.label.clone().unwrap_or_else(|| c.term.clone()))
        .collect();

    Some(Post {
        title,
        link,
        description,
        author,
        published,
        image_url,
        tag: tag.to_string(),
        labels,
    })
}
