//! Webhook request bodies.
//!
//! Every notification can be rendered in two shapes: the text-channel shape
//! (`username`, `avatarUrl`, `embeds`) and the forum-channel shape, which
//! opens a thread (`content`, `embeds`, `threadName`). Markdown mode replaces
//! the embed with a pre-formatted `content` block.

use crate::feed::Post;
use crate::util::take_chars;
use serde::Serialize;

/// Longest thread name a forum channel accepts from us.
pub const MAX_THREAD_NAME_CHARS: usize = 99;

const DEFAULT_USERNAME: &str = "feedhook";

/// Per-instance presentation overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayOptions {
    pub username: Option<String>,
    pub avatar_url: Option<String>,
    pub author_name: Option<String>,
    pub author_url: Option<String>,
    pub author_icon: Option<String>,
    pub fallback_image: Option<String>,
    pub footer_image: Option<String>,
    pub color: u32,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TextPayload<'a> {
    pub username: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<&'a str>,
    pub embeds: [Embed<'a>; 1],
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ForumPayload<'a> {
    pub content: &'a str,
    pub embeds: [Embed<'a>; 1],
    pub thread_name: &'a str,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MarkdownPayload<'a> {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_name: Option<&'a str>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Embed<'a> {
    pub title: &'a str,
    pub author: EmbedAuthor<'a>,
    pub url: &'a str,
    pub description: &'a str,
    pub image: EmbedImage<'a>,
    pub footer: EmbedFooter<'a>,
    pub color: u32,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmbedAuthor<'a> {
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<&'a str>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct EmbedImage<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<&'a str>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmbedFooter<'a> {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<&'a str>,
}

/// Renders posts into serialized webhook bodies for one instance.
#[derive(Debug, Clone)]
pub struct PayloadBuilder {
    display: DisplayOptions,
    markdown: bool,
}

impl PayloadBuilder {
    pub fn new(display: DisplayOptions, markdown: bool) -> Self {
        Self { display, markdown }
    }

    /// Body for a forum channel: opens a thread named after the post.
    pub fn forum_body(&self, post: &Post) -> serde_json::Result<String> {
        let thread_name = take_chars(&post.title, MAX_THREAD_NAME_CHARS);
        if self.markdown {
            return serde_json::to_string(&MarkdownPayload {
                content: markdown_block(post),
                thread_name: Some(thread_name),
            });
        }
        serde_json::to_string(&ForumPayload {
            content: &post.tag,
            embeds: [self.embed(post)],
            thread_name,
        })
    }

    /// Body for a regular text channel.
    pub fn text_body(&self, post: &Post) -> serde_json::Result<String> {
        if self.markdown {
            return serde_json::to_string(&MarkdownPayload {
                content: markdown_block(post),
                thread_name: None,
            });
        }
        serde_json::to_string(&TextPayload {
            username: self.display.username.as_deref().unwrap_or(DEFAULT_USERNAME),
            avatar_url: self.display.avatar_url.as_deref(),
            embeds: [self.embed(post)],
        })
    }

    fn embed<'a>(&'a self, post: &'a Post) -> Embed<'a> {
        let image = post
            .image_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .or(self.display.fallback_image.as_deref());

        Embed {
            title: &post.title,
            author: EmbedAuthor {
                name: self.display.author_name.as_deref().unwrap_or(&post.author),
                url: self.display.author_url.as_deref(),
                icon_url: self.display.author_icon.as_deref(),
            },
            url: &post.link,
            description: &post.description,
            image: EmbedImage { url: image },
            footer: EmbedFooter {
                text: format!("{} - {}", post.tag, post.published.format("%m/%d/%Y %-I:%M %p")),
                icon_url: self.display.footer_image.as_deref(),
            },
            color: self.display.color,
        }
    }
}

fn markdown_block(post: &Post) -> String {
    format!(
        "# {title}\n\n> **Published**: {published}\n> **Author**: {author}\n> **Feed**: {tag}\n\n{description}\n\n[Source]({link})\n",
        title = post.title,
        published = post.published.format("%B %d, %Y"),
        author = post.author,
        tag = post.tag,
        description = post.description,
        link = post.link,
    )
}
