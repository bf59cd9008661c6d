use super::payload::PayloadBuilder;
use crate::feed::Post;
use crate::http::ResilientClient;
use crate::shutdown::Cancelled;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Delivers a batch of new posts.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends `posts` in order, one at a time.
    ///
    /// Cancellation is checked before each post and abandons the rest of the
    /// batch. Other per-post failures are logged and skipped.
    async fn send_all(&self, posts: &[Post], cancel: &CancellationToken) -> Result<(), Cancelled>;
}

/// [`Notifier`] posting to a Discord-compatible webhook.
pub struct WebhookNotifier {
    client: Arc<ResilientClient>,
    webhook: SecretString,
    forum: bool,
    payloads: PayloadBuilder,
}

impl std::fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookNotifier")
            .field("webhook", &"[REDACTED]")
            .field("forum", &self.forum)
            .field("payloads", &self.payloads)
            .finish_non_exhaustive()
    }
}

impl WebhookNotifier {
    pub fn new(client: Arc<ResilientClient>, webhook: SecretString, forum: bool, payloads: PayloadBuilder) -> Self {
        Self {
            client,
            webhook,
            forum,
            payloads,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_all(&self, posts: &[Post], cancel: &CancellationToken) -> Result<(), Cancelled> {
        for post in posts {
            if cancel.is_cancelled() {
                return Err(Cancelled);
            }

            let bodies = self
                .payloads
                .forum_body(post)
                .and_then(|forum| Ok((forum, self.payloads.text_body(post)?)));
            let (forum_body, text_body) = match bodies {
                Ok(bodies) => bodies,
                Err(e) => {
                    tracing::error!(title = %post.title, error = %e, "Failed to build webhook payload");
                    continue;
                }
            };

            self.client
                .post_with_fallback(self.webhook.expose_secret(), &forum_body, &text_body, self.forum, cancel)
                .await?;
            tracing::debug!(title = %post.title, link = %post.link, "Post dispatched");
        }
        Ok(())
    }
}
