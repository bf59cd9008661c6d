//! Per-cycle operational summary.
//!
//! Each worker owns a [`CycleReport`]. The state engine records one response
//! code and the newest post per URL while it polls; at the end of the cycle
//! the worker calls [`CycleReport::flush`], which emits a single structured
//! event and clears the report for the next cycle.

use crate::feed::Post;
use crate::util::mask_secrets;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Instant;

/// Code recorded for a URL that produced no response at all.
pub const UNREACHABLE: i32 = -99;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestPost {
    pub title: String,
    pub published: DateTime<Utc>,
}

#[derive(Debug)]
pub struct CycleReport {
    instance_id: String,
    started: Option<Instant>,
    new_posts: usize,
    response_codes: BTreeMap<String, i32>,
    latest_posts: BTreeMap<String, LatestPost>,
}

impl CycleReport {
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            started: None,
            new_posts: 0,
            response_codes: BTreeMap::new(),
            latest_posts: BTreeMap::new(),
        }
    }

    pub fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    pub fn record_response(&mut self, url: &str, code: i32) {
        self.response_codes.insert(url.to_string(), code);
    }

    /// Keeps the newest post seen for `url` this cycle.
    pub fn record_latest_post(&mut self, url: &str, post: &Post) {
        let newer = self
            .latest_posts
            .get(url)
            .map_or(true, |current| post.published > current.published);
        if newer {
            self.latest_posts.insert(
                url.to_string(),
                LatestPost {
                    title: post.title.clone(),
                    published: post.published,
                },
            );
        }
    }

    pub fn add_new_posts(&mut self, count: usize) {
        self.new_posts += count;
    }

    #[cfg(test)]
    pub(crate) fn new_posts(&self) -> usize {
        self.new_posts
    }

    #[cfg(test)]
    pub(crate) fn response_code(&self, url: &str) -> Option<i32> {
        self.response_codes.get(url).copied()
    }

    #[cfg(test)]
    pub(crate) fn latest_post(&self, url: &str) -> Option<&LatestPost> {
        self.latest_posts.get(url)
    }

    /// Emits the summary and resets for the next cycle.
    pub fn flush(&mut self) {
        let elapsed_ms = self
            .started
            .map(|s| s.elapsed().as_millis())
            .unwrap_or_default();
        let failed = self
            .response_codes
            .values()
            .filter(|&&code| !(200..300).contains(&code))
            .count();

        tracing::info!(
            id = %self.instance_id,
            urls = self.response_codes.len(),
            failed = failed,
            new_posts = self.new_posts,
            elapsed_ms = elapsed_ms as u64,
            "Cycle complete"
        );
        for (url, code) in &self.response_codes {
            match self.latest_posts.get(url) {
                Some(latest) => tracing::debug!(
                    id = %self.instance_id,
                    url = %mask_secrets(url),
                    status = code,
                    latest_title = %latest.title,
                    latest_published = %latest.published,
                    "Feed status"
                ),
                None => tracing::debug!(id = %self.instance_id, url = %mask_secrets(url), status = code, "Feed status"),
            }
        }

        self.started = None;
        self.new_posts = 0;
        self.response_codes.clear();
        self.latest_posts.clear();
    }
}
