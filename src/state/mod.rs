//! New-item detection for one feed instance.
//!
//! The engine keeps a baseline per configured URL: the newest publish time it
//! has ever seen there. A poll reports only items strictly newer than the
//! baseline and then raises the baseline to the newest item observed, so an
//! item is announced at most once and baselines never move backwards.

use crate::feed::{FeedKind, FeedSource, Post, PostFilter, SourceError};
use crate::observe::CycleReport;
use crate::shutdown::Cancelled;
use crate::util::mask_secrets;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Dedup baseline for one URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedState {
    pub is_youtube: bool,
    pub last_publish_date: DateTime<Utc>,
}

/// URL -> baseline, as loaded from or saved to the state store.
pub type Baselines = HashMap<String, FeedState>;

/// One configured feed URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedUrl {
    pub url: String,
    pub kind: FeedKind,
}

impl FeedUrl {
    pub fn rss(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: FeedKind::Rss,
        }
    }

    pub fn youtube(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: FeedKind::Youtube,
        }
    }
}

pub struct FeedStateEngine {
    source: Arc<dyn FeedSource>,
    filter: PostFilter,
    urls: Vec<FeedUrl>,
    concurrency: usize,
    states: Baselines,
}

impl std::fmt::Debug for FeedStateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedStateEngine")
            .field("urls", &self.urls)
            .field("concurrency", &self.concurrency)
            .field("states", &self.states)
            .finish_non_exhaustive()
    }
}

impl FeedStateEngine {
    /// `urls` are de-duplicated, keeping the first occurrence.
    pub fn new(source: Arc<dyn FeedSource>, filter: PostFilter, urls: Vec<FeedUrl>, concurrency: usize) -> Self {
        let mut unique: Vec<FeedUrl> = Vec::with_capacity(urls.len());
        for feed in urls {
            if !unique.iter().any(|u| u.url == feed.url) {
                unique.push(feed);
            }
        }

        Self {
            source,
            filter,
            urls: unique,
            concurrency: concurrency.max(1),
            states: HashMap::new(),
        }
    }

    pub fn urls(&self) -> &[FeedUrl] {
        &self.urls
    }

    /// Establishes a baseline for every configured URL.
    ///
    /// A URL found in `prior` keeps that baseline without any network call.
    /// Other URLs are fetched once and the newest item becomes the baseline;
    /// when that fetch fails or returns nothing the baseline is "now". Nothing
    /// seen here is ever reported as new.
    pub async fn initialize(&mut self, prior: &Baselines, cancel: &CancellationToken) -> Result<(), Cancelled> {
        let mut pending = Vec::new();
        for feed in &self.urls {
            match prior.get(&feed.url) {
                Some(state) => {
                    self.states.insert(
                        feed.url.clone(),
                        FeedState {
                            is_youtube: feed.kind.is_youtube(),
                            last_publish_date: state.last_publish_date,
                        },
                    );
                }
                None => pending.push(feed.clone()),
            }
        }

        let fetched = self.fetch_all(&pending, cancel).await?;
        for (feed, result) in fetched {
            let newest = match result {
                Ok(posts) => posts.iter().map(|p| p.published).max(),
                Err(e) => {
                    tracing::warn!(url = %mask_secrets(&feed.url), error = %mask_secrets(&e.to_string()), "Initial fetch failed, starting from now");
                    None
                }
            };
            self.states.insert(
                feed.url.clone(),
                FeedState {
                    is_youtube: feed.kind.is_youtube(),
                    last_publish_date: newest.unwrap_or_else(Utc::now),
                },
            );
        }

        tracing::debug!(urls = self.states.len(), from_prior = self.states.len() - pending.len(), "Baselines established");
        Ok(())
    }

    /// Polls every URL and returns the items newer than their baseline.
    ///
    /// Posts are filtered, then sorted oldest first across all URLs. A URL
    /// whose fetch fails contributes nothing and keeps its baseline. On
    /// cancellation no baseline changes.
    pub async fn check_for_new_posts(
        &mut self,
        report: &mut CycleReport,
        cancel: &CancellationToken,
    ) -> Result<Vec<Post>, Cancelled> {
        let urls = self.urls.clone();
        let fetched = self.fetch_all(&urls, cancel).await?;

        let mut new_posts = Vec::new();
        for (feed, result) in fetched {
            let posts = match result {
                Ok(posts) => {
                    report.record_response(&feed.url, 200);
                    posts
                }
                Err(e) => {
                    report.record_response(&feed.url, e.report_code());
                    tracing::warn!(url = %mask_secrets(&feed.url), error = %mask_secrets(&e.to_string()), "Feed check failed");
                    continue;
                }
            };

            let Some(state) = self.states.get_mut(&feed.url) else {
                continue;
            };
            let baseline = state.last_publish_date;

            for post in &posts {
                report.record_latest_post(&feed.url, post);
                if post.published > state.last_publish_date {
                    state.last_publish_date = post.published;
                }
            }

            new_posts.extend(
                posts
                    .into_iter()
                    .filter(|p| p.published > baseline)
                    .filter(|p| self.filter.should_include(p, &feed.url)),
            );
        }

        new_posts.sort_by_key(|p| p.published);
        report.add_new_posts(new_posts.len());
        Ok(new_posts)
    }

    /// Current baselines.
    pub fn snapshot(&self) -> Baselines {
        self.states.clone()
    }

    pub fn baseline(&self, url: &str) -> Option<DateTime<Utc>> {
        self.states.get(url).map(|s| s.last_publish_date)
    }

    /// Fetches `feeds` concurrently, at most `concurrency` at a time.
    ///
    /// Fails as a whole if any fetch was cancelled, so callers never apply a
    /// partial poll.
    async fn fetch_all(
        &self,
        feeds: &[FeedUrl],
        cancel: &CancellationToken,
    ) -> Result<Vec<(FeedUrl, Result<Vec<Post>, SourceError>)>, Cancelled> {
        let source = &self.source;
        let results: Vec<_> = stream::iter(feeds.iter().cloned())
            .map(|feed| async move {
                let result = source.fetch_posts(&feed.url, feed.kind, cancel).await;
                (feed, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        if cancel.is_cancelled() || results.iter().any(|(_, r)| matches!(r, Err(SourceError::Cancelled(_)))) {
            return Err(Cancelled);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::PostFilterConfig;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Source that replays a fixed list of responses per URL, repeating the
    /// last one once exhausted.
    #[derive(Default)]
    struct ScriptedSource {
        script: Mutex<HashMap<String, Vec<Result<Vec<Post>, u16>>>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn with(url: &str, responses: Vec<Result<Vec<Post>, u16>>) -> Self {
            let source = Self::default();
            source.push(url, responses);
            source
        }

        fn push(&self, url: &str, responses: Vec<Result<Vec<Post>, u16>>) {
            self.script.lock().unwrap().insert(url.to_string(), responses);
        }
    }

    #[async_trait]
    impl FeedSource for ScriptedSource {
        async fn fetch_posts(
            &self,
            url: &str,
            _kind: FeedKind,
            cancel: &CancellationToken,
        ) -> Result<Vec<Post>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if cancel.is_cancelled() {
                return Err(SourceError::Cancelled(Cancelled));
            }
            let mut script = self.script.lock().unwrap();
            let responses = script.get_mut(url).ok_or(SourceError::Unreachable)?;
            let next = if responses.len() > 1 {
                responses.remove(0)
            } else {
                responses[0].clone()
            };
            next.map_err(SourceError::HttpStatus)
        }
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn post(title: &str, published: DateTime<Utc>) -> Post {
        Post {
            title: title.to_string(),
            link: format!("https://example.com/{title}"),
            description: String::new(),
            author: String::new(),
            published,
            image_url: None,
            tag: "tag".to_string(),
            labels: Vec::new(),
        }
    }

    fn engine(source: Arc<ScriptedSource>, urls: &[&str]) -> FeedStateEngine {
        FeedStateEngine::new(
            source,
            PostFilter::default(),
            urls.iter().map(|u| FeedUrl::rss(*u)).collect(),
            5,
        )
    }

    fn prior(url: &str, date: DateTime<Utc>) -> Baselines {
        HashMap::from([(
            url.to_string(),
            FeedState {
                is_youtube: false,
                last_publish_date: date,
            },
        )])
    }

    #[tokio::test]
    async fn test_only_strictly_newer_items_reported() {
        let source = Arc::new(ScriptedSource::with(
            "u",
            vec![Ok(vec![post("old", at(2023, 12, 31)), post("new", at(2024, 1, 2))])],
        ));
        let mut engine = engine(Arc::clone(&source), &["u"]);
        let cancel = CancellationToken::new();
        engine.initialize(&prior("u", at(2024, 1, 1)), &cancel).await.unwrap();

        let mut report = CycleReport::new("t");
        let posts = engine.check_for_new_posts(&mut report, &cancel).await.unwrap();

        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].title, "new");
        assert_eq!(engine.baseline("u"), Some(at(2024, 1, 2)));
        assert_eq!(report.response_code("u"), Some(200));
    }

    #[tokio::test]
    async fn test_equal_timestamp_not_redelivered() {
        let source = Arc::new(ScriptedSource::with("u", vec![Ok(vec![post("same", at(2024, 1, 1))])]));
        let mut engine = engine(source, &["u"]);
        let cancel = CancellationToken::new();
        engine.initialize(&prior("u", at(2024, 1, 1)), &cancel).await.unwrap();

        let posts = engine
            .check_for_new_posts(&mut CycleReport::new("t"), &cancel)
            .await
            .unwrap();
        assert!(posts.is_empty());
    }

    #[tokio::test]
    async fn test_prior_baseline_skips_initial_fetch() {
        let source = Arc::new(ScriptedSource::with("u", vec![Ok(vec![])]));
        let mut engine = engine(Arc::clone(&source), &["u"]);

        engine
            .initialize(&prior("u", at(2024, 1, 1)), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        assert_eq!(engine.baseline("u"), Some(at(2024, 1, 1)));
    }

    #[tokio::test]
    async fn test_initialize_never_reports_existing_items() {
        let items = vec![post("a", at(2024, 1, 1)), post("b", at(2024, 1, 5))];
        let source = Arc::new(ScriptedSource::with("u", vec![Ok(items)]));
        let mut engine = engine(source, &["u"]);
        let cancel = CancellationToken::new();

        engine.initialize(&HashMap::new(), &cancel).await.unwrap();
        assert_eq!(engine.baseline("u"), Some(at(2024, 1, 5)));

        let posts = engine
            .check_for_new_posts(&mut CycleReport::new("t"), &cancel)
            .await
            .unwrap();
        assert!(posts.is_empty());
    }

    #[tokio::test]
    async fn test_failed_initial_fetch_starts_from_now() {
        let source = Arc::new(ScriptedSource::with("u", vec![Err(500)]));
        let mut engine = engine(source, &["u"]);
        let before = Utc::now();

        engine.initialize(&HashMap::new(), &CancellationToken::new()).await.unwrap();

        let baseline = engine.baseline("u").unwrap();
        assert!(baseline >= before);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_baseline() {
        let source = Arc::new(ScriptedSource::with("u", vec![Err(503)]));
        let mut engine = engine(source, &["u"]);
        let cancel = CancellationToken::new();
        engine.initialize(&prior("u", at(2024, 1, 1)), &cancel).await.unwrap();

        let mut report = CycleReport::new("t");
        let posts = engine.check_for_new_posts(&mut report, &cancel).await.unwrap();

        assert!(posts.is_empty());
        assert_eq!(engine.baseline("u"), Some(at(2024, 1, 1)));
        assert_eq!(report.response_code("u"), Some(503));
    }

    #[tokio::test]
    async fn test_posts_sorted_across_urls() {
        let source = Arc::new(ScriptedSource::default());
        source.push("a", vec![Ok(vec![post("a3", at(2024, 1, 3)), post("a1", at(2024, 1, 1))])]);
        source.push("b", vec![Ok(vec![post("b2", at(2024, 1, 2))])]);
        let mut engine = engine(source, &["a", "b"]);
        let cancel = CancellationToken::new();
        let mut baselines = prior("a", at(2023, 1, 1));
        baselines.extend(prior("b", at(2023, 1, 1)));
        engine.initialize(&baselines, &cancel).await.unwrap();

        let posts = engine
            .check_for_new_posts(&mut CycleReport::new("t"), &cancel)
            .await
            .unwrap();
        let titles: Vec<_> = posts.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["a1", "b2", "a3"]);
    }

    #[tokio::test]
    async fn test_filtered_posts_still_advance_baseline() {
        let source = Arc::new(ScriptedSource::with(
            "u",
            vec![Ok(vec![post("rust news", at(2024, 1, 2)), post("go news", at(2024, 1, 3))])],
        ));
        let filter = PostFilter::new(&[PostFilterConfig {
            url: "all".into(),
            filters: vec!["rust".into()],
        }]);
        let mut engine = FeedStateEngine::new(source, filter, vec![FeedUrl::rss("u")], 5);
        let cancel = CancellationToken::new();
        engine.initialize(&prior("u", at(2024, 1, 1)), &cancel).await.unwrap();

        let posts = engine
            .check_for_new_posts(&mut CycleReport::new("t"), &cancel)
            .await
            .unwrap();

        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].title, "rust news");
        assert_eq!(engine.baseline("u"), Some(at(2024, 1, 3)));
    }

    #[tokio::test]
    async fn test_cancelled_poll_leaves_state_untouched() {
        let source = Arc::new(ScriptedSource::with("u", vec![Ok(vec![post("new", at(2024, 6, 1))])]));
        let mut engine = engine(source, &["u"]);
        let cancel = CancellationToken::new();
        engine.initialize(&prior("u", at(2024, 1, 1)), &cancel).await.unwrap();

        cancel.cancel();
        let result = engine.check_for_new_posts(&mut CycleReport::new("t"), &cancel).await;

        assert_eq!(result, Err(Cancelled));
        assert_eq!(engine.baseline("u"), Some(at(2024, 1, 1)));
    }

    #[tokio::test]
    async fn test_duplicate_urls_collapsed() {
        let source = Arc::new(ScriptedSource::with("u", vec![Ok(vec![])]));
        let engine = engine(source, &["u", "u"]);
        assert_eq!(engine.urls().len(), 1);
    }

    fn run<F: std::future::Future>(fut: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(fut)
    }

    proptest! {
        #[test]
        fn prop_baseline_is_max_observed_and_monotonic(
            start in 0i64..1_000,
            polls in prop::collection::vec(prop::collection::vec(0i64..2_000, 0..6), 1..6),
        ) {
            let epoch = at(2024, 1, 1);
            let responses: Vec<Result<Vec<Post>, u16>> = polls
                .iter()
                .map(|offsets| {
                    Ok(offsets
                        .iter()
                        .map(|o| post(&o.to_string(), epoch + Duration::minutes(*o)))
                        .collect())
                })
                .collect();
            let source = Arc::new(ScriptedSource::with("u", responses));
            let mut engine = engine(source, &["u"]);
            let cancel = CancellationToken::new();
            let initial = epoch + Duration::minutes(start);

            run(async {
                engine.initialize(&prior("u", initial), &cancel).await.unwrap();

                let mut expected = initial;
                for offsets in &polls {
                    let before = engine.baseline("u").unwrap();
                    let posts = engine
                        .check_for_new_posts(&mut CycleReport::new("p"), &cancel)
                        .await
                        .unwrap();

                    for p in &posts {
                        prop_assert!(p.published > before);
                    }
                    for o in offsets {
                        expected = expected.max(epoch + Duration::minutes(*o));
                    }
                    let after = engine.baseline("u").unwrap();
                    prop_assert!(after >= before);
                    prop_assert_eq!(after, expected);
                }
                Ok(())
            })?;
        }
    }
}
