use super::rate_limit::TokenBucket;
use super::settings::{robots_url, HttpSettings};
use crate::shutdown::{until_cancelled, Cancelled};
use crate::util::{mask_secrets, take_chars};
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::{Response, StatusCode};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio_util::sync::CancellationToken;

/// Longest slice of a failed webhook response body kept in the logs.
const MAX_LOGGED_BODY: usize = 512;

/// Largest response body read into memory.
pub const MAX_BODY_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Why a single request attempt produced no response.
#[derive(Debug)]
enum AttemptError {
    Cancelled,
    Request(reqwest::Error),
    TooLarge,
    ThrottleClosed,
}

impl From<Cancelled> for AttemptError {
    fn from(_: Cancelled) -> Self {
        AttemptError::Cancelled
    }
}

impl From<reqwest::Error> for AttemptError {
    fn from(e: reqwest::Error) -> Self {
        AttemptError::Request(e)
    }
}

/// A fully read GET response.
///
/// The body is only kept for 2xx answers; it is empty otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

/// HTTP client for one feed instance.
///
/// Every request, GET or POST, holds a slot from the process-wide throttle
/// until its response body has been read. GETs that are answered with a
/// blocking status retry with other identities; webhook POSTs are spaced by a
/// per-client [`TokenBucket`] and retried once with the other channel payload
/// shape.
#[derive(Debug)]
pub struct ResilientClient {
    http: reqwest::Client,
    throttle: Arc<Semaphore>,
    settings: Arc<HttpSettings>,
    post_limiter: TokenBucket,
    // URL -> agent that last got a successful answer. Never persisted.
    learned_agents: Mutex<HashMap<String, String>>,
}

impl ResilientClient {
    pub fn new(http: reqwest::Client, throttle: Arc<Semaphore>, settings: Arc<HttpSettings>) -> Self {
        let post_limiter = TokenBucket::new(settings.post_min_interval);
        Self {
            http,
            throttle,
            settings,
            post_limiter,
            learned_agents: Mutex::new(HashMap::new()),
        }
    }

    /// Agent learned for `url` by an earlier fallback, if any.
    pub fn learned_agent(&self, url: &str) -> Option<String> {
        self.agents().get(url).cloned()
    }

    fn remember_agent(&self, url: &str, agent: &str) {
        self.agents().insert(url.to_string(), agent.to_string());
    }

    // The map holds plain strings, so a panic elsewhere cannot leave it torn.
    fn agents(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.learned_agents.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// GETs `url`, rotating identities when the server blocks us.
    ///
    /// Returns `Ok(None)` when no response could be obtained at all (the
    /// failure is logged), and the last response seen when every identity was
    /// refused. Only cancellation surfaces as an error.
    pub async fn fetch_with_fallback(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<FetchedPage>, Cancelled> {
        let first_agent = self.learned_agent(url);
        let page = match self.get(url, first_agent.as_deref(), cancel).await {
            Ok(page) => page,
            Err(AttemptError::Cancelled) => return Err(Cancelled),
            Err(e) => {
                log_attempt_failure(url, &e);
                return Ok(None);
            }
        };

        if !is_blocking(page.status) {
            return Ok(Some(page));
        }

        tracing::debug!(url = %mask_secrets(url), status = %page.status, "Blocked, trying fallback user agents");
        self.retry_with_agents(url, page, cancel).await.map(Some)
    }

    async fn retry_with_agents(
        &self,
        url: &str,
        blocked: FetchedPage,
        cancel: &CancellationToken,
    ) -> Result<FetchedPage, Cancelled> {
        let mut last = blocked;

        for agent in &self.settings.fallback_user_agents {
            match self.try_agent(url, agent, last, cancel).await? {
                Ok(page) => return Ok(page),
                Err(page) => last = page,
            }
        }

        let robots_agents = self.fetch_robots_agents(url, cancel).await?;
        for agent in &robots_agents {
            match self.try_agent(url, agent, last, cancel).await? {
                Ok(page) => return Ok(page),
                Err(page) => last = page,
            }
        }

        tracing::warn!(
            url = %mask_secrets(url),
            status = %last.status,
            tried = self.settings.fallback_user_agents.len() + robots_agents.len(),
            "Every user agent was refused"
        );
        Ok(last)
    }

    /// One fallback attempt. `Ok(Ok(_))` is a success, `Ok(Err(_))` carries
    /// the page to fall back to if this attempt failed.
    async fn try_agent(
        &self,
        url: &str,
        agent: &str,
        last: FetchedPage,
        cancel: &CancellationToken,
    ) -> Result<Result<FetchedPage, FetchedPage>, Cancelled> {
        match self.get(url, Some(agent), cancel).await {
            Ok(page) if page.status.is_success() => {
                tracing::info!(url = %mask_secrets(url), user_agent = %agent, "Fallback user agent accepted");
                self.remember_agent(url, agent);
                Ok(Ok(page))
            }
            Ok(page) => Ok(Err(page)),
            Err(AttemptError::Cancelled) => Err(Cancelled),
            Err(e) => {
                log_attempt_failure(url, &e);
                Ok(Err(last))
            }
        }
    }

    async fn fetch_robots_agents(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, Cancelled> {
        let Some(robots) = robots_url(url) else {
            return Ok(Vec::new());
        };

        let body = {
            let _permit = match self.acquire_slot(cancel).await {
                Ok(permit) => permit,
                Err(AttemptError::Cancelled) => return Err(Cancelled),
                Err(_) => return Ok(Vec::new()),
            };
            let request = self.http.get(&robots).header(ACCEPT, "*/*").send();
            match until_cancelled(cancel, request).await? {
                Ok(r) if r.status().is_success() => until_cancelled(cancel, r.text()).await?,
                Ok(r) => {
                    tracing::debug!(url = %mask_secrets(&robots), status = %r.status(), "No robots.txt available");
                    return Ok(Vec::new());
                }
                Err(e) => Err(e),
            }
        };

        match body {
            Ok(text) => Ok(self.settings.robots_agents(&text)),
            Err(e) => {
                tracing::debug!(url = %mask_secrets(&robots), error = %mask_secrets(&e.to_string()), "robots.txt fetch failed");
                Ok(Vec::new())
            }
        }
    }

    /// One throttled GET. The slot is held until a 2xx body is fully read.
    async fn get(
        &self,
        url: &str,
        agent: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<FetchedPage, AttemptError> {
        let _permit = self.acquire_slot(cancel).await?;
        let mut request = self.http.get(url);
        if let Some(agent) = agent {
            request = request.header(USER_AGENT, agent);
        }
        let response = until_cancelled(cancel, request.send()).await??;

        let status = response.status();
        let body = if status.is_success() {
            until_cancelled(cancel, read_limited_bytes(response, MAX_BODY_SIZE)).await??
        } else {
            Vec::new()
        };
        Ok(FetchedPage { status, body })
    }

    async fn acquire_slot(&self, cancel: &CancellationToken) -> Result<SemaphorePermit<'_>, AttemptError> {
        until_cancelled(cancel, self.throttle.acquire())
            .await?
            .map_err(|_| AttemptError::ThrottleClosed)
    }

    /// Delivers a webhook payload, switching channel shape once on failure.
    ///
    /// `forum_body` and `text_body` are the two serialized shapes of the same
    /// notification; `is_forum` picks which one goes first. Failures are
    /// logged and swallowed. Only cancellation is returned.
    pub async fn post_with_fallback(
        &self,
        url: &str,
        forum_body: &str,
        text_body: &str,
        is_forum: bool,
        cancel: &CancellationToken,
    ) -> Result<(), Cancelled> {
        let (primary, alternate) = if is_forum {
            (forum_body, text_body)
        } else {
            (text_body, forum_body)
        };

        match self.post_once(url, primary, cancel).await? {
            Ok(()) => return Ok(()),
            Err(reason) => tracing::warn!(
                channel = channel_name(is_forum),
                reason = %reason,
                "Webhook rejected post, retrying with the other channel type"
            ),
        }

        match self.post_once(url, alternate, cancel).await? {
            Ok(()) => tracing::info!(
                configured = channel_name(is_forum),
                accepted = channel_name(!is_forum),
                "Webhook accepted the other channel type; check the instance forum setting"
            ),
            Err(reason) => tracing::error!(
                reason = %reason,
                "Webhook rejected both channel types, dropping post"
            ),
        }
        Ok(())
    }

    /// One rate-limited POST. The inner error describes the rejection.
    async fn post_once(
        &self,
        url: &str,
        body: &str,
        cancel: &CancellationToken,
    ) -> Result<Result<(), String>, Cancelled> {
        self.post_limiter.acquire(cancel).await?;

        let _permit = match self.acquire_slot(cancel).await {
            Ok(permit) => permit,
            Err(AttemptError::Cancelled) => return Err(Cancelled),
            Err(e) => return Ok(Err(format!("{e:?}"))),
        };
        let request = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .send();

        match until_cancelled(cancel, request).await? {
            Ok(r) if r.status() == StatusCode::NO_CONTENT => Ok(Ok(())),
            Ok(r) => {
                let status = r.status();
                let text = until_cancelled(cancel, r.text()).await?.unwrap_or_default();
                Ok(Err(format!("status {}: {}", status, take_chars(&text, MAX_LOGGED_BODY))))
            }
            Err(e) => Ok(Err(mask_secrets(&e.to_string()))),
        }
    }
}

/// Reads a body, failing once it grows past `limit` bytes.
async fn read_limited_bytes(response: Response, limit: usize) -> Result<Vec<u8>, AttemptError> {
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
            return Err(AttemptError::TooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(AttemptError::TooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

/// Statuses that usually mean "not for your user agent" rather than a real
/// failure.
fn is_blocking(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::FORBIDDEN
            | StatusCode::UNAUTHORIZED
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::NOT_ACCEPTABLE
    )
}

fn channel_name(is_forum: bool) -> &'static str {
    if is_forum {
        "forum"
    } else {
        "text"
    }
}

fn log_attempt_failure(url: &str, error: &AttemptError) {
    match error {
        AttemptError::Request(e) if e.is_timeout() => {
            tracing::warn!(url = %mask_secrets(url), "Request timed out")
        }
        AttemptError::Request(e) => {
            tracing::warn!(url = %mask_secrets(url), error = %mask_secrets(&e.to_string()), "Request failed")
        }
        AttemptError::TooLarge => {
            tracing::warn!(url = %mask_secrets(url), limit = MAX_BODY_SIZE, "Response body too large")
        }
        AttemptError::ThrottleClosed => {
            tracing::warn!(url = %mask_secrets(url), "Request throttle closed")
        }
        AttemptError::Cancelled => {}
    }
}
