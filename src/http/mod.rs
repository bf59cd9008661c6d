//! Resilient HTTP layer shared by feed fetching and webhook delivery.
//!
//! - [`ResilientClient`] - throttled GET with user-agent fallback, rate-limited
//!   POST with channel-type fallback
//! - [`HttpSettings`] - agents, intervals and the robots.txt pattern, built once
//! - [`TokenBucket`] - FIFO single-token limiter used for webhook posts

mod client;
mod rate_limit;
mod settings;

pub use client::{FetchedPage, ResilientClient, MAX_BODY_SIZE};
pub use rate_limit::TokenBucket;
pub use settings::{build_client, HttpSettings};
