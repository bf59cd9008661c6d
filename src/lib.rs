//! Polls RSS and YouTube feeds and relays new items to Discord-compatible
//! webhooks.
//!
//! Each configured feed instance runs as an independent [`worker::FeedWorker`]
//! built from a [`state::FeedStateEngine`] (what is new), a
//! [`notify::WebhookNotifier`] (delivery) and an optional
//! [`storage::StateStore`] (baselines across restarts). All HTTP goes through
//! [`http::ResilientClient`], which shares one concurrency throttle across the
//! whole process.

pub mod config;
pub mod feed;
pub mod http;
pub mod notify;
pub mod observe;
pub mod shutdown;
pub mod state;
pub mod storage;
pub mod util;
pub mod worker;

#[cfg(test)]
mod test_log;

pub use shutdown::Cancelled;
