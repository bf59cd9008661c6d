//! Cooperative cancellation shared by every suspension point.
//!
//! One [`CancellationToken`] is derived from the process shutdown signal and
//! handed to each worker. Anything that awaits (sleeps, throttle slots,
//! rate-limiter tokens, network calls) races against it and reports
//! [`Cancelled`] rather than an error, so callers can unwind quietly.

use std::future::Future;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Marker returned when work was abandoned because shutdown was requested.
///
/// Never logged as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Runs `fut` to completion unless `cancel` fires first.
///
/// Cancellation wins ties so that a shutdown requested before the call never
/// starts new work.
pub async fn until_cancelled<F>(cancel: &CancellationToken, fut: F) -> Result<F::Output, Cancelled>
where
    F: Future,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Cancelled),
        out = fut => Ok(out),
    }
}
