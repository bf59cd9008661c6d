use crate::shutdown::{until_cancelled, Cancelled};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Single-token bucket that spaces out webhook deliveries.
///
/// Capacity is one and a token refills every `interval`. Waiters queue on a
/// `tokio::sync::Mutex`, which hands the lock out in FIFO order, so callers
/// are served in the order they arrived.
#[derive(Debug)]
pub struct TokenBucket {
    interval: Duration,
    next_token: Mutex<Option<Instant>>,
}

impl TokenBucket {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_token: Mutex::new(None),
        }
    }

    /// Waits for the next token.
    ///
    /// A cancelled waiter gives up its place in the queue without consuming
    /// a token.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        let mut next = until_cancelled(cancel, self.next_token.lock()).await?;

        if let Some(at) = *next {
            if at > Instant::now() {
                until_cancelled(cancel, tokio::time::sleep_until(at)).await?;
            }
        }

        *next = Some(Instant::now() + self.interval);
        Ok(())
    }
}
