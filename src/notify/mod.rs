//! Turning new posts into webhook deliveries.

mod dispatcher;
mod payload;

pub use dispatcher::{Notifier, WebhookNotifier};
pub use payload::{DisplayOptions, PayloadBuilder, MAX_THREAD_NAME_CHARS};
