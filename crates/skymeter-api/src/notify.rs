//! Notification seam for account lifecycle events
//!
//! Email transport is outside this service's scope; lifecycle events (plan
//! upgrades, key resets) still need somewhere to go. `Notifier` is the seam,
//! and the default implementation records events on the tracing stream.
//! Delivery is fire-and-forget: a failed notification never fails the
//! request that triggered it.

use tracing::info;

/// Sink for account lifecycle notifications
pub trait Notifier: Send + Sync {
    fn notify(&self, to: &str, subject: &str, body: &str);
}

/// Notifier that records events on the tracing stream
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, to: &str, subject: &str, body: &str) {
        info!(to, subject, body, "notification dispatched");
    }
}
