//! Alert delivery
//!
//! Notifications are fire-and-forget: a notifier must not block the
//! monitoring loop and never reports delivery failures back to it.

use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Receives human-readable alerts
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Emits alerts as warning-level log events
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        warn!(alert = message, "Health alert");
    }
}

/// Forwards alerts to a bounded channel, dropping them when it is full
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: mpsc::Sender<String>,
}

impl ChannelNotifier {
    /// Create a notifier and the receiver its alerts arrive on
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, message: &str) {
        if let Err(e) = self.sender.try_send(message.to_string()) {
            debug!(error = %e, "Dropping alert");
        }
    }
}
