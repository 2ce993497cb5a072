//! Notification surface
//!
//! The store reports transient user-facing messages (failed form checks,
//! sent payments) through a [`Notifier`]. The default implementation is an
//! in-process broadcast bus the UI layer subscribes to.
//!
//! # Non-Blocking Behavior
//!
//! If no subscribers exist, notifications are dropped immediately. A
//! subscriber that lags loses the oldest messages instead of blocking the
//! store.
//!
//! # Example
//!
//! ```no_run
//! use libconceal::notify::{Notifier, ToastBus};
//! use libconceal::{Notification, Severity};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let bus = ToastBus::new(32);
//! let mut receiver = bus.subscribe();
//!
//! bus.notify(Notification {
//!     severity: Severity::Info,
//!     message: "Wallet synced".to_string(),
//!     duration: Duration::from_secs(3),
//! });
//!
//! if let Ok(toast) = receiver.recv().await {
//!     println!("[{}] {}", toast.severity, toast.message);
//! }
//! # }
//! ```

use tokio::sync::broadcast;

use crate::effects::Notification;

/// Receiver type handed out by [`ToastBus::subscribe`]
pub type ToastReceiver = broadcast::Receiver<Notification>;

/// Shows transient messages to the user
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Broadcast bus distributing notifications to any number of subscribers
#[derive(Clone)]
pub struct ToastBus {
    sender: broadcast::Sender<Notification>,
}

impl ToastBus {
    /// Create a bus buffering up to `capacity` messages per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> ToastReceiver {
        self.sender.subscribe()
    }

    /// Number of active subscribers, for diagnostics only
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ToastBus {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Notifier for ToastBus {
    fn notify(&self, notification: Notification) {
        // Err only means nobody is listening
        let _ = self.sender.send(notification);
    }
}

/// Notifier that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, notification: Notification) {
        tracing::trace!(message = %notification.message, "notification discarded");
    }
}
