//! Effect descriptions and the runner that performs them
//!
//! The reducer never shows a toast or starts a timer itself. It returns
//! [`Effect`] values next to the new document, and the store hands them to
//! an [`EffectRunner`] once that document is installed.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::actions::{IntervalSpec, IntervalTask};
use crate::notify::Notifier;
use crate::timers::{IntervalHandle, Tick, TimerDriver};

/// Side effect requested by a transition
#[derive(Debug, Clone)]
pub enum Effect {
    /// Show a transient message to the user
    Notify(Notification),

    /// Start an owned timer under a handle already recorded in the document
    StartInterval {
        handle: IntervalHandle,
        spec: IntervalSpec,
    },

    /// Stop an owned timer
    CancelInterval(IntervalHandle),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Info,
    Success,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Info => write!(f, "info"),
            Severity::Success => write!(f, "success"),
        }
    }
}

/// Transient user-facing message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub severity: Severity,
    pub message: String,
    /// How long the message stays visible
    pub duration: Duration,
}

/// Executes effects against the injected capabilities
pub struct EffectRunner {
    notifier: Arc<dyn Notifier>,
    timers: Arc<dyn TimerDriver>,
}

impl EffectRunner {
    pub fn new(notifier: Arc<dyn Notifier>, timers: Arc<dyn TimerDriver>) -> Self {
        Self { notifier, timers }
    }

    /// Run effects in order
    ///
    /// `bind` turns the task of a newly started timer into the callback the
    /// driver runs; the store uses it to route re-dispatched actions back
    /// through itself.
    pub fn run<F>(&self, effects: Vec<Effect>, bind: F)
    where
        F: Fn(IntervalHandle, IntervalTask) -> Tick,
    {
        for effect in effects {
            match effect {
                Effect::Notify(notification) => {
                    tracing::debug!(
                        severity = %notification.severity,
                        message = %notification.message,
                        "notify"
                    );
                    self.notifier.notify(notification);
                }
                Effect::StartInterval { handle, spec } => {
                    let tick = bind(handle, spec.task);
                    if let Err(e) = self.timers.start(handle, spec.every, tick) {
                        tracing::error!(%handle, error = %e, "failed to start owned timer");
                    }
                }
                Effect::CancelInterval(handle) => self.timers.cancel(handle),
            }
        }
    }

    /// Cancel a set of handles outside of a transition
    pub fn cancel_all(&self, handles: &[IntervalHandle]) {
        for handle in handles {
            self.timers.cancel(*handle);
        }
    }
}
