//! Conceal wallet - application state store
//!
//! This library holds the single state document the mobile wallet renders
//! from, the action protocol that is the only way to change it, and the
//! capabilities (notifications, owned timers) its transitions drive.

pub mod actions;
pub mod config;
pub mod effects;
pub mod error;
pub mod logging;
pub mod merge;
pub mod notify;
pub mod reducer;
pub mod state;
pub mod store;
pub mod timers;

// Re-export commonly used types
pub use actions::{Action, ActionKind, IntervalSpec, IntervalTask};
pub use config::Config;
pub use effects::{Effect, Notification, Severity};
pub use error::{ConcealError, Result};
pub use notify::{Notifier, NullNotifier, ToastBus};
pub use reducer::{reduce, Transition};
pub use state::AppState;
pub use store::Store;
pub use timers::{IntervalHandle, TimerDriver, TokioTimers};
