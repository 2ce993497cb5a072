//! The application state store
//!
//! One `Store` is created at process start and handed to every screen.
//! Screens change state only through [`Store::dispatch`] and read it
//! through [`Store::snapshot`] or a [`Store::subscribe`] receiver.
//!
//! # Lifecycle
//!
//! - `init` builds the default document from configuration
//! - `dispatch` applies one action at a time and runs its effects
//! - `teardown` dispatches `CLEAR_APP`, cancelling every owned timer
//!
//! # Example
//!
//! ```no_run
//! use libconceal::{Action, Config, Store, ToastBus, TokioTimers};
//! use std::sync::Arc;
//!
//! # async fn example() -> libconceal::Result<()> {
//! let toasts = Arc::new(ToastBus::default());
//! let timers = Arc::new(TokioTimers::from_current()?);
//! let store = Store::init(&Config::default_config(), toasts, timers);
//!
//! store.dispatch(Action::UserLoggedIn)?;
//! assert!(store.snapshot().user.logged_in);
//!
//! store.teardown()?;
//! # Ok(())
//! # }
//! ```

use chrono::Utc;
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use serde_json::Value;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use tokio::sync::watch;

use crate::actions::{Action, IntervalFn, IntervalTask};
use crate::config::Config;
use crate::effects::{Effect, EffectRunner};
use crate::error::Result;
use crate::notify::Notifier;
use crate::reducer::{reduce, Transition};
use crate::state::AppState;
use crate::timers::{IntervalHandle, Tick, TimerDriver};

/// Handle to the application state store
///
/// Cheap to clone; all clones share one document. Dropping the last clone
/// cancels any timers the document still owns.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

struct Inner {
    /// Held for the whole of a transition, effects included
    transition: Mutex<()>,
    /// Last applied document, readable while a transition runs
    last_applied: RwLock<AppState>,
    publisher: watch::Sender<AppState>,
    runner: EffectRunner,
    /// One gate per running callback timer, held while its callback runs
    gates: Mutex<BTreeMap<IntervalHandle, Gate>>,
}

/// Set once the handle is released; locked for the duration of a callback
type Gate = Arc<ReentrantMutex<Cell<bool>>>;

impl Store {
    /// Create a store with the default document for `config`
    pub fn init(
        config: &Config,
        notifier: Arc<dyn Notifier>,
        timers: Arc<dyn TimerDriver>,
    ) -> Self {
        Self::with_state(AppState::new(config), notifier, timers)
    }

    /// Create a store around an existing document
    pub fn with_state(
        state: AppState,
        notifier: Arc<dyn Notifier>,
        timers: Arc<dyn TimerDriver>,
    ) -> Self {
        tracing::info!(
            markets = state.markets.len(),
            wallets = state.wallets.len(),
            "state store initialized"
        );
        let (publisher, _) = watch::channel(state.clone());
        Self {
            inner: Arc::new(Inner {
                transition: Mutex::new(()),
                last_applied: RwLock::new(state),
                publisher,
                runner: EffectRunner::new(notifier, timers),
                gates: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    /// Apply one action and return the resulting document
    ///
    /// A rejected action leaves the current document untouched and runs no
    /// effects. Notifiers and timer drivers must not dispatch synchronously
    /// from inside their own calls; timer callbacks run later and may.
    pub fn dispatch(&self, action: Action) -> Result<AppState> {
        self.inner.apply(action, None)
    }

    /// Decode a tagged JSON action and apply it
    pub fn dispatch_json(&self, value: &Value) -> Result<AppState> {
        let action = Action::from_json(value).map_err(|e| {
            tracing::warn!(error = %e, "action rejected");
            e
        })?;
        self.dispatch(action)
    }

    /// The most recently applied document
    pub fn snapshot(&self) -> AppState {
        self.inner.last_applied.read().clone()
    }

    /// Receiver that is notified of every installed document
    pub fn subscribe(&self) -> watch::Receiver<AppState> {
        self.inner.publisher.subscribe()
    }

    /// Full application reset: cancels owned timers and drops the session
    ///
    /// Returns once every callback that was already running has finished;
    /// no owned callback starts afterwards. A callback that tears down the
    /// store itself is not waited for.
    pub fn teardown(&self) -> Result<AppState> {
        self.dispatch(Action::ClearApp)
    }
}

impl Inner {
    fn apply(self: &Arc<Self>, action: Action, origin: Option<IntervalHandle>) -> Result<AppState> {
        let transition = self.transition.lock();
        let current = self.last_applied.read().clone();

        if let Some(handle) = origin {
            if !current.owns_interval(handle) {
                tracing::debug!(%handle, "dropping action from released timer");
                return Ok(current);
            }
        }

        let kind = action.kind();
        let Transition { state, effects } = reduce(&current, action, Utc::now()).map_err(|e| {
            tracing::warn!(%kind, error = %e, "action rejected");
            e
        })?;

        *self.last_applied.write() = state.clone();
        self.publisher.send_replace(state.clone());
        tracing::debug!(%kind, effects = effects.len(), "action applied");

        let released: Vec<IntervalHandle> = effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::CancelInterval(handle) => Some(*handle),
                _ => None,
            })
            .collect();
        self.runner.run(effects, |handle, task| self.bind(handle, task));

        // A running callback may be waiting on the transition lock
        drop(transition);
        self.release(&released);

        Ok(state)
    }

    fn owns(&self, handle: IntervalHandle) -> bool {
        self.last_applied.read().owns_interval(handle)
    }

    /// Build the callback a timer runs for `task`
    ///
    /// Both kinds check that the document still owns `handle` before doing
    /// anything. Re-dispatched actions are checked under the transition
    /// lock; callbacks run inside the handle's gate.
    fn bind(self: &Arc<Self>, handle: IntervalHandle, task: IntervalTask) -> Tick {
        let store = Arc::downgrade(self);
        match task {
            IntervalTask::Dispatch(action) => Arc::new(move || {
                let Some(inner) = store.upgrade() else {
                    return;
                };
                if let Err(e) = inner.apply((*action).clone(), Some(handle)) {
                    tracing::warn!(%handle, error = %e, "timer action rejected");
                }
            }),
            IntervalTask::Callback(IntervalFn(callback)) => {
                let gate: Gate = Arc::default();
                self.gates.lock().insert(handle, Arc::clone(&gate));
                Arc::new(move || run_gated(&store, &gate, handle, &callback))
            }
        }
    }

    /// Close the gates of released handles, waiting out running callbacks
    fn release(&self, handles: &[IntervalHandle]) {
        for handle in handles {
            let gate = self.gates.lock().remove(handle);
            if let Some(gate) = gate {
                gate.lock().set(true);
                tracing::trace!(%handle, "callback gate closed");
            }
        }
    }
}

fn run_gated(store: &Weak<Inner>, gate: &Gate, handle: IntervalHandle, callback: &Tick) {
    let Some(inner) = store.upgrade() else {
        return;
    };
    // Declared after `inner` so the gate opens before the store can drop
    let released = gate.lock();
    if released.get() || !inner.owns(handle) {
        return;
    }
    callback();
}

impl Drop for Inner {
    fn drop(&mut self) {
        let owned = self.last_applied.get_mut().intervals.clone();
        if !owned.is_empty() {
            tracing::debug!(timers = owned.len(), "store dropped, cancelling owned timers");
            self.runner.cancel_all(&owned);
        }
    }
}
