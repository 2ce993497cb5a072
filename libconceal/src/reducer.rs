//! Pure reducer function for state transitions
//!
//! `(&AppState, Action, now) -> Result<Transition>`
//!
//! The reducer performs no I/O. Toasts and timer changes are returned as
//! [`Effect`] values for the store to run after the new document is
//! installed. The input document is never mutated: regions are copied on
//! write through `Arc::make_mut`, and a rejected action produces no
//! document at all.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::actions::Action;
use crate::effects::{Effect, Notification, Severity};
use crate::error::{ConcealError, Result};
use crate::merge::{deep_merge, shallow_merge};
use crate::state::{AppState, LayoutMessage, Wallet};
use crate::timers::IntervalHandle;

/// Market whose ticker reports volume as `vol_market`
const STEX: &str = "stex";

const PAYMENT_SENT_MESSAGE: &str = "Payment was successfully sent to the recipient";

/// Result of applying one action
#[derive(Debug, Clone)]
pub struct Transition {
    pub state: AppState,
    pub effects: Vec<Effect>,
}

/// Pure reducer function
///
/// Takes the current document and an action, returns the next document
/// together with the effects the transition requests. `now` is the
/// timestamp recorded by `APP_UPDATED`.
pub fn reduce(state: &AppState, action: Action, now: DateTime<Utc>) -> Result<Transition> {
    let kind = action.kind();
    let mut next = state.clone();
    let mut effects = Vec::new();

    tracing::trace!(%kind, "reduce");

    match action {
        // === Session ===
        Action::SetToken { token } => {
            Arc::make_mut(&mut next.user).token = token;
        }

        Action::UserLoggedIn => {
            if !state.user.logged_in {
                tracing::info!("logging in user");
                Arc::make_mut(&mut next.user).logged_in = true;
            }
        }

        Action::UserLoaded { user } => {
            next.user = Arc::new(state.user.merged(&user));
            Arc::make_mut(&mut next.layout).user_loaded = true;
        }

        Action::TwoFactorCheck { value } => {
            Arc::make_mut(&mut next.user_settings).two_fa_enabled = value;
        }

        // === Layout ===
        Action::UpdateQrCode { qr_code_url } => {
            Arc::make_mut(&mut next.layout).qr_code_url = qr_code_url;
        }

        Action::FormSubmitted { value } => {
            let layout = Arc::make_mut(&mut next.layout);
            layout.form_submitted = value;
            if value {
                layout.message = LayoutMessage::default();
            }
        }

        Action::DisplayMessage { message, id } => {
            let message = LayoutMessage { id, lines: message };
            if !message.is_empty() {
                effects.push(notify(state, Severity::Error, message.text()));
            }
            Arc::make_mut(&mut next.layout).message = message;
        }

        Action::RedirectToReferrer { value } => {
            Arc::make_mut(&mut next.layout).redirect_to_referrer = value;
        }

        Action::AppUpdated => {
            Arc::make_mut(&mut next.layout).last_update = now;
        }

        Action::BarcodeScanned => {}

        // === Wallets ===
        Action::WalletsLoaded => {
            Arc::make_mut(&mut next.layout).wallets_loaded = true;
        }

        Action::SetWalletKeys { address, keys } => {
            Arc::make_mut(&mut next.wallets)
                .entry(address)
                .or_default()
                .keys = Some(keys);
        }

        Action::CreateWallet { address } => {
            if !state.wallets.contains_key(&address) {
                Arc::make_mut(&mut next.wallets).insert(address, Wallet::default());
            }
        }

        Action::UpdateWallets { wallets } => {
            if !wallets.is_empty() {
                Arc::make_mut(&mut next.wallets).extend(wallets);
            }
        }

        Action::DeleteWallet { address } => {
            if state.wallets.contains_key(&address) {
                Arc::make_mut(&mut next.wallets).remove(&address);
            }
        }

        Action::DeleteWallets => {
            next.wallets = Arc::new(BTreeMap::new());
        }

        Action::SendTx { send_tx_response } => {
            Arc::make_mut(&mut next.layout).send_tx_response = send_tx_response;
        }

        Action::PaymentSent => {
            effects.push(notify(state, Severity::Success, PAYMENT_SENT_MESSAGE.to_string()));
        }

        // === Network and markets ===
        Action::UpdateBlockchainHeight { blockchain_height } => {
            if blockchain_height < state.network.blockchain_height {
                tracing::warn!(
                    previous = state.network.blockchain_height,
                    reported = blockchain_height,
                    "blockchain height went backwards"
                );
            }
            Arc::make_mut(&mut next.network).blockchain_height = blockchain_height;
        }

        Action::UpdateMarket {
            market,
            mut market_data,
        } => {
            let current = state
                .markets
                .get(&market)
                .ok_or_else(|| ConcealError::UnknownMarket(market.clone()))?;

            if market_data.get("result").and_then(Value::as_str) == Some("error") {
                tracing::debug!(%market, "market reported an error, keeping last ticker");
            } else {
                if market == STEX {
                    let volume = market_data
                        .get("vol_market")
                        .filter(|v| !v.is_null())
                        .cloned()
                        .unwrap_or_else(|| json!(0));
                    market_data.insert("volume".to_string(), volume);
                }
                let updated = current
                    .merged(&market_data)
                    .map_err(|reason| ConcealError::invalid_payload(kind, reason))?;
                Arc::make_mut(&mut next.markets).insert(market, updated);
            }
        }

        Action::UpdatePrices { prices } => {
            Arc::make_mut(&mut next.prices).extend(prices);
        }

        Action::UpdateMarketData { market_data } => {
            next.market_data = Arc::new(shallow_merge(&state.market_data, &market_data));
        }

        // === Lifecycle ===
        Action::SetIntervals { intervals } => {
            if let Some(index) = intervals.iter().position(|spec| spec.every == Duration::ZERO) {
                return Err(ConcealError::invalid_payload(
                    kind,
                    format!("intervals[{}]: period must be greater than zero", index),
                ));
            }

            // Previously owned timers are released before the new set starts
            effects.extend(state.intervals.iter().copied().map(Effect::CancelInterval));

            let mut handles = Vec::with_capacity(intervals.len());
            for spec in intervals {
                let handle = IntervalHandle::new(next.next_interval_id);
                next.next_interval_id += 1;
                handles.push(handle);
                effects.push(Effect::StartInterval { handle, spec });
            }
            next.intervals = Arc::new(handles);
        }

        Action::SetAppData { app_data } => {
            if !app_data.is_object() {
                return Err(ConcealError::invalid_payload(kind, "`appData` must be an object"));
            }
            next.app_data = Arc::new(deep_merge(&state.app_data, &app_data));
        }

        Action::ClearApp => {
            tracing::info!(timers = state.intervals.len(), "app cleanup");
            effects.extend(state.intervals.iter().copied().map(Effect::CancelInterval));
            next.intervals = Arc::new(Vec::new());

            let layout = Arc::make_mut(&mut next.layout);
            layout.app_loaded = false;
            layout.user_loaded = false;
            layout.wallets_loaded = false;

            let user = Arc::make_mut(&mut next.user);
            user.logged_in = false;
            user.token = None;

            next.wallets = Arc::new(BTreeMap::new());
        }
    }

    Ok(Transition {
        state: next,
        effects,
    })
}

fn notify(state: &AppState, severity: Severity, message: String) -> Effect {
    Effect::Notify(Notification {
        severity,
        message,
        duration: Duration::from_millis(state.app_settings.message_timeout_ms),
    })
}
