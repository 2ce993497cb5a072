//! Actions for the reducer pattern
//!
//! All state transitions are triggered by actions. Screens build them
//! directly as Rust values or send tagged JSON records
//! (`{"type": "CREATE_WALLET", "address": "ccx7..."}`) that are decoded
//! here with every payload field checked up front.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ConcealError, Result};
use crate::state::{Secret, UserPatch, Wallet, WalletKeys};
use crate::timers::Tick;

/// Actions that trigger state transitions
#[derive(Debug, Clone)]
pub enum Action {
    // === Session ===
    /// Replace the session token
    SetToken { token: Option<Secret> },

    /// Mark the user as logged in
    UserLoggedIn,

    /// Merge profile fields into the user and flag it loaded
    UserLoaded { user: UserPatch },

    /// Record whether two-factor authentication is on
    TwoFactorCheck { value: bool },

    // === Layout ===
    UpdateQrCode { qr_code_url: String },

    FormSubmitted { value: bool },

    /// Show a message, optionally addressed to one form field
    DisplayMessage {
        message: Vec<String>,
        id: Option<String>,
    },

    RedirectToReferrer { value: bool },

    /// Touch `layout.lastUpdate`
    AppUpdated,

    /// Reserved, no state change
    BarcodeScanned,

    // === Wallets ===
    WalletsLoaded,

    /// Set a wallet's keys, creating the wallet if needed
    SetWalletKeys { address: String, keys: WalletKeys },

    /// Insert an empty wallet unless the address already exists
    CreateWallet { address: String },

    /// Replace the given wallets wholesale, keeping all others
    UpdateWallets { wallets: BTreeMap<String, Wallet> },

    DeleteWallet { address: String },

    DeleteWallets,

    SendTx { send_tx_response: Option<Value> },

    /// Confirmation that a payment went out
    PaymentSent,

    // === Network and markets ===
    UpdateBlockchainHeight { blockchain_height: u64 },

    /// Ticker response from one market source
    UpdateMarket {
        market: String,
        market_data: Map<String, Value>,
    },

    /// Prices of the Conceal coin per currency code
    UpdatePrices { prices: BTreeMap<String, f64> },

    UpdateMarketData { market_data: Map<String, Value> },

    // === Lifecycle ===
    /// Replace the store's owned timers
    SetIntervals { intervals: Vec<IntervalSpec> },

    /// Deep-merge per-screen scratch state
    SetAppData { app_data: Value },

    /// Cancel owned timers and drop the session
    ClearApp,
}

/// Tag of an action, as used on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    SetToken,
    UserLoggedIn,
    UserLoaded,
    TwoFactorCheck,
    UpdateQrCode,
    WalletsLoaded,
    SetWalletKeys,
    CreateWallet,
    UpdateWallets,
    DeleteWallet,
    DeleteWallets,
    SendTx,
    UpdateBlockchainHeight,
    UpdateMarket,
    UpdatePrices,
    UpdateMarketData,
    FormSubmitted,
    DisplayMessage,
    RedirectToReferrer,
    PaymentSent,
    AppUpdated,
    SetIntervals,
    SetAppData,
    BarcodeScanned,
    ClearApp,
}

impl ActionKind {
    pub const ALL: [ActionKind; 25] = [
        ActionKind::SetToken,
        ActionKind::UserLoggedIn,
        ActionKind::UserLoaded,
        ActionKind::TwoFactorCheck,
        ActionKind::UpdateQrCode,
        ActionKind::WalletsLoaded,
        ActionKind::SetWalletKeys,
        ActionKind::CreateWallet,
        ActionKind::UpdateWallets,
        ActionKind::DeleteWallet,
        ActionKind::DeleteWallets,
        ActionKind::SendTx,
        ActionKind::UpdateBlockchainHeight,
        ActionKind::UpdateMarket,
        ActionKind::UpdatePrices,
        ActionKind::UpdateMarketData,
        ActionKind::FormSubmitted,
        ActionKind::DisplayMessage,
        ActionKind::RedirectToReferrer,
        ActionKind::PaymentSent,
        ActionKind::AppUpdated,
        ActionKind::SetIntervals,
        ActionKind::SetAppData,
        ActionKind::BarcodeScanned,
        ActionKind::ClearApp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::SetToken => "SET_TOKEN",
            ActionKind::UserLoggedIn => "USER_LOGGED_IN",
            ActionKind::UserLoaded => "USER_LOADED",
            ActionKind::TwoFactorCheck => "2FA_CHECK",
            ActionKind::UpdateQrCode => "UPDATE_QR_CODE",
            ActionKind::WalletsLoaded => "WALLETS_LOADED",
            ActionKind::SetWalletKeys => "SET_WALLET_KEYS",
            ActionKind::CreateWallet => "CREATE_WALLET",
            ActionKind::UpdateWallets => "UPDATE_WALLETS",
            ActionKind::DeleteWallet => "DELETE_WALLET",
            ActionKind::DeleteWallets => "DELETE_WALLETS",
            ActionKind::SendTx => "SEND_TX",
            ActionKind::UpdateBlockchainHeight => "UPDATE_BLOCKCHAIN_HEIGHT",
            ActionKind::UpdateMarket => "UPDATE_MARKET",
            ActionKind::UpdatePrices => "UPDATE_PRICES",
            ActionKind::UpdateMarketData => "UPDATE_MARKET_DATA",
            ActionKind::FormSubmitted => "FORM_SUBMITTED",
            ActionKind::DisplayMessage => "DISPLAY_MESSAGE",
            ActionKind::RedirectToReferrer => "REDIRECT_TO_REFERRER",
            ActionKind::PaymentSent => "PAYMENT_SENT",
            ActionKind::AppUpdated => "APP_UPDATED",
            ActionKind::SetIntervals => "SET_INTERVALS",
            ActionKind::SetAppData => "SET_APP_DATA",
            ActionKind::BarcodeScanned => "BARCODE_SCANNED",
            ActionKind::ClearApp => "CLEAR_APP",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = ConcealError;

    fn from_str(s: &str) -> Result<Self> {
        ActionKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ConcealError::UnknownActionKind(s.to_string()))
    }
}

/// One recurring timer requested by `SET_INTERVALS`
#[derive(Debug, Clone)]
pub struct IntervalSpec {
    pub every: Duration,
    pub task: IntervalTask,
}

/// What an owned timer does when it fires
#[derive(Debug, Clone)]
pub enum IntervalTask {
    /// Dispatch this action into the store
    Dispatch(Box<Action>),
    /// Run an arbitrary callback, which dispatches on its own if it needs to
    Callback(IntervalFn),
}

/// Callback wrapper so interval tasks can be cloned and debug-printed
#[derive(Clone)]
pub struct IntervalFn(pub Tick);

impl std::fmt::Debug for IntervalFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("IntervalFn(..)")
    }
}

impl IntervalSpec {
    pub fn dispatch(every: Duration, action: Action) -> Self {
        Self {
            every,
            task: IntervalTask::Dispatch(Box::new(action)),
        }
    }

    pub fn callback<F>(every: Duration, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            every,
            task: IntervalTask::Callback(IntervalFn(Arc::new(callback))),
        }
    }
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::SetToken { .. } => ActionKind::SetToken,
            Action::UserLoggedIn => ActionKind::UserLoggedIn,
            Action::UserLoaded { .. } => ActionKind::UserLoaded,
            Action::TwoFactorCheck { .. } => ActionKind::TwoFactorCheck,
            Action::UpdateQrCode { .. } => ActionKind::UpdateQrCode,
            Action::FormSubmitted { .. } => ActionKind::FormSubmitted,
            Action::DisplayMessage { .. } => ActionKind::DisplayMessage,
            Action::RedirectToReferrer { .. } => ActionKind::RedirectToReferrer,
            Action::AppUpdated => ActionKind::AppUpdated,
            Action::BarcodeScanned => ActionKind::BarcodeScanned,
            Action::WalletsLoaded => ActionKind::WalletsLoaded,
            Action::SetWalletKeys { .. } => ActionKind::SetWalletKeys,
            Action::CreateWallet { .. } => ActionKind::CreateWallet,
            Action::UpdateWallets { .. } => ActionKind::UpdateWallets,
            Action::DeleteWallet { .. } => ActionKind::DeleteWallet,
            Action::DeleteWallets => ActionKind::DeleteWallets,
            Action::SendTx { .. } => ActionKind::SendTx,
            Action::PaymentSent => ActionKind::PaymentSent,
            Action::UpdateBlockchainHeight { .. } => ActionKind::UpdateBlockchainHeight,
            Action::UpdateMarket { .. } => ActionKind::UpdateMarket,
            Action::UpdatePrices { .. } => ActionKind::UpdatePrices,
            Action::UpdateMarketData { .. } => ActionKind::UpdateMarketData,
            Action::SetIntervals { .. } => ActionKind::SetIntervals,
            Action::SetAppData { .. } => ActionKind::SetAppData,
            Action::ClearApp => ActionKind::ClearApp,
        }
    }

    /// Decode a tagged JSON record
    ///
    /// Fails with `UnknownActionKind` for an unrecognized `type` and with
    /// `InvalidPayload` when a field the kind needs is missing or mistyped.
    /// Interval entries decode as `{"action": {...}, "time": seconds}` and
    /// re-dispatch the nested action.
    pub fn from_json(value: &Value) -> Result<Action> {
        let record = value
            .as_object()
            .ok_or_else(|| ConcealError::invalid_payload("action", "expected a JSON object"))?;
        let tag = record
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| ConcealError::invalid_payload("action", "missing string field `type`"))?;
        let kind: ActionKind = tag.parse()?;
        let payload = Payload { kind, record };

        let action = match kind {
            ActionKind::SetToken => Action::SetToken {
                token: payload.optional("token")?,
            },
            ActionKind::UserLoggedIn => Action::UserLoggedIn,
            ActionKind::UserLoaded => Action::UserLoaded {
                user: payload.required("user")?,
            },
            ActionKind::TwoFactorCheck => Action::TwoFactorCheck {
                value: payload.required("value")?,
            },
            ActionKind::UpdateQrCode => Action::UpdateQrCode {
                qr_code_url: payload.required("qrCodeUrl")?,
            },
            ActionKind::WalletsLoaded => Action::WalletsLoaded,
            ActionKind::SetWalletKeys => Action::SetWalletKeys {
                address: payload.required("address")?,
                keys: payload.required("keys")?,
            },
            ActionKind::CreateWallet => Action::CreateWallet {
                address: payload.required("address")?,
            },
            ActionKind::UpdateWallets => Action::UpdateWallets {
                wallets: payload.required("wallets")?,
            },
            ActionKind::DeleteWallet => Action::DeleteWallet {
                address: payload.required("address")?,
            },
            ActionKind::DeleteWallets => Action::DeleteWallets,
            ActionKind::SendTx => Action::SendTx {
                send_tx_response: payload.optional("sendTxResponse")?,
            },
            ActionKind::UpdateBlockchainHeight => Action::UpdateBlockchainHeight {
                blockchain_height: payload.required("blockchainHeight")?,
            },
            ActionKind::UpdateMarket => Action::UpdateMarket {
                market: payload.required("market")?,
                market_data: payload.required("marketData")?,
            },
            ActionKind::UpdatePrices => {
                let prices_data: Map<String, Value> = payload.required("pricesData")?;
                let conceal = prices_data.get("conceal").cloned().ok_or_else(|| {
                    ConcealError::invalid_payload(kind, "missing field `pricesData.conceal`")
                })?;
                let prices = serde_json::from_value(conceal).map_err(|e| {
                    ConcealError::invalid_payload(kind, format!("field `pricesData.conceal`: {}", e))
                })?;
                Action::UpdatePrices { prices }
            }
            ActionKind::UpdateMarketData => Action::UpdateMarketData {
                market_data: payload.required("marketData")?,
            },
            ActionKind::FormSubmitted => Action::FormSubmitted {
                value: payload.required("value")?,
            },
            ActionKind::DisplayMessage => Action::DisplayMessage {
                message: payload.message()?,
                id: payload.optional("id")?,
            },
            ActionKind::RedirectToReferrer => Action::RedirectToReferrer {
                value: payload.required("value")?,
            },
            ActionKind::PaymentSent => Action::PaymentSent,
            ActionKind::AppUpdated => Action::AppUpdated,
            ActionKind::SetIntervals => Action::SetIntervals {
                intervals: payload.intervals()?,
            },
            ActionKind::SetAppData => {
                let app_data: Map<String, Value> = payload.required("appData")?;
                Action::SetAppData {
                    app_data: Value::Object(app_data),
                }
            }
            ActionKind::BarcodeScanned => Action::BarcodeScanned,
            ActionKind::ClearApp => Action::ClearApp,
        };

        Ok(action)
    }
}

/// Field access on a decoded action record
struct Payload<'a> {
    kind: ActionKind,
    record: &'a Map<String, Value>,
}

impl Payload<'_> {
    fn required<T: DeserializeOwned>(&self, field: &str) -> Result<T> {
        let value = self.record.get(field).ok_or_else(|| {
            ConcealError::invalid_payload(self.kind, format!("missing field `{}`", field))
        })?;
        self.decode(field, value.clone())
    }

    fn optional<T: DeserializeOwned>(&self, field: &str) -> Result<Option<T>> {
        match self.record.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => self.decode(field, value.clone()).map(Some),
        }
    }

    fn decode<T: DeserializeOwned>(&self, field: &str, value: Value) -> Result<T> {
        serde_json::from_value(value).map_err(|e| {
            ConcealError::invalid_payload(self.kind, format!("field `{}`: {}", field, e))
        })
    }

    /// `message` is a list of lines; a bare string or null is accepted too
    fn message(&self) -> Result<Vec<String>> {
        match self.record.get("message") {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::String(line)) => Ok(vec![line.clone()]),
            Some(value) => self.decode("message", value.clone()),
        }
    }

    fn intervals(&self) -> Result<Vec<IntervalSpec>> {
        let entries: Vec<Map<String, Value>> = self.required("intervals")?;
        entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let seconds = entry.get("time").and_then(Value::as_f64).ok_or_else(|| {
                    ConcealError::invalid_payload(
                        self.kind,
                        format!("intervals[{}]: missing numeric field `time`", index),
                    )
                })?;
                if !seconds.is_finite() || seconds <= 0.0 {
                    return Err(ConcealError::invalid_payload(
                        self.kind,
                        format!("intervals[{}]: `time` must be a positive number of seconds", index),
                    ));
                }
                let nested = entry.get("action").ok_or_else(|| {
                    ConcealError::invalid_payload(
                        self.kind,
                        format!("intervals[{}]: missing field `action`", index),
                    )
                })?;
                let every = Duration::try_from_secs_f64(seconds).map_err(|e| {
                    ConcealError::invalid_payload(
                        self.kind,
                        format!("intervals[{}]: `time` {}", index, e),
                    )
                })?;
                let action = Action::from_json(nested)?;
                Ok(IntervalSpec::dispatch(every, action))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_every_kind_round_trips_through_its_tag() {
        for kind in ActionKind::ALL {
            assert_eq!(kind.as_str().parse::<ActionKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_kind() {
        let err = Action::from_json(&json!({"type": "LOGOUT"})).unwrap_err();
        assert!(matches!(err, ConcealError::UnknownActionKind(tag) if tag == "LOGOUT"));
    }

    #[test]
    fn test_missing_type() {
        let err = Action::from_json(&json!({"address": "ccx7"})).unwrap_err();
        assert!(matches!(err, ConcealError::InvalidPayload { .. }));
    }

    #[test]
    fn test_two_factor_tag_starts_with_digit() {
        let action = Action::from_json(&json!({"type": "2FA_CHECK", "value": true})).unwrap();
        assert!(matches!(action, Action::TwoFactorCheck { value: true }));
    }

    #[test]
    fn test_missing_required_field() {
        let err = Action::from_json(&json!({"type": "CREATE_WALLET"})).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid payload for CREATE_WALLET: missing field `address`"
        );
    }

    #[test]
    fn test_mistyped_field() {
        let err = Action::from_json(&json!({
            "type": "UPDATE_BLOCKCHAIN_HEIGHT",
            "blockchainHeight": "tall"
        }))
        .unwrap_err();
        assert!(err.to_string().contains("blockchainHeight"));
    }

    #[test]
    fn test_update_prices_requires_conceal() {
        let err = Action::from_json(&json!({
            "type": "UPDATE_PRICES",
            "pricesData": {"bitcoin": {"usd": 60000}}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("pricesData.conceal"));

        let action = Action::from_json(&json!({
            "type": "UPDATE_PRICES",
            "pricesData": {"conceal": {"usd": 0.05, "btc": 0.0000008}}
        }))
        .unwrap();
        match action {
            Action::UpdatePrices { prices } => assert_eq!(prices["usd"], 0.05),
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn test_display_message_shapes() {
        let action = Action::from_json(&json!({
            "type": "DISPLAY_MESSAGE",
            "message": ["Password too short", "Passwords do not match"],
            "id": "password"
        }))
        .unwrap();
        match action {
            Action::DisplayMessage { message, id } => {
                assert_eq!(message.len(), 2);
                assert_eq!(id.as_deref(), Some("password"));
            }
            other => panic!("unexpected action {:?}", other),
        }

        let action =
            Action::from_json(&json!({"type": "DISPLAY_MESSAGE", "message": "oops"})).unwrap();
        assert!(matches!(action, Action::DisplayMessage { message, id: None } if message == vec!["oops"]));

        let action = Action::from_json(&json!({"type": "DISPLAY_MESSAGE"})).unwrap();
        assert!(matches!(action, Action::DisplayMessage { message, .. } if message.is_empty()));
    }

    #[test]
    fn test_set_intervals_decodes_nested_actions() {
        let action = Action::from_json(&json!({
            "type": "SET_INTERVALS",
            "intervals": [
                {"action": {"type": "APP_UPDATED"}, "time": 10},
                {"action": {"type": "BARCODE_SCANNED"}, "time": 0.5}
            ]
        }))
        .unwrap();

        match action {
            Action::SetIntervals { intervals } => {
                assert_eq!(intervals.len(), 2);
                assert_eq!(intervals[0].every, Duration::from_secs(10));
                assert_eq!(intervals[1].every, Duration::from_millis(500));
                assert!(matches!(
                    &intervals[0].task,
                    IntervalTask::Dispatch(action) if action.kind() == ActionKind::AppUpdated
                ));
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn test_set_intervals_rejects_bad_entries() {
        let zero = Action::from_json(&json!({
            "type": "SET_INTERVALS",
            "intervals": [{"action": {"type": "APP_UPDATED"}, "time": 0}]
        }));
        assert!(zero.unwrap_err().to_string().contains("positive"));

        let nested_unknown = Action::from_json(&json!({
            "type": "SET_INTERVALS",
            "intervals": [{"action": {"type": "NOPE"}, "time": 5}]
        }));
        assert!(matches!(
            nested_unknown,
            Err(ConcealError::UnknownActionKind(_))
        ));
    }

    #[test]
    fn test_set_intervals_rejects_unrepresentable_time() {
        let huge = Action::from_json(&json!({
            "type": "SET_INTERVALS",
            "intervals": [{"action": {"type": "APP_UPDATED"}, "time": 1e300}]
        }));
        match huge {
            Err(ConcealError::InvalidPayload { kind, reason }) => {
                assert_eq!(kind, "SET_INTERVALS");
                assert!(reason.starts_with("intervals[0]: `time`"));
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_set_app_data_must_be_object() {
        let err = Action::from_json(&json!({"type": "SET_APP_DATA", "appData": [1, 2]})).unwrap_err();
        assert!(matches!(err, ConcealError::InvalidPayload { .. }));
    }

    #[test]
    fn test_user_loaded_partial() {
        let action = Action::from_json(&json!({
            "type": "USER_LOADED",
            "user": {"userName": "alice"}
        }))
        .unwrap();
        match action {
            Action::UserLoaded { user } => {
                assert_eq!(user.user_name.as_deref(), Some("alice"));
                assert!(user.logged_in.is_none());
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(Action::ClearApp.kind(), ActionKind::ClearApp);
        assert_eq!(
            Action::CreateWallet { address: "a".into() }.kind().to_string(),
            "CREATE_WALLET"
        );
    }
}
