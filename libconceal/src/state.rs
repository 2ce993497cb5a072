//! Application state document
//!
//! Immutable state tree following functional programming principles.
//! All state transitions happen through the reducer (see `reducer.rs`).
//!
//! Every region sits behind an `Arc`. A transition clones the document
//! (cheap reference bumps) and copies only the regions it writes to, so
//! regions an action does not touch stay pointer-equal to the previous
//! document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use zeroize::Zeroize;

use crate::config::{AppSettings, Config, UserSettings};
use crate::timers::IntervalHandle;

/// Root application state
///
/// This is the single source of truth for the wallet UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    /// Static configuration constants
    pub app_settings: Arc<AppSettings>,

    /// Timers currently owned by the store
    pub intervals: Arc<Vec<IntervalHandle>>,

    /// Next id handed out for an owned timer
    #[serde(skip)]
    pub next_interval_id: u64,

    pub layout: Arc<Layout>,
    pub markets: Arc<BTreeMap<String, Market>>,

    /// Catch-all market payloads, independent of `markets`
    pub market_data: Arc<Map<String, Value>>,

    pub network: Arc<Network>,

    /// Price per currency code
    pub prices: Arc<BTreeMap<String, f64>>,

    pub user: Arc<User>,
    pub user_settings: Arc<UserSettings>,

    /// Wallets keyed by address
    pub wallets: Arc<BTreeMap<String, Wallet>>,

    /// Per-screen scratch state, always a JSON object
    pub app_data: Arc<Value>,
}

/// UI flags and values not tied to domain data
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    pub app_loaded: bool,
    pub edit_contact_data: Map<String, Value>,
    pub form_submitted: bool,
    pub last_update: DateTime<Utc>,
    pub message: LayoutMessage,
    pub qr_code_url: String,
    pub redirect_to_referrer: bool,
    pub send_tx_response: Option<Value>,
    pub user_loaded: bool,
    pub wallets_loaded: bool,
}

/// Message shown by the current form, optionally addressed to one field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LayoutMessage {
    pub id: Option<String>,
    pub lines: Vec<String>,
}

impl LayoutMessage {
    pub fn is_empty(&self) -> bool {
        self.text().is_empty()
    }

    /// Lines joined the way they are shown in a notification
    pub fn text(&self) -> String {
        self.lines.join(",")
    }
}

/// Ticker data for one market source
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Market {
    #[serde(rename = "apiURL")]
    pub api_url: String,
    pub ask: f64,
    pub bid: f64,
    pub volume: f64,
    /// Remaining ticker fields as reported by the source
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Market {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ask: 0.0,
            bid: 0.0,
            volume: 0.0,
            extra: Map::new(),
        }
    }

    /// The `result` field the source reported, if any
    pub fn result(&self) -> Option<&str> {
        self.extra.get("result").and_then(Value::as_str)
    }

    /// Return a copy with the fields of `patch` applied
    ///
    /// `ask`, `bid` and `volume` accept numbers or numeric strings; an
    /// `apiURL` string replaces the endpoint; anything else lands in `extra`.
    pub fn merged(&self, patch: &Map<String, Value>) -> Result<Market, String> {
        let mut market = self.clone();
        for (key, value) in patch {
            match key.as_str() {
                "ask" => market.ask = quote(key, value)?,
                "bid" => market.bid = quote(key, value)?,
                "volume" => market.volume = quote(key, value)?,
                "apiURL" => match value.as_str() {
                    Some(url) => market.api_url = url.to_string(),
                    None => return Err("field `apiURL` must be a string".to_string()),
                },
                _ => {
                    market.extra.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(market)
    }
}

fn quote(field: &str, value: &Value) -> Result<f64, String> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| format!("field `{}` is out of range", field)),
        Value::String(s) if s.trim().is_empty() => Ok(0.0),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("field `{}` is not numeric: {:?}", field, s)),
        Value::Null => Ok(0.0),
        other => Err(format!("field `{}` is not numeric: {}", field, other)),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    pub blockchain_height: u64,
}

/// Session identity
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub address_book: Vec<Value>,
    pub logged_in: bool,
    pub user_name: String,
    pub password: Secret,
    pub token: Option<Secret>,
    /// Profile fields the wallet does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Partial user record delivered by `USER_LOADED`
///
/// Absent fields are left alone. `"token": null` clears the token, and
/// fields without a typed slot are merged into `User::extra`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserPatch {
    pub address_book: Option<Vec<Value>>,
    pub logged_in: Option<bool>,
    pub user_name: Option<String>,
    pub password: Option<Secret>,
    #[serde(deserialize_with = "present")]
    pub token: Option<Option<Secret>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Wraps any value that is present, `null` included, in `Some`
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl User {
    pub fn merged(&self, patch: &UserPatch) -> User {
        let mut user = self.clone();
        if let Some(address_book) = &patch.address_book {
            user.address_book = address_book.clone();
        }
        if let Some(logged_in) = patch.logged_in {
            user.logged_in = logged_in;
        }
        if let Some(user_name) = &patch.user_name {
            user.user_name = user_name.clone();
        }
        if let Some(password) = &patch.password {
            user.password = password.clone();
        }
        if let Some(token) = &patch.token {
            user.token = token.clone();
        }
        for (key, value) in &patch.extra {
            user.extra.insert(key.clone(), value.clone());
        }
        user
    }
}

/// A wallet record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Wallet {
    pub balance: f64,
    pub locked: f64,
    pub total: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<WalletKeys>,
    /// Further fields reported by the wallet API
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

/// Private key material of a wallet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WalletKeys {
    pub spend_key: Secret,
    pub view_key: Secret,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Sensitive string, zeroed on drop and never printed
///
/// Serializes as a redacted placeholder so snapshots can be logged or
/// dumped without leaking credentials.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret([REDACTED])")
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0.is_empty() {
            serializer.serialize_str("")
        } else {
            serializer.serialize_str("[REDACTED]")
        }
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Session phase derived from the load flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    LoggedOut,
    LoggedIn {
        user_loaded: bool,
        wallets_loaded: bool,
    },
}

fn default_app_data() -> Value {
    json!({
        "sendScreen": {
            "addrListVisible": false,
            "sendConfirmVisible": false,
            "securePasswordEntry": true
        },
        "scanCode": {
            "hasCameraPermission": null,
            "scanned": false
        },
        "addressEntry": {
            "label": null,
            "address": null,
            "paymentId": null,
            "entryId": null,
            "headerText": null
        },
        "login": {
            "userName": ""
        },
        "createDeposit": {
            "amount": "",
            "duration": null,
            "durationText": ""
        }
    })
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(&Config::default_config())
    }
}

impl AppState {
    /// Build the initial document from configuration
    pub fn new(config: &Config) -> Self {
        Self::with_time(config, Utc::now())
    }

    /// Build the initial document with an explicit `lastUpdate`
    pub fn with_time(config: &Config, now: DateTime<Utc>) -> Self {
        let markets = config
            .markets
            .iter()
            .map(|(id, market)| (id.clone(), Market::new(market.api_url.clone())))
            .collect();

        let mut prices = BTreeMap::new();
        prices.insert("usd".to_string(), 0.0);
        prices.insert("btc".to_string(), 0.0);

        Self {
            app_settings: Arc::new(config.app.clone()),
            intervals: Arc::new(Vec::new()),
            next_interval_id: 1,
            layout: Arc::new(Layout {
                app_loaded: false,
                edit_contact_data: Map::new(),
                form_submitted: false,
                last_update: now,
                message: LayoutMessage::default(),
                qr_code_url: String::new(),
                redirect_to_referrer: false,
                send_tx_response: None,
                user_loaded: false,
                wallets_loaded: false,
            }),
            markets: Arc::new(markets),
            market_data: Arc::new(Map::new()),
            network: Arc::new(Network::default()),
            prices: Arc::new(prices),
            user: Arc::new(User::default()),
            user_settings: Arc::new(config.user_settings.clone()),
            wallets: Arc::new(BTreeMap::new()),
            app_data: Arc::new(default_app_data()),
        }
    }

    pub fn wallet(&self, address: &str) -> Option<&Wallet> {
        self.wallets.get(address)
    }

    pub fn session(&self) -> SessionPhase {
        if self.user.logged_in {
            SessionPhase::LoggedIn {
                user_loaded: self.layout.user_loaded,
                wallets_loaded: self.layout.wallets_loaded,
            }
        } else {
            SessionPhase::LoggedOut
        }
    }

    /// Sum of all wallet balances
    pub fn total_balance(&self) -> f64 {
        self.wallets.values().map(|wallet| wallet.balance).sum()
    }

    pub fn owns_interval(&self, handle: IntervalHandle) -> bool {
        self.intervals.contains(&handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_document() {
        let state = AppState::default();

        assert!(state.intervals.is_empty());
        assert!(!state.layout.app_loaded);
        assert!(!state.layout.user_loaded);
        assert!(!state.layout.wallets_loaded);
        assert!(state.layout.message.is_empty());
        assert_eq!(state.markets.len(), 2);
        assert_eq!(state.markets["stex"].volume, 0.0);
        assert_eq!(state.prices["usd"], 0.0);
        assert_eq!(state.network.blockchain_height, 0);
        assert!(state.wallets.is_empty());
        assert_eq!(state.session(), SessionPhase::LoggedOut);
        assert_eq!(state.app_data["sendScreen"]["securePasswordEntry"], true);
    }

    #[test]
    fn test_market_merge_parses_string_quotes() {
        let market = Market::new("https://tradeogre.com/api/v1/ticker/BTC-CCX");
        let patch = json!({"ask": "0.00000151", "bid": 0.0000014, "success": true});
        let merged = market.merged(patch.as_object().unwrap()).unwrap();

        assert_eq!(merged.ask, 0.00000151);
        assert_eq!(merged.bid, 0.0000014);
        assert_eq!(merged.extra["success"], true);
        assert_eq!(market.ask, 0.0, "original market untouched");
    }

    #[test]
    fn test_market_merge_rejects_garbage_quote() {
        let market = Market::new("https://example.invalid");
        let patch = json!({"ask": "n/a"});
        let err = market.merged(patch.as_object().unwrap()).unwrap_err();
        assert!(err.contains("ask"));
    }

    #[test]
    fn test_user_merge_keeps_unset_fields() {
        let user = User {
            user_name: "alice".to_string(),
            logged_in: true,
            ..User::default()
        };
        let patch = UserPatch {
            token: Some(Some(Secret::new("jwt"))),
            ..UserPatch::default()
        };
        let merged = user.merged(&patch);

        assert_eq!(merged.user_name, "alice");
        assert!(merged.logged_in);
        assert_eq!(merged.token.as_ref().map(Secret::expose), Some("jwt"));
    }

    #[test]
    fn test_user_patch_null_token_clears_it() {
        let user = User {
            token: Some(Secret::new("jwt")),
            ..User::default()
        };

        let absent: UserPatch = serde_json::from_value(json!({"userName": "alice"})).unwrap();
        assert_eq!(absent.token, None);
        let kept = user.merged(&absent);
        assert_eq!(kept.token.as_ref().map(Secret::expose), Some("jwt"));

        let null: UserPatch = serde_json::from_value(json!({"token": null})).unwrap();
        assert_eq!(null.token, Some(None));
        assert!(user.merged(&null).token.is_none());
    }

    #[test]
    fn test_user_patch_keeps_unknown_fields() {
        let patch: UserPatch = serde_json::from_value(json!({
            "userName": "alice",
            "email": "alice@example.com",
            "twoFAEnabled": true
        }))
        .unwrap();
        assert_eq!(patch.user_name.as_deref(), Some("alice"));
        assert_eq!(patch.extra["email"], "alice@example.com");
        assert!(!patch.extra.contains_key("userName"));

        let user = User::default().merged(&patch);
        assert_eq!(user.extra["twoFAEnabled"], true);

        let rendered = serde_json::to_value(&user).unwrap();
        assert_eq!(rendered["email"], "alice@example.com");
        assert_eq!(rendered["userName"], "alice");
    }

    #[test]
    fn test_secret_never_printed() {
        let secret = Secret::new("hunter22");
        assert_eq!(format!("{:?}", secret), "Secret([REDACTED])");
        assert_eq!(serde_json::to_value(&secret).unwrap(), "[REDACTED]");
        assert_eq!(serde_json::to_value(Secret::default()).unwrap(), "");
    }

    #[test]
    fn test_wallet_deserializes_extra_fields() {
        let wallet: Wallet = serde_json::from_value(json!({
            "balance": 12.5,
            "addr": "ccx7abc",
            "transactions": []
        }))
        .unwrap();

        assert_eq!(wallet.balance, 12.5);
        assert_eq!(wallet.locked, 0.0);
        assert!(wallet.keys.is_none());
        assert_eq!(wallet.metadata["addr"], "ccx7abc");
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let json = serde_json::to_value(AppState::default()).unwrap();
        assert_eq!(json["layout"]["userLoaded"], false);
        assert_eq!(json["network"]["blockchainHeight"], 0);
        assert!(json["markets"]["stex"]["apiURL"].is_string());
        assert!(json["appSettings"].is_object());
        assert!(json.get("nextIntervalId").is_none());
    }
}
