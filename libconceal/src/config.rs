//! Configuration management for the Conceal state store
//!
//! The configuration seeds the initial state document: the static
//! application settings, the fixed set of market sources and the user's
//! session preferences.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};

/// Static application constants, exposed read-only in the state document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all(serialize = "camelCase"))]
pub struct AppSettings {
    #[serde(rename(serialize = "apiURL"))]
    pub api_url: String,
    #[serde(rename(serialize = "explorerURL"))]
    pub explorer_url: String,
    pub default_fee: f64,
    pub coin_decimals: u32,
    /// How long transient notifications stay on screen
    pub message_timeout_ms: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            api_url: "https://api.wallet.conceal.network/api/".to_string(),
            explorer_url: "https://explorer.conceal.network".to_string(),
            default_fee: 0.001,
            coin_decimals: 6,
            message_timeout_ms: 3500,
        }
    }
}

/// Security and session preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all(serialize = "camelCase"))]
pub struct UserSettings {
    pub minimum_password_length: u32,
    #[serde(rename(serialize = "qrCodeURL"))]
    pub qr_code_url: String,
    #[serde(rename(serialize = "twoFACode"))]
    pub two_fa_code: String,
    #[serde(rename(serialize = "twoFAEnabled"))]
    pub two_fa_enabled: bool,
    /// Seconds between wallet refreshes
    pub update_wallets_interval: u64,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            minimum_password_length: 8,
            qr_code_url: String::new(),
            two_fa_code: String::new(),
            two_fa_enabled: false,
            update_wallets_interval: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketConfig {
    pub api_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub app: AppSettings,
    pub markets: BTreeMap<String, MarketConfig>,
    pub user_settings: UserSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

impl Config {
    /// Load configuration from the default location
    ///
    /// `CONCEAL_CONFIG` must point at a readable file. Without it, a missing
    /// file in the user config directory means built-in defaults.
    pub fn load() -> Result<Self> {
        if std::env::var_os("CONCEAL_CONFIG").is_some() {
            let path = resolve_config_path()?;
            return Self::load_from_path(&path);
        }

        let path = resolve_config_path()?;
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default_config());
        }
        Self::load_from_path(&path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), markets = config.markets.len(), "loaded config");
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        let mut markets = BTreeMap::new();
        markets.insert(
            "stex".to_string(),
            MarketConfig {
                api_url: "https://api.wallet.conceal.network/api/stex/status".to_string(),
            },
        );
        markets.insert(
            "tradeogre".to_string(),
            MarketConfig {
                api_url: "https://tradeogre.com/api/v1/ticker/BTC-CCX".to_string(),
            },
        );

        Self {
            app: AppSettings::default(),
            markets,
            user_settings: UserSettings::default(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.app.api_url.trim().is_empty() {
            return Err(ConfigError::MissingField("app.api_url".to_string()).into());
        }
        for (id, market) in &self.markets {
            if market.api_url.trim().is_empty() {
                return Err(ConfigError::MissingField(format!("markets.{}.api_url", id)).into());
            }
        }
        Ok(())
    }
}

/// Resolve the configuration file path (XDG config directory by default)
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CONCEAL_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("conceal").join("config.toml"))
}
