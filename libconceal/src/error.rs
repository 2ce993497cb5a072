//! Error types for the Conceal state store

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConcealError>;

#[derive(Error, Debug)]
pub enum ConcealError {
    #[error("Unknown action kind: {0}")]
    UnknownActionKind(String),

    #[error("Invalid payload for {kind}: {reason}")]
    InvalidPayload { kind: String, reason: String },

    #[error("Unknown market: {0}")]
    UnknownMarket(String),

    #[error("Timer error: {0}")]
    Timer(#[from] TimerError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ConcealError {
    /// Build an `InvalidPayload` error for the given action kind
    pub fn invalid_payload(kind: impl ToString, reason: impl Into<String>) -> Self {
        ConcealError::InvalidPayload {
            kind: kind.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            ConcealError::UnknownActionKind(_) => 3,
            ConcealError::InvalidPayload { .. } => 3,
            ConcealError::UnknownMarket(_) => 3,
            ConcealError::Config(_) => 2,
            ConcealError::Timer(_) => 1,
        }
    }

    /// True when the error was caused by the action itself rather than the store
    pub fn is_rejected_action(&self) -> bool {
        self.exit_code() == 3
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    #[error("no Tokio runtime is available to drive owned timers")]
    NoRuntime,

    #[error("timer period must be greater than zero")]
    ZeroPeriod,

    #[error("timer period {0:?} is too long to schedule")]
    PeriodTooLong(std::time::Duration),
}
