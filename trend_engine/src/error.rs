//! error.rs: Engine error taxonomy
//!
//! Indicator, sizing and transition errors stay local to one cycle.
//! `Config` is the only variant that is fatal, and only at startup.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("insufficient data: have {have} candles, need {need}")]
    InsufficientData { have: usize, need: usize },

    #[error("insufficient balance: margin {required:.2} exceeds balance {available:.2}")]
    InsufficientBalance { required: f64, available: f64 },

    #[error("invalid sizing input: {0}")]
    InvalidSizing(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("exchange error: {0}")]
    Exchange(String),

    #[error("order rejected: {0}")]
    OrderRejected(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid lifecycle transition: {event} while {state}")]
    InvalidTransition { state: &'static str, event: &'static str },
}

impl EngineError {
    /// Stable name used in `error{kind}` log events.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InsufficientData { .. } => "insufficient_data",
            EngineError::InsufficientBalance { .. } => "insufficient_balance",
            EngineError::InvalidSizing(_) => "invalid_sizing",
            EngineError::Network(_) => "network_error",
            EngineError::Exchange(_) => "exchange_error",
            EngineError::OrderRejected(_) => "order_rejected",
            EngineError::Config(_) => "config_error",
            EngineError::InvalidTransition { .. } => "invalid_transition",
        }
    }

    /// Skip-this-cycle errors: never fatal, no exchange involvement.
    pub fn is_cycle_local(&self) -> bool {
        matches!(
            self,
            EngineError::InsufficientData { .. }
                | EngineError::InsufficientBalance { .. }
                | EngineError::InvalidSizing(_)
        )
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            EngineError::Exchange(format!("malformed response: {e}"))
        } else {
            EngineError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Exchange(format!("malformed response: {e}"))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
