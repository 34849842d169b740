//! Trading error types

use crate::market::Symbol;
use crate::paper_trading::trade::{TradeId, TradeStatus};
use rust_decimal::Decimal;
use thiserror::Error;

/// Malformed order or modification request
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Lots {lots} below minimum {min}")]
    LotsBelowMinimum { lots: Decimal, min: Decimal },

    #[error("Lots {lots} above maximum {max}")]
    LotsAboveMaximum { lots: Decimal, max: Decimal },

    #[error("Order size out of range at price {price}")]
    NotionalOverflow { price: Decimal },

    #[error("Entry price is required for {0} orders")]
    MissingEntryPrice(String),

    #[error("{field} must be positive, got {value}")]
    NonPositivePrice { field: &'static str, value: Decimal },

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(Symbol),

    #[error("Invalid symbol: {0:?}")]
    InvalidSymbol(String),

    #[error("Leverage must be at least 1")]
    InvalidLeverage,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

#[derive(Error, Debug)]
pub enum TradingError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Insufficient margin: required {required}, free {free}")]
    InsufficientMargin { required: Decimal, free: Decimal },

    #[error("Trade {trade_id} is {actual}, expected {expected}")]
    ConcurrencyConflict {
        trade_id: TradeId,
        expected: TradeStatus,
        actual: TradeStatus,
    },

    #[error("Trade {trade_id} changed concurrently: version {actual}, expected {expected}")]
    VersionConflict {
        trade_id: TradeId,
        expected: u64,
        actual: u64,
    },

    #[error("No live price for {0}")]
    StaleQuote(Symbol),

    #[error("Trade not found: {0}")]
    TradeNotFound(TradeId),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Session already running")]
    AlreadyRunning,

    #[error("Storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Request refused; caller must change it before retrying
    Rejected,
    /// Lost a compare-and-transition race
    Conflict,
    /// Degraded input, evaluation continues
    Soft,
    Fatal,
}

impl TradingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::InsufficientMargin { .. } => ErrorKind::Rejected,
            Self::ConcurrencyConflict { .. } | Self::VersionConflict { .. } => ErrorKind::Conflict,
            Self::StaleQuote(_) => ErrorKind::Soft,
            Self::TradeNotFound(_) | Self::AccountNotFound(_) => ErrorKind::Rejected,
            Self::AlreadyRunning | Self::Storage(_) => ErrorKind::Fatal,
        }
    }

    /// Whether the tick loop may skip this error and carry on
    pub fn is_recoverable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Conflict | ErrorKind::Soft)
    }

    /// Whether a direct user action should surface this error
    pub fn is_user_visible(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Soft)
    }
}

pub type Result<T> = std::result::Result<T, TradingError>;
