//! Market data types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Trading symbol, e.g. `NASDAQ:AAPL`
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(pub String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn validate(&self) -> bool {
        !self.0.is_empty()
            && self
                .0
                .chars()
                .all(|c| c.is_alphanumeric() || matches!(c, ':' | '-' | '_' | '.'))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Symbol without its venue prefix (`NASDAQ:AAPL` -> `AAPL`)
    pub fn display_name(&self) -> &str {
        match self.0.split_once(':') {
            Some((_, name)) => name,
            None => &self.0,
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Trade direction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn multiplier(&self) -> Decimal {
        match self {
            Side::Buy => Decimal::ONE,
            Side::Sell => Decimal::NEGATIVE_ONE,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Immutable view of every tracked price at one tick
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub sequence: u64,
    pub taken_at: DateTime<Utc>,
    pub prices: HashMap<Symbol, Decimal>,
}

impl PriceSnapshot {
    pub fn new(sequence: u64, prices: HashMap<Symbol, Decimal>) -> Self {
        Self {
            sequence,
            taken_at: Utc::now(),
            prices,
        }
    }

    pub fn price(&self, symbol: &Symbol) -> Option<Decimal> {
        self.prices.get(symbol).copied()
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.prices.contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

impl<S: Into<Symbol>> FromIterator<(S, Decimal)> for PriceSnapshot {
    fn from_iter<I: IntoIterator<Item = (S, Decimal)>>(iter: I) -> Self {
        Self::new(0, iter.into_iter().map(|(s, p)| (s.into(), p)).collect())
    }
}
