//! Trading account and session identity

use super::trade::AccountId;
use crate::error::{Result, ValidationError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Persisted account state. Balance is the only stored aggregate; equity and
/// margin figures are derived from the trade set on every read.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Realized cash
    pub balance: Decimal,
    pub opened_at: DateTime<Utc>,
}

impl Account {
    pub fn new(id: AccountId, initial_balance: Decimal) -> Self {
        Self {
            id,
            balance: initial_balance,
            opened_at: Utc::now(),
        }
    }
}

/// Who is trading, as supplied by the auth provider
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountIdentity {
    pub account_id: AccountId,
    pub leverage: u32,
}

impl AccountIdentity {
    pub fn new(account_id: AccountId, leverage: u32) -> Result<Self> {
        if leverage == 0 {
            return Err(ValidationError::InvalidLeverage.into());
        }
        Ok(Self {
            account_id,
            leverage,
        })
    }
}
