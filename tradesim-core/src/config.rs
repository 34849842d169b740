//! Session configuration

use crate::error::{Result, ValidationError};
use crate::paper_trading::order_evaluator::FillPolicy;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Paper trading session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Interval between price ticks
    pub tick_interval: Duration,
    /// Full width of the per-tick price move (0.005 = ±0.25%)
    pub volatility: Decimal,
    /// Decimal places kept on generated prices
    pub price_precision: u32,
    /// Balance credited when an account is first opened
    pub initial_balance: Decimal,
    /// Leverage the runner puts on the account identity it builds
    pub leverage: u32,
    /// Charged per lot when a position closes; zero disables commissions
    pub commission_per_lot: Decimal,
    /// Fill price used when a pending order activates
    pub fill_policy: FillPolicy,
    /// Fixed RNG seed for a reproducible price stream
    pub price_seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(1500),
            volatility: Decimal::new(5, 3),
            price_precision: 4,
            initial_balance: Decimal::new(100_000, 0),
            leverage: 100,
            commission_per_lot: Decimal::ZERO,
            fill_policy: FillPolicy::TriggerPrice,
            price_seed: None,
        }
    }
}

impl SessionConfig {
    /// Load from `TRADESIM_*` environment variables, reading `.env` first if present.
    /// Unset or unparsable values keep their defaults.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let tick_interval = env::var("TRADESIM_TICK_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.tick_interval);

        let volatility = env::var("TRADESIM_VOLATILITY")
            .ok()
            .and_then(|v| Decimal::from_str(&v).ok())
            .unwrap_or(defaults.volatility);

        let price_precision = env::var("TRADESIM_PRICE_PRECISION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.price_precision);

        let initial_balance = env::var("TRADESIM_INITIAL_BALANCE")
            .ok()
            .and_then(|v| Decimal::from_str(&v).ok())
            .unwrap_or(defaults.initial_balance);

        let leverage = env::var("TRADESIM_LEVERAGE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.leverage);

        let commission_per_lot = env::var("TRADESIM_COMMISSION_PER_LOT")
            .ok()
            .and_then(|v| Decimal::from_str(&v).ok())
            .unwrap_or(defaults.commission_per_lot);

        let fill_policy = match env::var("TRADESIM_FILL_POLICY").ok().as_deref() {
            Some("tick") | Some("tick_price") => FillPolicy::TickPrice,
            Some("trigger") | Some("trigger_price") => FillPolicy::TriggerPrice,
            _ => defaults.fill_policy,
        };

        let price_seed = env::var("TRADESIM_PRICE_SEED")
            .ok()
            .and_then(|v| v.parse().ok());

        Self {
            tick_interval,
            volatility,
            price_precision,
            initial_balance,
            leverage,
            commission_per_lot,
            fill_policy,
            price_seed,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.leverage == 0 {
            return Err(ValidationError::InvalidLeverage.into());
        }
        if self.tick_interval.is_zero() {
            return Err(ValidationError::InvalidConfig("tick_interval must be non-zero").into());
        }
        if self.volatility.is_sign_negative() {
            return Err(ValidationError::InvalidConfig("volatility must not be negative").into());
        }
        if self.commission_per_lot.is_sign_negative() {
            return Err(
                ValidationError::InvalidConfig("commission_per_lot must not be negative").into(),
            );
        }
        Ok(())
    }
}
