//! Risk arithmetic for paper trading
//!
//! Everything here is a pure function of a (trades, prices, balance, leverage)
//! snapshot. Nothing is rounded: display precision belongs to the caller.
//! Arithmetic saturates at the `Decimal` range instead of panicking; order
//! placement rejects sizes that would need it via [`checked_margin_required`].

use super::trade::{Trade, CONTRACT_SIZE};
use crate::error::{Result, TradingError};
use crate::market::PriceSnapshot;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Account figures derived from the live trade set
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountMetrics {
    pub balance: Decimal,
    pub equity: Decimal,
    pub margin_used: Decimal,
    pub free_margin: Decimal,
    /// Unrealized P&L across open positions
    pub total_pnl: Decimal,
}

/// P&L of a trade if it were closed at `price`
pub fn pnl_at(trade: &Trade, price: Decimal) -> Decimal {
    price
        .saturating_sub(trade.entry_price)
        .saturating_mul(trade.lots)
        .saturating_mul(CONTRACT_SIZE)
        .saturating_mul(trade.action.multiplier())
}

/// P&L at the current price, treating a missing quote as flat (entry price)
pub fn unrealized_pnl(trade: &Trade, current_price: Option<Decimal>) -> Decimal {
    pnl_at(trade, current_price.unwrap_or(trade.entry_price))
}

pub fn margin_required(lots: Decimal, price: Decimal, leverage: u32) -> Decimal {
    debug_assert!(leverage > 0, "leverage must be positive");
    lots.saturating_mul(CONTRACT_SIZE).saturating_mul(price) / Decimal::from(leverage.max(1))
}

/// Margin for a new order, or `None` when the notional leaves the `Decimal` range
pub fn checked_margin_required(lots: Decimal, price: Decimal, leverage: u32) -> Option<Decimal> {
    lots.checked_mul(CONTRACT_SIZE)?
        .checked_mul(price)?
        .checked_div(Decimal::from(leverage.max(1)))
}

/// Aggregate equity and margin over the open positions in `trades`
pub fn aggregate<'a, I>(trades: I, prices: &PriceSnapshot, balance: Decimal) -> AccountMetrics
where
    I: IntoIterator<Item = &'a Trade>,
{
    let (total_pnl, margin_used) = trades
        .into_iter()
        .filter(|t| t.is_open())
        .fold((Decimal::ZERO, Decimal::ZERO), |(pnl, margin), t| {
            (
                pnl.saturating_add(unrealized_pnl(t, prices.price(&t.symbol))),
                margin.saturating_add(t.margin().unwrap_or(Decimal::ZERO)),
            )
        });

    let equity = balance.saturating_add(total_pnl);

    AccountMetrics {
        balance,
        equity,
        margin_used,
        free_margin: equity.saturating_sub(margin_used),
        total_pnl,
    }
}

/// Reject a new position the account cannot cover
pub fn check_margin(metrics: &AccountMetrics, required: Decimal) -> Result<()> {
    if metrics.free_margin < required {
        return Err(TradingError::InsufficientMargin {
            required,
            free: metrics.free_margin,
        });
    }
    Ok(())
}
