//! Per-tick order evaluation
//!
//! `evaluate` is a pure decision over one price snapshot; `apply` hands the
//! decisions to the ledger one trade at a time.

use super::ledger::PositionLedger;
use super::risk_engine;
use super::trade::{CloseReason, Trade, TradeId, TradeStatus};
use crate::error::TradingError;
use crate::market::PriceSnapshot;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Price a limit or stop order fills at once triggered
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillPolicy {
    /// The trigger price stored on the order
    #[default]
    TriggerPrice,
    /// The tick price that caused activation
    TickPrice,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Transition {
    Activate {
        trade_id: TradeId,
        fill_price: Decimal,
    },
    Close {
        trade_id: TradeId,
        closing_price: Decimal,
        pnl: Decimal,
        reason: CloseReason,
    },
}

impl Transition {
    pub fn trade_id(&self) -> &TradeId {
        match self {
            Transition::Activate { trade_id, .. } | Transition::Close { trade_id, .. } => trade_id,
        }
    }
}

/// Outcome of applying one tick's transitions
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub activated: usize,
    pub closed: usize,
    /// Transitions dropped because the ledger refused them
    pub skipped: usize,
}

impl TickReport {
    pub fn is_empty(&self) -> bool {
        self.activated == 0 && self.closed == 0 && self.skipped == 0
    }
}

#[derive(Clone, Debug, Default)]
pub struct OrderEvaluator {
    fill_policy: FillPolicy,
}

impl OrderEvaluator {
    pub fn new(fill_policy: FillPolicy) -> Self {
        Self { fill_policy }
    }

    pub fn fill_policy(&self) -> FillPolicy {
        self.fill_policy
    }

    /// Decide which trades must transition at these prices.
    ///
    /// Trades without a quote are left alone for this tick. Stop-loss wins
    /// when both exits are hit by the same price.
    pub fn evaluate(&self, trades: &[Trade], prices: &PriceSnapshot) -> Vec<Transition> {
        trades
            .iter()
            .filter(|t| !t.is_closed())
            .filter_map(|trade| {
                let Some(price) = prices.price(&trade.symbol) else {
                    tracing::debug!(
                        trade_id = %trade.id,
                        error = %TradingError::StaleQuote(trade.symbol.clone()),
                        "Skipping trade this tick"
                    );
                    return None;
                };
                self.decide(trade, price)
            })
            .collect()
    }

    fn decide(&self, trade: &Trade, price: Decimal) -> Option<Transition> {
        match trade.status() {
            TradeStatus::Pending if trade.activation_triggered(price) => {
                let fill_price = match self.fill_policy {
                    FillPolicy::TriggerPrice => trade.entry_price,
                    FillPolicy::TickPrice => price,
                };
                Some(Transition::Activate {
                    trade_id: trade.id.clone(),
                    fill_price,
                })
            }
            TradeStatus::Open => {
                let reason = if trade.stop_loss_hit(price) {
                    CloseReason::StopLoss
                } else if trade.take_profit_hit(price) {
                    CloseReason::TakeProfit
                } else {
                    return None;
                };
                Some(Transition::Close {
                    trade_id: trade.id.clone(),
                    closing_price: price,
                    pnl: risk_engine::pnl_at(trade, price),
                    reason,
                })
            }
            _ => None,
        }
    }

    /// Apply each transition as its own ledger transaction. A refused
    /// transition is logged and counted; the rest still run.
    pub async fn apply(&self, ledger: &PositionLedger, transitions: Vec<Transition>) -> TickReport {
        let mut report = TickReport::default();

        for transition in transitions {
            let result = match &transition {
                Transition::Activate {
                    trade_id,
                    fill_price,
                } => ledger.activate(trade_id, *fill_price).await.map(|_| {
                    report.activated += 1;
                }),
                Transition::Close {
                    trade_id,
                    closing_price,
                    pnl,
                    reason,
                } => ledger
                    .close(trade_id, *closing_price, *pnl, *reason)
                    .await
                    .map(|_| {
                        report.closed += 1;
                    }),
            };

            if let Err(e) = result {
                report.skipped += 1;
                tracing::warn!(
                    trade_id = %transition.trade_id(),
                    error = %e,
                    recoverable = e.is_recoverable(),
                    "Transition skipped"
                );
            }
        }

        report
    }
}
