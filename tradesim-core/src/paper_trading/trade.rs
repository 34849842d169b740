//! Trade records and their lifecycle

use super::risk_engine;
use crate::error::{Result, TradingError, ValidationError};
use crate::market::{Side, Symbol};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Units of the underlying per lot
pub const CONTRACT_SIZE: Decimal = Decimal::ONE_HUNDRED;

/// Smallest tradable quantity (0.01 lots)
pub const MIN_LOTS: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Largest quantity accepted on a single order
pub const MAX_LOTS: Decimal = Decimal::from_parts(100_000, 0, 0, false, 0);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TradeId(pub String);

impl TradeId {
    pub fn generate() -> Self {
        Self(format!(
            "TRD_{}_{}",
            Utc::now().timestamp_millis(),
            nanoid::nanoid!(8)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TradeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Market,
    Limit,
    Stop,
}

impl OrderType {
    /// Whether the order waits for a trigger price
    pub fn is_pending(&self) -> bool {
        !matches!(self, OrderType::Market)
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Market => write!(f, "MARKET"),
            OrderType::Limit => write!(f, "LIMIT"),
            OrderType::Stop => write!(f, "STOP"),
        }
    }
}

/// Lifecycle status. Ordering follows the only legal direction of travel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    Pending,
    Open,
    Closed,
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeStatus::Pending => write!(f, "PENDING"),
            TradeStatus::Open => write!(f, "OPEN"),
            TradeStatus::Closed => write!(f, "CLOSED"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    Manual,
    StopLoss,
    TakeProfit,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Manual => write!(f, "manual"),
            CloseReason::StopLoss => write!(f, "stop_loss"),
            CloseReason::TakeProfit => write!(f, "take_profit"),
        }
    }
}

/// Realized outcome of a position, fixed at close
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub margin: Decimal,
    pub opened_at: DateTime<Utc>,
    pub closing_price: Decimal,
    /// Gross result; `commission` is charged on top
    pub pnl: Decimal,
    #[serde(default)]
    pub commission: Decimal,
    pub reason: CloseReason,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "UPPERCASE")]
pub enum TradeState {
    Pending,
    Open {
        margin: Decimal,
        opened_at: DateTime<Utc>,
    },
    /// `settlement` is `None` for a cancelled pending order
    Closed {
        closed_at: DateTime<Utc>,
        settlement: Option<Settlement>,
    },
}

/// User-set exit thresholds
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Protection {
    pub take_profit: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
}

impl Protection {
    pub fn new(take_profit: Option<Decimal>, stop_loss: Option<Decimal>) -> Self {
        Self {
            take_profit,
            stop_loss,
        }
    }

    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        for (field, value) in [("take_profit", self.take_profit), ("stop_loss", self.stop_loss)] {
            if let Some(value) = value {
                if value <= Decimal::ZERO {
                    return Err(ValidationError::NonPositivePrice { field, value });
                }
            }
        }
        Ok(())
    }
}

/// Partial update of the mutable user fields. `Some(None)` clears a threshold.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TradePatch {
    pub take_profit: Option<Option<Decimal>>,
    pub stop_loss: Option<Option<Decimal>>,
}

impl From<Protection> for TradePatch {
    fn from(p: Protection) -> Self {
        Self {
            take_profit: Some(p.take_profit),
            stop_loss: Some(p.stop_loss),
        }
    }
}

/// Order submission from the presentation layer
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub action: Side,
    pub order_type: OrderType,
    pub lots: Decimal,
    /// Trigger price; required for limit and stop orders, ignored for market orders
    pub entry_price: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
}

impl OrderRequest {
    pub fn market(symbol: Symbol, action: Side, lots: Decimal) -> Self {
        Self::new(symbol, action, OrderType::Market, lots, None)
    }

    pub fn limit(symbol: Symbol, action: Side, lots: Decimal, price: Decimal) -> Self {
        Self::new(symbol, action, OrderType::Limit, lots, Some(price))
    }

    pub fn stop(symbol: Symbol, action: Side, lots: Decimal, price: Decimal) -> Self {
        Self::new(symbol, action, OrderType::Stop, lots, Some(price))
    }

    fn new(
        symbol: Symbol,
        action: Side,
        order_type: OrderType,
        lots: Decimal,
        entry_price: Option<Decimal>,
    ) -> Self {
        Self {
            symbol,
            action,
            order_type,
            lots,
            entry_price,
            take_profit: None,
            stop_loss: None,
        }
    }

    pub fn with_take_profit(mut self, price: Decimal) -> Self {
        self.take_profit = Some(price);
        self
    }

    pub fn with_stop_loss(mut self, price: Decimal) -> Self {
        self.stop_loss = Some(price);
        self
    }

    pub fn protection(&self) -> Protection {
        Protection::new(self.take_profit, self.stop_loss)
    }

    /// Checks that do not depend on market state
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if !self.symbol.validate() {
            return Err(ValidationError::InvalidSymbol(self.symbol.0.clone()));
        }
        if self.lots < MIN_LOTS {
            return Err(ValidationError::LotsBelowMinimum {
                lots: self.lots,
                min: MIN_LOTS,
            });
        }
        if self.lots > MAX_LOTS {
            return Err(ValidationError::LotsAboveMaximum {
                lots: self.lots,
                max: MAX_LOTS,
            });
        }
        if self.order_type.is_pending() {
            match self.entry_price {
                None => return Err(ValidationError::MissingEntryPrice(self.order_type.to_string())),
                Some(price) if price <= Decimal::ZERO => {
                    return Err(ValidationError::NonPositivePrice {
                        field: "entry_price",
                        value: price,
                    })
                }
                Some(_) => {}
            }
        }
        self.protection().validate()
    }
}

/// A trade record: pending order, open position or closed history entry
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub account_id: AccountId,
    pub symbol: Symbol,
    pub action: Side,
    pub order_type: OrderType,
    pub lots: Decimal,
    /// Market orders: fill price. Pending orders: trigger price until activation.
    pub entry_price: Decimal,
    pub take_profit: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    /// Optimistic concurrency token, bumped by the store on every write
    pub version: u64,
    pub state: TradeState,
}

impl Trade {
    /// Pending order waiting for `entry_price`
    pub fn pending(account_id: AccountId, request: &OrderRequest, entry_price: Decimal) -> Self {
        Self::with_state(account_id, request, entry_price, TradeState::Pending)
    }

    /// Position filled immediately at `entry_price`
    pub fn open(
        account_id: AccountId,
        request: &OrderRequest,
        entry_price: Decimal,
        leverage: u32,
    ) -> Self {
        let margin = risk_engine::margin_required(request.lots, entry_price, leverage);
        Self::with_state(
            account_id,
            request,
            entry_price,
            TradeState::Open {
                margin,
                opened_at: Utc::now(),
            },
        )
    }

    fn with_state(
        account_id: AccountId,
        request: &OrderRequest,
        entry_price: Decimal,
        state: TradeState,
    ) -> Self {
        Self {
            id: TradeId::generate(),
            account_id,
            symbol: request.symbol.clone(),
            action: request.action,
            order_type: request.order_type,
            lots: request.lots,
            entry_price,
            take_profit: request.take_profit,
            stop_loss: request.stop_loss,
            created_at: Utc::now(),
            version: 0,
            state,
        }
    }

    pub fn status(&self) -> TradeStatus {
        match self.state {
            TradeState::Pending => TradeStatus::Pending,
            TradeState::Open { .. } => TradeStatus::Open,
            TradeState::Closed { .. } => TradeStatus::Closed,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status() == TradeStatus::Pending
    }

    pub fn is_open(&self) -> bool {
        self.status() == TradeStatus::Open
    }

    pub fn is_closed(&self) -> bool {
        self.status() == TradeStatus::Closed
    }

    pub fn shares(&self) -> Decimal {
        self.lots * CONTRACT_SIZE
    }

    /// Margin reserved while open, or the margin that was released at close
    pub fn margin(&self) -> Option<Decimal> {
        match &self.state {
            TradeState::Pending => None,
            TradeState::Open { margin, .. } => Some(*margin),
            TradeState::Closed { settlement, .. } => settlement.as_ref().map(|s| s.margin),
        }
    }

    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            TradeState::Pending => None,
            TradeState::Open { opened_at, .. } => Some(*opened_at),
            TradeState::Closed { settlement, .. } => settlement.as_ref().map(|s| s.opened_at),
        }
    }

    pub fn settlement(&self) -> Option<&Settlement> {
        match &self.state {
            TradeState::Closed { settlement, .. } => settlement.as_ref(),
            _ => None,
        }
    }

    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            TradeState::Closed { closed_at, .. } => Some(*closed_at),
            _ => None,
        }
    }

    pub fn pnl(&self) -> Option<Decimal> {
        self.settlement().map(|s| s.pnl)
    }

    pub fn closing_price(&self) -> Option<Decimal> {
        self.settlement().map(|s| s.closing_price)
    }

    pub fn commission(&self) -> Option<Decimal> {
        self.settlement().map(|s| s.commission)
    }

    /// Realized result after commission
    pub fn net_pnl(&self) -> Option<Decimal> {
        self.settlement().map(|s| s.pnl - s.commission)
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.settlement().map(|s| s.reason)
    }

    pub fn protection(&self) -> Protection {
        Protection::new(self.take_profit, self.stop_loss)
    }

    /// Pending order trigger: buys fire at or above the entry price, sells at or below
    pub fn activation_triggered(&self, price: Decimal) -> bool {
        match self.action {
            Side::Buy => price >= self.entry_price,
            Side::Sell => price <= self.entry_price,
        }
    }

    pub fn stop_loss_hit(&self, price: Decimal) -> bool {
        match (self.stop_loss, self.action) {
            (Some(sl), Side::Buy) => price <= sl,
            (Some(sl), Side::Sell) => price >= sl,
            (None, _) => false,
        }
    }

    pub fn take_profit_hit(&self, price: Decimal) -> bool {
        match (self.take_profit, self.action) {
            (Some(tp), Side::Buy) => price >= tp,
            (Some(tp), Side::Sell) => price <= tp,
            (None, _) => false,
        }
    }

    fn expect_status(&self, expected: TradeStatus) -> Result<()> {
        let actual = self.status();
        if actual != expected {
            return Err(TradingError::ConcurrencyConflict {
                trade_id: self.id.clone(),
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// PENDING -> OPEN at `fill_price`, reserving margin
    pub fn activate(&mut self, fill_price: Decimal, leverage: u32, at: DateTime<Utc>) -> Result<()> {
        self.expect_status(TradeStatus::Pending)?;
        self.entry_price = fill_price;
        self.state = TradeState::Open {
            margin: risk_engine::margin_required(self.lots, fill_price, leverage),
            opened_at: at,
        };
        Ok(())
    }

    /// OPEN -> CLOSED with a realized result. Returns the released margin.
    pub fn settle(
        &mut self,
        closing_price: Decimal,
        pnl: Decimal,
        reason: CloseReason,
        at: DateTime<Utc>,
    ) -> Result<Decimal> {
        self.settle_with_commission(closing_price, pnl, Decimal::ZERO, reason, at)
    }

    pub fn settle_with_commission(
        &mut self,
        closing_price: Decimal,
        pnl: Decimal,
        commission: Decimal,
        reason: CloseReason,
        at: DateTime<Utc>,
    ) -> Result<Decimal> {
        let (margin, opened_at) = match &self.state {
            TradeState::Open { margin, opened_at } => (*margin, *opened_at),
            _ => {
                return Err(TradingError::ConcurrencyConflict {
                    trade_id: self.id.clone(),
                    expected: TradeStatus::Open,
                    actual: self.status(),
                })
            }
        };

        self.state = TradeState::Closed {
            closed_at: at,
            settlement: Some(Settlement {
                margin,
                opened_at,
                closing_price,
                pnl,
                commission,
                reason,
            }),
        };
        Ok(margin)
    }

    /// PENDING -> CLOSED without any realized result
    pub fn cancel(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.expect_status(TradeStatus::Pending)?;
        self.state = TradeState::Closed {
            closed_at: at,
            settlement: None,
        };
        Ok(())
    }

    pub fn apply_patch(&mut self, patch: &TradePatch) -> Result<()> {
        if self.is_closed() {
            return Err(TradingError::ConcurrencyConflict {
                trade_id: self.id.clone(),
                expected: TradeStatus::Open,
                actual: TradeStatus::Closed,
            });
        }
        if let Some(tp) = patch.take_profit {
            self.take_profit = tp;
        }
        if let Some(sl) = patch.stop_loss {
            self.stop_loss = sl;
        }
        Ok(())
    }
}
