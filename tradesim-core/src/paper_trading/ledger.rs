//! Position ledger
//!
//! The only writer of trade status, closing fields, margin and balance. Every
//! state transition goes through [`TradeStore::transact`], which re-checks the
//! committed status inside the store's critical section, so a manual close
//! racing an automatic stop-loss settles the balance exactly once.

use super::account::{Account, AccountIdentity};
use super::history::{self, HistoryFilter, TradeStatistics};
use super::risk_engine::{self, AccountMetrics};
use super::trade::{AccountId, CloseReason, OrderRequest, Protection, Trade, TradeId};
use crate::error::{Result, TradingError, ValidationError};
use crate::market::PriceSnapshot;
use crate::storage::TradeStore;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct PositionLedger {
    store: Arc<dyn TradeStore>,
    identity: AccountIdentity,
    commission_per_lot: Decimal,
    /// Serializes margin check + insert so two orders cannot spend the same free margin
    placement: Mutex<()>,
}

impl PositionLedger {
    pub fn new(store: Arc<dyn TradeStore>, identity: AccountIdentity) -> Self {
        Self {
            store,
            identity,
            commission_per_lot: Decimal::ZERO,
            placement: Mutex::new(()),
        }
    }

    /// Charge a flat commission per lot when a position closes
    pub fn with_commission_per_lot(mut self, commission_per_lot: Decimal) -> Self {
        self.commission_per_lot = commission_per_lot;
        self
    }

    pub fn account_id(&self) -> &AccountId {
        &self.identity.account_id
    }

    pub fn leverage(&self) -> u32 {
        self.identity.leverage
    }

    pub fn store(&self) -> &Arc<dyn TradeStore> {
        &self.store
    }

    /// Create the account on first use. Existing balances are never reset.
    pub async fn open_account(&self, initial_balance: Decimal) -> Result<Account> {
        let account = self
            .store
            .ensure_account(Account::new(self.account_id().clone(), initial_balance))
            .await?;
        tracing::info!(
            account_id = %account.id,
            balance = %account.balance,
            leverage = self.leverage(),
            "Account ready"
        );
        Ok(account)
    }

    /// Validate, margin-check and persist a new order.
    ///
    /// Market orders open immediately at the live price. Limit and stop orders
    /// are stored pending at their trigger price, which is also the price used
    /// for the margin check.
    pub async fn create_trade(&self, request: OrderRequest, prices: &PriceSnapshot) -> Result<Trade> {
        request.validate()?;

        let live_price = prices
            .price(&request.symbol)
            .ok_or_else(|| ValidationError::UnknownSymbol(request.symbol.clone()))?;
        let reference_price = match request.entry_price {
            Some(trigger) if request.order_type.is_pending() => trigger,
            _ => live_price,
        };
        let required =
            risk_engine::checked_margin_required(request.lots, reference_price, self.leverage())
                .ok_or(ValidationError::NotionalOverflow {
                    price: reference_price,
                })?;

        let _guard = self.placement.lock().await;

        let account = self.store.account(self.account_id()).await?;
        let trades = self.store.load_trades(self.account_id()).await?;
        let metrics = risk_engine::aggregate(&trades, prices, account.balance);

        if let Err(e) = risk_engine::check_margin(&metrics, required) {
            tracing::warn!(
                symbol = %request.symbol,
                lots = %request.lots,
                required = %required,
                free_margin = %metrics.free_margin,
                "Order rejected"
            );
            return Err(e);
        }

        let trade = if request.order_type.is_pending() {
            Trade::pending(self.account_id().clone(), &request, reference_price)
        } else {
            Trade::open(self.account_id().clone(), &request, live_price, self.leverage())
        };

        let trade_id = self.store.create_trade(trade).await?;
        let trade = self.trade(&trade_id).await?;

        tracing::info!(
            trade_id = %trade.id,
            symbol = %trade.symbol,
            action = %trade.action,
            order_type = %trade.order_type,
            lots = %trade.lots,
            price = %trade.entry_price,
            status = %trade.status(),
            "Order placed"
        );

        Ok(trade)
    }

    /// PENDING -> OPEN at `fill_price`
    pub async fn activate(&self, trade_id: &TradeId, fill_price: Decimal) -> Result<Trade> {
        let leverage = self.leverage();
        let (trade, _) = self
            .store
            .transact(
                trade_id,
                self.account_id(),
                Box::new(move |trade, _| trade.activate(fill_price, leverage, Utc::now())),
            )
            .await?;

        tracing::info!(
            trade_id = %trade.id,
            symbol = %trade.symbol,
            price = %fill_price,
            margin = %trade.margin().unwrap_or_default(),
            "Order activated"
        );
        Ok(trade)
    }

    /// OPEN -> CLOSED, crediting `pnl` less commission to the balance in the
    /// same transaction
    pub async fn close(
        &self,
        trade_id: &TradeId,
        closing_price: Decimal,
        pnl: Decimal,
        reason: CloseReason,
    ) -> Result<Trade> {
        let per_lot = self.commission_per_lot;
        let (trade, account) = self
            .store
            .transact(
                trade_id,
                self.account_id(),
                Box::new(move |trade, account| {
                    let commission = trade.lots.saturating_mul(per_lot);
                    trade.settle_with_commission(closing_price, pnl, commission, reason, Utc::now())?;
                    account.balance = account.balance.saturating_add(pnl).saturating_sub(commission);
                    Ok(())
                }),
            )
            .await?;

        tracing::info!(
            trade_id = %trade.id,
            symbol = %trade.symbol,
            price = %closing_price,
            pnl = %pnl,
            commission = %trade.commission().unwrap_or_default(),
            reason = %reason,
            balance = %account.balance,
            "Position closed"
        );
        Ok(trade)
    }

    /// Manual close at the live price, or flat at entry when unquoted
    pub async fn close_at_market(&self, trade_id: &TradeId, prices: &PriceSnapshot) -> Result<Trade> {
        let trade = self.trade(trade_id).await?;
        let quote = prices.price(&trade.symbol);
        if quote.is_none() {
            tracing::debug!(trade_id = %trade.id, symbol = %trade.symbol, "No quote, closing at entry");
        }
        let closing_price = quote.unwrap_or(trade.entry_price);
        let pnl = risk_engine::unrealized_pnl(&trade, quote);

        self.close(trade_id, closing_price, pnl, CloseReason::Manual).await
    }

    /// PENDING -> CLOSED with no balance effect
    pub async fn cancel(&self, trade_id: &TradeId) -> Result<Trade> {
        let (trade, _) = self
            .store
            .transact(
                trade_id,
                self.account_id(),
                Box::new(|trade, _| trade.cancel(Utc::now())),
            )
            .await?;

        tracing::info!(trade_id = %trade.id, symbol = %trade.symbol, "Order cancelled");
        Ok(trade)
    }

    /// Replace take-profit and stop-loss on a trade that is not yet closed
    pub async fn modify(&self, trade_id: &TradeId, protection: Protection) -> Result<Trade> {
        protection.validate()?;

        let current = self.trade(trade_id).await?;
        let trade = self
            .store
            .update_trade(trade_id, current.version, protection.into())
            .await?;

        tracing::info!(
            trade_id = %trade.id,
            take_profit = ?trade.take_profit,
            stop_loss = ?trade.stop_loss,
            "Protection updated"
        );
        Ok(trade)
    }

    pub async fn account(&self) -> Result<Account> {
        self.store.account(self.account_id()).await
    }

    pub async fn trades(&self) -> Result<Vec<Trade>> {
        self.store.load_trades(self.account_id()).await
    }

    pub async fn trade(&self, trade_id: &TradeId) -> Result<Trade> {
        self.trades()
            .await?
            .into_iter()
            .find(|t| &t.id == trade_id)
            .ok_or_else(|| TradingError::TradeNotFound(trade_id.clone()))
    }

    pub async fn metrics(&self, prices: &PriceSnapshot) -> Result<AccountMetrics> {
        let account = self.account().await?;
        let trades = self.trades().await?;
        Ok(risk_engine::aggregate(&trades, prices, account.balance))
    }

    /// Settled trades in the window, newest first
    pub async fn history(&self, filter: HistoryFilter) -> Result<Vec<Trade>> {
        let trades = self.trades().await?;
        Ok(history::settled(&trades, filter, Utc::now()))
    }

    pub async fn statistics(&self, filter: HistoryFilter) -> Result<TradeStatistics> {
        let trades = self.trades().await?;
        Ok(TradeStatistics::from_trades(&trades, filter, Utc::now()))
    }
}
