//! Trading session
//!
//! Owns the price oracle, ledger and evaluator for one account, drives the
//! tick loop and publishes an immutable snapshot after every tick and every
//! successful command.

use super::account::{Account, AccountIdentity};
use super::history::{HistoryFilter, TradeStatistics};
use super::ledger::PositionLedger;
use super::order_evaluator::{OrderEvaluator, TickReport};
use super::risk_engine::{self, AccountMetrics};
use super::trade::{OrderRequest, Protection, Trade, TradeId};
use crate::config::SessionConfig;
use crate::error::{Result, TradingError};
use crate::market::{catalog, PriceOracle, PriceSnapshot};
use crate::storage::TradeStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Read-only view handed to the presentation layer
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Increments on every publish
    pub sequence: u64,
    pub taken_at: DateTime<Utc>,
    pub metrics: AccountMetrics,
    pub trades: Vec<Trade>,
    pub prices: Arc<PriceSnapshot>,
}

impl SessionSnapshot {
    fn empty(prices: Arc<PriceSnapshot>) -> Self {
        Self {
            sequence: 0,
            taken_at: Utc::now(),
            metrics: AccountMetrics::default(),
            trades: Vec::new(),
            prices,
        }
    }

    pub fn open_trades(&self) -> impl Iterator<Item = &Trade> {
        self.trades.iter().filter(|t| t.is_open())
    }

    pub fn pending_trades(&self) -> impl Iterator<Item = &Trade> {
        self.trades.iter().filter(|t| t.is_pending())
    }
}

struct SessionCore {
    config: SessionConfig,
    oracle: parking_lot::Mutex<PriceOracle>,
    current_prices: parking_lot::RwLock<Arc<PriceSnapshot>>,
    ledger: PositionLedger,
    evaluator: OrderEvaluator,
    publisher: watch::Sender<Arc<SessionSnapshot>>,
    /// Held across read and send so snapshots go out in the order they were read
    publish_lock: Mutex<()>,
    /// Held for the whole of a tick so ticks never overlap
    tick_lock: Mutex<()>,
}

impl SessionCore {
    async fn tick(&self) -> Result<TickReport> {
        let prices = self.oracle.lock().tick();
        self.evaluate(prices).await
    }

    async fn apply_prices(&self, prices: Arc<PriceSnapshot>) -> Result<TickReport> {
        {
            let mut oracle = self.oracle.lock();
            for (symbol, price) in &prices.prices {
                oracle.set_price(symbol.clone(), *price);
            }
        }
        self.evaluate(prices).await
    }

    async fn evaluate(&self, prices: Arc<PriceSnapshot>) -> Result<TickReport> {
        let _tick = self.tick_lock.lock().await;
        *self.current_prices.write() = prices.clone();

        let trades = self.ledger.trades().await?;
        let transitions = self.evaluator.evaluate(&trades, &prices);
        let report = self.evaluator.apply(&self.ledger, transitions).await;

        tracing::debug!(
            sequence = prices.sequence,
            activated = report.activated,
            closed = report.closed,
            skipped = report.skipped,
            "Tick evaluated"
        );

        self.publish().await?;
        Ok(report)
    }

    fn prices(&self) -> Arc<PriceSnapshot> {
        self.current_prices.read().clone()
    }

    async fn publish(&self) -> Result<Arc<SessionSnapshot>> {
        let _publishing = self.publish_lock.lock().await;

        let prices = self.prices();
        let account = self.ledger.account().await?;
        let trades = self.ledger.trades().await?;
        let metrics = risk_engine::aggregate(&trades, &prices, account.balance);

        let snapshot = Arc::new(SessionSnapshot {
            sequence: self.publisher.borrow().sequence + 1,
            taken_at: Utc::now(),
            metrics,
            trades,
            prices,
        });
        self.publisher.send_replace(snapshot.clone());
        Ok(snapshot)
    }
}

struct TickTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Composition root for one account's paper trading
pub struct TradingSession {
    core: Arc<SessionCore>,
    task: parking_lot::Mutex<Option<TickTask>>,
}

impl TradingSession {
    /// Session over the built-in symbol catalog
    pub fn new(
        config: SessionConfig,
        identity: AccountIdentity,
        store: Arc<dyn TradeStore>,
    ) -> Result<Self> {
        let oracle = PriceOracle::from_config(catalog::seed_prices(), &config);
        Self::with_oracle(config, identity, store, oracle)
    }

    pub fn with_oracle(
        config: SessionConfig,
        identity: AccountIdentity,
        store: Arc<dyn TradeStore>,
        oracle: PriceOracle,
    ) -> Result<Self> {
        config.validate()?;

        let prices = oracle.snapshot();
        let (publisher, _) = watch::channel(Arc::new(SessionSnapshot::empty(prices.clone())));

        Ok(Self {
            core: Arc::new(SessionCore {
                evaluator: OrderEvaluator::new(config.fill_policy),
                ledger: PositionLedger::new(store, identity)
                    .with_commission_per_lot(config.commission_per_lot),
                oracle: parking_lot::Mutex::new(oracle),
                current_prices: parking_lot::RwLock::new(prices),
                publisher,
                publish_lock: Mutex::new(()),
                tick_lock: Mutex::new(()),
                config,
            }),
            task: parking_lot::Mutex::new(None),
        })
    }

    /// Ensure the account exists and publish the first snapshot
    pub async fn open(&self) -> Result<Account> {
        let account = self
            .core
            .ledger
            .open_account(self.core.config.initial_balance)
            .await?;
        self.core.publish().await?;
        Ok(account)
    }

    /// Spawn the tick loop
    pub fn start(&self) -> Result<()> {
        let mut task = self.task.lock();
        if task.is_some() {
            return Err(TradingError::AlreadyRunning);
        }

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let core = self.core.clone();
        let period = core.config.tick_interval;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = interval.tick() => {
                        if let Err(e) = core.tick().await {
                            tracing::warn!(error = %e, "Tick failed");
                        }
                    }
                }
            }

            tracing::info!(account_id = %core.ledger.account_id(), "Tick loop stopped");
        });

        tracing::info!(
            account_id = %self.core.ledger.account_id(),
            interval_ms = period.as_millis() as u64,
            "Tick loop started"
        );

        *task = Some(TickTask { shutdown, handle });
        Ok(())
    }

    /// Stop the tick loop. A tick already in progress runs to completion; no
    /// tick-driven write happens after this returns.
    pub async fn stop(&self) -> Result<()> {
        let task = self.task.lock().take();
        let Some(task) = task else {
            return Ok(());
        };

        task.shutdown.send_replace(true);
        task.handle
            .await
            .map_err(|e| TradingError::Storage(format!("tick task failed: {e}")))?;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }

    /// Run one oracle tick and evaluate it
    pub async fn tick(&self) -> Result<TickReport> {
        self.core.tick().await
    }

    /// Evaluate an externally supplied snapshot; the oracle continues from these prices
    pub async fn apply_prices(&self, prices: Arc<PriceSnapshot>) -> Result<TickReport> {
        self.core.apply_prices(prices).await
    }

    pub async fn place_order(&self, request: OrderRequest) -> Result<Trade> {
        let trade = self
            .core
            .ledger
            .create_trade(request, &self.core.prices())
            .await?;
        self.core.publish().await?;
        Ok(trade)
    }

    pub async fn close_trade(&self, trade_id: &TradeId) -> Result<Trade> {
        let trade = self
            .core
            .ledger
            .close_at_market(trade_id, &self.core.prices())
            .await?;
        self.core.publish().await?;
        Ok(trade)
    }

    pub async fn cancel_trade(&self, trade_id: &TradeId) -> Result<Trade> {
        let trade = self.core.ledger.cancel(trade_id).await?;
        self.core.publish().await?;
        Ok(trade)
    }

    pub async fn modify_trade(&self, trade_id: &TradeId, protection: Protection) -> Result<Trade> {
        let trade = self.core.ledger.modify(trade_id, protection).await?;
        self.core.publish().await?;
        Ok(trade)
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<SessionSnapshot>> {
        self.core.publisher.subscribe()
    }

    /// Last published snapshot
    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        self.core.publisher.borrow().clone()
    }

    pub fn prices(&self) -> Arc<PriceSnapshot> {
        self.core.prices()
    }

    pub async fn metrics(&self) -> Result<AccountMetrics> {
        self.core.ledger.metrics(&self.core.prices()).await
    }

    pub async fn history(&self, filter: HistoryFilter) -> Result<Vec<Trade>> {
        self.core.ledger.history(filter).await
    }

    pub async fn statistics(&self, filter: HistoryFilter) -> Result<TradeStatistics> {
        self.core.ledger.statistics(filter).await
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.core.ledger
    }

    pub fn config(&self) -> &SessionConfig {
        &self.core.config
    }
}

impl Drop for TradingSession {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.shutdown.send_replace(true);
        }
    }
}
