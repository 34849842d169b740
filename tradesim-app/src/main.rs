//! Paper Trading Simulator
//!
//! Opens a paper account, places a handful of demo orders against the
//! synthetic feed and logs every published snapshot until Ctrl+C or the demo
//! timeout.

use anyhow::Result;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tradesim_core::{
    AccountId, AccountIdentity, HistoryFilter, InMemoryTradeStore, OrderRequest, PriceSnapshot,
    SessionConfig, Side, Symbol, TradingSession,
};

const DEFAULT_DEMO_SECS: u64 = 60;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = SessionConfig::from_env();
    let account_id = std::env::var("TRADESIM_ACCOUNT").unwrap_or_else(|_| "demo-user".to_string());
    let demo_secs = std::env::var("TRADESIM_DEMO_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_DEMO_SECS);

    info!(
        account_id = %account_id,
        tick_ms = config.tick_interval.as_millis() as u64,
        leverage = config.leverage,
        commission_per_lot = %config.commission_per_lot,
        fill_policy = ?config.fill_policy,
        "🚀 Starting paper trading simulator"
    );

    let identity = AccountIdentity::new(AccountId::new(account_id), config.leverage)?;
    let session = TradingSession::new(config, identity, Arc::new(InMemoryTradeStore::new()))?;

    let account = session.open().await?;
    info!(balance = %account.balance, "✅ Account opened");

    for request in demo_orders(&session.prices()) {
        match session.place_order(request).await {
            Ok(trade) => info!(trade_id = %trade.id, status = %trade.status(), "📈 Demo order placed"),
            Err(e) => warn!(error = %e, "Demo order rejected"),
        }
    }

    let mut snapshots = session.subscribe();
    session.start()?;

    let monitor = tokio::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            info!(
                sequence = snapshot.sequence,
                balance = %snapshot.metrics.balance.round_dp(2),
                equity = %snapshot.metrics.equity.round_dp(2),
                free_margin = %snapshot.metrics.free_margin.round_dp(2),
                open = snapshot.open_trades().count(),
                pending = snapshot.pending_trades().count(),
                "💰 Account"
            );
            if let Ok(json) = serde_json::to_string(&snapshot.metrics) {
                tracing::debug!(metrics = %json, "Snapshot");
            }
        }
    });

    info!("📊 Session is running. Press Ctrl+C to stop.");

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("🛑 Shutdown signal received...");
        }
        _ = tokio::time::sleep(Duration::from_secs(demo_secs)) => {
            info!("⏰ Demo timeout reached...");
        }
    }

    session.stop().await?;
    monitor.abort();

    let stats = session.statistics(HistoryFilter::AllTime).await?;
    info!(
        closed = stats.total_closed,
        win_rate = %stats.win_rate.round_dp(1),
        realized_pnl = %stats.realized_pnl.round_dp(2),
        "✅ Session complete"
    );
    println!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}

/// One market order per side plus a bracketed limit order, sized from the live quotes
fn demo_orders(prices: &PriceSnapshot) -> Vec<OrderRequest> {
    let mut orders = Vec::new();

    let aapl = Symbol::new("NASDAQ:AAPL");
    if let Some(price) = prices.price(&aapl) {
        orders.push(
            OrderRequest::market(aapl, Side::Buy, Decimal::ONE)
                .with_stop_loss(price * Decimal::new(998, 3))
                .with_take_profit(price * Decimal::new(1002, 3)),
        );
    }

    let eurusd = Symbol::new("OANDA:EURUSD");
    if let Some(price) = prices.price(&eurusd) {
        orders.push(
            OrderRequest::market(eurusd, Side::Sell, Decimal::TEN)
                .with_stop_loss(price * Decimal::new(1003, 3))
                .with_take_profit(price * Decimal::new(997, 3)),
        );
    }

    let gold = Symbol::new("OANDA:XAUUSD");
    if let Some(price) = prices.price(&gold) {
        let trigger = (price * Decimal::new(999, 3)).round_dp(2);
        orders.push(
            OrderRequest::limit(gold, Side::Sell, Decimal::new(5, 2), trigger)
                .with_stop_loss(trigger * Decimal::new(1005, 3)),
        );
    }

    orders
}
