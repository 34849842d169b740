//! Session and concurrency tests
//!
//! Tests cover:
//! - Manual close racing an automatic stop-loss
//! - Cancel racing activation
//! - Snapshot ordering under concurrent publishes
//! - Tick loop start/stop semantics
//! - History and statistics through the session

use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use tradesim_core::*;

fn aapl() -> Symbol {
    Symbol::new("NASDAQ:AAPL")
}

fn quote(price: Decimal) -> Arc<PriceSnapshot> {
    Arc::new([("NASDAQ:AAPL", price)].into_iter().collect())
}

async fn session(tick_interval: Duration) -> Arc<TradingSession> {
    let config = SessionConfig {
        tick_interval,
        price_seed: Some(9),
        ..SessionConfig::default()
    };
    let identity = AccountIdentity::new(AccountId::new("user-1"), 100).unwrap();
    let seed: HashMap<_, _> = [(aapl(), dec!(170))].into_iter().collect();
    let oracle = PriceOracle::from_config(seed, &config);
    let session =
        TradingSession::with_oracle(config, identity, Arc::new(InMemoryTradeStore::new()), oracle)
            .unwrap();
    session.open().await.unwrap();
    Arc::new(session)
}

// =============================================================================
// Concurrency Tests
// =============================================================================

mod concurrency_tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_manual_close_races_stop_loss() {
        for _ in 0..20 {
            let session = session(Duration::from_secs(60)).await;
            let trade = session
                .place_order(
                    OrderRequest::market(aapl(), Side::Buy, dec!(1)).with_stop_loss(dec!(165)),
                )
                .await
                .unwrap();

            let manual = {
                let session = session.clone();
                let id = trade.id.clone();
                tokio::spawn(async move {
                    session
                        .ledger()
                        .close(&id, dec!(166), dec!(-400), CloseReason::Manual)
                        .await
                })
            };
            let automatic = {
                let session = session.clone();
                tokio::spawn(async move { session.apply_prices(quote(dec!(164))).await })
            };

            let manual = manual.await.unwrap();
            let report = automatic.await.unwrap().unwrap();

            let closed = session.ledger().trade(&trade.id).await.unwrap();
            let balance = session.metrics().await.unwrap().balance;

            // Exactly one close landed, and the balance reflects only that one
            match manual {
                Ok(_) => {
                    assert_eq!(report.closed, 0);
                    assert_eq!(closed.close_reason(), Some(CloseReason::Manual));
                    assert_eq!(balance, dec!(99600));
                }
                Err(e) => {
                    assert!(matches!(e, TradingError::ConcurrencyConflict { .. }));
                    assert_eq!(report.closed, 1);
                    assert_eq!(closed.close_reason(), Some(CloseReason::StopLoss));
                    assert_eq!(balance, dec!(99400));
                }
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cancel_races_activation() {
        for _ in 0..20 {
            let session = session(Duration::from_secs(60)).await;
            let pending = session
                .place_order(OrderRequest::limit(aapl(), Side::Buy, dec!(1), dec!(172)))
                .await
                .unwrap();

            let cancel = {
                let session = session.clone();
                let id = pending.id.clone();
                tokio::spawn(async move { session.cancel_trade(&id).await })
            };
            let tick = {
                let session = session.clone();
                tokio::spawn(async move { session.apply_prices(quote(dec!(175))).await })
            };

            let cancel = cancel.await.unwrap();
            let report = tick.await.unwrap().unwrap();
            let trade = session.ledger().trade(&pending.id).await.unwrap();
            let metrics = session.metrics().await.unwrap();

            // The order ends either cancelled or open, never both
            match cancel {
                Ok(_) => {
                    assert_eq!(report.activated, 0);
                    assert_eq!(trade.status(), TradeStatus::Closed);
                    assert!(trade.settlement().is_none());
                    assert_eq!(metrics.margin_used, Decimal::ZERO);
                }
                Err(e) => {
                    assert!(matches!(
                        e,
                        TradingError::ConcurrencyConflict {
                            actual: TradeStatus::Open,
                            ..
                        }
                    ));
                    assert_eq!(report.activated, 1);
                    assert_eq!(trade.status(), TradeStatus::Open);
                    assert_eq!(metrics.margin_used, dec!(172));
                }
            }
            assert_eq!(metrics.balance, dec!(100000));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_many_concurrent_closes_settle_once() {
        let session = session(Duration::from_secs(60)).await;
        let trade = session
            .place_order(OrderRequest::market(aapl(), Side::Sell, dec!(1)))
            .await
            .unwrap();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let session = session.clone();
                let id = trade.id.clone();
                tokio::spawn(async move {
                    session
                        .ledger()
                        .close(&id, dec!(160), Decimal::from(i + 1), CloseReason::Manual)
                        .await
                })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);

        let closed = session.ledger().trade(&trade.id).await.unwrap();
        let pnl = closed.pnl().unwrap();
        assert_eq!(session.metrics().await.unwrap().balance, dec!(100000) + pnl);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_publishes_stay_ordered() {
        let session = session(Duration::from_secs(60)).await;
        let start = session.snapshot().sequence;

        let mut rx = session.subscribe();
        let watcher = tokio::spawn(async move {
            let mut seen = Vec::new();
            while rx.changed().await.is_ok() {
                let snapshot = rx.borrow_and_update().clone();
                seen.push((snapshot.sequence, snapshot.trades.len()));
            }
            seen
        });

        let mut handles = Vec::new();
        for _ in 0..8 {
            let orders = session.clone();
            handles.push(tokio::spawn(async move {
                orders
                    .place_order(OrderRequest::market(aapl(), Side::Buy, dec!(1)))
                    .await
                    .map(|_| ())
            }));
            let ticks = session.clone();
            handles.push(tokio::spawn(async move { ticks.tick().await.map(|_| ()) }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let last = session.snapshot();
        assert_eq!(last.sequence, start + 16);
        assert_eq!(last.trades.len(), 8);

        // Last owner; dropping it closes the channel and ends the watcher
        drop(session);
        let seen = watcher.await.unwrap();

        // Sequence and trade count never go backwards
        for pair in seen.windows(2) {
            assert!(pair[1].0 > pair[0].0, "{:?}", seen);
            assert!(pair[1].1 >= pair[0].1, "{:?}", seen);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_orders_cannot_overspend_margin() {
        let config = SessionConfig {
            initial_balance: dec!(1000),
            ..SessionConfig::default()
        };
        let identity = AccountIdentity::new(AccountId::new("small"), 100).unwrap();
        let seed: HashMap<_, _> = [(aapl(), dec!(170))].into_iter().collect();
        let oracle = PriceOracle::from_config(seed, &config);
        let session = Arc::new(
            TradingSession::with_oracle(config, identity, Arc::new(InMemoryTradeStore::new()), oracle)
                .unwrap(),
        );
        session.open().await.unwrap();

        // Each order needs 170; only five fit in 1000
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let session = session.clone();
                tokio::spawn(async move {
                    session
                        .place_order(OrderRequest::market(aapl(), Side::Buy, dec!(1)))
                        .await
                })
            })
            .collect();

        let mut placed = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                placed += 1;
            }
        }
        assert_eq!(placed, 5);
        let metrics = session.metrics().await.unwrap();
        assert!(metrics.free_margin >= Decimal::ZERO);
    }
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn test_start_stop_restart() {
        let session = session(Duration::from_millis(5)).await;

        assert_ok!(session.start());
        assert_err!(session.start());

        let mut rx = session.subscribe();
        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .expect("tick loop should publish")
            .unwrap();

        assert_ok!(session.stop().await);
        assert!(!session.is_running());
        // Stopping twice is harmless
        assert_ok!(session.stop().await);

        assert_ok!(session.start());
        assert_ok!(session.stop().await);
    }

    #[tokio::test]
    async fn test_no_ticks_after_stop() {
        let session = session(Duration::from_millis(5)).await;
        session.start().unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        session.stop().await.unwrap();

        let sequence = session.prices().sequence;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(session.prices().sequence, sequence);
    }

    #[tokio::test]
    async fn test_tick_loop_closes_positions() {
        // Wide band so the stop-loss is crossed quickly
        let config = SessionConfig {
            tick_interval: Duration::from_millis(2),
            volatility: dec!(0.2),
            price_seed: Some(3),
            ..SessionConfig::default()
        };
        let identity = AccountIdentity::new(AccountId::new("user-1"), 100).unwrap();
        let seed: HashMap<_, _> = [(aapl(), dec!(170))].into_iter().collect();
        let oracle = PriceOracle::from_config(seed, &config);
        let session =
            TradingSession::with_oracle(config, identity, Arc::new(InMemoryTradeStore::new()), oracle)
                .unwrap();
        session.open().await.unwrap();

        let trade = session
            .place_order(
                OrderRequest::market(aapl(), Side::Buy, dec!(1))
                    .with_stop_loss(dec!(169.99))
                    .with_take_profit(dec!(170.01)),
            )
            .await
            .unwrap();

        let mut rx = session.subscribe();
        session.start().unwrap();
        let closed = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                rx.changed().await.unwrap();
                let snapshot = rx.borrow_and_update().clone();
                if let Some(t) = snapshot.trades.iter().find(|t| t.id == trade.id) {
                    if t.is_closed() {
                        return t.clone();
                    }
                }
            }
        })
        .await
        .expect("position should close");
        session.stop().await.unwrap();

        let expected = closed.closing_price().unwrap();
        let pnl = (expected - dec!(170)) * dec!(100);
        assert_eq!(closed.pnl(), Some(pnl));
        assert_eq!(session.metrics().await.unwrap().balance, dec!(100000) + pnl);
    }
}

// =============================================================================
// History Tests
// =============================================================================

mod history_tests {
    use super::*;

    #[tokio::test]
    async fn test_history_filters_and_statistics() {
        let session = session(Duration::from_secs(60)).await;

        let winner = session
            .place_order(OrderRequest::market(aapl(), Side::Buy, dec!(1)))
            .await
            .unwrap();
        let loser = session
            .place_order(OrderRequest::market(aapl(), Side::Sell, dec!(1)))
            .await
            .unwrap();
        let cancelled = session
            .place_order(OrderRequest::limit(aapl(), Side::Buy, dec!(1), dec!(200)))
            .await
            .unwrap();

        session.apply_prices(quote(dec!(172))).await.unwrap();
        session.close_trade(&winner.id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        session.close_trade(&loser.id).await.unwrap();
        session.cancel_trade(&cancelled.id).await.unwrap();

        let history = session.history(HistoryFilter::AllTime).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, loser.id, "newest close first");
        assert_eq!(session.history(HistoryFilter::Today).await.unwrap().len(), 2);
        assert!(session
            .history(HistoryFilter::LastMonth)
            .await
            .unwrap()
            .is_empty());

        let future = HistoryFilter::Custom {
            from: Utc::now() + ChronoDuration::days(1),
            to: Utc::now() + ChronoDuration::days(2),
        };
        assert!(session.history(future).await.unwrap().is_empty());

        let stats = session.statistics(HistoryFilter::AllTime).await.unwrap();
        assert_eq!(stats.total_closed, 2);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.winning, 1);
        assert_eq!(stats.losing, 1);
        assert_eq!(stats.realized_pnl, Decimal::ZERO);
        assert_eq!(stats.profit_factor, dec!(1));
    }
}
