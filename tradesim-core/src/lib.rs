//! Paper Trading Simulation Library
//!
//! A deterministic paper trading core: a synthetic price feed, a trade ledger
//! with atomic state transitions, risk arithmetic and per-tick order
//! evaluation, composed into a [`TradingSession`] that publishes read-only
//! snapshots to a presentation layer.

pub mod config;
pub mod error;
pub mod market;
pub mod paper_trading;
pub mod storage;

// Re-export main types for easy access
pub use config::SessionConfig;
pub use error::{ErrorKind, Result, TradingError, ValidationError};
pub use market::{AssetClass, PriceOracle, PriceSnapshot, Side, Symbol};
pub use paper_trading::{
    Account, AccountId, AccountIdentity, AccountMetrics, CloseReason, FillPolicy, HistoryFilter,
    OrderRequest, OrderType, PositionLedger, Protection, SessionSnapshot, Trade, TradeId,
    TradeStatistics, TradeStatus, TradingSession,
};
pub use storage::{InMemoryTradeStore, TradeStore};

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_session_creation() {
        let identity = AccountIdentity::new(AccountId::new("demo"), 100).unwrap();
        let session = TradingSession::new(
            SessionConfig::default(),
            identity,
            Arc::new(InMemoryTradeStore::new()),
        )
        .unwrap();

        let account = session.open().await.unwrap();
        assert_eq!(account.balance, dec!(100000));
        assert_eq!(session.prices().len(), market::catalog::symbols().len());
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let config = SessionConfig {
            tick_interval: std::time::Duration::from_millis(5),
            ..SessionConfig::default()
        };
        let identity = AccountIdentity::new(AccountId::new("demo"), 100).unwrap();
        let session =
            TradingSession::new(config, identity, Arc::new(InMemoryTradeStore::new())).unwrap();
        session.open().await.unwrap();

        assert!(session.start().is_ok());
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(session.stop().await.is_ok());
    }
}
