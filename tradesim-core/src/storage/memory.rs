//! In-memory trade store

use super::{TradeMutator, TradeStore};
use crate::error::{Result, TradingError};
use crate::paper_trading::account::Account;
use crate::paper_trading::trade::{AccountId, Trade, TradeId, TradePatch};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;

/// One account's rows, guarded together so a trade transition and the
/// balance update it implies commit under the same lock
struct AccountBook {
    account: Account,
    trades: Vec<Trade>,
    publisher: watch::Sender<Arc<Vec<Trade>>>,
}

impl AccountBook {
    fn new(account: Account) -> Self {
        let (publisher, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            account,
            trades: Vec::new(),
            publisher,
        }
    }

    fn position(&self, trade_id: &TradeId) -> Option<usize> {
        self.trades.iter().position(|t| &t.id == trade_id)
    }

    fn publish(&self) {
        self.publisher.send_replace(Arc::new(self.trades.clone()));
    }
}

/// Thread-safe store backed by process memory
pub struct InMemoryTradeStore {
    books: DashMap<AccountId, Arc<Mutex<AccountBook>>>,
    trade_index: DashMap<TradeId, AccountId>,
}

impl InMemoryTradeStore {
    pub fn new() -> Self {
        Self {
            books: DashMap::new(),
            trade_index: DashMap::new(),
        }
    }

    fn book(&self, account_id: &AccountId) -> Result<Arc<Mutex<AccountBook>>> {
        self.books
            .get(account_id)
            .map(|b| b.value().clone())
            .ok_or_else(|| TradingError::AccountNotFound(account_id.to_string()))
    }

    fn owner(&self, trade_id: &TradeId) -> Result<AccountId> {
        self.trade_index
            .get(trade_id)
            .map(|a| a.value().clone())
            .ok_or_else(|| TradingError::TradeNotFound(trade_id.clone()))
    }

    /// Total number of trades across all accounts
    pub fn trade_count(&self) -> usize {
        self.trade_index.len()
    }
}

impl Default for InMemoryTradeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TradeStore for InMemoryTradeStore {
    async fn ensure_account(&self, account: Account) -> Result<Account> {
        let book = self
            .books
            .entry(account.id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(AccountBook::new(account))))
            .value()
            .clone();
        let existing = book.lock().account.clone();
        Ok(existing)
    }

    async fn account(&self, account_id: &AccountId) -> Result<Account> {
        Ok(self.book(account_id)?.lock().account.clone())
    }

    async fn load_trades(&self, account_id: &AccountId) -> Result<Vec<Trade>> {
        Ok(self.book(account_id)?.lock().trades.clone())
    }

    fn subscribe_trades(&self, account_id: &AccountId) -> Result<watch::Receiver<Arc<Vec<Trade>>>> {
        let book = self.book(account_id)?;
        let book = book.lock();
        let receiver = book.publisher.subscribe();
        book.publish();
        Ok(receiver)
    }

    async fn create_trade(&self, mut trade: Trade) -> Result<TradeId> {
        let book = self.book(&trade.account_id)?;
        let mut book = book.lock();

        if book.position(&trade.id).is_some() {
            return Err(TradingError::Storage(format!("duplicate trade id {}", trade.id)));
        }

        trade.version = 1;
        let trade_id = trade.id.clone();
        self.trade_index.insert(trade_id.clone(), trade.account_id.clone());
        book.trades.push(trade);
        book.publish();

        Ok(trade_id)
    }

    async fn update_trade(
        &self,
        trade_id: &TradeId,
        expected_version: u64,
        patch: TradePatch,
    ) -> Result<Trade> {
        let book = self.book(&self.owner(trade_id)?)?;
        let mut book = book.lock();
        let idx = book
            .position(trade_id)
            .ok_or_else(|| TradingError::TradeNotFound(trade_id.clone()))?;

        let stored = &book.trades[idx];
        if stored.version != expected_version {
            return Err(TradingError::VersionConflict {
                trade_id: trade_id.clone(),
                expected: expected_version,
                actual: stored.version,
            });
        }

        let mut updated = stored.clone();
        updated.apply_patch(&patch)?;
        updated.version += 1;
        book.trades[idx] = updated.clone();
        book.publish();

        Ok(updated)
    }

    async fn transact(
        &self,
        trade_id: &TradeId,
        account_id: &AccountId,
        mutator: TradeMutator,
    ) -> Result<(Trade, Account)> {
        let book = self.book(account_id)?;
        let mut book = book.lock();
        let idx = book
            .position(trade_id)
            .ok_or_else(|| TradingError::TradeNotFound(trade_id.clone()))?;

        // Work on copies so a failing mutator leaves no partial state
        let mut trade = book.trades[idx].clone();
        let mut account = book.account.clone();
        mutator(&mut trade, &mut account)?;

        trade.version += 1;
        book.trades[idx] = trade.clone();
        book.account = account.clone();
        book.publish();

        Ok((trade, account))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{Side, Symbol};
    use crate::paper_trading::trade::{OrderRequest, Protection, TradeStatus};
    use rust_decimal_macros::dec;

    fn account_id() -> AccountId {
        AccountId::new("user-1")
    }

    async fn store_with_trade() -> (InMemoryTradeStore, TradeId) {
        let store = InMemoryTradeStore::new();
        store
            .ensure_account(Account::new(account_id(), dec!(1000)))
            .await
            .unwrap();
        let trade = Trade::pending(
            account_id(),
            &OrderRequest::limit(Symbol::new("NASDAQ:AAPL"), Side::Buy, dec!(1), dec!(150)),
            dec!(150),
        );
        let id = store.create_trade(trade).await.unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn test_ensure_account_is_idempotent() {
        let store = InMemoryTradeStore::new();
        store
            .ensure_account(Account::new(account_id(), dec!(1000)))
            .await
            .unwrap();
        let again = store
            .ensure_account(Account::new(account_id(), dec!(5)))
            .await
            .unwrap();
        assert_eq!(again.balance, dec!(1000));
        assert!(store.account(&AccountId::new("nobody")).await.is_err());
    }

    #[tokio::test]
    async fn test_failed_mutator_commits_nothing() {
        let (store, id) = store_with_trade().await;

        let result = store
            .transact(
                &id,
                &account_id(),
                Box::new(|trade, account| {
                    account.balance += dec!(999);
                    trade.take_profit = Some(dec!(1));
                    Err(TradingError::Storage("boom".into()))
                }),
            )
            .await;
        assert!(result.is_err());

        let account = store.account(&account_id()).await.unwrap();
        let trades = store.load_trades(&account_id()).await.unwrap();
        assert_eq!(account.balance, dec!(1000));
        assert_eq!(trades[0].take_profit, None);
        assert_eq!(trades[0].version, 1);
    }

    #[tokio::test]
    async fn test_transact_bumps_version_and_balance() {
        let (store, id) = store_with_trade().await;

        let (trade, account) = store
            .transact(
                &id,
                &account_id(),
                Box::new(|trade, account| {
                    trade.cancel(chrono::Utc::now())?;
                    account.balance -= dec!(1);
                    Ok(())
                }),
            )
            .await
            .unwrap();

        assert_eq!(trade.status(), TradeStatus::Closed);
        assert_eq!(trade.version, 2);
        assert_eq!(account.balance, dec!(999));
    }

    #[tokio::test]
    async fn test_update_trade_rejects_stale_version() {
        let (store, id) = store_with_trade().await;
        let patch: TradePatch = Protection::new(Some(dec!(200)), None).into();

        let updated = store.update_trade(&id, 1, patch).await.unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.take_profit, Some(dec!(200)));

        let err = store.update_trade(&id, 1, patch).await.unwrap_err();
        assert!(matches!(
            err,
            TradingError::VersionConflict { expected: 1, actual: 2, .. }
        ));
    }

    #[tokio::test]
    async fn test_subscribers_see_every_change() {
        let (store, id) = store_with_trade().await;
        let mut rx = store.subscribe_trades(&account_id()).unwrap();
        assert_eq!(rx.borrow_and_update().len(), 1);

        store
            .update_trade(&id, 1, Protection::new(None, Some(dec!(140))).into())
            .await
            .unwrap();

        assert!(rx.has_changed().unwrap());
        let trades = rx.borrow_and_update().clone();
        assert_eq!(trades[0].stop_loss, Some(dec!(140)));
    }

    #[tokio::test]
    async fn test_unknown_trade() {
        let (store, _) = store_with_trade().await;
        let missing = TradeId::from("TRD_missing");
        assert!(matches!(
            store.update_trade(&missing, 1, TradePatch::default()).await,
            Err(TradingError::TradeNotFound(_))
        ));
        assert!(matches!(
            store
                .transact(&missing, &account_id(), Box::new(|_, _| Ok(())))
                .await,
            Err(TradingError::TradeNotFound(_))
        ));
        assert_eq!(store.trade_count(), 1);
    }
}
