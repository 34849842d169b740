//! Persistence contract for accounts and trade records

pub mod memory;

pub use memory::InMemoryTradeStore;

use crate::error::Result;
use crate::paper_trading::account::Account;
use crate::paper_trading::trade::{AccountId, Trade, TradeId, TradePatch};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;

/// Mutation applied atomically to one trade and its owning account.
/// Returning an error discards every change the closure made.
pub type TradeMutator = Box<dyn FnOnce(&mut Trade, &mut Account) -> Result<()> + Send>;

/// Store of accounts and their trades.
///
/// Implementations must run [`TradeStore::transact`] as a single
/// compare-and-transition: the mutator sees the current committed row, and
/// either all of its changes (trade and balance) are committed or none are.
/// Every committed write bumps `Trade::version`.
#[async_trait]
pub trait TradeStore: Send + Sync {
    /// Create the account if missing; an existing account is returned untouched
    async fn ensure_account(&self, account: Account) -> Result<Account>;

    async fn account(&self, account_id: &AccountId) -> Result<Account>;

    /// Current trades of an account in creation order
    async fn load_trades(&self, account_id: &AccountId) -> Result<Vec<Trade>>;

    /// Push stream re-emitting the full trade set on every change
    fn subscribe_trades(&self, account_id: &AccountId) -> Result<watch::Receiver<Arc<Vec<Trade>>>>;

    async fn create_trade(&self, trade: Trade) -> Result<TradeId>;

    /// Apply `patch` if the stored version still equals `expected_version`
    async fn update_trade(
        &self,
        trade_id: &TradeId,
        expected_version: u64,
        patch: TradePatch,
    ) -> Result<Trade>;

    async fn transact(
        &self,
        trade_id: &TradeId,
        account_id: &AccountId,
        mutator: TradeMutator,
    ) -> Result<(Trade, Account)>;
}
