//! Paper trading simulation system

pub mod account;
pub mod history;
pub mod ledger;
pub mod order_evaluator;
pub mod risk_engine;
pub mod session;
pub mod trade;

pub use account::{Account, AccountIdentity};
pub use history::{HistoryFilter, TradeStatistics};
pub use ledger::PositionLedger;
pub use order_evaluator::{FillPolicy, OrderEvaluator, TickReport, Transition};
pub use risk_engine::AccountMetrics;
pub use session::{SessionSnapshot, TradingSession};
pub use trade::{
    AccountId, CloseReason, OrderRequest, OrderType, Protection, Settlement, Trade, TradeId,
    TradePatch, TradeState, TradeStatus, CONTRACT_SIZE, MAX_LOTS, MIN_LOTS,
};
