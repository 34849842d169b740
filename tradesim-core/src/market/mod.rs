//! Market data: symbols, price snapshots and the synthetic feed

pub mod catalog;
pub mod price_oracle;
pub mod types;

pub use catalog::AssetClass;
pub use price_oracle::PriceOracle;
pub use types::{PriceSnapshot, Side, Symbol};
