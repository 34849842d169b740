//! Built-in symbol catalog and seed prices

use super::types::Symbol;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetClass {
    Stocks,
    Crypto,
    ForexMajor,
    Indices,
    Commodities,
}

impl AssetClass {
    pub const ALL: [AssetClass; 5] = [
        AssetClass::Stocks,
        AssetClass::Crypto,
        AssetClass::ForexMajor,
        AssetClass::Indices,
        AssetClass::Commodities,
    ];
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetClass::Stocks => write!(f, "Stocks"),
            AssetClass::Crypto => write!(f, "Crypto"),
            AssetClass::ForexMajor => write!(f, "Forex Major"),
            AssetClass::Indices => write!(f, "Indices"),
            AssetClass::Commodities => write!(f, "Commodities"),
        }
    }
}

/// (symbol, asset class, seed price as mantissa and scale)
const CATALOG: &[(&str, AssetClass, i64, u32)] = &[
    ("NASDAQ:AAPL", AssetClass::Stocks, 17000, 2),
    ("NASDAQ:GOOGL", AssetClass::Stocks, 14000, 2),
    ("NASDAQ:TSLA", AssetClass::Stocks, 18050, 2),
    ("NASDAQ:NVDA", AssetClass::Stocks, 12575, 2),
    ("COINBASE:BTCUSD", AssetClass::Crypto, 68000, 0),
    ("COINBASE:ETHUSD", AssetClass::Crypto, 3500, 0),
    ("COINBASE:SOLUSD", AssetClass::Crypto, 16570, 2),
    ("OANDA:EURUSD", AssetClass::ForexMajor, 10750, 4),
    ("OANDA:USDJPY", AssetClass::ForexMajor, 15720, 2),
    ("OANDA:GBPUSD", AssetClass::ForexMajor, 12650, 4),
    ("OANDA:USDCHF", AssetClass::ForexMajor, 9010, 4),
    ("FOREXCOM:SPXUSD", AssetClass::Indices, 5250, 0),
    ("FOREXCOM:NSXUSD", AssetClass::Indices, 18500, 0),
    ("FOREXCOM:US30", AssetClass::Indices, 39500, 0),
    ("OANDA:XAUUSD", AssetClass::Commodities, 230050, 2),
    ("OANDA:XAGUSD", AssetClass::Commodities, 2780, 2),
    ("TVC:USOIL", AssetClass::Commodities, 7850, 2),
];

/// All catalog symbols in display order
pub fn symbols() -> Vec<Symbol> {
    CATALOG.iter().map(|(s, _, _, _)| Symbol::new(*s)).collect()
}

/// Catalog symbols of one asset class
pub fn symbols_in(class: AssetClass) -> Vec<Symbol> {
    CATALOG
        .iter()
        .filter(|(_, c, _, _)| *c == class)
        .map(|(s, _, _, _)| Symbol::new(*s))
        .collect()
}

pub fn asset_class(symbol: &Symbol) -> Option<AssetClass> {
    CATALOG
        .iter()
        .find(|(s, _, _, _)| *s == symbol.as_str())
        .map(|(_, c, _, _)| *c)
}

/// Starting prices for a fresh oracle
pub fn seed_prices() -> HashMap<Symbol, Decimal> {
    CATALOG
        .iter()
        .map(|(s, _, mantissa, scale)| (Symbol::new(*s), Decimal::new(*mantissa, *scale)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_seed_prices() {
        let prices = seed_prices();
        assert_eq!(prices.len(), 17);
        assert_eq!(prices[&Symbol::new("NASDAQ:AAPL")], dec!(170.00));
        assert_eq!(prices[&Symbol::new("OANDA:EURUSD")], dec!(1.0750));
        assert_eq!(prices[&Symbol::new("OANDA:XAUUSD")], dec!(2300.50));
        assert!(prices.values().all(|p| *p > Decimal::ZERO));
    }

    #[test]
    fn test_asset_classes() {
        assert_eq!(symbols_in(AssetClass::Crypto).len(), 3);
        assert_eq!(
            asset_class(&Symbol::new("TVC:USOIL")),
            Some(AssetClass::Commodities)
        );
        assert_eq!(asset_class(&Symbol::new("NYSE:IBM")), None);
        let total: usize = AssetClass::ALL.iter().map(|c| symbols_in(*c).len()).sum();
        assert_eq!(total, symbols().len());
    }
}
