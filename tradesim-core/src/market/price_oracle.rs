//! Synthetic price feed

use super::types::{PriceSnapshot, Symbol};
use crate::config::SessionConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Random-walk price generator.
///
/// Each tick moves every tracked price by a uniform multiplicative step in
/// `[-volatility / 2, +volatility / 2]` and rounded to `precision` decimal
/// places, never going below one unit of that precision. Prices are kept in a
/// `BTreeMap` so a seeded oracle replays the same stream.
pub struct PriceOracle {
    prices: BTreeMap<Symbol, Decimal>,
    volatility: Decimal,
    precision: u32,
    /// Smallest representable price at `precision`
    floor: Decimal,
    sequence: u64,
    rng: StdRng,
}

impl PriceOracle {
    pub fn new(seed_prices: HashMap<Symbol, Decimal>, volatility: Decimal, precision: u32) -> Self {
        Self {
            prices: seed_prices.into_iter().collect(),
            volatility,
            precision,
            floor: Decimal::new(1, precision.min(28)),
            sequence: 0,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn from_config(seed_prices: HashMap<Symbol, Decimal>, config: &SessionConfig) -> Self {
        let oracle = Self::new(seed_prices, config.volatility, config.price_precision);
        match config.price_seed {
            Some(seed) => oracle.with_seed(seed),
            None => oracle,
        }
    }

    /// Use a deterministic random source
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Advance every tracked price by one step
    pub fn tick(&mut self) -> Arc<PriceSnapshot> {
        let half_range = (self.volatility / Decimal::TWO).to_f64().unwrap_or(0.0);

        for price in self.prices.values_mut() {
            let change: f64 = self.rng.gen_range(-half_range..=half_range);
            let factor = Decimal::ONE + Decimal::from_f64(change).unwrap_or(Decimal::ZERO);
            *price = price
                .saturating_mul(factor)
                .round_dp(self.precision)
                .max(self.floor);
        }

        self.sequence += 1;
        debug!(sequence = self.sequence, symbols = self.prices.len(), "Price tick");
        self.snapshot()
    }

    pub fn snapshot(&self) -> Arc<PriceSnapshot> {
        Arc::new(PriceSnapshot::new(
            self.sequence,
            self.prices.iter().map(|(s, p)| (s.clone(), *p)).collect(),
        ))
    }

    /// Start tracking a symbol, keeping the existing price if already tracked
    pub fn track(&mut self, symbol: Symbol, price: Decimal) {
        self.prices.entry(symbol).or_insert(price);
    }

    /// Override a price outside the random walk
    pub fn set_price(&mut self, symbol: Symbol, price: Decimal) {
        self.prices.insert(symbol, price.max(self.floor));
    }

    pub fn price(&self, symbol: &Symbol) -> Option<Decimal> {
        self.prices.get(symbol).copied()
    }

    pub fn symbols(&self) -> Vec<Symbol> {
        self.prices.keys().cloned().collect()
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}
