//! Common types, error handling, data models.

use std::fmt;

use chrono::{DateTime, Utc};
use num_bigint::BigUint;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Common error type for the price-watcher system.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PriceWatcherError {
    #[error("invalid decimal literal: {0:?}")]
    InvalidDecimal(String),
    #[error("invalid decimal exponent: {0}")]
    InvalidExponent(i32),
    #[error("unsupported pair: {0}")]
    UnsupportedPair(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("no price data for {0} in the requested window")]
    NoData(String),
    #[error("no price recorded for {0}")]
    NotFound(String),
    #[error("value does not fit in a decimal")]
    Overflow,
    #[error("invalid window: {0} days")]
    InvalidWindow(i64),
    #[error("invalid service state: {0}")]
    InvalidState(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("config error: {0}")]
    Config(String),
}

impl PriceWatcherError {
    /// Errors the next watcher tick may not hit again.
    pub fn is_transient(&self) -> bool {
        matches!(self, PriceWatcherError::Transport(_) | PriceWatcherError::Store(_))
    }
}

pub type Result<T> = std::result::Result<T, PriceWatcherError>;

/// Ordered (base, quote) pair of opaque asset identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetPair {
    pub base: String,
    pub quote: String,
}

impl AssetPair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self { base: base.into(), quote: quote.into() }
    }

    /// Case-insensitive comparison used for every pair lookup.
    pub fn matches(&self, other: &AssetPair) -> bool {
        self.base.eq_ignore_ascii_case(&other.base) && self.quote.eq_ignore_ascii_case(&other.quote)
    }

    pub fn reversed(&self) -> AssetPair {
        AssetPair { base: self.quote.clone(), quote: self.base.clone() }
    }

    /// Lowercased form, suitable as a map key.
    pub fn key(&self) -> (String, String) {
        (self.base.to_ascii_lowercase(), self.quote.to_ascii_lowercase())
    }
}

impl fmt::Display for AssetPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.base, self.quote)
    }
}

/// Raw pool reserves, already ordered for the requested swap direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reserves {
    pub reserve_in: BigUint,
    pub reserve_out: BigUint,
}

impl Reserves {
    pub fn new(reserve_in: impl Into<BigUint>, reserve_out: impl Into<BigUint>) -> Self {
        Self { reserve_in: reserve_in.into(), reserve_out: reserve_out.into() }
    }

    pub fn flipped(&self) -> Reserves {
        Reserves { reserve_in: self.reserve_out.clone(), reserve_out: self.reserve_in.clone() }
    }
}

/// A persisted price observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Store-assigned insertion sequence; breaks ties between equal timestamps.
    pub id: u64,
    pub pair: AssetPair,
    pub price: Decimal,
    pub created_at: DateTime<Utc>,
}

/// One configured pair the watcher samples on every tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchItem {
    pub token0: String,
    pub token1: String,
    /// Decimal exponent of token0; also scales the output unless `quote_decimals` is set.
    pub decimals: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote_decimals: Option<i32>,
    /// Intermediate asset for two-hop pricing, e.g. WETH between a token and DAI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub via: Option<String>,
}

impl WatchItem {
    pub fn new(token0: impl Into<String>, token1: impl Into<String>, decimals: i32) -> Self {
        Self { token0: token0.into(), token1: token1.into(), decimals, quote_decimals: None, via: None }
    }

    pub fn via(mut self, asset: impl Into<String>) -> Self {
        self.via = Some(asset.into());
        self
    }

    pub fn with_quote_decimals(mut self, decimals: i32) -> Self {
        self.quote_decimals = Some(decimals);
        self
    }

    /// The pair a recorded price is stored under.
    pub fn pair(&self) -> AssetPair {
        AssetPair::new(self.token0.clone(), self.token1.clone())
    }

    pub fn output_decimals(&self) -> i32 {
        self.quote_decimals.unwrap_or(self.decimals)
    }

    /// Pool hops from token0 to token1, through `via` when configured.
    pub fn route(&self) -> Vec<AssetPair> {
        match &self.via {
            Some(via) => vec![
                AssetPair::new(self.token0.clone(), via.clone()),
                AssetPair::new(via.clone(), self.token1.clone()),
            ],
            None => vec![self.pair()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_matching_ignores_case() {
        let a = AssetPair::new("0xAbC", "WETH");
        assert!(a.matches(&AssetPair::new("0xabc", "weth")));
        assert!(!a.matches(&a.reversed()));
    }

    #[test]
    fn route_goes_through_intermediate() {
        let item = WatchItem::new("ndx", "dai", 18).via("weth");
        let route = item.route();
        assert_eq!(route, vec![AssetPair::new("ndx", "weth"), AssetPair::new("weth", "dai")]);
        assert_eq!(item.pair(), AssetPair::new("ndx", "dai"));
    }
}
