//! Live quotes for configured watch items.

use std::sync::Arc;

use num_bigint::BigUint;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::data_management::reserves::ReserveSource;
use crate::engine::fixed_point::{to_base_units, to_decimal};
use crate::engine::pricing::PairPricer;
use crate::types::{AssetPair, PriceWatcherError, Reserves, Result, WatchItem};

/// Result of selling one whole base token along an item's route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairQuote {
    pub pair: AssetPair,
    pub route: Vec<AssetPair>,
    /// One base token in base units.
    pub amount_in: String,
    /// What the route pays out, in quote base units.
    pub amount_out: String,
    /// `amount_out` scaled to whole quote tokens; the value the watcher records.
    pub price: Decimal,
    /// Fee-free marginal price in whole tokens.
    pub spot_price: Decimal,
}

/// Fetches reserves for every hop of a route and prices it.
#[derive(Clone)]
pub struct PairQuoter {
    source: Arc<dyn ReserveSource>,
    pricer: PairPricer,
}

fn exponent(value: i32) -> Result<u32> {
    u32::try_from(value).map_err(|_| PriceWatcherError::InvalidExponent(value))
}

impl PairQuoter {
    pub fn new(source: Arc<dyn ReserveSource>, pricer: PairPricer) -> Self {
        Self { source, pricer }
    }

    pub fn pricer(&self) -> PairPricer {
        self.pricer
    }

    pub fn source(&self) -> Arc<dyn ReserveSource> {
        self.source.clone()
    }

    /// Reserves for each hop, fetched one after the other.
    pub async fn route_reserves(&self, route: &[AssetPair]) -> Result<Vec<Reserves>> {
        let mut hops = Vec::with_capacity(route.len());
        for pair in route {
            hops.push(self.source.get_reserves(pair).await?);
        }
        Ok(hops)
    }

    pub async fn quote(&self, item: &WatchItem) -> Result<PairQuote> {
        let amount_in = to_base_units("1", item.decimals)?;
        let output_decimals = item.output_decimals();
        let route = item.route();
        let hops = self.route_reserves(&route).await?;

        let amount_out: BigUint = self.pricer.route_exchange_amount(&amount_in, &hops)?;
        let price = to_decimal(&amount_out, output_decimals)?;
        let spot_price =
            self.pricer
                .scaled_route_spot_price(&hops, exponent(item.decimals)?, exponent(output_decimals)?)?;

        Ok(PairQuote {
            pair: item.pair(),
            route,
            amount_in: amount_in.to_string(),
            amount_out: amount_out.to_string(),
            price,
            spot_price,
        })
    }

    /// Price of one whole `token0` in `token1`, after pool fees.
    pub async fn quote_item(&self, item: &WatchItem) -> Result<Decimal> {
        Ok(self.quote(item).await?.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_management::reserves::StaticReserveSource;

    const ETH: u128 = 1_000_000_000_000_000_000;

    fn quoter() -> PairQuoter {
        let source = StaticReserveSource::new()
            .with_pool(AssetPair::new("ndx", "weth"), Reserves::new(100_000 * ETH, 1_000 * ETH))
            .with_pool(AssetPair::new("weth", "dai"), Reserves::new(1_000 * ETH, 2_000_000 * ETH));
        PairQuoter::new(Arc::new(source), PairPricer::default())
    }

    #[tokio::test]
    async fn two_hop_quote_is_close_to_spot() {
        let quote = quoter().quote(&WatchItem::new("ndx", "dai", 18).via("weth")).await.unwrap();
        assert_eq!(quote.spot_price, Decimal::from(20));
        // two 0.3% fees and a little slippage
        assert!(quote.price < quote.spot_price);
        assert!(quote.price > Decimal::new(1985, 2));
        assert_eq!(quote.route.len(), 2);
    }

    #[tokio::test]
    async fn missing_hop_propagates_unsupported_pair() {
        let err = quoter().quote_item(&WatchItem::new("ndx", "usdc", 18).via("weth")).await.unwrap_err();
        assert_eq!(err, PriceWatcherError::UnsupportedPair("weth-usdc".to_string()));
    }

    #[tokio::test]
    async fn negative_decimals_are_rejected() {
        let err = quoter().quote_item(&WatchItem::new("weth", "dai", -1)).await.unwrap_err();
        assert_eq!(err, PriceWatcherError::InvalidExponent(-1));
    }
}
