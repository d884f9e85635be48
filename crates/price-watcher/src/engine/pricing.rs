//! Constant-product pricing over raw pool reserves.

use num_bigint::BigUint;
use num_traits::{One, Zero};
use rust_decimal::Decimal;

use crate::engine::fixed_point::{pow10, ratio_to_decimal};
use crate::types::{PriceWatcherError, Reserves, Result};

/// Uniswap V2 charges 0.3% on the input amount.
pub const DEFAULT_FEE_BPS: u32 = 30;
const BPS_DENOMINATOR: u32 = 10_000;

/// Prices swaps against a constant-product pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairPricer {
    fee_bps: u32,
}

impl Default for PairPricer {
    fn default() -> Self {
        Self { fee_bps: DEFAULT_FEE_BPS }
    }
}

impl PairPricer {
    /// `fee_bps` is clamped to 100%.
    pub fn new(fee_bps: u32) -> Self {
        Self { fee_bps: fee_bps.min(BPS_DENOMINATOR) }
    }

    pub fn fee_bps(&self) -> u32 {
        self.fee_bps
    }

    /// Output of swapping `amount_in` through the pool, as the pair contract
    /// quotes it (`getAmountOut`). Reserves are used in the order given.
    pub fn exchange_amount(&self, amount_in: &BigUint, reserves: &Reserves) -> Result<BigUint> {
        if reserves.reserve_in.is_zero() {
            return Err(PriceWatcherError::DivisionByZero);
        }
        let in_with_fee = amount_in * (BPS_DENOMINATOR - self.fee_bps);
        let numerator = &in_with_fee * &reserves.reserve_out;
        let denominator = &reserves.reserve_in * BPS_DENOMINATOR + in_with_fee;
        if denominator.is_zero() {
            // only reachable with a 100% fee and no input
            return Ok(BigUint::zero());
        }
        Ok(numerator / denominator)
    }

    /// Instantaneous `reserve_out / reserve_in`, no fee or slippage.
    pub fn spot_price(&self, reserves: &Reserves) -> Result<Decimal> {
        ratio_to_decimal(&reserves.reserve_out, &reserves.reserve_in)
    }

    /// Spot price in whole-token units: one base token priced in the quote token.
    pub fn scaled_spot_price(&self, reserves: &Reserves, base_decimals: u32, quote_decimals: u32) -> Result<Decimal> {
        let numerator = &reserves.reserve_out * pow10(base_decimals);
        let denominator = &reserves.reserve_in * pow10(quote_decimals);
        ratio_to_decimal(&numerator, &denominator)
    }

    /// Chain `exchange_amount` over consecutive pools, feeding each output into
    /// the next hop.
    pub fn route_exchange_amount(&self, amount_in: &BigUint, hops: &[Reserves]) -> Result<BigUint> {
        if hops.is_empty() {
            return Err(PriceWatcherError::UnsupportedPair("empty route".to_string()));
        }
        hops.iter().try_fold(amount_in.clone(), |amount, reserves| self.exchange_amount(&amount, reserves))
    }

    /// Product of the spot prices along a route, multiplied exactly before a
    /// single conversion.
    pub fn route_spot_price(&self, hops: &[Reserves]) -> Result<Decimal> {
        let (numerator, denominator) = route_ratio(hops)?;
        ratio_to_decimal(&numerator, &denominator)
    }

    /// [`Self::route_spot_price`] expressed in whole-token units of the first and
    /// last asset on the route.
    pub fn scaled_route_spot_price(&self, hops: &[Reserves], base_decimals: u32, quote_decimals: u32) -> Result<Decimal> {
        let (numerator, denominator) = route_ratio(hops)?;
        ratio_to_decimal(&(numerator * pow10(base_decimals)), &(denominator * pow10(quote_decimals)))
    }
}

fn route_ratio(hops: &[Reserves]) -> Result<(BigUint, BigUint)> {
    if hops.is_empty() {
        return Err(PriceWatcherError::UnsupportedPair("empty route".to_string()));
    }
    let mut numerator = BigUint::one();
    let mut denominator = BigUint::one();
    for reserves in hops {
        if reserves.reserve_in.is_zero() {
            return Err(PriceWatcherError::DivisionByZero);
        }
        numerator *= &reserves.reserve_out;
        denominator *= &reserves.reserve_in;
    }
    Ok((numerator, denominator))
}
