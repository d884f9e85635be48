//! Windowed statistics over recorded prices.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use crate::data_management::store::PriceStore;
use crate::types::{AssetPair, PricePoint, PriceWatcherError, Result};

/// Everything the aggregator knows about one window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowSummary {
    pub count: usize,
    pub first: Decimal,
    pub last: Decimal,
    pub min: Decimal,
    pub max: Decimal,
    pub average: Decimal,
    /// `None` when the change is undefined (zero first price) or does not fit.
    pub percent_change: Option<Decimal>,
}

/// Averages and changes over `[now - window_days, now]`, computed on demand
/// from the store. Nothing is cached between queries.
#[derive(Clone)]
pub struct WindowAggregator {
    store: Arc<dyn PriceStore>,
}

/// Bounds of a trailing window ending now.
pub fn window_bounds(window_days: i64, now: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    if window_days < 0 {
        return Err(PriceWatcherError::InvalidWindow(window_days));
    }
    let start = Duration::try_days(window_days)
        .and_then(|span| now.checked_sub_signed(span))
        .ok_or(PriceWatcherError::InvalidWindow(window_days))?;
    Ok((start, now))
}

fn mean(points: &[PricePoint]) -> Result<Decimal> {
    let sum = points
        .iter()
        .try_fold(Decimal::ZERO, |acc, p| acc.checked_add(p.price))
        .ok_or(PriceWatcherError::Overflow)?;
    sum.checked_div(Decimal::from(points.len()))
        .ok_or(PriceWatcherError::Overflow)
}

fn change(points: &[PricePoint]) -> Result<Decimal> {
    let (first, last) = match (points.first(), points.last()) {
        (Some(first), Some(last)) => (first.price, last.price),
        _ => return Ok(Decimal::ZERO),
    };
    if points.len() == 1 {
        return Ok(Decimal::ZERO);
    }
    if first.is_zero() {
        return Err(PriceWatcherError::DivisionByZero);
    }
    (last - first).checked_div(first.abs()).ok_or(PriceWatcherError::Overflow)
}

impl WindowAggregator {
    pub fn new(store: Arc<dyn PriceStore>) -> Self {
        Self { store }
    }

    fn points_between(&self, pair: &AssetPair, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<PricePoint>> {
        let points = self.store.in_range(pair, start, end)?;
        debug!(%pair, %start, %end, points = points.len(), "loaded window");
        if points.is_empty() {
            return Err(PriceWatcherError::NoData(pair.to_string()));
        }
        Ok(points)
    }

    fn trailing(&self, pair: &AssetPair, window_days: i64) -> Result<Vec<PricePoint>> {
        let (start, end) = window_bounds(window_days, Utc::now())?;
        self.points_between(pair, start, end)
    }

    /// Arithmetic mean of every price recorded in the last `window_days`.
    pub fn average(&self, pair: &AssetPair, window_days: i64) -> Result<Decimal> {
        mean(&self.trailing(pair, window_days)?)
    }

    /// `(last - first) / |first|` over the last `window_days`, as a fraction.
    pub fn percent_change(&self, pair: &AssetPair, window_days: i64) -> Result<Decimal> {
        change(&self.trailing(pair, window_days)?)
    }

    pub fn average_between(&self, pair: &AssetPair, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Decimal> {
        mean(&self.points_between(pair, start, end)?)
    }

    pub fn percent_change_between(&self, pair: &AssetPair, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Decimal> {
        change(&self.points_between(pair, start, end)?)
    }

    pub fn last_price(&self, pair: &AssetPair) -> Result<Decimal> {
        Ok(self.store.last_for_pair(pair)?.price)
    }

    pub fn summary(&self, pair: &AssetPair, window_days: i64) -> Result<WindowSummary> {
        let points = self.trailing(pair, window_days)?;
        let prices = points.iter().map(|p| p.price);
        // non-empty, checked by `trailing`
        let min = prices.clone().min().unwrap_or_default();
        let max = prices.max().unwrap_or_default();
        Ok(WindowSummary {
            count: points.len(),
            first: points[0].price,
            last: points[points.len() - 1].price,
            min,
            max,
            average: mean(&points)?,
            percent_change: change(&points).ok(),
        })
    }
}
