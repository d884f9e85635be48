//! Price storage interface and the in-memory implementation.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::types::{AssetPair, PricePoint, PriceWatcherError, Result};

/// Append-only price history.
///
/// Implementations assign `id` and `created_at` on insert. `created_at` is the
/// wall-clock time of the insert, never later, and `id` orders points that
/// share a timestamp.
pub trait PriceStore: Send + Sync {
    fn insert(&self, pair: &AssetPair, price: Decimal) -> Result<PricePoint>;

    /// Most recent point for the pair, or `NotFound`.
    fn last_for_pair(&self, pair: &AssetPair) -> Result<PricePoint>;

    /// Every point for the pair, oldest first.
    fn all_for_pair(&self, pair: &AssetPair) -> Result<Vec<PricePoint>>;

    /// Points with `start <= created_at <= end`, oldest first.
    fn in_range(&self, pair: &AssetPair, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<PricePoint>>;
}

/// Ordered point log shared by the store implementations.
#[derive(Debug, Default)]
pub(crate) struct PriceLog {
    points: Vec<PricePoint>,
    next_id: u64,
}

impl PriceLog {
    /// Record a new observation stamped `now`. Earlier points stamped later
    /// than `now` (backfills, a clock stepped back) do not move it forward.
    pub(crate) fn append(&mut self, pair: &AssetPair, price: Decimal, now: DateTime<Utc>) -> PricePoint {
        self.push_point(pair.clone(), price, now)
    }

    /// Id the next appended point will receive.
    pub(crate) fn peek_id(&self) -> u64 {
        self.next_id + 1
    }

    pub(crate) fn push_point(&mut self, pair: AssetPair, price: Decimal, created_at: DateTime<Utc>) -> PricePoint {
        self.next_id += 1;
        let point = PricePoint { id: self.next_id, pair, price, created_at };
        self.restore(point.clone());
        point
    }

    /// Re-insert a point that already carries an id, e.g. one read back from disk.
    pub(crate) fn restore(&mut self, point: PricePoint) {
        self.next_id = self.next_id.max(point.id);
        self.points.push(point);
    }

    pub(crate) fn len(&self) -> usize {
        self.points.len()
    }

    fn sorted<'a>(&self, iter: impl Iterator<Item = &'a PricePoint>) -> Vec<PricePoint> {
        let mut out: Vec<PricePoint> = iter.cloned().collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        out
    }

    pub(crate) fn all_for_pair(&self, pair: &AssetPair) -> Vec<PricePoint> {
        self.sorted(self.points.iter().filter(|p| p.pair.matches(pair)))
    }

    pub(crate) fn in_range(&self, pair: &AssetPair, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<PricePoint> {
        self.sorted(
            self.points
                .iter()
                .filter(|p| p.pair.matches(pair) && p.created_at >= start && p.created_at <= end),
        )
    }

    pub(crate) fn last_for_pair(&self, pair: &AssetPair) -> Result<PricePoint> {
        self.points
            .iter()
            .filter(|p| p.pair.matches(pair))
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            .cloned()
            .ok_or_else(|| PriceWatcherError::NotFound(pair.to_string()))
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| PriceWatcherError::Store("price store lock poisoned".to_string()))
}

/// Volatile store, lost on drop. Used in tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryPriceStore {
    log: Mutex<PriceLog>,
}

impl MemoryPriceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert with an explicit timestamp, for backfilling history. The id is
    /// still assigned by the store.
    pub fn insert_at(&self, pair: &AssetPair, price: Decimal, created_at: DateTime<Utc>) -> Result<PricePoint> {
        Ok(lock(&self.log)?.push_point(pair.clone(), price, created_at))
    }

    pub fn len(&self) -> usize {
        lock(&self.log).map(|log| log.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PriceStore for MemoryPriceStore {
    fn insert(&self, pair: &AssetPair, price: Decimal) -> Result<PricePoint> {
        Ok(lock(&self.log)?.append(pair, price, Utc::now()))
    }

    fn last_for_pair(&self, pair: &AssetPair) -> Result<PricePoint> {
        lock(&self.log)?.last_for_pair(pair)
    }

    fn all_for_pair(&self, pair: &AssetPair) -> Result<Vec<PricePoint>> {
        Ok(lock(&self.log)?.all_for_pair(pair))
    }

    fn in_range(&self, pair: &AssetPair, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<PricePoint>> {
        Ok(lock(&self.log)?.in_range(pair, start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn equal_timestamps_order_by_id() {
        let mut log = PriceLog::default();
        let pair = AssetPair::new("a", "b");
        let now = Utc::now();
        let first = log.append(&pair, Decimal::ONE, now);
        let second = log.append(&pair, Decimal::TWO, now);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.id > first.id);
        assert_eq!(log.last_for_pair(&pair).unwrap().price, Decimal::TWO);
    }

    #[test]
    fn future_point_does_not_drag_new_inserts_forward() {
        let mut log = PriceLog::default();
        let pair = AssetPair::new("a", "b");
        let now = Utc::now();
        log.push_point(pair.clone(), Decimal::ONE, now + Duration::hours(2));
        let point = log.append(&pair, Decimal::TWO, now);
        assert_eq!(point.created_at, now);
        assert_eq!(log.in_range(&pair, now - Duration::days(1), now), vec![point]);
    }

    #[test]
    fn peek_matches_next_append() {
        let mut log = PriceLog::default();
        let pair = AssetPair::new("a", "b");
        let peeked = log.peek_id();
        assert_eq!(log.append(&pair, Decimal::ONE, Utc::now()).id, peeked);
    }

    #[test]
    fn restore_advances_id_sequence() {
        let mut log = PriceLog::default();
        let pair = AssetPair::new("a", "b");
        log.restore(PricePoint { id: 41, pair: pair.clone(), price: Decimal::ONE, created_at: Utc::now() });
        let next = log.append(&pair, Decimal::ONE, Utc::now());
        assert_eq!(next.id, 42);
    }

    #[test]
    fn range_is_inclusive() {
        let store = MemoryPriceStore::new();
        let pair = AssetPair::new("a", "b");
        let t = Utc::now();
        store.insert_at(&pair, Decimal::ONE, t - Duration::days(2)).unwrap();
        store.insert_at(&pair, Decimal::TWO, t).unwrap();
        let points = store.in_range(&pair, t - Duration::days(2), t).unwrap();
        assert_eq!(points.len(), 2);
        let points = store.in_range(&pair, t - Duration::days(1), t).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].price, Decimal::TWO);
    }

    #[test]
    fn missing_pair_is_not_found() {
        let store = MemoryPriceStore::new();
        assert!(matches!(store.last_for_pair(&AssetPair::new("x", "y")), Err(PriceWatcherError::NotFound(_))));
    }
}
