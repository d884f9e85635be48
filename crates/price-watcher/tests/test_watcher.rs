//! Watcher lifecycle and tick behaviour, on a paused clock.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use price_watcher::data_management::{MemoryPriceStore, PriceStore, ReserveSource, StaticReserveSource};
use price_watcher::engine::{PairPricer, PairQuoter};
use price_watcher::{AssetPair, PricePoint, PriceWatcherError, Reserves, ServiceState, TickReport, WatchItem, WatcherService};
use rust_decimal::Decimal;

const ETH: u128 = 1_000_000_000_000_000_000;
const PERIOD: Duration = Duration::from_secs(5);

fn pools() -> StaticReserveSource {
    StaticReserveSource::new()
        .with_pool(AssetPair::new("weth", "dai"), Reserves::new(1_000 * ETH, 2_000_000 * ETH))
        .with_pool(AssetPair::new("ndx", "weth"), Reserves::new(100_000 * ETH, 1_000 * ETH))
}

fn quoter() -> PairQuoter {
    PairQuoter::new(Arc::new(pools()), PairPricer::default())
}

/// Node that takes a while to answer every reserve request.
struct SlowSource {
    inner: StaticReserveSource,
    delay: Duration,
}

#[async_trait]
impl ReserveSource for SlowSource {
    async fn get_reserves(&self, pair: &AssetPair) -> price_watcher::Result<Reserves> {
        tokio::time::sleep(self.delay).await;
        self.inner.get_reserves(pair).await
    }
}

fn service(store: Arc<dyn PriceStore>, items: Vec<WatchItem>) -> WatcherService {
    WatcherService::new(quoter(), store, PERIOD, items)
}

#[tokio::test(start_paused = true)]
async fn records_once_per_interval() {
    let store = Arc::new(MemoryPriceStore::new());
    let mut watcher = service(store.clone(), vec![WatchItem::new("weth", "dai", 18)]);
    watcher.start().unwrap();
    assert_eq!(watcher.state(), ServiceState::Running);

    // no tick at start
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(store.len(), 0);

    tokio::time::sleep(Duration::from_secs(12)).await;
    assert_eq!(store.len(), 3);

    watcher.stop().await;
    assert_eq!(watcher.state(), ServiceState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn nothing_is_written_after_stop() {
    let store = Arc::new(MemoryPriceStore::new());
    let mut watcher = service(store.clone(), vec![WatchItem::new("weth", "dai", 18)]);
    watcher.start().unwrap();
    tokio::time::sleep(Duration::from_secs(11)).await;
    watcher.stop().await;
    let recorded = store.len();
    assert_eq!(recorded, 2);

    tokio::time::sleep(PERIOD * 10).await;
    assert_eq!(store.len(), recorded);
}

#[tokio::test(start_paused = true)]
async fn items_are_priced_in_configured_order() {
    let store = Arc::new(MemoryPriceStore::new());
    let items = vec![WatchItem::new("ndx", "dai", 18).via("weth"), WatchItem::new("weth", "dai", 18)];
    let watcher = service(store.clone(), items);
    let report = watcher.run_tick().await;
    assert_eq!(report, TickReport { recorded: 2, failed: 0 });

    let ndx = store.last_for_pair(&AssetPair::new("ndx", "dai")).unwrap();
    let weth = store.last_for_pair(&AssetPair::new("weth", "dai")).unwrap();
    assert!(ndx.id < weth.id);
    assert!(ndx.price > Decimal::new(19, 0) && ndx.price < Decimal::new(20, 0));
    assert!(weth.price > Decimal::new(1990, 0) && weth.price < Decimal::new(2000, 0));
}

#[tokio::test(start_paused = true)]
async fn failing_item_does_not_abort_tick() {
    let store = Arc::new(MemoryPriceStore::new());
    let items = vec![WatchItem::new("cc10", "dai", 18).via("weth"), WatchItem::new("weth", "dai", 18)];
    let watcher = service(store.clone(), items);
    assert_eq!(watcher.run_tick().await, TickReport { recorded: 1, failed: 1 });
    assert_eq!(store.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn cannot_start_twice_or_restart() {
    let store = Arc::new(MemoryPriceStore::new());
    let mut watcher = service(store, vec![]);
    watcher.start().unwrap();
    assert!(matches!(watcher.start(), Err(PriceWatcherError::InvalidState(_))));
    watcher.stop().await;
    watcher.stop().await;
    assert_eq!(watcher.state(), ServiceState::Stopped);
    assert!(matches!(watcher.start(), Err(PriceWatcherError::InvalidState(_))));
}

#[tokio::test]
async fn stop_before_start_is_terminal() {
    let mut watcher = service(Arc::new(MemoryPriceStore::new()), vec![]);
    assert_eq!(watcher.state(), ServiceState::Idle);
    watcher.stop().await;
    assert_eq!(watcher.state(), ServiceState::Stopped);
    assert!(watcher.start().is_err());
}

#[tokio::test]
async fn zero_interval_is_rejected() {
    let mut watcher = WatcherService::new(quoter(), Arc::new(MemoryPriceStore::new()), Duration::ZERO, vec![]);
    assert!(matches!(watcher.start(), Err(PriceWatcherError::Config(_))));
    assert_eq!(watcher.state(), ServiceState::Idle);
}

/// Store whose writes always fail.
#[derive(Default)]
struct BrokenStore {
    attempts: AtomicUsize,
}

impl PriceStore for BrokenStore {
    fn insert(&self, _pair: &AssetPair, _price: Decimal) -> price_watcher::Result<PricePoint> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(PriceWatcherError::Store("disk full".to_string()))
    }

    fn last_for_pair(&self, pair: &AssetPair) -> price_watcher::Result<PricePoint> {
        Err(PriceWatcherError::NotFound(pair.to_string()))
    }

    fn all_for_pair(&self, _pair: &AssetPair) -> price_watcher::Result<Vec<PricePoint>> {
        Ok(Vec::new())
    }

    fn in_range(
        &self,
        _pair: &AssetPair,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> price_watcher::Result<Vec<PricePoint>> {
        Ok(Vec::new())
    }
}

#[tokio::test(start_paused = true)]
async fn store_failures_are_counted_and_survived() {
    let store = Arc::new(BrokenStore::default());
    let items = vec![WatchItem::new("weth", "dai", 18), WatchItem::new("ndx", "weth", 18)];
    let mut watcher = service(store.clone(), items);
    watcher.start().unwrap();
    tokio::time::sleep(Duration::from_secs(11)).await;
    watcher.stop().await;
    assert_eq!(store.attempts.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn stop_lets_in_flight_tick_finish() {
    let store = Arc::new(MemoryPriceStore::new());
    let source = SlowSource { inner: pools(), delay: Duration::from_secs(2) };
    let quoter = PairQuoter::new(Arc::new(source), PairPricer::default());
    let items = vec![WatchItem::new("weth", "dai", 18), WatchItem::new("ndx", "weth", 18)];
    let mut watcher = WatcherService::new(quoter, store.clone(), PERIOD, items);
    watcher.start().unwrap();

    // first tick starts at 5s and needs 4s for both items
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(store.len(), 0);

    watcher.stop().await;
    assert_eq!(watcher.state(), ServiceState::Stopped);
    assert_eq!(store.len(), 2);

    tokio::time::sleep(PERIOD * 10).await;
    assert_eq!(store.len(), 2);
}
