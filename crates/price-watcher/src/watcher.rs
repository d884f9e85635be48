//! Background sampler: prices every watch item on a fixed interval and
//! appends the results to the price store.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::data_management::store::PriceStore;
use crate::engine::quoting::PairQuoter;
use crate::types::{PriceWatcherError, Result, WatchItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceState::Idle => "idle",
            ServiceState::Running => "running",
            ServiceState::Stopping => "stopping",
            ServiceState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Outcome of one pass over the watch items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub recorded: usize,
    pub failed: usize,
}

struct Sampler {
    quoter: PairQuoter,
    store: Arc<dyn PriceStore>,
    items: Vec<WatchItem>,
}

impl Sampler {
    async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();
        for item in &self.items {
            let pair = item.pair();
            let price = match self.quoter.quote_item(item).await {
                Ok(price) => price,
                Err(e) => {
                    warn!(%pair, error = %e, transient = e.is_transient(), "failed to price pair");
                    report.failed += 1;
                    continue;
                }
            };
            match self.store.insert(&pair, price) {
                Ok(point) => {
                    info!(%pair, %price, id = point.id, "recorded price");
                    report.recorded += 1;
                }
                Err(e) => {
                    warn!(%pair, %price, error = %e, "failed to store price");
                    report.failed += 1;
                }
            }
        }
        report
    }
}

async fn run(sampler: Arc<Sampler>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            // a dropped sender also ends the loop
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }
        if *shutdown.borrow() {
            break;
        }
        let report = sampler.tick().await;
        debug!(recorded = report.recorded, failed = report.failed, "tick complete");
    }
    debug!("watcher loop exited");
}

/// Owns the sampling task. Not restartable: once stopped, build a new one.
pub struct WatcherService {
    sampler: Arc<Sampler>,
    interval: Duration,
    state: ServiceState,
    shutdown: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl WatcherService {
    pub fn new(quoter: PairQuoter, store: Arc<dyn PriceStore>, interval: Duration, items: Vec<WatchItem>) -> Self {
        Self {
            sampler: Arc::new(Sampler { quoter, store, items }),
            interval,
            state: ServiceState::Idle,
            shutdown: None,
            handle: None,
        }
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn items(&self) -> &[WatchItem] {
        &self.sampler.items
    }

    /// Spawn the sampling task. The first tick fires one interval from now.
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        if self.state != ServiceState::Idle {
            return Err(PriceWatcherError::InvalidState(format!("cannot start a {} watcher", self.state)));
        }
        if self.interval.is_zero() {
            return Err(PriceWatcherError::Config("tick interval must be positive".to_string()));
        }
        let (tx, rx) = watch::channel(false);
        self.handle = Some(tokio::spawn(run(self.sampler.clone(), self.interval, rx)));
        self.shutdown = Some(tx);
        self.state = ServiceState::Running;
        info!(items = self.sampler.items.len(), interval = ?self.interval, "watcher started");
        Ok(())
    }

    /// Signal the task and wait for it. A tick already in progress finishes
    /// first; nothing is written after this returns.
    pub async fn stop(&mut self) {
        match self.state {
            ServiceState::Stopped => return,
            ServiceState::Idle => {
                self.state = ServiceState::Stopped;
                return;
            }
            ServiceState::Running | ServiceState::Stopping => {}
        }
        self.state = ServiceState::Stopping;
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "watcher task ended abnormally");
            }
        }
        self.state = ServiceState::Stopped;
        info!("watcher stopped");
    }

    /// Run a single tick on the caller's task.
    pub async fn run_tick(&self) -> TickReport {
        let report = self.sampler.tick().await;
        debug!(recorded = report.recorded, failed = report.failed, "tick complete");
        report
    }
}

impl Drop for WatcherService {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }
    }
}
