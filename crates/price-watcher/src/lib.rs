// Library entry point for price-watcher

pub mod config;
pub mod data_management;
pub mod engine;
pub mod types;
pub mod watcher;

#[cfg(feature = "api")]
pub mod api;

pub use config::AppConfig;
pub use data_management::{CsvPriceStore, MemoryPriceStore, PriceStore, ReserveSource, StaticReserveSource, TokenRegistry};
pub use engine::{PairPricer, PairQuoter, WindowAggregator};
pub use types::{AssetPair, PricePoint, PriceWatcherError, Reserves, Result, WatchItem};
pub use watcher::{ServiceState, TickReport, WatcherService};
