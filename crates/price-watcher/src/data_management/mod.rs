//! Reserve sources, price storage and token resolution.

pub mod history;
pub mod reserves;
#[cfg(feature = "rpc")]
pub mod rpc;
pub mod store;
pub mod tokens;

pub use history::CsvPriceStore;
pub use reserves::{ReserveSource, StaticReserveSource};
#[cfg(feature = "rpc")]
pub use rpc::JsonRpcReserveSource;
pub use store::{MemoryPriceStore, PriceStore};
pub use tokens::{load_token_list, TokenRegistry};
