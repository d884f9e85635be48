pub mod analytics;
pub mod fixed_point;
pub mod pricing;
pub mod quoting;

pub use analytics::{WindowAggregator, WindowSummary};
pub use pricing::PairPricer;
pub use quoting::{PairQuote, PairQuoter};
