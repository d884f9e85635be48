//! CLI arguments and output formatting.

use clap::{Args, Parser, Subcommand};
use price_watcher::config::ConfigArgs;
use price_watcher::engine::{PairQuote, WindowSummary};
use price_watcher::{AssetPair, TickReport, WatchItem};
use rust_decimal::Decimal;

#[derive(Parser, Debug)]
#[command(author, version, about = "Samples Uniswap V2 prices and queries their history", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub config: ConfigArgs,
    /// Seconds to wait before starting, for containers whose node comes up late
    #[arg(long, global = true, default_value_t = 0)]
    pub startup_sleep: u64,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Record prices for every configured watcher until interrupted
    ChainUpdater {
        /// Run a single tick and exit
        #[arg(long)]
        once: bool,
    },
    /// Write an example config file
    GenConfig {
        #[arg(long, default_value = "config.toml")]
        out: String,
    },
    /// Price one token in another from live reserves
    Quote(QuoteArgs),
    /// Query recorded prices
    #[command(subcommand)]
    Price(PriceQuery),
    /// Serve the price history over HTTP
    #[cfg(feature = "api")]
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct QuoteArgs {
    #[arg(long)]
    pub token0: String,
    #[arg(long)]
    pub token1: String,
    /// Intermediate token for a two-hop route
    #[arg(long)]
    pub via: Option<String>,
    #[arg(long, default_value_t = 18)]
    pub decimals: i32,
    #[arg(long)]
    pub quote_decimals: Option<i32>,
}

impl QuoteArgs {
    pub fn watch_item(&self) -> WatchItem {
        let mut item = WatchItem::new(self.token0.clone(), self.token1.clone(), self.decimals);
        item.via = self.via.clone();
        item.quote_decimals = self.quote_decimals;
        item
    }
}

#[derive(Args, Debug, Clone)]
pub struct PairArgs {
    #[arg(long)]
    pub token0: String,
    #[arg(long)]
    pub token1: String,
}

impl PairArgs {
    pub fn pair(&self) -> AssetPair {
        AssetPair::new(self.token0.clone(), self.token1.clone())
    }
}

#[derive(Args, Debug, Clone)]
pub struct WindowArgs {
    #[command(flatten)]
    pub pair: PairArgs,
    #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
    pub window_days: i64,
}

#[derive(Subcommand, Debug)]
pub enum PriceQuery {
    /// Most recent recorded price
    Last(PairArgs),
    /// Mean price over the window
    Average(WindowArgs),
    /// Relative change from the first to the last price in the window
    Change(WindowArgs),
    /// Count, range, mean and change over the window
    Summary(WindowArgs),
}

/// Formats a fraction as a percentage, or as the bare fraction when scaling
/// it by 100 would overflow.
fn percent(fraction: Decimal) -> String {
    match fraction.checked_mul(Decimal::ONE_HUNDRED) {
        Some(pct) => format!("{}%", pct.round_dp(4)),
        None => format!("{} (fraction)", fraction),
    }
}

/// Handles CLI output.
pub struct CliHandler;

impl CliHandler {
    pub fn print_quote(quote: &PairQuote) {
        let route = std::iter::once(quote.route[0].base.as_str())
            .chain(quote.route.iter().map(|hop| hop.quote.as_str()))
            .collect::<Vec<_>>()
            .join(" -> ");
        println!("Quote for 1 {} in {}:", quote.pair.base, quote.pair.quote);
        println!("- Route: {}", route);
        println!("- Amount In (base units): {}", quote.amount_in);
        println!("- Amount Out (base units): {}", quote.amount_out);
        println!("- Price: {}", quote.price);
        println!("- Spot Price: {}", quote.spot_price);
        if let Some(impact) = (quote.spot_price - quote.price).checked_div(quote.spot_price) {
            println!("- Fee + Slippage: {}", percent(impact));
        }
    }

    pub fn print_value(label: &str, pair: &AssetPair, value: Decimal) {
        println!("{} {}: {}", label, pair, value);
    }

    pub fn print_change(pair: &AssetPair, window_days: i64, change: Decimal) {
        println!("{} change over {} day(s): {}", pair, window_days, percent(change));
    }

    pub fn print_summary(pair: &AssetPair, window_days: i64, summary: &WindowSummary) {
        println!("{} over {} day(s):", pair, window_days);
        println!("- Points: {}", summary.count);
        println!("- First: {}", summary.first);
        println!("- Last: {}", summary.last);
        println!("- Min: {}", summary.min);
        println!("- Max: {}", summary.max);
        println!("- Average: {}", summary.average);
        match summary.percent_change {
            Some(change) => println!("- Change: {}", percent(change)),
            None => println!("- Change: undefined"),
        }
    }

    pub fn print_tick(report: &TickReport) {
        println!("Recorded {} price(s), {} failed", report.recorded, report.failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_scales_and_rounds() {
        assert_eq!(percent(Decimal::new(111775, 6)), "11.1775%");
        assert_eq!(percent(Decimal::new(-25, 2)), "-25.00%");
    }

    #[test]
    fn percent_falls_back_on_overflow() {
        assert_eq!(percent(Decimal::MAX), format!("{} (fraction)", Decimal::MAX));
    }
}
