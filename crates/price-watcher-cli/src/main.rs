mod cli;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Parser;
use price_watcher::config::AppConfig;
use price_watcher::data_management::{CsvPriceStore, JsonRpcReserveSource, ReserveSource, StaticReserveSource};
use price_watcher::engine::{PairPricer, PairQuoter, WindowAggregator};
use price_watcher::WatcherService;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cli::{Cli, CliHandler, Command, PriceQuery};

/// Fixture file when configured, otherwise the JSON-RPC node.
async fn reserve_source(config: &AppConfig) -> Result<Arc<dyn ReserveSource>> {
    if let Some(ref path) = config.reserves_file {
        info!(path = %path, "serving reserves from file");
        return Ok(Arc::new(StaticReserveSource::from_toml_file(path)?));
    }
    let endpoint = config
        .rpc_endpoint()
        .ok_or_else(|| anyhow!("one of --rpc-url, --infura-api-key or --reserves-file is required"))?;
    let source = JsonRpcReserveSource::new(endpoint, config.token_registry()?)
        .with_factory(&config.factory_address, &config.init_code_hash)?;
    let block = source.block_number().await?;
    info!(block, "connected to ethereum node");
    Ok(Arc::new(source))
}

async fn chain_updater(config: &AppConfig, once: bool) -> Result<()> {
    if config.watchers.is_empty() {
        warn!("no [[watchers]] configured, nothing to record");
    }
    let source = reserve_source(config).await?;
    let store = Arc::new(CsvPriceStore::open(&config.price_history_file)?);
    let quoter = PairQuoter::new(source, PairPricer::new(config.fee_bps));
    let mut watcher = WatcherService::new(quoter, store.clone(), config.tick_interval(), config.watchers.clone());

    if once {
        CliHandler::print_tick(&watcher.run_tick().await);
    } else {
        watcher.start()?;
        tokio::signal::ctrl_c().await?;
        info!("interrupt received, stopping watcher");
        watcher.stop().await;
    }
    store.close()?;
    Ok(())
}

fn price_query(config: &AppConfig, query: PriceQuery) -> Result<()> {
    let store = Arc::new(CsvPriceStore::open(&config.price_history_file)?);
    let aggregator = WindowAggregator::new(store.clone());
    match query {
        PriceQuery::Last(args) => {
            let pair = args.pair();
            CliHandler::print_value("Last price", &pair, aggregator.last_price(&pair)?);
        }
        PriceQuery::Average(args) => {
            let pair = args.pair.pair();
            let value = aggregator.average(&pair, args.window_days)?;
            CliHandler::print_value(&format!("{}-day average", args.window_days), &pair, value);
        }
        PriceQuery::Change(args) => {
            let pair = args.pair.pair();
            let change = aggregator.percent_change(&pair, args.window_days)?;
            CliHandler::print_change(&pair, args.window_days, change);
        }
        PriceQuery::Summary(args) => {
            let pair = args.pair.pair();
            let summary = aggregator.summary(&pair, args.window_days)?;
            CliHandler::print_summary(&pair, args.window_days, &summary);
        }
    }
    store.close()?;
    Ok(())
}

#[cfg(feature = "api")]
async fn serve(config: &AppConfig, addr: &str) -> Result<()> {
    let store = Arc::new(CsvPriceStore::open(&config.price_history_file)?);
    let aggregator = WindowAggregator::new(store.clone());
    price_watcher::api::serve(aggregator, addr, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;
    store.close()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    if cli.startup_sleep > 0 {
        info!(seconds = cli.startup_sleep, "sleeping before startup");
        tokio::time::sleep(Duration::from_secs(cli.startup_sleep)).await;
    }

    match cli.command {
        Command::GenConfig { out } => {
            AppConfig::write_example(&out)?;
            println!("Wrote example config to {}", out);
        }
        Command::ChainUpdater { once } => {
            let config = AppConfig::load_with_args(&cli.config)?;
            chain_updater(&config, once).await?;
        }
        Command::Quote(args) => {
            let config = AppConfig::load_with_args(&cli.config)?;
            let quoter = PairQuoter::new(reserve_source(&config).await?, PairPricer::new(config.fee_bps));
            CliHandler::print_quote(&quoter.quote(&args.watch_item()).await?);
        }
        Command::Price(query) => {
            let config = AppConfig::load_with_args(&cli.config)?;
            price_query(&config, query)?;
        }
        #[cfg(feature = "api")]
        Command::Serve { addr } => {
            let config = AppConfig::load_with_args(&cli.config)?;
            serve(&config, &addr).await?;
        }
    }
    Ok(())
}
