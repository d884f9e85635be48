//! Configuration loading, env vars, CLI flags.

use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

#[cfg(feature = "cli")]
use clap::Args;

use crate::data_management::tokens::{load_token_list, TokenRegistry};
use crate::engine::pricing::DEFAULT_FEE_BPS;
use crate::types::{PriceWatcherError, Result, WatchItem};

pub const UNISWAP_V2_FACTORY: &str = "0x5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f";
pub const UNISWAP_V2_INIT_CODE_HASH: &str = "0x96e8ac4277198ff8b6f785478aa9a39f403cb768dd02cbee326c3e7da348845f";
pub const INFURA_HTTP_URL: &str = "https://mainnet.infura.io/v3/";
pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_PRICE_HISTORY_FILE: &str = "price_history.csv";

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub rpc_url: Option<String>,
    pub infura_api_key: Option<String>,
    pub tick_interval_secs: u64,
    pub price_history_file: String,
    pub fee_bps: u32,
    pub factory_address: String,
    pub init_code_hash: String,
    pub tokens: HashMap<String, String>,
    pub tokens_file: Option<String>,
    /// Serve reserves from a TOML fixture instead of a node.
    pub reserves_file: Option<String>,
    pub watchers: Vec<WatchItem>,
}

/// On-disk shape; every key is optional.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileConfig {
    pub rpc_url: Option<String>,
    pub infura_api_key: Option<String>,
    pub tick_interval_secs: Option<u64>,
    pub price_history_file: Option<String>,
    pub fee_bps: Option<u32>,
    pub factory_address: Option<String>,
    pub init_code_hash: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tokens: HashMap<String, String>,
    pub tokens_file: Option<String>,
    pub reserves_file: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub watchers: Vec<WatchItem>,
}

impl FileConfig {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(&path).map_err(|e| {
            PriceWatcherError::Config(format!("unable to read config {}: {}", path.as_ref().display(), e))
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| PriceWatcherError::Config(format!("invalid config: {}", e)))
    }

    /// Values taken from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        Self {
            rpc_url: lookup("RPC_URL"),
            infura_api_key: lookup("INFURA_API_KEY"),
            tick_interval_secs: lookup("TICK_INTERVAL_SECS").and_then(|s| s.parse().ok()),
            price_history_file: lookup("PRICE_HISTORY_FILE"),
            fee_bps: lookup("FEE_BPS").and_then(|s| s.parse().ok()),
            tokens_file: lookup("TOKENS_FILE"),
            reserves_file: lookup("RESERVES_FILE"),
            ..Self::default()
        }
    }
}

#[cfg(feature = "cli")]
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    pub config: Option<String>,
    #[arg(long, global = true)]
    pub rpc_url: Option<String>,
    #[arg(long, global = true)]
    pub infura_api_key: Option<String>,
    #[arg(long, global = true)]
    pub tick_interval_secs: Option<u64>,
    #[arg(long, global = true)]
    pub price_history_file: Option<String>,
    #[arg(long, global = true)]
    pub fee_bps: Option<u32>,
    #[arg(long, global = true)]
    pub tokens_file: Option<String>,
    #[arg(long, global = true)]
    pub reserves_file: Option<String>,
}

#[cfg(feature = "cli")]
impl ConfigArgs {
    fn overrides(&self) -> FileConfig {
        FileConfig {
            rpc_url: self.rpc_url.clone(),
            infura_api_key: self.infura_api_key.clone(),
            tick_interval_secs: self.tick_interval_secs,
            price_history_file: self.price_history_file.clone(),
            fee_bps: self.fee_bps,
            tokens_file: self.tokens_file.clone(),
            reserves_file: self.reserves_file.clone(),
            ..FileConfig::default()
        }
    }
}

impl AppConfig {
    /// Environment and defaults only.
    pub fn load() -> Self {
        Self::merge(FileConfig::default(), FileConfig::default(), FileConfig::from_env())
    }

    /// CLI flags over the config file over the environment over defaults.
    #[cfg(feature = "cli")]
    pub fn load_with_args(args: &ConfigArgs) -> Result<Self> {
        let file_config = match args.config {
            Some(ref path) => FileConfig::from_path(path)?,
            None => FileConfig::default(),
        };
        let config = Self::merge(args.overrides(), file_config, FileConfig::from_env());
        config.validate()?;
        Ok(config)
    }

    /// Field by field, the first source that sets a value wins. Tables
    /// (`tokens`, `watchers`) come from the file only.
    pub fn merge(cli: FileConfig, file: FileConfig, env: FileConfig) -> Self {
        let rpc_url = cli.rpc_url.or(file.rpc_url).or(env.rpc_url);
        let infura_api_key = cli.infura_api_key.or(file.infura_api_key).or(env.infura_api_key);
        if rpc_url.is_none() && infura_api_key.is_none() {
            info!("Neither RPC_URL nor INFURA_API_KEY set. Live reserves unavailable without a reserves file.");
        }
        Self {
            rpc_url,
            infura_api_key,
            tick_interval_secs: cli
                .tick_interval_secs
                .or(file.tick_interval_secs)
                .or(env.tick_interval_secs)
                .unwrap_or(DEFAULT_TICK_INTERVAL_SECS),
            price_history_file: cli
                .price_history_file
                .or(file.price_history_file)
                .or(env.price_history_file)
                .unwrap_or_else(|| DEFAULT_PRICE_HISTORY_FILE.to_string()),
            fee_bps: cli.fee_bps.or(file.fee_bps).or(env.fee_bps).unwrap_or(DEFAULT_FEE_BPS),
            factory_address: file.factory_address.unwrap_or_else(|| UNISWAP_V2_FACTORY.to_string()),
            init_code_hash: file.init_code_hash.unwrap_or_else(|| UNISWAP_V2_INIT_CODE_HASH.to_string()),
            tokens: file.tokens,
            tokens_file: cli.tokens_file.or(file.tokens_file).or(env.tokens_file),
            reserves_file: cli.reserves_file.or(file.reserves_file).or(env.reserves_file),
            watchers: file.watchers,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_secs == 0 {
            return Err(PriceWatcherError::Config("tick_interval_secs must be at least 1".to_string()));
        }
        if self.fee_bps > 10_000 {
            return Err(PriceWatcherError::Config(format!("fee_bps {} exceeds 10000", self.fee_bps)));
        }
        for item in &self.watchers {
            if item.decimals < 0 || item.quote_decimals.map_or(false, |d| d < 0) {
                return Err(PriceWatcherError::Config(format!("negative decimals for watcher {}", item.pair())));
            }
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    /// Explicit `rpc_url`, else the Infura endpoint for the API key.
    pub fn rpc_endpoint(&self) -> Option<String> {
        self.rpc_url
            .clone()
            .or_else(|| self.infura_api_key.as_ref().map(|key| format!("{}{}", INFURA_HTTP_URL, key)))
    }

    /// Mainnet defaults, then the token list file, then the inline table.
    pub fn token_registry(&self) -> Result<TokenRegistry> {
        let mut registry = TokenRegistry::mainnet();
        if let Some(ref path) = self.tokens_file {
            let entries = load_token_list(path).map_err(|e| PriceWatcherError::Config(e.to_string()))?;
            registry.extend(entries);
        }
        registry.extend(self.tokens.clone());
        Ok(registry)
    }

    /// A commented starting point for `gen-config`.
    pub fn example_toml() -> String {
        format!(
            r#"# price-watcher configuration
# rpc_url = "http://localhost:8545"
infura_api_key = "CHANGEME"
tick_interval_secs = {interval}
price_history_file = "{history}"
fee_bps = {fee}
factory_address = "{factory}"
init_code_hash = "{hash}"
# tokens_file = "tokens.json"
# reserves_file = "reserves.toml"

[tokens]
# symbol = "0x..."

[[watchers]]
token0 = "weth"
token1 = "dai"
decimals = 18

[[watchers]]
token0 = "ndx"
token1 = "dai"
decimals = 18
via = "weth"
"#,
            interval = DEFAULT_TICK_INTERVAL_SECS,
            history = DEFAULT_PRICE_HISTORY_FILE,
            fee = DEFAULT_FEE_BPS,
            factory = UNISWAP_V2_FACTORY,
            hash = UNISWAP_V2_INIT_CODE_HASH,
        )
    }

    /// Write [`Self::example_toml`] to `path`, refusing to overwrite.
    pub fn write_example<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if path.exists() {
            return Err(PriceWatcherError::Config(format!("{} already exists", path.display())));
        }
        std::fs::write(path, Self::example_toml())
            .map_err(|e| PriceWatcherError::Config(format!("unable to write {}: {}", path.display(), e)))
    }
}
