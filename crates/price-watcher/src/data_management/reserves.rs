//! Reserve sources: where raw pool reserves come from.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use num_bigint::BigUint;
use serde::Deserialize;

use crate::types::{AssetPair, PriceWatcherError, Reserves, Result};

/// Supplies reserves for an ordered pair, `reserve_in` belonging to `pair.base`.
#[async_trait]
pub trait ReserveSource: Send + Sync {
    async fn get_reserves(&self, pair: &AssetPair) -> Result<Reserves>;
}

/// In-memory reserves keyed by case-insensitive pair. A lookup for the
/// reversed direction is answered by swapping the stored reserves.
#[derive(Default)]
pub struct StaticReserveSource {
    pools: RwLock<HashMap<(String, String), Reserves>>,
}

#[derive(Debug, Deserialize)]
struct PoolFixture {
    base: String,
    quote: String,
    reserve_base: String,
    reserve_quote: String,
}

#[derive(Debug, Deserialize)]
struct FixtureFile {
    #[serde(default)]
    pools: Vec<PoolFixture>,
}

impl StaticReserveSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pool(self, pair: AssetPair, reserves: Reserves) -> Self {
        self.set_reserves(&pair, reserves);
        self
    }

    /// Load `[[pools]]` entries (`base`, `quote`, `reserve_base`, `reserve_quote`)
    /// from a TOML file. Reserves are decimal integer strings.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(&path).map_err(|e| {
            PriceWatcherError::Config(format!("unable to read reserves file {}: {}", path.as_ref().display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: FixtureFile =
            toml::from_str(text).map_err(|e| PriceWatcherError::Config(format!("invalid reserves file: {}", e)))?;
        let source = Self::new();
        for pool in file.pools {
            let parse = |raw: &str| {
                BigUint::parse_bytes(raw.trim().as_bytes(), 10)
                    .ok_or_else(|| PriceWatcherError::Config(format!("invalid reserve amount {:?}", raw)))
            };
            let reserves = Reserves::new(parse(&pool.reserve_base)?, parse(&pool.reserve_quote)?);
            source.set_reserves(&AssetPair::new(pool.base, pool.quote), reserves);
        }
        Ok(source)
    }

    pub fn set_reserves(&self, pair: &AssetPair, reserves: Reserves) {
        // A poisoned lock only means a writer panicked mid-insert; the map is still usable.
        let mut pools = self.pools.write().unwrap_or_else(|e| e.into_inner());
        pools.remove(&pair.reversed().key());
        pools.insert(pair.key(), reserves);
    }

    pub fn remove(&self, pair: &AssetPair) {
        let mut pools = self.pools.write().unwrap_or_else(|e| e.into_inner());
        pools.remove(&pair.key());
        pools.remove(&pair.reversed().key());
    }

    pub fn len(&self) -> usize {
        self.pools.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, pair: &AssetPair) -> Option<Reserves> {
        let pools = self.pools.read().unwrap_or_else(|e| e.into_inner());
        if let Some(reserves) = pools.get(&pair.key()) {
            return Some(reserves.clone());
        }
        pools.get(&pair.reversed().key()).map(Reserves::flipped)
    }
}

#[async_trait]
impl ReserveSource for StaticReserveSource {
    async fn get_reserves(&self, pair: &AssetPair) -> Result<Reserves> {
        self.lookup(pair).ok_or_else(|| PriceWatcherError::UnsupportedPair(pair.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn answers_both_directions() {
        let source = StaticReserveSource::new().with_pool(AssetPair::new("NDX", "WETH"), Reserves::new(400u32, 2u32));
        let forward = source.get_reserves(&AssetPair::new("ndx", "weth")).await.unwrap();
        assert_eq!(forward, Reserves::new(400u32, 2u32));
        let backward = source.get_reserves(&AssetPair::new("weth", "ndx")).await.unwrap();
        assert_eq!(backward, Reserves::new(2u32, 400u32));
    }

    #[tokio::test]
    async fn unknown_pair_is_unsupported() {
        let source = StaticReserveSource::new();
        let err = source.get_reserves(&AssetPair::new("a", "b")).await.unwrap_err();
        assert_eq!(err, PriceWatcherError::UnsupportedPair("a-b".to_string()));
    }

    #[tokio::test]
    async fn loads_toml_fixture() {
        let source = StaticReserveSource::from_toml_str(
            r#"
            [[pools]]
            base = "weth"
            quote = "dai"
            reserve_base = "1000000000000000000000"
            reserve_quote = "2000000000000000000000000"
            "#,
        )
        .unwrap();
        assert_eq!(source.len(), 1);
        let reserves = source.get_reserves(&AssetPair::new("dai", "weth")).await.unwrap();
        assert_eq!(reserves.reserve_out, BigUint::parse_bytes(b"1000000000000000000000", 10).unwrap());
    }

    #[test]
    fn rejects_bad_fixture_amount() {
        let err = StaticReserveSource::from_toml_str(
            "[[pools]]\nbase = \"a\"\nquote = \"b\"\nreserve_base = \"12x\"\nreserve_quote = \"1\"\n",
        )
        .err()
        .unwrap();
        assert!(matches!(err, PriceWatcherError::Config(_)));
    }
}
