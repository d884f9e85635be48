//! Uniswap V2 reserves over Ethereum JSON-RPC.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use alloy_primitives::{keccak256, Address, B256};
use async_trait::async_trait;
use num_bigint::BigUint;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::{INFURA_HTTP_URL, UNISWAP_V2_FACTORY, UNISWAP_V2_INIT_CODE_HASH};
use crate::data_management::reserves::ReserveSource;
use crate::data_management::tokens::TokenRegistry;
use crate::types::{AssetPair, PriceWatcherError, Reserves, Result};

/// `getReserves()`
const GET_RESERVES_SELECTOR: &str = "0x0902f1ac";

fn transport(e: impl std::fmt::Display) -> PriceWatcherError {
    PriceWatcherError::Transport(e.to_string())
}

fn parse_address(value: &str) -> Result<Address> {
    Address::from_str(value).map_err(|e| PriceWatcherError::Config(format!("invalid address {}: {}", value, e)))
}

/// Deterministic address of the pair contract for two tokens.
pub fn pair_address(factory: Address, init_code_hash: B256, a: Address, b: Address) -> Address {
    let (token0, token1) = if a < b { (a, b) } else { (b, a) };
    let salt = keccak256([token0.as_slice(), token1.as_slice()].concat());
    factory.create2(salt.0, init_code_hash.0)
}

/// Split a `getReserves()` result into `(reserve0, reserve1)`. `None` when the
/// call returned nothing, i.e. no pair contract is deployed.
fn decode_reserves(raw: &str) -> Result<Option<(BigUint, BigUint)>> {
    let bytes = hex::decode(raw.trim_start_matches("0x")).map_err(transport)?;
    if bytes.is_empty() {
        return Ok(None);
    }
    if bytes.len() < 64 {
        return Err(transport(format!("short getReserves result ({} bytes)", bytes.len())));
    }
    Ok(Some((BigUint::from_bytes_be(&bytes[..32]), BigUint::from_bytes_be(&bytes[32..64]))))
}

/// Reads pair reserves straight from the pair contracts.
pub struct JsonRpcReserveSource {
    client: Client,
    url: String,
    factory: Address,
    init_code_hash: B256,
    tokens: TokenRegistry,
    request_id: AtomicU64,
}

impl JsonRpcReserveSource {
    pub fn new(url: impl Into<String>, tokens: TokenRegistry) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            // constants are well-formed literals
            factory: Address::from_str(UNISWAP_V2_FACTORY).unwrap_or_default(),
            init_code_hash: B256::from_str(UNISWAP_V2_INIT_CODE_HASH).unwrap_or_default(),
            tokens,
            request_id: AtomicU64::new(1),
        }
    }

    pub fn infura(api_key: &str, tokens: TokenRegistry) -> Self {
        Self::new(format!("{}{}", INFURA_HTTP_URL, api_key), tokens)
    }

    /// Point at a different V2-style deployment.
    pub fn with_factory(mut self, factory: &str, init_code_hash: &str) -> Result<Self> {
        self.factory = parse_address(factory)?;
        self.init_code_hash = B256::from_str(init_code_hash)
            .map_err(|e| PriceWatcherError::Config(format!("invalid init code hash {}: {}", init_code_hash, e)))?;
        Ok(self)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn resolve(&self, token: &str) -> Result<Address> {
        let address = self
            .tokens
            .resolve(token)
            .ok_or_else(|| PriceWatcherError::UnsupportedPair(format!("unknown token {}", token)))?;
        parse_address(&address)
    }

    pub fn pair_address(&self, pair: &AssetPair) -> Result<Address> {
        let base = self.resolve(&pair.base)?;
        let quote = self.resolve(&pair.quote)?;
        if base == quote {
            return Err(PriceWatcherError::UnsupportedPair(pair.to_string()));
        }
        Ok(pair_address(self.factory, self.init_code_hash, base, quote))
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": self.request_id.fetch_add(1, Ordering::Relaxed),
        });
        let response = self.client.post(&self.url).json(&payload).send().await.map_err(transport)?;
        if !response.status().is_success() {
            return Err(transport(format!("{} returned HTTP {}", method, response.status())));
        }
        let mut body: Value = response.json().await.map_err(transport)?;
        if let Some(error) = body.get("error") {
            let message = error.get("message").and_then(Value::as_str).unwrap_or("unknown error");
            return Err(transport(format!("{} failed: {}", method, message)));
        }
        body.get_mut("result")
            .map(Value::take)
            .ok_or_else(|| transport(format!("{} response has no result", method)))
    }

    /// Latest block number; doubles as a reachability check.
    pub async fn block_number(&self) -> Result<u64> {
        let result = self.call("eth_blockNumber", json!([])).await?;
        let hex_val = result.as_str().ok_or_else(|| transport("eth_blockNumber result is not a string"))?;
        u64::from_str_radix(hex_val.trim_start_matches("0x"), 16).map_err(transport)
    }
}

#[async_trait]
impl ReserveSource for JsonRpcReserveSource {
    async fn get_reserves(&self, pair: &AssetPair) -> Result<Reserves> {
        let base = self.resolve(&pair.base)?;
        let pool = self.pair_address(pair)?;
        let result = self
            .call(
                "eth_call",
                json!([{ "to": pool.to_string(), "data": GET_RESERVES_SELECTOR }, "latest"]),
            )
            .await?;
        let raw = result.as_str().ok_or_else(|| transport("eth_call result is not a string"))?;
        let (reserve0, reserve1) =
            decode_reserves(raw)?.ok_or_else(|| PriceWatcherError::UnsupportedPair(pair.to_string()))?;
        debug!(%pair, %pool, %reserve0, %reserve1, "fetched reserves");

        let quote = self.resolve(&pair.quote)?;
        let reserves = Reserves::new(reserve0, reserve1);
        // token0 is the lower address
        Ok(if base < quote { reserves } else { reserves.flipped() })
    }
}
