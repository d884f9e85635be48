//! Symbolic token names to on-chain addresses.

use std::collections::HashMap;
use std::path::Path;

use anyhow::anyhow;
use serde::Deserialize;

/// Case-insensitive symbol → address map. Inputs that already look like an
/// address pass through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenRegistry {
    by_symbol: HashMap<String, String>,
}

/// Well-known mainnet tokens the watcher was first deployed against.
const MAINNET_TOKENS: &[(&str, &str)] = &[
    ("weth", "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"),
    ("dai", "0x6B175474E89094C44Da98b954EedeAC495271d0F"),
    ("usdc", "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
    ("ndx", "0x86772b1409b61c639EaAc9Ba0AcfBb6E238e5F83"),
    ("defi5", "0xfa6de2697D59E88Ed7Fc4dFE5A33daC43565ea41"),
    ("cc10", "0x17aC188e09A7890a1844E5E65471fE8b0CcFadF3"),
    ("mkr", "0x9f8F72aA9304c8B593d555F12eF6589cC3A579A2"),
];

pub fn is_address(value: &str) -> bool {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .map_or(false, |hex| hex.len() == 40 && hex.bytes().all(|b| b.is_ascii_hexdigit()))
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mainnet() -> Self {
        let mut registry = Self::new();
        for (symbol, address) in MAINNET_TOKENS {
            registry.insert(*symbol, *address);
        }
        registry
    }

    pub fn insert(&mut self, symbol: impl AsRef<str>, address: impl Into<String>) {
        self.by_symbol.insert(symbol.as_ref().to_ascii_lowercase(), address.into());
    }

    pub fn extend<I, K, V>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (symbol, address) in entries {
            self.insert(symbol, address);
        }
    }

    /// Address for a symbol or raw address, `None` when unknown.
    pub fn resolve(&self, token: &str) -> Option<String> {
        if is_address(token) {
            return Some(token.to_string());
        }
        self.by_symbol.get(&token.to_ascii_lowercase()).cloned()
    }

    pub fn len(&self) -> usize {
        self.by_symbol.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_symbol.is_empty()
    }
}

/// Load a token list from a JSON `{"weth": "0x..."}` object or a TOML
/// `[tokens]` table. Accepts absolute or relative path.
pub fn load_token_list<P: AsRef<Path>>(path: P) -> anyhow::Result<HashMap<String, String>> {
    let text = std::fs::read_to_string(&path)
        .map_err(|e| anyhow!("unable to read token list {}: {}", path.as_ref().display(), e))?;

    let entries = match serde_json::from_str::<HashMap<String, String>>(&text) {
        Ok(map) => map,
        Err(_) => {
            #[derive(Deserialize)]
            struct Wrapper {
                tokens: HashMap<String, String>,
            }
            let wrapper: Wrapper = toml::from_str(&text)
                .map_err(|e| anyhow!("token list {} is not valid JSON nor TOML: {}", path.as_ref().display(), e))?;
            wrapper.tokens
        }
    };

    if let Some((symbol, address)) = entries.iter().find(|(_, address)| !is_address(address)) {
        return Err(anyhow!("invalid address for {}: {}", symbol, address));
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn resolves_symbols_case_insensitively() {
        let registry = TokenRegistry::mainnet();
        assert_eq!(registry.resolve("WETH"), registry.resolve("weth"));
        assert!(registry.resolve("weth").is_some());
        assert_eq!(registry.resolve("nope"), None);
    }

    #[test]
    fn addresses_pass_through() {
        let address = "0x0000000000000000000000000000000000000001";
        assert_eq!(TokenRegistry::new().resolve(address).as_deref(), Some(address));
        assert!(!is_address("0x1234"));
    }

    #[test]
    fn loads_json_and_toml_lists() {
        let mut json = tempfile::NamedTempFile::new().unwrap();
        write!(json, r#"{{"foo": "0x00000000000000000000000000000000000000aa"}}"#).unwrap();
        assert_eq!(load_token_list(json.path()).unwrap().len(), 1);

        let mut toml_file = tempfile::NamedTempFile::new().unwrap();
        write!(toml_file, "[tokens]\nbar = \"0x00000000000000000000000000000000000000bb\"\n").unwrap();
        let entries = load_token_list(toml_file.path()).unwrap();
        assert_eq!(entries["bar"], "0x00000000000000000000000000000000000000bb");
    }

    #[test]
    fn rejects_bad_addresses() {
        let mut json = tempfile::NamedTempFile::new().unwrap();
        write!(json, r#"{{"foo": "not-an-address"}}"#).unwrap();
        assert!(load_token_list(json.path()).is_err());
    }
}
