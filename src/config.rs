//! Process configuration.
//!
//! Every process (hub, agents, supervisor) reads the same flat set of
//! environment variables. There is no config file: deployments set the
//! environment and children inherit it from the supervisor.

use crate::error::{DuckError, Result};
use alloy::primitives::Address;
use std::str::FromStr;

/// Default RPC endpoint (Monad testnet).
pub const DEFAULT_RPC_URL: &str = "https://testnet-rpc.monad.xyz";

/// Default hub ingress URL used by agents.
pub const DEFAULT_HUB_URL: &str = "http://localhost:3001";

/// Default hub listen port.
pub const DEFAULT_HUB_PORT: u16 = 3001;

/// Runtime settings shared by all processes.
#[derive(Debug, Clone)]
pub struct Settings {
    /// EVM node RPC endpoint.
    pub rpc_url: String,
    /// Signing key, `0x`-prefixed hex. `None` means read-only mode: the
    /// agent never registers and never posts on-chain.
    pub private_key: Option<String>,
    /// Registry/log contract. `None` (unset or zero address) disables
    /// registration and all registry writes silently.
    pub signals_address: Option<Address>,
    /// The tracked token.
    pub token_address: Address,
    /// Wrapped-native token used by the swap-quote price fallback.
    pub wmon_address: Option<Address>,
    /// Hub base URL for agent-side posting.
    pub hub_url: String,
    /// Hub listen port.
    pub hub_port: u16,
    /// Advisor API key (Gemini). `None` disables the advisor.
    pub advisor_api_key: Option<String>,
}

impl Settings {
    /// Load settings from the environment. Only `DUCK_TOKEN_ADDRESS` is
    /// strictly required to be a valid address when present; everything
    /// else degrades to a documented default or to a disabled feature.
    pub fn from_env() -> Result<Self> {
        let token_address = match env_string(&["DUCK_TOKEN_ADDRESS"]) {
            Some(raw) => parse_address(&raw)
                .ok_or_else(|| DuckError::AddressParsing(format!("DUCK_TOKEN_ADDRESS: {raw}")))?,
            None => Address::ZERO,
        };

        Ok(Self {
            rpc_url: env_string(&["RPC_URL"]).unwrap_or_else(|| DEFAULT_RPC_URL.to_string()),
            private_key: env_string(&["PRIVATE_KEY"]).map(|k| normalize_key(&k)),
            signals_address: env_string(&["DUCK_SIGNALS_ADDRESS"])
                .and_then(|raw| parse_address(&raw))
                .filter(|addr| *addr != Address::ZERO),
            token_address,
            wmon_address: env_string(&["WMON_ADDRESS"]).and_then(|raw| parse_address(&raw)),
            hub_url: env_string(&["WEBSOCKET_SERVER_URL"])
                .unwrap_or_else(|| DEFAULT_HUB_URL.to_string()),
            hub_port: env_string(&["PORT"])
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(DEFAULT_HUB_PORT),
            advisor_api_key: env_string(&["VITE_API_KEY", "GEMINI_API_KEY"]),
        })
    }

    /// Whether on-chain writes are possible at all.
    pub fn can_write(&self) -> bool {
        self.private_key.is_some()
    }

    /// Lowercased token address, the canonical map key everywhere.
    pub fn token_key(&self) -> String {
        format!("{:#x}", self.token_address)
    }
}

fn env_string(keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Ok(v) = std::env::var(key) {
            let trimmed = v.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

/// Accept a private key with or without the `0x` prefix.
fn normalize_key(raw: &str) -> String {
    let stripped = raw.trim_start_matches("0x").trim_start_matches("0X");
    format!("0x{stripped}")
}

fn parse_address(raw: &str) -> Option<Address> {
    Address::from_str(raw.trim()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("0xabc123"), "0xabc123");
        assert_eq!(normalize_key("abc123"), "0xabc123");
    }

    #[test]
    fn test_parse_address() {
        let addr = parse_address("0x0000000000000000000000000000000000000001");
        assert!(addr.is_some());
        assert!(parse_address("not-an-address").is_none());
    }

    #[test]
    fn test_token_key_is_lowercase() {
        let settings = Settings {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            private_key: None,
            signals_address: None,
            token_address: parse_address("0xAbCdEF0000000000000000000000000000000001").unwrap(),
            wmon_address: None,
            hub_url: DEFAULT_HUB_URL.to_string(),
            hub_port: DEFAULT_HUB_PORT,
            advisor_api_key: None,
        };
        let key = settings.token_key();
        assert_eq!(key, key.to_lowercase());
        assert!(key.starts_with("0x"));
    }
}
