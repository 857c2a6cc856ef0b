//! EVM node access.
//!
//! One client per process. Reads go through a plain HTTP provider; writes
//! build a wallet-filled provider per call so the signer never leaks into
//! long-lived state. Writes are never retried here: a failed or timed-out
//! submission surfaces as an error and the caller's next tick decides.

use crate::chain::abi::{IDuckSignals, IERC20, ILaunchpad, Transfer};
use crate::chain::units::{tokens_to_wad, wad_to_tokens, wei_to_gwei};
use crate::config::Settings;
use crate::domain::{BondingProgress, TransferEvent};
use crate::error::{DuckError, Result};
use alloy::network::EthereumWallet;
use alloy::primitives::{Address, U256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::Filter;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolEvent;
use alloy::transports::http::reqwest::Url;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default launchpad router used for swap quotes and bonding-curve reads.
const DEFAULT_LAUNCHPAD: &str = "0x760afe86e5de5fa0ee542fc7b7b713e1c5425701";

/// Receipt waits are bounded well under the shortest agent tick.
const RECEIPT_TIMEOUT: Duration = Duration::from_secs(20);

/// Outcome of an idempotent registration attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// The wallet was already registered; nothing was written.
    AlreadyRegistered,
    /// A `registerAgent` transaction was mined.
    Registered { tx_hash: String },
    /// No registry configured or no wallet; registration skipped silently.
    Skipped,
}

pub struct ChainClient {
    read: RootProvider,
    rpc_url: Url,
    signer: Option<PrivateKeySigner>,
    signals_address: Option<Address>,
    token_address: Address,
    wmon_address: Option<Address>,
    launchpad_address: Address,
}

impl ChainClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let rpc_url: Url = settings
            .rpc_url
            .parse()
            .map_err(|e| DuckError::AddressParsing(format!("Invalid RPC URL: {e}")))?;

        let signer = match settings.private_key.as_deref() {
            Some(key) => {
                let signer: PrivateKeySigner = key
                    .parse()
                    .map_err(|e| DuckError::Wallet(format!("Invalid private key: {e}")))?;
                info!(address = %signer.address(), "wallet initialized");
                Some(signer)
            }
            None => {
                info!("no PRIVATE_KEY set, running read-only");
                None
            }
        };

        Ok(Self {
            read: RootProvider::new_http(rpc_url.clone()),
            rpc_url,
            signer,
            signals_address: settings.signals_address,
            token_address: settings.token_address,
            wmon_address: settings.wmon_address,
            launchpad_address: DEFAULT_LAUNCHPAD
                .parse()
                .expect("launchpad address constant is valid"),
        })
    }

    /// The signer address, when a wallet is configured.
    pub fn address(&self) -> Option<Address> {
        self.signer.as_ref().map(|s| s.address())
    }

    pub fn can_write(&self) -> bool {
        self.signer.is_some() && self.signals_address.is_some()
    }

    pub fn token_address(&self) -> Address {
        self.token_address
    }

    // -----------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------

    pub async fn block_number(&self) -> Result<u64> {
        self.read
            .get_block_number()
            .await
            .map_err(|e| DuckError::Rpc(format!("eth_blockNumber: {e}")))
    }

    /// Current gas price in wei, kept integer.
    pub async fn gas_price_wei(&self) -> Result<u128> {
        self.read
            .get_gas_price()
            .await
            .map_err(|e| DuckError::Rpc(format!("eth_gasPrice: {e}")))
    }

    /// Current gas price in gwei (float boundary; exact `/1e9`).
    pub async fn gas_price_gwei(&self) -> Result<f64> {
        Ok(wei_to_gwei(self.gas_price_wei().await?))
    }

    /// Header timestamp of block `number`, unix seconds.
    pub async fn block_timestamp(&self, number: u64) -> Result<u64> {
        let block = self
            .read
            .get_block_by_number(number.into())
            .await
            .map_err(|e| DuckError::Rpc(format!("eth_getBlockByNumber: {e}")))?
            .ok_or_else(|| DuckError::Rpc(format!("block {number} not found")))?;
        Ok(block.header.timestamp)
    }

    /// ERC-20 `Transfer` events on the tracked token for an inclusive
    /// block range. Values cross the integer/float boundary here.
    pub async fn transfer_logs(&self, from_block: u64, to_block: u64) -> Result<Vec<TransferEvent>> {
        let filter = Filter::new()
            .address(self.token_address)
            .event_signature(Transfer::SIGNATURE_HASH)
            .from_block(from_block)
            .to_block(to_block);

        let logs = self
            .read
            .get_logs(&filter)
            .await
            .map_err(|e| DuckError::Rpc(format!("eth_getLogs: {e}")))?;

        let mut transfers = Vec::with_capacity(logs.len());
        for log in logs {
            let Ok(decoded) = log.log_decode::<Transfer>() else {
                continue;
            };
            let event = decoded.inner.data;
            transfers.push(TransferEvent {
                from: format!("{:#x}", event.from),
                to: format!("{:#x}", event.to),
                value: wad_to_tokens(event.value),
                block_number: log.block_number.unwrap_or_default(),
                tx_hash: log
                    .transaction_hash
                    .map(|h| format!("{h:#x}"))
                    .unwrap_or_default(),
            });
        }
        Ok(transfers)
    }

    /// Total supply of the tracked token, in whole tokens.
    pub async fn token_total_supply(&self) -> Result<f64> {
        let token = IERC20::new(self.token_address, self.read.clone());
        let supply = token
            .totalSupply()
            .call()
            .await
            .map_err(|e| DuckError::Rpc(format!("totalSupply: {e}")))?;
        Ok(wad_to_tokens(supply))
    }

    /// Tokens received for exactly one native unit, used by the price
    /// fallback. Requires `WMON_ADDRESS` to be configured.
    pub async fn quote_tokens_per_native(&self) -> Result<f64> {
        let wmon = self
            .wmon_address
            .ok_or_else(|| DuckError::Rpc("WMON_ADDRESS not configured".to_string()))?;
        let launchpad = ILaunchpad::new(self.launchpad_address, self.read.clone());
        let amount_out = launchpad
            .getAmountOut(U256::from(crate::chain::units::WAD), wmon, self.token_address)
            .call()
            .await
            .map_err(|e| DuckError::Rpc(format!("getAmountOut: {e}")))?;
        Ok(wad_to_tokens(amount_out))
    }

    /// Bonding-curve state: two reads, errors degrade to `{0, false}`
    /// at the price-service boundary.
    pub async fn bonding_progress(&self, token: Option<&str>) -> Result<BondingProgress> {
        let address = match token {
            Some(raw) => raw
                .parse()
                .map_err(|e| DuckError::AddressParsing(format!("{raw}: {e}")))?,
            None => self.token_address,
        };
        let launchpad = ILaunchpad::new(self.launchpad_address, self.read.clone());
        let progress_bps = launchpad
            .bondingProgress(address)
            .call()
            .await
            .map_err(|e| DuckError::Rpc(format!("bondingProgress: {e}")))?;
        let graduated = launchpad
            .isGraduated(address)
            .call()
            .await
            .map_err(|e| DuckError::Rpc(format!("isGraduated: {e}")))?;
        Ok(BondingProgress {
            progress: (u128::try_from(progress_bps).unwrap_or(10_000) as f64 / 100.0).min(100.0),
            is_graduated: graduated,
        })
    }

    // -----------------------------------------------------------------
    // Registry operations
    // -----------------------------------------------------------------

    /// Register this wallet under `name`, idempotently: an already
    /// registered wallet produces zero writes. With no registry address or
    /// no wallet this is a silent no-op.
    pub async fn register_agent(&self, name: &str) -> Result<Registration> {
        let (Some(registry), Some(signer)) = (self.signals_address, self.signer.as_ref()) else {
            return Ok(Registration::Skipped);
        };

        let contract = IDuckSignals::new(registry, self.read.clone());
        let record = contract
            .agents(signer.address())
            .call()
            .await
            .map_err(|e| DuckError::Rpc(format!("agents({:#x}): {e}", signer.address())))?;

        if record.isRegistered {
            debug!(name, "agent already registered, skipping write");
            return Ok(Registration::AlreadyRegistered);
        }

        let provider = self.write_provider()?;
        let contract = IDuckSignals::new(registry, provider);
        let pending = contract
            .registerAgent(name.to_string())
            .send()
            .await
            .map_err(|e| DuckError::Tx(format!("registerAgent: {e}")))?;
        let receipt = self.await_receipt(pending).await?;

        info!(name, tx = %receipt, "agent registered on-chain");
        Ok(Registration::Registered { tx_hash: receipt })
    }

    /// Post a signal. The confidence bound is enforced here before any
    /// bytes hit the wire; the contract mirrors the check.
    pub async fn post_signal(
        &self,
        kind: &str,
        confidence: f64,
        price: f64,
        reason: &str,
    ) -> Result<String> {
        if !(0.0..=100.0).contains(&confidence) {
            return Err(DuckError::InvalidInput(format!(
                "confidence {confidence} outside [0, 100]"
            )));
        }
        let registry = self
            .signals_address
            .ok_or_else(|| DuckError::Tx("no registry configured".to_string()))?;

        let provider = self.write_provider()?;
        let contract = IDuckSignals::new(registry, provider);
        let pending = contract
            .postSignal(
                kind.to_string(),
                U256::from(confidence.round() as u64),
                tokens_to_wad(price),
                reason.chars().take(1024).collect(),
            )
            .send()
            .await
            .map_err(|e| DuckError::Tx(format!("postSignal: {e}")))?;
        self.await_receipt(pending).await
    }

    /// Post a prediction. `target_unix` must be strictly in the future;
    /// the contract would revert otherwise, so the check runs client-side
    /// first.
    pub async fn post_prediction(
        &self,
        direction: &str,
        confidence: f64,
        reference_price: f64,
        target_unix: u64,
    ) -> Result<String> {
        if !(0.0..=100.0).contains(&confidence) {
            return Err(DuckError::InvalidInput(format!(
                "confidence {confidence} outside [0, 100]"
            )));
        }
        let now = chrono::Utc::now().timestamp() as u64;
        if target_unix <= now {
            return Err(DuckError::InvalidInput(format!(
                "targetTime {target_unix} not in the future (now {now})"
            )));
        }
        let registry = self
            .signals_address
            .ok_or_else(|| DuckError::Tx("no registry configured".to_string()))?;

        let provider = self.write_provider()?;
        let contract = IDuckSignals::new(registry, provider);
        let pending = contract
            .postPrediction(
                direction.to_string(),
                U256::from(confidence.round() as u64),
                tokens_to_wad(reference_price),
                U256::from(target_unix),
            )
            .send()
            .await
            .map_err(|e| DuckError::Tx(format!("postPrediction: {e}")))?;
        self.await_receipt(pending).await
    }

    /// Verify a prediction against the realized price.
    pub async fn verify_prediction(&self, index: u64, actual_price: f64) -> Result<String> {
        let registry = self
            .signals_address
            .ok_or_else(|| DuckError::Tx("no registry configured".to_string()))?;
        let provider = self.write_provider()?;
        let contract = IDuckSignals::new(registry, provider);
        let pending = contract
            .verifyPrediction(U256::from(index), tokens_to_wad(actual_price))
            .send()
            .await
            .map_err(|e| DuckError::Tx(format!("verifyPrediction: {e}")))?;
        self.await_receipt(pending).await
    }

    /// How many predictions this wallet has posted, from the registry
    /// record. The next post lands at this index.
    pub async fn prediction_count(&self) -> Result<u64> {
        let (Some(registry), Some(signer)) = (self.signals_address, self.signer.as_ref()) else {
            return Ok(0);
        };
        let contract = IDuckSignals::new(registry, self.read.clone());
        let record = contract
            .agents(signer.address())
            .call()
            .await
            .map_err(|e| DuckError::Rpc(format!("agents: {e}")))?;
        Ok(u64::try_from(record.totalPredictions).unwrap_or(0))
    }

    /// This wallet's on-chain prediction accuracy, percent.
    pub async fn agent_accuracy(&self) -> Result<u64> {
        let (Some(registry), Some(signer)) = (self.signals_address, self.signer.as_ref()) else {
            return Ok(0);
        };
        let contract = IDuckSignals::new(registry, self.read.clone());
        let accuracy = contract
            .getAgentAccuracy(signer.address())
            .call()
            .await
            .map_err(|e| DuckError::Rpc(format!("getAgentAccuracy: {e}")))?;
        Ok(u64::try_from(accuracy).unwrap_or(0))
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    fn write_provider(&self) -> Result<impl Provider + Clone> {
        let signer = self
            .signer
            .clone()
            .ok_or_else(|| DuckError::Wallet("no private key, read-only mode".to_string()))?;
        let wallet = EthereumWallet::from(signer);
        Ok(ProviderBuilder::new()
            .wallet(wallet)
            .connect_http(self.rpc_url.clone()))
    }

    async fn await_receipt(
        &self,
        pending: alloy::providers::PendingTransactionBuilder<alloy::network::Ethereum>,
    ) -> Result<String> {
        match tokio::time::timeout(RECEIPT_TIMEOUT, pending.get_receipt()).await {
            Ok(Ok(receipt)) => {
                if !receipt.status() {
                    return Err(DuckError::Tx(format!(
                        "transaction reverted: {:#x}",
                        receipt.transaction_hash
                    )));
                }
                Ok(format!("{:#x}", receipt.transaction_hash))
            }
            Ok(Err(e)) => Err(DuckError::Tx(format!("receipt fetch failed: {e}"))),
            Err(_) => {
                warn!("receipt wait timed out after {RECEIPT_TIMEOUT:?}");
                Err(DuckError::TxTimeout(format!(
                    "no receipt within {RECEIPT_TIMEOUT:?}"
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_only_settings() -> Settings {
        Settings {
            rpc_url: "https://testnet-rpc.monad.xyz".to_string(),
            private_key: None,
            signals_address: None,
            token_address: Address::ZERO,
            wmon_address: None,
            hub_url: "http://localhost:3001".to_string(),
            hub_port: 3001,
            advisor_api_key: None,
        }
    }

    #[test]
    fn test_read_only_client_cannot_write() {
        let client = ChainClient::new(&read_only_settings()).unwrap();
        assert!(!client.can_write());
        assert!(client.address().is_none());
    }

    #[tokio::test]
    async fn test_registration_skipped_without_registry() {
        let client = ChainClient::new(&read_only_settings()).unwrap();
        let outcome = client.register_agent("trading").await.unwrap();
        assert_eq!(outcome, Registration::Skipped);
    }

    #[test]
    fn test_confidence_precheck_rejects_out_of_range() {
        // The pre-check fires before any provider work, so a read-only
        // client exercises it fully.
        let client = ChainClient::new(&read_only_settings()).unwrap();
        let err = tokio_test_block_on(client.post_signal("BUY", 101.0, 1.0, "x")).unwrap_err();
        assert!(matches!(err, DuckError::InvalidInput(_)));

        let err =
            tokio_test_block_on(client.post_prediction("UP", 140.0, 1.0, u64::MAX)).unwrap_err();
        assert!(matches!(err, DuckError::InvalidInput(_)));
    }

    #[test]
    fn test_prediction_target_must_be_future() {
        let client = ChainClient::new(&read_only_settings()).unwrap();
        let err = tokio_test_block_on(client.post_prediction("UP", 50.0, 1.0, 0)).unwrap_err();
        assert!(matches!(err, DuckError::InvalidInput(_)));
    }

    fn tokio_test_block_on<F: std::future::Future>(fut: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(fut)
    }
}
