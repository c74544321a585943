//! JSON-RPC client with timeout, failover and health reporting.
//!
//! # Responsibilities
//! - Connect to the primary endpoint and any failovers
//! - Query chain state needed for confirmations (block number, receipts)
//! - Handle timeouts and network errors gracefully
//! - Provide health check for ledger connectivity

use alloy::primitives::TxHash;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionReceipt;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

use crate::blockchain::types::{BlockchainConfig, BlockchainError, BlockchainResult, ChainId};
use crate::observability::metrics;

/// Read-only RPC client wrapper with failover support.
#[derive(Clone)]
pub struct BlockchainClient {
    /// Primary endpoint first, then failovers in configured order.
    providers: Vec<DynProvider>,
    config: BlockchainConfig,
    timeout_duration: Duration,
}

impl BlockchainClient {
    /// Create a new client. Unreachable endpoints are tolerated here and
    /// surface on the first call instead.
    pub async fn new(config: BlockchainConfig) -> BlockchainResult<Self> {
        let connect = |url: url::Url| ProviderBuilder::new().connect_http(url).erased();

        let primary_url: url::Url = config.rpc_url.parse().map_err(|e| {
            BlockchainError::Rpc(format!("Invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;
        let mut providers = vec![connect(primary_url)];
        for raw in &config.failover_urls {
            match raw.parse() {
                Ok(url) => providers.push(connect(url)),
                Err(_) => tracing::warn!(url = %raw, "Ignoring invalid failover RPC URL"),
            }
        }

        let client = Self {
            providers,
            timeout_duration: Duration::from_secs(config.rpc_timeout_secs),
            config: config.clone(),
        };

        match client.verify_chain_id().await {
            Ok(()) => {
                tracing::info!(
                    rpc_url = %config.rpc_url,
                    chain_id = config.chain_id,
                    "Ledger RPC client initialized"
                );
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Ledger RPC client initialized but chain verification failed"
                );
            }
        }

        Ok(client)
    }

    /// Verify the connected chain ID matches configuration.
    pub async fn verify_chain_id(&self) -> BlockchainResult<()> {
        let chain_id = self.get_chain_id().await?;
        if chain_id.0 != self.config.chain_id {
            return Err(BlockchainError::ChainMismatch {
                expected: self.config.chain_id,
                actual: chain_id.0,
            });
        }
        Ok(())
    }

    /// Try each endpoint in order and return the first answer.
    ///
    /// Fails with `Timeout` when every endpoint timed out, `Rpc` otherwise.
    async fn first_ok<T, E, F, Fut>(&self, what: &'static str, call: F) -> BlockchainResult<T>
    where
        F: Fn(DynProvider) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut all_timed_out = true;
        for (i, provider) in self.providers.iter().enumerate() {
            match timeout(self.timeout_duration, call(provider.clone())).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => {
                    all_timed_out = false;
                    tracing::warn!(provider_idx = i, op = what, error = %e, "RPC error, trying next provider");
                }
                Err(_) => tracing::warn!(provider_idx = i, op = what, "RPC timeout, trying next provider"),
            }
        }
        if all_timed_out {
            Err(BlockchainError::Timeout(self.config.rpc_timeout_secs))
        } else {
            Err(BlockchainError::Rpc(format!("All RPC providers failed to {what}")))
        }
    }

    pub async fn get_chain_id(&self) -> BlockchainResult<ChainId> {
        self.first_ok("get chain id", |p| async move { p.get_chain_id().await })
            .await
            .map(ChainId)
    }

    pub async fn get_block_number(&self) -> BlockchainResult<u64> {
        self.first_ok("get block number", |p| async move { p.get_block_number().await })
            .await
    }

    pub async fn get_transaction_receipt(
        &self,
        tx_hash: TxHash,
    ) -> BlockchainResult<Option<TransactionReceipt>> {
        self.first_ok("get receipt", |p| async move {
            p.get_transaction_receipt(tx_hash).await
        })
        .await
    }

    /// Returns true if we can query the block number.
    pub async fn is_healthy(&self) -> bool {
        let healthy = self.get_block_number().await.is_ok();
        metrics::record_ledger_health("contract", healthy);
        healthy
    }

    /// Every configured endpoint, primary first.
    pub fn providers(&self) -> &[DynProvider] {
        &self.providers
    }

    pub fn config(&self) -> &BlockchainConfig {
        &self.config
    }

    pub fn confirmation_blocks(&self) -> u32 {
        self.config.confirmation_blocks
    }

    pub fn timeout_duration(&self) -> Duration {
        self.timeout_duration
    }
}

impl std::fmt::Debug for BlockchainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockchainClient")
            .field("rpc_url", &self.config.rpc_url)
            .field("chain_id", &self.config.chain_id)
            .field("timeout_secs", &self.config.rpc_timeout_secs)
            .finish()
    }
}
