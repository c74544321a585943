//! Transaction confirmation monitoring.
//!
//! # Responsibilities
//! - Poll for the receipt of a broadcast ledger transaction
//! - Report reverts as failures
//! - Wait for the configured confirmation depth, bounded by a deadline

use alloy::primitives::TxHash;
use std::time::Duration;
use tokio::time::{interval, timeout};

use crate::blockchain::client::BlockchainClient;
use crate::blockchain::types::{BlockchainError, BlockchainResult, ConfirmationStatus};

/// Waits for ledger transactions to reach finality.
#[derive(Debug, Clone)]
pub struct ConfirmationWatcher {
    client: BlockchainClient,
    poll_interval: Duration,
}

impl ConfirmationWatcher {
    pub fn new(client: BlockchainClient) -> Self {
        Self {
            client,
            poll_interval: Duration::from_secs(1),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Wait for a transaction to be confirmed.
    pub async fn wait(&self, tx_hash: TxHash) -> BlockchainResult<ConfirmationStatus> {
        let required_confirmations = self.client.confirmation_blocks();
        let deadline = Duration::from_secs(self.client.config().confirmation_timeout_secs);

        let result = timeout(deadline, async {
            let mut ticker = interval(self.poll_interval);

            loop {
                ticker.tick().await;

                let receipt = match self.client.get_transaction_receipt(tx_hash).await? {
                    Some(r) => r,
                    None => {
                        tracing::debug!(tx_hash = %tx_hash, "Transaction pending");
                        continue;
                    }
                };

                if !receipt.status() {
                    return Ok(ConfirmationStatus::Failed("Transaction reverted".to_string()));
                }

                let current_block = self.client.get_block_number().await?;
                let tx_block = receipt.block_number.unwrap_or(current_block);
                // The inclusion block counts as the first confirmation.
                let confirmations = current_block.saturating_sub(tx_block) as u32 + 1;

                if confirmations >= required_confirmations {
                    return Ok(ConfirmationStatus::Confirmed {
                        block_number: tx_block,
                    });
                }

                tracing::debug!(
                    tx_hash = %tx_hash,
                    confirmations = confirmations,
                    required = required_confirmations,
                    "Waiting for confirmations"
                );
            }
        })
        .await;

        match result {
            Ok(status) => status,
            Err(_) => Err(BlockchainError::ConfirmationTimeout(required_confirmations)),
        }
    }

    /// Wait and turn a revert into an error.
    pub async fn wait_confirmed(&self, tx_hash: TxHash) -> BlockchainResult<u64> {
        match self.wait(tx_hash).await? {
            ConfirmationStatus::Confirmed { block_number } => Ok(block_number),
            ConfirmationStatus::Failed(reason) => Err(BlockchainError::Reverted(reason)),
        }
    }
}
