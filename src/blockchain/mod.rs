//! Blockchain integration subsystem (contract ledger backend).
//!
//! # Data Flow
//! ```text
//! Environment Variables (per-role private keys), RPC URL
//!     → wallet.rs (key loading, signing providers per caller address)
//!     → client.rs (read RPC with timeouts and failover)
//!     → transaction.rs (confirmation depth after broadcast)
//! ```
//!
//! # Security Constraints
//! - Private keys ONLY from environment variables
//! - Never log private keys or sensitive data
//! - All RPC calls have configurable timeouts

pub mod client;
#[cfg(test)]
pub(crate) mod stub_node;
pub mod transaction;
pub mod types;
pub mod wallet;

pub use client::BlockchainClient;
pub use transaction::ConfirmationWatcher;
pub use types::{BlockchainConfig, BlockchainError, ChainId};
pub use wallet::{SignerSet, Wallet};
