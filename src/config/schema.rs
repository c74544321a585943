//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the registry.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::matching::policy::{BloodRule, TissueRule};
use crate::security::roles::Role;

/// Root configuration for the registry service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RegistryConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Ledger backend selection and persistence.
    pub ledger: LedgerConfig,

    /// Blockchain integration settings (contract backend only).
    pub blockchain: BlockchainConfig,

    /// Role addresses the ledger is instantiated with.
    pub provisioning: ProvisioningConfig,

    /// Capability tokens.
    pub access: AccessConfig,

    /// Urgency scale accepted for recipients.
    pub urgency: UrgencyScale,

    /// Compatibility policy.
    pub matching: MatchingConfig,

    /// Retry configuration for ledger reads.
    pub retries: RetryConfig,

    /// Read-your-writes settings.
    pub consistency: ConsistencyConfig,

    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Which ledger service backs the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LedgerBackend {
    /// In-process authoritative ledger.
    #[default]
    Memory,
    /// Remote `OrganDonation` contract over JSON-RPC.
    Contract,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct LedgerConfig {
    pub backend: LedgerBackend,

    /// Snapshot file for the memory backend. No persistence when unset.
    pub persistence_path: Option<String>,

    /// Address of the deployed contract (contract backend).
    pub contract_address: String,
}

/// Blockchain integration configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BlockchainConfig {
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Failover JSON-RPC endpoint URLs.
    #[serde(default)]
    pub failover_urls: Vec<String>,

    /// Chain ID (e.g., 1 for Ethereum mainnet, 31337 for local Anvil).
    pub chain_id: u64,

    /// RPC request timeout in seconds.
    pub rpc_timeout_secs: u64,

    /// Number of block confirmations required for finality.
    pub confirmation_blocks: u32,

    /// Maximum time to wait for a transaction to confirm.
    pub confirmation_timeout_secs: u64,
}

impl Default for BlockchainConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            failover_urls: Vec::new(),
            chain_id: 1337,
            rpc_timeout_secs: 10,
            confirmation_blocks: 1,
            confirmation_timeout_secs: 120,
        }
    }
}

/// The three fixed addresses the ledger is instantiated with.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProvisioningConfig {
    pub admin: String,
    pub donor_storage: String,
    pub recipient_storage: String,
}

/// Capability token grants.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AccessConfig {
    pub grants: Vec<GrantConfig>,
}

/// A bearer token bound to an address and a role.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GrantConfig {
    pub token: String,
    pub role: Role,
    pub address: String,
}

/// Ordered urgency scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct UrgencyScale {
    pub min: u32,
    pub max: u32,
}

impl Default for UrgencyScale {
    fn default() -> Self {
        Self { min: 1, max: 10 }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MatchingConfig {
    pub blood_rule: BloodRule,
    pub tissue_rule: TissueRule,
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries.
    pub enabled: bool,

    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConsistencyConfig {
    /// How long a read may wait for `min_revision`.
    pub max_wait_ms: u64,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self { max_wait_ms: 2000 }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 64 * 1024,
        }
    }
}
