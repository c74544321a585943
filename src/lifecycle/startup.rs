//! Startup orchestration.
//!
//! # Responsibilities
//! - Turn a validated configuration into a ledger and a registry
//! - Restore persisted memory-ledger state
//! - Build the capability token table
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently

use alloy::primitives::Address;
use std::path::PathBuf;
use thiserror::Error;

use crate::config::validation::ValidationError;
use crate::config::{LedgerBackend, RegistryConfig};
use crate::ledger::{ContractLedger, Ledger, MemoryLedger, ProvisionedRoles};
use crate::registry::error::RegistryError;
use crate::registry::Registry;
use crate::security::grants::GrantTable;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ValidationError),

    #[error("ledger initialization failed: {0}")]
    Ledger(#[from] RegistryError),
}

fn parse_address(field: &str, value: &str) -> Result<Address, ValidationError> {
    value.parse().map_err(|_| ValidationError::InvalidAddress {
        field: field.to_string(),
        value: value.to_string(),
    })
}

/// The three provisioned role addresses.
pub fn provisioned_roles(config: &RegistryConfig) -> Result<ProvisionedRoles, ValidationError> {
    let p = &config.provisioning;
    Ok(ProvisionedRoles {
        admin: parse_address("provisioning.admin", &p.admin)?,
        donor_storage: parse_address("provisioning.donor_storage", &p.donor_storage)?,
        recipient_storage: parse_address("provisioning.recipient_storage", &p.recipient_storage)?,
    })
}

/// Instantiate the configured ledger backend.
pub async fn build_ledger(config: &RegistryConfig) -> Result<Ledger, StartupError> {
    let roles = provisioned_roles(config)?;
    let ledger = match config.ledger.backend {
        LedgerBackend::Memory => {
            let ledger = match &config.ledger.persistence_path {
                Some(path) => MemoryLedger::load(roles, PathBuf::from(path))?,
                None => MemoryLedger::new(roles, None),
            };
            Ledger::Memory(ledger)
        }
        LedgerBackend::Contract => {
            let address = parse_address("ledger.contract_address", &config.ledger.contract_address)?;
            let ledger = ContractLedger::connect(address, config.blockchain.clone(), roles).await?;
            Ledger::Contract(ledger)
        }
    };
    tracing::info!(
        backend = ledger.backend(),
        admin = %roles.admin,
        donor_storage = %roles.donor_storage,
        recipient_storage = %roles.recipient_storage,
        "Ledger provisioned"
    );
    Ok(ledger)
}

/// Build everything the HTTP layer needs.
pub async fn provision(config: &RegistryConfig) -> Result<(Registry, GrantTable), StartupError> {
    let ledger = build_ledger(config).await?;
    let registry = Registry::new(ledger, config);
    let grants = GrantTable::from_config(&config.access)?;
    tracing::info!(
        grants = grants.len(),
        policy = registry.policy_name(),
        urgency_min = config.urgency.min,
        urgency_max = config.urgency.max,
        "Registry ready"
    );
    Ok((registry, grants))
}
