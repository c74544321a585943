//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that role and grant addresses parse
//! - Validate value ranges (timeouts > 0, urgency scale ordered)
//! - Detect duplicate capability tokens
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RegistryConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use alloy::primitives::Address;
use std::collections::HashSet;
use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::{LedgerBackend, RegistryConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid address '{value}'")]
    InvalidAddress { field: String, value: String },

    #[error("{field}: invalid socket address '{value}'")]
    InvalidSocket { field: String, value: String },

    #[error("{field}: invalid URL '{value}'")]
    InvalidUrl { field: String, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("urgency scale is empty: min {min} > max {max}")]
    EmptyUrgencyScale { min: u32, max: u32 },

    #[error("access grant #{0} has an empty token")]
    EmptyToken(usize),

    #[error("access grant #{0} reuses a token")]
    DuplicateToken(usize),
}

fn check_address(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.parse::<Address>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &RegistryConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidSocket {
            field: "listener.bind_address".into(),
            value: config.listener.bind_address.clone(),
        });
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidSocket {
            field: "observability.metrics_address".into(),
            value: config.observability.metrics_address.clone(),
        });
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.request_secs"));
    }

    let provisioning = &config.provisioning;
    check_address(&mut errors, "provisioning.admin", &provisioning.admin);
    check_address(&mut errors, "provisioning.donor_storage", &provisioning.donor_storage);
    check_address(&mut errors, "provisioning.recipient_storage", &provisioning.recipient_storage);

    if config.ledger.backend == LedgerBackend::Contract {
        check_address(&mut errors, "ledger.contract_address", &config.ledger.contract_address);
        if config.blockchain.rpc_url.parse::<url::Url>().is_err() {
            errors.push(ValidationError::InvalidUrl {
                field: "blockchain.rpc_url".into(),
                value: config.blockchain.rpc_url.clone(),
            });
        }
        if config.blockchain.rpc_timeout_secs == 0 {
            errors.push(ValidationError::Zero("blockchain.rpc_timeout_secs"));
        }
    }

    if config.urgency.min > config.urgency.max {
        errors.push(ValidationError::EmptyUrgencyScale {
            min: config.urgency.min,
            max: config.urgency.max,
        });
    }

    if config.retries.enabled && config.retries.max_attempts == 0 {
        errors.push(ValidationError::Zero("retries.max_attempts"));
    }

    let mut seen = HashSet::new();
    for (i, grant) in config.access.grants.iter().enumerate() {
        if grant.token.trim().is_empty() {
            errors.push(ValidationError::EmptyToken(i));
        } else if !seen.insert(grant.token.as_str()) {
            errors.push(ValidationError::DuplicateToken(i));
        }
        check_address(&mut errors, &format!("access.grants[{i}].address"), &grant.address);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::GrantConfig;
    use crate::security::roles::Role;

    const ADMIN: &str = "0xC417DE948427eCACf33C7681bF43aE843afE82Fb";

    fn valid() -> RegistryConfig {
        let mut config = RegistryConfig::default();
        config.provisioning.admin = ADMIN.into();
        config.provisioning.donor_storage = "0xb0DE9570B4bB8AFE9fAAa9EB76212D30042Ff762".into();
        config.provisioning.recipient_storage = "0x7031F09Df4d4ADbA89b462E50C81dd9Bec999b1D".into();
        config
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = valid();
        config.provisioning.admin = "not-an-address".into();
        config.urgency.min = 9;
        config.urgency.max = 2;
        config.timeouts.request_secs = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::EmptyUrgencyScale { min: 9, max: 2 }));
        assert!(errors.contains(&ValidationError::Zero("timeouts.request_secs")));
    }

    #[test]
    fn test_duplicate_tokens_rejected() {
        let mut config = valid();
        for _ in 0..2 {
            config.access.grants.push(GrantConfig {
                token: "same".into(),
                role: Role::Admin,
                address: ADMIN.into(),
            });
        }
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::DuplicateToken(1)]);
    }

    #[test]
    fn test_contract_backend_requires_contract_address() {
        let mut config = valid();
        config.ledger.backend = LedgerBackend::Contract;
        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(
            &errors[0],
            ValidationError::InvalidAddress { field, .. } if field == "ledger.contract_address"
        ));
    }
}
