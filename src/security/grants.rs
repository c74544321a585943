//! Capability tokens.
//!
//! A grant binds a bearer token to the address the ledger will see and the
//! role the HTTP layer gates on. Tokens are loaded from configuration and
//! replaced wholesale on reload.

use alloy::primitives::Address;
use std::collections::HashMap;

use crate::config::schema::AccessConfig;
use crate::config::validation::ValidationError;
use crate::security::roles::{Operation, Role};

/// Who is calling, as established by their token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerContext {
    pub address: Address,
    pub role: Role,
}

impl CallerContext {
    pub fn new(address: Address, role: Role) -> Self {
        Self { address, role }
    }

    pub fn may(&self, operation: Operation) -> bool {
        self.role.permits(operation)
    }
}

/// Token → caller lookup table.
#[derive(Debug, Clone, Default)]
pub struct GrantTable {
    grants: HashMap<String, CallerContext>,
}

impl GrantTable {
    pub fn from_config(config: &AccessConfig) -> Result<Self, ValidationError> {
        let mut grants = HashMap::with_capacity(config.grants.len());
        for (i, grant) in config.grants.iter().enumerate() {
            let address: Address =
                grant
                    .address
                    .parse()
                    .map_err(|_| ValidationError::InvalidAddress {
                        field: format!("access.grants[{i}].address"),
                        value: grant.address.clone(),
                    })?;
            if grants
                .insert(grant.token.clone(), CallerContext::new(address, grant.role))
                .is_some()
            {
                return Err(ValidationError::DuplicateToken(i));
            }
        }
        Ok(Self { grants })
    }

    pub fn resolve(&self, token: &str) -> Option<CallerContext> {
        self.grants.get(token).copied()
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}
