//! Registry error definitions.

use alloy::primitives::Address;
use thiserror::Error;

use crate::blockchain::types::BlockchainError;
use crate::matching::policy::Incompatibility;
use crate::registry::types::{DonorId, MatchId, RecipientId};
use crate::security::roles::Operation;

/// Errors produced by registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A required intake field is empty.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// Urgency level outside the configured scale.
    #[error("urgency level {value} is outside the scale {min}..={max}")]
    UrgencyOutOfRange { value: i64, min: u32, max: u32 },

    /// Caller address is not allowed to perform the operation.
    #[error("{address} is not authorized to {operation}")]
    Unauthorized { address: Address, operation: Operation },

    #[error("hospital {0} is already registered")]
    HospitalExists(Address),

    #[error("donor {0} not found")]
    DonorNotFound(DonorId),

    #[error("recipient {0} not found")]
    RecipientNotFound(RecipientId),

    #[error("donor {0} is no longer available")]
    DonorUnavailable(DonorId),

    #[error("recipient {0} has already received an organ")]
    RecipientAlreadyReceived(RecipientId),

    /// The compatibility policy rejected the pair.
    #[error("donor {donor} is incompatible with recipient {recipient}: {}", join_reasons(.reasons))]
    Incompatible {
        donor: DonorId,
        recipient: RecipientId,
        reasons: Vec<Incompatibility>,
    },

    #[error("no match recorded for donor {donor} and recipient {recipient}")]
    MatchNotFound { donor: DonorId, recipient: RecipientId },

    #[error("retrieval already confirmed for match {0}")]
    RetrievalAlreadyConfirmed(MatchId),

    /// Read-your-writes wait expired before the ledger caught up.
    #[error("ledger revision {current} has not reached {required}")]
    StaleSnapshot { current: u64, required: u64 },

    /// Remote ledger failure.
    #[error(transparent)]
    Ledger(#[from] BlockchainError),

    /// Snapshot file could not be read or written.
    #[error("ledger persistence failed: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("ledger snapshot is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

fn join_reasons(reasons: &[Incompatibility]) -> String {
    reasons
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl RegistryError {
    /// Whether an idempotent read may be retried after this error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RegistryError::Ledger(BlockchainError::Rpc(_) | BlockchainError::Timeout(_))
        )
    }
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RegistryError::UrgencyOutOfRange { value: -1, min: 1, max: 10 };
        assert_eq!(err.to_string(), "urgency level -1 is outside the scale 1..=10");

        let err = RegistryError::Incompatible {
            donor: DonorId::new(),
            recipient: RecipientId::new(),
            reasons: vec![Incompatibility::OrganMismatch, Incompatibility::BloodType],
        };
        assert!(err.to_string().contains("organ mismatch, blood type"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(RegistryError::Ledger(BlockchainError::Timeout(5)).is_transient());
        assert!(RegistryError::Ledger(BlockchainError::Rpc("down".into())).is_transient());
        assert!(!RegistryError::Ledger(BlockchainError::Reverted("nope".into())).is_transient());
        assert!(!RegistryError::MissingField("name").is_transient());
    }
}
