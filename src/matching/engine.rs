//! Match eligibility.
//!
//! A pair is eligible when the donor is still available, the recipient has
//! not yet received an organ and the compatibility policy accepts the pair.
//! The ledger calls [`MatchEngine::evaluate`] inside the same critical
//! section that commits the match.

use std::sync::Arc;

use crate::matching::policy::{CompatibilityPolicy, StandardPolicy};
use crate::registry::error::{RegistryError, RegistryResult};
use crate::registry::types::{Donor, Recipient};

/// Eligibility checker shared by every ledger backend.
#[derive(Clone)]
pub struct MatchEngine {
    policy: Arc<dyn CompatibilityPolicy>,
}

impl MatchEngine {
    pub fn new(policy: Arc<dyn CompatibilityPolicy>) -> Self {
        Self { policy }
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Decide whether `donor` may be allocated to `recipient`.
    pub fn evaluate(&self, donor: &Donor, recipient: &Recipient) -> RegistryResult<()> {
        if !donor.is_available {
            return Err(RegistryError::DonorUnavailable(donor.id));
        }
        if recipient.has_received {
            return Err(RegistryError::RecipientAlreadyReceived(recipient.id));
        }

        let assessment = self.policy.assess(donor, recipient);
        if !assessment.is_compatible() {
            return Err(RegistryError::Incompatible {
                donor: donor.id,
                recipient: recipient.id,
                reasons: assessment.failures,
            });
        }
        Ok(())
    }

    /// Available donors the policy accepts for `recipient`, in input order.
    pub fn candidates<'a>(&self, recipient: &Recipient, donors: &'a [Donor]) -> Vec<&'a Donor> {
        if recipient.has_received {
            return Vec::new();
        }
        donors
            .iter()
            .filter(|d| self.evaluate(d, recipient).is_ok())
            .collect()
    }
}

impl Default for MatchEngine {
    fn default() -> Self {
        Self::new(Arc::new(StandardPolicy::default()))
    }
}

impl std::fmt::Debug for MatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchEngine")
            .field("policy", &self.policy.name())
            .finish()
    }
}
