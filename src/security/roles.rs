//! Roles and the operations they may perform.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller role established by a capability token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Hospital,
    DonorIntake,
    RecipientIntake,
}

/// Every operation the service exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    RegisterHospital,
    RegisterDonor,
    RegisterRecipient,
    ReadRegistry,
    MatchOrgan,
    ConfirmRetrieval,
    UpdateUrgency,
}

impl Role {
    /// The single gating table.
    pub fn permits(self, operation: Operation) -> bool {
        use Operation::*;
        match self {
            Role::Admin => matches!(operation, RegisterHospital | ReadRegistry),
            Role::Hospital => matches!(
                operation,
                ReadRegistry | MatchOrgan | ConfirmRetrieval | UpdateUrgency
            ),
            Role::DonorIntake => operation == RegisterDonor,
            Role::RecipientIntake => operation == RegisterRecipient,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Admin => "admin",
            Role::Hospital => "hospital",
            Role::DonorIntake => "donor_intake",
            Role::RecipientIntake => "recipient_intake",
        };
        f.write_str(s)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::RegisterHospital => "register hospitals",
            Operation::RegisterDonor => "register donors",
            Operation::RegisterRecipient => "register recipients",
            Operation::ReadRegistry => "read the registry",
            Operation::MatchOrgan => "match organs",
            Operation::ConfirmRetrieval => "confirm retrievals",
            Operation::UpdateUrgency => "update urgency levels",
        };
        f.write_str(s)
    }
}
