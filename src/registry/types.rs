//! Registry entities, stable identifiers and intake payloads.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::registry::error::{RegistryError, RegistryResult};

// Re-export the scale from the config module so there is one definition.
pub use crate::config::schema::UrgencyScale;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Issue a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

entity_id!(
    /// Immutable donor identifier issued at registration.
    DonorId
);
entity_id!(
    /// Immutable recipient identifier issued at registration.
    RecipientId
);
entity_id!(
    /// Identifier of a committed match.
    MatchId
);

/// Position of a recipient on the urgency scale. Higher is more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UrgencyLevel(pub u32);

impl fmt::Display for UrgencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl UrgencyScale {
    /// Validate a raw level against the scale.
    pub fn level(&self, value: i64) -> RegistryResult<UrgencyLevel> {
        if value < self.min as i64 || value > self.max as i64 {
            return Err(RegistryError::UrgencyOutOfRange {
                value,
                min: self.min,
                max: self.max,
            });
        }
        Ok(UrgencyLevel(value as u32))
    }

    pub fn contains(&self, level: UrgencyLevel) -> bool {
        (self.min..=self.max).contains(&level.0)
    }
}

/// A hospital allowed to perform matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hospital {
    pub address: Address,
    pub name: String,
    pub location: String,
    pub contact_info: String,
    pub registered_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Donor {
    pub id: DonorId,
    pub name: String,
    pub age: u32,
    pub blood_type: String,
    pub organ: String,
    pub tissue_type: String,
    /// Cleared exactly once, when a match consumes the donor.
    pub is_available: bool,
    pub registered_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: RecipientId,
    pub name: String,
    pub age: u32,
    pub blood_type: String,
    pub needed_organ: String,
    pub tissue_type: String,
    pub urgency_level: UrgencyLevel,
    /// Set exactly once, when a match allocates an organ.
    pub has_received: bool,
    pub registered_at: u64,
}

/// A committed donor/recipient pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: MatchId,
    pub donor_id: DonorId,
    pub recipient_id: RecipientId,
    /// Hospital that performed the match.
    pub hospital: Address,
    pub matched_at: u64,
    pub retrieval_confirmed_at: Option<u64>,
}

impl MatchRecord {
    pub fn is_confirmed(&self) -> bool {
        self.retrieval_confirmed_at.is_some()
    }
}

/// Hospital intake payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewHospital {
    pub address: Address,
    pub name: String,
    pub location: String,
    pub contact_info: String,
}

/// Donor intake payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDonor {
    pub name: String,
    pub age: u32,
    pub blood_type: String,
    pub organ: String,
    pub tissue_type: String,
}

/// Recipient intake payload. The urgency is signed so out-of-range input
/// can be reported instead of failing deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRecipient {
    pub name: String,
    pub age: u32,
    pub blood_type: String,
    pub needed_organ: String,
    pub tissue_type: String,
    pub urgency_level: i64,
}

fn require(field: &'static str, value: &str) -> RegistryResult<()> {
    if value.trim().is_empty() {
        return Err(RegistryError::MissingField(field));
    }
    Ok(())
}

impl NewHospital {
    pub fn validate(&self) -> RegistryResult<()> {
        if self.address.is_zero() {
            return Err(RegistryError::MissingField("address"));
        }
        require("name", &self.name)?;
        require("location", &self.location)?;
        require("contact_info", &self.contact_info)
    }

    pub fn into_hospital(self) -> Hospital {
        Hospital {
            address: self.address,
            name: self.name.trim().to_string(),
            location: self.location.trim().to_string(),
            contact_info: self.contact_info.trim().to_string(),
            registered_at: now_secs(),
        }
    }
}

impl NewDonor {
    pub fn validate(&self) -> RegistryResult<()> {
        require("name", &self.name)?;
        require("blood_type", &self.blood_type)?;
        require("organ", &self.organ)?;
        require("tissue_type", &self.tissue_type)
    }

    pub fn into_donor(self, id: DonorId) -> Donor {
        Donor {
            id,
            name: self.name.trim().to_string(),
            age: self.age,
            blood_type: self.blood_type.trim().to_string(),
            organ: self.organ.trim().to_string(),
            tissue_type: self.tissue_type.trim().to_string(),
            is_available: true,
            registered_at: now_secs(),
        }
    }
}

impl NewRecipient {
    /// Presence checks plus the urgency scale; returns the validated level.
    pub fn validate(&self, scale: &UrgencyScale) -> RegistryResult<UrgencyLevel> {
        require("name", &self.name)?;
        require("blood_type", &self.blood_type)?;
        require("needed_organ", &self.needed_organ)?;
        require("tissue_type", &self.tissue_type)?;
        scale.level(self.urgency_level)
    }

    pub fn into_recipient(self, id: RecipientId, urgency_level: UrgencyLevel) -> Recipient {
        Recipient {
            id,
            name: self.name.trim().to_string(),
            age: self.age,
            blood_type: self.blood_type.trim().to_string(),
            needed_organ: self.needed_organ.trim().to_string(),
            tissue_type: self.tissue_type.trim().to_string(),
            urgency_level,
            has_received: false,
            registered_at: now_secs(),
        }
    }
}

/// Current unix time in seconds.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
