//! Ledger service backends.
//!
//! # Data Flow
//! ```text
//! Registry (validated request, caller address)
//!     → Ledger::Memory   → memory.rs (RwLock'd state, address checks, JSON snapshot)
//!     → Ledger::Contract → contract.rs (id → index, local policy pre-check, signed tx, confirmations)
//!     → LedgerEvent broadcast (revision-stamped)
//! ```
//!
//! # Design Decisions
//! - The ledger is the only source of truth; callers hold ids, never indices
//! - Every committed mutation bumps the revision and emits exactly one event
//! - The ledger re-checks the caller address even after the HTTP role check

pub mod contract;
pub mod memory;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::matching::MatchEngine;
use crate::registry::error::RegistryResult;
use crate::registry::types::{
    Donor, DonorId, Hospital, MatchRecord, NewDonor, NewHospital, NewRecipient, Recipient,
    RecipientId, UrgencyLevel,
};

pub use contract::ContractLedger;
pub use memory::MemoryLedger;

/// Capacity of the event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// The three fixed addresses a ledger is instantiated with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedRoles {
    pub admin: Address,
    pub donor_storage: Address,
    pub recipient_storage: Address,
}

/// Donor and recipient lists as of one revision.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub revision: u64,
    pub donors: Vec<Donor>,
    pub recipients: Vec<Recipient>,
}

impl Snapshot {
    pub fn donor(&self, id: DonorId) -> Option<&Donor> {
        self.donors.iter().find(|d| d.id == id)
    }

    pub fn recipient(&self, id: RecipientId) -> Option<&Recipient> {
        self.recipients.iter().find(|r| r.id == id)
    }
}

/// A mutation result stamped with the revision it produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Committed<T> {
    pub revision: u64,
    pub data: T,
}

/// Change notification published after every committed mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    HospitalRegistered { revision: u64, hospital: Hospital },
    DonorRegistered { revision: u64, donor: Donor },
    RecipientRegistered { revision: u64, recipient: Recipient },
    OrganMatched { revision: u64, record: MatchRecord },
    RetrievalConfirmed { revision: u64, record: MatchRecord },
    UrgencyUpdated {
        revision: u64,
        recipient_id: RecipientId,
        urgency_level: UrgencyLevel,
    },
}

impl LedgerEvent {
    pub fn revision(&self) -> u64 {
        match self {
            LedgerEvent::HospitalRegistered { revision, .. }
            | LedgerEvent::DonorRegistered { revision, .. }
            | LedgerEvent::RecipientRegistered { revision, .. }
            | LedgerEvent::OrganMatched { revision, .. }
            | LedgerEvent::RetrievalConfirmed { revision, .. }
            | LedgerEvent::UrgencyUpdated { revision, .. } => *revision,
        }
    }
}

/// The configured ledger service.
#[derive(Debug, Clone)]
pub enum Ledger {
    Memory(MemoryLedger),
    Contract(ContractLedger),
}

impl Ledger {
    /// Backend label for logs and metrics.
    pub fn backend(&self) -> &'static str {
        match self {
            Ledger::Memory(_) => "memory",
            Ledger::Contract(_) => "contract",
        }
    }

    pub fn revision(&self) -> u64 {
        match self {
            Ledger::Memory(l) => l.revision(),
            Ledger::Contract(l) => l.revision(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        match self {
            Ledger::Memory(l) => l.subscribe(),
            Ledger::Contract(l) => l.subscribe(),
        }
    }

    pub async fn is_healthy(&self) -> bool {
        match self {
            Ledger::Memory(_) => true,
            Ledger::Contract(l) => l.is_healthy().await,
        }
    }

    pub async fn register_hospital(
        &self,
        caller: Address,
        request: NewHospital,
    ) -> RegistryResult<Committed<Hospital>> {
        match self {
            Ledger::Memory(l) => l.register_hospital(caller, request).await,
            Ledger::Contract(l) => l.register_hospital(caller, request).await,
        }
    }

    pub async fn register_donor(
        &self,
        caller: Address,
        request: NewDonor,
    ) -> RegistryResult<Committed<Donor>> {
        match self {
            Ledger::Memory(l) => l.register_donor(caller, request).await,
            Ledger::Contract(l) => l.register_donor(caller, request).await,
        }
    }

    /// `urgency` must already be validated against the scale.
    pub async fn register_recipient(
        &self,
        caller: Address,
        request: NewRecipient,
        urgency: UrgencyLevel,
    ) -> RegistryResult<Committed<Recipient>> {
        match self {
            Ledger::Memory(l) => l.register_recipient(caller, request, urgency).await,
            Ledger::Contract(l) => l.register_recipient(caller, request, urgency).await,
        }
    }

    pub async fn snapshot(&self, caller: Address) -> RegistryResult<Snapshot> {
        match self {
            Ledger::Memory(l) => l.snapshot(caller).await,
            Ledger::Contract(l) => l.snapshot(caller).await,
        }
    }

    pub async fn matches(&self, caller: Address) -> RegistryResult<Vec<MatchRecord>> {
        match self {
            Ledger::Memory(l) => l.matches(caller).await,
            Ledger::Contract(l) => l.matches(caller).await,
        }
    }

    pub async fn match_organ(
        &self,
        caller: Address,
        donor_id: DonorId,
        recipient_id: RecipientId,
        engine: &MatchEngine,
    ) -> RegistryResult<Committed<MatchRecord>> {
        match self {
            Ledger::Memory(l) => l.match_organ(caller, donor_id, recipient_id, engine).await,
            Ledger::Contract(l) => l.match_organ(caller, donor_id, recipient_id, engine).await,
        }
    }

    pub async fn confirm_retrieval(
        &self,
        caller: Address,
        donor_id: DonorId,
        recipient_id: RecipientId,
    ) -> RegistryResult<Committed<MatchRecord>> {
        match self {
            Ledger::Memory(l) => l.confirm_retrieval(caller, donor_id, recipient_id).await,
            Ledger::Contract(l) => l.confirm_retrieval(caller, donor_id, recipient_id).await,
        }
    }

    pub async fn update_urgency(
        &self,
        caller: Address,
        recipient_id: RecipientId,
        level: UrgencyLevel,
    ) -> RegistryResult<Committed<Recipient>> {
        match self {
            Ledger::Memory(l) => l.update_urgency(caller, recipient_id, level).await,
            Ledger::Contract(l) => l.update_urgency(caller, recipient_id, level).await,
        }
    }

    /// Flush durable state, if the backend keeps any locally.
    pub async fn persist(&self) -> RegistryResult<()> {
        match self {
            Ledger::Memory(l) => l.persist().await,
            Ledger::Contract(_) => Ok(()),
        }
    }
}
