//! In-process authoritative ledger.
//!
//! Donor, recipient and match state lives behind one `tokio::sync::RwLock`
//! so that a match is evaluated and committed in the same critical section.
//! Hospitals sit in a `DashMap` for lock-free membership checks; they are
//! only inserted while the state write lock is held, so revision order is
//! preserved.

use alloy::primitives::Address;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use crate::ledger::{Committed, LedgerEvent, ProvisionedRoles, Snapshot, EVENT_CHANNEL_CAPACITY};
use crate::matching::MatchEngine;
use crate::registry::error::{RegistryError, RegistryResult};
use crate::registry::types::{
    now_secs, Donor, DonorId, Hospital, MatchId, MatchRecord, NewDonor, NewHospital,
    NewRecipient, Recipient, RecipientId, UrgencyLevel,
};
use crate::security::roles::Operation;

#[derive(Debug, Default)]
struct LedgerState {
    revision: u64,
    donors: Vec<Donor>,
    recipients: Vec<Recipient>,
    matches: Vec<MatchRecord>,
}

impl LedgerState {
    fn donor_index(&self, id: DonorId) -> RegistryResult<usize> {
        self.donors
            .iter()
            .position(|d| d.id == id)
            .ok_or(RegistryError::DonorNotFound(id))
    }

    fn recipient_index(&self, id: RecipientId) -> RegistryResult<usize> {
        self.recipients
            .iter()
            .position(|r| r.id == id)
            .ok_or(RegistryError::RecipientNotFound(id))
    }
}

/// On-disk snapshot format.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedLedger {
    revision: u64,
    hospitals: Vec<Hospital>,
    donors: Vec<Donor>,
    recipients: Vec<Recipient>,
    matches: Vec<MatchRecord>,
}

struct Inner {
    roles: ProvisionedRoles,
    hospitals: DashMap<Address, Hospital>,
    state: RwLock<LedgerState>,
    revision: AtomicU64,
    events: broadcast::Sender<LedgerEvent>,
    persistence_path: Option<PathBuf>,
}

/// Memory-backed ledger, cheap to clone.
#[derive(Clone)]
pub struct MemoryLedger {
    inner: Arc<Inner>,
}

impl MemoryLedger {
    /// Create an empty ledger.
    pub fn new(roles: ProvisionedRoles, persistence_path: Option<PathBuf>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                roles,
                hospitals: DashMap::new(),
                state: RwLock::new(LedgerState::default()),
                revision: AtomicU64::new(0),
                events,
                persistence_path,
            }),
        }
    }

    /// Create a ledger, restoring state from `path` if the file exists.
    pub fn load(roles: ProvisionedRoles, path: impl Into<PathBuf>) -> RegistryResult<Self> {
        let path = path.into();
        if !Path::new(&path).exists() {
            return Ok(Self::new(roles, Some(path)));
        }

        let reader = BufReader::new(File::open(&path)?);
        let persisted: PersistedLedger = serde_json::from_reader(reader)?;
        let ledger = Self::new(roles, Some(path));
        for hospital in persisted.hospitals {
            ledger.inner.hospitals.insert(hospital.address, hospital);
        }
        {
            // Fresh ledger: the lock is uncontended.
            let mut state = ledger.inner.state.try_write().map_err(|_| {
                std::io::Error::new(std::io::ErrorKind::WouldBlock, "ledger state locked")
            })?;
            state.revision = persisted.revision;
            ledger.inner.revision.store(persisted.revision, Ordering::Release);
            state.donors = persisted.donors;
            state.recipients = persisted.recipients;
            state.matches = persisted.matches;
            tracing::info!(
                revision = state.revision,
                donors = state.donors.len(),
                recipients = state.recipients.len(),
                "Restored ledger snapshot"
            );
        }
        Ok(ledger)
    }

    pub fn roles(&self) -> ProvisionedRoles {
        self.inner.roles
    }

    /// Last committed revision.
    pub fn revision(&self) -> u64 {
        self.inner.revision.load(Ordering::Acquire)
    }

    fn advance(&self, state: &mut LedgerState) -> u64 {
        state.revision += 1;
        self.inner.revision.store(state.revision, Ordering::Release);
        state.revision
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.inner.events.subscribe()
    }

    pub fn is_hospital(&self, address: &Address) -> bool {
        self.inner.hospitals.contains_key(address)
    }

    fn require(&self, allowed: bool, caller: Address, operation: Operation) -> RegistryResult<()> {
        if allowed {
            Ok(())
        } else {
            tracing::warn!(%caller, %operation, "Ledger rejected caller address");
            Err(RegistryError::Unauthorized {
                address: caller,
                operation,
            })
        }
    }

    fn require_hospital(&self, caller: Address, operation: Operation) -> RegistryResult<()> {
        self.require(self.is_hospital(&caller), caller, operation)
    }

    fn publish(&self, event: LedgerEvent) {
        // No subscribers is not an error.
        let _ = self.inner.events.send(event);
    }

    /// Write the snapshot file. Callers hold the state lock so writes land in
    /// revision order.
    async fn save(&self, state: &LedgerState) -> RegistryResult<()> {
        let Some(path) = &self.inner.persistence_path else {
            return Ok(());
        };

        let persisted = PersistedLedger {
            revision: state.revision,
            hospitals: self.inner.hospitals.iter().map(|r| r.value().clone()).collect(),
            donors: state.donors.clone(),
            recipients: state.recipients.clone(),
            matches: state.matches.clone(),
        };
        let json = serde_json::to_vec(&persisted)?;

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        tracing::debug!(revision = state.revision, path = %path.display(), "Saved ledger snapshot");
        Ok(())
    }

    async fn save_after_commit(&self, state: &LedgerState) {
        if let Err(e) = self.save(state).await {
            tracing::error!(revision = state.revision, error = %e, "Failed to persist ledger snapshot");
        }
    }

    /// Flush the current state to the snapshot file.
    pub async fn persist(&self) -> RegistryResult<()> {
        let state = self.inner.state.read().await;
        self.save(&state).await
    }

    pub async fn register_hospital(
        &self,
        caller: Address,
        request: NewHospital,
    ) -> RegistryResult<Committed<Hospital>> {
        self.require(caller == self.inner.roles.admin, caller, Operation::RegisterHospital)?;

        let mut state = self.inner.state.write().await;
        if self.inner.hospitals.contains_key(&request.address) {
            return Err(RegistryError::HospitalExists(request.address));
        }
        let hospital = request.into_hospital();
        self.inner.hospitals.insert(hospital.address, hospital.clone());
        let revision = self.advance(&mut state);
        self.save_after_commit(&state).await;
        drop(state);

        tracing::info!(address = %hospital.address, name = %hospital.name, revision, "Hospital registered");
        self.publish(LedgerEvent::HospitalRegistered {
            revision,
            hospital: hospital.clone(),
        });
        Ok(Committed { revision, data: hospital })
    }

    pub async fn register_donor(
        &self,
        caller: Address,
        request: NewDonor,
    ) -> RegistryResult<Committed<Donor>> {
        self.require(
            caller == self.inner.roles.donor_storage,
            caller,
            Operation::RegisterDonor,
        )?;

        let donor = request.into_donor(DonorId::new());
        let mut state = self.inner.state.write().await;
        state.donors.push(donor.clone());
        let revision = self.advance(&mut state);
        self.save_after_commit(&state).await;
        drop(state);

        tracing::info!(donor_id = %donor.id, organ = %donor.organ, revision, "Donor registered");
        self.publish(LedgerEvent::DonorRegistered {
            revision,
            donor: donor.clone(),
        });
        Ok(Committed { revision, data: donor })
    }

    pub async fn register_recipient(
        &self,
        caller: Address,
        request: NewRecipient,
        urgency: UrgencyLevel,
    ) -> RegistryResult<Committed<Recipient>> {
        self.require(
            caller == self.inner.roles.recipient_storage,
            caller,
            Operation::RegisterRecipient,
        )?;

        let recipient = request.into_recipient(RecipientId::new(), urgency);
        let mut state = self.inner.state.write().await;
        state.recipients.push(recipient.clone());
        let revision = self.advance(&mut state);
        self.save_after_commit(&state).await;
        drop(state);

        tracing::info!(
            recipient_id = %recipient.id,
            organ = %recipient.needed_organ,
            urgency = %recipient.urgency_level,
            revision,
            "Recipient registered"
        );
        self.publish(LedgerEvent::RecipientRegistered {
            revision,
            recipient: recipient.clone(),
        });
        Ok(Committed { revision, data: recipient })
    }

    /// Full lists as of the current revision. Hospitals and the admin may read.
    pub async fn snapshot(&self, caller: Address) -> RegistryResult<Snapshot> {
        self.require(
            caller == self.inner.roles.admin || self.is_hospital(&caller),
            caller,
            Operation::ReadRegistry,
        )?;
        let state = self.inner.state.read().await;
        Ok(Snapshot {
            revision: state.revision,
            donors: state.donors.clone(),
            recipients: state.recipients.clone(),
        })
    }

    pub async fn matches(&self, caller: Address) -> RegistryResult<Vec<MatchRecord>> {
        self.require(
            caller == self.inner.roles.admin || self.is_hospital(&caller),
            caller,
            Operation::ReadRegistry,
        )?;
        Ok(self.inner.state.read().await.matches.clone())
    }

    /// Evaluate and commit a match atomically. Concurrent attempts on the same
    /// donor or recipient serialize on the write lock; all but the first see
    /// the flipped flag and fail.
    pub async fn match_organ(
        &self,
        caller: Address,
        donor_id: DonorId,
        recipient_id: RecipientId,
        engine: &MatchEngine,
    ) -> RegistryResult<Committed<MatchRecord>> {
        self.require_hospital(caller, Operation::MatchOrgan)?;

        let mut state = self.inner.state.write().await;
        let di = state.donor_index(donor_id)?;
        let ri = state.recipient_index(recipient_id)?;
        engine.evaluate(&state.donors[di], &state.recipients[ri])?;

        let record = MatchRecord {
            id: MatchId::new(),
            donor_id,
            recipient_id,
            hospital: caller,
            matched_at: now_secs(),
            retrieval_confirmed_at: None,
        };
        state.donors[di].is_available = false;
        state.recipients[ri].has_received = true;
        state.matches.push(record.clone());
        let revision = self.advance(&mut state);
        self.save_after_commit(&state).await;
        drop(state);

        tracing::info!(
            match_id = %record.id,
            %donor_id,
            %recipient_id,
            hospital = %caller,
            revision,
            "Organ matched"
        );
        self.publish(LedgerEvent::OrganMatched {
            revision,
            record: record.clone(),
        });
        Ok(Committed { revision, data: record })
    }

    pub async fn confirm_retrieval(
        &self,
        caller: Address,
        donor_id: DonorId,
        recipient_id: RecipientId,
    ) -> RegistryResult<Committed<MatchRecord>> {
        self.require_hospital(caller, Operation::ConfirmRetrieval)?;

        let mut state = self.inner.state.write().await;
        let record = state
            .matches
            .iter_mut()
            .find(|m| m.donor_id == donor_id && m.recipient_id == recipient_id)
            .ok_or(RegistryError::MatchNotFound {
                donor: donor_id,
                recipient: recipient_id,
            })?;
        if record.is_confirmed() {
            return Err(RegistryError::RetrievalAlreadyConfirmed(record.id));
        }
        record.retrieval_confirmed_at = Some(now_secs());
        let record = record.clone();
        let revision = self.advance(&mut state);
        self.save_after_commit(&state).await;
        drop(state);

        tracing::info!(match_id = %record.id, hospital = %caller, revision, "Retrieval confirmed");
        self.publish(LedgerEvent::RetrievalConfirmed {
            revision,
            record: record.clone(),
        });
        Ok(Committed { revision, data: record })
    }

    pub async fn update_urgency(
        &self,
        caller: Address,
        recipient_id: RecipientId,
        level: UrgencyLevel,
    ) -> RegistryResult<Committed<Recipient>> {
        self.require_hospital(caller, Operation::UpdateUrgency)?;

        let mut state = self.inner.state.write().await;
        let ri = state.recipient_index(recipient_id)?;
        state.recipients[ri].urgency_level = level;
        let recipient = state.recipients[ri].clone();
        let revision = self.advance(&mut state);
        self.save_after_commit(&state).await;
        drop(state);

        tracing::info!(%recipient_id, urgency = %level, revision, "Urgency updated");
        self.publish(LedgerEvent::UrgencyUpdated {
            revision,
            recipient_id,
            urgency_level: level,
        });
        Ok(Committed { revision, data: recipient })
    }
}

impl std::fmt::Debug for MemoryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLedger")
            .field("hospitals", &self.inner.hospitals.len())
            .field("persistence_path", &self.inner.persistence_path)
            .finish()
    }
}
