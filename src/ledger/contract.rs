//! Ledger backed by the deployed `OrganDonation` contract.
//!
//! # Responsibilities
//! - Translate stable ids to the contract's positional indices right before a call
//! - Pre-check compatibility locally so incompatible pairs never cost gas
//! - Sign each mutation with the caller's own wallet and wait for confirmations
//! - Keep the match records the contract does not expose
//!
//! # Design Decisions
//! - Ids are derived from (kind, contract, index): the contract only appends,
//!   so a position never changes meaning
//! - Reads are issued `from` the caller, matching the contract's view guards
//! - The revision is local: it counts mutations committed through this process

use alloy::primitives::{keccak256, Address, U256};
use alloy::providers::DynProvider;
use alloy::sol;
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use crate::blockchain::types::BlockchainError;
use crate::blockchain::{BlockchainClient, ConfirmationWatcher, SignerSet};
use crate::config::BlockchainConfig;
use crate::ledger::{Committed, LedgerEvent, ProvisionedRoles, Snapshot, EVENT_CHANNEL_CAPACITY};
use crate::matching::MatchEngine;
use crate::registry::error::{RegistryError, RegistryResult};
use crate::registry::types::{
    now_secs, Donor, DonorId, Hospital, MatchId, MatchRecord, NewDonor, NewHospital,
    NewRecipient, Recipient, RecipientId, UrgencyLevel,
};
use crate::security::roles::Operation;

sol! {
    #[sol(rpc)]
    contract OrganDonation {
        struct Donor {
            string name;
            uint256 age;
            string bloodType;
            string organ;
            string tissueType;
            bool isAvailable;
        }

        struct Recipient {
            string name;
            uint256 age;
            string bloodType;
            string neededOrgan;
            string tissueType;
            uint256 urgencyLevel;
            bool hasReceived;
        }

        function registerHospital(address hospitalAddress, string name, string location, string contactInfo) external;
        function registerDonor(string name, uint256 age, string bloodType, string organ, string tissueType) external;
        function registerRecipient(string name, uint256 age, string bloodType, string neededOrgan, string tissueType, uint256 urgencyLevel) external;
        function matchOrgan(uint256 donorIndex, uint256 recipientIndex) external;
        function confirmOrganRetrieval(uint256 donorIndex, uint256 recipientIndex) external;
        function updateUrgencyLevel(uint256 recipientIndex, uint256 newLevel) external;
        function getDonorList() external view returns (Donor[] memory);
        function getRecipientList() external view returns (Recipient[] memory);
    }
}

type Instance = OrganDonation::OrganDonationInstance<DynProvider>;

/// Stable id for the entry at `index` of one of the contract's lists.
fn positional_id(kind: &[u8], contract: Address, index: usize) -> Uuid {
    let mut preimage = Vec::with_capacity(kind.len() + 20 + 8);
    preimage.extend_from_slice(kind);
    preimage.extend_from_slice(contract.as_slice());
    preimage.extend_from_slice(&(index as u64).to_be_bytes());
    let hash = keccak256(&preimage);
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);
    Uuid::from_bytes(bytes)
}

fn donor_id(contract: Address, index: usize) -> DonorId {
    DonorId(positional_id(b"donor", contract, index))
}

fn recipient_id(contract: Address, index: usize) -> RecipientId {
    RecipientId(positional_id(b"recipient", contract, index))
}

struct Inner {
    address: Address,
    roles: ProvisionedRoles,
    client: BlockchainClient,
    signers: SignerSet,
    watcher: ConfirmationWatcher,
    revision: AtomicU64,
    /// Serializes mutations so index lookups are not raced by our own writes.
    write_lock: Mutex<()>,
    hospitals: DashMap<Address, Hospital>,
    matches: DashMap<(DonorId, RecipientId), MatchRecord>,
    events: broadcast::Sender<LedgerEvent>,
}

/// Contract-backed ledger, cheap to clone.
#[derive(Clone)]
pub struct ContractLedger {
    inner: Arc<Inner>,
}

impl ContractLedger {
    /// Connect to the contract at `address`, loading role signers from the
    /// environment.
    pub async fn connect(
        address: Address,
        config: BlockchainConfig,
        roles: ProvisionedRoles,
    ) -> RegistryResult<Self> {
        let rpc_url: url::Url = config.rpc_url.parse().map_err(|e| {
            BlockchainError::Rpc(format!("Invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;
        let signers = SignerSet::from_env(&rpc_url, config.chain_id)?;
        if signers.is_empty() {
            tracing::warn!("No ledger signers loaded; every mutation will be rejected");
        }
        let client = BlockchainClient::new(config).await?;
        Ok(Self::from_parts(address, roles, client, signers))
    }

    pub fn from_parts(
        address: Address,
        roles: ProvisionedRoles,
        client: BlockchainClient,
        signers: SignerSet,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let watcher = ConfirmationWatcher::new(client.clone());
        tracing::info!(contract = %address, signers = signers.len(), "Contract ledger ready");
        Self {
            inner: Arc::new(Inner {
                address,
                roles,
                client,
                signers,
                watcher,
                revision: AtomicU64::new(0),
                write_lock: Mutex::new(()),
                hospitals: DashMap::new(),
                matches: DashMap::new(),
                events,
            }),
        }
    }

    pub fn address(&self) -> Address {
        self.inner.address
    }

    pub fn roles(&self) -> ProvisionedRoles {
        self.inner.roles
    }

    pub fn revision(&self) -> u64 {
        self.inner.revision.load(Ordering::Acquire)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.inner.events.subscribe()
    }

    pub async fn is_healthy(&self) -> bool {
        self.inner.client.is_healthy().await
    }

    fn commit(&self, event: impl FnOnce(u64) -> LedgerEvent) -> u64 {
        let revision = self.inner.revision.fetch_add(1, Ordering::AcqRel) + 1;
        let _ = self.inner.events.send(event(revision));
        revision
    }

    /// Run a view call against each endpoint in turn. Only transient
    /// failures move on to the next endpoint.
    async fn view<T, F, Fut>(&self, op: &'static str, call: F) -> RegistryResult<T>
    where
        F: Fn(Instance) -> Fut,
        Fut: Future<Output = Result<T, alloy::contract::Error>>,
    {
        let mut last = None;
        for (i, provider) in self.inner.client.providers().iter().enumerate() {
            let contract = OrganDonation::new(self.inner.address, provider.clone());
            match self.rpc(call(contract)).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    tracing::warn!(provider_idx = i, op, error = %e, "Ledger read failed, trying next endpoint");
                    last = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last.unwrap_or_else(|| BlockchainError::Rpc(format!("No RPC endpoint for {op}")).into()))
    }

    /// Contract handle signing as `caller`.
    fn writer(&self, caller: Address, operation: Operation) -> RegistryResult<Instance> {
        match self.inner.signers.for_caller(caller) {
            Ok(provider) => Ok(OrganDonation::new(self.inner.address, provider.clone())),
            Err(_) => {
                tracing::warn!(%caller, %operation, "No signer for caller address");
                Err(RegistryError::Unauthorized {
                    address: caller,
                    operation,
                })
            }
        }
    }

    /// Run one RPC future under the client timeout.
    async fn rpc<T, F>(&self, fut: F) -> RegistryResult<T>
    where
        F: Future<Output = Result<T, alloy::contract::Error>>,
    {
        let limit = self.inner.client.timeout_duration();
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result.map_err(|e| RegistryError::Ledger(e.into())),
            Err(_) => Err(BlockchainError::Timeout(limit.as_secs()).into()),
        }
    }

    /// Wait for the configured confirmations of a sent transaction.
    async fn settle(&self, op: &'static str, tx_hash: alloy::primitives::TxHash) -> RegistryResult<()> {
        tracing::debug!(op, %tx_hash, "Transaction sent");
        let block = self.inner.watcher.wait_confirmed(tx_hash).await?;
        tracing::info!(op, %tx_hash, block, "Transaction confirmed");
        Ok(())
    }

    fn map_donor(&self, index: usize, raw: OrganDonation::Donor) -> Donor {
        Donor {
            id: donor_id(self.inner.address, index),
            name: raw.name,
            age: raw.age.saturating_to::<u32>(),
            blood_type: raw.bloodType,
            organ: raw.organ,
            tissue_type: raw.tissueType,
            is_available: raw.isAvailable,
            registered_at: 0,
        }
    }

    fn map_recipient(&self, index: usize, raw: OrganDonation::Recipient) -> Recipient {
        Recipient {
            id: recipient_id(self.inner.address, index),
            name: raw.name,
            age: raw.age.saturating_to::<u32>(),
            blood_type: raw.bloodType,
            needed_organ: raw.neededOrgan,
            tissue_type: raw.tissueType,
            urgency_level: UrgencyLevel(raw.urgencyLevel.saturating_to::<u32>()),
            has_received: raw.hasReceived,
            registered_at: 0,
        }
    }

    async fn donors_as(&self, caller: Address) -> RegistryResult<Vec<Donor>> {
        let raw = self
            .view("getDonorList", |c| async move { c.getDonorList().from(caller).call().await })
            .await?;
        Ok(raw
            .into_iter()
            .enumerate()
            .map(|(i, d)| self.map_donor(i, d))
            .collect())
    }

    async fn recipients_as(&self, caller: Address) -> RegistryResult<Vec<Recipient>> {
        let raw = self
            .view("getRecipientList", |c| async move {
                c.getRecipientList().from(caller).call().await
            })
            .await?;
        Ok(raw
            .into_iter()
            .enumerate()
            .map(|(i, r)| self.map_recipient(i, r))
            .collect())
    }

    /// Lists are read as a configured reader role so intake wallets can
    /// resolve their own writes.
    fn list_reader(&self, caller: Address) -> Address {
        if self.inner.hospitals.contains_key(&caller) {
            caller
        } else {
            self.inner.roles.admin
        }
    }

    pub async fn snapshot(&self, caller: Address) -> RegistryResult<Snapshot> {
        let revision = self.revision();
        let (donors, recipients) =
            tokio::try_join!(self.donors_as(caller), self.recipients_as(caller))?;
        Ok(Snapshot {
            revision,
            donors,
            recipients,
        })
    }

    /// Match records committed through this process. The contract does not
    /// expose its own.
    pub async fn matches(&self, _caller: Address) -> RegistryResult<Vec<MatchRecord>> {
        let mut records: Vec<MatchRecord> =
            self.inner.matches.iter().map(|r| r.value().clone()).collect();
        records.sort_by_key(|m| m.matched_at);
        Ok(records)
    }

    pub async fn register_hospital(
        &self,
        caller: Address,
        request: NewHospital,
    ) -> RegistryResult<Committed<Hospital>> {
        if self.inner.hospitals.contains_key(&request.address) {
            return Err(RegistryError::HospitalExists(request.address));
        }
        let contract = self.writer(caller, Operation::RegisterHospital)?;
        let _guard = self.inner.write_lock.lock().await;

        let hospital = request.into_hospital();
        let call = contract.registerHospital(
            hospital.address,
            hospital.name.clone(),
            hospital.location.clone(),
            hospital.contact_info.clone(),
        );
        let pending = self.rpc(call.send()).await?;
        self.settle("register_hospital", *pending.tx_hash()).await?;

        self.inner.hospitals.insert(hospital.address, hospital.clone());
        let revision = self.commit(|revision| LedgerEvent::HospitalRegistered {
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
        let contract = self.writer(caller, Operation::RegisterDonor)?;
        let _guard = self.inner.write_lock.lock().await;
        let reader = self.list_reader(caller);
        let before = self.donors_as(reader).await?.len();

        let call = contract.registerDonor(
            request.name.trim().to_string(),
            U256::from(request.age),
            request.blood_type.trim().to_string(),
            request.organ.trim().to_string(),
            request.tissue_type.trim().to_string(),
        );
        let pending = self.rpc(call.send()).await?;
        self.settle("register_donor", *pending.tx_hash()).await?;

        let expected = request.into_donor(DonorId::new());
        let donors = self.donors_as(reader).await?;
        let mut donor = donors
            .into_iter()
            .skip(before)
            .find(|d| d.name == expected.name && d.organ == expected.organ)
            .ok_or_else(|| BlockchainError::Contract("registered donor not found in list".into()))?;
        donor.registered_at = expected.registered_at;

        let revision = self.commit(|revision| LedgerEvent::DonorRegistered {
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
        let contract = self.writer(caller, Operation::RegisterRecipient)?;
        let _guard = self.inner.write_lock.lock().await;
        let reader = self.list_reader(caller);
        let before = self.recipients_as(reader).await?.len();

        let call = contract.registerRecipient(
            request.name.trim().to_string(),
            U256::from(request.age),
            request.blood_type.trim().to_string(),
            request.needed_organ.trim().to_string(),
            request.tissue_type.trim().to_string(),
            U256::from(urgency.0),
        );
        let pending = self.rpc(call.send()).await?;
        self.settle("register_recipient", *pending.tx_hash()).await?;

        let expected = request.into_recipient(RecipientId::new(), urgency);
        let recipients = self.recipients_as(reader).await?;
        let mut recipient = recipients
            .into_iter()
            .skip(before)
            .find(|r| r.name == expected.name && r.needed_organ == expected.needed_organ)
            .ok_or_else(|| {
                BlockchainError::Contract("registered recipient not found in list".into())
            })?;
        recipient.registered_at = expected.registered_at;

        let revision = self.commit(|revision| LedgerEvent::RecipientRegistered {
            revision,
            recipient: recipient.clone(),
        });
        Ok(Committed { revision, data: recipient })
    }

    /// Resolve both ids to their current positions.
    async fn locate(
        &self,
        caller: Address,
        donor: DonorId,
        recipient: RecipientId,
    ) -> RegistryResult<(usize, Donor, usize, Recipient)> {
        let snapshot = self.snapshot(caller).await?;
        let di = snapshot
            .donors
            .iter()
            .position(|d| d.id == donor)
            .ok_or(RegistryError::DonorNotFound(donor))?;
        let ri = snapshot
            .recipients
            .iter()
            .position(|r| r.id == recipient)
            .ok_or(RegistryError::RecipientNotFound(recipient))?;
        let Snapshot {
            mut donors,
            mut recipients,
            ..
        } = snapshot;
        Ok((di, donors.swap_remove(di), ri, recipients.swap_remove(ri)))
    }

    pub async fn match_organ(
        &self,
        caller: Address,
        donor: DonorId,
        recipient: RecipientId,
        engine: &MatchEngine,
    ) -> RegistryResult<Committed<MatchRecord>> {
        let contract = self.writer(caller, Operation::MatchOrgan)?;
        let _guard = self.inner.write_lock.lock().await;
        let (di, d, ri, r) = self.locate(caller, donor, recipient).await?;
        engine.evaluate(&d, &r)?;

        let call = contract.matchOrgan(U256::from(di), U256::from(ri));
        let pending = self.rpc(call.send()).await?;
        self.settle("match_organ", *pending.tx_hash()).await?;

        let record = MatchRecord {
            id: MatchId::new(),
            donor_id: donor,
            recipient_id: recipient,
            hospital: caller,
            matched_at: now_secs(),
            retrieval_confirmed_at: None,
        };
        self.inner.matches.insert((donor, recipient), record.clone());
        let revision = self.commit(|revision| LedgerEvent::OrganMatched {
            revision,
            record: record.clone(),
        });
        Ok(Committed { revision, data: record })
    }

    pub async fn confirm_retrieval(
        &self,
        caller: Address,
        donor: DonorId,
        recipient: RecipientId,
    ) -> RegistryResult<Committed<MatchRecord>> {
        let contract = self.writer(caller, Operation::ConfirmRetrieval)?;
        let _guard = self.inner.write_lock.lock().await;
        if let Some(existing) = self.inner.matches.get(&(donor, recipient)) {
            if existing.is_confirmed() {
                return Err(RegistryError::RetrievalAlreadyConfirmed(existing.id));
            }
        }
        let (di, d, ri, r) = self.locate(caller, donor, recipient).await?;
        if d.is_available || !r.has_received {
            return Err(RegistryError::MatchNotFound { donor, recipient });
        }

        let call = contract.confirmOrganRetrieval(U256::from(di), U256::from(ri));
        let pending = self.rpc(call.send()).await?;
        self.settle("confirm_retrieval", *pending.tx_hash()).await?;

        let now = now_secs();
        let record = {
            // Matches made before this process started are not cached.
            let mut entry = self
                .inner
                .matches
                .entry((donor, recipient))
                .or_insert_with(|| MatchRecord {
                    id: MatchId::new(),
                    donor_id: donor,
                    recipient_id: recipient,
                    hospital: caller,
                    matched_at: 0,
                    retrieval_confirmed_at: None,
                });
            entry.retrieval_confirmed_at = Some(now);
            entry.clone()
        };
        let revision = self.commit(|revision| LedgerEvent::RetrievalConfirmed {
            revision,
            record: record.clone(),
        });
        Ok(Committed { revision, data: record })
    }

    pub async fn update_urgency(
        &self,
        caller: Address,
        recipient: RecipientId,
        level: UrgencyLevel,
    ) -> RegistryResult<Committed<Recipient>> {
        let contract = self.writer(caller, Operation::UpdateUrgency)?;
        let _guard = self.inner.write_lock.lock().await;
        let recipients = self.recipients_as(caller).await?;
        let ri = recipients
            .iter()
            .position(|r| r.id == recipient)
            .ok_or(RegistryError::RecipientNotFound(recipient))?;

        let call = contract.updateUrgencyLevel(U256::from(ri), U256::from(level.0));
        let pending = self.rpc(call.send()).await?;
        self.settle("update_urgency", *pending.tx_hash()).await?;

        let mut updated = recipients
            .into_iter()
            .nth(ri)
            .ok_or(RegistryError::RecipientNotFound(recipient))?;
        updated.urgency_level = level;
        let revision = self.commit(|revision| LedgerEvent::UrgencyUpdated {
            revision,
            recipient_id: recipient,
            urgency_level: level,
        });
        Ok(Committed { revision, data: updated })
    }
}

impl std::fmt::Debug for ContractLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractLedger")
            .field("address", &self.inner.address)
            .field("signers", &self.inner.signers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    const CONTRACT: Address = address!("0x37601c008FF4d292b654249DF3df1C9107F6C8FF");

    #[test]
    fn test_positional_ids_are_stable_and_distinct() {
        assert_eq!(donor_id(CONTRACT, 3), donor_id(CONTRACT, 3));
        assert_ne!(donor_id(CONTRACT, 3), donor_id(CONTRACT, 4));
        assert_ne!(donor_id(CONTRACT, 0).0, recipient_id(CONTRACT, 0).0);
        assert_ne!(donor_id(CONTRACT, 0), donor_id(Address::ZERO, 0));
    }

    async fn offline_ledger() -> ContractLedger {
        let config = BlockchainConfig {
            rpc_url: "http://127.0.0.1:1".into(),
            rpc_timeout_secs: 1,
            ..Default::default()
        };
        ledger_with(config).await
    }

    fn roles() -> ProvisionedRoles {
        ProvisionedRoles {
            admin: Address::repeat_byte(1),
            donor_storage: Address::repeat_byte(2),
            recipient_storage: Address::repeat_byte(3),
        }
    }

    async fn ledger_with(config: BlockchainConfig) -> ContractLedger {
        let client = BlockchainClient::new(config).await.unwrap();
        ContractLedger::from_parts(CONTRACT, roles(), client, SignerSet::default())
    }

    #[tokio::test]
    async fn test_mutation_without_signer_is_unauthorized() {
        let ledger = offline_ledger().await;
        let err = ledger
            .update_urgency(Address::repeat_byte(9), RecipientId::new(), UrgencyLevel(2))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Unauthorized { operation: Operation::UpdateUrgency, .. }
        ));
        assert_eq!(ledger.revision(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_node_is_transient() {
        let ledger = offline_ledger().await;
        let err = ledger.snapshot(Address::repeat_byte(1)).await.unwrap_err();
        assert!(err.is_transient(), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_reads_fail_over_when_primary_is_down() {
        let config = BlockchainConfig {
            rpc_url: "http://127.0.0.1:1".into(),
            failover_urls: vec![crate::blockchain::stub_node::spawn(0).await],
            chain_id: 1337,
            rpc_timeout_secs: 2,
            ..Default::default()
        };
        let ledger = ledger_with(config).await;

        let snapshot = ledger.snapshot(Address::repeat_byte(1)).await.unwrap();
        assert!(snapshot.donors.is_empty());
        assert!(snapshot.recipients.is_empty());
    }

    #[tokio::test]
    async fn test_reads_exhaust_every_endpoint() {
        let config = BlockchainConfig {
            rpc_url: "http://127.0.0.1:1".into(),
            failover_urls: vec!["http://127.0.0.1:2".into()],
            rpc_timeout_secs: 1,
            ..Default::default()
        };
        let ledger = ledger_with(config).await;
        let err = ledger.snapshot(Address::repeat_byte(1)).await.unwrap_err();
        assert!(err.is_transient(), "unexpected error: {err}");
    }
}
