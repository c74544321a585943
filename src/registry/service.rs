//! Registry operations.
//!
//! # Responsibilities
//! - Gate every operation on the caller's role
//! - Validate intake before anything reaches the ledger
//! - Retry idempotent reads; never retry mutations
//! - Honour `min_revision` so callers read their own writes
//! - Record metrics for every outcome

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::config::{ConsistencyConfig, RegistryConfig, RetryConfig, UrgencyScale};
use crate::ledger::{Committed, Ledger, LedgerEvent, Snapshot};
use crate::matching::view::{filter_donors, filter_recipients};
use crate::matching::{
    DonorFilter, MatchEngine, RecipientFilter, RegistryStats, StandardPolicy, UrgencySort,
};
use crate::observability::metrics;
use crate::registry::error::{RegistryError, RegistryResult};
use crate::registry::types::{
    Donor, DonorId, Hospital, MatchRecord, NewDonor, NewHospital, NewRecipient, Recipient,
    RecipientId,
};
use crate::resilience::retry_read;
use crate::security::grants::CallerContext;
use crate::security::roles::Operation;

/// A list read together with the revision it reflects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing<T> {
    pub revision: u64,
    pub items: Vec<T>,
}

/// The registry service. Cheap to clone; clones share the ledger.
#[derive(Debug, Clone)]
pub struct Registry {
    ledger: Ledger,
    engine: MatchEngine,
    urgency: UrgencyScale,
    retries: RetryConfig,
    consistency: ConsistencyConfig,
}

impl Registry {
    pub fn new(ledger: Ledger, config: &RegistryConfig) -> Self {
        let engine = MatchEngine::new(Arc::new(StandardPolicy::from_config(&config.matching)));
        Self::with_engine(ledger, engine, config)
    }

    pub fn with_engine(ledger: Ledger, engine: MatchEngine, config: &RegistryConfig) -> Self {
        Self {
            ledger,
            engine,
            urgency: config.urgency,
            retries: config.retries.clone(),
            consistency: config.consistency.clone(),
        }
    }

    /// Same ledger, new tunables. Used on config reload.
    pub fn reconfigure(&self, config: &RegistryConfig) -> Self {
        Self::new(self.ledger.clone(), config)
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn urgency_scale(&self) -> UrgencyScale {
        self.urgency
    }

    pub fn policy_name(&self) -> &'static str {
        self.engine.policy_name()
    }

    pub fn revision(&self) -> u64 {
        self.ledger.revision()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.ledger.subscribe()
    }

    pub async fn is_healthy(&self) -> bool {
        let healthy = self.ledger.is_healthy().await;
        metrics::record_ledger_health(self.ledger.backend(), healthy);
        healthy
    }

    /// Flush durable ledger state.
    pub async fn persist(&self) -> RegistryResult<()> {
        self.ledger.persist().await
    }

    fn authorize(&self, caller: &CallerContext, operation: Operation) -> RegistryResult<()> {
        if caller.may(operation) {
            Ok(())
        } else {
            tracing::warn!(
                caller = %caller.address,
                role = %caller.role,
                %operation,
                "Role not permitted"
            );
            Err(RegistryError::Unauthorized {
                address: caller.address,
                operation,
            })
        }
    }

    async fn timed<T, F>(&self, op: &'static str, fut: F) -> RegistryResult<T>
    where
        F: Future<Output = RegistryResult<T>>,
    {
        let start = Instant::now();
        let result = fut.await;
        metrics::record_ledger_call(op, self.ledger.backend(), start);
        result
    }

    /// Block until the ledger has committed `required`, or fail as stale.
    async fn await_revision(&self, required: Option<u64>) -> RegistryResult<()> {
        let Some(required) = required else {
            return Ok(());
        };
        // Subscribe before checking so a commit in between is not missed.
        let mut events = self.ledger.subscribe();
        if self.ledger.revision() >= required {
            return Ok(());
        }

        let wait = async {
            loop {
                match events.recv().await {
                    Ok(event) if event.revision() >= required => return,
                    Ok(_) | Err(RecvError::Lagged(_)) => {
                        if self.ledger.revision() >= required {
                            return;
                        }
                    }
                    Err(RecvError::Closed) => return,
                }
            }
        };
        let limit = Duration::from_millis(self.consistency.max_wait_ms);
        let _ = tokio::time::timeout(limit, wait).await;

        let current = self.ledger.revision();
        if current >= required {
            Ok(())
        } else {
            tracing::warn!(current, required, "Read-your-writes wait expired");
            Err(RegistryError::StaleSnapshot { current, required })
        }
    }

    async fn snapshot(&self, caller: &CallerContext, min_revision: Option<u64>) -> RegistryResult<Snapshot> {
        self.authorize(caller, Operation::ReadRegistry)?;
        self.await_revision(min_revision).await?;
        let address = caller.address;
        let snapshot = self
            .timed(
                "snapshot",
                retry_read(&self.retries, "snapshot", || self.ledger.snapshot(address)),
            )
            .await?;
        metrics::record_population(snapshot.donors.len(), snapshot.recipients.len());
        Ok(snapshot)
    }

    async fn match_records(&self, address: Address) -> RegistryResult<Vec<MatchRecord>> {
        self.timed(
            "matches",
            retry_read(&self.retries, "matches", || self.ledger.matches(address)),
        )
        .await
    }

    pub async fn register_hospital(
        &self,
        caller: &CallerContext,
        request: NewHospital,
    ) -> RegistryResult<Committed<Hospital>> {
        self.authorize(caller, Operation::RegisterHospital)?;
        let result = async {
            request.validate()?;
            self.timed(
                "register_hospital",
                self.ledger.register_hospital(caller.address, request),
            )
            .await
        }
        .await;
        metrics::record_registration("hospital", result.is_ok());
        if let Err(e) = &result {
            tracing::warn!(caller = %caller.address, error = %e, "Hospital registration failed");
        }
        result
    }

    pub async fn register_donor(
        &self,
        caller: &CallerContext,
        request: NewDonor,
    ) -> RegistryResult<Committed<Donor>> {
        self.authorize(caller, Operation::RegisterDonor)?;
        let result = async {
            request.validate()?;
            self.timed("register_donor", self.ledger.register_donor(caller.address, request))
                .await
        }
        .await;
        metrics::record_registration("donor", result.is_ok());
        if let Err(e) = &result {
            tracing::warn!(caller = %caller.address, error = %e, "Donor registration failed");
        }
        result
    }

    pub async fn register_recipient(
        &self,
        caller: &CallerContext,
        request: NewRecipient,
    ) -> RegistryResult<Committed<Recipient>> {
        self.authorize(caller, Operation::RegisterRecipient)?;
        let result = async {
            let level = request.validate(&self.urgency)?;
            self.timed(
                "register_recipient",
                self.ledger.register_recipient(caller.address, request, level),
            )
            .await
        }
        .await;
        metrics::record_registration("recipient", result.is_ok());
        if let Err(e) = &result {
            tracing::warn!(caller = %caller.address, error = %e, "Recipient registration failed");
        }
        result
    }

    pub async fn donors(
        &self,
        caller: &CallerContext,
        filter: &DonorFilter,
        min_revision: Option<u64>,
    ) -> RegistryResult<Listing<Donor>> {
        let snapshot = self.snapshot(caller, min_revision).await?;
        Ok(Listing {
            revision: snapshot.revision,
            items: filter_donors(&snapshot.donors, filter),
        })
    }

    pub async fn recipients(
        &self,
        caller: &CallerContext,
        filter: &RecipientFilter,
        sort: UrgencySort,
        min_revision: Option<u64>,
    ) -> RegistryResult<Listing<Recipient>> {
        let snapshot = self.snapshot(caller, min_revision).await?;
        Ok(Listing {
            revision: snapshot.revision,
            items: filter_recipients(&snapshot.recipients, filter, sort),
        })
    }

    /// Available donors the policy accepts for one recipient.
    pub async fn candidates(
        &self,
        caller: &CallerContext,
        recipient_id: RecipientId,
        min_revision: Option<u64>,
    ) -> RegistryResult<Listing<Donor>> {
        let snapshot = self.snapshot(caller, min_revision).await?;
        let recipient = snapshot
            .recipient(recipient_id)
            .ok_or(RegistryError::RecipientNotFound(recipient_id))?;
        let items = self
            .engine
            .candidates(recipient, &snapshot.donors)
            .into_iter()
            .cloned()
            .collect();
        Ok(Listing {
            revision: snapshot.revision,
            items,
        })
    }

    pub async fn match_organ(
        &self,
        caller: &CallerContext,
        donor_id: DonorId,
        recipient_id: RecipientId,
    ) -> RegistryResult<Committed<MatchRecord>> {
        self.authorize(caller, Operation::MatchOrgan)?;
        let result = self
            .timed(
                "match_organ",
                self.ledger
                    .match_organ(caller.address, donor_id, recipient_id, &self.engine),
            )
            .await;
        metrics::record_match(result.is_ok());
        if let Err(e) = &result {
            tracing::warn!(
                caller = %caller.address,
                %donor_id,
                %recipient_id,
                policy = self.engine.policy_name(),
                error = %e,
                "Match rejected"
            );
        }
        result
    }

    pub async fn confirm_retrieval(
        &self,
        caller: &CallerContext,
        donor_id: DonorId,
        recipient_id: RecipientId,
    ) -> RegistryResult<Committed<MatchRecord>> {
        self.authorize(caller, Operation::ConfirmRetrieval)?;
        let result = self
            .timed(
                "confirm_retrieval",
                self.ledger
                    .confirm_retrieval(caller.address, donor_id, recipient_id),
            )
            .await;
        metrics::record_retrieval(result.is_ok());
        if let Err(e) = &result {
            tracing::warn!(
                caller = %caller.address,
                %donor_id,
                %recipient_id,
                error = %e,
                "Retrieval confirmation failed"
            );
        }
        result
    }

    /// Validates `level` against the scale before the ledger sees it.
    pub async fn update_urgency(
        &self,
        caller: &CallerContext,
        recipient_id: RecipientId,
        level: i64,
    ) -> RegistryResult<Committed<Recipient>> {
        self.authorize(caller, Operation::UpdateUrgency)?;
        let result = async {
            let level = self.urgency.level(level)?;
            self.timed(
                "update_urgency",
                self.ledger.update_urgency(caller.address, recipient_id, level),
            )
            .await
        }
        .await;
        metrics::record_urgency_update(result.is_ok());
        if let Err(e) = &result {
            tracing::warn!(
                caller = %caller.address,
                %recipient_id,
                error = %e,
                "Urgency update failed"
            );
        }
        result
    }

    pub async fn matches(
        &self,
        caller: &CallerContext,
        min_revision: Option<u64>,
    ) -> RegistryResult<Listing<MatchRecord>> {
        self.authorize(caller, Operation::ReadRegistry)?;
        self.await_revision(min_revision).await?;
        let revision = self.ledger.revision();
        let items = self.match_records(caller.address).await?;
        Ok(Listing { revision, items })
    }

    pub async fn stats(
        &self,
        caller: &CallerContext,
        min_revision: Option<u64>,
    ) -> RegistryResult<RegistryStats> {
        let snapshot = self.snapshot(caller, min_revision).await?;
        let matches = self.match_records(caller.address).await?;
        Ok(RegistryStats::compute(
            snapshot.revision,
            &snapshot.donors,
            &snapshot.recipients,
            &matches,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{MemoryLedger, ProvisionedRoles};
    use crate::registry::types::UrgencyLevel;
    use crate::security::roles::Role;
    use alloy::primitives::Address;

    fn callers() -> (CallerContext, CallerContext, CallerContext, CallerContext) {
        (
            CallerContext::new(Address::repeat_byte(1), Role::Admin),
            CallerContext::new(Address::repeat_byte(2), Role::DonorIntake),
            CallerContext::new(Address::repeat_byte(3), Role::RecipientIntake),
            CallerContext::new(Address::repeat_byte(4), Role::Hospital),
        )
    }

    async fn registry() -> Registry {
        let (admin, donor_intake, recipient_intake, hospital) = callers();
        let roles = ProvisionedRoles {
            admin: admin.address,
            donor_storage: donor_intake.address,
            recipient_storage: recipient_intake.address,
        };
        let mut config = RegistryConfig::default();
        config.consistency.max_wait_ms = 50;
        let registry = Registry::new(Ledger::Memory(MemoryLedger::new(roles, None)), &config);
        registry
            .register_hospital(
                &admin,
                NewHospital {
                    address: hospital.address,
                    name: "General".into(),
                    location: "Abuja".into(),
                    contact_info: "desk".into(),
                },
            )
            .await
            .unwrap();
        registry
    }

    fn donor_request(organ: &str, blood: &str) -> NewDonor {
        NewDonor {
            name: "Kofi".into(),
            age: 29,
            blood_type: blood.into(),
            organ: organ.into(),
            tissue_type: "A2".into(),
        }
    }

    fn recipient_request(organ: &str, blood: &str, urgency: i64) -> NewRecipient {
        NewRecipient {
            name: "Efua".into(),
            age: 61,
            blood_type: blood.into(),
            needed_organ: organ.into(),
            tissue_type: "A2".into(),
            urgency_level: urgency,
        }
    }

    #[tokio::test]
    async fn test_role_gate_runs_before_ledger() {
        let registry = registry().await;
        let (_, donor_intake, _, hospital) = callers();
        let err = registry
            .register_donor(&hospital, donor_request("Kidney", "O+"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Unauthorized { .. }));
        let err = registry
            .donors(&donor_intake, &DonorFilter::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Unauthorized { operation: Operation::ReadRegistry, .. }
        ));
    }

    #[tokio::test]
    async fn test_out_of_range_urgency_never_reaches_ledger() {
        let registry = registry().await;
        let (_, _, recipient_intake, hospital) = callers();
        let before = registry.revision();
        let err = registry
            .register_recipient(&recipient_intake, recipient_request("Kidney", "O+", 11))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::UrgencyOutOfRange { value: 11, .. }));

        let recipient = registry
            .register_recipient(&recipient_intake, recipient_request("Kidney", "O+", 3))
            .await
            .unwrap()
            .data;
        let err = registry
            .update_urgency(&hospital, recipient.id, -2)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::UrgencyOutOfRange { value: -2, .. }));
        assert_eq!(registry.revision(), before + 1);
    }

    #[tokio::test]
    async fn test_read_your_writes() {
        let registry = registry().await;
        let (_, donor_intake, _, hospital) = callers();
        let committed = registry
            .register_donor(&donor_intake, donor_request("Kidney", "O+"))
            .await
            .unwrap();
        let listing = registry
            .donors(&hospital, &DonorFilter::default(), Some(committed.revision))
            .await
            .unwrap();
        assert!(listing.revision >= committed.revision);
        assert!(listing.items.iter().any(|d| d.id == committed.data.id));
    }

    #[tokio::test]
    async fn test_future_revision_is_stale() {
        let registry = registry().await;
        let (_, _, _, hospital) = callers();
        let err = registry
            .donors(&hospital, &DonorFilter::default(), Some(99))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::StaleSnapshot { required: 99, .. }));
    }

    #[tokio::test]
    async fn test_candidates_then_match_then_stats() {
        let registry = registry().await;
        let (admin, donor_intake, recipient_intake, hospital) = callers();
        let compatible = registry
            .register_donor(&donor_intake, donor_request("Kidney", "O-"))
            .await
            .unwrap()
            .data;
        registry
            .register_donor(&donor_intake, donor_request("Heart", "O-"))
            .await
            .unwrap();
        let recipient = registry
            .register_recipient(&recipient_intake, recipient_request("kidney", "B+", 8))
            .await
            .unwrap()
            .data;

        let candidates = registry.candidates(&hospital, recipient.id, None).await.unwrap();
        assert_eq!(candidates.items.len(), 1);
        assert_eq!(candidates.items[0].id, compatible.id);

        registry
            .match_organ(&hospital, compatible.id, recipient.id)
            .await
            .unwrap();
        let updated = registry
            .update_urgency(&hospital, recipient.id, 10)
            .await
            .unwrap();
        assert_eq!(updated.data.urgency_level, UrgencyLevel(10));

        let stats = registry.stats(&admin, None).await.unwrap();
        assert_eq!(stats.donors, 2);
        assert_eq!(stats.available_donors, 1);
        assert_eq!(stats.matches, 1);
        assert_eq!(stats.confirmed_retrievals, 0);

        registry
            .confirm_retrieval(&hospital, compatible.id, recipient.id)
            .await
            .unwrap();
        let stats = registry.stats(&hospital, None).await.unwrap();
        assert_eq!(stats.confirmed_retrievals, 1);
    }

    #[test]
    fn test_out_of_range_urgency_is_metered() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        ::metrics::with_local_recorder(&recorder, || {
            runtime.block_on(async {
                let registry = registry().await;
                let (_, _, _, hospital) = callers();
                let err = registry
                    .update_urgency(&hospital, RecipientId::new(), 42)
                    .await
                    .unwrap_err();
                assert!(matches!(err, RegistryError::UrgencyOutOfRange { value: 42, .. }));
            })
        });

        let rendered = handle.render();
        assert!(
            rendered.contains(r#"registry_urgency_updates_total{outcome="failure"} 1"#),
            "{rendered}"
        );
    }

    #[tokio::test]
    async fn test_stats_ride_out_a_flaky_node() {
        use crate::blockchain::{stub_node, BlockchainClient, SignerSet};
        use crate::ledger::ContractLedger;

        let (admin, donor_intake, recipient_intake, _) = callers();
        let mut config = RegistryConfig::default();
        config.blockchain.rpc_url = stub_node::spawn(2).await;
        config.blockchain.rpc_timeout_secs = 2;
        config.retries.base_delay_ms = 1;
        config.retries.max_delay_ms = 5;
        let client = BlockchainClient::new(config.blockchain.clone()).await.unwrap();
        let roles = ProvisionedRoles {
            admin: admin.address,
            donor_storage: donor_intake.address,
            recipient_storage: recipient_intake.address,
        };
        let ledger = ContractLedger::from_parts(Address::repeat_byte(7), roles, client, SignerSet::default());
        let registry = Registry::new(Ledger::Contract(ledger), &config);

        let stats = registry.stats(&admin, None).await.unwrap();
        assert_eq!(stats.donors, 0);
        assert_eq!(stats.matches, 0);
        let matches = registry.matches(&admin, None).await.unwrap();
        assert!(matches.items.is_empty());
    }
}
