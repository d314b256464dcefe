use crate::beacon_node::{AttesterDuty, BeaconNode, BeaconNodeError};
use crate::duties_service::DutiesService;
use crate::duty_timer::{DutyTimer, WaitOutcome};
use crate::metrics;
use crate::signing;
use crate::submitted_attestations::SubmittedAttestations;
use crate::validator_store::{Error as ValidatorStoreError, ValidatorStore};
use slashing_protection::NotSafe;
use slog::{crit, error, info, warn};
use slot_clock::SlotClock;
use std::ops::Deref;
use std::sync::Arc;
use task_executor::TaskExecutor;
use tokio::time::sleep;
use types::{
    Attestation, BitList, ChainSpec, CommitteeIndex, Hash256, MaxValidatorsPerCommittee,
    PublicKeyBytes, Slot,
};

#[derive(Debug, PartialEq)]
pub enum AttestationError {
    /// The duty's committee has no members.
    EmptyCommittee,
    /// The beacon node had no attestation data for the slot and committee.
    NoAttestationData,
    AttestationDataUnavailable(BeaconNodeError),
    /// The beacon node returned data for a different slot or committee than the duty.
    InconsistentData {
        expected_slot: Slot,
        got_slot: Slot,
        expected_index: CommitteeIndex,
        got_index: CommitteeIndex,
    },
    /// The validator's position does not fit within the committee bitfield.
    InvalidCommitteePosition {
        position: usize,
        committee_length: usize,
    },
    UnknownPubkey(PublicKeyBytes),
    Signing(signing::Error),
    /// Slashing protection refused to record the attestation.
    Slashable(NotSafe),
    SubmissionFailed(BeaconNodeError),
}

impl From<ValidatorStoreError> for AttestationError {
    fn from(e: ValidatorStoreError) -> Self {
        match e {
            ValidatorStoreError::UnknownPubkey(pubkey) => AttestationError::UnknownPubkey(pubkey),
            ValidatorStoreError::Slashable(not_safe) => AttestationError::Slashable(not_safe),
            ValidatorStoreError::UnableToSign(e) => AttestationError::Signing(e),
        }
    }
}

impl AttestationError {
    fn metric_label(&self) -> &'static str {
        match self {
            AttestationError::EmptyCommittee
            | AttestationError::InconsistentData { .. }
            | AttestationError::InvalidCommitteePosition { .. }
            | AttestationError::UnknownPubkey(_) => metrics::INVALID,
            AttestationError::NoAttestationData
            | AttestationError::AttestationDataUnavailable(_)
            | AttestationError::Signing(_) => metrics::UNAVAILABLE,
            AttestationError::Slashable(_) => metrics::SLASHABLE,
            AttestationError::SubmissionFailed(_) => metrics::SUBMISSION_FAILED,
        }
    }
}

/// A successfully submitted attestation.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedAttestation {
    pub slot: Slot,
    pub signing_root: Hash256,
    pub head_block: Hash256,
    pub wait: WaitOutcome,
    /// The same attestation had already been submitted.
    pub duplicate: bool,
}

pub struct Inner<T, S> {
    duties_service: Arc<DutiesService<T>>,
    validator_store: Arc<ValidatorStore<T>>,
    beacon_node: Arc<T>,
    timer: Arc<DutyTimer<S>>,
    submitted: SubmittedAttestations,
    context: TaskExecutor,
    spec: Arc<ChainSpec>,
}

/// Attempts to produce an attestation for every managed validator with a duty in each slot.
///
/// The service is cheap to clone, all clones share the same state.
pub struct AttestationService<T, S> {
    inner: Arc<Inner<T, S>>,
}

impl<T, S> Clone for AttestationService<T, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, S> Deref for AttestationService<T, S> {
    type Target = Inner<T, S>;

    fn deref(&self) -> &Self::Target {
        self.inner.deref()
    }
}

impl<T: BeaconNode, S: SlotClock + 'static> AttestationService<T, S> {
    pub fn new(
        duties_service: Arc<DutiesService<T>>,
        validator_store: Arc<ValidatorStore<T>>,
        beacon_node: Arc<T>,
        timer: Arc<DutyTimer<S>>,
        context: TaskExecutor,
        spec: Arc<ChainSpec>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                duties_service,
                validator_store,
                beacon_node,
                timer,
                submitted: SubmittedAttestations::new(),
                context,
                spec,
            }),
        }
    }

    /// Starts the service which periodically produces attestations.
    pub fn start_update_service(self) -> Result<(), String> {
        let log = self.context.log().clone();
        let slot_clock = self.timer.slot_clock().clone();

        let duration_to_next_slot = slot_clock
            .duration_to_next_slot()
            .ok_or("Unable to determine duration to next slot")?;

        info!(
            log,
            "Attestation production service started";
            "next_update_millis" => duration_to_next_slot.as_millis()
        );

        let executor = self.context.clone();

        let interval_fut = async move {
            loop {
                if let Some(duration_to_next_slot) = slot_clock.duration_to_next_slot() {
                    sleep(duration_to_next_slot).await;

                    match slot_clock.now() {
                        Some(slot) => self.spawn_attestation_tasks(slot),
                        None => error!(log, "Failed to read slot clock"),
                    }
                } else {
                    error!(log, "Failed to read slot clock");
                    // If we can't read the slot clock, just wait another slot.
                    sleep(slot_clock.slot_duration()).await;
                }
            }
        };

        executor.spawn(interval_fut, metrics::ATTESTATION_SERVICE);
        Ok(())
    }

    /// Spawn one task per attester duty at `slot`.
    fn spawn_attestation_tasks(&self, slot: Slot) {
        let service = self.clone();
        self.context.spawn(
            async move {
                for duty in service.duties_service.attesters(slot).await {
                    let duty_service = service.clone();
                    service.context.spawn(
                        async move { duty_service.attest_and_log(duty).await },
                        "attestation_duty",
                    );
                }
            },
            "attestation_duties",
        );
    }

    async fn attest_and_log(&self, duty: AttesterDuty) {
        let log = self.context.log();
        let result = self.attest(&duty).await;

        let label = match &result {
            Ok(published) if published.duplicate => metrics::DUPLICATE,
            Ok(_) => metrics::SUCCESS,
            Err(e) => e.metric_label(),
        };
        metrics::inc_counter_vec(&metrics::ATTESTATION_OUTCOMES, &[label]);

        match result {
            Ok(published) if published.duplicate => warn!(
                log,
                "Published duplicate attestation";
                "slot" => published.slot,
                "committee_index" => duty.committee_index,
                "validator" => &duty.pubkey,
            ),
            Ok(published) => info!(
                log,
                "Successfully published attestation";
                "slot" => published.slot,
                "committee_index" => duty.committee_index,
                "head_block" => ?published.head_block,
                "trigger" => published.wait.as_str(),
                "validator" => &duty.pubkey,
            ),
            Err(AttestationError::Slashable(e)) => crit!(
                log,
                "Not signing slashable attestation";
                "reason" => e.reason(),
                "error" => %e,
                "slot" => duty.slot,
                "validator" => &duty.pubkey,
            ),
            Err(AttestationError::InconsistentData {
                expected_slot,
                got_slot,
                expected_index,
                got_index,
            }) => crit!(
                log,
                "Inconsistent attestation data from beacon node";
                "expected_slot" => expected_slot,
                "got_slot" => got_slot,
                "expected_index" => expected_index,
                "got_index" => got_index,
                "validator" => &duty.pubkey,
            ),
            Err(AttestationError::EmptyCommittee) => warn!(
                log,
                "Attester duty has an empty committee";
                "slot" => duty.slot,
                "committee_index" => duty.committee_index,
                "validator" => &duty.pubkey,
            ),
            Err(e) => error!(
                log,
                "Failed to produce attestation";
                "error" => ?e,
                "slot" => duty.slot,
                "committee_index" => duty.committee_index,
                "validator" => &duty.pubkey,
            ),
        }
    }

    /// Produce, sign, record and submit the attestation for a single duty.
    ///
    /// Nothing is submitted unless slashing protection has durably recorded the attestation.
    pub async fn attest(
        &self,
        duty: &AttesterDuty,
    ) -> Result<PublishedAttestation, AttestationError> {
        let committee_length = duty.committee_length();
        if committee_length == 0 {
            return Err(AttestationError::EmptyCommittee);
        }

        let timer = metrics::start_timer_vec(&metrics::DUTY_TIMES, &[metrics::ATTESTATION_WAIT]);
        let wait = self.timer.wait_one_third_or_valid_block(duty.slot).await;
        metrics::stop_timer(timer);

        let data = self
            .beacon_node
            .attestation_data(duty.slot, duty.committee_index)
            .await
            .map_err(AttestationError::AttestationDataUnavailable)?
            .ok_or(AttestationError::NoAttestationData)?;

        if data.slot != duty.slot || data.index != duty.committee_index {
            return Err(AttestationError::InconsistentData {
                expected_slot: duty.slot,
                got_slot: data.slot,
                expected_index: duty.committee_index,
                got_index: data.index,
            });
        }

        let aggregation_bits = committee_bits(committee_length, duty.validator_committee_index)?;

        let signed = self
            .validator_store
            .sign_attestation(&duty.pubkey, &data)
            .await?;

        let attestation = Attestation {
            aggregation_bits,
            data,
            signature: signed.signature,
        };
        let slot = attestation.data.slot;
        let head_block = attestation.data.beacon_block_root;

        self.beacon_node
            .submit_attestation(attestation)
            .await
            .map_err(AttestationError::SubmissionFailed)?;

        let duplicate = !self.submitted.record(
            slot,
            duty.committee_index,
            signed.signing_root,
            duty.pubkey.clone(),
        );

        Ok(PublishedAttestation {
            slot,
            signing_root: signed.signing_root,
            head_block,
            wait,
            duplicate,
        })
    }

    pub fn spec(&self) -> &ChainSpec {
        &self.spec
    }
}

/// A committee participation bitfield of `committee_length` with only `position` set.
pub fn committee_bits(
    committee_length: usize,
    position: usize,
) -> Result<BitList<MaxValidatorsPerCommittee>, AttestationError> {
    let invalid = || AttestationError::InvalidCommitteePosition {
        position,
        committee_length,
    };
    let mut bits = BitList::with_capacity(committee_length).map_err(|_| invalid())?;
    bits.set(position, true).map_err(|_| invalid())?;
    Ok(bits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duty_timer::ValidBlockEvents;
    use crate::signing::SigningEngine;
    use crate::testing::{test_attestation_data, test_pubkey, MockBeaconNode, MockSigner};
    use logging::test_logger;
    use slashing_protection::{InvalidAttestation, SlashingDatabase};
    use slot_clock::ManualSlotClock;
    use std::time::Duration;
    use task_executor::test_utils::TestRuntime;
    use tempfile::{tempdir, TempDir};
    use types::Epoch;

    struct Harness {
        _dir: TempDir,
        _runtime: TestRuntime,
        beacon_node: Arc<MockBeaconNode>,
        events: ValidBlockEvents,
        service: AttestationService<MockBeaconNode, ManualSlotClock>,
    }

    fn harness() -> Harness {
        let dir = tempdir().unwrap();
        let runtime = TestRuntime::new(test_logger());
        let spec = Arc::new(ChainSpec::minimal());
        let beacon_node = Arc::new(MockBeaconNode::default());
        let db = SlashingDatabase::create(&dir.path().join("db.sqlite")).unwrap();
        let signing = SigningEngine::new(
            beacon_node.clone(),
            Arc::new(MockSigner::default()),
            spec.clone(),
        );
        let store = Arc::new(
            ValidatorStore::new(
                Arc::new(db),
                signing,
                vec![test_pubkey(0)],
                spec.clone(),
                test_logger(),
            )
            .unwrap(),
        );
        let duties = Arc::new(DutiesService::new(
            beacon_node.clone(),
            store.clone(),
            spec.clone(),
            test_logger(),
        ));
        let clock = ManualSlotClock::new(
            Slot::new(0),
            Duration::from_secs(1_000),
            spec.slot_duration(),
        );
        clock.set_slot(16);
        let events = ValidBlockEvents::new();
        let timer = Arc::new(DutyTimer::new(clock, events.clone(), true));
        let service = AttestationService::new(
            duties,
            store,
            beacon_node.clone(),
            timer,
            runtime.task_executor.clone(),
            spec,
        );
        Harness {
            _dir: dir,
            _runtime: runtime,
            beacon_node,
            events,
            service,
        }
    }

    fn duty(committee_length: usize, position: usize) -> AttesterDuty {
        AttesterDuty {
            pubkey: test_pubkey(0),
            validator_index: 0,
            slot: Slot::new(16),
            committee_index: 1,
            committee_members: (0..committee_length as u64).collect(),
            validator_committee_index: position,
        }
    }

    #[test]
    fn bitfield_has_single_bit() {
        let bits = committee_bits(9, 4).unwrap();
        assert_eq!(bits.len(), 9);
        assert_eq!(bits.num_set_bits(), 1);
        assert_eq!(bits.get(4), Ok(true));
    }

    #[test]
    fn bitfield_position_out_of_range() {
        assert_eq!(
            committee_bits(3, 3),
            Err(AttestationError::InvalidCommitteePosition {
                position: 3,
                committee_length: 3
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn attestation_published() {
        let harness = harness();
        harness.events.publish(Slot::new(16));
        *harness.beacon_node.attestation_data.lock() =
            Some(test_attestation_data(Slot::new(16), 1, Epoch::new(2)));

        let published = harness.service.attest(&duty(9, 4)).await.unwrap();
        assert_eq!(published.wait, WaitOutcome::AlreadyKnown);
        assert!(!published.duplicate);

        let submitted = harness.beacon_node.submitted_attestations.lock();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].aggregation_bits.len(), 9);
        assert_eq!(submitted[0].num_set_aggregation_bits(), 1);
        assert_eq!(submitted[0].aggregation_bits.get(4), Ok(true));
    }

    #[tokio::test(start_paused = true)]
    async fn repeat_reported_as_duplicate() {
        let harness = harness();
        harness.events.publish(Slot::new(16));
        *harness.beacon_node.attestation_data.lock() =
            Some(test_attestation_data(Slot::new(16), 1, Epoch::new(2)));

        assert!(!harness.service.attest(&duty(4, 0)).await.unwrap().duplicate);
        assert!(harness.service.attest(&duty(4, 0)).await.unwrap().duplicate);
    }

    #[tokio::test(start_paused = true)]
    async fn slashable_attestation_not_submitted() {
        let harness = harness();
        harness.events.publish(Slot::new(16));
        let data = test_attestation_data(Slot::new(16), 1, Epoch::new(2));
        *harness.beacon_node.attestation_data.lock() = Some(data.clone());
        harness.service.attest(&duty(4, 0)).await.unwrap();

        let mut conflicting = data;
        conflicting.beacon_block_root = Hash256::repeat_byte(0xee);
        *harness.beacon_node.attestation_data.lock() = Some(conflicting);

        assert!(matches!(
            harness.service.attest(&duty(4, 0)).await,
            Err(AttestationError::Slashable(NotSafe::InvalidAttestation(
                InvalidAttestation::DoubleVote(_)
            )))
        ));
        assert_eq!(harness.beacon_node.submitted_attestations.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn data_for_another_duty_not_signed() {
        let harness = harness();
        harness.events.publish(Slot::new(23));
        *harness.beacon_node.attestation_data.lock() =
            Some(test_attestation_data(Slot::new(23), 5, Epoch::new(2)));

        assert_eq!(
            harness.service.attest(&duty(9, 4)).await,
            Err(AttestationError::InconsistentData {
                expected_slot: Slot::new(16),
                got_slot: Slot::new(23),
                expected_index: 1,
                got_index: 5,
            })
        );
        assert!(harness.beacon_node.submitted_attestations.lock().is_empty());
        assert!(harness
            .service
            .validator_store
            .slashing_protection()
            .attestation_history(&test_pubkey(0))
            .unwrap()
            .is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_committee_not_signed() {
        let harness = harness();
        assert_eq!(
            harness.service.attest(&duty(0, 0)).await,
            Err(AttestationError::EmptyCommittee)
        );
        assert!(harness.beacon_node.submitted_attestations.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_data_waits_for_deadline() {
        let harness = harness();
        let start = tokio::time::Instant::now();
        assert_eq!(
            harness.service.attest(&duty(4, 0)).await,
            Err(AttestationError::NoAttestationData)
        );
        assert_eq!(start.elapsed(), harness.service.spec().slot_duration() / 3);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_fork_info_is_an_error() {
        let harness = harness();
        harness.events.publish(Slot::new(16));
        *harness.beacon_node.attestation_data.lock() =
            Some(test_attestation_data(Slot::new(16), 1, Epoch::new(2)));
        *harness.beacon_node.fork_info.lock() = None;

        assert_eq!(
            harness.service.attest(&duty(4, 0)).await,
            Err(AttestationError::Signing(
                signing::Error::DomainDataUnavailable
            ))
        );
        assert!(harness.beacon_node.submitted_attestations.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn submission_failure_reported() {
        let harness = harness();
        harness.events.publish(Slot::new(16));
        *harness.beacon_node.attestation_data.lock() =
            Some(test_attestation_data(Slot::new(16), 1, Epoch::new(2)));
        *harness.beacon_node.fail_submissions.lock() = true;

        assert!(matches!(
            harness.service.attest(&duty(4, 0)).await,
            Err(AttestationError::SubmissionFailed(_))
        ));
    }
}
