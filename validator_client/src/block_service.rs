use crate::beacon_node::{BeaconNode, BeaconNodeError, ProposerDuty};
use crate::duties_service::DutiesService;
use crate::duty_timer::DutyTimer;
use crate::graffiti::GraffitiSelector;
use crate::metrics;
use crate::signing;
use crate::validator_store::{Error as ValidatorStoreError, ValidatorStore};
use slashing_protection::NotSafe;
use slog::{crit, error, info, warn};
use slot_clock::SlotClock;
use std::ops::Deref;
use std::sync::Arc;
use task_executor::TaskExecutor;
use tokio::time::sleep;
use types::{BlockType, ChainSpec, Graffiti, Hash256, PublicKeyBytes, SignedBlock, Slot};

#[derive(Debug, PartialEq)]
pub enum BlockError {
    /// No block is ever proposed at the genesis slot.
    GenesisSlot,
    /// The beacon node could not produce a block for the slot.
    NoBlock,
    /// The beacon node returned a block for a different slot.
    SlotMismatch { expected: Slot, got: Slot },
    /// The beacon node returned a block for a different proposer.
    ProposerMismatch { expected: u64, got: u64 },
    BeaconNode(BeaconNodeError),
    UnknownPubkey(PublicKeyBytes),
    Signing(signing::Error),
    /// Slashing protection refused to record the block.
    Slashable(NotSafe),
    SubmissionFailed(BeaconNodeError),
}

impl From<ValidatorStoreError> for BlockError {
    fn from(e: ValidatorStoreError) -> Self {
        match e {
            ValidatorStoreError::UnknownPubkey(pubkey) => BlockError::UnknownPubkey(pubkey),
            ValidatorStoreError::Slashable(not_safe) => BlockError::Slashable(not_safe),
            ValidatorStoreError::UnableToSign(e) => BlockError::Signing(e),
        }
    }
}

impl BlockError {
    fn metric_label(&self) -> &'static str {
        match self {
            BlockError::GenesisSlot
            | BlockError::SlotMismatch { .. }
            | BlockError::ProposerMismatch { .. }
            | BlockError::UnknownPubkey(_) => metrics::INVALID,
            BlockError::NoBlock | BlockError::BeaconNode(_) | BlockError::Signing(_) => {
                metrics::UNAVAILABLE
            }
            BlockError::Slashable(_) => metrics::SLASHABLE,
            BlockError::SubmissionFailed(_) => metrics::SUBMISSION_FAILED,
        }
    }
}

/// A successfully submitted block proposal.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedBlock {
    pub slot: Slot,
    pub signing_root: Hash256,
    pub block_type: BlockType,
    pub graffiti: Graffiti,
}

pub struct Inner<T, S> {
    duties_service: Arc<DutiesService<T>>,
    validator_store: Arc<ValidatorStore<T>>,
    beacon_node: Arc<T>,
    timer: Arc<DutyTimer<S>>,
    graffiti: GraffitiSelector,
    builder_proposals: bool,
    context: TaskExecutor,
    spec: Arc<ChainSpec>,
}

/// Attempts to propose a block whenever a managed validator is the proposer for a slot.
pub struct BlockService<T, S> {
    inner: Arc<Inner<T, S>>,
}

impl<T, S> Clone for BlockService<T, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, S> Deref for BlockService<T, S> {
    type Target = Inner<T, S>;

    fn deref(&self) -> &Self::Target {
        self.inner.deref()
    }
}

impl<T: BeaconNode, S: SlotClock + 'static> BlockService<T, S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        duties_service: Arc<DutiesService<T>>,
        validator_store: Arc<ValidatorStore<T>>,
        beacon_node: Arc<T>,
        timer: Arc<DutyTimer<S>>,
        graffiti: GraffitiSelector,
        builder_proposals: bool,
        context: TaskExecutor,
        spec: Arc<ChainSpec>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                duties_service,
                validator_store,
                beacon_node,
                timer,
                graffiti,
                builder_proposals,
                context,
                spec,
            }),
        }
    }

    /// Starts the service that proposes blocks at the start of each slot.
    pub fn start_update_service(self) -> Result<(), String> {
        let log = self.context.log().clone();
        let slot_clock = self.timer.slot_clock().clone();

        let duration_to_next_slot = slot_clock
            .duration_to_next_slot()
            .ok_or("Unable to determine duration to next slot")?;

        info!(
            log,
            "Block production service started";
            "next_update_millis" => duration_to_next_slot.as_millis()
        );

        let executor = self.context.clone();

        let interval_fut = async move {
            loop {
                if let Some(duration_to_next_slot) = slot_clock.duration_to_next_slot() {
                    sleep(duration_to_next_slot).await;

                    match slot_clock.now() {
                        Some(slot) => self.spawn_proposal_tasks(slot),
                        None => error!(log, "Failed to read slot clock"),
                    }
                } else {
                    error!(log, "Failed to read slot clock");
                    sleep(slot_clock.slot_duration()).await;
                }
            }
        };

        executor.spawn(interval_fut, metrics::BLOCK_SERVICE);
        Ok(())
    }

    fn spawn_proposal_tasks(&self, slot: Slot) {
        let service = self.clone();
        self.context.spawn(
            async move {
                let proposers = service.duties_service.block_proposers(slot).await;
                if proposers.len() > 1 {
                    warn!(
                        service.context.log(),
                        "Multiple block proposers for this slot";
                        "slot" => slot,
                        "proposers" => proposers.len(),
                    );
                }
                for duty in proposers {
                    let duty_service = service.clone();
                    service.context.spawn(
                        async move { duty_service.propose_and_log(duty).await },
                        "block_proposal",
                    );
                }
            },
            "block_proposers",
        );
    }

    async fn propose_and_log(&self, duty: ProposerDuty) {
        let log = self.context.log();
        let result = self.propose(&duty).await;

        let label = match &result {
            Ok(_) => metrics::SUCCESS,
            Err(e) => e.metric_label(),
        };
        metrics::inc_counter_vec(&metrics::BLOCK_OUTCOMES, &[label]);

        match result {
            Ok(published) => info!(
                log,
                "Successfully published block";
                "slot" => published.slot,
                "block_type" => published.block_type.as_str(),
                "graffiti" => %published.graffiti,
                "signing_root" => ?published.signing_root,
                "validator" => &duty.pubkey,
            ),
            Err(BlockError::Slashable(e)) => crit!(
                log,
                "Not signing slashable block";
                "reason" => e.reason(),
                "error" => %e,
                "slot" => duty.slot,
                "validator" => &duty.pubkey,
            ),
            Err(BlockError::GenesisSlot) => warn!(
                log,
                "Refusing to propose at the genesis slot";
                "slot" => duty.slot,
                "validator" => &duty.pubkey,
            ),
            Err(BlockError::SlotMismatch { expected, got }) => error!(
                log,
                "Beacon node produced a block for the wrong slot";
                "expected" => expected,
                "got" => got,
                "validator" => &duty.pubkey,
            ),
            Err(BlockError::ProposerMismatch { expected, got }) => error!(
                log,
                "Beacon node produced a block for the wrong proposer";
                "expected" => expected,
                "got" => got,
                "slot" => duty.slot,
                "validator" => &duty.pubkey,
            ),
            Err(e) => error!(
                log,
                "Error whilst producing block";
                "error" => ?e,
                "slot" => duty.slot,
                "validator" => &duty.pubkey,
            ),
        }
    }

    /// Produce, sign, record and submit the block for a single proposer duty.
    pub async fn propose(&self, duty: &ProposerDuty) -> Result<PublishedBlock, BlockError> {
        let slot = duty.slot;
        if slot == self.spec.genesis_slot {
            return Err(BlockError::GenesisSlot);
        }

        let randao_reveal = self
            .validator_store
            .randao_reveal(&duty.pubkey, slot.epoch(self.spec.slots_per_epoch))
            .await?;

        let graffiti = self.graffiti.select(&duty.pubkey, duty.validator_index);

        let block = if self.builder_proposals {
            self.beacon_node
                .produce_blinded_block(slot, randao_reveal, graffiti)
                .await
        } else {
            self.beacon_node
                .produce_block(slot, randao_reveal, graffiti)
                .await
        }
        .map_err(BlockError::BeaconNode)?
        .ok_or(BlockError::NoBlock)?;

        if block.slot() != slot {
            return Err(BlockError::SlotMismatch {
                expected: slot,
                got: block.slot(),
            });
        }

        if block.proposer_index() != duty.validator_index {
            return Err(BlockError::ProposerMismatch {
                expected: duty.validator_index,
                got: block.proposer_index(),
            });
        }

        let signed = self.validator_store.sign_block(&duty.pubkey, &block).await?;

        let published = PublishedBlock {
            slot,
            signing_root: signed.signing_root,
            block_type: block.block_type(),
            graffiti: block.graffiti(),
        };

        self.beacon_node
            .submit_block(SignedBlock {
                message: block,
                signature: signed.signature,
            })
            .await
            .map_err(BlockError::SubmissionFailed)?;

        Ok(published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duty_timer::ValidBlockEvents;
    use crate::signing::SigningEngine;
    use crate::testing::{test_pubkey, MockBeaconNode, MockSigner};
    use logging::test_logger;
    use slashing_protection::{InvalidBlock, SlashingDatabase};
    use slot_clock::ManualSlotClock;
    use std::time::Duration;
    use task_executor::test_utils::TestRuntime;
    use tempfile::{tempdir, TempDir};
    use types::UnsignedBlock;

    struct Harness {
        _dir: TempDir,
        _runtime: TestRuntime,
        beacon_node: Arc<MockBeaconNode>,
        db: Arc<SlashingDatabase>,
        service: BlockService<MockBeaconNode, ManualSlotClock>,
    }

    fn harness(builder_proposals: bool) -> Harness {
        let dir = tempdir().unwrap();
        let runtime = TestRuntime::new(test_logger());
        let spec = Arc::new(ChainSpec::minimal());
        let beacon_node = Arc::new(MockBeaconNode::default());
        let db = Arc::new(SlashingDatabase::create(&dir.path().join("db.sqlite")).unwrap());
        let signing = SigningEngine::new(
            beacon_node.clone(),
            Arc::new(MockSigner::default()),
            spec.clone(),
        );
        let store = Arc::new(
            ValidatorStore::new(
                db.clone(),
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
        let timer = Arc::new(DutyTimer::new(clock, ValidBlockEvents::new(), true));
        let graffiti = GraffitiSelector::new(
            None,
            Some(Graffiti::from_str_truncated("vc")),
            db.clone(),
            test_logger(),
        )
        .unwrap();
        let service = BlockService::new(
            duties,
            store,
            beacon_node.clone(),
            timer,
            graffiti,
            builder_proposals,
            runtime.task_executor.clone(),
            spec,
        );
        Harness {
            _dir: dir,
            _runtime: runtime,
            beacon_node,
            db,
            service,
        }
    }

    fn duty(slot: u64) -> ProposerDuty {
        ProposerDuty {
            pubkey: test_pubkey(0),
            validator_index: 0,
            slot: Slot::new(slot),
        }
    }

    #[tokio::test]
    async fn block_published() {
        let harness = harness(false);
        let published = harness.service.propose(&duty(10)).await.unwrap();
        assert_eq!(published.block_type, BlockType::Full);
        assert_eq!(published.graffiti.as_utf8_lossy(), "vc");

        let requests = harness.beacon_node.block_requests.lock();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, Slot::new(10));
        assert!(!requests[0].2);

        let submitted = harness.beacon_node.submitted_blocks.lock();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].slot(), Slot::new(10));
        assert_eq!(
            submitted[0].signature,
            MockSigner::expected_signature(&test_pubkey(0), published.signing_root)
        );
    }

    #[tokio::test]
    async fn genesis_slot_refused() {
        let harness = harness(false);
        assert_eq!(
            harness.service.propose(&duty(0)).await,
            Err(BlockError::GenesisSlot)
        );
        assert!(harness.beacon_node.block_requests.lock().is_empty());
    }

    #[tokio::test]
    async fn double_proposal_not_submitted() {
        let harness = harness(false);
        harness
            .db
            .check_and_insert_block_proposal(&test_pubkey(0), Slot::new(10), Hash256::repeat_byte(9))
            .unwrap();

        assert!(matches!(
            harness.service.propose(&duty(10)).await,
            Err(BlockError::Slashable(NotSafe::InvalidBlock(
                InvalidBlock::DoubleBlockProposal(_)
            )))
        ));
        assert!(harness.beacon_node.submitted_blocks.lock().is_empty());
    }

    #[tokio::test]
    async fn identical_block_resubmitted() {
        let harness = harness(false);
        let first = harness.service.propose(&duty(10)).await.unwrap();
        let second = harness.service.propose(&duty(10)).await.unwrap();
        assert_eq!(first.signing_root, second.signing_root);
        assert_eq!(harness.beacon_node.submitted_blocks.lock().len(), 2);
    }

    #[tokio::test]
    async fn past_slot_allowed() {
        let harness = harness(false);
        harness.service.propose(&duty(1000)).await.unwrap();
        harness.service.propose(&duty(600)).await.unwrap();
        assert_eq!(harness.beacon_node.submitted_blocks.lock().len(), 2);
    }

    #[tokio::test]
    async fn builder_proposals_use_blinded_blocks() {
        let harness = harness(true);
        let published = harness.service.propose(&duty(10)).await.unwrap();
        assert_eq!(published.block_type, BlockType::Blinded);
        assert!(harness.beacon_node.block_requests.lock()[0].2);
        assert!(matches!(
            harness.beacon_node.submitted_blocks.lock()[0].message,
            UnsignedBlock::Blinded(_)
        ));
    }

    #[tokio::test]
    async fn wrong_slot_refused() {
        let harness = harness(false);
        *harness.beacon_node.block_slot_override.lock() = Some(Slot::new(11));
        assert_eq!(
            harness.service.propose(&duty(10)).await,
            Err(BlockError::SlotMismatch {
                expected: Slot::new(10),
                got: Slot::new(11)
            })
        );
        assert!(harness
            .db
            .block_history(&test_pubkey(0))
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn wrong_proposer_refused() {
        let harness = harness(false);
        *harness.beacon_node.block_proposer_override.lock() = Some(7);
        assert_eq!(
            harness.service.propose(&duty(10)).await,
            Err(BlockError::ProposerMismatch {
                expected: 0,
                got: 7
            })
        );
        assert!(harness.beacon_node.submitted_blocks.lock().is_empty());
        assert!(harness
            .db
            .block_history(&test_pubkey(0))
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn missing_block_reported() {
        let harness = harness(false);
        *harness.beacon_node.produce_blocks.lock() = false;
        assert_eq!(
            harness.service.propose(&duty(10)).await,
            Err(BlockError::NoBlock)
        );
    }
}
