pub mod attestation_service;
pub mod beacon_node;
pub mod block_service;
pub mod config;
pub mod duties_service;
pub mod duty_timer;
pub mod graffiti;
pub mod metrics;
pub mod signing;
pub mod submitted_attestations;
pub mod validator_store;

#[cfg(test)]
pub mod testing;

pub use attestation_service::{AttestationError, AttestationService};
pub use beacon_node::{AttesterDuty, BeaconNode, BeaconNodeError, ProposerDuty};
pub use block_service::{BlockError, BlockService};
pub use config::Config;
pub use duty_timer::{DutyTimer, ValidBlockEvents, WaitOutcome};
pub use signing::{Signer, SignerError, SigningEngine};
pub use validator_store::ValidatorStore;

use duties_service::DutiesService;
use graffiti::GraffitiSelector;
use slashing_protection::SlashingDatabase;
use slog::{info, Logger};
use slot_clock::SlotClock;
use std::sync::Arc;
use task_executor::TaskExecutor;
use types::{ChainSpec, Epoch, PublicKeyBytes, SignedVoluntaryExit, VoluntaryExit};

pub struct ProductionValidatorClient<T, S> {
    context: TaskExecutor,
    beacon_node: Arc<T>,
    validator_store: Arc<ValidatorStore<T>>,
    attestation_service: AttestationService<T, S>,
    block_service: BlockService<T, S>,
    valid_block_events: ValidBlockEvents,
    config: Config,
    log: Logger,
}

impl<T: BeaconNode, S: SlotClock + 'static> ProductionValidatorClient<T, S> {
    /// Opens the slashing protection database and registers every key in `voting_pubkeys`
    /// before any service is built.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        context: TaskExecutor,
        config: Config,
        spec: Arc<ChainSpec>,
        slot_clock: S,
        beacon_node: Arc<T>,
        signer: Arc<dyn Signer>,
        voting_pubkeys: Vec<PublicKeyBytes>,
    ) -> Result<Self, String> {
        let log = context.log().clone();

        info!(
            log,
            "Starting validator client";
            "slashing_protection_db" => ?config.slashing_protection_db_path,
            "validators" => voting_pubkeys.len(),
        );

        let slashing_protection = Arc::new(
            SlashingDatabase::open_or_create(&config.slashing_protection_db_path).map_err(
                |e| {
                    format!(
                        "Failed to open or create slashing protection database {:?}: {:?}",
                        config.slashing_protection_db_path, e
                    )
                },
            )?,
        );

        let signing = SigningEngine::new(beacon_node.clone(), signer, spec.clone());
        let validator_store = Arc::new(ValidatorStore::new(
            slashing_protection.clone(),
            signing,
            voting_pubkeys,
            spec.clone(),
            log.clone(),
        )?);

        let duties_service = Arc::new(DutiesService::new(
            beacon_node.clone(),
            validator_store.clone(),
            spec.clone(),
            log.clone(),
        ));

        let valid_block_events = ValidBlockEvents::new();
        let timer = Arc::new(DutyTimer::new(
            slot_clock,
            valid_block_events.clone(),
            config.attest_on_valid_block,
        ));

        let graffiti = GraffitiSelector::new(
            config.graffiti_file.clone(),
            config.graffiti_flag(),
            slashing_protection,
            log.clone(),
        )?;

        let attestation_service = AttestationService::new(
            duties_service.clone(),
            validator_store.clone(),
            beacon_node.clone(),
            timer.clone(),
            context.clone_with_name("attestation".into()),
            spec.clone(),
        );

        let block_service = BlockService::new(
            duties_service,
            validator_store.clone(),
            beacon_node.clone(),
            timer,
            graffiti,
            config.builder_proposals,
            context.clone_with_name("block".into()),
            spec,
        );

        Ok(Self {
            context,
            beacon_node,
            validator_store,
            attestation_service,
            block_service,
            valid_block_events,
            config,
            log,
        })
    }

    pub fn start_service(&self) -> Result<(), String> {
        self.attestation_service
            .clone()
            .start_update_service()
            .map_err(|e| format!("Unable to start attestation service: {}", e))?;

        self.block_service
            .clone()
            .start_update_service()
            .map_err(|e| format!("Unable to start block service: {}", e))?;

        info!(
            self.log,
            "Validator client started";
            "validators" => self.validator_store.num_voting_validators(),
            "builder_proposals" => self.config.builder_proposals,
        );

        Ok(())
    }

    /// The publisher through which observed valid blocks are announced to the attestation timer.
    pub fn valid_block_events(&self) -> ValidBlockEvents {
        self.valid_block_events.clone()
    }

    pub fn validator_store(&self) -> &Arc<ValidatorStore<T>> {
        &self.validator_store
    }

    pub fn context(&self) -> &TaskExecutor {
        &self.context
    }

    /// Sign a voluntary exit for `pubkey` at `epoch` and submit it to the beacon node.
    pub async fn publish_voluntary_exit(
        &self,
        pubkey: &PublicKeyBytes,
        epoch: Epoch,
    ) -> Result<SignedVoluntaryExit, String> {
        let validator_index = self
            .beacon_node
            .validator_index(pubkey)
            .await
            .map_err(|e| format!("Unable to resolve validator index: {:?}", e))?
            .ok_or_else(|| format!("Validator {} is unknown to the beacon node", pubkey))?;

        let signed_exit = self
            .validator_store
            .sign_voluntary_exit(
                pubkey,
                VoluntaryExit {
                    epoch,
                    validator_index,
                },
            )
            .await
            .map_err(|e| format!("Unable to sign voluntary exit: {:?}", e))?;

        self.beacon_node
            .submit_voluntary_exit(signed_exit.clone())
            .await
            .map_err(|e| format!("Unable to publish voluntary exit: {:?}", e))?;

        info!(
            self.log,
            "Published voluntary exit";
            "validator" => pubkey,
            "validator_index" => validator_index,
            "epoch" => epoch,
        );

        Ok(signed_exit)
    }
}
