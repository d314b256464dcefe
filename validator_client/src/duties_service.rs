//! Fetches and caches the attester and proposer duties of the managed validators, one epoch at a
//! time.
use crate::beacon_node::{AttesterDuty, BeaconNode, BeaconNodeError, ProposerDuty};
use crate::validator_store::ValidatorStore;
use parking_lot::RwLock;
use slog::{debug, error, Logger};
use std::collections::BTreeMap;
use std::sync::Arc;
use types::{ChainSpec, Epoch, Slot};

/// Duties for epochs more than this many epochs before the latest polled epoch are dropped.
pub const HISTORICAL_DUTIES_EPOCHS: u64 = 2;

#[derive(Debug, Default, Clone)]
pub struct EpochDuties {
    pub attesters: Vec<AttesterDuty>,
    pub proposers: Vec<ProposerDuty>,
}

pub struct DutiesService<T> {
    duties: RwLock<BTreeMap<Epoch, Arc<EpochDuties>>>,
    beacon_node: Arc<T>,
    validator_store: Arc<ValidatorStore<T>>,
    spec: Arc<ChainSpec>,
    log: Logger,
}

impl<T: BeaconNode> DutiesService<T> {
    pub fn new(
        beacon_node: Arc<T>,
        validator_store: Arc<ValidatorStore<T>>,
        spec: Arc<ChainSpec>,
        log: Logger,
    ) -> Self {
        Self {
            duties: RwLock::new(BTreeMap::new()),
            beacon_node,
            validator_store,
            spec,
            log,
        }
    }

    /// Returns the duties for `epoch`, requesting them from the beacon node if not cached.
    pub async fn poll_epoch(&self, epoch: Epoch) -> Result<Arc<EpochDuties>, BeaconNodeError> {
        let cached = self.duties.read().get(&epoch).cloned();
        if let Some(duties) = cached {
            return Ok(duties);
        }

        let pubkeys = self.validator_store.voting_pubkeys();
        let attesters = self.beacon_node.attester_duties(epoch, pubkeys).await?;
        let proposers = self
            .beacon_node
            .proposer_duties(epoch)
            .await?
            .into_iter()
            .filter(|duty| self.validator_store.has_validator(&duty.pubkey))
            .collect::<Vec<_>>();

        debug!(
            self.log,
            "Downloaded duties";
            "epoch" => epoch,
            "attesters" => attesters.len(),
            "proposers" => proposers.len(),
        );

        let duties = Arc::new(EpochDuties {
            attesters,
            proposers,
        });

        let mut cache = self.duties.write();
        cache.insert(epoch, duties.clone());
        if let Some(latest) = cache.keys().next_back().copied() {
            cache.retain(|cached_epoch, _| *cached_epoch + HISTORICAL_DUTIES_EPOCHS >= latest);
        }

        Ok(duties)
    }

    fn duties_at_slot(&self, slot: Slot) -> Option<Arc<EpochDuties>> {
        self.duties
            .read()
            .get(&slot.epoch(self.spec.slots_per_epoch))
            .cloned()
    }

    async fn ensure_epoch(&self, slot: Slot) -> Option<Arc<EpochDuties>> {
        if let Some(duties) = self.duties_at_slot(slot) {
            return Some(duties);
        }
        let epoch = slot.epoch(self.spec.slots_per_epoch);
        match self.poll_epoch(epoch).await {
            Ok(duties) => Some(duties),
            Err(e) => {
                error!(
                    self.log,
                    "Failed to download duties";
                    "epoch" => epoch,
                    "error" => ?e,
                );
                None
            }
        }
    }

    /// The attester duties of managed validators at `slot`.
    pub async fn attesters(&self, slot: Slot) -> Vec<AttesterDuty> {
        self.ensure_epoch(slot)
            .await
            .map(|duties| {
                duties
                    .attesters
                    .iter()
                    .filter(|duty| duty.slot == slot)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The proposer duties of managed validators at `slot`.
    pub async fn block_proposers(&self, slot: Slot) -> Vec<ProposerDuty> {
        self.ensure_epoch(slot)
            .await
            .map(|duties| {
                duties
                    .proposers
                    .iter()
                    .filter(|duty| duty.slot == slot)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The epochs currently held in the cache, in ascending order.
    pub fn cached_epochs(&self) -> Vec<Epoch> {
        self.duties.read().keys().copied().collect()
    }
}
