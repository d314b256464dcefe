//! In-memory beacon node and signer used by the unit tests.
use crate::beacon_node::{AttesterDuty, BeaconNode, BeaconNodeError, ProposerDuty};
use crate::signing::{Signer, SignerError};
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use types::{
    Attestation, AttestationData, BeaconBlock, BeaconBlockBody, ChainSpec, Checkpoint, CommitteeIndex,
    Epoch, ExecutionPayload, Fork, ForkInfo, Graffiti, Hash256, PublicKeyBytes, SignatureBytes,
    SignedBlock, SignedVoluntaryExit, Slot, Transactions, UnsignedBlock,
};

pub fn test_pubkey(index: u64) -> PublicKeyBytes {
    let mut bytes = vec![0x11; 48];
    bytes[..8].copy_from_slice(&index.to_le_bytes());
    PublicKeyBytes::deserialize(&bytes).expect("48 bytes is a valid public key length")
}

pub fn test_fork_info() -> ForkInfo {
    ForkInfo {
        fork: Fork {
            previous_version: [0; 4],
            current_version: [1; 4],
            epoch: Epoch::new(0),
        },
        genesis_validators_root: Hash256::repeat_byte(0x42),
    }
}

pub fn test_attestation_data(slot: Slot, index: CommitteeIndex, target: Epoch) -> AttestationData {
    AttestationData {
        slot,
        index,
        beacon_block_root: Hash256::repeat_byte(0xbb),
        source: Checkpoint {
            epoch: target - 1,
            root: Hash256::repeat_byte(0x01),
        },
        target: Checkpoint {
            epoch: target,
            root: Hash256::repeat_byte(0x02),
        },
    }
}

/// A beacon node whose responses are set directly by the test, and which records every
/// submission it receives.
pub struct MockBeaconNode {
    pub slots_per_epoch: u64,
    pub fork_info: Mutex<Option<ForkInfo>>,
    pub fail_fork_info: Mutex<bool>,
    pub attester_duties: Mutex<Vec<AttesterDuty>>,
    pub proposer_duties: Mutex<Vec<ProposerDuty>>,
    pub duty_requests: Mutex<Vec<Epoch>>,
    pub attestation_data: Mutex<Option<AttestationData>>,
    /// When `false`, block production returns `None`.
    pub produce_blocks: Mutex<bool>,
    /// Produce blocks at this slot instead of the requested one.
    pub block_slot_override: Mutex<Option<Slot>>,
    /// Produce blocks for this proposer index instead of 0.
    pub block_proposer_override: Mutex<Option<u64>>,
    pub block_requests: Mutex<Vec<(Slot, Graffiti, bool)>>,
    pub validator_indices: Mutex<HashMap<PublicKeyBytes, u64>>,
    pub fail_submissions: Mutex<bool>,
    pub submitted_attestations: Mutex<Vec<Attestation>>,
    pub submitted_blocks: Mutex<Vec<SignedBlock>>,
    pub submitted_exits: Mutex<Vec<SignedVoluntaryExit>>,
}

impl Default for MockBeaconNode {
    fn default() -> Self {
        Self {
            slots_per_epoch: ChainSpec::minimal().slots_per_epoch,
            fork_info: Mutex::new(Some(test_fork_info())),
            fail_fork_info: Mutex::new(false),
            attester_duties: Mutex::new(vec![]),
            proposer_duties: Mutex::new(vec![]),
            duty_requests: Mutex::new(vec![]),
            attestation_data: Mutex::new(None),
            produce_blocks: Mutex::new(true),
            block_slot_override: Mutex::new(None),
            block_proposer_override: Mutex::new(None),
            block_requests: Mutex::new(vec![]),
            validator_indices: Mutex::new(HashMap::new()),
            fail_submissions: Mutex::new(false),
            submitted_attestations: Mutex::new(vec![]),
            submitted_blocks: Mutex::new(vec![]),
            submitted_exits: Mutex::new(vec![]),
        }
    }
}

impl MockBeaconNode {
    fn block(&self, slot: Slot, randao_reveal: SignatureBytes, graffiti: Graffiti) -> UnsignedBlock {
        let slot = self.block_slot_override.lock().unwrap_or(slot);
        UnsignedBlock::Full(BeaconBlock {
            slot,
            proposer_index: self.block_proposer_override.lock().unwrap_or(0),
            parent_root: Hash256::repeat_byte(0x0a),
            state_root: Hash256::repeat_byte(0x0b),
            body: BeaconBlockBody {
                randao_reveal,
                graffiti,
                execution_payload: ExecutionPayload {
                    parent_hash: Hash256::repeat_byte(0x0c),
                    block_number: slot.as_u64(),
                    block_hash: Hash256::repeat_byte(0x0d),
                    transactions: Transactions::empty(),
                },
            },
        })
    }

    fn submission(&self) -> Result<(), BeaconNodeError> {
        if *self.fail_submissions.lock() {
            Err(BeaconNodeError::RemoteFailure("submission rejected".into()))
        } else {
            Ok(())
        }
    }
}

impl BeaconNode for MockBeaconNode {
    async fn attester_duties(
        &self,
        epoch: Epoch,
        pubkeys: &[PublicKeyBytes],
    ) -> Result<Vec<AttesterDuty>, BeaconNodeError> {
        self.duty_requests.lock().push(epoch);
        Ok(self
            .attester_duties
            .lock()
            .iter()
            .filter(|duty| {
                duty.slot.epoch(self.slots_per_epoch) == epoch && pubkeys.contains(&duty.pubkey)
            })
            .cloned()
            .collect())
    }

    async fn proposer_duties(&self, epoch: Epoch) -> Result<Vec<ProposerDuty>, BeaconNodeError> {
        Ok(self
            .proposer_duties
            .lock()
            .iter()
            .filter(|duty| duty.slot.epoch(self.slots_per_epoch) == epoch)
            .cloned()
            .collect())
    }

    async fn attestation_data(
        &self,
        _slot: Slot,
        _committee_index: CommitteeIndex,
    ) -> Result<Option<AttestationData>, BeaconNodeError> {
        Ok(self.attestation_data.lock().clone())
    }

    async fn produce_block(
        &self,
        slot: Slot,
        randao_reveal: SignatureBytes,
        graffiti: Graffiti,
    ) -> Result<Option<UnsignedBlock>, BeaconNodeError> {
        self.block_requests.lock().push((slot, graffiti, false));
        if !*self.produce_blocks.lock() {
            return Ok(None);
        }
        Ok(Some(self.block(slot, randao_reveal, graffiti)))
    }

    async fn produce_blinded_block(
        &self,
        slot: Slot,
        randao_reveal: SignatureBytes,
        graffiti: Graffiti,
    ) -> Result<Option<UnsignedBlock>, BeaconNodeError> {
        self.block_requests.lock().push((slot, graffiti, true));
        if !*self.produce_blocks.lock() {
            return Ok(None);
        }
        Ok(Some(self.block(slot, randao_reveal, graffiti).to_blinded()))
    }

    async fn fork_info(&self, _epoch: Epoch) -> Result<Option<ForkInfo>, BeaconNodeError> {
        if *self.fail_fork_info.lock() {
            return Err(BeaconNodeError::RemoteFailure("fork unavailable".into()));
        }
        Ok(self.fork_info.lock().clone())
    }

    async fn validator_index(
        &self,
        pubkey: &PublicKeyBytes,
    ) -> Result<Option<u64>, BeaconNodeError> {
        Ok(self.validator_indices.lock().get(pubkey).copied())
    }

    async fn submit_attestation(&self, attestation: Attestation) -> Result<(), BeaconNodeError> {
        self.submission()?;
        self.submitted_attestations.lock().push(attestation);
        Ok(())
    }

    async fn submit_block(&self, block: SignedBlock) -> Result<(), BeaconNodeError> {
        self.submission()?;
        self.submitted_blocks.lock().push(block);
        Ok(())
    }

    async fn submit_voluntary_exit(&self, exit: SignedVoluntaryExit) -> Result<(), BeaconNodeError> {
        self.submission()?;
        self.submitted_exits.lock().push(exit);
        Ok(())
    }
}

/// Produces deterministic "signatures" by concatenating the public key and signing root.
#[derive(Default)]
pub struct MockSigner {
    pub signed_roots: Mutex<Vec<Hash256>>,
}

impl MockSigner {
    pub fn expected_signature(pubkey: &PublicKeyBytes, signing_root: Hash256) -> SignatureBytes {
        let bytes = [pubkey.serialize(), signing_root.as_slice()].concat();
        SignatureBytes::deserialize(&bytes).expect("concatenation is within signature bounds")
    }
}

impl Signer for MockSigner {
    fn sign<'a>(
        &'a self,
        pubkey: &'a PublicKeyBytes,
        signing_root: Hash256,
    ) -> BoxFuture<'a, Result<SignatureBytes, SignerError>> {
        async move {
            self.signed_roots.lock().push(signing_root);
            Ok(Self::expected_signature(pubkey, signing_root))
        }
        .boxed()
    }
}
