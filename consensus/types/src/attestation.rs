use crate::{Epoch, Hash256, SignatureBytes, SignedRoot, Slot};
use serde::{Deserialize, Serialize};
use ssz_types::typenum::U2048;
use ssz_types::BitList;
use tree_hash_derive::TreeHash;

/// Upper bound on the number of validators in a single committee.
pub type MaxValidatorsPerCommittee = U2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TreeHash)]
pub struct Checkpoint {
    pub epoch: Epoch,
    pub root: Hash256,
}

/// The data upon which an attestation is based.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TreeHash)]
pub struct AttestationData {
    pub slot: Slot,
    #[serde(with = "serde_utils::quoted_u64")]
    pub index: u64,

    // LMD GHOST vote
    pub beacon_block_root: Hash256,

    // FFG Vote
    pub source: Checkpoint,
    pub target: Checkpoint,
}

impl SignedRoot for AttestationData {}

/// Details an attestation that can be slashable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attestation {
    pub aggregation_bits: BitList<MaxValidatorsPerCommittee>,
    pub data: AttestationData,
    pub signature: SignatureBytes,
}

impl Attestation {
    /// The number of validators whose participation is recorded in this attestation.
    pub fn num_set_aggregation_bits(&self) -> usize {
        self.aggregation_bits.num_set_bits()
    }
}
