use std::future::Future;
use types::{
    Attestation, AttestationData, CommitteeIndex, Epoch, ForkInfo, Graffiti, PublicKeyBytes,
    SignatureBytes, SignedBlock, SignedVoluntaryExit, Slot, UnsignedBlock,
};

#[derive(Debug, PartialEq, Clone)]
pub enum BeaconNodeError {
    RemoteFailure(String),
    DecodeFailure,
}

/// An assignment for one validator to attest in one committee at one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttesterDuty {
    pub pubkey: PublicKeyBytes,
    pub validator_index: u64,
    pub slot: Slot,
    pub committee_index: CommitteeIndex,
    /// Validator indices of every member of the committee, in committee order.
    pub committee_members: Vec<u64>,
    /// The position of this validator within `committee_members`.
    pub validator_committee_index: usize,
}

impl AttesterDuty {
    pub fn committee_length(&self) -> usize {
        self.committee_members.len()
    }
}

/// An assignment for one validator to propose the block at `slot`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposerDuty {
    pub pubkey: PublicKeyBytes,
    pub validator_index: u64,
    pub slot: Slot,
}

/// Defines the methods required to produce and publish attestations and blocks on a Beacon Node.
///
/// Methods returning `Ok(None)` indicate that the node responded successfully but had nothing to
/// offer (e.g., it is unable to produce at the given slot).
pub trait BeaconNode: Send + Sync + 'static {
    /// The attester duties in `epoch` for the subset of `pubkeys` known to the node.
    fn attester_duties(
        &self,
        epoch: Epoch,
        pubkeys: &[PublicKeyBytes],
    ) -> impl Future<Output = Result<Vec<AttesterDuty>, BeaconNodeError>> + Send;

    /// Every proposer duty in `epoch`, for all validators.
    fn proposer_duties(
        &self,
        epoch: Epoch,
    ) -> impl Future<Output = Result<Vec<ProposerDuty>, BeaconNodeError>> + Send;

    fn attestation_data(
        &self,
        slot: Slot,
        committee_index: CommitteeIndex,
    ) -> impl Future<Output = Result<Option<AttestationData>, BeaconNodeError>> + Send;

    /// Request that the node produces a block with a full execution payload.
    fn produce_block(
        &self,
        slot: Slot,
        randao_reveal: SignatureBytes,
        graffiti: Graffiti,
    ) -> impl Future<Output = Result<Option<UnsignedBlock>, BeaconNodeError>> + Send;

    /// Request that the node produces a block carrying only an execution payload header.
    fn produce_blinded_block(
        &self,
        slot: Slot,
        randao_reveal: SignatureBytes,
        graffiti: Graffiti,
    ) -> impl Future<Output = Result<Option<UnsignedBlock>, BeaconNodeError>> + Send;

    /// The fork and genesis validators root applicable at `epoch`.
    fn fork_info(
        &self,
        epoch: Epoch,
    ) -> impl Future<Output = Result<Option<ForkInfo>, BeaconNodeError>> + Send;

    fn validator_index(
        &self,
        pubkey: &PublicKeyBytes,
    ) -> impl Future<Output = Result<Option<u64>, BeaconNodeError>> + Send;

    fn submit_attestation(
        &self,
        attestation: Attestation,
    ) -> impl Future<Output = Result<(), BeaconNodeError>> + Send;

    fn submit_block(
        &self,
        block: SignedBlock,
    ) -> impl Future<Output = Result<(), BeaconNodeError>> + Send;

    fn submit_voluntary_exit(
        &self,
        exit: SignedVoluntaryExit,
    ) -> impl Future<Output = Result<(), BeaconNodeError>> + Send;
}
