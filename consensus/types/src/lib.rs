//! Consensus types used by the validator client.
//!
//! Only the subset of types needed to attest and propose is defined here. Keys and signatures
//! are opaque byte buffers; this crate never performs cryptography beyond tree hashing.
pub mod attestation;
pub mod beacon_block;
pub mod chain_spec;
pub mod fork;
pub mod graffiti;
pub mod keys;
pub mod signing_data;
pub mod slot_epoch;
pub mod voluntary_exit;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use crate::attestation::{Attestation, AttestationData, Checkpoint, MaxValidatorsPerCommittee};
pub use crate::beacon_block::{
    BeaconBlock, BeaconBlockBody, BlindedBeaconBlock, BlockType, ExecPayload, ExecutionPayload,
    ExecutionPayloadHeader, FullBeaconBlock, SignedBlock, Transaction, Transactions,
    UnsignedBlock,
};
pub use crate::chain_spec::{ChainSpec, Domain};
pub use crate::fork::{Fork, ForkData, ForkInfo};
pub use crate::graffiti::{Graffiti, GraffitiString, GRAFFITI_BYTES_LEN};
pub use crate::keys::{
    Error as KeyError, PublicKeyBytes, SignatureBytes, MAX_PUBLIC_KEY_LEN, MAX_SIGNATURE_LEN,
};
pub use crate::signing_data::{SignedRoot, SigningData};
pub use crate::slot_epoch::{Epoch, Slot};
pub use crate::voluntary_exit::{SignedVoluntaryExit, VoluntaryExit};

pub use ssz_types::{typenum, BitList, VariableList};

pub type Hash256 = alloy_primitives::B256;
pub type CommitteeIndex = u64;
