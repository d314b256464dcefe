use crate::{Epoch, Graffiti, Hash256, SignatureBytes, SignedRoot, Slot};
use serde::{Deserialize, Serialize};
use ssz_types::typenum::{U1048576, U1073741824};
use ssz_types::VariableList;
use std::fmt::Debug;
use tree_hash::TreeHash;
use tree_hash_derive::TreeHash;

pub type MaxBytesPerTransaction = U1073741824;
pub type MaxTransactionsPerPayload = U1048576;
pub type Transaction = VariableList<u8, MaxBytesPerTransaction>;
pub type Transactions = VariableList<Transaction, MaxTransactionsPerPayload>;

/// Whether a block carries its full execution payload or only the payload header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Full,
    Blinded,
}

impl BlockType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockType::Full => "full",
            BlockType::Blinded => "blinded",
        }
    }
}

/// The execution payload, or its header, contained in a block body.
///
/// Both forms must produce the same tree hash root for the same payload so that a block and its
/// blinded counterpart share a signing root.
pub trait ExecPayload: TreeHash + Debug + Clone + PartialEq + Send + Sync {
    fn block_type() -> BlockType;
    fn parent_hash(&self) -> Hash256;
    fn block_hash(&self) -> Hash256;
    fn block_number(&self) -> u64;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TreeHash)]
pub struct ExecutionPayload {
    pub parent_hash: Hash256,
    #[serde(with = "serde_utils::quoted_u64")]
    pub block_number: u64,
    pub block_hash: Hash256,
    pub transactions: Transactions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TreeHash)]
pub struct ExecutionPayloadHeader {
    pub parent_hash: Hash256,
    #[serde(with = "serde_utils::quoted_u64")]
    pub block_number: u64,
    pub block_hash: Hash256,
    pub transactions_root: Hash256,
}

impl From<&ExecutionPayload> for ExecutionPayloadHeader {
    fn from(payload: &ExecutionPayload) -> Self {
        Self {
            parent_hash: payload.parent_hash,
            block_number: payload.block_number,
            block_hash: payload.block_hash,
            transactions_root: payload.transactions.tree_hash_root(),
        }
    }
}

impl ExecPayload for ExecutionPayload {
    fn block_type() -> BlockType {
        BlockType::Full
    }

    fn parent_hash(&self) -> Hash256 {
        self.parent_hash
    }

    fn block_hash(&self) -> Hash256 {
        self.block_hash
    }

    fn block_number(&self) -> u64 {
        self.block_number
    }
}

impl ExecPayload for ExecutionPayloadHeader {
    fn block_type() -> BlockType {
        BlockType::Blinded
    }

    fn parent_hash(&self) -> Hash256 {
        self.parent_hash
    }

    fn block_hash(&self) -> Hash256 {
        self.block_hash
    }

    fn block_number(&self) -> u64 {
        self.block_number
    }
}

/// The body of a `BeaconBlock`, generic over the form of its execution payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TreeHash)]
#[serde(bound = "Payload: ExecPayload + Serialize + serde::de::DeserializeOwned")]
pub struct BeaconBlockBody<Payload: ExecPayload> {
    pub randao_reveal: SignatureBytes,
    pub graffiti: Graffiti,
    pub execution_payload: Payload,
}

/// A block of the `BeaconChain`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TreeHash)]
#[serde(bound = "Payload: ExecPayload + Serialize + serde::de::DeserializeOwned")]
pub struct BeaconBlock<Payload: ExecPayload> {
    pub slot: Slot,
    #[serde(with = "serde_utils::quoted_u64")]
    pub proposer_index: u64,
    pub parent_root: Hash256,
    pub state_root: Hash256,
    pub body: BeaconBlockBody<Payload>,
}

pub type FullBeaconBlock = BeaconBlock<ExecutionPayload>;
pub type BlindedBeaconBlock = BeaconBlock<ExecutionPayloadHeader>;

impl<Payload: ExecPayload> SignedRoot for BeaconBlock<Payload> {}

impl<Payload: ExecPayload> BeaconBlock<Payload> {
    pub fn epoch(&self, slots_per_epoch: u64) -> Epoch {
        self.slot.epoch(slots_per_epoch)
    }

    /// Returns the `tree_hash_root` of the block.
    pub fn canonical_root(&self) -> Hash256 {
        self.tree_hash_root()
    }
}

impl FullBeaconBlock {
    /// Replace the execution payload with its header, preserving the block root.
    pub fn to_blinded(&self) -> BlindedBeaconBlock {
        BeaconBlock {
            slot: self.slot,
            proposer_index: self.proposer_index,
            parent_root: self.parent_root,
            state_root: self.state_root,
            body: BeaconBlockBody {
                randao_reveal: self.body.randao_reveal.clone(),
                graffiti: self.body.graffiti,
                execution_payload: ExecutionPayloadHeader::from(&self.body.execution_payload),
            },
        }
    }
}

/// A block proposal returned by the beacon node, awaiting a signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", content = "block", rename_all = "snake_case")]
pub enum UnsignedBlock {
    Full(FullBeaconBlock),
    Blinded(BlindedBeaconBlock),
}

impl UnsignedBlock {
    pub fn slot(&self) -> Slot {
        match self {
            UnsignedBlock::Full(block) => block.slot,
            UnsignedBlock::Blinded(block) => block.slot,
        }
    }

    pub fn proposer_index(&self) -> u64 {
        match self {
            UnsignedBlock::Full(block) => block.proposer_index,
            UnsignedBlock::Blinded(block) => block.proposer_index,
        }
    }

    pub fn graffiti(&self) -> Graffiti {
        match self {
            UnsignedBlock::Full(block) => block.body.graffiti,
            UnsignedBlock::Blinded(block) => block.body.graffiti,
        }
    }

    pub fn block_type(&self) -> BlockType {
        match self {
            UnsignedBlock::Full(_) => BlockType::Full,
            UnsignedBlock::Blinded(_) => BlockType::Blinded,
        }
    }

    pub fn canonical_root(&self) -> Hash256 {
        match self {
            UnsignedBlock::Full(block) => block.canonical_root(),
            UnsignedBlock::Blinded(block) => block.canonical_root(),
        }
    }

    /// Blinding preserves the signing root, so a block may be signed in either form.
    pub fn to_blinded(&self) -> UnsignedBlock {
        match self {
            UnsignedBlock::Full(block) => UnsignedBlock::Blinded(block.to_blinded()),
            UnsignedBlock::Blinded(block) => UnsignedBlock::Blinded(block.clone()),
        }
    }
}

impl TreeHash for UnsignedBlock {
    fn tree_hash_type() -> tree_hash::TreeHashType {
        tree_hash::TreeHashType::Container
    }

    fn tree_hash_packed_encoding(&self) -> tree_hash::PackedEncoding {
        unreachable!("Struct should never be packed.")
    }

    fn tree_hash_packing_factor() -> usize {
        unreachable!("Struct should never be packed.")
    }

    fn tree_hash_root(&self) -> Hash256 {
        self.canonical_root()
    }
}

impl SignedRoot for UnsignedBlock {}

/// A block and the proposer's signature over it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedBlock {
    pub message: UnsignedBlock,
    pub signature: SignatureBytes,
}

impl SignedBlock {
    pub fn slot(&self) -> Slot {
        self.message.slot()
    }
}
