use crate::{Epoch, Hash256};
use serde::{Deserialize, Serialize};
use tree_hash::{merkle_root, PackedEncoding, TreeHash, TreeHashType, BYTES_PER_CHUNK};

/// Specifies a fork of the `BeaconChain`, to prevent replay attacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Fork {
    #[serde(with = "serde_utils::bytes_4_hex")]
    pub previous_version: [u8; 4],
    #[serde(with = "serde_utils::bytes_4_hex")]
    pub current_version: [u8; 4],
    pub epoch: Epoch,
}

impl Fork {
    /// Return the fork version of the given ``epoch``.
    pub fn get_fork_version(&self, epoch: Epoch) -> [u8; 4] {
        if epoch < self.epoch {
            return self.previous_version;
        }
        self.current_version
    }
}

/// Specifies a fork which allows nodes to identify each other on the network.
#[derive(Debug, Clone, PartialEq)]
pub struct ForkData {
    pub current_version: [u8; 4],
    pub genesis_validators_root: Hash256,
}

/// Hashed as a two-field container: the version right-padded to one chunk, then the root.
impl TreeHash for ForkData {
    fn tree_hash_type() -> TreeHashType {
        TreeHashType::Container
    }

    fn tree_hash_packed_encoding(&self) -> PackedEncoding {
        unreachable!("Struct should never be packed.")
    }

    fn tree_hash_packing_factor() -> usize {
        unreachable!("Struct should never be packed.")
    }

    fn tree_hash_root(&self) -> Hash256 {
        let mut leaves = [0; BYTES_PER_CHUNK * 2];
        leaves[..4].copy_from_slice(&self.current_version);
        leaves[BYTES_PER_CHUNK..].copy_from_slice(self.genesis_validators_root.as_slice());
        merkle_root(&leaves, 2)
    }
}

/// The fork and chain identity needed to compute a signing domain, as served by the beacon node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForkInfo {
    pub fork: Fork,
    pub genesis_validators_root: Hash256,
}
