use crate::{Epoch, Fork, ForkData, Hash256, Slot};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tree_hash::TreeHash;

/// Each of the signature domains.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Domain {
    BeaconProposer,
    BeaconAttester,
    Randao,
    VoluntaryExit,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::BeaconProposer => "beacon_proposer",
            Domain::BeaconAttester => "beacon_attester",
            Domain::Randao => "randao",
            Domain::VoluntaryExit => "voluntary_exit",
        }
    }
}

/// Network parameters shared by every component that reasons about time or signing domains.
///
/// Constructed once and passed by reference (usually as an `Arc<ChainSpec>`), never mutated.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ChainSpec {
    #[serde(with = "serde_utils::quoted_u64")]
    pub seconds_per_slot: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub slots_per_epoch: u64,
    pub genesis_slot: Slot,
    #[serde(with = "serde_utils::quoted_u64")]
    pub min_genesis_time: u64,

    /*
     * Signature domains
     */
    #[serde(with = "serde_utils::u32_hex")]
    pub domain_beacon_proposer: u32,
    #[serde(with = "serde_utils::u32_hex")]
    pub domain_beacon_attester: u32,
    #[serde(with = "serde_utils::u32_hex")]
    pub domain_randao: u32,
    #[serde(with = "serde_utils::u32_hex")]
    pub domain_voluntary_exit: u32,
}

impl ChainSpec {
    pub fn mainnet() -> Self {
        Self {
            seconds_per_slot: 12,
            slots_per_epoch: 32,
            genesis_slot: Slot::new(0),
            min_genesis_time: 1_606_824_000,
            domain_beacon_proposer: 0,
            domain_beacon_attester: 1,
            domain_randao: 2,
            domain_voluntary_exit: 4,
        }
    }

    /// Smaller epochs and faster slots, used by local testnets and tests.
    pub fn minimal() -> Self {
        Self {
            seconds_per_slot: 6,
            slots_per_epoch: 8,
            ..Self::mainnet()
        }
    }

    pub fn slot_duration(&self) -> Duration {
        Duration::from_secs(self.seconds_per_slot)
    }

    /// Get the 4-byte domain type for some `Domain`, in little-endian.
    pub fn get_domain_constant(&self, domain: Domain) -> u32 {
        match domain {
            Domain::BeaconProposer => self.domain_beacon_proposer,
            Domain::BeaconAttester => self.domain_beacon_attester,
            Domain::Randao => self.domain_randao,
            Domain::VoluntaryExit => self.domain_voluntary_exit,
        }
    }

    /// Get the domain that represents the fork meta and signature domain.
    pub fn get_domain(
        &self,
        epoch: Epoch,
        domain: Domain,
        fork: &Fork,
        genesis_validators_root: Hash256,
    ) -> Hash256 {
        let fork_version = fork.get_fork_version(epoch);
        self.compute_domain(domain, fork_version, genesis_validators_root)
    }

    /// Compute a domain by applying the given `fork_version`.
    pub fn compute_domain(
        &self,
        domain: Domain,
        fork_version: [u8; 4],
        genesis_validators_root: Hash256,
    ) -> Hash256 {
        let domain_constant = self.get_domain_constant(domain);

        let mut domain = [0; 32];
        domain[0..4].copy_from_slice(&domain_constant.to_le_bytes());
        domain[4..].copy_from_slice(
            &Self::compute_fork_data_root(fork_version, genesis_validators_root).as_slice()[..28],
        );

        Hash256::from(domain)
    }

    /// Return the 32-byte fork data root for the `current_version` and
    /// `genesis_validators_root`.
    pub fn compute_fork_data_root(
        current_version: [u8; 4],
        genesis_validators_root: Hash256,
    ) -> Hash256 {
        ForkData {
            current_version,
            genesis_validators_root,
        }
        .tree_hash_root()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fork() -> Fork {
        Fork {
            previous_version: [0, 0, 0, 1],
            current_version: [0, 0, 0, 2],
            epoch: Epoch::new(10),
        }
    }

    #[test]
    fn domain_prefix_is_domain_type() {
        let spec = ChainSpec::mainnet();
        let domain = spec.get_domain(Epoch::new(0), Domain::BeaconAttester, &fork(), Hash256::ZERO);
        assert_eq!(&domain.as_slice()[0..4], &[1, 0, 0, 0]);
    }

    #[test]
    fn domain_separates_purposes_and_forks() {
        let spec = ChainSpec::mainnet();
        let gvr = Hash256::repeat_byte(42);
        let attester = spec.get_domain(Epoch::new(0), Domain::BeaconAttester, &fork(), gvr);
        let proposer = spec.get_domain(Epoch::new(0), Domain::BeaconProposer, &fork(), gvr);
        let post_fork = spec.get_domain(Epoch::new(10), Domain::BeaconAttester, &fork(), gvr);
        let other_chain =
            spec.get_domain(Epoch::new(0), Domain::BeaconAttester, &fork(), Hash256::ZERO);

        assert_ne!(attester, proposer);
        assert_ne!(attester, post_fork);
        assert_ne!(attester, other_chain);
        assert_eq!(&proposer.as_slice()[4..], &attester.as_slice()[4..]);
    }

    #[test]
    fn spec_serde_round_trip() {
        let spec = ChainSpec::minimal();
        let json = serde_json::to_string(&spec).unwrap();
        assert_eq!(serde_json::from_str::<ChainSpec>(&json).unwrap(), spec);
    }
}
