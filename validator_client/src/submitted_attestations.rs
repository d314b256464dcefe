use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use types::{CommitteeIndex, Hash256, PublicKeyBytes, Slot};

/// Submissions for slots more than this many slots before the newest recorded slot are
/// forgotten.
pub const SUBMITTED_ATTESTATION_SLOTS: u64 = 64;

/// Remembers recently submitted attestations so that repeated broadcasts can be reported.
#[derive(Default)]
pub struct SubmittedAttestations {
    by_slot: Mutex<BTreeMap<Slot, HashSet<(CommitteeIndex, Hash256, PublicKeyBytes)>>>,
}

impl SubmittedAttestations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a submission, returning `false` if the identical attestation was already recorded.
    pub fn record(
        &self,
        slot: Slot,
        committee_index: CommitteeIndex,
        signing_root: Hash256,
        pubkey: PublicKeyBytes,
    ) -> bool {
        let mut by_slot = self.by_slot.lock();
        let is_new = by_slot
            .entry(slot)
            .or_default()
            .insert((committee_index, signing_root, pubkey));

        if let Some(newest) = by_slot.keys().next_back().copied() {
            let oldest = newest - SUBMITTED_ATTESTATION_SLOTS;
            by_slot.retain(|slot, _| *slot >= oldest);
        }

        is_new
    }

    pub fn len(&self) -> usize {
        self.by_slot.lock().values().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pubkey() -> PublicKeyBytes {
        PublicKeyBytes::deserialize(&[1; 48]).unwrap()
    }

    #[test]
    fn repeat_detected() {
        let submitted = SubmittedAttestations::new();
        let root = Hash256::repeat_byte(1);
        assert!(submitted.record(Slot::new(1), 0, root, pubkey()));
        assert!(!submitted.record(Slot::new(1), 0, root, pubkey()));
        assert!(submitted.record(Slot::new(1), 1, root, pubkey()));
        assert_eq!(submitted.len(), 2);
    }

    #[test]
    fn old_slots_pruned() {
        let submitted = SubmittedAttestations::new();
        let root = Hash256::repeat_byte(1);
        submitted.record(Slot::new(1), 0, root, pubkey());
        submitted.record(Slot::new(1 + SUBMITTED_ATTESTATION_SLOTS), 0, root, pubkey());
        assert_eq!(submitted.len(), 2);
        submitted.record(Slot::new(2 + SUBMITTED_ATTESTATION_SLOTS), 0, root, pubkey());
        assert_eq!(submitted.len(), 2);
    }
}
