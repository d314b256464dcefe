use crate::signed_attestation::InvalidAttestation;
use crate::signed_block::InvalidBlock;
use crate::{NotSafe, Safe, SignedAttestation, SignedBlock, SigningRoot};
use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};
use types::{Epoch, Slot};

/// Everything a single validator has signed, indexed for slashing checks.
///
/// Attestations are keyed by target epoch and blocks by slot, matching the uniqueness
/// constraints of the database. The history is only ever extended after the corresponding
/// database write has committed.
#[derive(Debug, Clone)]
pub struct ValidatorHistory {
    validator_id: i64,
    attestations: BTreeMap<Epoch, SignedAttestation>,
    blocks: BTreeMap<Slot, SignedBlock>,
}

impl ValidatorHistory {
    pub(crate) fn new(validator_id: i64) -> Self {
        Self {
            validator_id,
            attestations: BTreeMap::new(),
            blocks: BTreeMap::new(),
        }
    }

    pub(crate) fn from_records(
        validator_id: i64,
        attestations: impl IntoIterator<Item = SignedAttestation>,
        blocks: impl IntoIterator<Item = SignedBlock>,
    ) -> Self {
        let mut history = Self::new(validator_id);
        history.attestations.extend(
            attestations
                .into_iter()
                .map(|attestation| (attestation.target_epoch, attestation)),
        );
        history
            .blocks
            .extend(blocks.into_iter().map(|block| (block.slot, block)));
        history
    }

    pub fn validator_id(&self) -> i64 {
        self.validator_id
    }

    /// Check whether an attestation with these epochs would be slashable.
    pub fn check_attestation(
        &self,
        att_source_epoch: Epoch,
        att_target_epoch: Epoch,
        att_signing_root: SigningRoot,
    ) -> Result<Safe, NotSafe> {
        // Although it's not required to avoid slashing, we disallow attestations
        // which are obviously invalid by virtue of their source epoch exceeding their target.
        if att_source_epoch > att_target_epoch {
            return Err(InvalidAttestation::SourceExceedsTarget.into());
        }

        // 1. Check for a double vote. Namely, an existing attestation with the same target epoch,
        //    and a different signing root.
        if let Some(existing) = self.attestations.get(&att_target_epoch) {
            if existing.signing_root == att_signing_root {
                return Ok(Safe::SameData);
            }
            return Err(InvalidAttestation::DoubleVote(existing.clone()).into());
        }

        let new = SignedAttestation::new(att_source_epoch, att_target_epoch, att_signing_root);

        // 2. Check that no previous vote is surrounded by `new`. Only attestations with an
        //    earlier target can be surrounded.
        if let Some(prev) = self
            .attestations
            .range(..att_target_epoch)
            .map(|(_, prev)| prev)
            .find(|prev| new.surrounds(prev))
        {
            return Err(InvalidAttestation::SurroundingVote { prev: prev.clone() }.into());
        }

        // 3. Check that no previous vote surrounds `new`. Only attestations with a later target
        //    can surround it.
        if let Some(prev) = self
            .attestations
            .range((Excluded(att_target_epoch), Unbounded))
            .map(|(_, prev)| prev)
            .find(|prev| prev.surrounds(&new))
        {
            return Err(InvalidAttestation::SurroundedVote { prev: prev.clone() }.into());
        }

        Ok(Safe::Valid)
    }

    /// Check whether a block proposal at `slot` would be slashable.
    ///
    /// Proposals for slots earlier than previously signed blocks are permitted, only a second,
    /// different block at an already-signed slot is refused.
    pub fn check_block(&self, slot: Slot, signing_root: SigningRoot) -> Result<Safe, NotSafe> {
        match self.blocks.get(&slot) {
            Some(existing) if existing.signing_root == signing_root => Ok(Safe::SameData),
            Some(existing) => Err(InvalidBlock::DoubleBlockProposal(existing.clone()).into()),
            None => Ok(Safe::Valid),
        }
    }

    pub(crate) fn insert_attestation(&mut self, attestation: SignedAttestation) {
        self.attestations
            .insert(attestation.target_epoch, attestation);
    }

    pub(crate) fn insert_block(&mut self, block: SignedBlock) {
        self.blocks.insert(block.slot, block);
    }

    /// All signed attestations, in order of increasing target epoch.
    pub fn attestations(&self) -> impl Iterator<Item = &SignedAttestation> {
        self.attestations.values()
    }

    /// All signed blocks, in order of increasing slot.
    pub fn blocks(&self) -> impl Iterator<Item = &SignedBlock> {
        self.blocks.values()
    }
}
