use crate::{signing_root_from_row, SigningRoot};
use types::{Hash256, Slot};

/// A block that has previously been signed.
#[derive(Clone, Debug, PartialEq)]
pub struct SignedBlock {
    pub slot: Slot,
    pub signing_root: SigningRoot,
}

/// Reasons why a block may be slashable.
#[derive(PartialEq, Debug)]
pub enum InvalidBlock {
    DoubleBlockProposal(SignedBlock),
}

impl SignedBlock {
    pub fn new(slot: Slot, signing_root: SigningRoot) -> Self {
        Self { slot, signing_root }
    }

    pub fn from_header(slot: Slot, signing_root: Hash256) -> Self {
        Self::new(slot, signing_root.into())
    }

    /// Parse an SQLite row of `(slot, signing_root)`.
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        let slot = row.get(0)?;
        let signing_root = signing_root_from_row(1, row)?;
        Ok(SignedBlock { slot, signing_root })
    }
}
