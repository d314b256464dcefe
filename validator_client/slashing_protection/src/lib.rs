mod graffiti_cursor;
pub mod interchange;
mod signed_attestation;
mod signed_block;
mod slashing_database;
mod validator_history;

pub use crate::graffiti_cursor::GraffitiCursorError;
pub use crate::signed_attestation::{InvalidAttestation, SignedAttestation};
pub use crate::signed_block::{InvalidBlock, SignedBlock};
pub use crate::slashing_database::{
    ImportSummary, InterchangeError, InterchangeImportOutcome, SlashingDatabase, CONNECTION_TIMEOUT,
    POOL_SIZE, SUPPORTED_INTERCHANGE_FORMAT_VERSION,
};
pub use crate::validator_history::ValidatorHistory;
use rusqlite::Error as SQLError;
use std::fmt;
use std::io::{Error as IOError, ErrorKind};
use types::{Hash256, PublicKeyBytes};

/// The filename within the `validators` directory that contains the slashing protection DB.
pub const SLASHING_PROTECTION_FILENAME: &str = "slashing_protection.sqlite";

/// The attestation or block is not safe to sign.
///
/// This could be because it's slashable, or because an error occurred.
#[derive(PartialEq, Debug)]
pub enum NotSafe {
    UnregisteredValidator(PublicKeyBytes),
    InvalidBlock(InvalidBlock),
    InvalidAttestation(InvalidAttestation),
    PermissionsError,
    IOError(ErrorKind),
    SQLError(String),
    SQLPoolError(String),
    ConsistencyError,
}

/// The attestation or block is safe to sign, and will not cause the signer to be slashed.
#[derive(PartialEq, Debug)]
pub enum Safe {
    /// Casting the exact same data (block or attestation) twice is never slashable.
    SameData,
    /// Incoming data is safe from slashing, and is not a duplicate.
    Valid,
}

/// A wrapper for `Hash256` that treats `0x0` as a special null value.
///
/// Notably `SigningRoot(0x0) != SigningRoot(0x0)`. It is `PartialEq` but not `Eq`!
#[derive(Debug, Clone, Copy, Default)]
pub struct SigningRoot(Hash256);

impl PartialEq for SigningRoot {
    fn eq(&self, other: &Self) -> bool {
        !self.is_null() && self.0 == other.0
    }
}

impl From<Hash256> for SigningRoot {
    fn from(hash: Hash256) -> Self {
        SigningRoot(hash)
    }
}

impl SigningRoot {
    fn is_null(&self) -> bool {
        self.0.is_zero()
    }

    /// The root, or `None` if it is the null root.
    pub fn to_hash256(self) -> Option<Hash256> {
        Some(self.0).filter(|_| !self.is_null())
    }

    fn to_hash256_raw(self) -> Hash256 {
        self.0
    }
}

/// Safely parse a `SigningRoot` from the given `column` of an SQLite `row`.
fn signing_root_from_row(column: usize, row: &rusqlite::Row) -> rusqlite::Result<SigningRoot> {
    let bytes: Vec<u8> = row.get(column)?;
    if bytes.len() == 32 {
        Ok(SigningRoot::from(Hash256::from_slice(&bytes)))
    } else {
        Err(rusqlite::Error::FromSqlConversionFailure(
            column,
            rusqlite::types::Type::Blob,
            Box::from(format!("Invalid length for Hash256: {}", bytes.len())),
        ))
    }
}

impl From<IOError> for NotSafe {
    fn from(error: IOError) -> NotSafe {
        NotSafe::IOError(error.kind())
    }
}

impl From<SQLError> for NotSafe {
    fn from(error: SQLError) -> NotSafe {
        NotSafe::SQLError(error.to_string())
    }
}

impl From<r2d2::Error> for NotSafe {
    fn from(error: r2d2::Error) -> Self {
        // Use `Display` impl to print "timed out waiting for connection"
        NotSafe::SQLPoolError(format!("{}", error))
    }
}

impl From<InvalidAttestation> for NotSafe {
    fn from(reason: InvalidAttestation) -> Self {
        NotSafe::InvalidAttestation(reason)
    }
}

impl From<InvalidBlock> for NotSafe {
    fn from(reason: InvalidBlock) -> Self {
        NotSafe::InvalidBlock(reason)
    }
}

impl fmt::Display for NotSafe {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl NotSafe {
    /// Short, stable label used in logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            NotSafe::UnregisteredValidator(_) => "unregistered_validator",
            NotSafe::InvalidBlock(InvalidBlock::DoubleBlockProposal(_)) => "double_proposal",
            NotSafe::InvalidAttestation(InvalidAttestation::DoubleVote(_)) => "double_vote",
            NotSafe::InvalidAttestation(InvalidAttestation::SurroundingVote { .. }) => {
                "surrounding_vote"
            }
            NotSafe::InvalidAttestation(InvalidAttestation::SurroundedVote { .. }) => {
                "surrounded_vote"
            }
            NotSafe::InvalidAttestation(InvalidAttestation::SourceExceedsTarget) => {
                "source_exceeds_target"
            }
            NotSafe::PermissionsError => "permissions_error",
            NotSafe::IOError(_) => "io_error",
            NotSafe::SQLError(_) => "sql_error",
            NotSafe::SQLPoolError(_) => "sql_pool_error",
            NotSafe::ConsistencyError => "consistency_error",
        }
    }

    /// Returns `true` if the refusal was caused by an actual slashing condition, rather than a
    /// fault while trying to prove safety.
    pub fn is_slashable(&self) -> bool {
        matches!(self, NotSafe::InvalidBlock(_) | NotSafe::InvalidAttestation(_))
    }
}
