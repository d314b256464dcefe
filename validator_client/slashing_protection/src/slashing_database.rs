use crate::interchange::{
    Interchange, InterchangeData, InterchangeMetadata, SignedAttestation as InterchangeAttestation,
    SignedBlock as InterchangeBlock,
};
use crate::validator_history::ValidatorHistory;
use crate::{signing_root_from_row, NotSafe, Safe, SignedAttestation, SignedBlock, SigningRoot};
use parking_lot::{Mutex, RwLock};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OpenFlags, OptionalExtension, Transaction, TransactionBehavior};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use types::{AttestationData, Epoch, Hash256, PublicKeyBytes, Slot};

type Pool = r2d2::Pool<SqliteConnectionManager>;

/// We set the pool size to 1 for compatibility with locking_mode=EXCLUSIVE.
///
/// This is perhaps overkill in the presence of exclusive transactions, but has
/// the added bonus of preventing other processes from trying to use our slashing database.
pub const POOL_SIZE: u32 = 1;
#[cfg(not(test))]
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);
#[cfg(test)]
pub const CONNECTION_TIMEOUT: Duration = Duration::from_millis(500);

/// Supported version of the interchange format.
pub const SUPPORTED_INTERCHANGE_FORMAT_VERSION: u64 = 5;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS validators (
        id INTEGER PRIMARY KEY,
        public_key BLOB NOT NULL UNIQUE
    );
    CREATE TABLE IF NOT EXISTS signed_blocks (
        validator_id INTEGER NOT NULL,
        slot INTEGER NOT NULL,
        signing_root BLOB NOT NULL,
        FOREIGN KEY(validator_id) REFERENCES validators(id),
        UNIQUE (validator_id, slot)
    );
    CREATE TABLE IF NOT EXISTS signed_attestations (
        validator_id INTEGER NOT NULL,
        source_epoch INTEGER NOT NULL,
        target_epoch INTEGER NOT NULL,
        signing_root BLOB NOT NULL,
        FOREIGN KEY(validator_id) REFERENCES validators(id),
        UNIQUE (validator_id, target_epoch)
    );
    CREATE TABLE IF NOT EXISTS graffiti_cursors (
        validator_id INTEGER PRIMARY KEY,
        file_hash BLOB NOT NULL,
        next_index INTEGER NOT NULL,
        FOREIGN KEY(validator_id) REFERENCES validators(id)
    );
";

/// The SQLite-backed record of everything signed by the locally managed validators.
///
/// Each registered validator has an in-memory `ValidatorHistory` guarded by its own mutex. The
/// mutex is held from the slashing check until the new record is committed to disk and added to
/// the history, so two duties for the same validator can never both pass the check. Different
/// validators only contend for the (single) database connection.
pub struct SlashingDatabase {
    conn_pool: Pool,
    histories: RwLock<HashMap<PublicKeyBytes, Arc<Mutex<ValidatorHistory>>>>,
}

impl SlashingDatabase {
    /// Open an existing database at the given `path`, or create one if none exists.
    pub fn open_or_create(path: &Path) -> Result<Self, NotSafe> {
        if path.exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    /// Create a slashing database at the given path.
    ///
    /// Error if a database (or any file) already exists at `path`.
    pub fn create(path: &Path) -> Result<Self, NotSafe> {
        let file = OpenOptions::new()
            .write(true)
            .read(true)
            .create_new(true)
            .open(path)?;

        Self::set_db_file_permissions(&file)?;
        let conn_pool = Self::open_conn_pool(path)?;
        let conn = conn_pool.get()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self::from_pool(conn_pool))
    }

    /// Open an existing `SlashingDatabase` from disk.
    ///
    /// Tables missing from databases written by older versions are created.
    pub fn open(path: &Path) -> Result<Self, NotSafe> {
        let conn_pool = Self::open_conn_pool(path)?;
        let conn = conn_pool.get()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self::from_pool(conn_pool))
    }

    fn from_pool(conn_pool: Pool) -> Self {
        Self {
            conn_pool,
            histories: RwLock::new(HashMap::new()),
        }
    }

    fn apply_pragmas(conn: &mut rusqlite::Connection) -> Result<(), rusqlite::Error> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.pragma_update(None, "locking_mode", "EXCLUSIVE")?;
        Ok(())
    }

    /// Set the database file to readable and writable only by its owner (0600).
    #[cfg(unix)]
    fn set_db_file_permissions(file: &std::fs::File) -> Result<(), NotSafe> {
        use std::os::unix::fs::PermissionsExt;

        let mut perm = file.metadata()?.permissions();
        perm.set_mode(0o600);
        file.set_permissions(perm)
            .map_err(|_| NotSafe::PermissionsError)
    }

    #[cfg(not(unix))]
    fn set_db_file_permissions(_file: &std::fs::File) -> Result<(), NotSafe> {
        Ok(())
    }

    fn open_conn_pool(path: &Path) -> Result<Pool, NotSafe> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE;
        let manager = SqliteConnectionManager::file(path)
            .with_flags(flags)
            .with_init(Self::apply_pragmas);

        let conn_pool = Pool::builder()
            .max_size(POOL_SIZE)
            .connection_timeout(CONNECTION_TIMEOUT)
            .build(manager)
            .map_err(|e| NotSafe::SQLError(format!("Unable to open database: {:?}", e)))?;
        Ok(conn_pool)
    }

    /// Register every key in `public_keys` and load its full signing history into memory.
    ///
    /// Must complete before any duty is signed for these keys; checks for keys that were never
    /// bootstrapped fail with `NotSafe::UnregisteredValidator`. Bootstrapping an already loaded
    /// key leaves its in-memory history untouched.
    pub fn bootstrap<'a>(
        &self,
        public_keys: impl IntoIterator<Item = &'a PublicKeyBytes>,
    ) -> Result<(), NotSafe> {
        let mut conn = self.conn_pool.get()?;
        let txn = conn.transaction()?;

        let mut loaded = vec![];
        for pubkey in public_keys {
            if self.histories.read().contains_key(pubkey) {
                continue;
            }
            let validator_id = Self::register_validator_in_txn(&txn, pubkey)?;
            loaded.push((pubkey.clone(), Self::load_history(&txn, validator_id)?));
        }
        txn.commit()?;

        let mut histories = self.histories.write();
        for (pubkey, history) in loaded {
            histories
                .entry(pubkey)
                .or_insert_with(|| Arc::new(Mutex::new(history)));
        }
        Ok(())
    }

    /// Register a single validator, e.g. after a key is added at runtime.
    pub fn register_validator(&self, validator_pk: &PublicKeyBytes) -> Result<(), NotSafe> {
        self.bootstrap(std::iter::once(validator_pk))
    }

    fn register_validator_in_txn(
        txn: &Transaction,
        validator_pk: &PublicKeyBytes,
    ) -> Result<i64, NotSafe> {
        txn.execute(
            "INSERT OR IGNORE INTO validators (public_key) VALUES (?1)",
            params![validator_pk.serialize()],
        )?;
        Self::get_validator_id_in_txn(txn, validator_pk)?
            .ok_or_else(|| NotSafe::UnregisteredValidator(validator_pk.clone()))
    }

    fn get_validator_id_in_txn(
        txn: &Transaction,
        validator_pk: &PublicKeyBytes,
    ) -> Result<Option<i64>, NotSafe> {
        Ok(txn
            .query_row(
                "SELECT id FROM validators WHERE public_key = ?1",
                params![validator_pk.serialize()],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn load_history(txn: &Transaction, validator_id: i64) -> Result<ValidatorHistory, NotSafe> {
        let attestations = txn
            .prepare(
                "SELECT source_epoch, target_epoch, signing_root
                 FROM signed_attestations
                 WHERE validator_id = ?1",
            )?
            .query_and_then(params![validator_id], SignedAttestation::from_row)?
            .collect::<Result<Vec<_>, rusqlite::Error>>()?;

        let blocks = txn
            .prepare(
                "SELECT slot, signing_root
                 FROM signed_blocks
                 WHERE validator_id = ?1",
            )?
            .query_and_then(params![validator_id], SignedBlock::from_row)?
            .collect::<Result<Vec<_>, rusqlite::Error>>()?;

        Ok(ValidatorHistory::from_records(
            validator_id,
            attestations,
            blocks,
        ))
    }

    pub(crate) fn history(
        &self,
        validator_pk: &PublicKeyBytes,
    ) -> Result<Arc<Mutex<ValidatorHistory>>, NotSafe> {
        self.histories
            .read()
            .get(validator_pk)
            .cloned()
            .ok_or_else(|| NotSafe::UnregisteredValidator(validator_pk.clone()))
    }

    pub(crate) fn conn_pool(&self) -> &Pool {
        &self.conn_pool
    }

    /// Check an attestation for slash safety, and if it is safe, record it in the database.
    ///
    /// The checking and inserting happen atomically for the validator, so that concurrent calls
    /// to this function for the same key are serialized.
    pub fn check_and_insert_attestation(
        &self,
        validator_pk: &PublicKeyBytes,
        attestation: &AttestationData,
        signing_root: Hash256,
    ) -> Result<Safe, NotSafe> {
        self.check_and_insert_attestation_signing_root(
            validator_pk,
            attestation.source.epoch,
            attestation.target.epoch,
            SigningRoot::from(signing_root),
        )
    }

    /// Variant of `check_and_insert_attestation` which accepts the epochs and signing root
    /// directly.
    pub fn check_and_insert_attestation_signing_root(
        &self,
        validator_pk: &PublicKeyBytes,
        att_source_epoch: Epoch,
        att_target_epoch: Epoch,
        att_signing_root: SigningRoot,
    ) -> Result<Safe, NotSafe> {
        let history_lock = self.history(validator_pk)?;
        let mut history = history_lock.lock();

        let safe = history.check_attestation(att_source_epoch, att_target_epoch, att_signing_root)?;

        if safe == Safe::Valid {
            let attestation =
                SignedAttestation::new(att_source_epoch, att_target_epoch, att_signing_root);

            let mut conn = self.conn_pool.get()?;
            let txn = conn.transaction_with_behavior(TransactionBehavior::Exclusive)?;
            Self::insert_attestation(&txn, history.validator_id(), &attestation)?;
            txn.commit()?;

            history.insert_attestation(attestation);
        }

        Ok(safe)
    }

    /// Check a block proposal for slash safety, and if it is safe, record it in the database.
    ///
    /// The checking and inserting happen atomically for the validator.
    pub fn check_and_insert_block_proposal(
        &self,
        validator_pk: &PublicKeyBytes,
        slot: Slot,
        signing_root: Hash256,
    ) -> Result<Safe, NotSafe> {
        self.check_and_insert_block_signing_root(validator_pk, slot, signing_root.into())
    }

    pub fn check_and_insert_block_signing_root(
        &self,
        validator_pk: &PublicKeyBytes,
        slot: Slot,
        signing_root: SigningRoot,
    ) -> Result<Safe, NotSafe> {
        let history_lock = self.history(validator_pk)?;
        let mut history = history_lock.lock();

        let safe = history.check_block(slot, signing_root)?;

        if safe == Safe::Valid {
            let block = SignedBlock::new(slot, signing_root);

            let mut conn = self.conn_pool.get()?;
            let txn = conn.transaction_with_behavior(TransactionBehavior::Exclusive)?;
            Self::insert_block_proposal(&txn, history.validator_id(), &block)?;
            txn.commit()?;

            history.insert_block(block);
        }

        Ok(safe)
    }

    fn insert_attestation(
        txn: &Transaction,
        validator_id: i64,
        attestation: &SignedAttestation,
    ) -> Result<(), NotSafe> {
        txn.execute(
            "INSERT INTO signed_attestations (validator_id, source_epoch, target_epoch, signing_root)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                validator_id,
                attestation.source_epoch,
                attestation.target_epoch,
                attestation.signing_root.to_hash256_raw().as_slice()
            ],
        )?;
        Ok(())
    }

    fn insert_block_proposal(
        txn: &Transaction,
        validator_id: i64,
        block: &SignedBlock,
    ) -> Result<(), NotSafe> {
        txn.execute(
            "INSERT INTO signed_blocks (validator_id, slot, signing_root) VALUES (?1, ?2, ?3)",
            params![
                validator_id,
                block.slot,
                block.signing_root.to_hash256_raw().as_slice()
            ],
        )?;
        Ok(())
    }

    /// The attestations signed by `validator_pk`, ordered by target epoch.
    pub fn attestation_history(
        &self,
        validator_pk: &PublicKeyBytes,
    ) -> Result<Vec<SignedAttestation>, NotSafe> {
        let history_lock = self.history(validator_pk)?;
        let history = history_lock.lock();
        Ok(history.attestations().cloned().collect())
    }

    /// The blocks signed by `validator_pk`, ordered by slot.
    pub fn block_history(&self, validator_pk: &PublicKeyBytes) -> Result<Vec<SignedBlock>, NotSafe> {
        let history_lock = self.history(validator_pk)?;
        let history = history_lock.lock();
        Ok(history.blocks().cloned().collect())
    }

    /// Count the number of validators registered in the on-disk database.
    pub fn num_validator_rows(&self) -> Result<u32, NotSafe> {
        let conn = self.conn_pool.get()?;
        let count = conn.query_row("SELECT COALESCE(COUNT(*), 0) FROM validators", [], |row| {
            row.get(0)
        })?;
        Ok(count)
    }

    /// Import slashing protection records from another client.
    ///
    /// Each imported record is subject to the same checks as a record signed locally. A record
    /// that conflicts with the existing history is not imported, and its validator is reported as
    /// a failure. Records identical to existing ones are skipped.
    pub fn import_interchange_info(
        &self,
        interchange: Interchange,
        genesis_validators_root: Hash256,
    ) -> Result<Vec<InterchangeImportOutcome>, InterchangeError> {
        let version = interchange.metadata.interchange_format_version;
        if version != SUPPORTED_INTERCHANGE_FORMAT_VERSION {
            return Err(InterchangeError::UnsupportedVersion(version));
        }

        if genesis_validators_root != interchange.metadata.genesis_validators_root {
            return Err(InterchangeError::GenesisValidatorsMismatch {
                client: genesis_validators_root,
                interchange_file: interchange.metadata.genesis_validators_root,
            });
        }

        let mut import_outcomes = vec![];
        for record in interchange.data {
            let pubkey = record.pubkey.clone();
            match self.import_interchange_record(record) {
                Ok(summary) => {
                    import_outcomes.push(InterchangeImportOutcome::Success { pubkey, summary })
                }
                Err(error) => {
                    import_outcomes.push(InterchangeImportOutcome::Failure { pubkey, error })
                }
            }
        }

        Ok(import_outcomes)
    }

    fn import_interchange_record(&self, record: InterchangeData) -> Result<ImportSummary, NotSafe> {
        self.register_validator(&record.pubkey)?;

        let mut summary = ImportSummary::default();
        for block in record.signed_blocks {
            let signing_root = block.signing_root.map(SigningRoot::from).unwrap_or_default();
            match self.check_and_insert_block_signing_root(&record.pubkey, block.slot, signing_root)? {
                Safe::Valid => summary.blocks_imported += 1,
                Safe::SameData => summary.duplicates_skipped += 1,
            }
        }
        for attestation in record.signed_attestations {
            let signing_root = attestation
                .signing_root
                .map(SigningRoot::from)
                .unwrap_or_default();
            match self.check_and_insert_attestation_signing_root(
                &record.pubkey,
                attestation.source_epoch,
                attestation.target_epoch,
                signing_root,
            )? {
                Safe::Valid => summary.attestations_imported += 1,
                Safe::SameData => summary.duplicates_skipped += 1,
            }
        }
        Ok(summary)
    }

    /// Export every record in the database, for every validator, in the interchange format.
    pub fn export_interchange_info(
        &self,
        genesis_validators_root: Hash256,
    ) -> Result<Interchange, InterchangeError> {
        let mut conn = self.conn_pool.get().map_err(NotSafe::from)?;
        let txn = conn.transaction().map_err(NotSafe::from)?;

        let validators = txn
            .prepare("SELECT id, public_key FROM validators ORDER BY id ASC")?
            .query_and_then([], |row| {
                let id: i64 = row.get(0)?;
                let bytes: Vec<u8> = row.get(1)?;
                Ok::<_, rusqlite::Error>((id, bytes))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut data = Vec::with_capacity(validators.len());
        for (validator_id, pubkey_bytes) in validators {
            let pubkey = PublicKeyBytes::deserialize(&pubkey_bytes)
                .map_err(|_| InterchangeError::NotSafe(NotSafe::ConsistencyError))?;

            let signed_blocks = txn
                .prepare(
                    "SELECT slot, signing_root FROM signed_blocks
                     WHERE validator_id = ?1 ORDER BY slot ASC",
                )?
                .query_and_then(params![validator_id], |row| {
                    Ok(InterchangeBlock {
                        slot: row.get(0)?,
                        signing_root: signing_root_from_row(1, row)?.to_hash256(),
                    })
                })?
                .collect::<Result<Vec<_>, rusqlite::Error>>()?;

            let signed_attestations = txn
                .prepare(
                    "SELECT source_epoch, target_epoch, signing_root FROM signed_attestations
                     WHERE validator_id = ?1 ORDER BY target_epoch ASC",
                )?
                .query_and_then(params![validator_id], |row| {
                    Ok(InterchangeAttestation {
                        source_epoch: row.get(0)?,
                        target_epoch: row.get(1)?,
                        signing_root: signing_root_from_row(2, row)?.to_hash256(),
                    })
                })?
                .collect::<Result<Vec<_>, rusqlite::Error>>()?;

            data.push(InterchangeData {
                pubkey,
                signed_blocks,
                signed_attestations,
            });
        }

        Ok(Interchange {
            metadata: InterchangeMetadata {
                interchange_format_version: SUPPORTED_INTERCHANGE_FORMAT_VERSION,
                genesis_validators_root,
            },
            data,
        })
    }
}

/// Counts of what was imported for one validator.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub blocks_imported: usize,
    pub attestations_imported: usize,
    pub duplicates_skipped: usize,
}

#[derive(Debug)]
pub enum InterchangeImportOutcome {
    Success {
        pubkey: PublicKeyBytes,
        summary: ImportSummary,
    },
    Failure {
        pubkey: PublicKeyBytes,
        error: NotSafe,
    },
}

impl InterchangeImportOutcome {
    pub fn failed(&self) -> bool {
        matches!(self, InterchangeImportOutcome::Failure { .. })
    }
}

#[derive(Debug)]
pub enum InterchangeError {
    UnsupportedVersion(u64),
    GenesisValidatorsMismatch {
        interchange_file: Hash256,
        client: Hash256,
    },
    SQLError(String),
    NotSafe(NotSafe),
}

impl From<NotSafe> for InterchangeError {
    fn from(error: NotSafe) -> Self {
        InterchangeError::NotSafe(error)
    }
}

impl From<rusqlite::Error> for InterchangeError {
    fn from(error: rusqlite::Error) -> Self {
        Self::SQLError(error.to_string())
    }
}
