use crate::test_utils::*;
use slashing_protection::interchange::Interchange;
use slashing_protection::{
    InterchangeError, InterchangeImportOutcome, SlashingDatabase,
    SUPPORTED_INTERCHANGE_FORMAT_VERSION,
};
use tempfile::tempdir;
use types::Hash256;

fn genesis_validators_root() -> Hash256 {
    Hash256::repeat_byte(0x42)
}

#[test]
fn export_then_import_preserves_protection() {
    let (_dir, db) = setup(2);
    attest(&db, &pubkey(0), 1, 10, 1).unwrap();
    attest(&db, &pubkey(0), 10, 11, 2).unwrap();
    propose(&db, &pubkey(1), 50, 3).unwrap();

    let interchange = db.export_interchange_info(genesis_validators_root()).unwrap();
    assert_eq!(
        interchange.metadata.interchange_format_version,
        SUPPORTED_INTERCHANGE_FORMAT_VERSION
    );
    assert_eq!(interchange.len(), 2);

    // Round trip through JSON to exercise the file format.
    let mut json = vec![];
    interchange.write_to(&mut json).unwrap();
    let interchange = Interchange::from_json_reader(json.as_slice()).unwrap();

    let dir = tempdir().unwrap();
    let fresh = SlashingDatabase::create(&dir.path().join(DB_FILENAME)).unwrap();
    let outcomes = fresh
        .import_interchange_info(interchange, genesis_validators_root())
        .unwrap();
    assert!(outcomes.iter().all(|outcome| !outcome.failed()));

    assert!(attest(&fresh, &pubkey(0), 0, 12, 9).is_err());
    assert!(attest(&fresh, &pubkey(0), 2, 10, 9).is_err());
    assert!(propose(&fresh, &pubkey(1), 50, 9).is_err());
    assert!(attest(&fresh, &pubkey(0), 11, 12, 9).is_ok());
}

#[test]
fn import_is_idempotent() {
    let (_dir, db) = setup(1);
    attest(&db, &pubkey(0), 1, 2, 1).unwrap();
    let interchange = db.export_interchange_info(genesis_validators_root()).unwrap();

    let outcomes = db
        .import_interchange_info(interchange, genesis_validators_root())
        .unwrap();
    match &outcomes[..] {
        [InterchangeImportOutcome::Success { summary, .. }] => {
            assert_eq!(summary.attestations_imported, 0);
            assert_eq!(summary.duplicates_skipped, 1);
        }
        other => panic!("unexpected outcomes: {:?}", other),
    }
}

#[test]
fn conflicting_import_is_failure() {
    let (_dir, db) = setup(1);
    attest(&db, &pubkey(0), 1, 2, 1).unwrap();
    let interchange = db.export_interchange_info(genesis_validators_root()).unwrap();

    let (_other_dir, other) = setup(1);
    attest(&other, &pubkey(0), 1, 2, 2).unwrap();

    let outcomes = other
        .import_interchange_info(interchange, genesis_validators_root())
        .unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].failed());
    assert_eq!(other.attestation_history(&pubkey(0)).unwrap().len(), 1);
}

#[test]
fn genesis_validators_root_mismatch() {
    let (_dir, db) = setup(1);
    let interchange = db.export_interchange_info(genesis_validators_root()).unwrap();
    assert!(matches!(
        db.import_interchange_info(interchange, Hash256::repeat_byte(1)),
        Err(InterchangeError::GenesisValidatorsMismatch { .. })
    ));
}

#[test]
fn unsupported_version() {
    let (_dir, db) = setup(1);
    let mut interchange = db.export_interchange_info(genesis_validators_root()).unwrap();
    interchange.metadata.interchange_format_version = 4;
    assert!(matches!(
        db.import_interchange_info(interchange, genesis_validators_root()),
        Err(InterchangeError::UnsupportedVersion(4))
    ));
}
