use crate::test_utils::*;
use slashing_protection::{InvalidAttestation, NotSafe, Safe, SlashingDatabase};
use types::{AttestationData, Checkpoint, Epoch, Slot};

#[test]
fn double_vote_denied() {
    let (_dir, db) = setup(1);
    let pk = pubkey(0);
    assert_eq!(attest(&db, &pk, 0, 1, 1), Ok(Safe::Valid));
    assert!(matches!(
        attest(&db, &pk, 0, 1, 2),
        Err(NotSafe::InvalidAttestation(InvalidAttestation::DoubleVote(_)))
    ));
    assert_eq!(attest(&db, &pk, 0, 1, 1), Ok(Safe::SameData));
    assert_eq!(db.attestation_history(&pk).unwrap().len(), 1);
}

#[test]
fn surrounding_and_surrounded_denied() {
    let (_dir, db) = setup(1);
    let pk = pubkey(0);
    assert_eq!(attest(&db, &pk, 1, 10, 1), Ok(Safe::Valid));
    assert!(matches!(
        attest(&db, &pk, 0, 11, 2),
        Err(NotSafe::InvalidAttestation(
            InvalidAttestation::SurroundingVote { .. }
        ))
    ));
    assert!(matches!(
        attest(&db, &pk, 3, 4, 2),
        Err(NotSafe::InvalidAttestation(
            InvalidAttestation::SurroundedVote { .. }
        ))
    ));
    // Denied attestations are not recorded.
    assert_eq!(db.attestation_history(&pk).unwrap().len(), 1);
}

#[test]
fn source_exceeds_target_denied() {
    let (_dir, db) = setup(1);
    assert_eq!(
        attest(&db, &pubkey(0), 5, 4, 1),
        Err(NotSafe::InvalidAttestation(
            InvalidAttestation::SourceExceedsTarget
        ))
    );
}

#[test]
fn equal_source_and_target_allowed() {
    let (_dir, db) = setup(1);
    let pk = pubkey(0);
    assert_eq!(attest(&db, &pk, 0, 0, 1), Ok(Safe::Valid));
    assert_eq!(attest(&db, &pk, 0, 1, 2), Ok(Safe::Valid));
    assert_eq!(db.attestation_history(&pk).unwrap().len(), 2);
}

#[test]
fn keys_are_independent() {
    let (_dir, db) = setup(2);
    assert_eq!(attest(&db, &pubkey(0), 0, 1, 1), Ok(Safe::Valid));
    assert_eq!(attest(&db, &pubkey(1), 0, 1, 2), Ok(Safe::Valid));
}

#[test]
fn unregistered_validator_denied() {
    let (_dir, db) = setup(1);
    let pk = pubkey(7);
    assert_eq!(
        attest(&db, &pk, 0, 1, 1),
        Err(NotSafe::UnregisteredValidator(pk))
    );
}

#[test]
fn attestation_data_convenience() {
    let (_dir, db) = setup(1);
    let data = AttestationData {
        slot: Slot::new(64),
        index: 3,
        beacon_block_root: root(9),
        source: Checkpoint {
            epoch: Epoch::new(1),
            root: root(8),
        },
        target: Checkpoint {
            epoch: Epoch::new(2),
            root: root(7),
        },
    };
    assert_eq!(
        db.check_and_insert_attestation(&pubkey(0), &data, root(1)),
        Ok(Safe::Valid)
    );
    assert!(attest(&db, &pubkey(0), 1, 2, 2).is_err());
}

#[test]
fn history_survives_reopen() {
    let (dir, db) = setup(1);
    let pk = pubkey(0);
    attest(&db, &pk, 1, 10, 1).unwrap();
    propose(&db, &pk, 100, 1).unwrap();
    drop(db);

    let db = SlashingDatabase::open(&dir.path().join(DB_FILENAME)).unwrap();
    db.register_validator(&pk).unwrap();
    assert_eq!(db.num_validator_rows().unwrap(), 1);
    assert!(matches!(
        attest(&db, &pk, 0, 11, 2),
        Err(NotSafe::InvalidAttestation(
            InvalidAttestation::SurroundingVote { .. }
        ))
    ));
    assert!(propose(&db, &pk, 100, 2).is_err());
    assert_eq!(attest(&db, &pk, 1, 10, 1), Ok(Safe::SameData));
}
