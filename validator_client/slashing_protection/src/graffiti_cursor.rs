use crate::{NotSafe, SlashingDatabase};
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use types::{Hash256, PublicKeyBytes};

#[derive(Debug, PartialEq)]
pub enum GraffitiCursorError {
    NotSafe(NotSafe),
    /// The stored cursor could not be represented as an index.
    InvalidIndex(i64),
}

impl From<NotSafe> for GraffitiCursorError {
    fn from(e: NotSafe) -> Self {
        GraffitiCursorError::NotSafe(e)
    }
}

impl From<rusqlite::Error> for GraffitiCursorError {
    fn from(e: rusqlite::Error) -> Self {
        GraffitiCursorError::NotSafe(e.into())
    }
}

impl From<r2d2::Error> for GraffitiCursorError {
    fn from(e: r2d2::Error) -> Self {
        GraffitiCursorError::NotSafe(e.into())
    }
}

impl SlashingDatabase {
    /// Claim the next position in an ordered graffiti list of length `ordered_len`.
    ///
    /// Returns `None` once the list is exhausted, without moving the cursor. The cursor is kept
    /// alongside `file_hash`; if the stored hash differs then the file has changed and the cursor
    /// starts again from 0.
    pub fn next_graffiti_index(
        &self,
        validator_pk: &PublicKeyBytes,
        file_hash: Hash256,
        ordered_len: usize,
    ) -> Result<Option<usize>, GraffitiCursorError> {
        let history_lock = self.history(validator_pk)?;
        let history = history_lock.lock();
        let validator_id = history.validator_id();

        let mut conn = self.conn_pool().get()?;
        let txn = conn.transaction_with_behavior(TransactionBehavior::Exclusive)?;

        let stored: Option<(Vec<u8>, i64)> = txn
            .query_row(
                "SELECT file_hash, next_index FROM graffiti_cursors WHERE validator_id = ?1",
                params![validator_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let index = match stored {
            Some((hash, next_index)) if hash.as_slice() == file_hash.as_slice() => {
                usize::try_from(next_index)
                    .map_err(|_| GraffitiCursorError::InvalidIndex(next_index))?
            }
            _ => 0,
        };

        let (selected, next_index) = if index < ordered_len {
            (Some(index), index + 1)
        } else {
            (None, index)
        };

        let next_index = i64::try_from(next_index)
            .map_err(|_| GraffitiCursorError::InvalidIndex(i64::MAX))?;
        txn.execute(
            "INSERT OR REPLACE INTO graffiti_cursors (validator_id, file_hash, next_index)
             VALUES (?1, ?2, ?3)",
            params![validator_id, file_hash.as_slice(), next_index],
        )?;
        txn.commit()?;

        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn cursor_advances_then_stops() {
        let dir = tempdir().unwrap();
        let db = SlashingDatabase::create(&dir.path().join("db.sqlite")).unwrap();
        let pk = PublicKeyBytes::deserialize(&[3; 48]).unwrap();
        db.register_validator(&pk).unwrap();
        let hash = Hash256::repeat_byte(1);

        let indices = (0..5)
            .map(|_| db.next_graffiti_index(&pk, hash, 3).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(indices, vec![Some(0), Some(1), Some(2), None, None]);
    }

    #[test]
    fn changed_hash_resets_cursor() {
        let dir = tempdir().unwrap();
        let db = SlashingDatabase::create(&dir.path().join("db.sqlite")).unwrap();
        let pk = PublicKeyBytes::deserialize(&[3; 48]).unwrap();
        db.register_validator(&pk).unwrap();

        assert_eq!(
            db.next_graffiti_index(&pk, Hash256::repeat_byte(1), 2),
            Ok(Some(0))
        );
        assert_eq!(
            db.next_graffiti_index(&pk, Hash256::repeat_byte(1), 2),
            Ok(Some(1))
        );
        assert_eq!(
            db.next_graffiti_index(&pk, Hash256::repeat_byte(2), 2),
            Ok(Some(0))
        );
    }

    #[test]
    fn unregistered_validator() {
        let dir = tempdir().unwrap();
        let db = SlashingDatabase::create(&dir.path().join("db.sqlite")).unwrap();
        let pk = PublicKeyBytes::deserialize(&[3; 48]).unwrap();
        assert_eq!(
            db.next_graffiti_index(&pk, Hash256::ZERO, 2),
            Err(GraffitiCursorError::NotSafe(NotSafe::UnregisteredValidator(
                pk
            )))
        );
    }
}
