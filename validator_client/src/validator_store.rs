use crate::beacon_node::BeaconNode;
use crate::signing::{self, SignedMessage, SigningEngine};
use slashing_protection::{NotSafe, Safe, SlashingDatabase};
use slog::{debug, info, Logger};
use std::collections::HashSet;
use std::sync::Arc;
use types::{
    AttestationData, ChainSpec, Domain, Epoch, PublicKeyBytes, SignatureBytes, SignedVoluntaryExit,
    UnsignedBlock, VoluntaryExit,
};

#[derive(Debug, PartialEq)]
pub enum Error {
    /// The key is not managed by this validator client.
    UnknownPubkey(PublicKeyBytes),
    /// Slashing protection refused the message, or could not prove it safe.
    Slashable(NotSafe),
    UnableToSign(signing::Error),
}

impl From<signing::Error> for Error {
    fn from(e: signing::Error) -> Self {
        Error::UnableToSign(e)
    }
}

/// Holds the managed keys and gates every signature on them through slashing protection.
pub struct ValidatorStore<T> {
    voting_pubkeys: Vec<PublicKeyBytes>,
    managed: HashSet<PublicKeyBytes>,
    slashing_protection: Arc<SlashingDatabase>,
    signing: SigningEngine<T>,
    spec: Arc<ChainSpec>,
    log: Logger,
}

impl<T: BeaconNode> ValidatorStore<T> {
    /// Register every key in `voting_pubkeys` with slashing protection and load its history.
    ///
    /// No signature can be produced until this has completed.
    pub fn new(
        slashing_protection: Arc<SlashingDatabase>,
        signing: SigningEngine<T>,
        voting_pubkeys: Vec<PublicKeyBytes>,
        spec: Arc<ChainSpec>,
        log: Logger,
    ) -> Result<Self, String> {
        slashing_protection
            .bootstrap(&voting_pubkeys)
            .map_err(|e| format!("Unable to register validators for slashing protection: {}", e))?;

        info!(
            log,
            "Loaded slashing protection history";
            "validators" => voting_pubkeys.len(),
        );

        Ok(Self {
            managed: voting_pubkeys.iter().cloned().collect(),
            voting_pubkeys,
            slashing_protection,
            signing,
            spec,
            log,
        })
    }

    pub fn voting_pubkeys(&self) -> &[PublicKeyBytes] {
        &self.voting_pubkeys
    }

    pub fn num_voting_validators(&self) -> usize {
        self.voting_pubkeys.len()
    }

    pub fn slashing_protection(&self) -> &Arc<SlashingDatabase> {
        &self.slashing_protection
    }

    pub fn has_validator(&self, validator_pubkey: &PublicKeyBytes) -> bool {
        self.managed.contains(validator_pubkey)
    }

    fn ensure_managed(&self, validator_pubkey: &PublicKeyBytes) -> Result<(), Error> {
        if self.has_validator(validator_pubkey) {
            Ok(())
        } else {
            Err(Error::UnknownPubkey(validator_pubkey.clone()))
        }
    }

    pub async fn randao_reveal(
        &self,
        validator_pubkey: &PublicKeyBytes,
        epoch: Epoch,
    ) -> Result<SignatureBytes, Error> {
        self.ensure_managed(validator_pubkey)?;
        let signed = self
            .signing
            .sign(validator_pubkey, Domain::Randao, epoch, &epoch)
            .await?;
        Ok(signed.signature)
    }

    /// Sign `attestation`, then record it with slashing protection.
    ///
    /// The signature is only returned once the record is durable.
    pub async fn sign_attestation(
        &self,
        validator_pubkey: &PublicKeyBytes,
        attestation: &AttestationData,
    ) -> Result<SignedMessage, Error> {
        self.ensure_managed(validator_pubkey)?;
        let signed = self
            .signing
            .sign(
                validator_pubkey,
                Domain::BeaconAttester,
                attestation.target.epoch,
                attestation,
            )
            .await?;

        match self.slashing_protection.check_and_insert_attestation(
            validator_pubkey,
            attestation,
            signed.signing_root,
        ) {
            Ok(Safe::Valid) => Ok(signed),
            Ok(Safe::SameData) => {
                debug!(
                    self.log,
                    "Attestation was previously signed";
                    "slot" => attestation.slot,
                    "target_epoch" => attestation.target.epoch,
                );
                Ok(signed)
            }
            Err(e) => Err(Error::Slashable(e)),
        }
    }

    /// Sign `block`, then record it with slashing protection.
    ///
    /// Graffiti is part of the signed block, so two blocks at one slot that differ only in
    /// graffiti are a double proposal.
    pub async fn sign_block(
        &self,
        validator_pubkey: &PublicKeyBytes,
        block: &UnsignedBlock,
    ) -> Result<SignedMessage, Error> {
        self.ensure_managed(validator_pubkey)?;
        let slot = block.slot();
        let signed = self
            .signing
            .sign(
                validator_pubkey,
                Domain::BeaconProposer,
                slot.epoch(self.spec.slots_per_epoch),
                block,
            )
            .await?;

        match self.slashing_protection.check_and_insert_block_proposal(
            validator_pubkey,
            slot,
            signed.signing_root,
        ) {
            Ok(Safe::Valid) => Ok(signed),
            Ok(Safe::SameData) => {
                debug!(self.log, "Block was previously signed"; "slot" => slot);
                Ok(signed)
            }
            Err(e) => Err(Error::Slashable(e)),
        }
    }

    /// Sign a voluntary exit. Exits are not subject to slashing protection.
    pub async fn sign_voluntary_exit(
        &self,
        validator_pubkey: &PublicKeyBytes,
        voluntary_exit: VoluntaryExit,
    ) -> Result<SignedVoluntaryExit, Error> {
        self.ensure_managed(validator_pubkey)?;
        let signed = self
            .signing
            .sign(
                validator_pubkey,
                Domain::VoluntaryExit,
                voluntary_exit.epoch,
                &voluntary_exit,
            )
            .await?;

        Ok(SignedVoluntaryExit {
            message: voluntary_exit,
            signature: signed.signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_attestation_data, test_pubkey, MockBeaconNode, MockSigner};
    use logging::test_logger;
    use tempfile::{tempdir, TempDir};
    use types::Slot;

    fn store() -> (TempDir, ValidatorStore<MockBeaconNode>) {
        let dir = tempdir().unwrap();
        let db = SlashingDatabase::create(&dir.path().join("db.sqlite")).unwrap();
        let spec = Arc::new(ChainSpec::minimal());
        let signing = SigningEngine::new(
            Arc::new(MockBeaconNode::default()),
            Arc::new(MockSigner::default()),
            spec.clone(),
        );
        let store = ValidatorStore::new(
            Arc::new(db),
            signing,
            vec![test_pubkey(0)],
            spec,
            test_logger(),
        )
        .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn keys_bootstrapped_on_construction() {
        let (_dir, store) = store();
        assert_eq!(store.slashing_protection().num_validator_rows().unwrap(), 1);
        assert!(store
            .slashing_protection()
            .attestation_history(&test_pubkey(0))
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn double_vote_refused() {
        let (_dir, store) = store();
        let pk = test_pubkey(0);
        let data = test_attestation_data(Slot::new(16), 0, Epoch::new(2));
        store.sign_attestation(&pk, &data).await.unwrap();
        // Re-signing the same data is allowed.
        store.sign_attestation(&pk, &data).await.unwrap();

        let mut conflicting = data.clone();
        conflicting.beacon_block_root = types::Hash256::repeat_byte(0xff);
        assert!(matches!(
            store.sign_attestation(&pk, &conflicting).await,
            Err(Error::Slashable(NotSafe::InvalidAttestation(_)))
        ));
    }

    #[tokio::test]
    async fn unknown_key_refused() {
        let (_dir, store) = store();
        assert_eq!(
            store.randao_reveal(&test_pubkey(9), Epoch::new(0)).await,
            Err(Error::UnknownPubkey(test_pubkey(9)))
        );
    }

    #[tokio::test]
    async fn voluntary_exit_signed() {
        let (_dir, store) = store();
        let exit = VoluntaryExit {
            epoch: Epoch::new(4),
            validator_index: 12,
        };
        let signed = store
            .sign_voluntary_exit(&test_pubkey(0), exit.clone())
            .await
            .unwrap();
        assert_eq!(signed.message, exit);
        assert!(!signed.signature.is_empty());
    }
}
