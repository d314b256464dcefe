//! Domain-separated signing of consensus messages.
//!
//! The engine is stateless: it knows nothing of slashing protection, and never retries.
use crate::beacon_node::{BeaconNode, BeaconNodeError};
use futures::future::BoxFuture;
use std::sync::Arc;
use types::{ChainSpec, Domain, Epoch, Hash256, PublicKeyBytes, SignatureBytes, SignedRoot};

#[derive(Debug, Clone, PartialEq)]
pub enum SignerError {
    /// The signer does not hold the secret for this public key.
    UnknownPubkey(PublicKeyBytes),
    Failed(String),
}

/// A capability to sign 32-byte signing roots with the secret behind some public key.
///
/// The signature scheme is opaque to the validator client.
pub trait Signer: Send + Sync {
    fn sign<'a>(
        &'a self,
        pubkey: &'a PublicKeyBytes,
        signing_root: Hash256,
    ) -> BoxFuture<'a, Result<SignatureBytes, SignerError>>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The beacon node returned no fork information for the requested epoch.
    DomainDataUnavailable,
    BeaconNode(BeaconNodeError),
    Signer(SignerError),
}

impl From<BeaconNodeError> for Error {
    fn from(e: BeaconNodeError) -> Self {
        Error::BeaconNode(e)
    }
}

impl From<SignerError> for Error {
    fn from(e: SignerError) -> Self {
        Error::Signer(e)
    }
}

/// A signature along with the root that was signed.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedMessage {
    pub signature: SignatureBytes,
    pub signing_root: Hash256,
}

pub struct SigningEngine<T> {
    beacon_node: Arc<T>,
    signer: Arc<dyn Signer>,
    spec: Arc<ChainSpec>,
}

impl<T> Clone for SigningEngine<T> {
    fn clone(&self) -> Self {
        Self {
            beacon_node: self.beacon_node.clone(),
            signer: self.signer.clone(),
            spec: self.spec.clone(),
        }
    }
}

impl<T: BeaconNode> SigningEngine<T> {
    pub fn new(beacon_node: Arc<T>, signer: Arc<dyn Signer>, spec: Arc<ChainSpec>) -> Self {
        Self {
            beacon_node,
            signer,
            spec,
        }
    }

    /// Compute the signing domain for `domain` at `epoch`, using fork data from the beacon node.
    pub async fn domain(&self, domain: Domain, epoch: Epoch) -> Result<Hash256, Error> {
        let fork_info = self
            .beacon_node
            .fork_info(epoch)
            .await?
            .ok_or(Error::DomainDataUnavailable)?;

        Ok(self.spec.get_domain(
            epoch,
            domain,
            &fork_info.fork,
            fork_info.genesis_validators_root,
        ))
    }

    /// Sign `message` with the key `pubkey` under `domain` at `epoch`.
    pub async fn sign<M: SignedRoot + Sync>(
        &self,
        pubkey: &PublicKeyBytes,
        domain: Domain,
        epoch: Epoch,
        message: &M,
    ) -> Result<SignedMessage, Error> {
        let domain = self.domain(domain, epoch).await?;
        let signing_root = message.signing_root(domain);
        let signature = self.signer.sign(pubkey, signing_root).await?;

        Ok(SignedMessage {
            signature,
            signing_root,
        })
    }
}
