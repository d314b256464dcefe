//! Graffiti selection for block proposals.
//!
//! A graffiti file is YAML of the form:
//!
//! ```yaml
//! default: "default graffiti"
//! random: ["one", "two"]
//! ordered: ["first", "second"]
//! specific:
//!   12: "graffiti for validator 12"
//! ```
use rand::seq::SliceRandom;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use slashing_protection::SlashingDatabase;
use slog::{error, warn, Logger};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use types::{Graffiti, GraffitiString, Hash256, PublicKeyBytes};

#[derive(Debug)]
pub enum GraffitiFileError {
    Io(io::Error),
    /// The file is not valid YAML, or a graffiti in it is longer than 32 bytes.
    InvalidFile(serde_yaml::Error),
}

impl From<io::Error> for GraffitiFileError {
    fn from(e: io::Error) -> Self {
        GraffitiFileError::Io(e)
    }
}

impl From<serde_yaml::Error> for GraffitiFileError {
    fn from(e: serde_yaml::Error) -> Self {
        GraffitiFileError::InvalidFile(e)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraffitiFile {
    #[serde(default)]
    pub default: Option<GraffitiString>,
    #[serde(default)]
    pub random: Vec<GraffitiString>,
    #[serde(default)]
    pub ordered: Vec<GraffitiString>,
    /// Graffiti for individual validators, keyed by validator index.
    #[serde(default)]
    pub specific: HashMap<u64, GraffitiString>,
}

/// A parsed graffiti file along with the hash of its raw contents.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedGraffitiFile {
    pub contents: GraffitiFile,
    pub file_hash: Hash256,
}

impl LoadedGraffitiFile {
    pub fn load(path: &Path) -> Result<Self, GraffitiFileError> {
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GraffitiFileError> {
        let contents = if bytes.iter().all(u8::is_ascii_whitespace) {
            GraffitiFile::default()
        } else {
            serde_yaml::from_slice(bytes)?
        };
        Ok(Self {
            contents,
            file_hash: Hash256::from_slice(&Sha256::digest(bytes)),
        })
    }
}

/// Chooses the graffiti for each block proposal.
///
/// In order of precedence:
///
/// 1. The file's `specific` entry for the validator index.
/// 2. The next unused `ordered` entry for the validator. Once every entry has been used, the
///    selection falls through to the `default`, never to `random`.
/// 3. A uniformly random `random` entry.
/// 4. The file's `default`.
/// 5. The graffiti given in the config.
/// 6. Empty graffiti.
///
/// The file is read on every selection so that edits take effect without a restart.
pub struct GraffitiSelector {
    graffiti_file: Option<PathBuf>,
    graffiti_flag: Option<Graffiti>,
    slashing_protection: Arc<SlashingDatabase>,
    log: Logger,
}

impl GraffitiSelector {
    /// Checks that the graffiti file, if any, can be loaded.
    pub fn new(
        graffiti_file: Option<PathBuf>,
        graffiti_flag: Option<Graffiti>,
        slashing_protection: Arc<SlashingDatabase>,
        log: Logger,
    ) -> Result<Self, String> {
        if let Some(path) = &graffiti_file {
            LoadedGraffitiFile::load(path)
                .map_err(|e| format!("Unable to load graffiti file {:?}: {:?}", path, e))?;
        }

        Ok(Self {
            graffiti_file,
            graffiti_flag,
            slashing_protection,
            log,
        })
    }

    fn fallback(&self) -> Graffiti {
        self.graffiti_flag.unwrap_or_default()
    }

    pub fn select(&self, pubkey: &PublicKeyBytes, validator_index: u64) -> Graffiti {
        let Some(path) = &self.graffiti_file else {
            return self.fallback();
        };

        match LoadedGraffitiFile::load(path) {
            Ok(file) => self.select_from_file(&file, pubkey, validator_index),
            Err(e) => {
                warn!(
                    self.log,
                    "Failed to read graffiti file";
                    "error" => ?e,
                    "path" => ?path,
                );
                self.fallback()
            }
        }
    }

    pub fn select_from_file(
        &self,
        file: &LoadedGraffitiFile,
        pubkey: &PublicKeyBytes,
        validator_index: u64,
    ) -> Graffiti {
        let contents = &file.contents;
        let default = || {
            contents
                .default
                .clone()
                .map(Graffiti::from)
                .unwrap_or_else(|| self.fallback())
        };

        if let Some(specific) = contents.specific.get(&validator_index) {
            return specific.clone().into();
        }

        if !contents.ordered.is_empty() {
            return match self.slashing_protection.next_graffiti_index(
                pubkey,
                file.file_hash,
                contents.ordered.len(),
            ) {
                Ok(Some(index)) => contents
                    .ordered
                    .get(index)
                    .cloned()
                    .map(Graffiti::from)
                    .unwrap_or_else(default),
                Ok(None) => default(),
                Err(e) => {
                    error!(
                        self.log,
                        "Unable to advance graffiti cursor";
                        "error" => ?e,
                        "validator" => pubkey,
                    );
                    default()
                }
            };
        }

        if let Some(random) = contents.random.choose(&mut rand::thread_rng()) {
            return random.clone().into();
        }

        default()
    }
}
