use serde::{Deserialize, Serialize};
use slashing_protection::SLASHING_PROTECTION_FILENAME;
use std::fs::File;
use std::path::{Path, PathBuf};
use types::{Graffiti, GraffitiString};

/// Stores the core configuration for this validator instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The SQLite database holding the slashing protection history.
    pub slashing_protection_db_path: PathBuf,
    /// Graffiti used when no graffiti file supplies one.
    pub graffiti: Option<GraffitiString>,
    /// Graffiti file reloaded on every proposal.
    pub graffiti_file: Option<PathBuf>,
    /// Request blinded blocks from the beacon node.
    pub builder_proposals: bool,
    /// Attest as soon as a valid block for the slot is seen, rather than always waiting until
    /// one third of the slot.
    pub attest_on_valid_block: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            slashing_protection_db_path: PathBuf::from(SLASHING_PROTECTION_FILENAME),
            graffiti: None,
            graffiti_file: None,
            builder_proposals: false,
            attest_on_valid_block: true,
        }
    }
}

impl Config {
    /// Load a config from a YAML file. Missing fields take their default values.
    pub fn from_yaml(path: &Path) -> Result<Self, String> {
        let file =
            File::open(path).map_err(|e| format!("Unable to open config {:?}: {}", path, e))?;
        serde_yaml::from_reader(file).map_err(|e| format!("Unable to parse config {:?}: {}", path, e))
    }

    pub fn graffiti_flag(&self) -> Option<Graffiti> {
        self.graffiti.clone().map(Graffiti::from)
    }
}
