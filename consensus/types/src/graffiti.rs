use crate::Hash256;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tree_hash::{PackedEncoding, TreeHash, TreeHashType};

pub const GRAFFITI_BYTES_LEN: usize = 32;

/// The 32-byte `graffiti` field on a beacon block.
#[derive(Default, Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Graffiti(#[serde(with = "serde_graffiti")] pub [u8; GRAFFITI_BYTES_LEN]);

impl Graffiti {
    /// Build graffiti from a UTF-8 string, silently dropping bytes past the 32nd.
    pub fn from_str_truncated(s: &str) -> Self {
        let mut graffiti = [0; GRAFFITI_BYTES_LEN];
        let len = std::cmp::min(s.len(), GRAFFITI_BYTES_LEN);
        graffiti[..len].copy_from_slice(&s.as_bytes()[..len]);
        Graffiti(graffiti)
    }

    /// The graffiti as text, without its trailing zero padding.
    pub fn as_utf8_lossy(&self) -> String {
        let end = self.0.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
        String::from_utf8_lossy(&self.0[..end]).to_string()
    }
}

impl fmt::Display for Graffiti {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_utf8_lossy())
    }
}

impl From<[u8; GRAFFITI_BYTES_LEN]> for Graffiti {
    fn from(bytes: [u8; GRAFFITI_BYTES_LEN]) -> Self {
        Self(bytes)
    }
}

impl From<Graffiti> for [u8; GRAFFITI_BYTES_LEN] {
    fn from(graffiti: Graffiti) -> Self {
        graffiti.0
    }
}

/// A string that is guaranteed to fit into a `Graffiti` without truncation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GraffitiString(String);

impl FromStr for GraffitiString {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() > GRAFFITI_BYTES_LEN {
            return Err(format!(
                "Graffiti exceeds max length {}",
                GRAFFITI_BYTES_LEN
            ));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for GraffitiString {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<GraffitiString> for String {
    fn from(graffiti: GraffitiString) -> String {
        graffiti.0
    }
}

impl From<GraffitiString> for Graffiti {
    fn from(graffiti: GraffitiString) -> Self {
        Graffiti::from_str_truncated(&graffiti.0)
    }
}

impl AsRef<str> for GraffitiString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub mod serde_graffiti {
    use super::GRAFFITI_BYTES_LEN;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; GRAFFITI_BYTES_LEN], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; GRAFFITI_BYTES_LEN], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(&s))
            .map_err(|e| D::Error::custom(format!("invalid hex: {:?}", e)))?;

        <[u8; GRAFFITI_BYTES_LEN]>::try_from(bytes.as_slice()).map_err(|_| {
            D::Error::custom(format!(
                "graffiti must be {} bytes, got {}",
                GRAFFITI_BYTES_LEN,
                bytes.len()
            ))
        })
    }
}

impl TreeHash for Graffiti {
    fn tree_hash_type() -> TreeHashType {
        Hash256::tree_hash_type()
    }

    fn tree_hash_packed_encoding(&self) -> PackedEncoding {
        Hash256::from(self.0).tree_hash_packed_encoding()
    }

    fn tree_hash_packing_factor() -> usize {
        Hash256::tree_hash_packing_factor()
    }

    fn tree_hash_root(&self) -> tree_hash::Hash256 {
        Hash256::from(self.0)
    }
}
