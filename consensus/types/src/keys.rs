//! Opaque public key and signature byte buffers.
//!
//! The signature scheme is not known to this crate. Keys and signatures are carried as
//! length-prefixed byte buffers bounded by the largest sizes the scheme may produce, rather
//! than fixed-width arrays.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tree_hash::{mix_in_length, merkle_root, PackedEncoding, TreeHash, TreeHashType, BYTES_PER_CHUNK};

/// Largest public key supported by the signing scheme (ML-DSA-87).
pub const MAX_PUBLIC_KEY_LEN: usize = 2592;

/// Largest signature supported by the signing scheme (ML-DSA-87).
pub const MAX_SIGNATURE_LEN: usize = 4627;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    InvalidByteLength { got: usize, max: usize },
    Empty,
    InvalidHex,
}

macro_rules! bytes_struct {
    ($name: ident, $max: ident, $doc: expr) => {
        #[doc = $doc]
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(Vec<u8>);

        impl $name {
            pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
                if bytes.is_empty() {
                    Err(Error::Empty)
                } else if bytes.len() > $max {
                    Err(Error::InvalidByteLength {
                        got: bytes.len(),
                        max: $max,
                    })
                } else {
                    Ok(Self(bytes.to_vec()))
                }
            }

            pub fn serialize(&self) -> &[u8] {
                &self.0
            }

            pub fn len(&self) -> usize {
                self.0.len()
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            pub fn as_hex_string(&self) -> String {
                format!("0x{}", hex::encode(&self.0))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}", self.as_hex_string())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}", self.as_hex_string())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let stripped = s.strip_prefix("0x").unwrap_or(s);
                let bytes = hex::decode(stripped).map_err(|_| Error::InvalidHex)?;
                Self::deserialize(&bytes)
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse().map_err(|e| format!("{:?}", e))
            }
        }

        impl From<$name> for String {
            fn from(bytes: $name) -> String {
                bytes.as_hex_string()
            }
        }

        impl slog::Value for $name {
            fn serialize(
                &self,
                record: &slog::Record,
                key: slog::Key,
                serializer: &mut dyn slog::Serializer,
            ) -> slog::Result {
                slog::Value::serialize(&self.as_hex_string(), record, key, serializer)
            }
        }

        /// Hashed as an SSZ `List[byte, N]`.
        impl TreeHash for $name {
            fn tree_hash_type() -> TreeHashType {
                TreeHashType::List
            }

            fn tree_hash_packed_encoding(&self) -> PackedEncoding {
                unreachable!("List should never be packed.")
            }

            fn tree_hash_packing_factor() -> usize {
                unreachable!("List should never be packed.")
            }

            fn tree_hash_root(&self) -> tree_hash::Hash256 {
                let leaves = $max.div_ceil(BYTES_PER_CHUNK);
                mix_in_length(&merkle_root(&self.0, leaves), self.0.len())
            }
        }
    };
}

bytes_struct!(
    PublicKeyBytes,
    MAX_PUBLIC_KEY_LEN,
    "The serialized public key identifying a validator."
);
bytes_struct!(
    SignatureBytes,
    MAX_SIGNATURE_LEN,
    "A serialized signature, of whatever length the signing scheme produced."
);
