use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::{HeftError, Result};

/// A 32-byte object identifier: the SHA-256 of the object's content.
///
/// The oid is the dedup key for uploads and the name of the object in both
/// the local store and the remote store. On the wire it travels as its
/// 64-char lowercase hex form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Oid(pub [u8; 32]);

impl Oid {
    /// Hash a complete object body.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        Oid(out)
    }

    /// Parse a 64-char lowercase or uppercase hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        if s.len() != 64 {
            return Err(HeftError::InvalidOid(format!(
                "expected 64 hex chars, got {}",
                s.len()
            )));
        }
        let bytes =
            hex::decode(s).map_err(|_| HeftError::InvalidOid(format!("not hex: {s:?}")))?;
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(Oid(out))
    }

    /// Full 64-char lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Oid {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Oid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Oid::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
