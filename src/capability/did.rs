//! `did:key` identifiers for ed25519 principals
//!
//! Format: `did:key:z` + base58btc(multicodec `0xed 0x01` || 32-byte public key)

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::types::GatewayError;

const DID_KEY_PREFIX: &str = "did:key:z";

/// Multicodec varint for ed25519-pub
const ED25519_MULTICODEC: [u8; 2] = [0xed, 0x01];

/// A parsed and validated `did:key` DID
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Did(String);

impl Did {
    /// Derive the DID for an ed25519 public key
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let mut raw = Vec::with_capacity(34);
        raw.extend_from_slice(&ED25519_MULTICODEC);
        raw.extend_from_slice(key.as_bytes());
        Did(format!("{}{}", DID_KEY_PREFIX, bs58::encode(raw).into_string()))
    }

    /// Decode the public key embedded in this DID
    pub fn verifying_key(&self) -> Result<VerifyingKey, DidError> {
        decode_key(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn decode_key(did: &str) -> Result<VerifyingKey, DidError> {
    let encoded = did
        .strip_prefix(DID_KEY_PREFIX)
        .ok_or_else(|| DidError::UnsupportedMethod(did.to_string()))?;

    let raw = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| DidError::Encoding(e.to_string()))?;

    if raw.len() != 34 || raw[..2] != ED25519_MULTICODEC {
        return Err(DidError::UnsupportedKey);
    }

    let mut key = [0u8; 32];
    key.copy_from_slice(&raw[2..]);
    VerifyingKey::from_bytes(&key).map_err(|e| DidError::Encoding(e.to_string()))
}

/// DID parsing errors
#[derive(Debug, thiserror::Error)]
pub enum DidError {
    #[error("Unsupported DID (expected did:key:z...): {0}")]
    UnsupportedMethod(String),

    #[error("Invalid did:key encoding: {0}")]
    Encoding(String),

    #[error("did:key is not an ed25519 public key")]
    UnsupportedKey,
}

impl From<DidError> for GatewayError {
    fn from(err: DidError) -> Self {
        GatewayError::Validation(err.to_string())
    }
}

impl FromStr for Did {
    type Err = DidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        decode_key(trimmed)?;
        Ok(Did(trimmed.to_string()))
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Did {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Did {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
