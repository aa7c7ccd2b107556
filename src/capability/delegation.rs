//! Signed, time-bounded, capability-scoped delegations
//!
//! A delegation lets `audience` act on `subject` (a space) within `abilities`
//! until `expiration`. The payload is DAG-CBOR encoded and signed with the
//! issuer's ed25519 key; the delegation's id is the CIDv1 of the encoded
//! envelope.
//!
//! Authority chains are one hop deep:
//!
//! ```text
//! space key --(owner proof: all abilities)--> agent --(delegation)--> audience
//! ```

use cid::Cid;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;
use std::collections::BTreeMap;

use super::ability::{self, Ability};
use super::did::Did;
use super::{content_id, DAG_CBOR};
use crate::types::GatewayError;

/// Meta key carrying the human name of the space
pub const META_SPACE_NAME: &str = "name";

/// The signed part of a delegation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegationPayload {
    pub issuer: Did,
    pub audience: Did,
    /// Space the abilities apply to
    pub subject: Did,
    pub abilities: Vec<Ability>,
    /// Unix seconds; `None` never expires
    pub expiration: Option<i64>,
    pub nonce: String,
    /// CIDs of the delegations proving the issuer's authority
    #[serde(default)]
    pub proofs: Vec<String>,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

impl DelegationPayload {
    /// Build a payload with a fresh random nonce
    pub fn new(
        issuer: Did,
        audience: Did,
        subject: Did,
        abilities: Vec<Ability>,
        expiration: Option<i64>,
    ) -> Self {
        Self {
            issuer,
            audience,
            subject,
            abilities,
            expiration,
            nonce: hex::encode(rand::random::<[u8; 12]>()),
            proofs: Vec::new(),
            meta: BTreeMap::new(),
        }
    }

    pub fn with_proof(mut self, proof: &Cid) -> Self {
        self.proofs.push(proof.to_string());
        self
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<String>) -> Self {
        self.meta.insert(key.to_string(), value.into());
        self
    }
}

/// A payload plus the issuer's signature over its DAG-CBOR encoding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delegation {
    pub payload: DelegationPayload,
    pub signature: ByteBuf,
}

/// Delegation errors
#[derive(Debug, thiserror::Error)]
pub enum DelegationError {
    #[error("Failed to encode delegation: {0}")]
    Encode(String),

    #[error("Malformed delegation: {0}")]
    Decode(String),

    #[error("Signing key does not belong to issuer {0}")]
    IssuerMismatch(Did),

    #[error("Invalid delegation signature from {0}")]
    BadSignature(Did),

    #[error("Delegation expired at {0}")]
    Expired(i64),

    #[error("Delegation chain invalid: {0}")]
    Chain(String),
}

impl From<DelegationError> for GatewayError {
    fn from(err: DelegationError) -> Self {
        match err {
            DelegationError::Encode(_) | DelegationError::IssuerMismatch(_) => {
                GatewayError::Internal(err.to_string())
            }
            _ => GatewayError::Validation(err.to_string()),
        }
    }
}

impl Delegation {
    /// Sign `payload` with the issuer's key
    pub fn sign(payload: DelegationPayload, key: &SigningKey) -> Result<Self, DelegationError> {
        if Did::from_verifying_key(&key.verifying_key()) != payload.issuer {
            return Err(DelegationError::IssuerMismatch(payload.issuer));
        }
        let bytes = encode_payload(&payload)?;
        let signature = key.sign(&bytes);
        Ok(Self {
            payload,
            signature: ByteBuf::from(signature.to_bytes().to_vec()),
        })
    }

    /// Check the signature against the key embedded in the issuer DID
    pub fn verify_signature(&self) -> Result<(), DelegationError> {
        let issuer = &self.payload.issuer;
        let key = issuer
            .verifying_key()
            .map_err(|e| DelegationError::Decode(e.to_string()))?;
        let signature = Signature::from_slice(&self.signature)
            .map_err(|_| DelegationError::BadSignature(issuer.clone()))?;
        let bytes = encode_payload(&self.payload)?;
        key.verify(&bytes, &signature)
            .map_err(|_| DelegationError::BadSignature(issuer.clone()))
    }

    pub fn encode(&self) -> Result<Vec<u8>, DelegationError> {
        serde_ipld_dagcbor::to_vec(self).map_err(|e| DelegationError::Encode(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DelegationError> {
        serde_ipld_dagcbor::from_slice(bytes).map_err(|e| DelegationError::Decode(e.to_string()))
    }

    /// Content address of the encoded delegation
    pub fn cid(&self) -> Result<Cid, DelegationError> {
        Ok(content_id(DAG_CBOR, &self.encode()?))
    }

    pub fn is_expired(&self, now: i64) -> bool {
        matches!(self.payload.expiration, Some(exp) if exp <= now)
    }

    /// Human name of the subject space, if the delegation carries one
    pub fn space_name(&self) -> Option<&str> {
        self.payload.meta.get(META_SPACE_NAME).map(String::as_str)
    }

    /// Verify this delegation and its authority chain.
    ///
    /// `proofs` are the delegations referenced from `payload.proofs`. A
    /// delegation issued by its own subject (the space key) needs no proof.
    /// Otherwise some proof must have been issued by the subject to this
    /// delegation's issuer, cover its abilities, and outlive it.
    pub fn verify_chain(&self, proofs: &[Delegation], now: i64) -> Result<(), DelegationError> {
        self.verify_signature()?;
        if let Some(exp) = self.payload.expiration.filter(|_| self.is_expired(now)) {
            return Err(DelegationError::Expired(exp));
        }

        if self.payload.issuer == self.payload.subject {
            return Ok(());
        }

        let mut last_reason = format!(
            "no proof grants {} authority over {}",
            self.payload.issuer, self.payload.subject
        );

        for proof in proofs {
            match self.check_proof(proof, now) {
                Ok(()) => return Ok(()),
                Err(reason) => last_reason = reason,
            }
        }

        Err(DelegationError::Chain(last_reason))
    }

    fn check_proof(&self, proof: &Delegation, now: i64) -> Result<(), String> {
        let p = &proof.payload;
        if p.subject != self.payload.subject {
            return Err(format!("proof subject {} does not match {}", p.subject, self.payload.subject));
        }
        if p.issuer != p.subject {
            return Err(format!("proof issuer {} is not the space", p.issuer));
        }
        if p.audience != self.payload.issuer {
            return Err(format!("proof audience {} is not issuer {}", p.audience, self.payload.issuer));
        }
        if !ability::covers(&p.abilities, &self.payload.abilities) {
            return Err("proof does not cover requested abilities".to_string());
        }
        match (p.expiration, self.payload.expiration) {
            (Some(_), None) => return Err("proof expires before delegation".to_string()),
            (Some(pe), Some(de)) if pe < de => {
                return Err("proof expires before delegation".to_string())
            }
            _ => {}
        }
        if proof.is_expired(now) {
            return Err("proof expired".to_string());
        }
        proof.verify_signature().map_err(|e| e.to_string())
    }
}

fn encode_payload(payload: &DelegationPayload) -> Result<Vec<u8>, DelegationError> {
    serde_ipld_dagcbor::to_vec(payload).map_err(|e| DelegationError::Encode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn keypair() -> (SigningKey, Did) {
        let key = SigningKey::generate(&mut OsRng);
        let did = Did::from_verifying_key(&key.verifying_key());
        (key, did)
    }

    /// space -> agent -> audience
    fn chain(expiration: Option<i64>) -> (Delegation, Delegation) {
        let (space_key, space) = keypair();
        let (agent_key, agent) = keypair();
        let (_, audience) = keypair();

        let owner = Delegation::sign(
            DelegationPayload::new(space.clone(), agent.clone(), space.clone(), Ability::ALL.to_vec(), None)
                .with_meta(META_SPACE_NAME, "tour-photos"),
            &space_key,
        )
        .unwrap();

        let issued = Delegation::sign(
            DelegationPayload::new(agent, audience, space, vec![Ability::UploadAdd], expiration)
                .with_proof(&owner.cid().unwrap()),
            &agent_key,
        )
        .unwrap();

        (issued, owner)
    }

    #[test]
    fn test_sign_and_verify() {
        let (issued, owner) = chain(Some(2_000_000_000));
        issued.verify_chain(&[owner], 1_700_000_000).unwrap();
    }

    #[test]
    fn test_encode_decode_keeps_cid() {
        let (issued, _) = chain(Some(2_000_000_000));
        let bytes = issued.encode().unwrap();
        let decoded = Delegation::decode(&bytes).unwrap();
        assert_eq!(decoded, issued);
        assert_eq!(decoded.cid().unwrap(), issued.cid().unwrap());
        assert_eq!(issued.cid().unwrap().codec(), DAG_CBOR);
    }

    #[test]
    fn test_tampered_payload_fails() {
        let (mut issued, owner) = chain(Some(2_000_000_000));
        issued.payload.abilities.push(Ability::UploadRemove);
        assert!(matches!(
            issued.verify_chain(&[owner], 1_700_000_000),
            Err(DelegationError::BadSignature(_))
        ));
    }

    #[test]
    fn test_expired() {
        let (issued, owner) = chain(Some(1_000));
        assert!(matches!(
            issued.verify_chain(&[owner], 1_000),
            Err(DelegationError::Expired(1_000))
        ));
    }

    #[test]
    fn test_missing_proof() {
        let (issued, _) = chain(Some(2_000_000_000));
        assert!(matches!(
            issued.verify_chain(&[], 1_700_000_000),
            Err(DelegationError::Chain(_))
        ));
    }

    #[test]
    fn test_wrong_signer() {
        let (key, _) = keypair();
        let (_, other) = keypair();
        let payload = DelegationPayload::new(other.clone(), other.clone(), other, vec![Ability::SpaceInfo], None);
        assert!(matches!(
            Delegation::sign(payload, &key),
            Err(DelegationError::IssuerMismatch(_))
        ));
    }

    #[test]
    fn test_space_name() {
        let (_, owner) = chain(None);
        assert_eq!(owner.space_name(), Some("tour-photos"));
    }
}
