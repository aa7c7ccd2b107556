//! Agent identity - the ed25519 keypair the service acts as
//!
//! The key is persisted as 32 raw bytes so the agent DID stays stable across
//! restarts. Delegations handed out to band members name this DID as issuer.

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use std::path::Path;
use tracing::info;
use zeroize::Zeroizing;

use crate::capability::did::Did;
use crate::capability::delegation::{Delegation, DelegationError, DelegationPayload};
use crate::types::{GatewayError, Result};

/// Ed25519 private key length (32 bytes)
pub const PRIVATE_KEY_LEN: usize = 32;

pub struct Agent {
    signing_key: SigningKey,
    did: Did,
}

impl Agent {
    /// Create an agent with a fresh keypair
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut OsRng))
    }

    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        let did = Did::from_verifying_key(&signing_key.verifying_key());
        Self { signing_key, did }
    }

    /// Load the agent key from a file (or generate and save if missing)
    pub fn load_or_generate(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let agent = Self::generate();
            agent.save(path)?;
            info!(did = %agent.did, path = %path.display(), "Generated new agent key");
            Ok(agent)
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = Zeroizing::new(std::fs::read(path)?);
        let key: &[u8; PRIVATE_KEY_LEN] = bytes.as_slice().try_into().map_err(|_| {
            GatewayError::Config(format!(
                "Agent key at {} must be {} bytes, found {}",
                path.display(),
                PRIVATE_KEY_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self::from_signing_key(SigningKey::from_bytes(key)))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = Zeroizing::new(self.signing_key.to_bytes());
        std::fs::write(path, bytes.as_slice())?;
        Ok(())
    }

    pub fn did(&self) -> &Did {
        &self.did
    }

    /// Sign a payload issued by this agent
    pub fn sign(&self, payload: DelegationPayload) -> std::result::Result<Delegation, DelegationError> {
        Delegation::sign(payload, &self.signing_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_or_generate_is_stable() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("keys").join("agent.key");

        let first = Agent::load_or_generate(&path).unwrap();
        let second = Agent::load_or_generate(&path).unwrap();

        assert_eq!(first.did(), second.did());
        assert_eq!(std::fs::read(&path).unwrap().len(), PRIVATE_KEY_LEN);
    }

    #[test]
    fn test_rejects_truncated_key() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("agent.key");
        std::fs::write(&path, [7u8; 16]).unwrap();

        assert!(matches!(Agent::load(&path), Err(GatewayError::Config(_))));
    }
}
