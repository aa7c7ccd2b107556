//! Delegation consumer
//!
//! Extracts a received archive, verifies the delegation chain and installs
//! it into the agent's proof store. The space it grants becomes current.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use crate::capability::archive;
use crate::capability::provider::SHARED_SPACE_NAME;
use crate::capability::{CapabilityProvider, Did};
use crate::types::{GatewayError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct AppliedDelegation {
    pub space_did: Did,
    pub space_name: String,
}

/// Decode a base64 (standard alphabet) archive
pub fn decode_archive(encoded: &str) -> Result<Vec<u8>> {
    let encoded = encoded.trim();
    if encoded.is_empty() {
        return Err(GatewayError::Validation("delegation is required".to_string()));
    }
    STANDARD
        .decode(encoded)
        .map_err(|e| GatewayError::Validation(format!("delegation is not valid base64: {}", e)))
}

pub async fn apply_delegation(
    provider: &Arc<dyn CapabilityProvider>,
    archive_bytes: &[u8],
) -> Result<AppliedDelegation> {
    let extracted = archive::extract(archive_bytes)?;
    extracted
        .delegation
        .verify_chain(&extracted.proofs, Utc::now().timestamp())?;

    let agent = provider.agent_did();
    if extracted.delegation.payload.audience != agent {
        warn!(
            audience = %extracted.delegation.payload.audience,
            agent = %agent,
            "Delegation audience is not this agent, installing anyway"
        );
    }

    let space = provider.add_proof(&extracted).await?;
    provider.set_current_space(&space.did).await?;

    let space_name = provider
        .space_name(&space.did)
        .await
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| SHARED_SPACE_NAME.to_string());

    info!(space = %space.did, delegation = %extracted.id, "Applied delegation");

    Ok(AppliedDelegation {
        space_did: space.did,
        space_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_archive() {
        assert_eq!(decode_archive(" AQID ").unwrap(), vec![1, 2, 3]);
        assert!(decode_archive("").is_err());
        assert!(matches!(
            decode_archive("not base64!"),
            Err(GatewayError::Validation(_))
        ));
    }
}
