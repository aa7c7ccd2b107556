//! Content verification
//!
//! Answers "is this CID really stored?" in order of how much we trust the
//! answer: the space's upload record, then the local block store, then a
//! gateway HEAD.

use cid::Cid;
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

use super::probe::GatewayProbe;
use crate::capability::CapabilityProvider;
use crate::types::{GatewayError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifySource {
    Space,
    Local,
    Gateway,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    pub verified: bool,
    pub source: VerifySource,
    pub cid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

pub fn parse_cid(raw: &str) -> Result<Cid> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(GatewayError::Validation("cid is required".to_string()));
    }
    Cid::from_str(raw).map_err(|e| GatewayError::Validation(format!("Invalid CID {}: {}", raw, e)))
}

pub async fn verify(
    provider: &Arc<dyn CapabilityProvider>,
    probe: &GatewayProbe,
    gateway_base: &str,
    cid: &str,
    filename: Option<&str>,
    space_did: Option<&str>,
) -> Result<Verification> {
    let cid = parse_cid(cid)?;

    if let Some(space_did) = space_did.map(str::trim).filter(|s| !s.is_empty()) {
        let space = provider
            .agent_spaces()
            .await
            .into_iter()
            .find(|s| s.did.as_str() == space_did)
            .ok_or_else(|| GatewayError::space_not_found(space_did))?;
        return Ok(Verification {
            verified: provider.has_upload(&space.did, &cid).await?,
            source: VerifySource::Space,
            cid: cid.to_string(),
            url: None,
        });
    }

    if provider.has_content(&cid).await {
        return Ok(Verification {
            verified: true,
            source: VerifySource::Local,
            cid: cid.to_string(),
            url: None,
        });
    }

    let mut url = format!("{}/ipfs/{}", gateway_base.trim_end_matches('/'), cid);
    if let Some(name) = filename.map(str::trim).filter(|s| !s.is_empty()) {
        url.push('/');
        url.push_str(&urlencoding::encode(name));
    }

    let verified = match url::Url::parse(&url) {
        Ok(target) => match probe.head(&target).await {
            Ok(result) => result.exists,
            Err(e) => {
                warn!(cid = %cid, error = %e, "Gateway verification failed");
                false
            }
        },
        Err(e) => {
            warn!(url = %url, error = %e, "Gateway URL is invalid");
            false
        }
    };

    Ok(Verification {
        verified,
        source: VerifySource::Gateway,
        cid: cid.to_string(),
        url: Some(url),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cid() {
        let cid = crate::capability::content_id(crate::capability::RAW, b"hello world");
        assert_eq!(parse_cid(&format!(" {} ", cid)).unwrap(), cid);
        assert!(matches!(parse_cid("nope"), Err(GatewayError::Validation(_))));
        assert!(matches!(parse_cid("  "), Err(GatewayError::Validation(_))));
    }
}
