//! Delegation issuer
//!
//! Validates the request, resolves the space for the caller's account and
//! asks the provider to sign a delegation for the audience. The signed
//! delegation and its proofs are packed into one archive; nothing is stored
//! locally.

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::capability::ability::parse_abilities;
use crate::capability::archive;
use crate::capability::{CapabilityProvider, Did, IssuedDelegation};
use crate::session::Session;
use crate::types::{GatewayError, Result};

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Body of `POST /api/delegation/create`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegationRequest {
    #[serde(default)]
    pub space_did: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub audience_did: String,
    /// Kept as raw JSON so non-string entries can be reported as invalid
    #[serde(default)]
    pub abilities: Option<Value>,
    #[serde(default)]
    pub expiration_hours: Option<f64>,
}

fn require<'a>(value: &'a str, field: &str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(GatewayError::Validation(format!("{} is required", field)));
    }
    Ok(value)
}

/// Turn the raw `abilities` value into strings, rendering non-strings as JSON
fn ability_strings(abilities: Option<&Value>) -> Result<Vec<String>> {
    match abilities {
        Some(Value::Array(items)) => Ok(items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect()),
        _ => Err(GatewayError::Validation(
            "abilities must be a non-empty array".to_string(),
        )),
    }
}

/// Unix expiry `hours` from `now`
pub fn expiration_from(now: i64, hours: f64) -> Result<i64> {
    if !hours.is_finite() || hours <= 0.0 {
        return Err(GatewayError::Validation(format!(
            "expirationHours must be a positive number, got {}",
            hours
        )));
    }
    let seconds = (hours * SECONDS_PER_HOUR).round();
    let expiration = if seconds < i64::MAX as f64 {
        now.checked_add(seconds as i64)
    } else {
        None
    };
    expiration.ok_or_else(|| {
        GatewayError::Validation(format!("expirationHours {} is out of range", hours))
    })
}

/// Issue a delegation on `spaceDid` to `audienceDid`
pub async fn issue_delegation(
    provider: Arc<dyn CapabilityProvider>,
    request: &DelegationRequest,
    default_hours: u32,
) -> Result<IssuedDelegation> {
    let space_did = require(&request.space_did, "spaceDid")?;
    let email = require(&request.email, "email")?;
    let audience = require(&request.audience_did, "audienceDid")?;
    let abilities = parse_abilities(&ability_strings(request.abilities.as_ref())?)?;
    let hours = request.expiration_hours.unwrap_or(f64::from(default_hours));
    // Reject bad lifetimes before touching the provider
    let expiration = expiration_from(Utc::now().timestamp(), hours)?;

    let session = Session::open(provider, email).await?;
    let space = session.use_space(space_did).await?;

    let audience: Did = audience.parse()?;
    let grant = session
        .provider()
        .delegate(&space.did, &audience, &abilities, expiration)
        .await?;
    let (id, archive) = archive::pack(&grant.delegation, &grant.proofs)?;

    info!(
        space = %space.did,
        audience = %audience,
        delegation = %id,
        abilities = abilities.len(),
        expiration,
        "Issued delegation"
    );

    Ok(IssuedDelegation {
        id,
        archive,
        expiration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_expiration_arithmetic() {
        assert_eq!(expiration_from(1_000, 24.0).unwrap(), 1_000 + 86_400);
        assert_eq!(expiration_from(0, 0.5).unwrap(), 1_800);
        assert!(expiration_from(0, 0.0).is_err());
        assert!(expiration_from(0, -3.0).is_err());
        assert!(expiration_from(0, f64::NAN).is_err());
    }

    #[test]
    fn test_expiration_out_of_range() {
        assert!(matches!(
            expiration_from(1_760_000_000, 1e300),
            Err(GatewayError::Validation(_))
        ));
        assert!(expiration_from(i64::MAX - 60, 1.0).is_err());
        assert!(expiration_from(0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_ability_strings() {
        let value = json!(["upload/add", 7, null]);
        assert_eq!(
            ability_strings(Some(&value)).unwrap(),
            vec!["upload/add".to_string(), "7".to_string(), "null".to_string()]
        );
        assert!(ability_strings(Some(&json!("upload/add"))).is_err());
        assert!(ability_strings(None).is_err());
    }

    #[test]
    fn test_request_deserializes_camel_case() {
        let request: DelegationRequest = serde_json::from_value(json!({
            "spaceDid": "did:key:zSpace",
            "email": "a@b.example",
            "audienceDid": "did:key:zAud",
            "abilities": ["space/info"],
            "expirationHours": 2
        }))
        .unwrap();
        assert_eq!(request.space_did, "did:key:zSpace");
        assert_eq!(request.expiration_hours, Some(2.0));
    }
}
