//! Per-request session context
//!
//! A `Session` pairs the provider with the caller's email. Opening one logs
//! in only when the account has no session yet; every space lookup then
//! re-enumerates the account's spaces and matches the DID exactly.

use std::sync::Arc;
use tracing::debug;

use crate::capability::{CapabilityProvider, SpaceInfo};
use crate::types::{GatewayError, Result};

/// Reject emails that can't possibly identify an account
pub fn validate_email(email: &str) -> Result<&str> {
    let email = email.trim();
    if email.is_empty() {
        return Err(GatewayError::Validation("email is required".to_string()));
    }
    if !email.contains('@') {
        return Err(GatewayError::Validation(format!("Invalid email: {}", email)));
    }
    Ok(email)
}

pub struct Session {
    provider: Arc<dyn CapabilityProvider>,
    email: String,
}

impl Session {
    /// Authenticate `email`, reusing an existing account session
    pub async fn open(provider: Arc<dyn CapabilityProvider>, email: &str) -> Result<Self> {
        let email = validate_email(email)?.to_string();
        if !provider.has_session(&email).await {
            debug!(email = %email, "No account session, logging in");
            provider.login(&email).await?;
        }
        Ok(Self { provider, email })
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn provider(&self) -> &Arc<dyn CapabilityProvider> {
        &self.provider
    }

    pub async fn spaces(&self) -> Result<Vec<SpaceInfo>> {
        self.provider.spaces(&self.email).await
    }

    /// Linear scan for an exact DID match
    pub async fn find_space(&self, did: &str) -> Result<SpaceInfo> {
        self.spaces()
            .await?
            .into_iter()
            .find(|space| space.did.as_str() == did)
            .ok_or_else(|| GatewayError::space_not_found(did))
    }

    pub async fn find_space_by_name(&self, name: &str) -> Result<SpaceInfo> {
        self.spaces()
            .await?
            .into_iter()
            .find(|space| space.name == name)
            .ok_or_else(|| GatewayError::NotFound(format!("Space named {} not found", name)))
    }

    /// Resolve `did` and make it the current space
    pub async fn use_space(&self, did: &str) -> Result<SpaceInfo> {
        let space = self.find_space(did).await?;
        self.provider.set_current_space(&space.did).await?;
        Ok(space)
    }
}
