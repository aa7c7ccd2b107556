//! The capability provider seam
//!
//! Everything the service needs from the identity/storage network goes
//! through this one trait: agent identity, account login, space registry,
//! signing, proof installation and directory uploads. Implementations are
//! chosen once when `AppState` is built; handlers never probe for optional
//! methods at runtime.

use async_trait::async_trait;
use bytes::Bytes;
use cid::Cid;
use serde::Serialize;

use super::ability::Ability;
use super::archive::Extracted;
use super::delegation::Delegation;
use super::did::Did;
use crate::types::Result;

/// Display name for a space whose delegation carries no name
pub const SHARED_SPACE_NAME: &str = "Shared Space";

/// A named storage namespace visible to the agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpaceInfo {
    pub did: Did,
    pub name: String,
    /// Owning account email; `None` when reached through a received delegation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Registered with the owning account; always false for shared spaces
    pub provisioned: bool,
}

/// A signed delegation plus the proofs needed to verify it
#[derive(Debug, Clone)]
pub struct SignedGrant {
    pub delegation: Delegation,
    pub proofs: Vec<Delegation>,
}

/// A delegation packed for transport
#[derive(Debug, Clone)]
pub struct IssuedDelegation {
    /// CID of the root delegation
    pub id: Cid,
    pub archive: Vec<u8>,
    /// Unix seconds
    pub expiration: i64,
}

/// One named blob in a directory upload
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    /// DID of the local agent
    fn agent_did(&self) -> Did;

    /// Authenticate an email. Idempotent: an existing session is reused.
    async fn login(&self, email: &str) -> Result<()>;

    /// Whether `email` already has an account session
    async fn has_session(&self, email: &str) -> bool;

    /// Whether any account session exists
    async fn is_logged_in(&self) -> bool;

    /// Spaces reachable for `email`, in registry listing order
    async fn spaces(&self, email: &str) -> Result<Vec<SpaceInfo>>;

    /// Every space the agent can act on, regardless of account
    async fn agent_spaces(&self) -> Vec<SpaceInfo>;

    /// Create a space owned by `email`'s account
    async fn create_space(&self, email: &str, name: &str) -> Result<SpaceInfo>;

    /// Register a freshly created space with the account
    async fn provision_space(&self, email: &str, space: &Did) -> Result<()>;

    async fn set_current_space(&self, space: &Did) -> Result<()>;

    async fn current_space(&self) -> Option<Did>;

    /// Display name for a space, if one is known
    async fn space_name(&self, space: &Did) -> Option<String>;

    /// Sign a delegation from the agent to `audience` on `space`
    async fn delegate(
        &self,
        space: &Did,
        audience: &Did,
        abilities: &[Ability],
        expiration: i64,
    ) -> Result<SignedGrant>;

    /// Install a verified delegation into the agent's proof store.
    /// Adds to the agent's authority; never replaces existing proofs.
    async fn add_proof(&self, extracted: &Extracted) -> Result<SpaceInfo>;

    /// Store `files` as one directory and return the root CID
    async fn upload_directory(&self, space: &Did, files: Vec<UploadFile>) -> Result<Cid>;

    /// Whether `root` was uploaded to `space`
    async fn has_upload(&self, space: &Did, root: &Cid) -> Result<bool>;

    /// Whether any block with this CID is held locally
    async fn has_content(&self, cid: &Cid) -> bool;
}
