//! Self-contained capability provider
//!
//! Implements [`CapabilityProvider`] on a local agent key, the registry and
//! the blob store. Space keys exist only long enough to sign the owner proof
//! that hands the agent full authority over the new space.

use async_trait::async_trait;
use chrono::Utc;
use cid::Cid;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use super::agent::Agent;
use super::blob_store::BlobStore;
use super::registry::{normalize_email, Registry, SpaceRecord, UploadRecord};
use crate::capability::ability::{self, Ability};
use crate::capability::archive::Extracted;
use crate::capability::delegation::META_SPACE_NAME;
use crate::capability::provider::SHARED_SPACE_NAME;
use crate::capability::{
    CapabilityProvider, Delegation, DelegationPayload, Did, SignedGrant, SpaceInfo, UploadFile,
    DAG_CBOR, RAW,
};
use crate::config::Args;
use crate::types::{GatewayError, Result};

/// One entry of a directory node
#[derive(Debug, Serialize)]
struct DirEntry<'a> {
    name: &'a str,
    cid: String,
    size: u64,
}

pub struct LocalProvider {
    agent: Agent,
    registry: Registry,
    blobs: BlobStore,
}

impl LocalProvider {
    pub fn new(agent: Agent, registry: Registry, blobs: BlobStore) -> Self {
        Self {
            agent,
            registry,
            blobs,
        }
    }

    /// Open the provider under `args.data_dir`
    pub async fn open(args: &Args) -> Result<Self> {
        let agent = Agent::load_or_generate(&args.agent_key_path())?;
        let registry = if args.persist {
            Registry::open(args.registry_path()).await?
        } else {
            Registry::in_memory()
        };
        let blobs = BlobStore::new(args.blobs_dir()).await?;

        info!(
            agent = %agent.did(),
            data_dir = %args.data_dir.display(),
            persist = args.persist,
            "Local provider ready"
        );

        Ok(Self::new(agent, registry, blobs))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Snapshot failures are logged, never surfaced
    async fn persist(&self) {
        if let Err(e) = self.registry.persist().await {
            warn!(error = %e, "Failed to persist registry snapshot");
        }
    }

    /// Proofs naming the agent as audience that cover `abilities` until `until`
    fn agent_proofs<'a>(
        &self,
        record: &'a SpaceRecord,
        abilities: &[Ability],
        until: Option<i64>,
    ) -> Vec<&'a Delegation> {
        let agent = self.agent.did();
        let now = Utc::now().timestamp();
        record
            .proofs
            .iter()
            .filter(|p| {
                let outlives = match (p.payload.expiration, until) {
                    (None, _) => true,
                    (Some(_), None) => false,
                    (Some(pe), Some(de)) => pe >= de,
                };
                &p.payload.audience == agent
                    && ability::covers(&p.payload.abilities, abilities)
                    && !p.is_expired(now)
                    && outlives
            })
            .collect()
    }

    fn require_space(&self, space: &Did) -> Result<SpaceRecord> {
        self.registry
            .get_space(space)
            .ok_or_else(|| GatewayError::space_not_found(space.as_str()))
    }
}

#[async_trait]
impl CapabilityProvider for LocalProvider {
    fn agent_did(&self) -> Did {
        self.agent.did().clone()
    }

    async fn login(&self, email: &str) -> Result<()> {
        if self.registry.login(email) {
            info!(email = %normalize_email(email), "Created account session");
            self.persist().await;
        }
        Ok(())
    }

    async fn has_session(&self, email: &str) -> bool {
        self.registry.has_account(email)
    }

    async fn is_logged_in(&self) -> bool {
        self.registry.account_count() > 0
    }

    async fn spaces(&self, email: &str) -> Result<Vec<SpaceInfo>> {
        self.registry.spaces_for(email)
    }

    async fn agent_spaces(&self) -> Vec<SpaceInfo> {
        self.registry.all_spaces()
    }

    async fn create_space(&self, email: &str, name: &str) -> Result<SpaceInfo> {
        let owner = normalize_email(email);
        if !self.registry.has_account(&owner) {
            return Err(GatewayError::Validation(format!("No account session for {}", owner)));
        }

        let space_key = SigningKey::generate(&mut OsRng);
        let space = Did::from_verifying_key(&space_key.verifying_key());

        let owner_proof = Delegation::sign(
            DelegationPayload::new(
                space.clone(),
                self.agent.did().clone(),
                space.clone(),
                Ability::ALL.to_vec(),
                None,
            )
            .with_meta(META_SPACE_NAME, name),
            &space_key,
        )?;

        let mut record = SpaceRecord::new(space, name, Some(owner));
        record.proofs.push(owner_proof);
        let info = self.registry.insert_space(record)?;

        info!(space = %info.did, name = %info.name, "Created space");
        self.persist().await;
        Ok(info)
    }

    async fn provision_space(&self, email: &str, space: &Did) -> Result<()> {
        let owner = normalize_email(email);
        self.registry.update_space(space, |record| {
            if record.owner.as_deref() != Some(owner.as_str()) {
                return Err(GatewayError::Validation(format!(
                    "Space {} is not owned by {}",
                    space, owner
                )));
            }
            record.provisioned = true;
            Ok(())
        })??;

        debug!(space = %space, email = %owner, "Provisioned space");
        self.persist().await;
        Ok(())
    }

    async fn set_current_space(&self, space: &Did) -> Result<()> {
        self.require_space(space)?;
        self.registry.set_current(Some(space.clone())).await;
        self.persist().await;
        Ok(())
    }

    async fn current_space(&self) -> Option<Did> {
        self.registry.current().await
    }

    async fn space_name(&self, space: &Did) -> Option<String> {
        self.registry.get_space(space).map(|r| r.name)
    }

    async fn delegate(
        &self,
        space: &Did,
        audience: &Did,
        abilities: &[Ability],
        expiration: i64,
    ) -> Result<SignedGrant> {
        let record = self.require_space(space)?;

        // Only proofs issued by the space itself can back a one-hop chain
        let owner_proof = self
            .agent_proofs(&record, abilities, Some(expiration))
            .into_iter()
            .find(|p| p.payload.issuer == p.payload.subject)
            .cloned()
            .ok_or_else(|| {
                GatewayError::Upstream(format!(
                    "Agent {} holds no owner proof for space {}",
                    self.agent.did(),
                    space
                ))
            })?;

        let payload = DelegationPayload::new(
            self.agent.did().clone(),
            audience.clone(),
            space.clone(),
            abilities.to_vec(),
            Some(expiration),
        )
        .with_proof(&owner_proof.cid()?)
        .with_meta(META_SPACE_NAME, record.name.clone());

        let delegation = self.agent.sign(payload)?;

        Ok(SignedGrant {
            delegation,
            proofs: vec![owner_proof],
        })
    }

    async fn add_proof(&self, extracted: &Extracted) -> Result<SpaceInfo> {
        let delegation = &extracted.delegation;
        let space = delegation.payload.subject.clone();

        let mut chain = Vec::with_capacity(extracted.proofs.len() + 1);
        chain.push(delegation.clone());
        chain.extend(extracted.proofs.iter().cloned());

        let info = match self.registry.get_space(&space) {
            Some(_) => self.registry.update_space(&space, |record| {
                for proof in chain {
                    if !record.proofs.contains(&proof) {
                        record.proofs.push(proof);
                    }
                }
                record.info()
            })?,
            None => {
                let name = delegation
                    .space_name()
                    .or_else(|| extracted.proofs.iter().find_map(|p| p.space_name()))
                    .unwrap_or(SHARED_SPACE_NAME);
                let mut record = SpaceRecord::new(space, name, None);
                record.proofs = chain;
                self.registry.insert_space(record)?
            }
        };

        info!(space = %info.did, delegation = %extracted.id, "Installed delegation");
        self.persist().await;
        Ok(info)
    }

    async fn upload_directory(&self, space: &Did, files: Vec<UploadFile>) -> Result<Cid> {
        if files.is_empty() {
            return Err(GatewayError::Validation("No files provided".to_string()));
        }

        let record = self.require_space(space)?;
        let now = Utc::now().timestamp();
        if self
            .agent_proofs(&record, &[Ability::UploadAdd], Some(now))
            .is_empty()
        {
            return Err(GatewayError::Upstream(format!(
                "Agent {} is not authorized to upload to space {}",
                self.agent.did(),
                space
            )));
        }

        let mut seen = HashSet::new();
        let mut reused = 0usize;
        let mut entries = Vec::with_capacity(files.len());
        for file in &files {
            if !seen.insert(file.name.as_str()) {
                return Err(GatewayError::Validation(format!("Duplicate file name {}", file.name)));
            }
            let stored = self.blobs.store(RAW, &file.bytes).await?;
            if stored.already_existed {
                reused += 1;
            }
            entries.push(DirEntry {
                name: &file.name,
                cid: stored.cid.to_string(),
                size: stored.size_bytes,
            });
        }

        let node = serde_ipld_dagcbor::to_vec(&entries)
            .map_err(|e| GatewayError::Internal(format!("Failed to encode directory: {}", e)))?;
        let root = self.blobs.store(DAG_CBOR, &node).await?.cid;

        self.registry.update_space(space, |record| {
            record.uploads.push(UploadRecord {
                root: root.to_string(),
                files: files.iter().map(|f| f.name.clone()).collect(),
                uploaded_at: Utc::now(),
            })
        })?;

        info!(
            space = %space,
            root = %root,
            files = files.len(),
            reused,
            "Stored directory upload"
        );
        self.persist().await;
        Ok(root)
    }

    async fn has_upload(&self, space: &Did, root: &Cid) -> Result<bool> {
        let record = self.require_space(space)?;
        let root = root.to_string();
        Ok(record.uploads.iter().any(|u| u.root == root))
    }

    async fn has_content(&self, cid: &Cid) -> bool {
        self.blobs.exists(cid).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::archive;
    use tempfile::TempDir;

    async fn provider(temp_dir: &TempDir) -> LocalProvider {
        let blobs = BlobStore::new(temp_dir.path().join("blobs")).await.unwrap();
        LocalProvider::new(Agent::generate(), Registry::in_memory(), blobs)
    }

    #[tokio::test]
    async fn test_create_space_signs_owner_proof() {
        let temp_dir = TempDir::new().unwrap();
        let provider = provider(&temp_dir).await;
        provider.login("gtr@band.example").await.unwrap();

        let space = provider.create_space("gtr@band.example", "tour-photos").await.unwrap();
        let record = provider.registry().get_space(&space.did).unwrap();

        assert_eq!(record.owner.as_deref(), Some("gtr@band.example"));
        assert_eq!(record.proofs.len(), 1);
        let proof = &record.proofs[0];
        assert_eq!(proof.payload.issuer, space.did);
        assert_eq!(proof.payload.audience, provider.agent_did());
        assert_eq!(proof.space_name(), Some("tour-photos"));
        proof.verify_chain(&[], Utc::now().timestamp()).unwrap();
    }

    #[tokio::test]
    async fn test_provision_space_checks_owner() {
        let temp_dir = TempDir::new().unwrap();
        let provider = provider(&temp_dir).await;
        provider.login("gtr@band.example").await.unwrap();
        provider.login("bass@band.example").await.unwrap();
        let space = provider.create_space("gtr@band.example", "b-sides").await.unwrap();
        assert!(!space.provisioned);

        let err = provider.provision_space("bass@band.example", &space.did).await.unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
        assert!(!provider.registry().get_space(&space.did).unwrap().provisioned);

        provider.provision_space("GTR@band.example", &space.did).await.unwrap();
        let spaces = provider.spaces("gtr@band.example").await.unwrap();
        assert!(spaces[0].provisioned);
    }

    #[tokio::test]
    async fn test_create_space_requires_login() {
        let temp_dir = TempDir::new().unwrap();
        let provider = provider(&temp_dir).await;
        assert!(matches!(
            provider.create_space("nobody@band.example", "x").await,
            Err(GatewayError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_delegate_produces_verifiable_chain() {
        let temp_dir = TempDir::new().unwrap();
        let provider = provider(&temp_dir).await;
        provider.login("gtr@band.example").await.unwrap();
        let space = provider.create_space("gtr@band.example", "demos").await.unwrap();

        let audience = Agent::generate().did().clone();
        let expiration = Utc::now().timestamp() + 3600;
        let grant = provider
            .delegate(&space.did, &audience, &[Ability::UploadAdd, Ability::UploadList], expiration)
            .await
            .unwrap();

        assert_eq!(grant.delegation.payload.audience, audience);
        assert_eq!(grant.delegation.payload.expiration, Some(expiration));
        grant
            .delegation
            .verify_chain(&grant.proofs, Utc::now().timestamp())
            .unwrap();
    }

    #[tokio::test]
    async fn test_add_proof_registers_shared_space() {
        let temp_dir = TempDir::new().unwrap();
        let issuer = provider(&temp_dir).await;
        issuer.login("gtr@band.example").await.unwrap();
        let space = issuer.create_space("gtr@band.example", "setlists").await.unwrap();

        let other_dir = TempDir::new().unwrap();
        let holder = provider(&other_dir).await;
        let grant = issuer
            .delegate(&space.did, &holder.agent_did(), &[Ability::UploadAdd], Utc::now().timestamp() + 60)
            .await
            .unwrap();
        let (_, bytes) = archive::pack(&grant.delegation, &grant.proofs).unwrap();
        let extracted = archive::extract(&bytes).unwrap();

        let info = holder.add_proof(&extracted).await.unwrap();
        assert_eq!(info.did, space.did);
        assert_eq!(info.name, "setlists");
        assert_eq!(info.owner, None);
        assert_eq!(holder.agent_spaces().await, vec![info]);

        // Installing twice keeps a single copy of each proof
        holder.add_proof(&extracted).await.unwrap();
        assert_eq!(holder.registry().get_space(&space.did).unwrap().proofs.len(), 2);
    }

    #[tokio::test]
    async fn test_upload_directory() {
        let temp_dir = TempDir::new().unwrap();
        let provider = provider(&temp_dir).await;
        provider.login("gtr@band.example").await.unwrap();
        let space = provider.create_space("gtr@band.example", "audio").await.unwrap();

        let files = vec![
            UploadFile::new("intro.mp3", "audio/mpeg", b"not really audio".to_vec()),
            UploadFile::new("metadata.json", "application/json", b"{}".to_vec()),
        ];
        let root = provider.upload_directory(&space.did, files).await.unwrap();

        assert_eq!(root.codec(), DAG_CBOR);
        assert!(provider.has_upload(&space.did, &root).await.unwrap());
        assert!(provider.has_content(&root).await);
        assert!(provider.has_content(&crate::capability::content_id(RAW, b"not really audio")).await);
    }

    #[tokio::test]
    async fn test_reupload_reuses_blocks() {
        let temp_dir = TempDir::new().unwrap();
        let provider = provider(&temp_dir).await;
        provider.login("gtr@band.example").await.unwrap();
        let space = provider.create_space("gtr@band.example", "audio").await.unwrap();

        let files = vec![UploadFile::new("outro.mp3", "audio/mpeg", b"fade out".to_vec())];
        let first = provider.upload_directory(&space.did, files.clone()).await.unwrap();
        let second = provider.upload_directory(&space.did, files).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(provider.registry().get_space(&space.did).unwrap().uploads.len(), 2);
    }

    #[tokio::test]
    async fn test_upload_rejects_duplicates_and_empty() {
        let temp_dir = TempDir::new().unwrap();
        let provider = provider(&temp_dir).await;
        provider.login("gtr@band.example").await.unwrap();
        let space = provider.create_space("gtr@band.example", "audio").await.unwrap();

        assert!(provider.upload_directory(&space.did, Vec::new()).await.is_err());

        let files = vec![
            UploadFile::new("a.txt", "text/plain", b"1".to_vec()),
            UploadFile::new("a.txt", "text/plain", b"2".to_vec()),
        ];
        let err = provider.upload_directory(&space.did, files).await.unwrap_err();
        assert!(err.to_string().contains("Duplicate"));
    }

    #[tokio::test]
    async fn test_unknown_space() {
        let temp_dir = TempDir::new().unwrap();
        let provider = provider(&temp_dir).await;
        let missing = Agent::generate().did().clone();

        let err = provider.set_current_space(&missing).await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
        assert!(provider.has_upload(&missing, &crate::capability::content_id(RAW, b"x")).await.is_err());
    }
}
