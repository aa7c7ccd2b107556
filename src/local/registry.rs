//! Account and space registry
//!
//! Accounts are keyed by normalized email. Spaces are keyed by DID and carry
//! the proofs that give the agent authority over them, plus the uploads
//! recorded against them. Everything lives in `DashMap`s; when a snapshot
//! path is configured the whole registry is written out as JSON after each
//! mutation.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::capability::{Delegation, Did, SpaceInfo};
use crate::types::{GatewayError, Result};

/// An email-linked principal
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub email: String,
    pub created_at: DateTime<Utc>,
    /// Owned spaces in creation order
    pub spaces: Vec<Did>,
}

/// A directory upload recorded on a space
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    pub root: String,
    pub files: Vec<String>,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceRecord {
    pub did: Did,
    pub name: String,
    /// Owning account; `None` for spaces reached through a received delegation
    pub owner: Option<String>,
    /// Registry insertion order
    pub seq: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub provisioned: bool,
    #[serde(default)]
    pub proofs: Vec<Delegation>,
    #[serde(default)]
    pub uploads: Vec<UploadRecord>,
}

impl SpaceRecord {
    pub fn new(did: Did, name: impl Into<String>, owner: Option<String>) -> Self {
        Self {
            did,
            name: name.into(),
            owner,
            seq: 0,
            created_at: Utc::now(),
            provisioned: false,
            proofs: Vec::new(),
            uploads: Vec::new(),
        }
    }

    pub fn info(&self) -> SpaceInfo {
        SpaceInfo {
            did: self.did.clone(),
            name: self.name.clone(),
            owner: self.owner.clone(),
            provisioned: self.provisioned,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    accounts: Vec<Account>,
    spaces: Vec<SpaceRecord>,
    current: Option<Did>,
}

/// Trim and lowercase an email so lookups are case-insensitive
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub struct Registry {
    accounts: DashMap<String, Account>,
    spaces: DashMap<String, SpaceRecord>,
    next_seq: AtomicU64,
    current: RwLock<Option<Did>>,
    snapshot_path: Option<PathBuf>,
    /// Serializes snapshot writes
    write_lock: Mutex<()>,
}

impl Registry {
    /// Registry that never touches disk
    pub fn in_memory() -> Self {
        Self::from_snapshot(Snapshot::default(), None)
    }

    /// Open a registry persisted at `path`, loading the existing snapshot
    pub async fn open(path: PathBuf) -> Result<Self> {
        let snapshot = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                GatewayError::Config(format!("Corrupt registry {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(e) => return Err(e.into()),
        };

        info!(
            path = %path.display(),
            accounts = snapshot.accounts.len(),
            spaces = snapshot.spaces.len(),
            "Loaded registry"
        );

        Ok(Self::from_snapshot(snapshot, Some(path)))
    }

    fn from_snapshot(snapshot: Snapshot, snapshot_path: Option<PathBuf>) -> Self {
        let next_seq = snapshot.spaces.iter().map(|s| s.seq + 1).max().unwrap_or(0);

        let accounts = DashMap::new();
        for account in snapshot.accounts {
            accounts.insert(account.email.clone(), account);
        }
        let spaces = DashMap::new();
        for space in snapshot.spaces {
            spaces.insert(space.did.to_string(), space);
        }

        Self {
            accounts,
            spaces,
            next_seq: AtomicU64::new(next_seq),
            current: RwLock::new(snapshot.current),
            snapshot_path,
            write_lock: Mutex::new(()),
        }
    }

    /// Create the account for `email` if absent. Returns true when created.
    pub fn login(&self, email: &str) -> bool {
        let email = normalize_email(email);
        let mut created = false;
        self.accounts.entry(email.clone()).or_insert_with(|| {
            created = true;
            Account {
                email,
                created_at: Utc::now(),
                spaces: Vec::new(),
            }
        });
        created
    }

    pub fn has_account(&self, email: &str) -> bool {
        self.accounts.contains_key(&normalize_email(email))
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    /// Insert a space, appending it to its owner's account when it has one
    pub fn insert_space(&self, mut record: SpaceRecord) -> Result<SpaceInfo> {
        if let Some(owner) = &record.owner {
            let mut account = self.accounts.get_mut(owner).ok_or_else(|| {
                GatewayError::Validation(format!("No account session for {}", owner))
            })?;
            account.spaces.push(record.did.clone());
        }

        record.seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let info = record.info();
        debug!(space = %record.did, name = %record.name, "Registered space");
        self.spaces.insert(record.did.to_string(), record);
        Ok(info)
    }

    pub fn get_space(&self, did: &Did) -> Option<SpaceRecord> {
        self.spaces.get(did.as_str()).map(|s| s.clone())
    }

    /// Apply `f` to a space record in place
    pub fn update_space<T>(&self, did: &Did, f: impl FnOnce(&mut SpaceRecord) -> T) -> Result<T> {
        let mut record = self
            .spaces
            .get_mut(did.as_str())
            .ok_or_else(|| GatewayError::space_not_found(did.as_str()))?;
        Ok(f(&mut record))
    }

    /// Spaces visible to `email`: owned spaces in creation order, then
    /// shared spaces in the order they were installed
    pub fn spaces_for(&self, email: &str) -> Result<Vec<SpaceInfo>> {
        let email = normalize_email(email);
        let owned: Vec<Did> = self
            .accounts
            .get(&email)
            .map(|a| a.spaces.clone())
            .ok_or_else(|| GatewayError::Validation(format!("No account session for {}", email)))?;

        let mut spaces: Vec<SpaceInfo> = owned
            .iter()
            .filter_map(|did| self.spaces.get(did.as_str()).map(|s| s.info()))
            .collect();
        spaces.extend(self.shared_spaces());
        Ok(spaces)
    }

    fn shared_spaces(&self) -> Vec<SpaceInfo> {
        let mut shared: Vec<(u64, SpaceInfo)> = self
            .spaces
            .iter()
            .filter(|s| s.owner.is_none())
            .map(|s| (s.seq, s.info()))
            .collect();
        shared.sort_by_key(|(seq, _)| *seq);
        shared.into_iter().map(|(_, info)| info).collect()
    }

    /// Every registered space in insertion order
    pub fn all_spaces(&self) -> Vec<SpaceInfo> {
        let mut all: Vec<(u64, SpaceInfo)> = self.spaces.iter().map(|s| (s.seq, s.info())).collect();
        all.sort_by_key(|(seq, _)| *seq);
        all.into_iter().map(|(_, info)| info).collect()
    }

    pub async fn set_current(&self, did: Option<Did>) {
        *self.current.write().await = did;
    }

    pub async fn current(&self) -> Option<Did> {
        self.current.read().await.clone()
    }

    /// Write the snapshot to disk. A no-op for in-memory registries.
    pub async fn persist(&self) -> Result<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let _guard = self.write_lock.lock().await;

        let mut spaces: Vec<SpaceRecord> = self.spaces.iter().map(|s| s.clone()).collect();
        spaces.sort_by_key(|s| s.seq);
        let mut accounts: Vec<Account> = self.accounts.iter().map(|a| a.clone()).collect();
        accounts.sort_by(|a, b| a.email.cmp(&b.email));

        let snapshot = Snapshot {
            accounts,
            spaces,
            current: self.current().await,
        };
        let bytes = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| GatewayError::Internal(format!("Failed to encode registry: {}", e)))?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;

        debug!(path = %path.display(), "Persisted registry");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn random_did() -> Did {
        Did::from_verifying_key(&SigningKey::generate(&mut OsRng).verifying_key())
    }

    #[test]
    fn test_login_is_idempotent_and_case_insensitive() {
        let registry = Registry::in_memory();
        assert!(registry.login("Drummer@Band.example"));
        assert!(!registry.login("  drummer@band.example "));
        assert_eq!(registry.account_count(), 1);
        assert!(registry.has_account("DRUMMER@band.example"));
    }

    #[tokio::test]
    async fn test_concurrent_login() {
        let registry = Arc::new(Registry::in_memory());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.login("bass@band.example") })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(registry.account_count(), 1);
    }

    #[test]
    fn test_listing_order() {
        let registry = Registry::in_memory();
        registry.login("vox@band.example");

        let shared = random_did();
        let first = random_did();
        let second = random_did();

        registry
            .insert_space(SpaceRecord::new(shared.clone(), "Shared Space", None))
            .unwrap();
        registry
            .insert_space(SpaceRecord::new(first.clone(), "photos", Some("vox@band.example".into())))
            .unwrap();
        registry
            .insert_space(SpaceRecord::new(second.clone(), "demos", Some("vox@band.example".into())))
            .unwrap();

        let dids: Vec<Did> = registry
            .spaces_for("vox@band.example")
            .unwrap()
            .into_iter()
            .map(|s| s.did)
            .collect();
        assert_eq!(dids, vec![first, second, shared]);
    }

    #[test]
    fn test_spaces_without_account() {
        let registry = Registry::in_memory();
        assert!(matches!(
            registry.spaces_for("nobody@band.example"),
            Err(GatewayError::Validation(_))
        ));
    }

    #[test]
    fn test_update_missing_space() {
        let registry = Registry::in_memory();
        let err = registry.update_space(&random_did(), |_| ()).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("registry.json");
        let did = random_did();

        {
            let registry = Registry::open(path.clone()).await.unwrap();
            registry.login("keys@band.example");
            registry
                .insert_space(SpaceRecord::new(did.clone(), "rehearsals", Some("keys@band.example".into())))
                .unwrap();
            registry.set_current(Some(did.clone())).await;
            registry.persist().await.unwrap();
        }

        let reopened = Registry::open(path).await.unwrap();
        assert!(reopened.has_account("keys@band.example"));
        assert_eq!(reopened.current().await, Some(did.clone()));
        assert_eq!(reopened.get_space(&did).unwrap().name, "rehearsals");

        // Sequence numbers continue after reload
        let next = random_did();
        reopened.insert_space(SpaceRecord::new(next.clone(), "Shared Space", None)).unwrap();
        assert!(reopened.get_space(&next).unwrap().seq > reopened.get_space(&did).unwrap().seq);
    }
}
