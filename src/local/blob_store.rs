//! Content-addressed blob storage
//!
//! Stores blocks in a local directory structure using their CIDs as
//! filenames. The CID is recomputed from the bytes on every write, so a
//! block can never be stored under the wrong address.

use cid::Cid;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::capability::content_id;
use crate::types::Result;

/// Result of storing a block
#[derive(Debug, Clone)]
pub struct StoreResult {
    pub cid: Cid,
    pub size_bytes: u64,
    /// Whether the block already existed
    pub already_existed: bool,
}

/// Block storage manager
pub struct BlobStore {
    root_dir: PathBuf,
}

impl BlobStore {
    /// Create a new blob store at the given directory
    pub async fn new<P: AsRef<Path>>(root_dir: P) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        fs::create_dir_all(&root_dir).await?;

        info!(path = %root_dir.display(), "Initialized blob store");

        Ok(Self { root_dir })
    }

    /// Path for a block. The last 4 characters of the CID shard the
    /// directory; CIDv1 prefixes are identical across blocks.
    fn blob_path(&self, cid: &Cid) -> PathBuf {
        let name = cid.to_string();
        let shard = &name[name.len().saturating_sub(4)..];
        self.root_dir.join(shard).join(name)
    }

    /// Store a block under `codec`, returning its CID
    pub async fn store(&self, codec: u64, data: &[u8]) -> Result<StoreResult> {
        let cid = content_id(codec, data);
        let path = self.blob_path(&cid);

        if fs::metadata(&path).await.is_ok() {
            debug!(cid = %cid, "Block already exists");
            return Ok(StoreResult {
                cid,
                size_bytes: data.len() as u64,
                already_existed: true,
            });
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write-then-rename so readers never see a partial block. Each writer
        // gets its own temp file; identical content may be stored concurrently.
        let tmp = path.with_extension(format!("{}.partial", hex::encode(rand::random::<[u8; 8]>())));
        fs::write(&tmp, data).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            if fs::metadata(&path).await.is_ok() {
                debug!(cid = %cid, "Block stored by a concurrent writer");
                return Ok(StoreResult {
                    cid,
                    size_bytes: data.len() as u64,
                    already_existed: true,
                });
            }
            return Err(e.into());
        }

        debug!(cid = %cid, size = data.len(), "Stored block");

        Ok(StoreResult {
            cid,
            size_bytes: data.len() as u64,
            already_existed: false,
        })
    }

    pub async fn exists(&self, cid: &Cid) -> bool {
        fs::metadata(self.blob_path(cid)).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::RAW;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_store_and_retrieve() {
        let temp_dir = TempDir::new().unwrap();
        let store = BlobStore::new(temp_dir.path()).await.unwrap();

        let data = b"setlist: opener, ballad, encore";
        let result = store.store(RAW, data).await.unwrap();

        assert_eq!(result.cid, content_id(RAW, data));
        assert_eq!(result.size_bytes, data.len() as u64);
        assert!(!result.already_existed);
        assert!(store.exists(&result.cid).await);

        let retrieved = fs::read(store.blob_path(&result.cid)).await.unwrap();
        assert_eq!(retrieved, data);
    }

    #[tokio::test]
    async fn test_idempotent_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = BlobStore::new(temp_dir.path()).await.unwrap();

        let first = store.store(RAW, b"duplicate").await.unwrap();
        let second = store.store(RAW, b"duplicate").await.unwrap();

        assert_eq!(first.cid, second.cid);
        assert!(!first.already_existed);
        assert!(second.already_existed);
    }

    #[tokio::test]
    async fn test_missing_block() {
        let temp_dir = TempDir::new().unwrap();
        let store = BlobStore::new(temp_dir.path()).await.unwrap();

        let cid = content_id(RAW, b"never stored");
        assert!(!store.exists(&cid).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_identical_stores() {
        let temp_dir = TempDir::new().unwrap();
        let store = std::sync::Arc::new(BlobStore::new(temp_dir.path()).await.unwrap());
        let data = vec![0x5au8; 4 * 1024 * 1024];
        let expected = content_id(RAW, &data);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            let data = data.clone();
            handles.push(tokio::spawn(async move { store.store(RAW, &data).await }));
        }
        for handle in handles {
            let result = handle.await.unwrap().unwrap();
            assert_eq!(result.cid, expected);
        }

        let path = store.blob_path(&expected);
        assert_eq!(fs::read(&path).await.unwrap(), data);

        let mut entries = fs::read_dir(path.parent().unwrap()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec![expected.to_string()]);
    }
}
