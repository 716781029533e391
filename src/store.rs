//! Persistent asset records
//!
//! The store only ever sees [`AssetRecord`]s of live assets. Records carrying
//! the cached-handle sentinel id are rejected.

use crate::models::{AssetRecord, CACHED_ASSET_ID};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn save(&self, record: &AssetRecord) -> Result<()>;
    async fn load(&self, id: i64) -> Result<Option<AssetRecord>>;
}

fn check_writable(record: &AssetRecord) -> Result<()> {
    if record.id == CACHED_ASSET_ID {
        return Err(Error::CachedWriteBack(record.filename.clone()));
    }
    if record.id <= 0 {
        return Err(Error::Invariant(format!(
            "Asset id must be positive, got {}",
            record.id
        )));
    }
    Ok(())
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Manifest {
    assets: BTreeMap<i64, AssetRecord>,
}

/// Records kept in a JSON manifest on disk.
pub struct JsonAssetStore {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl JsonAssetStore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    async fn read_manifest(&self) -> Result<Manifest> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => Ok(serde_json::from_str(&json)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Manifest::default()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl AssetStore for JsonAssetStore {
    async fn save(&self, record: &AssetRecord) -> Result<()> {
        check_writable(record)?;

        let _guard = self.lock.lock().await;
        let mut manifest = self.read_manifest().await?;
        manifest.assets.insert(record.id, record.clone());

        let json = serde_json::to_string_pretty(&manifest)?;
        crate::coordinator::publish(&self.path, json.into_bytes()).await?;
        tracing::debug!("Saved asset {} to {}", record.id, self.path.display());
        Ok(())
    }

    async fn load(&self, id: i64) -> Result<Option<AssetRecord>> {
        let _guard = self.lock.lock().await;
        Ok(self.read_manifest().await?.assets.remove(&id))
    }
}

#[derive(Clone, Default)]
pub struct MemoryAssetStore {
    records: Arc<Mutex<BTreeMap<i64, AssetRecord>>>,
    save_count: Arc<Mutex<usize>>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_save_count(&self) -> usize {
        *self.save_count.lock().unwrap()
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn save(&self, record: &AssetRecord) -> Result<()> {
        check_writable(record)?;
        *self.save_count.lock().unwrap() += 1;
        self.records
            .lock()
            .unwrap()
            .insert(record.id, record.clone());
        Ok(())
    }

    async fn load(&self, id: i64) -> Result<Option<AssetRecord>> {
        Ok(self.records.lock().unwrap().get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_json_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = JsonAssetStore::new(&dir.path().join("assets.json"));

        let record = AssetRecord::new(5, "photos/cat.png").with_title("Cat");
        store.save(&record).await.unwrap();
        store
            .save(&AssetRecord::new(6, "photos/dog.png"))
            .await
            .unwrap();

        assert_eq!(store.load(5).await.unwrap(), Some(record));
        assert!(store.load(6).await.unwrap().is_some());
        assert_eq!(store.load(7).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_json_store_missing_manifest_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonAssetStore::new(&dir.path().join("none.json"));
        assert_eq!(store.load(1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sentinel_id_rejected() {
        let store = MemoryAssetStore::new();
        let record = AssetRecord::new(CACHED_ASSET_ID, "_resampled/Fit1x1-a.png");

        for _ in 0..3 {
            let err = store.save(&record).await.unwrap_err();
            assert!(matches!(err, Error::CachedWriteBack(_)));
        }
        assert_eq!(store.get_save_count(), 0);
    }

    #[tokio::test]
    async fn test_unsaved_id_rejected() {
        let dir = TempDir::new().unwrap();
        let store = JsonAssetStore::new(&dir.path().join("assets.json"));
        let err = store.save(&AssetRecord::new(0, "a.png")).await.unwrap_err();
        assert!(matches!(err, Error::Invariant(_)));
    }
}
