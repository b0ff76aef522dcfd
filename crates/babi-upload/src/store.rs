use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("store lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    pub content_type: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub metadata: ObjectMetadata,
}

/// Object storage backend for uploaded images.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    async fn put(&self, key: &str, object: StoredObject) -> Result<(), StoreError>;
    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError>;
}

/// Keys are produced by the uploader and never contain separators; reject
/// anything that could leave the store root.
fn validate_key(key: &str) -> Result<(), StoreError> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

/// Bytes at `<root>/<key>` with metadata in `<root>/<key>.meta.json`.
#[derive(Debug, Clone)]
pub struct LocalFsObjectStore {
    root: PathBuf,
}

impl LocalFsObjectStore {
    pub async fn open(root: &Path) -> Result<Self, StoreError> {
        tokio::fs::create_dir_all(root).await?;
        info!(root = %root.display(), "opened local object store");
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn paths(&self, key: &str) -> Result<(PathBuf, PathBuf), StoreError> {
        validate_key(key)?;
        Ok((
            self.root.join(key),
            self.root.join(format!("{key}.meta.json")),
        ))
    }
}

#[async_trait]
impl ObjectStore for LocalFsObjectStore {
    async fn put(&self, key: &str, object: StoredObject) -> Result<(), StoreError> {
        let (data_path, meta_path) = self.paths(key)?;
        let meta = serde_json::to_vec(&object.metadata)?;
        tokio::fs::write(&data_path, &object.bytes).await?;
        tokio::fs::write(&meta_path, meta).await?;
        debug!(key, bytes = object.bytes.len(), "stored object");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError> {
        let (data_path, meta_path) = self.paths(key)?;
        let bytes = match tokio::fs::read(&data_path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let metadata = serde_json::from_slice(&tokio::fs::read(&meta_path).await?)?;
        Ok(Some(StoredObject { bytes, metadata }))
    }
}

#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|objects| objects.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, object: StoredObject) -> Result<(), StoreError> {
        validate_key(key)?;
        let mut objects = self.objects.lock().map_err(|_| StoreError::Poisoned)?;
        objects.insert(key.to_string(), object);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError> {
        let objects = self.objects.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(objects.get(key).cloned())
    }
}
