/*!
 * Durable per-node storage for MuxNode.
 *
 * One record is persisted per physical node: the endpoint registry (id to
 * classified kind) and a flat settings map holding user-entered labels keyed
 * `label_ep<id>`. Persistence failures are never fatal; callers log them and
 * keep the in-memory state authoritative until the next successful write.
 */
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::warn;

use muxnode_core::types::EndpointId;

use crate::endpoint::EndpointKind;

/// Error type for node store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other storage error
    #[error("Storage error: {0}")]
    Other(String),
}

impl StoreError {
    /// Create a new storage error
    pub fn other<S: AsRef<str>>(msg: S) -> Self {
        StoreError::Other(msg.as_ref().to_string())
    }
}

/// Result type for node store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// The registry mapping persisted for a node
pub type RegistrySnapshot = BTreeMap<EndpointId, Option<EndpointKind>>;

/// Durable store for a single node's record
#[async_trait]
pub trait NodeStore: Send + Sync + Debug {
    /// Load the persisted registry mapping
    async fn load_registry(&self) -> Result<RegistrySnapshot>;

    /// Persist the registry mapping
    async fn save_registry(&self, registry: &RegistrySnapshot) -> Result<()>;

    /// Get the user-entered label override for an endpoint, if any
    async fn label_override(&self, endpoint: EndpointId) -> Result<Option<String>>;
}

/// The settings key carrying the label override for an endpoint
fn label_key(endpoint: EndpointId) -> String {
    format!("label_ep{}", endpoint)
}

/// The serialized on-disk record for a node.
///
/// Registry keys are stringified endpoint ids so the record is a plain JSON
/// object; unparsable keys are skipped with a diagnostic on load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct NodeRecord {
    /// Endpoint id to classified kind (`null` = present but unsupported)
    #[serde(default)]
    registry: BTreeMap<String, Option<EndpointKind>>,
    /// User settings, labels keyed `label_ep<id>`
    #[serde(default)]
    settings: BTreeMap<String, String>,
}

impl NodeRecord {
    fn registry_snapshot(&self) -> RegistrySnapshot {
        let mut snapshot = RegistrySnapshot::new();
        for (key, kind) in &self.registry {
            match key.parse::<EndpointId>() {
                Ok(id) => {
                    snapshot.insert(id, *kind);
                }
                Err(e) => {
                    warn!("Skipping registry entry with invalid endpoint id {:?}: {}", key, e);
                }
            }
        }
        snapshot
    }

    fn set_registry(&mut self, registry: &RegistrySnapshot) {
        self.registry = registry
            .iter()
            .map(|(id, kind)| (id.to_string(), *kind))
            .collect();
    }
}

/// In-memory node store for tests and development
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// The stored record
    record: RwLock<NodeRecord>,
    /// When set, every save fails; used to exercise storage-failure handling
    fail_saves: AtomicBool,
}

impl MemoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a label override for an endpoint
    pub async fn set_label<S: Into<String>>(&self, endpoint: EndpointId, label: S) {
        let mut record = self.record.write().await;
        record.settings.insert(label_key(endpoint), label.into());
    }

    /// Make subsequent saves fail with a storage error
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl NodeStore for MemoryStore {
    async fn load_registry(&self) -> Result<RegistrySnapshot> {
        let record = self.record.read().await;
        Ok(record.registry_snapshot())
    }

    async fn save_registry(&self, registry: &RegistrySnapshot) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::other("simulated storage failure"));
        }
        let mut record = self.record.write().await;
        record.set_registry(registry);
        Ok(())
    }

    async fn label_override(&self, endpoint: EndpointId) -> Result<Option<String>> {
        let record = self.record.read().await;
        Ok(record.settings.get(&label_key(endpoint)).cloned())
    }
}

/// Node store persisting a single JSON record to disk
#[derive(Debug)]
pub struct JsonFileStore {
    /// Path of the record file
    path: PathBuf,
}

impl JsonFileStore {
    /// Create a store backed by the given record file
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Get the path of the record file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Set a label override for an endpoint
    pub async fn set_label<S: Into<String>>(&self, endpoint: EndpointId, label: S) -> Result<()> {
        let mut record = self.read_record().await?;
        record.settings.insert(label_key(endpoint), label.into());
        self.write_record(&record).await
    }

    async fn read_record(&self) -> Result<NodeRecord> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(NodeRecord::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_record(&self, record: &NodeRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let bytes = serde_json::to_vec_pretty(record)?;
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl NodeStore for JsonFileStore {
    async fn load_registry(&self) -> Result<RegistrySnapshot> {
        let record = self.read_record().await?;
        Ok(record.registry_snapshot())
    }

    async fn save_registry(&self, registry: &RegistrySnapshot) -> Result<()> {
        // Read-modify-write so settings written by other callers survive.
        let mut record = self.read_record().await?;
        record.set_registry(registry);
        self.write_record(&record).await
    }

    async fn label_override(&self, endpoint: EndpointId) -> Result<Option<String>> {
        let record = self.read_record().await?;
        Ok(record.settings.get(&label_key(endpoint)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_registry() -> RegistrySnapshot {
        let mut registry = RegistrySnapshot::new();
        registry.insert(EndpointId::new(1), Some(EndpointKind::Dimmer));
        registry.insert(EndpointId::new(2), Some(EndpointKind::Switch));
        registry.insert(EndpointId::new(5), None);
        registry
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        assert!(store.load_registry().await.unwrap().is_empty());

        let registry = sample_registry();
        store.save_registry(&registry).await.unwrap();
        assert_eq!(store.load_registry().await.unwrap(), registry);
    }

    #[tokio::test]
    async fn test_memory_store_labels() {
        let store = MemoryStore::new();
        assert_eq!(store.label_override(EndpointId::new(1)).await.unwrap(), None);

        store.set_label(EndpointId::new(1), "Kitchen spots").await;
        assert_eq!(
            store.label_override(EndpointId::new(1)).await.unwrap(),
            Some("Kitchen spots".to_string())
        );
        assert_eq!(store.label_override(EndpointId::new(2)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_store_simulated_failure() {
        let store = MemoryStore::new();
        let registry = sample_registry();
        store.save_registry(&registry).await.unwrap();

        store.set_fail_saves(true);
        assert!(store.save_registry(&RegistrySnapshot::new()).await.is_err());

        // The last successful save is what loads back.
        assert_eq!(store.load_registry().await.unwrap(), registry);
    }

    #[tokio::test]
    async fn test_json_file_store_round_trip() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("node.json"));

        // Missing file behaves as an empty record.
        assert!(store.load_registry().await.unwrap().is_empty());

        let registry = sample_registry();
        store.save_registry(&registry).await.unwrap();
        assert_eq!(store.load_registry().await.unwrap(), registry);

        // Reopening the file sees the same record.
        let reopened = JsonFileStore::new(store.path());
        assert_eq!(reopened.load_registry().await.unwrap(), registry);
    }

    #[tokio::test]
    async fn test_json_file_store_labels_survive_registry_saves() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("node.json"));

        store.set_label(EndpointId::new(3), "Hall light").await.unwrap();
        store.save_registry(&sample_registry()).await.unwrap();

        assert_eq!(
            store.label_override(EndpointId::new(3)).await.unwrap(),
            Some("Hall light".to_string())
        );
    }

    #[tokio::test]
    async fn test_json_file_store_record_layout() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("node.json"));

        store.save_registry(&sample_registry()).await.unwrap();
        store.set_label(EndpointId::new(1), "Spots").await.unwrap();

        let raw = tokio::fs::read_to_string(store.path()).await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["registry"]["1"], "dimmer");
        assert_eq!(json["registry"]["2"], "switch");
        assert_eq!(json["registry"]["5"], serde_json::Value::Null);
        assert_eq!(json["settings"]["label_ep1"], "Spots");
    }
}
