/*!
 * Endpoint registry for MuxNode.
 *
 * The registry is the single source of truth for which endpoints exist on a
 * node and how they were classified. Entries are tri-state: an absent id has
 * never been seen, `None` marks an endpoint that is present but unsupported
 * (or demoted), and `Some(kind)` marks a classified endpoint.
 */
use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use muxnode_core::types::EndpointId;

use crate::endpoint::EndpointKind;
use crate::store::{NodeStore, RegistrySnapshot, Result};

/// Persisted mapping of endpoint id to classified kind
#[derive(Debug)]
pub struct EndpointRegistry {
    /// The registry entries, ascending by id
    entries: RwLock<BTreeMap<EndpointId, Option<EndpointKind>>>,
    /// The durable store backing this registry
    store: Arc<dyn NodeStore>,
}

impl EndpointRegistry {
    /// Create an empty registry backed by the given store
    pub fn new(store: Arc<dyn NodeStore>) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            store,
        }
    }

    /// Replace the in-memory entries with the persisted mapping
    pub async fn load(&self) -> Result<()> {
        let loaded = self.store.load_registry().await?;
        debug!("Loaded {} registry entries from store", loaded.len());
        *self.entries.write().await = loaded;
        Ok(())
    }

    /// Persist the current entries to the store
    pub async fn persist(&self) -> Result<()> {
        let snapshot = self.entries.read().await.clone();
        self.store.save_registry(&snapshot).await
    }

    /// Get the entry for an endpoint.
    ///
    /// `None` means the id has never been seen; `Some(None)` means present
    /// but unsupported; `Some(Some(kind))` means classified.
    pub async fn entry(&self, endpoint: EndpointId) -> Option<Option<EndpointKind>> {
        self.entries.read().await.get(&endpoint).copied()
    }

    /// Get the classified kind of an endpoint, if any
    pub async fn kind(&self, endpoint: EndpointId) -> Option<EndpointKind> {
        self.entries.read().await.get(&endpoint).copied().flatten()
    }

    /// Check whether an endpoint is classified
    pub async fn is_classified(&self, endpoint: EndpointId) -> bool {
        self.kind(endpoint).await.is_some()
    }

    /// Set the entry for an endpoint
    pub async fn set_entry(&self, endpoint: EndpointId, kind: Option<EndpointKind>) {
        self.entries.write().await.insert(endpoint, kind);
    }

    /// Remove the entry for an endpoint, returning whether it existed
    pub async fn remove(&self, endpoint: EndpointId) -> bool {
        self.entries.write().await.remove(&endpoint).is_some()
    }

    /// Remove every entry
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Get a snapshot of all entries, ascending by id
    pub async fn snapshot(&self) -> RegistrySnapshot {
        self.entries.read().await.clone()
    }

    /// Get every known endpoint id, ascending
    pub async fn ids(&self) -> Vec<EndpointId> {
        self.entries.read().await.keys().copied().collect()
    }

    /// Get the ids of every endpoint classified as the given kind, ascending
    pub async fn ids_of_kind(&self, kind: EndpointKind) -> Vec<EndpointId> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|(_, entry)| **entry == Some(kind))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Count the classified endpoints
    pub async fn classified_count(&self) -> usize {
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| entry.is_some())
            .count()
    }

    /// Count all entries, classified or not
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Check whether the registry has no entries
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn registry() -> EndpointRegistry {
        EndpointRegistry::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_tri_state_entries() {
        let registry = registry();

        // Never seen.
        assert_eq!(registry.entry(EndpointId::new(1)).await, None);

        // Present but unsupported.
        registry.set_entry(EndpointId::new(1), None).await;
        assert_eq!(registry.entry(EndpointId::new(1)).await, Some(None));
        assert!(!registry.is_classified(EndpointId::new(1)).await);

        // Classified.
        registry
            .set_entry(EndpointId::new(1), Some(EndpointKind::Dimmer))
            .await;
        assert_eq!(registry.kind(EndpointId::new(1)).await, Some(EndpointKind::Dimmer));
        assert!(registry.is_classified(EndpointId::new(1)).await);
    }

    #[tokio::test]
    async fn test_ids_of_kind_ascending() {
        let registry = registry();
        registry.set_entry(EndpointId::new(4), Some(EndpointKind::Dimmer)).await;
        registry.set_entry(EndpointId::new(2), Some(EndpointKind::Switch)).await;
        registry.set_entry(EndpointId::new(1), Some(EndpointKind::Dimmer)).await;
        registry.set_entry(EndpointId::new(3), None).await;

        let dimmers = registry.ids_of_kind(EndpointKind::Dimmer).await;
        assert_eq!(dimmers, vec![EndpointId::new(1), EndpointId::new(4)]);

        let ids = registry.ids().await;
        assert_eq!(
            ids,
            vec![
                EndpointId::new(1),
                EndpointId::new(2),
                EndpointId::new(3),
                EndpointId::new(4)
            ]
        );

        assert_eq!(registry.classified_count().await, 3);
        assert_eq!(registry.len().await, 4);
    }

    #[tokio::test]
    async fn test_persist_and_load() {
        let store = Arc::new(MemoryStore::new());
        let registry = EndpointRegistry::new(store.clone());
        registry.set_entry(EndpointId::new(1), Some(EndpointKind::Switch)).await;
        registry.set_entry(EndpointId::new(7), None).await;
        registry.persist().await.unwrap();

        let restored = EndpointRegistry::new(store);
        restored.load().await.unwrap();
        assert_eq!(restored.kind(EndpointId::new(1)).await, Some(EndpointKind::Switch));
        assert_eq!(restored.entry(EndpointId::new(7)).await, Some(None));
        assert_eq!(restored.len().await, 2);
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let registry = registry();
        registry.set_entry(EndpointId::new(1), Some(EndpointKind::Dimmer)).await;
        registry.set_entry(EndpointId::new(2), Some(EndpointKind::Switch)).await;

        assert!(registry.remove(EndpointId::new(1)).await);
        assert!(!registry.remove(EndpointId::new(1)).await);
        assert_eq!(registry.len().await, 1);

        registry.clear().await;
        assert!(registry.is_empty().await);
    }
}
