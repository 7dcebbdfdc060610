//! In-memory blob store for testing (HashMap-backed)

use super::{BlobStore, BlobStoreError};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone)]
struct StoredObject {
    data: Bytes,
    content_type: String,
}

/// Blob store that keeps objects in memory for testing
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
    /// Simulate errors if true
    simulate_get_failure: Arc<RwLock<bool>>,
    simulate_put_failure: Arc<RwLock<bool>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable get failure simulation for testing
    pub fn set_get_failure(&self, enabled: bool) {
        *self.simulate_get_failure.write() = enabled;
    }

    /// Enable put failure simulation for testing
    pub fn set_put_failure(&self, enabled: bool) {
        *self.simulate_put_failure.write() = enabled;
    }

    /// Get number of stored objects
    pub fn object_count(&self) -> usize {
        self.objects.read().len()
    }

    /// Whether an object exists under the given key
    pub fn contains(&self, key: &str) -> bool {
        self.objects.read().contains_key(key)
    }

    /// Content type recorded for a key, if present
    pub fn content_type_of(&self, key: &str) -> Option<String> {
        self.objects.read().get(key).map(|o| o.content_type.clone())
    }

    /// Keys currently stored, in arbitrary order
    pub fn keys(&self) -> Vec<String> {
        self.objects.read().keys().cloned().collect()
    }

    /// Clear all stored objects
    pub fn clear(&self) {
        self.objects.write().clear();
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), BlobStoreError> {
        if *self.simulate_put_failure.read() {
            return Err(BlobStoreError::Backend(
                "Simulated put failure".to_string(),
            ));
        }

        self.objects.write().insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, BlobStoreError> {
        if *self.simulate_get_failure.read() {
            return Err(BlobStoreError::Backend(
                "Simulated get failure".to_string(),
            ));
        }

        self.objects
            .read()
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| BlobStoreError::NotFound(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_then_get_round_trip() {
        let store = MemoryBlobStore::new();

        store
            .put("raw/a.png", Bytes::from_static(b"pixels"), "image/png")
            .await
            .unwrap();

        let data = store.get("raw/a.png").await.unwrap();
        assert_eq!(&data[..], b"pixels");
        assert_eq!(store.content_type_of("raw/a.png").as_deref(), Some("image/png"));
        assert_eq!(store.object_count(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_key_is_not_found() {
        let store = MemoryBlobStore::new();

        let err = store.get("raw/missing.png").await.unwrap_err();
        assert!(matches!(err, BlobStoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_simulated_failures() {
        let store = MemoryBlobStore::new();
        store
            .put("k", Bytes::from_static(b"v"), "image/jpeg")
            .await
            .unwrap();

        store.set_get_failure(true);
        assert!(matches!(
            store.get("k").await,
            Err(BlobStoreError::Backend(_))
        ));

        store.set_get_failure(false);
        assert!(store.get("k").await.is_ok());

        store.set_put_failure(true);
        assert!(store
            .put("k2", Bytes::from_static(b"v"), "image/jpeg")
            .await
            .is_err());
        assert!(!store.contains("k2"));
    }
}
