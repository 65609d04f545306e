//! In-Memory Generation Store
//!
//! One Moka cache per generation. Entries carry no TTL or capacity bound:
//! they live until their generation is deleted during activation.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use moka::sync::Cache;
use tracing::{debug, trace};

use super::errors::StorageError;
use super::store::CacheStorage;
use super::types::{CachedResponse, RequestKey};

type Generation = Cache<RequestKey, CachedResponse>;

/// Process-local store of named generations
pub struct MemoryStorage {
    generations: RwLock<HashMap<String, Generation>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            generations: RwLock::new(HashMap::new()),
        }
    }

    fn generation(&self, name: &str) -> Option<Generation> {
        self.generations.read().unwrap().get(name).cloned()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, generation: &str) -> Result<(), StorageError> {
        let mut generations = self.generations.write().unwrap();
        if !generations.contains_key(generation) {
            let cache = Cache::builder()
                .name(&format!("generation_{}", generation))
                .build();
            generations.insert(generation.to_string(), cache);
            debug!(generation = generation, "Created generation");
        }
        Ok(())
    }

    async fn get(
        &self,
        generation: &str,
        key: &RequestKey,
    ) -> Result<Option<CachedResponse>, StorageError> {
        let found = self.generation(generation).and_then(|cache| cache.get(key));
        trace!(generation = generation, key = %key, hit = found.is_some(), "Memory lookup");
        Ok(found)
    }

    async fn put(
        &self,
        generation: &str,
        key: &RequestKey,
        response: CachedResponse,
    ) -> Result<(), StorageError> {
        let cache = self
            .generation(generation)
            .ok_or_else(|| StorageError::UnknownGeneration(generation.to_string()))?;
        cache.insert(key.clone(), response);
        trace!(generation = generation, key = %key, "Memory store");
        Ok(())
    }

    async fn list_generations(&self) -> Result<Vec<String>, StorageError> {
        let mut names: Vec<String> = self.generations.read().unwrap().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn delete_generation(&self, generation: &str) -> Result<bool, StorageError> {
        let removed = self.generations.write().unwrap().remove(generation);
        match removed {
            Some(cache) => {
                cache.invalidate_all();
                debug!(generation = generation, "Deleted generation");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn keys(&self, generation: &str) -> Result<Vec<RequestKey>, StorageError> {
        let cache = match self.generation(generation) {
            Some(cache) => cache,
            None => return Ok(Vec::new()),
        };
        let mut keys: Vec<RequestKey> = cache.iter().map(|(k, _)| (*k).clone()).collect();
        keys.sort_by(|a, b| a.url.cmp(&b.url));
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_requires_open_generation() {
        let store = MemoryStorage::new();
        let key = RequestKey::get("https://shop.test/");
        let err = store
            .put("v1", &key, CachedResponse::new(200, b"x".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::UnknownGeneration(_)));

        store.open("v1").await.unwrap();
        store
            .put("v1", &key, CachedResponse::new(200, b"x".to_vec()))
            .await
            .unwrap();
        assert_eq!(store.get("v1", &key).await.unwrap().unwrap().body, b"x");
    }

    #[tokio::test]
    async fn test_generations_are_isolated() {
        let store = MemoryStorage::new();
        let key = RequestKey::get("https://shop.test/app.css");
        store.open("v5").await.unwrap();
        store.open("v6").await.unwrap();
        store
            .put("v5", &key, CachedResponse::new(200, b"old".to_vec()))
            .await
            .unwrap();

        assert!(store.get("v6", &key).await.unwrap().is_none());
        assert_eq!(store.list_generations().await.unwrap(), vec!["v5", "v6"]);

        assert!(store.delete_generation("v5").await.unwrap());
        assert!(!store.delete_generation("v5").await.unwrap());
        assert!(store.get("v5", &key).await.unwrap().is_none());
        assert_eq!(store.list_generations().await.unwrap(), vec!["v6"]);
    }

    #[tokio::test]
    async fn test_reopen_keeps_entries() {
        let store = MemoryStorage::new();
        let key = RequestKey::get("https://shop.test/");
        store.open("v6").await.unwrap();
        store
            .put("v6", &key, CachedResponse::new(200, b"shell".to_vec()))
            .await
            .unwrap();
        store.open("v6").await.unwrap();
        assert_eq!(store.keys("v6").await.unwrap(), vec![key]);
    }
}
