//! Generation Store Interface
//!
//! The named-generation key-value service the cache manager is built on.
//! Implementations must provide atomic per-key `get`/`put`; no cross-key
//! transactions are required.

use async_trait::async_trait;

use super::errors::StorageError;
use super::types::{CachedResponse, RequestKey};

#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open a generation, creating it empty if absent
    async fn open(&self, generation: &str) -> Result<(), StorageError>;

    /// Look up an entry. A missing generation reads as a miss.
    async fn get(
        &self,
        generation: &str,
        key: &RequestKey,
    ) -> Result<Option<CachedResponse>, StorageError>;

    /// Store an entry, overwriting any previous one under the same key
    async fn put(
        &self,
        generation: &str,
        key: &RequestKey,
        response: CachedResponse,
    ) -> Result<(), StorageError>;

    /// Names of all existing generations, sorted
    async fn list_generations(&self) -> Result<Vec<String>, StorageError>;

    /// Delete a generation and all its entries.
    ///
    /// Returns false if it did not exist.
    async fn delete_generation(&self, generation: &str) -> Result<bool, StorageError>;

    /// Keys currently stored in a generation
    async fn keys(&self, generation: &str) -> Result<Vec<RequestKey>, StorageError>;
}
