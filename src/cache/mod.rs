//! Offline cache layer
//!
//! Versioned generations of response snapshots, served network-first or
//! cache-first, so the storefront keeps loading when connectivity drops.

pub mod disk;
pub mod errors;
pub mod events;
pub mod manager;
pub mod memory;
pub mod network;
pub mod store;
pub mod types;

pub use disk::DiskStorage;
pub use errors::{CacheError, NetworkError, StorageError};
pub use events::{EventOutcome, LifecycleEvent, Phase};
pub use manager::{CacheStats, CacheStatus, OfflineCacheManager};
pub use memory::MemoryStorage;
pub use network::{HttpNetwork, Network};
pub use store::CacheStorage;
pub use types::{CachedResponse, FetchRequest, RequestKey, RequestMode};
