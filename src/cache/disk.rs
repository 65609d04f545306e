//! On-Disk Generation Store
//!
//! Persists generations across daemon restarts. Each generation is a
//! directory under the store root and each entry is one JSON snapshot
//! named by the SHA-1 of its request identity. Writes go through a temp
//! file and are persisted atomically, so a reader sees either the previous
//! snapshot or the new one.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tracing::{debug, info, warn};

use super::errors::StorageError;
use super::store::CacheStorage;
use super::types::{CachedResponse, RequestKey};

const ENTRY_EXTENSION: &str = "json";

/// Serialized form of one entry
#[derive(Debug, Serialize, Deserialize)]
struct EntryFile {
    key: RequestKey,
    status: u16,
    headers: Vec<(String, String)>,
    /// Body bytes, base64
    body: String,
}

/// Directory-backed store of named generations
#[derive(Clone)]
pub struct DiskStorage {
    root: Arc<PathBuf>,
}

impl DiskStorage {
    /// Store under the platform cache directory
    pub fn new() -> Result<Self, StorageError> {
        let root = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("storefront-daemon")
            .join("generations");
        Self::with_root(root)
    }

    /// Store under an explicit root directory
    pub fn with_root(root: PathBuf) -> Result<Self, StorageError> {
        fs::create_dir_all(&root)?;
        let store = Self {
            root: Arc::new(root),
        };
        store.cleanup();
        info!(root = %store.root.display(), "Disk generation store initialized");
        Ok(store)
    }

    /// Generation names are percent-encoded so the mapping to a directory
    /// name is reversible; `list_generations` decodes them back.
    fn generation_dir(&self, generation: &str) -> PathBuf {
        self.root.join(urlencoding::encode(generation).as_ref())
    }

    fn entry_path(&self, generation: &str, key: &RequestKey) -> PathBuf {
        let mut hasher = Sha1::new();
        hasher.update(key.method.as_bytes());
        hasher.update(b" ");
        hasher.update(key.url.as_bytes());
        let name = format!("{:x}.{}", hasher.finalize(), ENTRY_EXTENSION);
        self.generation_dir(generation).join(name)
    }

    /// Remove temp files left by interrupted writes
    pub fn cleanup(&self) {
        let Ok(generations) = fs::read_dir(self.root.as_path()) else {
            return;
        };
        for dir in generations.flatten() {
            let Ok(entries) = fs::read_dir(dir.path()) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().map_or(false, |ext| ext == "tmp") {
                    debug!(path = %path.display(), "Removing stale temp file");
                    let _ = fs::remove_file(&path);
                }
            }
        }
    }

    fn read_entry(path: &Path) -> Result<Option<EntryFile>, StorageError> {
        let contents = match fs::read(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice::<EntryFile>(&contents) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring corrupt cache entry");
                Ok(None)
            }
        }
    }

    fn decode(entry: EntryFile) -> Result<CachedResponse, StorageError> {
        let body = base64::engine::general_purpose::STANDARD
            .decode(entry.body.as_bytes())
            .map_err(|e| StorageError::Corrupt(format!("{}: {}", entry.key, e)))?;
        Ok(CachedResponse {
            status: entry.status,
            headers: entry.headers,
            body,
        })
    }

    fn write_entry(dir: &Path, path: &Path, entry: &EntryFile) -> Result<(), StorageError> {
        let data = serde_json::to_vec(entry)?;
        let mut tmp = tempfile::Builder::new()
            .suffix(".tmp")
            .tempfile_in(dir)?;
        tmp.write_all(&data)?;
        tmp.persist(path).map_err(|e| StorageError::Io(e.error))?;
        Ok(())
    }
}

async fn blocking<T, F>(f: F) -> Result<T, StorageError>
where
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StorageError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn open(&self, generation: &str) -> Result<(), StorageError> {
        let dir = self.generation_dir(generation);
        let name = generation.to_string();
        blocking(move || {
            if !dir.is_dir() {
                fs::create_dir_all(&dir)?;
                debug!(generation = %name, "Created generation directory");
            }
            Ok(())
        })
        .await
    }

    async fn get(
        &self,
        generation: &str,
        key: &RequestKey,
    ) -> Result<Option<CachedResponse>, StorageError> {
        let path = self.entry_path(generation, key);
        let expected = key.clone();
        blocking(move || match Self::read_entry(&path)? {
            // A hash collision would surface as a foreign key; treat it as a miss.
            Some(entry) if entry.key == expected => Self::decode(entry).map(Some),
            _ => Ok(None),
        })
        .await
    }

    async fn put(
        &self,
        generation: &str,
        key: &RequestKey,
        response: CachedResponse,
    ) -> Result<(), StorageError> {
        let dir = self.generation_dir(generation);
        let path = self.entry_path(generation, key);
        let name = generation.to_string();
        let entry = EntryFile {
            key: key.clone(),
            status: response.status,
            headers: response.headers,
            body: base64::engine::general_purpose::STANDARD.encode(&response.body),
        };
        blocking(move || {
            if !dir.is_dir() {
                return Err(StorageError::UnknownGeneration(name));
            }
            Self::write_entry(&dir, &path, &entry)?;
            debug!(generation = %name, key = %entry.key, "Stored entry on disk");
            Ok(())
        })
        .await
    }

    async fn list_generations(&self) -> Result<Vec<String>, StorageError> {
        let root = Arc::clone(&self.root);
        blocking(move || {
            let mut names = Vec::new();
            for dir in fs::read_dir(root.as_path())?.flatten() {
                if !dir.path().is_dir() {
                    continue;
                }
                let encoded = dir.file_name().to_string_lossy().into_owned();
                match urlencoding::decode(&encoded) {
                    Ok(name) => names.push(name.into_owned()),
                    Err(e) => warn!(dir = %encoded, error = %e, "Skipping undecodable generation directory"),
                }
            }
            names.sort();
            Ok(names)
        })
        .await
    }

    async fn delete_generation(&self, generation: &str) -> Result<bool, StorageError> {
        let dir = self.generation_dir(generation);
        let name = generation.to_string();
        blocking(move || {
            if !dir.is_dir() {
                return Ok(false);
            }
            fs::remove_dir_all(&dir)?;
            debug!(generation = %name, "Deleted generation directory");
            Ok(true)
        })
        .await
    }

    async fn keys(&self, generation: &str) -> Result<Vec<RequestKey>, StorageError> {
        let dir = self.generation_dir(generation);
        blocking(move || {
            let Ok(entries) = fs::read_dir(&dir) else {
                return Ok(Vec::new());
            };
            let mut keys = Vec::new();
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().map_or(true, |ext| ext != ENTRY_EXTENSION) {
                    continue;
                }
                if let Some(file) = Self::read_entry(&path)? {
                    keys.push(file.key);
                }
            }
            keys.sort_by(|a, b| a.url.cmp(&b.url));
            Ok(keys)
        })
        .await
    }
}
