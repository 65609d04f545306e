//! Offline Cache Manager
//!
//! Lifecycle state machine over a versioned generation store:
//!
//! - install: fetch the Seed Set and store it in the current generation,
//!   all-or-nothing
//! - activate: delete every generation other than the current one
//! - fetch: serve each request network-first or cache-first depending on
//!   its URL
//!
//! Responses are written back to the store by a single background writer
//! so the caller never waits on the store, and writes to a key land in the
//! order their fetches completed.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};

use super::errors::{CacheError, StorageError};
use super::events::{EventOutcome, LifecycleEvent, Phase};
use super::network::{resolve_url, Network};
use super::store::CacheStorage;
use super::types::{CachedResponse, FetchRequest, RequestKey};
use crate::config::CacheConfig;

/// Counters exposed through the gateway status command
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub network_fallbacks: u64,
    pub writes: u64,
    pub failed_writes: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    network_fallbacks: AtomicU64,
    writes: AtomicU64,
    failed_writes: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            network_fallbacks: self.network_fallbacks.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            failed_writes: self.failed_writes.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the manager
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub version: String,
    pub phase: Phase,
    pub skip_waiting: bool,
    pub clients_claimed: bool,
    pub generations: Vec<String>,
    pub stats: CacheStats,
}

enum WriteOp {
    Put {
        generation: String,
        key: RequestKey,
        response: CachedResponse,
    },
    Flush(oneshot::Sender<()>),
}

/// Serves intercepted requests from the current generation or the network
pub struct OfflineCacheManager {
    policy: CacheConfig,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    phase: Mutex<Phase>,
    skip_waiting: AtomicBool,
    clients_claimed: AtomicBool,
    counters: Arc<Counters>,
    writes: mpsc::UnboundedSender<WriteOp>,
}

impl OfflineCacheManager {
    /// Create a manager and start its background writer.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(policy: CacheConfig, storage: Arc<dyn CacheStorage>, network: Arc<dyn Network>) -> Self {
        let counters = Arc::new(Counters::default());
        let (writes, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(Arc::clone(&storage), rx, Arc::clone(&counters)));

        info!(
            version = %policy.version,
            seed = policy.seed.len(),
            network_first = ?policy.network_first,
            "Offline cache manager created"
        );

        Self {
            policy,
            storage,
            network,
            phase: Mutex::new(Phase::Parsed),
            skip_waiting: AtomicBool::new(false),
            clients_claimed: AtomicBool::new(false),
            counters,
            writes,
        }
    }

    pub fn version(&self) -> &str {
        &self.policy.version
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock().unwrap()
    }

    /// Handle one lifecycle event; the returned future settles when the phase is done
    pub async fn dispatch(&self, event: LifecycleEvent) -> Result<EventOutcome, CacheError> {
        trace!(event = event.name(), "Dispatching lifecycle event");
        match event {
            LifecycleEvent::Install => self
                .on_install()
                .await
                .map(|entries| EventOutcome::Installed { entries }),
            LifecycleEvent::Activate => self
                .on_activate()
                .await
                .map(|deleted| EventOutcome::Activated { deleted }),
            LifecycleEvent::Fetch(request) => Ok(EventOutcome::Response(self.on_fetch(request).await)),
        }
    }

    /// Move from one of `from` to `to`, or fail naming the current phase
    fn transition(&self, from: &[Phase], to: Phase, action: &'static str) -> Result<(), CacheError> {
        let mut phase = self.phase.lock().unwrap();
        if !from.contains(&*phase) {
            return Err(CacheError::InvalidPhase {
                action,
                phase: phase.as_str(),
            });
        }
        debug!(from = phase.as_str(), to = to.as_str(), "Phase transition");
        *phase = to;
        Ok(())
    }

    fn set_phase(&self, to: Phase) {
        *self.phase.lock().unwrap() = to;
    }

    /// Fetch every Seed Set URL and store it in the current generation.
    ///
    /// Nothing is written unless every fetch succeeded.
    pub async fn on_install(&self) -> Result<usize, CacheError> {
        self.transition(
            &[Phase::Parsed, Phase::Installed, Phase::Activated, Phase::Redundant],
            Phase::Installing,
            "install",
        )?;
        // Do not wait for older generations to stop serving before installing.
        self.skip_waiting.store(true, Ordering::Relaxed);

        info!(version = %self.policy.version, seed = self.policy.seed.len(), "Installing generation");

        match self.precache().await {
            Ok(entries) => {
                self.set_phase(Phase::Installed);
                info!(version = %self.policy.version, entries = entries, "Generation installed");
                Ok(entries)
            }
            Err(e) => {
                self.set_phase(Phase::Redundant);
                error!(version = %self.policy.version, error = %e, "Install failed");
                Err(e)
            }
        }
    }

    async fn precache(&self) -> Result<usize, CacheError> {
        let mut fetched = Vec::with_capacity(self.policy.seed.len());
        for url in &self.policy.seed {
            let request = FetchRequest::get(self.resolve(url));
            let response = self
                .network
                .fetch(&request)
                .await
                .map_err(|e| CacheError::InstallFailed {
                    url: request.url.clone(),
                    reason: e.to_string(),
                })?;
            if !(200..300).contains(&response.status) {
                return Err(CacheError::InstallFailed {
                    url: request.url.clone(),
                    reason: format!("HTTP {}", response.status),
                });
            }
            debug!(url = %request.url, size = response.body.len(), "Fetched seed entry");
            fetched.push((request.key(), response));
        }

        let generation = &self.policy.version;
        self.storage.open(generation).await?;
        let entries = fetched.len();
        for (key, response) in fetched {
            self.storage.put(generation, &key, response).await?;
        }
        Ok(entries)
    }

    /// Delete every generation whose name is not the current version, then claim clients.
    ///
    /// A fresh manager may activate a generation an earlier process installed
    /// into persistent storage.
    pub async fn on_activate(&self) -> Result<Vec<String>, CacheError> {
        let from: &[Phase] = if self.phase() == Phase::Parsed && self.has_current_generation().await? {
            debug!(version = %self.policy.version, "Current generation found in storage");
            &[Phase::Parsed, Phase::Installed, Phase::Activated]
        } else {
            &[Phase::Installed, Phase::Activated]
        };
        self.transition(from, Phase::Activating, "activate")?;

        match self.sweep().await {
            Ok(deleted) => {
                self.clients_claimed.store(true, Ordering::Relaxed);
                self.set_phase(Phase::Activated);
                info!(version = %self.policy.version, deleted = ?deleted, "Generation activated");
                Ok(deleted)
            }
            Err(e) => {
                self.set_phase(Phase::Installed);
                error!(version = %self.policy.version, error = %e, "Activation failed");
                Err(e.into())
            }
        }
    }

    async fn has_current_generation(&self) -> Result<bool, StorageError> {
        let generations = self.storage.list_generations().await?;
        Ok(generations.iter().any(|g| *g == self.policy.version))
    }

    async fn sweep(&self) -> Result<Vec<String>, StorageError> {
        let mut deleted = Vec::new();
        for generation in self.storage.list_generations().await? {
            if generation == self.policy.version {
                continue;
            }
            if self.storage.delete_generation(&generation).await? {
                debug!(generation = %generation, "Deleted superseded generation");
                deleted.push(generation);
            }
        }
        Ok(deleted)
    }

    /// Serve one intercepted request. `None` means no response is available.
    pub async fn on_fetch(&self, mut request: FetchRequest) -> Option<CachedResponse> {
        request.url = self.resolve(&request.url);
        if self.is_network_first(&request) {
            self.network_first(request).await
        } else {
            self.cache_first(request).await
        }
    }

    pub fn is_network_first(&self, request: &FetchRequest) -> bool {
        self.policy
            .network_first
            .iter()
            .any(|pattern| request.url.contains(pattern.as_str()))
    }

    async fn network_first(&self, request: FetchRequest) -> Option<CachedResponse> {
        let key = request.key();
        match self.network.fetch(&request).await {
            Ok(response) => {
                if !request.is_read_only() {
                    return Some(response);
                }
                let (live, copy) = response.fork();
                self.queue_write(key, copy);
                Some(live)
            }
            Err(e) => {
                self.counters.network_fallbacks.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, error = %e, "Network-first fetch failed, falling back to cache");
                self.lookup(&key).await
            }
        }
    }

    async fn cache_first(&self, request: FetchRequest) -> Option<CachedResponse> {
        let key = request.key();
        if let Some(hit) = self.lookup(&key).await {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Cache HIT");
            return Some(hit);
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        trace!(key = %key, "Cache MISS");

        match self.network.fetch(&request).await {
            Ok(response) => {
                if !response.is_cacheable() || !request.is_read_only() {
                    return Some(response);
                }
                let (live, copy) = response.fork();
                self.queue_write(key, copy);
                Some(live)
            }
            Err(e) => {
                self.counters.network_fallbacks.fetch_add(1, Ordering::Relaxed);
                if request.is_navigation() {
                    debug!(key = %key, error = %e, "Navigation offline, serving root document");
                    self.lookup(&self.root_document()).await
                } else {
                    debug!(key = %key, error = %e, "Fetch failed with no cached entry");
                    None
                }
            }
        }
    }

    /// Read from the current generation; store errors read as a miss
    async fn lookup(&self, key: &RequestKey) -> Option<CachedResponse> {
        match self.storage.get(&self.policy.version, key).await {
            Ok(found) => found,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache lookup failed");
                None
            }
        }
    }

    fn queue_write(&self, key: RequestKey, response: CachedResponse) {
        let op = WriteOp::Put {
            generation: self.policy.version.clone(),
            key,
            response,
        };
        if self.writes.send(op).is_err() {
            warn!("Cache writer has stopped, dropping write");
        }
    }

    /// Wait until every write queued so far has been applied
    pub async fn settle(&self) {
        let (tx, rx) = oneshot::channel();
        if self.writes.send(WriteOp::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    fn resolve(&self, url: &str) -> String {
        resolve_url(&self.policy.origin, url)
    }

    /// Key of the Seed Set's root document, served to offline navigations
    fn root_document(&self) -> RequestKey {
        let root = self.policy.seed.first().map(String::as_str).unwrap_or("/");
        RequestKey::get(&self.resolve(root))
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    pub async fn status(&self) -> Result<CacheStatus, StorageError> {
        Ok(CacheStatus {
            version: self.policy.version.clone(),
            phase: self.phase(),
            skip_waiting: self.skip_waiting.load(Ordering::Relaxed),
            clients_claimed: self.clients_claimed.load(Ordering::Relaxed),
            generations: self.storage.list_generations().await?,
            stats: self.stats(),
        })
    }
}

/// Apply queued writes in order. Failures are logged and dropped.
async fn write_loop(
    storage: Arc<dyn CacheStorage>,
    mut rx: mpsc::UnboundedReceiver<WriteOp>,
    counters: Arc<Counters>,
) {
    while let Some(op) = rx.recv().await {
        match op {
            WriteOp::Put {
                generation,
                key,
                response,
            } => {
                // No implicit open: a generation only comes into existence seeded, at install.
                match storage.put(&generation, &key, response).await {
                    Ok(()) => {
                        counters.writes.fetch_add(1, Ordering::Relaxed);
                        debug!(generation = %generation, key = %key, "Cached response");
                    }
                    Err(e) => {
                        counters.failed_writes.fetch_add(1, Ordering::Relaxed);
                        warn!(generation = %generation, key = %key, error = %e, "Background cache write failed");
                    }
                }
            }
            WriteOp::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Cache writer stopped");
}
