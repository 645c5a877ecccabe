//! In-memory election backend (for testing)

use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

use super::{ChangeEvent, ChangeStream, Claim, ElectionBackend, LeaseId, invalid_ttl};
use crate::error::{ElectionError, Result};

struct Lease {
    ttl: Duration,
    deadline: Instant,
}

struct Entry {
    value: String,
    lease: Option<LeaseId>,
}

struct Watcher {
    key: String,
    tx: mpsc::UnboundedSender<Result<ChangeEvent>>,
}

struct Store {
    available: bool,
    next_lease: i64,
    leases: HashMap<LeaseId, Lease>,
    keys: HashMap<String, Entry>,
    watchers: Vec<Watcher>,
}

impl Store {
    fn check_available(&self) -> Result<()> {
        if self.available {
            Ok(())
        } else {
            Err(ElectionError::BackendUnavailable(
                "memory backend is offline".to_string(),
            ))
        }
    }

    /// Drop leases whose deadline passed, along with their keys.
    fn reap(&mut self) {
        let now = Instant::now();
        let expired: Vec<LeaseId> = self
            .leases
            .iter()
            .filter(|(_, lease)| lease.deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            debug!(lease = %id, "Memory lease expired");
            self.drop_lease(id);
        }
    }

    fn drop_lease(&mut self, id: LeaseId) -> bool {
        if self.leases.remove(&id).is_none() {
            return false;
        }

        let attached: Vec<String> = self
            .keys
            .iter()
            .filter(|(_, entry)| entry.lease == Some(id))
            .map(|(key, _)| key.clone())
            .collect();

        for key in attached {
            self.keys.remove(&key);
            self.notify(&key, ChangeEvent::Delete);
        }
        true
    }

    fn notify(&mut self, key: &str, event: ChangeEvent) {
        self.watchers.retain(|w| {
            if w.key == key {
                w.tx.send(Ok(event.clone())).is_ok()
            } else {
                !w.tx.is_closed()
            }
        });
    }
}

/// In-memory lease-capable key-value store (for testing/development)
///
/// Lease deadlines follow `tokio::time`, so tests running with paused time
/// control expiry exactly. Expired leases are reaped at the start of every
/// operation, or explicitly through [`MemoryBackend::reap`].
#[derive(Clone)]
pub struct MemoryBackend {
    store: Arc<Mutex<Store>>,
}

impl MemoryBackend {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(Mutex::new(Store {
                available: true,
                next_lease: 0x7a00,
                leases: HashMap::new(),
                keys: HashMap::new(),
                watchers: Vec::new(),
            })),
        }
    }

    /// Take the store offline or bring it back.
    ///
    /// Going offline fails every open watch with `BackendUnavailable` and makes
    /// every call fail until the store is back online. Leases keep ticking.
    pub async fn set_available(&self, available: bool) {
        let mut store = self.store.lock().await;
        store.available = available;
        if !available {
            for watcher in store.watchers.drain(..) {
                let _ = watcher.tx.send(Err(ElectionError::BackendUnavailable(
                    "memory backend went offline".to_string(),
                )));
            }
        }
    }

    /// Drop a lease as if it had timed out, deleting its keys.
    pub async fn expire_lease(&self, lease: LeaseId) -> bool {
        self.store.lock().await.drop_lease(lease)
    }

    /// Delete a key regardless of its lease.
    pub async fn delete(&self, key: &str) -> bool {
        let mut store = self.store.lock().await;
        if store.keys.remove(key).is_some() {
            store.notify(key, ChangeEvent::Delete);
            true
        } else {
            false
        }
    }

    /// Read a key.
    pub async fn get(&self, key: &str) -> Option<String> {
        let mut store = self.store.lock().await;
        store.reap();
        store.keys.get(key).map(|e| e.value.clone())
    }

    /// Lease attached to a key.
    pub async fn lease_of(&self, key: &str) -> Option<LeaseId> {
        let mut store = self.store.lock().await;
        store.reap();
        store.keys.get(key).and_then(|e| e.lease)
    }

    /// Number of live leases.
    pub async fn lease_count(&self) -> usize {
        let mut store = self.store.lock().await;
        store.reap();
        store.leases.len()
    }

    /// Number of open watch subscriptions.
    pub async fn watcher_count(&self) -> usize {
        let mut store = self.store.lock().await;
        store.watchers.retain(|w| !w.tx.is_closed());
        store.watchers.len()
    }

    /// Expire overdue leases now.
    pub async fn reap(&self) {
        self.store.lock().await.reap();
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ElectionBackend for MemoryBackend {
    async fn grant_lease(&self, ttl_secs: i64) -> Result<LeaseId> {
        let mut store = self.store.lock().await;
        store.check_available()?;
        if ttl_secs <= 0 {
            return Err(invalid_ttl(ttl_secs));
        }
        store.reap();

        store.next_lease += 1;
        let id = LeaseId::new(store.next_lease);
        let ttl = Duration::from_secs(ttl_secs as u64);
        store.leases.insert(
            id,
            Lease {
                ttl,
                deadline: Instant::now() + ttl,
            },
        );
        Ok(id)
    }

    async fn renew_lease(&self, lease: LeaseId) -> Result<()> {
        let mut store = self.store.lock().await;
        store.check_available()?;
        store.reap();

        match store.leases.get_mut(&lease) {
            Some(entry) => {
                entry.deadline = Instant::now() + entry.ttl;
                Ok(())
            }
            None => Err(ElectionError::LeaseExpired(lease)),
        }
    }

    async fn revoke_lease(&self, lease: LeaseId) -> Result<()> {
        let mut store = self.store.lock().await;
        store.check_available()?;
        store.reap();
        store.drop_lease(lease);
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: &str, lease: LeaseId) -> Result<Claim> {
        let mut store = self.store.lock().await;
        store.check_available()?;
        store.reap();

        if let Some(entry) = store.keys.get(key) {
            return Ok(Claim::Existing(Some(entry.value.clone())));
        }

        // Like etcd, the lease is only checked on the branch that writes
        if !store.leases.contains_key(&lease) {
            return Err(ElectionError::LeaseExpired(lease));
        }

        store.keys.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                lease: Some(lease),
            },
        );
        store.notify(
            key,
            ChangeEvent::Put {
                value: value.to_string(),
            },
        );
        Ok(Claim::Created)
    }

    async fn watch(&self, key: &str) -> Result<ChangeStream> {
        let mut store = self.store.lock().await;
        store.check_available()?;

        let (tx, rx) = mpsc::unbounded_channel();
        store.watchers.push(Watcher {
            key: key.to_string(),
            tx,
        });
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}
