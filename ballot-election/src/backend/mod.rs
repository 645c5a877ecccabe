//! Backing store contract for elections.
//!
//! An election needs four things from its store: TTL-bound leases, an atomic
//! claim-or-read transaction on a single key, lease renewal, and an ordered
//! stream of changes to that key. [`ElectionBackend`] captures exactly that,
//! with [`EtcdBackend`] for production and [`MemoryBackend`] for tests.

mod etcd;
mod memory;

pub use etcd::EtcdBackend;
pub use memory::MemoryBackend;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ElectionError, Result};

/// Identifier of a backend lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaseId(i64);

impl LeaseId {
    /// Wrap a raw lease id.
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// The raw lease id.
    pub const fn get(self) -> i64 {
        self.0
    }
}

// etcdctl prints lease ids in hex
impl fmt::Display for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// Outcome of the claim-or-read transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// The key was absent and now holds our value, attached to our lease.
    Created,
    /// The key already existed; carries the value read in the same transaction.
    /// `None` means the read branch found nothing.
    Existing(Option<String>),
}

/// A change to the watched key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// The key was written.
    Put { value: String },
    /// The key was removed, either explicitly or by lease expiry.
    Delete,
}

/// Stream of changes to one key; dropping it cancels the subscription.
pub type ChangeStream = BoxStream<'static, Result<ChangeEvent>>;

/// Lease-capable key-value store operations used by an election.
#[async_trait]
pub trait ElectionBackend: Send + Sync {
    /// Grant a lease that lives for `ttl_secs` unless renewed.
    async fn grant_lease(&self, ttl_secs: i64) -> Result<LeaseId>;

    /// Renew a lease once. Fails with [`ElectionError::LeaseExpired`] if the
    /// store no longer knows it.
    async fn renew_lease(&self, lease: LeaseId) -> Result<()>;

    /// Revoke a lease, deleting every key attached to it.
    async fn revoke_lease(&self, lease: LeaseId) -> Result<()>;

    /// Write `key = value` with `lease` attached if the key does not exist,
    /// otherwise read its current value, as one atomic transaction.
    async fn put_if_absent(&self, key: &str, value: &str, lease: LeaseId) -> Result<Claim>;

    /// Subscribe to changes of `key`, in the order the store applies them.
    async fn watch(&self, key: &str) -> Result<ChangeStream>;
}

pub(crate) fn invalid_ttl(ttl_secs: i64) -> ElectionError {
    ElectionError::BackendRejected(format!("lease TTL must be positive, got {}", ttl_secs))
}
