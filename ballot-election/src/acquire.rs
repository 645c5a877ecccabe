//! Claim-or-read acquisition of the election key.

use std::sync::Arc;
use tracing::debug;

use crate::backend::{Claim, ElectionBackend, LeaseId};
use crate::error::{ElectionError, Result};

/// Result of one acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquireResult {
    /// Whether this attempt created the key.
    pub acquired: bool,
    /// Who holds the key after the attempt.
    pub current_leader: String,
}

/// Attempts to claim the election key for one candidate.
///
/// Every attempt is a single transaction: write the key with the lease
/// attached if it does not exist, otherwise read it. This is the only path
/// that ever writes the key. Calling it while already holding the key is a
/// read that reconfirms leadership, so it is safe to run unconditionally on
/// every tick.
pub struct Acquirer {
    backend: Arc<dyn ElectionBackend>,
    key: String,
    identity: String,
}

impl Acquirer {
    /// Create an acquirer for `identity` on `key`.
    pub fn new(
        backend: Arc<dyn ElectionBackend>,
        key: impl Into<String>,
        identity: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            key: key.into(),
            identity: identity.into(),
        }
    }

    /// The election key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Claim the key with `lease`, or learn who holds it.
    pub async fn try_acquire(&self, lease: LeaseId) -> Result<AcquireResult> {
        match self.backend.put_if_absent(&self.key, &self.identity, lease).await? {
            Claim::Created => {
                debug!(key = %self.key, lease = %lease, "Claimed election key");
                Ok(AcquireResult {
                    acquired: true,
                    current_leader: self.identity.clone(),
                })
            }
            Claim::Existing(Some(leader)) => Ok(AcquireResult {
                acquired: false,
                current_leader: leader,
            }),
            Claim::Existing(None) => Err(ElectionError::InconsistentRead {
                key: self.key.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ChangeStream, MemoryBackend};
    use async_trait::async_trait;
    use futures::StreamExt;

    /// Backend whose claim transaction always loses the key in its read branch.
    struct VanishingKey;

    #[async_trait]
    impl ElectionBackend for VanishingKey {
        async fn grant_lease(&self, _ttl_secs: i64) -> Result<LeaseId> {
            Ok(LeaseId::new(1))
        }

        async fn renew_lease(&self, _lease: LeaseId) -> Result<()> {
            Ok(())
        }

        async fn revoke_lease(&self, _lease: LeaseId) -> Result<()> {
            Ok(())
        }

        async fn put_if_absent(&self, _key: &str, _value: &str, _lease: LeaseId) -> Result<Claim> {
            Ok(Claim::Existing(None))
        }

        async fn watch(&self, _key: &str) -> Result<ChangeStream> {
            Ok(futures::stream::pending().boxed())
        }
    }

    #[tokio::test]
    async fn test_first_claim_wins_and_holder_reconfirms() {
        let backend: Arc<dyn ElectionBackend> = Arc::new(MemoryBackend::new());
        let lease = backend.grant_lease(5).await.unwrap();
        let acquirer = Acquirer::new(backend.clone(), "/leader", "node-a");

        let first = acquirer.try_acquire(lease).await.unwrap();
        assert_eq!(
            first,
            AcquireResult {
                acquired: true,
                current_leader: "node-a".to_string()
            }
        );

        // Holder retrying is a read, not a rewrite
        let again = acquirer.try_acquire(lease).await.unwrap();
        assert!(!again.acquired);
        assert_eq!(again.current_leader, "node-a");
    }

    #[tokio::test]
    async fn test_follower_reads_leader() {
        let backend: Arc<dyn ElectionBackend> = Arc::new(MemoryBackend::new());
        let a = backend.grant_lease(5).await.unwrap();
        let b = backend.grant_lease(5).await.unwrap();

        Acquirer::new(backend.clone(), "/leader", "node-a")
            .try_acquire(a)
            .await
            .unwrap();
        let result = Acquirer::new(backend.clone(), "/leader", "node-b")
            .try_acquire(b)
            .await
            .unwrap();

        assert!(!result.acquired);
        assert_eq!(result.current_leader, "node-a");
    }

    #[tokio::test]
    async fn test_concurrent_claims_have_one_winner() {
        let backend: Arc<dyn ElectionBackend> = Arc::new(MemoryBackend::new());
        let mut handles = Vec::new();

        for i in 0..8 {
            let backend = backend.clone();
            handles.push(tokio::spawn(async move {
                let lease = backend.grant_lease(5).await.unwrap();
                Acquirer::new(backend, "/leader", format!("node-{}", i))
                    .try_acquire(lease)
                    .await
                    .unwrap()
            }));
        }

        let mut winners = Vec::new();
        let mut observed = Vec::new();
        for handle in handles {
            let result = handle.await.unwrap();
            if result.acquired {
                winners.push(result.current_leader.clone());
            }
            observed.push(result.current_leader);
        }

        assert_eq!(winners.len(), 1);
        assert!(observed.iter().all(|leader| leader == &winners[0]));
    }

    #[tokio::test]
    async fn test_missing_value_is_inconsistent_read() {
        let acquirer = Acquirer::new(Arc::new(VanishingKey), "/leader", "node-a");
        let err = acquirer.try_acquire(LeaseId::new(1)).await.unwrap_err();
        assert!(matches!(err, ElectionError::InconsistentRead { ref key } if key == "/leader"));
        assert!(err.is_transient());
    }
}
