//! Lease handle owned by one election.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backend::{ElectionBackend, LeaseId};
use crate::error::{ElectionError, Result};

/// Wraps the single backend lease an election claims its key with.
///
/// The handle forgets its lease as soon as the backend reports it expired;
/// [`LeaseHandle::ensure`] then grants a replacement, since a reclaimed lease
/// can never be attached to a new claim.
pub struct LeaseHandle {
    backend: Arc<dyn ElectionBackend>,
    ttl_secs: i64,
    id: Option<LeaseId>,
}

impl LeaseHandle {
    /// Create a handle that has not granted anything yet.
    pub fn new(backend: Arc<dyn ElectionBackend>, ttl_secs: i64) -> Self {
        Self {
            backend,
            ttl_secs,
            id: None,
        }
    }

    /// The lease currently held, if any.
    pub fn id(&self) -> Option<LeaseId> {
        self.id
    }

    /// Grant a new lease, replacing any lease held before.
    pub async fn grant(&mut self) -> Result<LeaseId> {
        let id = self.backend.grant_lease(self.ttl_secs).await?;
        info!(lease = %id, ttl = self.ttl_secs, "Lease granted");
        self.id = Some(id);
        Ok(id)
    }

    /// Return the held lease, granting one if there is none.
    pub async fn ensure(&mut self) -> Result<LeaseId> {
        match self.id {
            Some(id) => Ok(id),
            None => self.grant().await,
        }
    }

    /// Renew the held lease once. Nothing to do when no lease is held.
    pub async fn renew(&mut self) -> Result<()> {
        let Some(id) = self.id else {
            return Ok(());
        };

        match self.backend.renew_lease(id).await {
            Ok(()) => {
                debug!(lease = %id, "Lease renewed");
                Ok(())
            }
            Err(ElectionError::LeaseExpired(_)) => {
                warn!(lease = %id, "Lease expired before renewal");
                self.id = None;
                Err(ElectionError::LeaseExpired(id))
            }
            Err(e) => Err(e),
        }
    }

    /// Drop the held lease without telling the backend.
    pub fn forget(&mut self) {
        self.id = None;
    }

    /// Revoke the held lease, deleting any key attached to it.
    pub async fn revoke(&mut self) -> Result<()> {
        let Some(id) = self.id.take() else {
            return Ok(());
        };
        self.backend.revoke_lease(id).await?;
        info!(lease = %id, "Lease revoked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    #[tokio::test]
    async fn test_grant_and_renew() {
        let backend = MemoryBackend::new();
        let mut lease = LeaseHandle::new(Arc::new(backend.clone()), 5);

        assert_eq!(lease.id(), None);
        let id = lease.grant().await.unwrap();
        assert_eq!(lease.id(), Some(id));
        assert_eq!(lease.ensure().await.unwrap(), id);
        lease.renew().await.unwrap();
        assert_eq!(backend.lease_count().await, 1);
    }

    #[tokio::test]
    async fn test_expired_lease_is_forgotten_and_replaced() {
        let backend = MemoryBackend::new();
        let mut lease = LeaseHandle::new(Arc::new(backend.clone()), 5);
        let first = lease.grant().await.unwrap();

        backend.expire_lease(first).await;
        let err = lease.renew().await.unwrap_err();
        assert!(matches!(err, ElectionError::LeaseExpired(id) if id == first));
        assert_eq!(lease.id(), None);

        let second = lease.ensure().await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_invalid_ttl() {
        let mut lease = LeaseHandle::new(Arc::new(MemoryBackend::new()), 0);
        assert!(matches!(
            lease.grant().await,
            Err(ElectionError::BackendRejected(_))
        ));
        assert_eq!(lease.id(), None);
    }

    #[tokio::test]
    async fn test_revoke() {
        let backend = MemoryBackend::new();
        let mut lease = LeaseHandle::new(Arc::new(backend.clone()), 5);
        lease.grant().await.unwrap();

        lease.revoke().await.unwrap();
        assert_eq!(lease.id(), None);
        assert_eq!(backend.lease_count().await, 0);

        // Revoking with nothing held is a no-op
        lease.revoke().await.unwrap();
    }
}
