//! Integration tests for common Ballot workflows.
//!
//! These drive the facade crate the way an application would.

use ballot::prelude::*;
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn test_configs_round_trip_through_builders() {
    let etcd = EtcdConfig::builder()
        .endpoints_csv("10.0.0.1:2379, 10.0.0.2:2379")
        .timeout(Duration::from_secs(2))
        .build();
    assert_eq!(etcd.endpoints.len(), 2);
    assert!(etcd.validate().is_ok());

    let election = ElectionConfig::builder()
        .key("/orders/leader")
        .ttl_secs(8)
        .build();
    assert_eq!(election.tick_interval(), Duration::from_secs(2));
    assert!(election.validate().is_ok());
}

#[test]
fn test_invalid_configs_are_rejected() {
    assert!(EtcdConfig::default().validate().is_err());
    assert!(ElectionConfig::builder().ttl_secs(0).build().validate().is_err());
    assert!(ElectionConfig::new("").validate().is_err());
}

// =============================================================================
// Elections
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_leader_handoff_workflow() {
    let backend = MemoryBackend::new();
    let shared: Arc<dyn ElectionBackend> = Arc::new(backend.clone());

    let primary = Arc::new(
        LeaderElectionBuilder::new("/orders/leader")
            .with_name("orders-1")
            .with_ttl_secs(4)
            .resign_on_stop(true)
            .build(shared.clone()),
    );
    let standby = Arc::new(
        LeaderElectionBuilder::new("/orders/leader")
            .with_name("orders-2")
            .with_ttl_secs(4)
            .build(shared),
    );

    let primary_task = primary.spawn();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let standby_task = standby.spawn();

    let mut standby_view = standby.subscribe();
    standby_view
        .wait_for(|l| l.leader() == Some("orders-1"))
        .await
        .unwrap();
    assert!(primary.is_leader());
    assert!(!standby.is_leader());

    primary.stop();
    primary_task.await.unwrap().unwrap();

    standby_view.wait_for(|l| l.is_leader()).await.unwrap();
    assert_eq!(backend.get("/orders/leader").await.as_deref(), Some("orders-2"));

    standby.stop();
    standby_task.await.unwrap().unwrap();
    assert_eq!(standby.phase(), Phase::Stopped);
}

#[tokio::test]
async fn test_acquirer_and_lease_handle_directly() {
    let backend: Arc<dyn ElectionBackend> = Arc::new(MemoryBackend::new());

    let mut lease = LeaseHandle::new(backend.clone(), 5);
    let id = lease.grant().await.unwrap();

    let acquirer = Acquirer::new(backend.clone(), "/jobs/leader", "worker-1");
    let result = acquirer.try_acquire(id).await.unwrap();
    assert_eq!(
        result,
        AcquireResult {
            acquired: true,
            current_leader: "worker-1".to_string(),
        }
    );

    lease.renew().await.unwrap();
    lease.revoke().await.unwrap();

    let mut next = LeaseHandle::new(backend.clone(), 5);
    let other = next.grant().await.unwrap();
    let result = Acquirer::new(backend, "/jobs/leader", "worker-2")
        .try_acquire(other)
        .await
        .unwrap();
    assert!(result.acquired);
}
