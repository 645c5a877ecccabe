//! Lease-based Leader Election for Ballot
//!
//! Candidates compete for a single key in a lease-capable key-value store.
//! The first candidate to create the key, attached to its lease, is the
//! leader until the lease lapses; everyone else learns the winner from the
//! same transaction and from a watch on the key.
//!
//! ## Features
//!
//! - **Claim-or-read acquisition** - One transaction creates the key or reads the holder
//! - **Lease renewal** - Renewed every quarter of the TTL
//! - **Leader watch** - Local view follows `Put` and `Delete` on the key
//! - **Callbacks** - `on_elected` / `on_revoked` hooks
//! - **Backends** - etcd v3 and an in-memory store for tests
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ballot_election::*;
//! use ballot_etcd::{EtcdConfig, EtcdService};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let etcd = EtcdService::connect(EtcdConfig::new(["127.0.0.1:2379"])).await?;
//!
//!     let election = Arc::new(
//!         LeaderElection::builder("/my-service/leader")
//!             .with_ttl_secs(6)
//!             .on_elected(|| async {
//!                 println!("I am the leader!");
//!             })
//!             .on_revoked(|| async {
//!                 println!("I lost leadership");
//!             })
//!             .build(Arc::new(EtcdBackend::new(etcd))),
//!     );
//!
//!     let task = election.spawn();
//!
//!     if election.is_leader() {
//!         println!("This node is the leader");
//!     }
//!
//!     election.stop();
//!     task.await??;
//!     Ok(())
//! }
//! ```

pub mod acquire;
pub mod backend;
pub mod config;
pub mod error;
pub mod leader;
pub mod lease;
mod signal;
pub mod state;
mod watch;

pub use acquire::{AcquireResult, Acquirer};
pub use backend::{
    ChangeEvent, ChangeStream, Claim, ElectionBackend, EtcdBackend, LeaseId, MemoryBackend,
};
pub use config::{ElectionConfig, ElectionConfigBuilder};
pub use error::{ElectionError, ErrorClass, Result};
pub use leader::{LeaderElection, LeaderElectionBuilder, Phase};
pub use lease::LeaseHandle;
pub use state::{LeaderCallback, Leadership};
