// Ballot - lease-based leader election over etcd
//
// Facade over the workspace crates: the etcd connection layer and the
// election core, plus the logging setup used by the `ballot` binary.

pub use ballot_election;
pub use ballot_etcd;

pub mod logging;

pub use ballot_election::{
    ElectionConfig, ElectionError, EtcdBackend, LeaderElection, LeaderElectionBuilder, Leadership,
    MemoryBackend, Phase,
};
pub use ballot_etcd::{EtcdConfig, EtcdError, EtcdService};

/// Common imports for election participants.
pub mod prelude {
    pub use ballot_election::{
        AcquireResult, Acquirer, ChangeEvent, Claim, ElectionBackend, ElectionConfig,
        ElectionError, ErrorClass, EtcdBackend, LeaderCallback, LeaderElection,
        LeaderElectionBuilder, Leadership, LeaseHandle, LeaseId, MemoryBackend, Phase,
    };
    pub use ballot_etcd::{EtcdConfig, EtcdConfigBuilder, EtcdError, EtcdService};
}
