//! Lease-based leader election coordinator

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::acquire::Acquirer;
use crate::backend::ElectionBackend;
use crate::config::ElectionConfig;
use crate::error::{ElectionError, Result};
use crate::lease::LeaseHandle;
use crate::signal::StopSignal;
use crate::state::{ElectionState, LeaderCallback, Leadership, LeadershipTracker};
use crate::watch::{Backoff, WatchFeed};

/// Lifecycle phase of a [`LeaderElection`]. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    /// Constructed, not started.
    Idle = 0,
    /// Started; the loop runs until stopped.
    Running = 1,
    /// Asked to stop; the loop is finishing its current tick.
    Stopping = 2,
    /// Loop exited, watch released. Terminal.
    Stopped = 3,
}

impl Phase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Phase::Idle,
            1 => Phase::Running,
            2 => Phase::Stopping,
            _ => Phase::Stopped,
        }
    }
}

/// Leader election coordinator
///
/// Every tick (a quarter of the lease TTL) the coordinator runs the
/// claim-or-read transaction and then renews its lease, while a watch feed
/// keeps the local view of the leader current in between. Per-tick failures
/// are logged and retried on the next tick; only a failure to start is
/// reported to the caller.
pub struct LeaderElection {
    name: String,
    config: ElectionConfig,
    backend: Arc<dyn ElectionBackend>,
    tracker: Arc<LeadershipTracker>,
    phase: AtomicU8,
    stop: StopSignal,
}

impl LeaderElection {
    /// Create a coordinator for candidate `name`.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// use ballot_election::{ElectionConfig, LeaderElection, MemoryBackend};
    /// use std::sync::Arc;
    ///
    /// let election = LeaderElection::new(
    ///     Arc::new(MemoryBackend::new()),
    ///     ElectionConfig::new("/my-service/leader"),
    ///     "node-1",
    /// );
    /// ```
    pub fn new(
        backend: Arc<dyn ElectionBackend>,
        config: ElectionConfig,
        name: impl Into<String>,
    ) -> Self {
        Self::with_callbacks(backend, config, name.into(), None, None)
    }

    fn with_callbacks(
        backend: Arc<dyn ElectionBackend>,
        config: ElectionConfig,
        name: String,
        on_elected: Option<LeaderCallback>,
        on_revoked: Option<LeaderCallback>,
    ) -> Self {
        let tracker = LeadershipTracker::new(
            ElectionState::new(name.clone()),
            config.key.clone(),
            on_elected,
            on_revoked,
        );

        Self {
            name,
            config,
            backend,
            tracker: Arc::new(tracker),
            phase: AtomicU8::new(Phase::Idle as u8),
            stop: StopSignal::new(),
        }
    }

    /// Create a builder for `key`.
    pub fn builder(key: impl Into<String>) -> LeaderElectionBuilder {
        LeaderElectionBuilder::new(key)
    }

    /// This candidate's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The election key.
    pub fn key(&self) -> &str {
        &self.config.key
    }

    /// The configuration.
    pub fn config(&self) -> &ElectionConfig {
        &self.config
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Check if this candidate is the leader, as last observed.
    pub fn is_leader(&self) -> bool {
        self.tracker.snapshot().is_leader()
    }

    /// Name of the current leader, as last observed.
    pub fn current_leader(&self) -> Option<String> {
        self.tracker.snapshot().leader().map(str::to_string)
    }

    /// Current leadership snapshot.
    pub fn leadership(&self) -> Leadership {
        self.tracker.snapshot()
    }

    /// Receive every change of the leadership snapshot.
    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<Leadership> {
        self.tracker.subscribe()
    }

    /// Run the election on a new task.
    ///
    /// The coordinator is `Running` when this returns, so a following
    /// [`LeaderElection::stop`] always reaches the loop.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<Result<()>> {
        let started = self.enter_running();
        let election = self.clone();
        tokio::spawn(async move {
            started?;
            election.run().await
        })
    }

    /// Participate in the election until [`LeaderElection::stop`] is called.
    ///
    /// Fails only before the loop starts: on invalid configuration, when
    /// already started, or when the initial lease cannot be granted.
    pub async fn start(&self) -> Result<()> {
        self.enter_running()?;
        self.run().await
    }

    fn enter_running(&self) -> Result<()> {
        if self.advance(Phase::Idle, Phase::Running) {
            Ok(())
        } else {
            Err(ElectionError::AlreadyStarted)
        }
    }

    fn advance(&self, from: Phase, to: Phase) -> bool {
        self.phase
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    async fn run(&self) -> Result<()> {
        if self.stop.is_triggered() {
            debug!(candidate = %self.name, "Stopped before joining the election");
            self.phase.store(Phase::Stopped as u8, Ordering::Release);
            return Ok(());
        }

        let mut lease = LeaseHandle::new(self.backend.clone(), self.config.ttl_secs);
        let granted = match self.config.validate() {
            Ok(()) => self.bounded(lease.grant()).await,
            Err(e) => Err(e),
        };
        if let Err(e) = granted {
            error!(
                candidate = %self.name,
                key = %self.config.key,
                error = %e,
                "Election failed to start"
            );
            self.phase.store(Phase::Stopped as u8, Ordering::Release);
            return Err(e);
        }

        info!(
            candidate = %self.name,
            key = %self.config.key,
            ttl = self.config.ttl_secs,
            "Starting leader election"
        );

        let feed = WatchFeed::new(
            self.backend.clone(),
            self.config.key.clone(),
            self.tracker.clone(),
            Backoff::new(self.config.watch_backoff_initial, self.config.watch_backoff_max),
        )
        .spawn(self.stop.listener());

        let acquirer = Acquirer::new(
            self.backend.clone(),
            self.config.key.clone(),
            self.name.clone(),
        );
        let mut stop = self.stop.listener();
        let mut ticker = tokio::time::interval(self.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = stop.stopped() => break,
                _ = ticker.tick() => {}
            }
            self.tick(&acquirer, &mut lease).await;
        }

        info!(candidate = %self.name, "Stop signal received");

        if self.config.resign_on_stop
            && let Err(e) = self.bounded(lease.revoke()).await
        {
            warn!(candidate = %self.name, error = %e, "Failed to resign leadership");
        }

        if let Err(e) = feed.await {
            warn!(candidate = %self.name, error = %e, "Watch feed task failed");
        }

        self.tracker.vacancy_observed().await;
        self.phase.store(Phase::Stopped as u8, Ordering::Release);
        info!(candidate = %self.name, key = %self.config.key, "Leader election stopped");
        Ok(())
    }

    /// Stop participating. The loop exits within one tick, after which the
    /// phase is [`Phase::Stopped`]; calling this again, or before the
    /// election was started, does nothing.
    pub fn stop(&self) {
        if self.advance(Phase::Running, Phase::Stopping) && self.stop.trigger() {
            debug!(candidate = %self.name, "Stop signal sent");
        }
    }

    /// One acquire-then-renew cycle. Errors are contained here.
    async fn tick(&self, acquirer: &Acquirer, lease: &mut LeaseHandle) {
        let id = match self.bounded(lease.ensure()).await {
            Ok(id) => id,
            Err(e) => {
                warn!(candidate = %self.name, error = %e, "No lease for this tick");
                return;
            }
        };

        match self.bounded(acquirer.try_acquire(id)).await {
            Ok(result) => {
                if result.acquired {
                    info!(
                        candidate = %self.name,
                        key = %self.config.key,
                        lease = %id,
                        "Claimed leadership"
                    );
                } else {
                    debug!(
                        candidate = %self.name,
                        leader = %result.current_leader,
                        "Leader confirmed"
                    );
                }
                self.tracker.leader_observed(&result.current_leader).await;
            }
            Err(ElectionError::LeaseExpired(_)) => {
                // A fresh lease is granted on the next tick
                warn!(candidate = %self.name, lease = %id, "Lease gone before claim");
                lease.forget();
                return;
            }
            Err(e) => {
                warn!(
                    candidate = %self.name,
                    key = %self.config.key,
                    error = %e,
                    "Acquisition attempt failed"
                );
            }
        }

        if let Err(e) = self.bounded(lease.renew()).await {
            warn!(candidate = %self.name, lease = %id, error = %e, "Lease renewal failed");
        }
    }

    async fn bounded<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        let limit = self.config.operation_timeout;
        tokio::time::timeout(limit, call)
            .await
            .map_err(|_| ElectionError::Timeout(limit))?
    }
}

/// Leader election builder
pub struct LeaderElectionBuilder {
    config: ElectionConfig,
    name: Option<String>,
    on_elected: Option<LeaderCallback>,
    on_revoked: Option<LeaderCallback>,
}

impl LeaderElectionBuilder {
    /// Create new builder
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            config: ElectionConfig::new(key),
            name: None,
            on_elected: None,
            on_revoked: None,
        }
    }

    /// Replace the whole configuration, key included
    pub fn with_config(mut self, config: ElectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set lease TTL in seconds
    pub fn with_ttl_secs(mut self, ttl_secs: i64) -> Self {
        self.config.ttl_secs = ttl_secs;
        self
    }

    /// Set candidate name (defaults to a random UUID)
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Revoke the lease when stopping
    pub fn resign_on_stop(mut self, resign: bool) -> Self {
        self.config.resign_on_stop = resign;
        self
    }

    /// Set elected callback
    pub fn on_elected<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_elected = Some(Arc::new(move || Box::pin(callback())));
        self
    }

    /// Set revoked callback
    pub fn on_revoked<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_revoked = Some(Arc::new(move || Box::pin(callback())));
        self
    }

    /// Build the coordinator
    pub fn build(self, backend: Arc<dyn ElectionBackend>) -> LeaderElection {
        let name = self.name.unwrap_or_else(|| Uuid::new_v4().to_string());
        LeaderElection::with_callbacks(backend, self.config, name, self.on_elected, self.on_revoked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use std::time::Duration;

    #[test]
    fn test_leader_election_builder() {
        let builder = LeaderElectionBuilder::new("test-leader")
            .with_ttl_secs(60)
            .with_name("node-1");

        assert_eq!(builder.config.key, "test-leader");
        assert_eq!(builder.config.ttl_secs, 60);
        assert_eq!(builder.name.as_deref(), Some("node-1"));
    }

    #[test]
    fn test_default_name_is_uuid() {
        let election = LeaderElection::builder("/leader").build(Arc::new(MemoryBackend::new()));
        assert!(Uuid::parse_str(election.name()).is_ok());
        assert_eq!(election.phase(), Phase::Idle);
        assert!(!election.is_leader());
        assert_eq!(election.current_leader(), None);
    }

    #[test]
    fn test_stop_before_start_is_noop() {
        let election = LeaderElection::new(
            Arc::new(MemoryBackend::new()),
            ElectionConfig::new("/leader"),
            "node-1",
        );
        election.stop();
        assert_eq!(election.phase(), Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_candidate_becomes_leader() {
        let backend = MemoryBackend::new();
        let election = Arc::new(LeaderElection::new(
            Arc::new(backend.clone()),
            ElectionConfig::builder().key("/leader").ttl_secs(4).build(),
            "node-1",
        ));

        let handle = election.spawn();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(election.phase(), Phase::Running);
        assert!(election.is_leader());
        assert_eq!(election.current_leader().as_deref(), Some("node-1"));
        assert_eq!(backend.get("/leader").await.as_deref(), Some("node-1"));

        election.stop();
        handle.await.unwrap().unwrap();
        assert_eq!(election.phase(), Phase::Stopped);
        assert!(!election.is_leader());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_right_after_spawn() {
        let backend = MemoryBackend::new();
        let election = Arc::new(LeaderElection::new(
            Arc::new(backend.clone()),
            ElectionConfig::builder().key("/leader").ttl_secs(4).build(),
            "node-1",
        ));

        let handle = election.spawn();
        assert_eq!(election.phase(), Phase::Running);
        election.stop();
        assert_eq!(election.phase(), Phase::Stopping);

        tokio::time::timeout(election.config().tick_interval(), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(election.phase(), Phase::Stopped);
        assert_eq!(backend.lease_count().await, 0);
        assert_eq!(backend.watcher_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_phase_stays_stopping_until_loop_exits() {
        let backend = MemoryBackend::new();
        let election = Arc::new(LeaderElection::new(
            Arc::new(backend.clone()),
            ElectionConfig::builder().key("/leader").ttl_secs(4).build(),
            "node-1",
        ));

        let handle = election.spawn();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(election.is_leader());

        election.stop();
        assert_eq!(election.phase(), Phase::Stopping);
        election.stop();
        assert_eq!(election.phase(), Phase::Stopping);

        handle.await.unwrap().unwrap();
        assert_eq!(election.phase(), Phase::Stopped);
        assert!(!election.is_leader());
    }

    #[tokio::test]
    async fn test_spawn_after_start_fails() {
        let election = Arc::new(LeaderElection::new(
            Arc::new(MemoryBackend::new()),
            ElectionConfig::new("/leader"),
            "node-1",
        ));
        let first = election.spawn();
        let second = election.spawn();
        assert!(matches!(second.await.unwrap(), Err(ElectionError::AlreadyStarted)));

        election.stop();
        first.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_second_start_fails() {
        let election = Arc::new(LeaderElection::new(
            Arc::new(MemoryBackend::new()),
            ElectionConfig::new("/leader"),
            "node-1",
        ));
        let handle = election.spawn();
        assert!(matches!(election.start().await, Err(ElectionError::AlreadyStarted)));

        election.stop();
        handle.await.unwrap().unwrap();
        assert!(matches!(election.start().await, Err(ElectionError::AlreadyStarted)));
    }
}
