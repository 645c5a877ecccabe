//! Leader-change watch feed.

use futures::StreamExt;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{ChangeEvent, ChangeStream, ElectionBackend};
use crate::error::ElectionError;
use crate::signal::StopListener;
use crate::state::LeadershipTracker;

/// Exponential resubscribe delay with jitter.
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Next delay, somewhere in `[cap / 2, cap]`; the cap doubles up to `max`.
    pub fn next_delay(&mut self) -> Duration {
        let cap = self.current;
        self.current = (self.current * 2).min(self.max);

        let half = cap / 2;
        let spread = (cap - half).as_millis() as u64;
        half + Duration::from_millis(rand::rng().random_range(0..=spread))
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

enum Drained {
    Stopped,
    Failed(ElectionError),
    Ended,
}

/// Keeps a candidate's view of the leader current from backend notifications.
///
/// A `Put` names the new holder; a `Delete` means the key is gone, so the view
/// becomes vacant and the next acquisition attempt is not skipped. Delivery
/// failures never end the feed: it resubscribes with backoff until stopped.
pub(crate) struct WatchFeed {
    backend: Arc<dyn ElectionBackend>,
    key: String,
    tracker: Arc<LeadershipTracker>,
    backoff: Backoff,
}

impl WatchFeed {
    pub fn new(
        backend: Arc<dyn ElectionBackend>,
        key: impl Into<String>,
        tracker: Arc<LeadershipTracker>,
        backoff: Backoff,
    ) -> Self {
        Self {
            backend,
            key: key.into(),
            tracker,
            backoff,
        }
    }

    pub fn spawn(self, stop: StopListener) -> JoinHandle<()> {
        tokio::spawn(self.run(stop))
    }

    async fn run(mut self, mut stop: StopListener) {
        loop {
            let subscribed = tokio::select! {
                biased;
                _ = stop.stopped() => break,
                result = self.backend.watch(&self.key) => result,
            };

            match subscribed {
                Ok(stream) => {
                    info!(
                        key = %self.key,
                        candidate = %self.tracker.name(),
                        "Watching election key"
                    );
                    match self.drain(stream, &mut stop).await {
                        Drained::Stopped => break,
                        Drained::Failed(e) => {
                            warn!(
                                key = %self.key,
                                error = %e,
                                "Watch delivery failed, resubscribing"
                            );
                        }
                        Drained::Ended => {
                            warn!(key = %self.key, "Watch stream ended, resubscribing");
                        }
                    }
                }
                Err(e) => {
                    warn!(key = %self.key, error = %e, "Failed to subscribe to election key");
                }
            }

            let delay = self.backoff.next_delay();
            debug!(
                key = %self.key,
                delay_ms = delay.as_millis() as u64,
                "Watch resubscribe backoff"
            );
            tokio::select! {
                biased;
                _ = stop.stopped() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        debug!(key = %self.key, "Watch feed stopped");
    }

    async fn drain(&mut self, mut stream: ChangeStream, stop: &mut StopListener) -> Drained {
        loop {
            let next = tokio::select! {
                biased;
                _ = stop.stopped() => return Drained::Stopped,
                next = stream.next() => next,
            };

            match next {
                Some(Ok(event)) => {
                    self.backoff.reset();
                    self.apply(event).await;
                }
                Some(Err(e)) => return Drained::Failed(e),
                None => return Drained::Ended,
            }
        }
    }

    async fn apply(&self, event: ChangeEvent) {
        match event {
            ChangeEvent::Put { value } => {
                debug!(key = %self.key, leader = %value, "Election key written");
                self.tracker.leader_observed(&value).await;
            }
            ChangeEvent::Delete => {
                debug!(key = %self.key, "Election key deleted");
                self.tracker.vacancy_observed().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::signal::StopSignal;
    use crate::state::{ElectionState, Leadership};

    fn feed(backend: &MemoryBackend, name: &str) -> (WatchFeed, Arc<LeadershipTracker>) {
        let tracker = Arc::new(LeadershipTracker::new(
            ElectionState::new(name),
            "/leader",
            None,
            None,
        ));
        let feed = WatchFeed::new(
            Arc::new(backend.clone()),
            "/leader",
            tracker.clone(),
            Backoff::new(Duration::from_millis(100), Duration::from_secs(1)),
        );
        (feed, tracker)
    }

    async fn wait_for_watchers(backend: &MemoryBackend, count: usize) {
        while backend.watcher_count().await != count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[test]
    fn test_backoff_grows_and_resets() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(400));

        let first = backoff.next_delay();
        assert!(first >= Duration::from_millis(50) && first <= Duration::from_millis(100));
        let second = backoff.next_delay();
        assert!(second >= Duration::from_millis(100) && second <= Duration::from_millis(200));
        let third = backoff.next_delay();
        assert!(third >= Duration::from_millis(200) && third <= Duration::from_millis(400));
        let capped = backoff.next_delay();
        assert!(capped <= Duration::from_millis(400));

        backoff.reset();
        assert!(backoff.next_delay() <= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_and_delete_update_view() {
        let backend = MemoryBackend::new();
        let (feed, tracker) = feed(&backend, "node-b");
        let stop = StopSignal::new();
        let handle = feed.spawn(stop.listener());
        wait_for_watchers(&backend, 1).await;

        let mut changes = tracker.subscribe();
        let lease = backend.grant_lease(5).await.unwrap();
        backend.put_if_absent("/leader", "node-a", lease).await.unwrap();
        changes.changed().await.unwrap();
        assert_eq!(tracker.snapshot(), Leadership::held_by("node-a", "node-b"));

        backend.delete("/leader").await;
        changes.changed().await.unwrap();
        assert_eq!(tracker.snapshot(), Leadership::vacant());

        stop.trigger();
        handle.await.unwrap();
        assert_eq!(backend.watcher_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resubscribes_after_outage() {
        let backend = MemoryBackend::new();
        let (feed, tracker) = feed(&backend, "node-a");
        let stop = StopSignal::new();
        let handle = feed.spawn(stop.listener());
        wait_for_watchers(&backend, 1).await;

        backend.set_available(false).await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(backend.watcher_count().await, 0);

        backend.set_available(true).await;
        wait_for_watchers(&backend, 1).await;

        let mut changes = tracker.subscribe();
        let lease = backend.grant_lease(5).await.unwrap();
        backend.put_if_absent("/leader", "node-a", lease).await.unwrap();
        changes.changed().await.unwrap();
        assert!(tracker.snapshot().is_leader());

        stop.trigger();
        handle.await.unwrap();
    }
}
