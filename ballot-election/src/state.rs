//! Shared election state.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Leadership change callback
pub type LeaderCallback =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// A snapshot of who holds the election, as seen by one candidate.
///
/// `is_leader` is derived from the leader name and the candidate's own name
/// at construction, so the two can never disagree.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Leadership {
    leader: Option<String>,
    is_leader: bool,
}

impl Leadership {
    /// No known leader.
    pub fn vacant() -> Self {
        Self::default()
    }

    /// `leader` holds the election, as observed by candidate `own_name`.
    pub fn held_by(leader: impl Into<String>, own_name: &str) -> Self {
        let leader = leader.into();
        let is_leader = leader == own_name;
        Self {
            leader: Some(leader),
            is_leader,
        }
    }

    /// Current leader name, if any.
    pub fn leader(&self) -> Option<&str> {
        self.leader.as_deref()
    }

    /// Whether the observing candidate is the leader.
    pub fn is_leader(&self) -> bool {
        self.is_leader
    }
}

/// Change of the local leadership flag caused by an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    Elected,
    Revoked,
}

/// Election state shared by the scheduling loop and the watch feed.
///
/// Each update swaps in a whole [`Leadership`] snapshot, so readers never see
/// a leader name paired with a stale flag.
pub(crate) struct ElectionState {
    name: String,
    tx: watch::Sender<Leadership>,
}

impl ElectionState {
    pub fn new(name: impl Into<String>) -> Self {
        let (tx, _) = watch::channel(Leadership::vacant());
        Self {
            name: name.into(),
            tx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn snapshot(&self) -> Leadership {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Leadership> {
        self.tx.subscribe()
    }

    /// Record `leader` as the current holder.
    pub fn observe_leader(&self, leader: &str) -> Option<Transition> {
        self.replace(Leadership::held_by(leader, &self.name))
    }

    /// Record that nobody holds the election.
    pub fn observe_vacant(&self) -> Option<Transition> {
        self.replace(Leadership::vacant())
    }

    fn replace(&self, next: Leadership) -> Option<Transition> {
        let mut transition = None;
        self.tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            transition = match (current.is_leader, next.is_leader) {
                (false, true) => Some(Transition::Elected),
                (true, false) => Some(Transition::Revoked),
                _ => None,
            };
            *current = next;
            true
        });
        transition
    }
}

/// [`ElectionState`] plus the callbacks fired when the local flag flips.
///
/// Callbacks run after the snapshot is swapped, outside any lock, on whichever
/// task applied the change.
pub(crate) struct LeadershipTracker {
    state: ElectionState,
    key: String,
    on_elected: Option<LeaderCallback>,
    on_revoked: Option<LeaderCallback>,
}

impl LeadershipTracker {
    pub fn new(
        state: ElectionState,
        key: impl Into<String>,
        on_elected: Option<LeaderCallback>,
        on_revoked: Option<LeaderCallback>,
    ) -> Self {
        Self {
            state,
            key: key.into(),
            on_elected,
            on_revoked,
        }
    }

    pub fn name(&self) -> &str {
        self.state.name()
    }

    pub fn snapshot(&self) -> Leadership {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Leadership> {
        self.state.subscribe()
    }

    pub async fn leader_observed(&self, leader: &str) {
        let transition = self.state.observe_leader(leader);
        self.fire(transition, Some(leader)).await;
    }

    pub async fn vacancy_observed(&self) {
        let transition = self.state.observe_vacant();
        self.fire(transition, None).await;
    }

    async fn fire(&self, transition: Option<Transition>, leader: Option<&str>) {
        match transition {
            Some(Transition::Elected) => {
                info!(candidate = %self.name(), key = %self.key, "Became leader");
                if let Some(callback) = &self.on_elected {
                    callback().await;
                }
            }
            Some(Transition::Revoked) => {
                info!(
                    candidate = %self.name(),
                    key = %self.key,
                    leader = leader.unwrap_or("<none>"),
                    "Lost leadership"
                );
                if let Some(callback) = &self.on_revoked {
                    callback().await;
                }
            }
            None => {}
        }
    }
}
