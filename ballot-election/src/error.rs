//! Election error types.

use std::time::Duration;
use thiserror::Error;

use crate::backend::LeaseId;

/// Result type for election operations.
pub type Result<T> = std::result::Result<T, ElectionError>;

/// Election errors.
#[derive(Debug, Error)]
pub enum ElectionError {
    /// The backing store could not be reached.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The backing store refused the request.
    #[error("Backend rejected request: {0}")]
    BackendRejected(String),

    /// The store no longer recognizes the lease.
    #[error("Lease {0} expired")]
    LeaseExpired(LeaseId),

    /// The claim transaction lost the key between its compare and its read.
    #[error("Election key {key} vanished during claim transaction")]
    InconsistentRead { key: String },

    /// The election key holds a value that cannot name a candidate.
    #[error("Election key {key} holds an unreadable value: {reason}")]
    InvalidLeaderValue { key: String, reason: String },

    /// A backend call did not complete in time.
    #[error("Backend call timed out after {0:?}")]
    Timeout(Duration),

    /// Invalid election configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// `start` was called on a coordinator that already left the idle phase.
    #[error("Election already started")]
    AlreadyStarted,

    /// Connection layer error.
    #[error("etcd error: {0}")]
    Etcd(#[from] ballot_etcd::EtcdError),
}

/// How an error affects a running election.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Aborts `start`; the election never runs.
    StartupFatal,
    /// Logged and retried on the next tick.
    Transient,
    /// Claim transaction saw no value in its read branch; retried on the next tick.
    InconsistentRead,
    /// Lease was reclaimed; a fresh lease is granted on the next tick.
    LeaseExpired,
}

impl ElectionError {
    /// Classify this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::BackendUnavailable(_) | Self::Timeout(_) | Self::InvalidLeaderValue { .. } => {
                ErrorClass::Transient
            }
            Self::Etcd(err) if err.is_retryable() => ErrorClass::Transient,
            Self::InconsistentRead { .. } => ErrorClass::InconsistentRead,
            Self::LeaseExpired(_) => ErrorClass::LeaseExpired,
            Self::BackendRejected(_)
            | Self::InvalidConfig(_)
            | Self::AlreadyStarted
            | Self::Etcd(_) => ErrorClass::StartupFatal,
        }
    }

    /// Check if a running election can absorb this error and continue.
    pub fn is_transient(&self) -> bool {
        self.class() != ErrorClass::StartupFatal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(
            ElectionError::BackendUnavailable("refused".into()).class(),
            ErrorClass::Transient
        );
        assert_eq!(
            ElectionError::Timeout(Duration::from_secs(3)).class(),
            ErrorClass::Transient
        );
        assert_eq!(
            ElectionError::InconsistentRead { key: "/k".into() }.class(),
            ErrorClass::InconsistentRead
        );
        assert_eq!(
            ElectionError::LeaseExpired(LeaseId::new(7)).class(),
            ErrorClass::LeaseExpired
        );
        assert_eq!(
            ElectionError::BackendRejected("ttl".into()).class(),
            ErrorClass::StartupFatal
        );
        assert_eq!(ElectionError::AlreadyStarted.class(), ErrorClass::StartupFatal);
    }

    #[test]
    fn test_transient() {
        assert!(ElectionError::LeaseExpired(LeaseId::new(1)).is_transient());
        assert!(ElectionError::InconsistentRead { key: "/k".into() }.is_transient());
        assert!(!ElectionError::InvalidConfig("ttl".into()).is_transient());
    }

    #[test]
    fn test_unreadable_leader_value_is_transient() {
        let err = ElectionError::InvalidLeaderValue {
            key: "/k".into(),
            reason: "invalid utf-8 sequence".into(),
        };
        assert_eq!(err.class(), ErrorClass::Transient);
        assert!(err.is_transient());
    }

    #[test]
    fn test_display() {
        let err = ElectionError::LeaseExpired(LeaseId::new(0x2a));
        assert_eq!(err.to_string(), "Lease 2a expired");
    }
}
