//! etcd connection error types.

use thiserror::Error;

/// Result type for etcd connection operations.
pub type Result<T> = std::result::Result<T, EtcdError>;

/// etcd connection errors.
#[derive(Debug, Error)]
pub enum EtcdError {
    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// TLS setup error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Timeout error.
    #[error("Operation timed out")]
    Timeout,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Underlying etcd client error.
    #[error("etcd error: {0}")]
    Etcd(#[from] etcd_client::Error),
}

impl EtcdError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout => true,
            Self::Etcd(err) => matches!(
                err,
                etcd_client::Error::TransportError(_) | etcd_client::Error::IoError(_)
            ),
            _ => false,
        }
    }

    /// Check if this error indicates connection loss.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(EtcdError::Connection("refused".into()).is_retryable());
        assert!(EtcdError::Timeout.is_retryable());
        assert!(!EtcdError::Config("no endpoints".into()).is_retryable());
        assert!(!EtcdError::Tls("bad pem".into()).is_retryable());
    }

    #[test]
    fn test_display() {
        let err = EtcdError::Config("at least one endpoint must be specified".into());
        assert!(err.to_string().contains("at least one endpoint"));
    }
}
