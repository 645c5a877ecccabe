//! Election configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ElectionError, Result};

/// Election configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionConfig {
    /// Key whose value names the leader.
    #[serde(default = "default_key")]
    pub key: String,
    /// Lease time-to-live in seconds.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: i64,
    /// Upper bound for each per-tick backend call.
    #[serde(with = "millis_serde", default = "default_operation_timeout")]
    pub operation_timeout: Duration,
    /// Revoke the lease when the election stops, handing over immediately.
    #[serde(default)]
    pub resign_on_stop: bool,
    /// First delay before resubscribing a failed watch.
    #[serde(with = "millis_serde", default = "default_backoff_initial")]
    pub watch_backoff_initial: Duration,
    /// Cap for the resubscribe delay.
    #[serde(with = "millis_serde", default = "default_backoff_max")]
    pub watch_backoff_max: Duration,
}

fn default_key() -> String {
    "/ballot/leader".to_string()
}

fn default_ttl_secs() -> i64 {
    6
}

fn default_operation_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_backoff_initial() -> Duration {
    Duration::from_millis(100)
}

fn default_backoff_max() -> Duration {
    Duration::from_secs(5)
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            key: default_key(),
            ttl_secs: default_ttl_secs(),
            operation_timeout: default_operation_timeout(),
            resign_on_stop: false,
            watch_backoff_initial: default_backoff_initial(),
            watch_backoff_max: default_backoff_max(),
        }
    }
}

impl ElectionConfig {
    /// Create a configuration for the given key.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    /// Create a builder.
    pub fn builder() -> ElectionConfigBuilder {
        ElectionConfigBuilder::new()
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> ElectionConfigBuilder {
        let mut builder = ElectionConfigBuilder::new();

        if let Ok(key) = std::env::var("BALLOT_LEADER_KEY") {
            builder = builder.key(key);
        }

        if let Ok(ttl) = std::env::var("BALLOT_LEADER_TTL")
            && let Ok(secs) = ttl.parse() {
                builder = builder.ttl_secs(secs);
            }

        if let Ok(timeout) = std::env::var("BALLOT_OPERATION_TIMEOUT")
            && let Ok(secs) = timeout.parse() {
                builder = builder.operation_timeout(Duration::from_secs(secs));
            }

        if std::env::var("BALLOT_RESIGN_ON_STOP").is_ok() {
            builder = builder.resign_on_stop(true);
        }

        builder
    }

    /// Lease TTL as a duration.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs.max(0) as u64)
    }

    /// Period of the acquire-and-renew loop: a quarter of the TTL, so at
    /// least three renewals land inside one lease lifetime.
    pub fn tick_interval(&self) -> Duration {
        (self.ttl() / 4).max(Duration::from_millis(1))
    }

    /// Check the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.key.is_empty() {
            return Err(ElectionError::InvalidConfig("election key must not be empty".to_string()));
        }
        if self.ttl_secs <= 0 {
            return Err(ElectionError::InvalidConfig(format!(
                "lease TTL must be positive, got {}",
                self.ttl_secs
            )));
        }
        if self.operation_timeout.is_zero() {
            return Err(ElectionError::InvalidConfig(
                "operation timeout must be greater than zero".to_string(),
            ));
        }
        if self.watch_backoff_initial.is_zero()
            || self.watch_backoff_initial > self.watch_backoff_max
        {
            return Err(ElectionError::InvalidConfig(
                "watch backoff must be non-zero and initial <= max".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for election configuration.
#[derive(Default)]
pub struct ElectionConfigBuilder {
    config: ElectionConfig,
}

impl ElectionConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: ElectionConfig::default(),
        }
    }

    /// Set the election key.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.config.key = key.into();
        self
    }

    /// Set the lease TTL in seconds.
    pub fn ttl_secs(mut self, ttl_secs: i64) -> Self {
        self.config.ttl_secs = ttl_secs;
        self
    }

    /// Set the per-call timeout.
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.config.operation_timeout = timeout;
        self
    }

    /// Revoke the lease on stop.
    pub fn resign_on_stop(mut self, resign: bool) -> Self {
        self.config.resign_on_stop = resign;
        self
    }

    /// Set the watch resubscribe backoff bounds.
    pub fn watch_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.config.watch_backoff_initial = initial;
        self.config.watch_backoff_max = max;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ElectionConfig {
        self.config
    }
}

mod millis_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
