//! etcd connection configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::{EtcdError, Result};

/// etcd connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtcdConfig {
    /// Cluster endpoints (`host:port` or `http(s)://host:port`).
    pub endpoints: Vec<String>,
    /// Client certificate (PEM) for mutual TLS.
    pub cert: Option<PathBuf>,
    /// Client private key (PEM) for mutual TLS.
    pub key: Option<PathBuf>,
    /// CA bundle (PEM) used to verify the servers.
    pub cacert: Option<PathBuf>,
    /// Username for etcd authentication.
    pub username: Option<String>,
    /// Password for etcd authentication.
    pub password: Option<String>,
    /// Dial and per-request timeout.
    #[serde(with = "secs_serde", default = "default_timeout")]
    pub timeout: Duration,
    /// HTTP/2 keep-alive ping interval.
    #[serde(with = "opt_secs_serde", default)]
    pub keep_alive_interval: Option<Duration>,
}

fn default_timeout() -> Duration {
    Duration::from_secs(3)
}

impl Default for EtcdConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            cert: None,
            key: None,
            cacert: None,
            username: None,
            password: None,
            timeout: default_timeout(),
            keep_alive_interval: None,
        }
    }
}

impl EtcdConfig {
    /// Create a configuration for the given endpoints.
    pub fn new<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            endpoints: endpoints.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Create a builder.
    pub fn builder() -> EtcdConfigBuilder {
        EtcdConfigBuilder::new()
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> EtcdConfigBuilder {
        let mut builder = EtcdConfigBuilder::new();

        if let Ok(endpoints) = std::env::var("ETCD_ENDPOINTS") {
            builder = builder.endpoints_csv(&endpoints);
        }

        if let Ok(cert) = std::env::var("ETCD_CERT") {
            builder = builder.cert(cert);
        }

        if let Ok(key) = std::env::var("ETCD_KEY") {
            builder = builder.key(key);
        }

        if let Ok(cacert) = std::env::var("ETCD_CACERT") {
            builder = builder.cacert(cacert);
        }

        if let Ok(username) = std::env::var("ETCD_USERNAME") {
            builder = builder.username(username);
        }

        if let Ok(password) = std::env::var("ETCD_PASSWORD") {
            builder = builder.password(password);
        }

        if let Ok(timeout) = std::env::var("ETCD_TIMEOUT")
            && let Ok(secs) = timeout.parse() {
                builder = builder.timeout(Duration::from_secs(secs));
            }

        builder
    }

    /// TLS is used only when certificate, key and CA bundle are all present.
    pub fn tls_enabled(&self) -> bool {
        self.cert.is_some() && self.key.is_some() && self.cacert.is_some()
    }

    /// Check the configuration before dialing.
    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(EtcdError::Config("at least one endpoint must be specified".to_string()));
        }
        if self.endpoints.iter().any(|e| e.trim().is_empty()) {
            return Err(EtcdError::Config("endpoints must not be blank".to_string()));
        }
        if self.timeout.is_zero() {
            return Err(EtcdError::Config("timeout must be greater than zero".to_string()));
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(EtcdError::Config("password given without a username".to_string()));
        }
        Ok(())
    }
}

/// Builder for etcd configuration.
#[derive(Default)]
pub struct EtcdConfigBuilder {
    config: EtcdConfig,
}

impl EtcdConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: EtcdConfig::default(),
        }
    }

    /// Add an endpoint.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoints.push(endpoint.into());
        self
    }

    /// Replace the endpoint list.
    pub fn endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.config.endpoints = endpoints;
        self
    }

    /// Replace the endpoint list from a comma-separated string.
    pub fn endpoints_csv(mut self, endpoints: &str) -> Self {
        self.config.endpoints = endpoints
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        self
    }

    /// Set the client certificate path.
    pub fn cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.cert = Some(path.into());
        self
    }

    /// Set the client key path.
    pub fn key(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.key = Some(path.into());
        self
    }

    /// Set the CA bundle path.
    pub fn cacert(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.cacert = Some(path.into());
        self
    }

    /// Set the username.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.config.username = Some(username.into());
        self
    }

    /// Set the password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = Some(password.into());
        self
    }

    /// Set the dial and request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the keep-alive interval.
    pub fn keep_alive_interval(mut self, interval: Duration) -> Self {
        self.config.keep_alive_interval = Some(interval);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> EtcdConfig {
        self.config
    }
}

mod secs_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

mod opt_secs_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.map(|d| d.as_secs()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
