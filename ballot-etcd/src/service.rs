//! etcd connection service.

use etcd_client::{Client, ConnectOptions};
use tracing::{debug, info};

use crate::{EtcdConfig, EtcdError, Result};

/// A connected etcd client together with the configuration it was dialed with.
///
/// The underlying [`Client`] multiplexes every request over shared gRPC
/// channels, so handing out clones is cheap and needs no coordination.
#[derive(Clone)]
pub struct EtcdService {
    config: EtcdConfig,
    client: Client,
}

impl EtcdService {
    /// Validate the configuration and connect to the cluster.
    pub async fn connect(config: EtcdConfig) -> Result<Self> {
        config.validate()?;

        let options = connect_options(&config).await?;
        let client = Client::connect(&config.endpoints, Some(options))
            .await
            .map_err(|e| EtcdError::Connection(e.to_string()))?;

        info!(
            endpoints = %config.endpoints.join(","),
            tls = config.tls_enabled(),
            "Connected to etcd"
        );

        Ok(Self { config, client })
    }

    /// Wrap an already connected client.
    pub fn from_client(config: EtcdConfig, client: Client) -> Self {
        Self { config, client }
    }

    /// Get the configuration.
    pub fn config(&self) -> &EtcdConfig {
        &self.config
    }

    /// Get a handle to the client.
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    /// Check that the cluster answers a status request.
    pub async fn health_check(&self) -> Result<()> {
        let mut client = self.client();
        let status = tokio::time::timeout(self.config.timeout, client.status())
            .await
            .map_err(|_| EtcdError::Timeout)??;
        debug!(version = %status.version(), "etcd health check passed");
        Ok(())
    }
}

async fn connect_options(config: &EtcdConfig) -> Result<ConnectOptions> {
    let mut options = ConnectOptions::new()
        .with_connect_timeout(config.timeout)
        .with_timeout(config.timeout);

    if let Some(interval) = config.keep_alive_interval {
        options = options.with_keep_alive(interval, config.timeout);
    }

    if let Some(username) = &config.username {
        let password = config.password.clone().unwrap_or_default();
        options = options.with_user(username.clone(), password);
    }

    if config.tls_enabled() {
        options = with_tls(options, config).await?;
    }

    Ok(options)
}

#[cfg(feature = "tls")]
async fn with_tls(options: ConnectOptions, config: &EtcdConfig) -> Result<ConnectOptions> {
    use etcd_client::{Certificate, Identity, TlsOptions};

    let (Some(cert), Some(key), Some(cacert)) = (&config.cert, &config.key, &config.cacert) else {
        return Ok(options);
    };

    let cert_pem = tokio::fs::read(cert).await?;
    let key_pem = tokio::fs::read(key).await?;
    let ca_pem = tokio::fs::read(cacert).await?;

    let tls = TlsOptions::new()
        .ca_certificate(Certificate::from_pem(ca_pem))
        .identity(Identity::from_pem(cert_pem, key_pem));

    debug!(cert = %cert.display(), ca = %cacert.display(), "Configured etcd TLS");

    Ok(options.with_tls(tls))
}

#[cfg(not(feature = "tls"))]
async fn with_tls(_options: ConnectOptions, _config: &EtcdConfig) -> Result<ConnectOptions> {
    Err(EtcdError::Tls(
        "TLS material configured but ballot-etcd was built without the `tls` feature".to_string(),
    ))
}
