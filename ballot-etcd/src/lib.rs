//! # Ballot etcd
//!
//! Connection layer for talking to an etcd v3 cluster.
//!
//! ## Features
//!
//! - **Explicit configuration**: endpoints, timeouts and credentials in a plain value
//! - **TLS**: mutual TLS when certificate, key and CA bundle are all configured
//! - **Environment loading**: `ETCD_*` variables via [`EtcdConfig::from_env`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ballot_etcd::{EtcdConfig, EtcdService};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EtcdConfig::builder()
//!         .endpoints_csv("10.0.0.1:2379,10.0.0.2:2379")
//!         .timeout(Duration::from_secs(3))
//!         .build();
//!
//!     let etcd = EtcdService::connect(config).await?;
//!     etcd.health_check().await?;
//!
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod service;

pub use config::{EtcdConfig, EtcdConfigBuilder};
pub use error::{EtcdError, Result};
pub use service::EtcdService;

// Re-export the client crate for convenience
pub use etcd_client;
