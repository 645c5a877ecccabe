//! Ballot - run one election candidate against an etcd cluster.
//!
//! The candidate joins the election under a unique name, logs every
//! leadership change, and leaves gracefully after `--run-for` seconds or on
//! Ctrl-C.

use ballot::logging::{LogFormat, init_tracing};
use ballot::prelude::*;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Lease-based leader election candidate
#[derive(Parser, Debug)]
#[command(name = "ballot")]
#[command(version)]
#[command(about = "Join a lease-based leader election on etcd")]
struct Args {
    /// etcd endpoints, comma separated
    #[arg(long, env = "ETCD_ENDPOINTS", value_delimiter = ',', default_value = "127.0.0.1:2379")]
    endpoints: Vec<String>,

    /// Client certificate (PEM)
    #[arg(long, env = "ETCD_CERT")]
    cert: Option<PathBuf>,

    /// Client private key (PEM)
    #[arg(long, env = "ETCD_KEY")]
    key: Option<PathBuf>,

    /// CA bundle (PEM)
    #[arg(long, env = "ETCD_CACERT")]
    cacert: Option<PathBuf>,

    /// Dial and request timeout, in seconds
    #[arg(long, env = "ETCD_TIMEOUT", default_value_t = 3)]
    timeout: u64,

    /// Election key
    #[arg(long, env = "BALLOT_LEADER_KEY", default_value = "/ballot/leader")]
    leader_key: String,

    /// Lease TTL, in seconds
    #[arg(long, env = "BALLOT_LEADER_TTL", default_value_t = 6)]
    leader_ttl: i64,

    /// Candidate name (defaults to a random UUID)
    #[arg(long, env = "BALLOT_NAME")]
    name: Option<String>,

    /// Leave the election after this many seconds
    #[arg(long)]
    run_for: Option<u64>,

    /// Revoke the lease when leaving so a follower takes over at once
    #[arg(long, env = "BALLOT_RESIGN_ON_STOP")]
    resign_on_stop: bool,

    /// Log output format
    #[arg(long, env = "BALLOT_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

impl Args {
    fn etcd_config(&self) -> EtcdConfig {
        let mut builder = EtcdConfig::builder()
            .endpoints(self.endpoints.clone())
            .timeout(Duration::from_secs(self.timeout));

        if let Some(cert) = &self.cert {
            builder = builder.cert(cert);
        }
        if let Some(key) = &self.key {
            builder = builder.key(key);
        }
        if let Some(cacert) = &self.cacert {
            builder = builder.cacert(cacert);
        }

        builder.build()
    }

    fn election_config(&self) -> ElectionConfig {
        ElectionConfig::builder()
            .key(&self.leader_key)
            .ttl_secs(self.leader_ttl)
            .operation_timeout(Duration::from_secs(self.timeout))
            .resign_on_stop(self.resign_on_stop)
            .build()
    }
}

async fn run_until(run_for: Option<u64>) {
    match run_for {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => std::future::pending().await,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing(args.log_format);

    let name = args
        .name
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let etcd = EtcdService::connect(args.etcd_config()).await?;
    let config = args.election_config();

    let election = Arc::new(
        LeaderElectionBuilder::new(config.key.clone())
            .with_config(config)
            .with_name(name.clone())
            .on_elected(|| async {
                info!("This candidate is now the leader");
            })
            .on_revoked(|| async {
                info!("This candidate is no longer the leader");
            })
            .build(Arc::new(EtcdBackend::new(etcd))),
    );

    info!(candidate = %name, key = %election.key(), "Joining election");
    let mut task = election.spawn();

    tokio::select! {
        result = &mut task => {
            result??;
            return Ok(());
        }
        _ = run_until(args.run_for) => {
            info!("Run time elapsed");
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Interrupt received");
        }
    }

    election.stop();
    task.await??;
    info!(candidate = %name, "Left election");
    Ok(())
}
