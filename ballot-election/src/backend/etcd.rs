//! etcd election backend

use async_trait::async_trait;
use ballot_etcd::EtcdService;
use etcd_client::{
    Compare, CompareOp, EventType, PutOptions, Txn, TxnOp, TxnOpResponse, WatchResponse,
};
use futures::StreamExt;
use tracing::{debug, info};

use super::{ChangeEvent, ChangeStream, Claim, ElectionBackend, LeaseId, invalid_ttl};
use crate::error::{ElectionError, Result};

/// Election backend over an etcd v3 cluster.
#[derive(Clone)]
pub struct EtcdBackend {
    etcd: EtcdService,
}

impl EtcdBackend {
    /// Create a backend over an existing connection.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// use ballot_election::EtcdBackend;
    /// use ballot_etcd::{EtcdConfig, EtcdService};
    ///
    /// let etcd = EtcdService::connect(EtcdConfig::new(["localhost:2379"])).await?;
    /// let backend = EtcdBackend::new(etcd);
    /// ```
    pub fn new(etcd: EtcdService) -> Self {
        Self { etcd }
    }

    /// Get the underlying connection.
    pub fn service(&self) -> &EtcdService {
        &self.etcd
    }
}

#[async_trait]
impl ElectionBackend for EtcdBackend {
    async fn grant_lease(&self, ttl_secs: i64) -> Result<LeaseId> {
        if ttl_secs <= 0 {
            return Err(invalid_ttl(ttl_secs));
        }

        let mut client = self.etcd.client();
        let resp = client.lease_grant(ttl_secs, None).await.map_err(map_error)?;
        let lease = LeaseId::new(resp.id());

        info!(lease = %lease, ttl = resp.ttl(), "Granted etcd lease");
        Ok(lease)
    }

    async fn renew_lease(&self, lease: LeaseId) -> Result<()> {
        let mut client = self.etcd.client();
        let (mut keeper, mut responses) = client
            .lease_keep_alive(lease.get())
            .await
            .map_err(lease_error(lease))?;

        keeper.keep_alive().await.map_err(lease_error(lease))?;

        match responses.message().await.map_err(lease_error(lease))? {
            Some(resp) if resp.ttl() > 0 => {
                debug!(lease = %lease, ttl = resp.ttl(), "Renewed etcd lease");
                Ok(())
            }
            Some(_) => Err(ElectionError::LeaseExpired(lease)),
            None => Err(ElectionError::BackendUnavailable(
                "keep-alive stream closed before responding".to_string(),
            )),
        }
    }

    async fn revoke_lease(&self, lease: LeaseId) -> Result<()> {
        let mut client = self.etcd.client();
        match client.lease_revoke(lease.get()).await.map_err(lease_error(lease)) {
            Ok(_) | Err(ElectionError::LeaseExpired(_)) => {
                info!(lease = %lease, "Revoked etcd lease");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn put_if_absent(&self, key: &str, value: &str, lease: LeaseId) -> Result<Claim> {
        let txn = Txn::new()
            .when([Compare::create_revision(key, CompareOp::Equal, 0)])
            .and_then([TxnOp::put(
                key,
                value,
                Some(PutOptions::new().with_lease(lease.get())),
            )])
            .or_else([TxnOp::get(key, None)]);

        let mut client = self.etcd.client();
        let resp = client.txn(txn).await.map_err(lease_error(lease))?;

        if resp.succeeded() {
            return Ok(Claim::Created);
        }

        let current = resp.op_responses().into_iter().find_map(|op| match op {
            TxnOpResponse::Get(get) => get.kvs().first().map(|kv| kv.value().to_vec()),
            _ => None,
        });

        decode_claim_read(key, current)
    }

    async fn watch(&self, key: &str) -> Result<ChangeStream> {
        let mut client = self.etcd.client();
        let (watcher, stream) = client.watch(key, None).await.map_err(map_error)?;

        debug!(key = %key, watch_id = watcher.watch_id(), "Opened etcd watch");

        // The watcher rides along with the stream so both drop together,
        // which closes the request side and cancels the watch.
        let events = stream
            .map(move |item| {
                let _keep = &watcher;
                item.map_err(map_error).and_then(|resp| decode_watch_response(&resp))
            })
            .flat_map(|batch| {
                let items: Vec<Result<ChangeEvent>> = match batch {
                    Ok(events) => events.into_iter().map(Ok).collect(),
                    Err(e) => vec![Err(e)],
                };
                futures::stream::iter(items)
            });

        Ok(events.boxed())
    }
}

/// Turn the read branch of the claim transaction into a [`Claim`].
fn decode_claim_read(key: &str, value: Option<Vec<u8>>) -> Result<Claim> {
    match value {
        Some(bytes) => String::from_utf8(bytes)
            .map(|leader| Claim::Existing(Some(leader)))
            .map_err(|e| ElectionError::InvalidLeaderValue {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        None => Ok(Claim::Existing(None)),
    }
}

fn decode_watch_response(resp: &WatchResponse) -> Result<Vec<ChangeEvent>> {
    if resp.canceled() {
        return Err(ElectionError::BackendUnavailable(format!(
            "watch canceled by server: {}",
            resp.cancel_reason()
        )));
    }

    let mut events = Vec::with_capacity(resp.events().len());
    for event in resp.events() {
        match event.event_type() {
            EventType::Put => {
                let Some(kv) = event.kv() else { continue };
                match kv.value_str() {
                    Ok(value) => events.push(ChangeEvent::Put {
                        value: value.to_string(),
                    }),
                    Err(e) => debug!(error = %e, "Skipping non UTF-8 leader value"),
                }
            }
            EventType::Delete => events.push(ChangeEvent::Delete),
        }
    }
    Ok(events)
}

/// Like [`map_error`], naming `lease` when the store reports a missing lease.
fn lease_error(lease: LeaseId) -> impl Fn(etcd_client::Error) -> ElectionError {
    move |err| match map_error(err) {
        ElectionError::LeaseExpired(_) => ElectionError::LeaseExpired(lease),
        other => other,
    }
}

/// Map an etcd client error onto the election taxonomy.
pub(crate) fn map_error(err: etcd_client::Error) -> ElectionError {
    use etcd_client::Error;
    use tonic::Code;

    match err {
        Error::GRpcStatus(status) => match status.code() {
            Code::NotFound if status.message().contains("lease not found") => {
                // Callers holding a lease rewrite this via `lease_error`
                ElectionError::LeaseExpired(LeaseId::new(-1))
            }
            Code::InvalidArgument | Code::FailedPrecondition | Code::PermissionDenied
            | Code::Unauthenticated | Code::OutOfRange => {
                ElectionError::BackendRejected(status.message().to_string())
            }
            Code::DeadlineExceeded => ElectionError::BackendUnavailable(format!(
                "deadline exceeded: {}",
                status.message()
            )),
            _ => ElectionError::BackendUnavailable(status.message().to_string()),
        },
        Error::InvalidArgs(msg) => ElectionError::BackendRejected(msg),
        other => ElectionError::BackendUnavailable(other.to_string()),
    }
}
