//! In-process `Transport` implementation wiring together every rank
//! of a simulated group within a single process, playing the role
//! `moq-relay-ietf`'s `FileCoordinator` plays for a local multi-relay
//! deployment, but routing IV RPCs straight to in-memory namespace
//! handlers instead of shelling out to a real network.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::bulk::{BulkOp, BulkTransferDesc};
use crate::error::{IvError, IvResult};
use crate::fetch;
use crate::namespace::{Namespace, NamespaceId};
use crate::registry::Registry;
use crate::rpc::{FetchReply, FetchRequest, SyncReply, SyncRequest, UpdateReply, UpdateRequest};
use crate::sync;
use crate::transport::Transport;
use crate::update;
use crate::value::Rank;

/// Registry of every rank's `Registry` that's joined the cluster.
/// Looking up a namespace crosses this table, then the target rank's
/// own `Registry`.
#[derive(Default)]
pub struct Cluster {
    registries: Mutex<HashMap<Rank, Arc<Registry>>>,
}

impl Cluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes `rank`'s registry reachable by every other rank already
    /// in the cluster, and vice versa.
    pub fn join(&self, rank: Rank, registry: Arc<Registry>) {
        self.registries.lock().unwrap().insert(rank, registry);
    }

    fn lookup(&self, rank: Rank, nsid: NamespaceId) -> IvResult<Arc<Namespace>> {
        let registry = self
            .registries
            .lock()
            .unwrap()
            .get(&rank)
            .cloned()
            .ok_or_else(|| IvError::Transport(format!("rank {rank} is not part of this cluster")))?;
        registry.lookup(nsid).ok_or(IvError::NamespaceNotFound)
    }

    /// Builds a `Transport` bound to this cluster and one namespace.
    /// Pass the result as the `transport_for` argument to
    /// `Registry::create`/`Registry::attach`.
    pub fn transport_for(self: &Arc<Self>, nsid: NamespaceId) -> Arc<dyn Transport> {
        Arc::new(ClusterTransport {
            cluster: self.clone(),
            nsid,
        })
    }
}

struct ClusterTransport {
    cluster: Arc<Cluster>,
    nsid: NamespaceId,
}

#[async_trait]
impl Transport for ClusterTransport {
    async fn send_fetch(&self, hop: Rank, req: FetchRequest) -> IvResult<FetchReply> {
        let ns = self.cluster.lookup(hop, self.nsid)?;
        Ok(fetch::on_fetch_rpc(&ns, req).await)
    }

    async fn send_update(&self, hop: Rank, req: UpdateRequest) -> IvResult<UpdateReply> {
        let ns = self.cluster.lookup(hop, self.nsid)?;
        Ok(update::on_update_rpc(&ns, req).await)
    }

    async fn send_sync(&self, target: Rank, req: SyncRequest) -> IvResult<SyncReply> {
        let ns = self.cluster.lookup(target, self.nsid)?;
        Ok(sync::on_sync_rpc(&ns, req).await)
    }

    async fn bulk_transfer(&self, desc: BulkTransferDesc) -> IvResult<usize> {
        let remote_ns = self.cluster.lookup(desc.remote.owner, self.nsid)?;
        let local_ns = self.cluster.lookup(desc.local.owner, self.nsid)?;

        match desc.op {
            BulkOp::Put => {
                let value = local_ns.bulk.read(desc.local.id)?;
                let len = value.total_len();
                remote_ns.bulk.write(desc.remote.id, value)?;
                Ok(len)
            }
            BulkOp::Get => {
                let value = remote_ns.bulk.read(desc.remote.id)?;
                let len = value.total_len();
                local_ns.bulk.write(desc.local.id, value)?;
                Ok(len)
            }
        }
    }
}
