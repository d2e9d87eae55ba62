//! Namespace identity and the local, non-serializable `Namespace`
//! record.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;

use crate::bulk::BulkTable;
use crate::class::ClassTable;
use crate::inprogress::InProgressTable;
use crate::topology::Topology;
use crate::transport::Transport;
use crate::value::Rank;

/// Globally unique namespace identifier: the creator's rank plus a
/// local counter the creator issues monotonically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamespaceId {
    pub creator_rank: Rank,
    pub local_nsid: u64,
}

/// The group a namespace is bound to. Membership is the contiguous
/// range `0..size` unless an explicit member list is supplied; a
/// group is usually just the whole job's process set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupId {
    pub name: String,
    pub members: Vec<Rank>,
}

impl GroupId {
    pub fn contiguous(name: impl Into<String>, size: u32) -> Self {
        Self {
            name: name.into(),
            members: (0..size).collect(),
        }
    }

    pub fn size(&self) -> u32 {
        self.members.len() as u32
    }
}

/// Serializable record returned by `namespace_create` and consumed by
/// `namespace_attach` on remote ranks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalNamespace {
    pub id: NamespaceId,
    pub class_count: u32,
    pub topology: Topology,
    pub group: GroupId,
}

/// Local, non-serializable namespace handle. Holds the
/// group handle (here, just the rank-set in `global.group`), the
/// transport context, the cached `self_rank`/`group_size`, the class
/// table, and the in-progress table behind its own lock; the registry
/// owns the canonical `Arc<Namespace>` and hands out clones of it to
/// callers.
pub struct Namespace {
    pub global: GlobalNamespace,
    pub self_rank: Rank,
    pub group_size: u32,
    pub classes: ClassTable,
    pub in_progress: AsyncMutex<InProgressTable>,
    pub transport: Arc<dyn Transport>,
    pub bulk: Arc<BulkTable>,
}

impl Namespace {
    pub fn new(
        global: GlobalNamespace,
        self_rank: Rank,
        classes: ClassTable,
        transport: Arc<dyn Transport>,
        bulk: Arc<BulkTable>,
    ) -> Arc<Self> {
        let group_size = global.group.size();
        Arc::new(Self {
            global,
            self_rank,
            group_size,
            classes,
            in_progress: AsyncMutex::new(InProgressTable::default()),
            transport,
            bulk,
        })
    }

    pub fn id(&self) -> NamespaceId {
        self.global.id
    }

    pub fn parent_of(&self, root: Rank, cur: Rank) -> Rank {
        self.global.topology.parent(root, cur, self.group_size)
    }

    /// Members of the group excluding `self_rank`, in membership order,
    /// used by the sync engine's collective fan-out.
    pub fn peers_excluding_self(&self) -> Vec<Rank> {
        self.global
            .group
            .members
            .iter()
            .copied()
            .filter(|&r| r != self.self_rank)
            .collect()
    }
}
