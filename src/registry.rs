//! Process-wide namespace registry.
//!
//! Mutation and lookup are both serialized by one `std::sync::Mutex`,
//! the same "single lock held only across insert/remove/lookup"
//! discipline `moq-relay-ietf`'s `Locals` uses for its track registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::bulk::BulkTable;
use crate::class::ClassEntry;
use crate::class::ClassTable;
use crate::error::{IvError, IvResult};
use crate::namespace::{GlobalNamespace, GroupId, Namespace, NamespaceId};
use crate::topology::Topology;
use crate::transport::Transport;
use crate::value::Rank;

#[derive(Default)]
struct RegistryState {
    next_nsid: u64,
    namespaces: HashMap<NamespaceId, Arc<Namespace>>,
}

/// `(rank, nsid) -> Namespace` mapping for one process.
pub struct Registry {
    self_rank: Rank,
    state: Mutex<RegistryState>,
}

impl Registry {
    pub fn new(self_rank: Rank) -> Arc<Self> {
        Arc::new(Self {
            self_rank,
            state: Mutex::new(RegistryState::default()),
        })
    }

    pub fn self_rank(&self) -> Rank {
        self.self_rank
    }

    /// Assigns `(self_rank, next_nsid)`, installs the namespace in the
    /// registry, and returns both the local handle and its
    /// serializable form for `namespace_attach` on other ranks.
    ///
    /// `transport_for` is handed the freshly assigned `NamespaceId` so
    /// a cluster (or any multi-rank `Transport`) can bind its routing
    /// table to this exact namespace before the `Namespace` exists.
    pub fn create(
        &self,
        group: GroupId,
        topology: Topology,
        classes: Vec<ClassEntry>,
        transport_for: impl FnOnce(NamespaceId) -> Arc<dyn Transport>,
    ) -> IvResult<(Arc<Namespace>, GlobalNamespace)> {
        if !group.members.contains(&self.self_rank) {
            return Err(IvError::InvalidArgument(
                "creator rank is not a member of its own group".into(),
            ));
        }

        let mut state = self.state.lock().unwrap();
        let local_nsid = state.next_nsid;
        state.next_nsid += 1;

        let id = NamespaceId {
            creator_rank: self.self_rank,
            local_nsid,
        };
        let global = GlobalNamespace {
            id,
            class_count: classes.len() as u32,
            topology,
            group,
        };

        let transport = transport_for(id);
        let ns = Namespace::new(
            global.clone(),
            self.self_rank,
            ClassTable::new(classes),
            transport,
            Arc::new(BulkTable::default()),
        );
        state.namespaces.insert(id, ns.clone());

        Ok((ns, global))
    }

    /// Builds a local `Namespace` that shares the foreign
    /// `NamespaceId`, letting this rank participate in requests
    /// initiated elsewhere.
    pub fn attach(
        &self,
        global: GlobalNamespace,
        classes: Vec<ClassEntry>,
        transport_for: impl FnOnce(NamespaceId) -> Arc<dyn Transport>,
    ) -> IvResult<Arc<Namespace>> {
        if classes.len() as u32 != global.class_count {
            return Err(IvError::InvalidArgument(format!(
                "attach supplied {} classes, namespace declares {}",
                classes.len(),
                global.class_count
            )));
        }
        if !global.group.members.contains(&self.self_rank) {
            return Err(IvError::InvalidArgument(
                "attaching rank is not a member of the namespace's group".into(),
            ));
        }

        let mut state = self.state.lock().unwrap();
        if state.namespaces.contains_key(&global.id) {
            return Err(IvError::NamespaceAlreadyAttached);
        }

        let id = global.id;
        let transport = transport_for(id);
        let ns = Namespace::new(
            global,
            self.self_rank,
            ClassTable::new(classes),
            transport,
            Arc::new(BulkTable::default()),
        );
        state.namespaces.insert(id, ns.clone());

        Ok(ns)
    }

    /// Removes a namespace from the registry. Destroying a namespace
    /// with fetches or updates still in flight is rejected rather than
    /// silently racing them: callers must drain first.
    pub fn destroy(&self, id: NamespaceId) -> IvResult<()> {
        let mut state = self.state.lock().unwrap();
        match state.namespaces.get(&id) {
            None => Err(IvError::NamespaceNotFound),
            Some(ns) => {
                if ns.in_progress.try_lock().map(|t| !t.is_empty()).unwrap_or(true) {
                    return Err(IvError::InvalidArgument(
                        "namespace has in-flight requests; drain before destroy".into(),
                    ));
                }
                state.namespaces.remove(&id);
                Ok(())
            }
        }
    }

    /// Used by incoming RPC handlers to resolve the target namespace.
    pub fn lookup(&self, id: NamespaceId) -> Option<Arc<Namespace>> {
        self.state.lock().unwrap().namespaces.get(&id).cloned()
    }
}
