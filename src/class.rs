//! The per-class upcall pack, the embedder's
//! implementation of the protocol's forwarding decisions.
//!
//! Modeled the same way `moq-relay-ietf` models `Coordinator`: an
//! `#[async_trait]` interface with one implementation per class,
//! stored behind an `Arc<dyn Callbacks>` so a namespace's class table
//! can hold a heterogeneous set of them.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::IvResult;
use crate::namespace::NamespaceId;
use crate::value::{IvKey, IvValue, IvVer, Rank};

/// Permission requested from `on_get`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Perm {
    Read,
    Write,
}

/// The two-way result of `on_fetch`/`on_update`: answered locally, or
/// escalate toward root. Genuine failures are the `Err` side of the
/// enclosing `IvResult`, never a variant here: forwarding is a
/// routing decision, not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ok,
    Forward,
}

impl Disposition {
    pub fn is_forward(self) -> bool {
        matches!(self, Disposition::Forward)
    }
}

/// Upcall interface implemented by the embedder, invoked by the
/// engine. One implementation per class.
#[async_trait]
pub trait Callbacks: Send + Sync {
    /// Deterministic: the same key on any rank yields the same root.
    async fn on_hash(&self, ns: &NamespaceId, key: &IvKey) -> IvResult<Rank>;

    /// Acquire an appropriately permissioned scatter list for the key.
    /// Must be released via `on_put` on every exit path.
    async fn on_get(&self, ns: &NamespaceId, key: &IvKey, ver: IvVer, perm: Perm) -> IvResult<IvValue>;

    /// Release a value previously acquired via `on_get`.
    async fn on_put(&self, ns: &NamespaceId, key: &IvKey, ver: IvVer, value: IvValue) -> IvResult<()>;

    /// `Ok(Disposition::Ok)` means `value` is now filled locally;
    /// `Ok(Disposition::Forward)` means escalate toward root.
    async fn on_fetch(
        &self,
        ns: &NamespaceId,
        key: &IvKey,
        ver: IvVer,
        is_root: bool,
        value: &mut IvValue,
    ) -> IvResult<Disposition>;

    /// Accept or escalate a write. `value` is `None` for the
    /// invalidate form of update.
    async fn on_update(
        &self,
        ns: &NamespaceId,
        key: &IvKey,
        ver: IvVer,
        is_root: bool,
        value: Option<&IvValue>,
    ) -> IvResult<Disposition>;

    /// Cache a newly known value, or mark the cached value stale when
    /// `invalidate` is set (in which case `value` is `None`).
    async fn on_refresh(
        &self,
        ns: &NamespaceId,
        key: &IvKey,
        ver: IvVer,
        value: Option<&IvValue>,
        invalidate: bool,
    ) -> IvResult<()>;
}

/// Per-namespace array of user callback packs.
pub struct ClassEntry {
    pub id: u32,
    pub feature_flags: u32,
    pub callbacks: Arc<dyn Callbacks>,
}

/// `class_ops(ns, class_id) -> callback_pack`, `None` if `class_id`
/// exceeds the namespace's class count.
#[derive(Default)]
pub struct ClassTable {
    classes: Vec<ClassEntry>,
}

impl ClassTable {
    pub fn new(classes: Vec<ClassEntry>) -> Self {
        Self { classes }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn class_ops(&self, class_id: u32) -> Option<&ClassEntry> {
        self.classes.get(class_id as usize)
    }
}
