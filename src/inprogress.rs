//! Single-flight coalescing table for concurrent identical fetches.
//!
//! A `PendingFetch` is a type-erased continuation: calling it runs
//! whatever the queued caller needed to happen once the coalesced
//! fetch resolves, whether that's completing the original caller's
//! future, or (for a forwarder) bulk-PUTting the cached value into a
//! child's remote bulk handle and replying. An owned `FnOnce` closure
//! standing in for what would otherwise be a heap-allocated callback
//! struct freed on completion.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;

use crate::error::IvResult;
use crate::value::IvKey;
use crate::value::IvValue;

pub type FetchCompletion =
    Box<dyn FnOnce(IvResult<IvValue>) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// A fetch continuation frozen at the moment it discovered a prior
/// identical fetch in flight.
pub struct PendingFetch {
    pub complete: FetchCompletion,
}

impl PendingFetch {
    pub fn new(complete: FetchCompletion) -> Self {
        Self { complete }
    }

    pub async fn run(self, result: IvResult<IvValue>) {
        (self.complete)(result).await
    }
}

/// `{ key_bytes, pending: list<PendingFetch> }`, keyed uniquely within
/// a namespace by `key_bytes`.
pub struct InProgressEntry {
    pub key_bytes: IvKey,
    pub pending: VecDeque<PendingFetch>,
}

/// Per-namespace mapping from key bytes to pending fetch continuations.
/// All operations are expected to run under the owning
/// `Namespace::in_progress` lock.
#[derive(Default)]
pub struct InProgressTable {
    entries: HashMap<IvKey, InProgressEntry>,
}

impl InProgressTable {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find(&self, key: &IvKey) -> Option<&InProgressEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &IvKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Inserts a fresh entry for `key`. The caller is responsible for
    /// invariant 1 (at most one entry per key): call `contains` first
    /// under the same lock acquisition.
    pub fn insert(&mut self, key: &IvKey) {
        self.entries.insert(
            key.to_owned_copy(),
            InProgressEntry {
                key_bytes: key.to_owned_copy(),
                pending: VecDeque::new(),
            },
        );
    }

    /// Removes the entry for `key`, returning its pending list (which
    /// should already have been drained by the caller).
    pub fn remove(&mut self, key: &IvKey) -> Option<InProgressEntry> {
        self.entries.remove(key)
    }

    /// Appends a continuation to the pending list of an existing entry.
    /// Returns the continuation back if no entry exists for `key`.
    pub fn append_pending(&mut self, key: &IvKey, pending: PendingFetch) -> Result<(), PendingFetch> {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.pending.push_back(pending);
                Ok(())
            }
            None => Err(pending),
        }
    }
}
