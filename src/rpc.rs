//! Internal RPC wire contracts, field-level.
//!
//! These are the three request/reply families the tree-forwarded
//! engine exchanges between ranks: `FETCH` (upward read), `UPDATE`
//! (upward write/invalidate), and `SYNC` (the post-update collective).
//! Keys and namespace ids cross the wire as opaque bytes; endian-
//! agnostic marshaling is explicitly out of scope, so `serde`/JSON
//! stands in for a hand-rolled binary codec the same way
//! `moq-transport`'s message types lean on `serde` rather than
//! inventing one.

use serde::{Deserialize, Serialize};

use crate::bulk::BulkHandle;
use crate::namespace::NamespaceId;
use crate::value::{IvKey, IvVer, Rank, SyncType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    pub nsid: NamespaceId,
    pub key: IvKey,
    pub class_id: u32,
    pub ver: IvVer,
    /// The caller's remote bulk handle the value is PUT into.
    pub value_bulk: BulkHandle,
    pub root: Rank,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchReply {
    pub rc: u32,
}

impl FetchReply {
    pub fn ok() -> Self {
        Self { rc: 0 }
    }

    pub fn err(code: u32) -> Self {
        Self { rc: code.max(1) }
    }

    pub fn is_ok(&self) -> bool {
        self.rc == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub nsid: NamespaceId,
    pub key: IvKey,
    pub sync_type: SyncType,
    /// `None` for the invalidate form of update.
    pub value_bulk: Option<BulkHandle>,
    pub root: Rank,
    pub caller: Rank,
    pub class_id: u32,
    pub ver: IvVer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateReply {
    pub rc: u64,
}

impl UpdateReply {
    pub fn ok() -> Self {
        Self { rc: 0 }
    }

    pub fn err(code: u64) -> Self {
        Self { rc: code.max(1) }
    }

    pub fn is_ok(&self) -> bool {
        self.rc == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequest {
    pub nsid: NamespaceId,
    pub key: IvKey,
    pub sync_type: SyncType,
    pub class_id: u32,
    pub ver: IvVer,
    /// The collective bulk handle carrying the new value, or `None`
    /// for invalidate/notify.
    pub value_bulk: Option<BulkHandle>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReply {
    pub rc: i32,
}

impl SyncReply {
    pub fn ok() -> Self {
        Self { rc: 0 }
    }

    pub fn err(code: i32) -> Self {
        Self { rc: code.max(1) }
    }

    pub fn is_ok(&self) -> bool {
        self.rc == 0
    }
}
