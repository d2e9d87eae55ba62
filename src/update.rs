//! Update engine: push a new value (or an invalidation) toward the
//! root, one hop at a time, and, once the write lands, hand off to the
//! sync engine for the post-update collective back at the originator.

use std::sync::Arc;

use crate::bulk::{BulkHandle, BulkMode, BulkOp, BulkTransferDesc};
use crate::class::Disposition;
use crate::error::{IvError, IvResult};
use crate::namespace::Namespace;
use crate::rpc::{UpdateReply, UpdateRequest};
use crate::sync::trigger_sync;
use crate::value::{IvKey, IvValue, IvVer, Rank, SyncType};

/// Write a new value for `key`. Forwards toward the root if this rank
/// can't accept the write locally; once the write lands, the sync
/// engine fans the new value back out from this rank per `sync_type`.
pub async fn update(
    ns: &Arc<Namespace>,
    class_id: u32,
    key: &IvKey,
    ver: IvVer,
    value: IvValue,
    sync_type: SyncType,
) -> IvResult<()> {
    apply_update(ns, class_id, key, ver, Some(value), sync_type).await
}

/// Invalidate `key`, an update with no carried value.
pub async fn invalidate(
    ns: &Arc<Namespace>,
    class_id: u32,
    key: &IvKey,
    ver: IvVer,
    sync_type: SyncType,
) -> IvResult<()> {
    apply_update(ns, class_id, key, ver, None, sync_type).await
}

/// Originator-side entry point: accept locally, or forward toward root
/// and wait for the write to land. Either way, once the write has been
/// accepted this rank (not the root, unless it's the same rank) drives
/// the post-update sync, matching the protocol's client-side update
/// response handler: a forwarder just propagates the reply upward, and
/// only the rank that made the original call invokes the sync engine.
async fn apply_update(
    ns: &Arc<Namespace>,
    class_id: u32,
    key: &IvKey,
    ver: IvVer,
    value: Option<IvValue>,
    sync_type: SyncType,
) -> IvResult<()> {
    let class = ns
        .classes
        .class_ops(class_id)
        .ok_or(IvError::UnknownClass(class_id))?;
    let root = class.callbacks.on_hash(&ns.id(), key).await?;
    let is_root = root == ns.self_rank;

    let disposition = class
        .callbacks
        .on_update(&ns.id(), key, ver, is_root, value.as_ref())
        .await?;

    match disposition {
        Disposition::Ok => trigger_sync(ns, class_id, key, ver, value.as_ref(), sync_type).await,
        Disposition::Forward => {
            if is_root {
                return Err(IvError::ForwardAtRoot(root));
            }
            let hop = ns.parent_of(root, ns.self_rank);
            let value_for_sync = value.clone();
            issue_update_rpc(ns, class_id, key, ver, hop, root, ns.self_rank, sync_type, value).await?;
            trigger_sync(ns, class_id, key, ver, value_for_sync.as_ref(), sync_type).await
        }
    }
}

/// Sends an UPDATE RPC one hop upward. Unlike fetch, updates are not
/// coalesced, each write is its own distinct RPC.
async fn issue_update_rpc(
    ns: &Arc<Namespace>,
    class_id: u32,
    key: &IvKey,
    ver: IvVer,
    hop: Rank,
    root: Rank,
    caller: Rank,
    sync_type: SyncType,
    value: Option<IvValue>,
) -> IvResult<()> {
    let value_bulk = value.map(|v| BulkHandle {
        owner: ns.self_rank,
        id: ns.bulk.create(v, BulkMode::Ro),
    });

    let req = UpdateRequest {
        nsid: ns.id(),
        key: key.to_owned_copy(),
        sync_type,
        value_bulk,
        root,
        caller,
        class_id,
        ver,
    };

    let result = async {
        let reply = ns.transport.send_update(hop, req).await?;
        if !reply.is_ok() {
            return Err(IvError::Transport(format!(
                "update rpc to rank {hop} returned rc {}",
                reply.rc
            )));
        }
        Ok(())
    }
    .await;

    if let Some(handle) = value_bulk {
        ns.bulk.free(handle.id);
    }
    result
}

/// Server-side handler for an incoming UPDATE request. Accepts locally
/// at the root, or keeps forwarding toward it; never triggers sync
/// itself, since a forwarding hop is relaying someone else's call, not
/// making one of its own.
pub async fn on_update_rpc(ns: &Arc<Namespace>, req: UpdateRequest) -> UpdateReply {
    match on_update_rpc_inner(ns, &req).await {
        Ok(()) => UpdateReply::ok(),
        Err(e) => {
            log::warn!("update rpc for nsid {:?} failed: {e}", req.nsid);
            UpdateReply::err(e.to_rc() as u64)
        }
    }
}

async fn on_update_rpc_inner(ns: &Arc<Namespace>, req: &UpdateRequest) -> IvResult<()> {
    let class = ns
        .classes
        .class_ops(req.class_id)
        .ok_or(IvError::UnknownClass(req.class_id))?;
    let is_root = ns.self_rank == req.root;

    let value = match req.value_bulk {
        Some(remote) => Some(pull_bulk_value(ns, remote).await?),
        None => None,
    };

    let disposition = class
        .callbacks
        .on_update(&ns.id(), &req.key, req.ver, is_root, value.as_ref())
        .await?;

    match disposition {
        Disposition::Ok => Ok(()),
        Disposition::Forward => {
            if is_root {
                return Err(IvError::ForwardAtRoot(req.root));
            }
            let hop = ns.parent_of(req.root, ns.self_rank);
            issue_update_rpc(
                ns,
                req.class_id,
                &req.key,
                req.ver,
                hop,
                req.root,
                req.caller,
                req.sync_type,
                value,
            )
            .await
        }
    }
}

/// Pulls the value behind a caller's remote bulk handle into a
/// scratch local handle, reads it out, and frees the scratch.
pub(crate) async fn pull_bulk_value(ns: &Arc<Namespace>, remote: BulkHandle) -> IvResult<IvValue> {
    let local_id = ns.bulk.create(IvValue::default(), BulkMode::Rw);
    let desc = BulkTransferDesc {
        op: BulkOp::Get,
        remote,
        local: BulkHandle {
            owner: ns.self_rank,
            id: local_id,
        },
        len: 0,
    };

    let result = async {
        ns.transport.bulk_transfer(desc).await?;
        ns.bulk.read(local_id)
    }
    .await;

    ns.bulk.free(local_id);
    result
}
