//! Sync engine: the post-update collective. Once an update (or
//! invalidate) lands, the rank that made the original call (the
//! originator, not necessarily the root) refreshes itself and then the
//! rest of the group, per the caller's `SyncType`: whether to fan out
//! at all, whether the caller waits for the collective to finish, and
//! whether peers receive the new value or just a staleness notice.

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};

use crate::bulk::{BulkHandle, BulkMode};
use crate::error::{IvError, IvResult};
use crate::namespace::Namespace;
use crate::rpc::SyncRequest;
use crate::update::pull_bulk_value;
use crate::value::{IvKey, IvValue, IvVer, Rank, SyncEvent, SyncMode, SyncType};

/// Refreshes this rank locally, then (unless `SyncMode::None`) fans
/// the refresh out to the rest of the group. `LAZY` returns as soon as
/// the fan-out is dispatched; `EAGER` waits for every peer to reply
/// and folds their statuses into one aggregate result.
pub async fn trigger_sync(
    ns: &Arc<Namespace>,
    class_id: u32,
    key: &IvKey,
    ver: IvVer,
    value: Option<&IvValue>,
    sync_type: SyncType,
) -> IvResult<()> {
    let class = ns
        .classes
        .class_ops(class_id)
        .ok_or(IvError::UnknownClass(class_id))?;
    class
        .callbacks
        .on_refresh(&ns.id(), key, ver, value, value.is_none())
        .await?;

    if sync_type.mode == SyncMode::None {
        return Ok(());
    }

    let peers = ns.peers_excluding_self();
    if peers.is_empty() {
        return Ok(());
    }

    let ns = ns.clone();
    let key = key.to_owned_copy();
    let value = value.cloned();

    match sync_type.mode {
        SyncMode::Lazy => {
            tokio::spawn(async move {
                if let Err(e) = fan_out_sync(&ns, class_id, &key, ver, value.as_ref(), sync_type, &peers).await {
                    log::warn!("lazy sync fan-out for nsid {:?} failed: {e}", ns.id());
                }
            });
            Ok(())
        }
        SyncMode::Eager => {
            fan_out_sync(&ns, class_id, &key, ver, value.as_ref(), sync_type, &peers).await
        }
        SyncMode::None => unreachable!(),
    }
}

async fn fan_out_sync(
    ns: &Arc<Namespace>,
    class_id: u32,
    key: &IvKey,
    ver: IvVer,
    value: Option<&IvValue>,
    sync_type: SyncType,
    peers: &[Rank],
) -> IvResult<()> {
    let value_bulk = value.map(|v| BulkHandle {
        owner: ns.self_rank,
        id: ns.bulk.create(v.clone(), BulkMode::Ro),
    });

    let mut inflight = FuturesUnordered::new();
    for &peer in peers {
        let req = SyncRequest {
            nsid: ns.id(),
            key: key.to_owned_copy(),
            sync_type,
            class_id,
            ver,
            value_bulk,
        };
        let ns = ns.clone();
        inflight.push(async move { ns.transport.send_sync(peer, req).await });
    }

    // Aggregate: zero (success) stays zero, first non-zero wins.
    let mut aggregate: IvResult<()> = Ok(());
    while let Some(outcome) = inflight.next().await {
        if aggregate.is_err() {
            continue;
        }
        match outcome {
            Ok(reply) if reply.is_ok() => {}
            Ok(reply) => aggregate = Err(IvError::Transport(format!("sync rpc returned rc {}", reply.rc))),
            Err(e) => aggregate = Err(e),
        }
    }

    if let Some(handle) = value_bulk {
        ns.bulk.free(handle.id);
    }

    aggregate
}

/// Server-side handler for an incoming SYNC request.
pub async fn on_sync_rpc(ns: &Arc<Namespace>, req: SyncRequest) -> crate::rpc::SyncReply {
    match on_sync_rpc_inner(ns, &req).await {
        Ok(()) => crate::rpc::SyncReply::ok(),
        Err(e) => {
            log::warn!("sync rpc for nsid {:?} failed: {e}", req.nsid);
            crate::rpc::SyncReply::err(e.to_rc() as i32)
        }
    }
}

async fn on_sync_rpc_inner(ns: &Arc<Namespace>, req: &SyncRequest) -> IvResult<()> {
    let class = ns
        .classes
        .class_ops(req.class_id)
        .ok_or(IvError::UnknownClass(req.class_id))?;

    let value = match req.value_bulk {
        Some(remote) => Some(pull_bulk_value(ns, remote).await?),
        None => None,
    };

    match req.sync_type.event {
        SyncEvent::Update => {
            class
                .callbacks
                .on_refresh(&ns.id(), &req.key, req.ver, value.as_ref(), false)
                .await
        }
        SyncEvent::Notify => {
            class
                .callbacks
                .on_refresh(&ns.id(), &req.key, req.ver, None, true)
                .await
        }
    }
}
