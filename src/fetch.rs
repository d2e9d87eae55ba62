//! Fetch engine: pull a key's current value, forwarding toward the
//! root one hop at a time and coalescing concurrent identical fetches
//! through the namespace's in-progress table.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::bulk::{BulkHandle, BulkMode, BulkOp, BulkTransferDesc};
use crate::class::{Disposition, Perm};
use crate::error::{IvError, IvResult};
use crate::inprogress::PendingFetch;
use crate::namespace::Namespace;
use crate::rpc::{FetchReply, FetchRequest};
use crate::value::{IvKey, IvValue, IvVer, Rank, Shortcut};

/// Fetch `key` under `class_id`, returning its current value.
///
/// Tries the local cache first via `on_get`/`on_fetch` regardless of
/// whether this rank is root, since any rank may already hold the answer.
/// Only escalates toward the root when the class reports
/// `Disposition::Forward`, and only as far as it needs to: `shortcut`
/// picks whether that first hop goes straight to root or to the
/// immediate tree parent.
pub async fn fetch(
    ns: &Arc<Namespace>,
    class_id: u32,
    key: &IvKey,
    ver: IvVer,
    shortcut: Shortcut,
) -> IvResult<IvValue> {
    let class = ns
        .classes
        .class_ops(class_id)
        .ok_or(IvError::UnknownClass(class_id))?;
    let root = class.callbacks.on_hash(&ns.id(), key).await?;
    let is_root = root == ns.self_rank;

    let mut value = class
        .callbacks
        .on_get(&ns.id(), key, ver, Perm::Read)
        .await?;
    let disposition = class
        .callbacks
        .on_fetch(&ns.id(), key, ver, is_root, &mut value)
        .await;

    match disposition {
        Ok(Disposition::Ok) => {
            class
                .callbacks
                .on_put(&ns.id(), key, ver, value.clone())
                .await?;
            Ok(value)
        }
        Ok(Disposition::Forward) => {
            class.callbacks.on_put(&ns.id(), key, ver, value).await?;
            if is_root {
                return Err(IvError::ForwardAtRoot(root));
            }
            let hop = match shortcut {
                Shortcut::ToRoot => root,
                Shortcut::ToParent => ns.parent_of(root, ns.self_rank),
            };
            let fetched = issue_fetch_rpc(ns, class_id, key, ver, hop, root).await?;
            class
                .callbacks
                .on_refresh(&ns.id(), key, ver, Some(&fetched), false)
                .await?;
            Ok(fetched)
        }
        Err(e) => {
            let _ = class.callbacks.on_put(&ns.id(), key, ver, value).await;
            Err(e)
        }
    }
}

/// Coalesced dispatch of a FETCH RPC to `hop`. Concurrent calls for
/// the same `key` within this namespace join the same in-flight
/// request instead of issuing their own: the first caller becomes the
/// leader and performs the RPC, every caller (leader included) waits
/// on its own oneshot channel for the shared result.
async fn issue_fetch_rpc(
    ns: &Arc<Namespace>,
    class_id: u32,
    key: &IvKey,
    ver: IvVer,
    hop: Rank,
    root: Rank,
) -> IvResult<IvValue> {
    let (tx, rx) = oneshot::channel();
    let completion = PendingFetch::new(Box::new(move |result: IvResult<IvValue>| {
        Box::pin(async move {
            let _ = tx.send(result);
        }) as Pin<Box<dyn Future<Output = ()> + Send>>
    }));

    let mut table = ns.in_progress.lock().await;
    let is_leader = !table.contains(key);
    if is_leader {
        table.insert(key);
    }
    table
        .append_pending(key, completion)
        .ok()
        .expect("entry present: just inserted, or a leader is already holding one");
    drop(table);

    if is_leader {
        let result = dispatch_fetch_rpc(ns, class_id, key, ver, hop, root).await;

        let mut table = ns.in_progress.lock().await;
        let entry = table.remove(key);
        drop(table);

        if let Some(entry) = entry {
            for pending in entry.pending {
                pending.run(result.clone()).await;
            }
        }
    }

    rx.await
        .map_err(|_| IvError::Transport("fetch completion channel dropped".into()))?
}

/// Performs one FETCH RPC hop: registers a local bulk handle for the
/// reply to land in, sends the request, and reads the handle back out.
async fn dispatch_fetch_rpc(
    ns: &Arc<Namespace>,
    class_id: u32,
    key: &IvKey,
    ver: IvVer,
    hop: Rank,
    root: Rank,
) -> IvResult<IvValue> {
    let local_id = ns.bulk.create(IvValue::default(), BulkMode::Rw);
    let req = FetchRequest {
        nsid: ns.id(),
        key: key.to_owned_copy(),
        class_id,
        ver,
        value_bulk: BulkHandle {
            owner: ns.self_rank,
            id: local_id,
        },
        root,
    };

    let result = async {
        let reply = ns.transport.send_fetch(hop, req).await?;
        if !reply.is_ok() {
            return Err(IvError::Transport(format!(
                "fetch rpc to rank {hop} returned rc {}",
                reply.rc
            )));
        }
        ns.bulk.read(local_id)
    }
    .await;

    ns.bulk.free(local_id);
    result
}

/// Server-side handler for an incoming FETCH request, run on the
/// receiving rank. Answers locally when possible, forwards toward root
/// otherwise, and PUTs the resolved value into the caller's remote
/// bulk handle before replying.
pub async fn on_fetch_rpc(ns: &Arc<Namespace>, req: FetchRequest) -> FetchReply {
    match on_fetch_rpc_inner(ns, &req).await {
        Ok(value) => match put_reply_value(ns, &req, value).await {
            Ok(()) => FetchReply::ok(),
            Err(e) => {
                log::warn!("fetch reply bulk transfer to rank {} failed: {e}", req.value_bulk.owner);
                FetchReply::err(e.to_rc())
            }
        },
        Err(e) => {
            log::warn!("fetch rpc for nsid {:?} failed: {e}", req.nsid);
            FetchReply::err(e.to_rc())
        }
    }
}

async fn on_fetch_rpc_inner(ns: &Arc<Namespace>, req: &FetchRequest) -> IvResult<IvValue> {
    let class = ns
        .classes
        .class_ops(req.class_id)
        .ok_or(IvError::UnknownClass(req.class_id))?;
    let is_root = ns.self_rank == req.root;

    let mut value = class
        .callbacks
        .on_get(&ns.id(), &req.key, req.ver, Perm::Read)
        .await?;
    let disposition = class
        .callbacks
        .on_fetch(&ns.id(), &req.key, req.ver, is_root, &mut value)
        .await;

    match disposition {
        Ok(Disposition::Ok) => {
            class
                .callbacks
                .on_put(&ns.id(), &req.key, req.ver, value.clone())
                .await?;
            Ok(value)
        }
        Ok(Disposition::Forward) => {
            class
                .callbacks
                .on_put(&ns.id(), &req.key, req.ver, value)
                .await?;
            if is_root {
                return Err(IvError::ForwardAtRoot(req.root));
            }
            let hop = ns.parent_of(req.root, ns.self_rank);
            let fetched =
                issue_fetch_rpc(ns, req.class_id, &req.key, req.ver, hop, req.root).await?;
            let _ = class
                .callbacks
                .on_refresh(&ns.id(), &req.key, req.ver, Some(&fetched), false)
                .await;
            Ok(fetched)
        }
        Err(e) => {
            let _ = class.callbacks.on_put(&ns.id(), &req.key, req.ver, value).await;
            Err(e)
        }
    }
}

async fn put_reply_value(ns: &Arc<Namespace>, req: &FetchRequest, value: IvValue) -> IvResult<()> {
    let len = value.total_len();
    let local_id = ns.bulk.create(value, BulkMode::Ro);
    let desc = BulkTransferDesc {
        op: BulkOp::Put,
        remote: req.value_bulk,
        local: BulkHandle {
            owner: ns.self_rank,
            id: local_id,
        },
        len,
    };
    let result = ns.transport.bulk_transfer(desc).await.map(|_| ());
    ns.bulk.free(local_id);
    result
}
