//! Transport abstraction the fetch/update/sync engines dispatch
//! through. The engine never knows whether a hop is a same-process
//! peer, a Unix socket, or real RDMA; it only calls `Transport`
//! methods, the same way `moq-relay-ietf`'s engine code only calls the
//! `Coordinator` trait and never touches Redis/files directly.

use async_trait::async_trait;

use crate::bulk::BulkTransferDesc;
use crate::error::IvResult;
use crate::rpc::{FetchReply, FetchRequest, SyncReply, SyncRequest, UpdateReply, UpdateRequest};
use crate::value::Rank;

/// Everything a namespace needs to reach other ranks: send the three
/// RPC families, and move bulk payloads.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a FETCH request to `hop` and await its reply.
    async fn send_fetch(&self, hop: Rank, req: FetchRequest) -> IvResult<FetchReply>;

    /// Send an UPDATE request to `hop` and await its reply.
    async fn send_update(&self, hop: Rank, req: UpdateRequest) -> IvResult<UpdateReply>;

    /// Send a SYNC request to `target` and await its reply. The sync
    /// engine fans this out itself (one call per recipient) rather
    /// than asking the transport to broadcast, so that per-recipient
    /// failures are independently observable.
    async fn send_sync(&self, target: Rank, req: SyncRequest) -> IvResult<SyncReply>;

    /// Move bytes between a remote bulk handle and a local one.
    /// Returns the number of bytes moved.
    async fn bulk_transfer(&self, desc: BulkTransferDesc) -> IvResult<usize>;
}
