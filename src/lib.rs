//! Tree-forwarded Incast Variable (IV) propagation across a process
//! group.
//!
//! A group of ranks is arranged into a spanning tree rooted, per key,
//! at a rank chosen by the class's `on_hash` upcall. `fetch` pulls a
//! key's value up that tree toward the caller; `update`/`invalidate`
//! push a write down toward the root; once a write lands, the sync
//! engine fans a refresh back out to the rest of the group. Concurrent
//! fetches for the same key within a namespace are coalesced onto one
//! in-flight RPC rather than each issuing their own.
//!
//! The engine is transport-agnostic: every hop and bulk transfer goes
//! through the `Transport` trait, so embedders can back it with real
//! RDMA, a QUIC stream, or (for tests) the in-process `Cluster`.

mod bulk;
mod class;
mod cluster;
mod error;
mod fetch;
mod inprogress;
mod namespace;
mod registry;
mod rpc;
mod sync;
mod topology;
mod transport;
mod update;
mod value;

pub use bulk::*;
pub use class::*;
pub use cluster::*;
pub use error::*;
pub use fetch::{fetch, on_fetch_rpc};
pub use inprogress::{FetchCompletion, PendingFetch};
pub use namespace::*;
pub use registry::*;
pub use rpc::*;
pub use sync::{on_sync_rpc, trigger_sync};
pub use topology::*;
pub use transport::*;
pub use update::{invalidate, on_update_rpc, update};
pub use value::*;
