//! Bulk transfer adapter, the RDMA-style registered
//! buffer primitive the engine moves value payloads through.
//!
//! The engine never touches the wire representation of a bulk
//! transfer; it only creates/frees handles and issues
//! `Transport::bulk_transfer` descriptors. `BulkTable` is the
//! per-rank registry a concrete `Transport` implementation uses to
//! back handles with actual bytes, analogous to how
//! `moq-native-ietf::quic::Client` backs a `web_transport::Session`
//! without the engine needing to know about QUIC.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::error::{IvError, IvResult};
use crate::value::{IvValue, Rank};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkMode {
    Ro,
    Rw,
}

/// Opaque local id for a registered buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct BulkId(pub u64);

/// A bulk handle as it crosses the wire: which rank owns the backing
/// buffer, and the local id on that rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BulkHandle {
    pub owner: Rank,
    pub id: BulkId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkOp {
    Get,
    Put,
}

/// Describes one bulk transfer: move `len` bytes between a remote
/// handle and a local one, in the direction given by `op`.
pub struct BulkTransferDesc {
    pub op: BulkOp,
    pub remote: BulkHandle,
    pub local: BulkHandle,
    pub len: usize,
}

/// Per-rank table of registered buffers. One instance lives on each
/// simulated rank's transport context.
#[derive(Default)]
pub struct BulkTable {
    next_id: AtomicU64,
    entries: Mutex<HashMap<BulkId, (IvValue, BulkMode)>>,
}

impl BulkTable {
    pub fn create(&self, value: IvValue, mode: BulkMode) -> BulkId {
        let id = BulkId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.lock().unwrap().insert(id, (value, mode));
        id
    }

    pub fn free(&self, id: BulkId) {
        self.entries.lock().unwrap().remove(&id);
    }

    pub fn read(&self, id: BulkId) -> IvResult<IvValue> {
        self.entries
            .lock()
            .unwrap()
            .get(&id)
            .map(|(v, _)| v.clone())
            .ok_or_else(|| IvError::Bulk(format!("unknown local bulk handle {id:?}")))
    }

    /// Overwrite the contents behind a handle. Used when a PUT lands
    /// on a read-write handle (the update-engine's caller-supplied
    /// bulk, or a fetch's answer landing on the originator's buffer).
    pub fn write(&self, id: BulkId, value: IvValue) -> IvResult<()> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(&id) {
            Some((slot, mode)) => {
                if *mode == BulkMode::Ro {
                    return Err(IvError::Bulk(format!(
                        "bulk handle {id:?} is read-only, cannot PUT into it"
                    )));
                }
                *slot = value;
                Ok(())
            }
            None => Err(IvError::Bulk(format!("unknown local bulk handle {id:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_after_create_round_trips_the_value() {
        let table = BulkTable::default();
        let value = IvValue::single(b"payload".to_vec());
        let id = table.create(value.clone(), BulkMode::Rw);
        assert_eq!(table.read(id).unwrap(), value);
    }

    #[test]
    fn read_after_free_fails() {
        let table = BulkTable::default();
        let id = table.create(IvValue::default(), BulkMode::Rw);
        table.free(id);
        assert!(table.read(id).is_err());
    }

    #[test]
    fn write_into_read_only_handle_is_rejected() {
        let table = BulkTable::default();
        let id = table.create(IvValue::single(b"ro".to_vec()), BulkMode::Ro);
        assert!(table.write(id, IvValue::single(b"overwrite".to_vec())).is_err());
    }

    #[test]
    fn write_into_read_write_handle_updates_it() {
        let table = BulkTable::default();
        let id = table.create(IvValue::default(), BulkMode::Rw);
        let value = IvValue::single(b"updated".to_vec());
        table.write(id, value.clone()).unwrap();
        assert_eq!(table.read(id).unwrap(), value);
    }
}
