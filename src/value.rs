use serde::{Deserialize, Serialize};
use std::fmt;

/// Rank of a process within the group a namespace is bound to.
pub type Rank = u32;

/// Opaque key. Equality is byte-wise; the engine never interprets the
/// contents.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IvKey(Vec<u8>);

impl IvKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Deep copy suitable for keys that must outlive the caller's buffer
    /// (in-progress table entries, eager sync continuations).
    pub fn to_owned_copy(&self) -> Self {
        Self(self.0.clone())
    }
}

impl fmt::Debug for IvKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IvKey({} bytes)", self.0.len())
    }
}

/// A single scatter/gather segment of an `IvValue`.
pub type IvSegment = Vec<u8>;

/// Scatter/gather value. The engine treats the contents as opaque but
/// must preserve segment boundaries across transfers.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IvValue {
    segments: Vec<IvSegment>,
}

impl IvValue {
    pub fn new(segments: Vec<IvSegment>) -> Self {
        Self { segments }
    }

    pub fn single(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            segments: vec![bytes.into()],
        }
    }

    pub fn segments(&self) -> &[IvSegment] {
        &self.segments
    }

    pub fn total_len(&self) -> usize {
        self.segments.iter().map(|s| s.len()).sum()
    }

    /// Flatten into a single contiguous buffer. Used by the bulk
    /// transfer adapter, which moves bytes but is indifferent to
    /// segment boundaries of the wire encoding.
    pub fn to_contiguous(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total_len());
        for seg in &self.segments {
            out.extend_from_slice(seg);
        }
        out
    }
}

impl fmt::Debug for IvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IvValue({} segments, {} bytes)",
            self.segments.len(),
            self.total_len()
        )
    }
}

/// Opaque version token, passed through unchanged.
pub type IvVer = u64;

/// Originator policy for the first upstream hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Shortcut {
    /// Send the first hop straight to the root.
    ToRoot,
    /// Send the first hop to the immediate tree parent.
    ToParent,
}

/// Sync mode: how the originator's completion relates to the
/// post-update collective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    /// No fan-out at all.
    None,
    /// Fan out, complete the caller without waiting.
    Lazy,
    /// Fan out, complete the caller only after the collective returns.
    Eager,
}

/// Sync event: what value recipients of the collective should cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncEvent {
    /// Refresh peers with the new value.
    Update,
    /// Tell peers only that their cached value is stale.
    Notify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncType {
    pub mode: SyncMode,
    pub event: SyncEvent,
}

impl SyncType {
    pub const fn new(mode: SyncMode, event: SyncEvent) -> Self {
        Self { mode, event }
    }
}
