use std::collections::BTreeMap;

use super::store::BucketKey;
use super::tree::GroupNode;

/// Finalized buckets handed from rotation to the drain side
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    buckets: BTreeMap<BucketKey, GroupNode>,
}

impl Snapshot {
    /// Number of buckets
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether no bucket was selected
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Bucket keys in ascending order
    pub fn keys(&self) -> impl Iterator<Item = BucketKey> + '_ {
        self.buckets.keys().copied()
    }

    /// Borrow one bucket
    pub fn get(&self, key: BucketKey) -> Option<&GroupNode> {
        self.buckets.get(&key)
    }

    /// Iterate buckets in key order
    pub fn iter(&self) -> impl Iterator<Item = (BucketKey, &GroupNode)> {
        self.buckets.iter().map(|(k, v)| (*k, v))
    }
}

impl FromIterator<(BucketKey, GroupNode)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (BucketKey, GroupNode)>>(iter: I) -> Self {
        Self {
            buckets: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Snapshot {
    type Item = (BucketKey, GroupNode);
    type IntoIter = std::collections::btree_map::IntoIter<BucketKey, GroupNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.buckets.into_iter()
    }
}

/// Single-slot buffer between the rotation task and `drain_pending`
#[derive(Debug, Default)]
pub struct EmissionSlot {
    pending: Option<Snapshot>,
}

impl EmissionSlot {
    /// Create an empty slot
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a snapshot is waiting to be drained
    pub fn is_occupied(&self) -> bool {
        self.pending.is_some()
    }

    /// Place a snapshot in the slot.
    ///
    /// Empty snapshots leave the slot empty. Publishing into an occupied slot
    /// is refused and the snapshot is handed back.
    pub fn publish(&mut self, snapshot: Snapshot) -> Result<bool, Snapshot> {
        if self.pending.is_some() {
            return Err(snapshot);
        }
        if snapshot.is_empty() {
            return Ok(false);
        }
        self.pending = Some(snapshot);
        Ok(true)
    }

    /// Take the waiting snapshot, clearing the slot
    pub fn take(&mut self) -> Option<Snapshot> {
        self.pending.take()
    }
}
