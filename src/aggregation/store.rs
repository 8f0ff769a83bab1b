use std::collections::BTreeMap;
use std::fmt;
use tracing::trace;

use super::handoff::Snapshot;
use super::tree::GroupNode;
use crate::config::Settings;
use crate::event::{Event, Value};

/// Start of a time window, in Unix seconds
pub type BucketKey = i64;

/// Floor a Unix timestamp to the start of its window
pub fn bucket_key(timestamp: i64, window: i64) -> BucketKey {
    timestamp - timestamp.rem_euclid(window)
}

/// Why an event contributed nothing to the aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The measured field is absent or null
    MissingValue,
    /// The measured field is not numeric
    InvalidValue,
    /// The timestamp attribute is absent
    MissingTimestamp,
    /// The timestamp attribute is not a timestamp
    InvalidTimestamp,
    /// The event is older than the retention horizon or in the future
    OutOfWindow,
    /// A grouping dimension is absent or not a scalar
    MissingDimension,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            DropReason::MissingValue => "missing value",
            DropReason::InvalidValue => "non-numeric value",
            DropReason::MissingTimestamp => "missing timestamp",
            DropReason::InvalidTimestamp => "timestamp is not a time value",
            DropReason::OutOfWindow => "timestamp outside the retention horizon",
            DropReason::MissingDimension => "missing grouping dimension",
        };
        write!(f, "{}", reason)
    }
}

/// Time buckets currently accumulating, keyed by window start
#[derive(Debug, Clone, Default)]
pub struct BucketStore {
    buckets: BTreeMap<BucketKey, GroupNode>,
}

impl BucketStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into its bucket.
    ///
    /// Either exactly one leaf is updated or nothing changes. Every attribute
    /// is checked before the bucket is touched, so a rejected event never
    /// leaves empty buckets or levels behind.
    pub fn ingest(&mut self, event: &Event, settings: &Settings, now: i64) -> Result<BucketKey, DropReason> {
        let path = &settings.field_path;

        let value = match event.get(path.measured()) {
            None | Some(Value::Null) => return Err(DropReason::MissingValue),
            Some(v) => v.as_float().ok_or(DropReason::InvalidValue)?,
        };

        let timestamp = match event.get(&settings.timestamp_field) {
            None => {
                trace!("no {} in event", settings.timestamp_field);
                return Err(DropReason::MissingTimestamp);
            }
            Some(v) => match v.as_timestamp() {
                Some(ts) => ts.timestamp(),
                None => {
                    trace!("timestamp must be a time value, but it's {}", v.kind());
                    return Err(DropReason::InvalidTimestamp);
                }
            },
        };

        let age = now - timestamp;
        if age < 0 || age > settings.reserve_window {
            return Err(DropReason::OutOfWindow);
        }

        let dimension_values = path
            .dimensions()
            .iter()
            .map(|field| event.get(field).and_then(Value::as_group_key))
            .collect::<Option<Vec<String>>>()
            .ok_or(DropReason::MissingDimension)?;

        let key = bucket_key(timestamp, settings.batch_window);
        self.buckets
            .entry(key)
            .or_default()
            .record(&dimension_values, path.measured(), value);
        Ok(key)
    }

    /// Copy every bucket whose key is at or below `threshold`
    pub fn select_through(&self, threshold: BucketKey) -> Snapshot {
        self.buckets
            .range(..=threshold)
            .map(|(key, tree)| (*key, tree.clone()))
            .collect()
    }

    /// Move every bucket whose key is at or below `threshold` out of the store
    /// and drop the rest. Returns the selected buckets and the number dropped.
    pub fn drain_through(&mut self, threshold: BucketKey) -> (Snapshot, usize) {
        let mut selected = std::mem::take(&mut self.buckets);
        let remainder = match threshold.checked_add(1) {
            Some(split) => selected.split_off(&split),
            None => BTreeMap::new(),
        };
        (selected.into_iter().collect(), remainder.len())
    }

    /// Drop every bucket older than `oldest`. Returns the number dropped.
    pub fn retain_from(&mut self, oldest: BucketKey) -> usize {
        let kept = self.buckets.split_off(&oldest);
        let dropped = std::mem::replace(&mut self.buckets, kept);
        dropped.len()
    }

    /// Borrow one bucket
    pub fn get(&self, key: BucketKey) -> Option<&GroupNode> {
        self.buckets.get(&key)
    }

    /// Bucket keys in ascending order
    pub fn keys(&self) -> impl Iterator<Item = BucketKey> + '_ {
        self.buckets.keys().copied()
    }

    /// Number of buckets
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether the store holds no buckets
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
