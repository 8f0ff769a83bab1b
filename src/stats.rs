//! Aggregator counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::aggregation::{DropReason, RotationOutcome};

/// Running counters for one aggregator
#[derive(Debug, Default)]
pub struct FilterStatistics {
    events_processed: AtomicU64,
    events_aggregated: AtomicU64,
    dropped_missing_value: AtomicU64,
    dropped_bad_timestamp: AtomicU64,
    dropped_out_of_window: AtomicU64,
    dropped_missing_dimension: AtomicU64,
    rotations: AtomicU64,
    rotations_skipped: AtomicU64,
    snapshots_published: AtomicU64,
    records_emitted: AtomicU64,
}

/// Point-in-time copy of [`FilterStatistics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatisticsSnapshot {
    /// Events passed to `process`
    pub events_processed: u64,
    /// Events folded into a bucket
    pub events_aggregated: u64,
    /// Events without a usable measured value
    pub dropped_missing_value: u64,
    /// Events without a usable timestamp
    pub dropped_bad_timestamp: u64,
    /// Events too old or in the future
    pub dropped_out_of_window: u64,
    /// Events missing a grouping dimension
    pub dropped_missing_dimension: u64,
    /// Rotation steps that ran
    pub rotations: u64,
    /// Rotation steps skipped because the slot was occupied
    pub rotations_skipped: u64,
    /// Non-empty snapshots placed in the slot
    pub snapshots_published: u64,
    /// Aggregate records pushed to a sink
    pub records_emitted: u64,
}

impl FilterStatistics {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the result of ingesting one event
    pub fn record_ingest(&self, result: Result<(), DropReason>) {
        self.events_processed.fetch_add(1, Ordering::Relaxed);
        let counter = match result {
            Ok(()) => &self.events_aggregated,
            Err(DropReason::MissingValue | DropReason::InvalidValue) => &self.dropped_missing_value,
            Err(DropReason::MissingTimestamp | DropReason::InvalidTimestamp) => {
                &self.dropped_bad_timestamp
            }
            Err(DropReason::OutOfWindow) => &self.dropped_out_of_window,
            Err(DropReason::MissingDimension) => &self.dropped_missing_dimension,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rotation step
    pub fn record_rotation(&self, outcome: RotationOutcome) {
        match outcome {
            RotationOutcome::Skipped => {
                self.rotations_skipped.fetch_add(1, Ordering::Relaxed);
            }
            RotationOutcome::Rotated { published, .. } => {
                self.rotations.fetch_add(1, Ordering::Relaxed);
                if published > 0 {
                    self.snapshots_published.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Record records pushed to a sink
    pub fn record_emitted(&self, records: usize) {
        self.records_emitted
            .fetch_add(records as u64, Ordering::Relaxed);
    }

    /// Copy the current values
    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            events_processed: self.events_processed.load(Ordering::Relaxed),
            events_aggregated: self.events_aggregated.load(Ordering::Relaxed),
            dropped_missing_value: self.dropped_missing_value.load(Ordering::Relaxed),
            dropped_bad_timestamp: self.dropped_bad_timestamp.load(Ordering::Relaxed),
            dropped_out_of_window: self.dropped_out_of_window.load(Ordering::Relaxed),
            dropped_missing_dimension: self.dropped_missing_dimension.load(Ordering::Relaxed),
            rotations: self.rotations.load(Ordering::Relaxed),
            rotations_skipped: self.rotations_skipped.load(Ordering::Relaxed),
            snapshots_published: self.snapshots_published.load(Ordering::Relaxed),
            records_emitted: self.records_emitted.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = FilterStatistics::new();
        stats.record_ingest(Ok(()));
        stats.record_ingest(Err(DropReason::InvalidTimestamp));
        stats.record_ingest(Err(DropReason::OutOfWindow));
        stats.record_rotation(RotationOutcome::Skipped);
        stats.record_rotation(RotationOutcome::Rotated { published: 0, retired: 1 });
        stats.record_rotation(RotationOutcome::Rotated { published: 2, retired: 0 });
        stats.record_emitted(4);

        let snap = stats.snapshot();
        assert_eq!(snap.events_processed, 3);
        assert_eq!(snap.events_aggregated, 1);
        assert_eq!(snap.dropped_bad_timestamp, 1);
        assert_eq!(snap.dropped_out_of_window, 1);
        assert_eq!(snap.rotations, 2);
        assert_eq!(snap.rotations_skipped, 1);
        assert_eq!(snap.snapshots_published, 1);
        assert_eq!(snap.records_emitted, 4);
    }
}
