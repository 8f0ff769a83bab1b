/// Recursive per-bucket grouping structure
pub mod tree;
/// Bucket storage and event ingestion
pub mod store;
/// Group tree to flat record conversion
pub mod flatten;
/// Single-slot snapshot handoff
pub mod handoff;
/// Periodic selection and retirement of buckets
pub mod rotation;

pub use flatten::{flatten, COUNT_FIELD, MEAN_FIELD, SUM_FIELD};
pub use handoff::{EmissionSlot, Snapshot};
pub use rotation::{rotate, AggregatorState, RotationOutcome, RotationTask};
pub use store::{bucket_key, BucketKey, BucketStore, DropReason};
pub use tree::{GroupNode, LeafStats};
