//! Streaming link statistics aggregation
//!
//! This library implements a pipeline stage that groups structured events by
//! a configurable hierarchy of field values, accumulates count and sum per
//! fixed-width time bucket, and periodically emits flattened summary records
//! back into the pipeline.
//!
//! # Example
//!
//! ```no_run
//! use linkstats_rs::{EventFilter, Event, LinkStatsConfig, LinkStatsMetric};
//!
//! # async fn example() -> linkstats_rs::Result<()> {
//! let config = LinkStatsConfig::builder()
//!     .fields_link("host->path->latency")
//!     .batch_window(10)
//!     .reserve_window(60)
//!     .build();
//!
//! // Spawns the rotation task on the current runtime
//! let mut metric = LinkStatsMetric::start(&config)?;
//!
//! # let event = Event::new();
//! let (passthrough, _) = metric.process(event);
//!
//! let mut out: Vec<Event> = Vec::new();
//! metric.drain_pending(&mut out);
//!
//! metric.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]

// Re-export commonly used items
pub use aggregation::{DropReason, GroupNode, LeafStats, RotationOutcome};
pub use clock::{ManualTimeProvider, SystemTimeProvider, TimeProvider};
pub use config::{AccumulationMode, FieldPath, LinkStatsConfig, Settings};
pub use error::{LinkStatsError, Result};
pub use event::{Event, EventBuilder, Selector, Value};
pub use filter::LinkStatsMetric;
pub use hooks::{EventFilter, EventSink, Finalizer, PassthroughFinalizer};
pub use stats::{FilterStatistics, StatisticsSnapshot};

/// Bucketed grouping, rotation and flattening
pub mod aggregation;

/// Time sources
pub mod clock;

/// Configuration types
pub mod config;

/// Error types
pub mod error;

/// Event abstractions and implementations
pub mod event;

/// The aggregation stage
pub mod filter;

/// Host pipeline interfaces
pub mod hooks;

/// Counters
pub mod stats;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the tracing subscriber with default settings
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}
