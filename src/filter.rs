//! The link statistics metric stage

use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, trace};

use crate::aggregation::{flatten, rotate, AggregatorState, DropReason, RotationOutcome, RotationTask};
use crate::clock::{SystemTimeProvider, TimeProvider};
use crate::config::{LinkStatsConfig, Settings};
use crate::error::{LinkStatsError, Result};
use crate::event::{Event, Value};
use crate::hooks::{EventFilter, EventSink, Finalizer, PassthroughFinalizer};
use crate::stats::{FilterStatistics, StatisticsSnapshot};

/// State shared between callers and the rotation task
struct Shared {
    settings: Settings,
    state: Mutex<AggregatorState>,
    clock: Arc<dyn TimeProvider>,
    stats: FilterStatistics,
}

impl Shared {
    fn rotate(&self) -> RotationOutcome {
        let outcome = {
            let mut state = self.state.lock();
            // Read under the lock so time never goes backwards between holders
            let now = self.clock.now_secs();
            rotate(&mut state, &self.settings, now)
        };
        self.stats.record_rotation(outcome);
        outcome
    }
}

/// Groups events by a field hierarchy, accumulates count and sum per time
/// bucket, and emits flattened summary records.
///
/// Ingestion, rotation and draining all take the same lock.
pub struct LinkStatsMetric {
    shared: Arc<Shared>,
    finalizer: Arc<dyn Finalizer>,
    rotation: Option<RotationTask>,
}

impl std::fmt::Debug for LinkStatsMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkStatsMetric")
            .field("settings", &self.shared.settings)
            .field("rotating", &self.is_rotating())
            .finish()
    }
}

impl LinkStatsMetric {
    /// Create the stage without starting rotation
    pub fn new(settings: Settings) -> Self {
        Self {
            shared: Arc::new(Shared {
                settings,
                state: Mutex::new(AggregatorState::default()),
                clock: Arc::new(SystemTimeProvider),
                stats: FilterStatistics::new(),
            }),
            finalizer: Arc::new(PassthroughFinalizer),
            rotation: None,
        }
    }

    /// Validate a raw config and create the stage without starting rotation
    pub fn from_config(config: &LinkStatsConfig) -> Result<Self> {
        Ok(Self::new(Settings::from_config(config)?))
    }

    /// Validate a raw config, create the stage and start rotation.
    ///
    /// Must be called within a tokio runtime.
    pub fn start(config: &LinkStatsConfig) -> Result<Self> {
        let mut metric = Self::from_config(config)?;
        metric.spawn_rotation()?;
        Ok(metric)
    }

    /// Use a different time source. Only allowed before rotation starts.
    pub fn with_clock(mut self, clock: Arc<dyn TimeProvider>) -> Result<Self> {
        let shared = Arc::get_mut(&mut self.shared).ok_or_else(|| {
            LinkStatsError::Runtime("clock cannot change once rotation is running".to_string())
        })?;
        shared.clock = clock;
        Ok(self)
    }

    /// Use a different finalization hook
    pub fn with_finalizer(mut self, finalizer: impl Finalizer + 'static) -> Self {
        self.finalizer = Arc::new(finalizer);
        self
    }

    /// Start the periodic rotation task on the current tokio runtime.
    ///
    /// Does nothing if it is already running.
    pub fn spawn_rotation(&mut self) -> Result<()> {
        if self.rotation.is_some() {
            return Ok(());
        }
        tokio::runtime::Handle::try_current()
            .map_err(|e| LinkStatsError::Runtime(format!("rotation needs a tokio runtime: {}", e)))?;

        let shared = self.shared.clone();
        let period = self.shared.settings.rotation_period();
        self.rotation = Some(RotationTask::spawn(period, move || {
            shared.rotate();
        }));
        info!(
            fields = %self.shared.settings.field_path,
            mode = %self.shared.settings.mode,
            "linkstatmetric started"
        );
        Ok(())
    }

    /// Whether the rotation task is running
    pub fn is_rotating(&self) -> bool {
        self.rotation.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop the rotation task and wait for it. Buckets still in flight are kept
    /// in memory but will not be rotated again.
    pub async fn shutdown(&mut self) {
        if let Some(task) = self.rotation.take() {
            task.shutdown().await;
            info!("linkstatmetric stopped");
        }
    }

    /// Validated settings in use
    pub fn settings(&self) -> &Settings {
        &self.shared.settings
    }

    /// Fold one event into the aggregation
    pub fn ingest(&self, event: &Event) -> std::result::Result<(), DropReason> {
        let result = {
            let mut state = self.shared.state.lock();
            let now = self.shared.clock.now_secs();
            state.store.ingest(event, &self.shared.settings, now).map(|_| ())
        };
        if let Err(reason) = result {
            trace!(%reason, "event not aggregated");
        }
        self.shared.stats.record_ingest(result);
        result
    }

    /// Run one rotation step now, outside the timer
    pub fn rotate_now(&self) -> RotationOutcome {
        self.shared.rotate()
    }

    /// Whether a snapshot is waiting to be drained
    pub fn has_pending(&self) -> bool {
        self.shared.state.lock().slot.is_occupied()
    }

    /// Number of buckets accumulating
    pub fn bucket_count(&self) -> usize {
        self.shared.state.lock().store.len()
    }

    /// Copy the current counters
    pub fn statistics(&self) -> StatisticsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Take the pending snapshot, if any, and push its records into `sink`.
    ///
    /// Each record is stamped with its bucket's start time under the
    /// timestamp attribute and passed through the finalizer. Returns the
    /// number of records pushed.
    pub fn drain_into(&self, sink: &mut dyn EventSink) -> usize {
        let Some(snapshot) = self.shared.state.lock().slot.take() else {
            return 0;
        };

        let settings = &self.shared.settings;
        let mut emitted = 0;
        for (key, tree) in snapshot {
            let Some(bucket_time) = Utc.timestamp_opt(key, 0).single() else {
                debug!(bucket = key, "bucket key is not a valid time, skipping");
                continue;
            };
            for mut record in flatten(&tree, settings.field_path.fields()) {
                record.insert(settings.timestamp_field.clone(), Value::Timestamp(bucket_time));
                sink.push(self.finalizer.finalize(record, true));
                emitted += 1;
            }
        }

        debug!(records = emitted, "drained aggregate records");
        self.shared.stats.record_emitted(emitted);
        emitted
    }
}

impl EventFilter for LinkStatsMetric {
    fn process(&self, event: Event) -> (Option<Event>, bool) {
        let _ = self.ingest(&event);
        if self.shared.settings.drop_original_event {
            return (None, false);
        }
        (Some(event), false)
    }

    fn drain_pending(&self, sink: &mut dyn EventSink) {
        self.drain_into(sink);
    }
}
