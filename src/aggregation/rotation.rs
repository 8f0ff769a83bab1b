//! Periodic bucket rotation: selection, retirement and publication

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::handoff::EmissionSlot;
use super::store::{bucket_key, BucketStore};
use crate::config::{AccumulationMode, Settings};

/// Everything guarded by the aggregator lock
#[derive(Debug, Default)]
pub struct AggregatorState {
    /// Buckets still accumulating
    pub store: BucketStore,
    /// Snapshot awaiting drain
    pub slot: EmissionSlot,
}

/// What a rotation step did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationOutcome {
    /// The previous snapshot has not been drained; nothing was touched
    Skipped,
    /// Selection and retirement ran
    Rotated {
        /// Buckets placed in the emission slot
        published: usize,
        /// Buckets removed from the store
        retired: usize,
    },
}

/// Run one rotation step at Unix second `now`.
///
/// Buckets at or below `floor(now) - window * offset` are selected. In
/// separate mode the whole store is then cleared, eligible or not; in
/// cumulative mode only buckets older than the retention horizon go.
pub fn rotate(state: &mut AggregatorState, settings: &Settings, now: i64) -> RotationOutcome {
    if state.slot.is_occupied() {
        debug!("previous snapshot not drained yet, skipping rotation");
        return RotationOutcome::Skipped;
    }

    let current = bucket_key(now, settings.batch_window);
    let threshold = current.saturating_sub(settings.batch_window.saturating_mul(settings.window_offset));

    let (snapshot, retired) = match settings.mode {
        AccumulationMode::Separate => {
            let (snapshot, not_yet_eligible) = state.store.drain_through(threshold);
            let retired = snapshot.len() + not_yet_eligible;
            (snapshot, retired)
        }
        AccumulationMode::Cumulative => {
            let snapshot = state.store.select_through(threshold);
            let retired = state
                .store
                .retain_from(current.saturating_sub(settings.reserve_window));
            (snapshot, retired)
        }
    };

    let selected = snapshot.len();
    let published = match state.slot.publish(snapshot) {
        Ok(true) => selected,
        _ => 0,
    };

    debug!(
        current_bucket = current,
        threshold,
        published,
        retired,
        remaining = state.store.len(),
        "rotated buckets"
    );

    RotationOutcome::Rotated { published, retired }
}

/// Background task calling a rotation step once per period.
///
/// The first tick fires one full period after spawning; ticks missed while the
/// runtime was busy are dropped rather than shifting later ones. The task stops when
/// [`RotationTask::shutdown`] is awaited or the handle is dropped.
#[derive(Debug)]
pub struct RotationTask {
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl RotationTask {
    /// Spawn on the current tokio runtime
    pub fn spawn<F>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let start = Instant::now() + period;

        let handle = tokio::spawn(async move {
            // Late ticks fire once and the schedule stays on the window grid
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => tick(),
                    _ = shutdown_rx.changed() => break,
                }
            }
            debug!("rotation task stopped");
        });

        info!("rotation task started with period {:?}", period);
        Self {
            shutdown_tx,
            handle: Some(handle),
        }
    }

    /// Whether the task has exited
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Signal the task and wait for it to exit
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for RotationTask {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LinkStatsConfig;
    use crate::event::EventBuilder;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const NOW: i64 = 1_704_067_200;

    fn settings(mode: &str, offset: u64) -> Settings {
        Settings::from_config(
            &LinkStatsConfig::builder()
                .fields_link("host->latency")
                .batch_window(10)
                .reserve_window(60)
                .accumulate_mode(mode)
                .window_offset(offset)
                .build(),
        )
        .unwrap()
    }

    fn fill(state: &mut AggregatorState, settings: &Settings, now: i64, ages: &[i64]) {
        for age in ages {
            let event = EventBuilder::new()
                .field("host", "h1")
                .field("latency", 1.0)
                .timestamp(Utc.timestamp_opt(now - age, 0).unwrap())
                .build();
            state.store.ingest(&event, settings, now).unwrap();
        }
    }

    #[test]
    fn test_cumulative_keeps_buckets_and_reselects() {
        let settings = settings("cumulative", 0);
        let mut state = AggregatorState::default();
        fill(&mut state, &settings, NOW, &[0, 15]);

        let outcome = rotate(&mut state, &settings, NOW + 5);
        assert_eq!(outcome, RotationOutcome::Rotated { published: 2, retired: 0 });
        assert_eq!(state.store.len(), 2);

        let first = state.slot.take().unwrap();
        assert_eq!(first.keys().collect::<Vec<_>>(), vec![NOW - 20, NOW]);

        let outcome = rotate(&mut state, &settings, NOW + 15);
        assert_eq!(outcome, RotationOutcome::Rotated { published: 2, retired: 0 });
        assert!(state.slot.is_occupied());
    }

    #[test]
    fn test_cumulative_retires_past_horizon() {
        let settings = settings("cumulative", 0);
        let mut state = AggregatorState::default();
        fill(&mut state, &settings, NOW, &[0, 60]);
        assert_eq!(state.store.keys().collect::<Vec<_>>(), vec![NOW - 60, NOW]);

        // current - (NOW-60) == 60: still inside the horizon
        rotate(&mut state, &settings, NOW);
        assert_eq!(state.store.len(), 2);
        state.slot.take();

        // current - (NOW-60) == 70 > 60
        let outcome = rotate(&mut state, &settings, NOW + 10);
        assert_eq!(outcome, RotationOutcome::Rotated { published: 2, retired: 1 });
        assert_eq!(state.store.keys().collect::<Vec<_>>(), vec![NOW]);
    }

    #[test]
    fn test_separate_clears_everything() {
        let settings = settings("separate", 1);
        let mut state = AggregatorState::default();
        fill(&mut state, &settings, NOW, &[0, 10, 20]);

        let outcome = rotate(&mut state, &settings, NOW);
        assert_eq!(outcome, RotationOutcome::Rotated { published: 2, retired: 3 });
        assert!(state.store.is_empty());

        let snapshot = state.slot.take().unwrap();
        assert_eq!(snapshot.keys().collect::<Vec<_>>(), vec![NOW - 20, NOW - 10]);
    }

    #[test]
    fn test_emission_delay_holds_recent_buckets() {
        let settings = settings("cumulative", 2);
        let mut state = AggregatorState::default();
        fill(&mut state, &settings, NOW, &[0, 10, 20]);

        rotate(&mut state, &settings, NOW);
        let snapshot = state.slot.take().unwrap();
        assert_eq!(snapshot.keys().collect::<Vec<_>>(), vec![NOW - 20]);
    }

    #[test]
    fn test_occupied_slot_skips_rotation() {
        let settings = settings("separate", 0);
        let mut state = AggregatorState::default();
        fill(&mut state, &settings, NOW, &[0]);
        rotate(&mut state, &settings, NOW);
        fill(&mut state, &settings, NOW, &[5]);

        let before: Vec<_> = state.store.keys().collect();
        assert_eq!(rotate(&mut state, &settings, NOW + 10), RotationOutcome::Skipped);
        assert_eq!(state.store.keys().collect::<Vec<_>>(), before);
    }

    #[test]
    fn test_empty_selection_leaves_slot_free() {
        let settings = settings("cumulative", 3);
        let mut state = AggregatorState::default();
        fill(&mut state, &settings, NOW, &[0]);

        assert_eq!(
            rotate(&mut state, &settings, NOW),
            RotationOutcome::Rotated { published: 0, retired: 0 }
        );
        assert!(!state.slot.is_occupied());
        assert_eq!(state.store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_ticks_each_period_and_stops() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let task = RotationTask::spawn(Duration::from_secs(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        task.shutdown().await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_runtime_keeps_tick_grid() {
        let origin = Instant::now();
        let fired = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let log = fired.clone();
        let task = RotationTask::spawn(Duration::from_secs(10), move || {
            log.lock().push(origin.elapsed().as_secs());
        });

        // Nothing runs until the clock is already past two deadlines
        tokio::time::advance(Duration::from_secs(25)).await;
        tokio::time::sleep(Duration::from_secs(36)).await;

        assert_eq!(*fired.lock(), vec![25, 30, 40, 50, 60]);
        task.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_task_stops_it() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let task = RotationTask::spawn(Duration::from_secs(1), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_millis(1500)).await;
        drop(task);

        let seen = ticks.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
    }
}
