//! Host pipeline seams: record finalization and output sinks

use tokio::sync::mpsc;
use tracing::debug;

use crate::event::Event;

/// Hook every emitted record passes through before reaching a sink
pub trait Finalizer: Send + Sync {
    /// Finish a record; `synthetic` is true for records the stage generated
    fn finalize(&self, record: Event, synthetic: bool) -> Event;
}

/// Finalizer that returns records unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughFinalizer;

impl Finalizer for PassthroughFinalizer {
    fn finalize(&self, record: Event, _synthetic: bool) -> Event {
        record
    }
}

impl<F> Finalizer for F
where
    F: Fn(Event, bool) -> Event + Send + Sync,
{
    fn finalize(&self, record: Event, synthetic: bool) -> Event {
        self(record, synthetic)
    }
}

/// Append-only destination for emitted records
pub trait EventSink {
    /// Accept one record
    fn push(&mut self, event: Event);
}

impl EventSink for Vec<Event> {
    fn push(&mut self, event: Event) {
        Vec::push(self, event);
    }
}

impl EventSink for mpsc::UnboundedSender<Event> {
    fn push(&mut self, event: Event) {
        if self.send(event).is_err() {
            debug!("event sink receiver dropped, discarding record");
        }
    }
}

/// A pipeline stage that filters events and may emit extra ones
pub trait EventFilter {
    /// Handle one event. Returns the event to pass downstream, if any, and a
    /// reserved control flag.
    fn process(&self, event: Event) -> (Option<Event>, bool);

    /// Push any pending generated records into `sink`
    fn drain_pending(&self, sink: &mut dyn EventSink);
}
