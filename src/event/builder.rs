use super::{Event, Value};
use chrono::{DateTime, Utc};

/// Builder for creating test events
pub struct EventBuilder {
    event: Event,
    timestamp_field: String,
}

impl EventBuilder {
    /// Create a new EventBuilder stamping times under `@timestamp`
    pub fn new() -> Self {
        Self {
            event: Event::new(),
            timestamp_field: crate::config::DEFAULT_TIMESTAMP_FIELD.to_string(),
        }
    }

    /// Use a different attribute for [`EventBuilder::timestamp`]
    pub fn timestamp_field(mut self, field: impl Into<String>) -> Self {
        self.timestamp_field = field.into();
        self
    }

    /// Add a field to the event
    pub fn field<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.event.insert(key, value);
        self
    }

    /// Set the timestamp for the event
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        let field = self.timestamp_field.clone();
        self.event.insert(field, timestamp);
        self
    }

    /// Build the Event
    pub fn build(self) -> Event {
        self.event
    }
}

impl Default for EventBuilder {
    fn default() -> Self {
        Self::new()
    }
}
