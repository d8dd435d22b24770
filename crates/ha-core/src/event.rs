//! Event types for the Home Assistant event bus

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Trait for typed event data
///
/// Implement this trait for any data type that should be carried by events.
pub trait EventData: Clone + Send + Sync + 'static {
    /// The event type string for this data type
    fn event_type() -> &'static str;
}

/// Event type identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventType(String);

impl EventType {
    /// Reserved event type that subscribes to every event
    pub const MATCH_ALL: &'static str = "*";

    /// Create a new event type
    pub fn new(event_type: impl Into<String>) -> Self {
        Self(event_type.into())
    }

    /// Get the event type as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Special event type that matches all events
    pub fn match_all() -> Self {
        Self(Self::MATCH_ALL.to_string())
    }

    /// Check if this is the MATCH_ALL event type
    pub fn is_match_all(&self) -> bool {
        self.0 == Self::MATCH_ALL
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EventType {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Flags a listener may raise while it handles an event
///
/// They are only meaningful to the dispatch run that owns the event and are
/// never serialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct DispatchControl {
    remove_listener: bool,
    stop_propagating: bool,
}

/// An event that can be fired on the event bus
///
/// The payload is read-only by convention once fired. The dispatch-control
/// flags are the only part a listener is expected to write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event<T = serde_json::Value> {
    /// The type of event
    pub event_type: EventType,

    /// The event data
    pub data: T,

    /// When the event was fired
    pub time_fired: DateTime<Utc>,

    #[serde(skip)]
    control: DispatchControl,
}

impl<T> Event<T> {
    /// Create a new event with current timestamp
    pub fn new(event_type: impl Into<EventType>, data: T) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            time_fired: Utc::now(),
            control: DispatchControl::default(),
        }
    }

    /// Ask the bus to unsubscribe the listener currently handling this event
    pub fn remove_listener(&mut self) {
        self.control.remove_listener = true;
    }

    /// Ask the bus to skip every listener after the current one
    pub fn stop_propagation(&mut self) {
        self.control.stop_propagating = true;
    }

    /// Whether a listener asked to stop this dispatch run
    pub fn is_propagation_stopped(&self) -> bool {
        self.control.stop_propagating
    }

    /// Read and clear the removal request
    ///
    /// Clearing keeps the request scoped to the listener that raised it.
    pub fn take_remove_listener(&mut self) -> bool {
        std::mem::take(&mut self.control.remove_listener)
    }
}

impl Event<serde_json::Value> {
    /// Create an event without payload
    pub fn empty(event_type: impl Into<EventType>) -> Self {
        Self::new(event_type, serde_json::Value::Object(serde_json::Map::new()))
    }

    /// Decode the JSON payload as a typed payload
    ///
    /// Returns None when the event is of another type or the payload does not
    /// have the expected shape.
    pub fn parse_data<D>(&self) -> Option<D>
    where
        D: EventData + serde::de::DeserializeOwned,
    {
        if self.event_type.as_str() != D::event_type() {
            return None;
        }
        serde_json::from_value(self.data.clone()).ok()
    }
}

impl<T: fmt::Display> fmt::Display for Event<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Event {}: {}>", self.event_type, self.data)
    }
}
