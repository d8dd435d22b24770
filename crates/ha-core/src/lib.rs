//! Core types for Home Assistant
//!
//! This crate provides the fundamental types shared by the event bus, the
//! state machine, the timer and the tracking helpers: Event, State and Clock,
//! plus the reserved event types and their payloads.

mod clock;
mod event;
mod state;

pub use clock::{Clock, ManualClock, SystemClock};
pub use event::{Event, EventData, EventType};
pub use state::State;

/// Standard event types used by Home Assistant
pub mod events {
    use super::*;
    use chrono::{DateTime, Local};

    /// Event type fired once when Home Assistant boots
    pub const START: &str = "start";

    /// Event type fired once when Home Assistant is asked to stop
    pub const SHUTDOWN: &str = "shutdown";

    /// Event type for state changes
    pub const STATE_CHANGED: &str = "state_changed";

    /// Event type for timer ticks
    pub const TIME_CHANGED: &str = "time_changed";

    /// Data for STATE_CHANGED events
    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    pub struct StateChangedData {
        pub entity_id: String,
        pub old_state: State,
        pub new_state: State,
    }

    impl EventData for StateChangedData {
        fn event_type() -> &'static str {
            STATE_CHANGED
        }
    }

    /// Data for TIME_CHANGED events
    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    pub struct TimeChangedData {
        /// The aligned instant the timer observed
        pub now: DateTime<Local>,
    }

    impl EventData for TimeChangedData {
        fn event_type() -> &'static str {
            TIME_CHANGED
        }
    }
}

#[cfg(test)]
mod tests {
    use super::events::*;
    use super::*;
    use chrono::{Local, TimeZone, Utc};

    #[test]
    fn test_state_changed_round_trip_through_event() {
        let t1 = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let data = StateChangedData {
            entity_id: "light.kitchen".to_string(),
            old_state: State::new("light.kitchen", "off", t1),
            new_state: State::new("light.kitchen", "on", t2),
        };

        let event = Event::new(STATE_CHANGED, serde_json::to_value(&data).unwrap());
        let parsed: StateChangedData = event.parse_data().unwrap();

        assert_eq!(parsed, data);
        assert_eq!(parsed.new_state.last_changed, t2);
    }

    #[test]
    fn test_parse_data_rejects_other_event_types() {
        let now = Local.with_ymd_and_hms(2024, 5, 1, 8, 0, 30).unwrap();
        let data = TimeChangedData { now };
        let event = Event::new("not_time", serde_json::to_value(&data).unwrap());

        assert!(event.parse_data::<TimeChangedData>().is_none());
    }
}
