//! State machine for Home Assistant
//!
//! This crate provides the StateMachine, which tracks the current state of
//! all entities in Home Assistant and fires STATE_CHANGED events on the event
//! bus whenever a state actually changes.

use ha_core::events::StateChangedData;
use ha_core::{Clock, State, SystemClock};
use ha_event_bus::EventBus;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, instrument, trace};

/// Errors returned by state queries
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("entity {0} does not exist")]
    UnknownEntity(String),
}

/// Result type for state queries
pub type StateResult<T> = Result<T, StateError>;

/// The state machine tracks all entity states
///
/// The StateMachine is responsible for:
/// - Storing the current state of all entities
/// - Firing STATE_CHANGED events when states change
/// - Providing thread-safe access to states
///
/// All reads and writes go through one lock so a reader never sees a
/// half-applied transition.
pub struct StateMachine {
    /// All entity states keyed by entity_id
    states: Mutex<HashMap<String, State>>,
    /// Event bus for firing state change events
    event_bus: Arc<EventBus>,
    /// Source of `last_changed` timestamps
    clock: Arc<dyn Clock>,
}

impl StateMachine {
    /// Create a new state machine with the given event bus
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self::with_clock(event_bus, Arc::new(SystemClock))
    }

    /// Create a state machine that stamps changes with `clock`
    pub fn with_clock(event_bus: Arc<EventBus>, clock: Arc<dyn Clock>) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            event_bus,
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, State>> {
        self.states.lock().expect("state machine lock poisoned")
    }

    /// Set the state of an entity
    ///
    /// The first value recorded for an entity is not a change and fires
    /// nothing. Writing the current value again is a no-op. Any other value
    /// replaces the entry, stamps `last_changed` and fires STATE_CHANGED
    /// with the old and new state.
    #[instrument(skip_all, fields(entity_id = tracing::field::Empty))]
    pub fn set_state(&self, entity_id: impl Into<String>, new_state: impl Into<String>) {
        let entity_id = entity_id.into();
        let new_state = new_state.into();
        tracing::Span::current().record("entity_id", entity_id.as_str());

        let mut states = self.lock();

        let old_state = match states.get(&entity_id) {
            Some(existing) if existing.is(&new_state) => {
                trace!(state = %new_state, "State unchanged");
                return;
            }
            Some(existing) => existing.clone(),
            None => {
                debug!(state = %new_state, "Adding entity");
                let state = State::new(entity_id.clone(), new_state, self.clock.now());
                states.insert(entity_id, state);
                return;
            }
        };

        let state = State::new(entity_id.clone(), new_state, self.clock.now());
        debug!(from = %old_state.state, to = %state.state, "State changed");
        states.insert(entity_id.clone(), state.clone());

        // Fired before releasing the lock so events leave in transition order
        self.event_bus.fire_typed(StateChangedData {
            entity_id,
            old_state,
            new_state: state,
        });
    }

    /// Get the current state of an entity
    pub fn get_state(&self, entity_id: &str) -> StateResult<State> {
        self.lock()
            .get(entity_id)
            .cloned()
            .ok_or_else(|| StateError::UnknownEntity(entity_id.to_string()))
    }

    /// Check if an entity is in a specific state
    pub fn is_state(&self, entity_id: &str, state: &str) -> StateResult<bool> {
        self.get_state(entity_id).map(|s| s.is(state))
    }

    /// Get all states, sorted by entity_id ignoring case
    pub fn get_states(&self) -> Vec<State> {
        let mut states: Vec<State> = self.lock().values().cloned().collect();
        states.sort_by_cached_key(|s| s.entity_id.to_lowercase());
        states
    }

    /// Get all entity IDs, sorted like [`StateMachine::get_states`]
    pub fn entity_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().keys().cloned().collect();
        ids.sort_by_cached_key(|id| id.to_lowercase());
        ids
    }

    /// Get the total number of entities
    pub fn entity_count(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use ha_core::events::STATE_CHANGED;
    use ha_core::{Event, ManualClock};
    use std::collections::HashSet;
    use tokio_test::{assert_err, assert_ok};

    fn setup() -> (Arc<EventBus>, StateMachine, ManualClock) {
        let bus = Arc::new(EventBus::new());
        let clock = ManualClock::at(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
        let states = StateMachine::with_clock(bus.clone(), Arc::new(clock.clone()));
        (bus, states, clock)
    }

    fn capture(bus: &EventBus) -> Arc<Mutex<Vec<StateChangedData>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        bus.listen(STATE_CHANGED, move |event: &mut Event| {
            if let Some(data) = event.parse_data::<StateChangedData>() {
                s.lock().unwrap().push(data);
            }
        });
        seen
    }

    #[tokio::test]
    async fn test_first_set_fires_nothing() {
        let (bus, states, clock) = setup();
        let seen = capture(&bus);

        states.set_state("light.kitchen", "off");
        bus.block_till_done().await;

        assert!(seen.lock().unwrap().is_empty());
        let state = assert_ok!(states.get_state("light.kitchen"));
        assert_eq!(state.state, "off");
        assert_eq!(state.last_changed, clock.now());
    }

    #[tokio::test]
    async fn test_change_fires_once() {
        let (bus, states, clock) = setup();
        let seen = capture(&bus);

        states.set_state("light.kitchen", "off");
        let t1 = clock.now();
        clock.advance_seconds(5);
        states.set_state("light.kitchen", "on");
        let t2 = clock.now();
        clock.advance_seconds(5);
        states.set_state("light.kitchen", "on");
        bus.block_till_done().await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].entity_id, "light.kitchen");
        assert_eq!(seen[0].old_state.state, "off");
        assert_eq!(seen[0].old_state.last_changed, t1);
        assert_eq!(seen[0].new_state.state, "on");
        assert_eq!(seen[0].new_state.last_changed, t2);

        let state = assert_ok!(states.get_state("light.kitchen"));
        assert_eq!(state.state, "on");
        assert_eq!(state.last_changed, t2);
        assert!(t2 > t1);
    }

    #[test]
    fn test_repeated_value_keeps_last_changed() {
        let (_bus, states, clock) = setup();

        states.set_state("sensor.door", "closed");
        clock.advance_seconds(10);
        states.set_state("sensor.door", "open");
        let changed_at = clock.now();
        for _ in 0..3 {
            clock.advance_seconds(10);
            states.set_state("sensor.door", "open");
        }

        let state = assert_ok!(states.get_state("sensor.door"));
        assert_eq!(state.last_changed, changed_at);
    }

    #[test]
    fn test_unknown_entity() {
        let (_bus, states, _clock) = setup();

        let err = assert_err!(states.get_state("light.missing"));
        assert_eq!(err, StateError::UnknownEntity("light.missing".to_string()));
        assert_err!(states.is_state("light.missing", "on"));
    }

    #[test]
    fn test_is_state() {
        let (_bus, states, _clock) = setup();
        states.set_state("light.kitchen", "on");

        assert_eq!(states.is_state("light.kitchen", "on"), Ok(true));
        assert_eq!(states.is_state("light.kitchen", "off"), Ok(false));
    }

    #[test]
    fn test_get_states_sorted_case_insensitively() {
        let (_bus, states, _clock) = setup();
        for id in ["b.second", "C.third", "a.first", "B.fourth"] {
            states.set_state(id, "on");
        }

        let ids: Vec<String> = states.get_states().into_iter().map(|s| s.entity_id).collect();
        assert_eq!(ids, vec!["a.first", "B.fourth", "b.second", "C.third"]);
        assert_eq!(states.entity_ids(), ids);
        assert_eq!(states.entity_count(), 4);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_writers_publish_every_transition_once() {
        const WRITERS: usize = 4;
        const WRITES: usize = 50;

        let (bus, states, _clock) = setup();
        let seen = capture(&bus);

        std::thread::scope(|scope| {
            for writer in 0..WRITERS {
                let states = &states;
                scope.spawn(move || {
                    let own = format!("switch.writer_{}", writer);
                    for i in 0..WRITES {
                        states.set_state("sensor.shared", format!("w{}-{}", writer, i));
                        states.set_state(own.as_str(), if i % 2 == 0 { "off" } else { "on" });
                    }
                });
            }
        });
        bus.block_till_done().await;

        let seen = seen.lock().unwrap();

        // Every value written to the shared entity is distinct, so each write
        // after the first is a transition
        let shared: Vec<&StateChangedData> = seen
            .iter()
            .filter(|d| d.entity_id == "sensor.shared")
            .collect();
        assert_eq!(shared.len(), WRITERS * WRITES - 1);

        // Each transition starts where the previous one ended
        let next: HashMap<&str, &str> = shared
            .iter()
            .map(|d| (d.old_state.state.as_str(), d.new_state.state.as_str()))
            .collect();
        assert_eq!(next.len(), shared.len());
        let targets: HashSet<&str> = next.values().copied().collect();
        let starts: Vec<&str> = next
            .keys()
            .copied()
            .filter(|s| !targets.contains(s))
            .collect();
        assert_eq!(starts.len(), 1);

        let mut current = starts[0];
        let mut steps = 0;
        while let Some(&following) = next.get(current) {
            current = following;
            steps += 1;
        }
        assert_eq!(steps, shared.len());
        assert_eq!(assert_ok!(states.get_state("sensor.shared")).state, current);

        for writer in 0..WRITERS {
            let own = format!("switch.writer_{}", writer);
            let flips: Vec<&StateChangedData> =
                seen.iter().filter(|d| d.entity_id == own).collect();
            assert_eq!(flips.len(), WRITES - 1);
            assert!(flips.iter().all(|d| d.old_state.state != d.new_state.state));
            assert_eq!(assert_ok!(states.get_state(&own)).state, "on");
        }

        assert_eq!(seen.len(), (WRITERS * WRITES - 1) + WRITERS * (WRITES - 1));
    }
}
