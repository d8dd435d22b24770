//! Helpers that turn raw bus events into higher level triggers
//!
//! Each helper registers one ordinary listener on the bus and only calls the
//! supplied action when its filter matches, so callers never parse
//! STATE_CHANGED or TIME_CHANGED payloads themselves.

use chrono::{DateTime, Local};
use ha_core::events::{StateChangedData, TimeChangedData, STATE_CHANGED, TIME_CHANGED};
use ha_core::{Event, State};
use ha_event_bus::{EventBus, ListenerId};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace};

use crate::matcher::{Match, TimePattern};

/// Call `action` when `entity_id` moves between matching states
///
/// `action` receives the entity id, the old state and the new state. The
/// listener stays registered until removed through the bus.
pub fn track_state_change<F>(
    bus: &EventBus,
    entity_id: impl Into<String>,
    from_state: impl Into<Match<String>>,
    to_state: impl Into<Match<String>>,
    action: F,
) -> ListenerId
where
    F: Fn(&str, &State, &State) + Send + Sync + 'static,
{
    let entity_id = entity_id.into();
    let from_state = from_state.into();
    let to_state = to_state.into();
    debug!(entity_id = %entity_id, ?from_state, ?to_state, "Tracking state change");

    bus.listen(STATE_CHANGED, move |event: &mut Event| {
        let Some(data) = event.parse_data::<StateChangedData>() else {
            return;
        };

        if data.entity_id == entity_id
            && from_state.matches(data.old_state.state.as_str())
            && to_state.matches(data.new_state.state.as_str())
        {
            trace!(entity_id = %data.entity_id, "State change matched");
            action(&data.entity_id, &data.old_state, &data.new_state);
        }
    })
}

/// When a time listener should fire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeTrigger {
    /// On the first tick strictly after this instant, then never again
    At(DateTime<Local>),
    /// On every tick matching the pattern, or only the first if `listen_once`
    Pattern {
        pattern: TimePattern,
        listen_once: bool,
    },
}

impl TimeTrigger {
    /// Fire on every matching tick
    pub fn every(pattern: TimePattern) -> Self {
        TimeTrigger::Pattern {
            pattern,
            listen_once: false,
        }
    }

    /// Fire on the first matching tick only
    pub fn once(pattern: TimePattern) -> Self {
        TimeTrigger::Pattern {
            pattern,
            listen_once: true,
        }
    }

    fn matches(&self, now: &DateTime<Local>) -> bool {
        match self {
            TimeTrigger::At(point_in_time) => now > point_in_time,
            TimeTrigger::Pattern { pattern, .. } => pattern.matches(now),
        }
    }

    fn is_one_shot(&self) -> bool {
        match self {
            TimeTrigger::At(_) => true,
            TimeTrigger::Pattern { listen_once, .. } => *listen_once,
        }
    }
}

/// Call `action` with the tick instant whenever `trigger` matches a tick
pub fn track_time_change<F>(bus: &EventBus, action: F, trigger: TimeTrigger) -> ListenerId
where
    F: Fn(DateTime<Local>) + Send + Sync + 'static,
{
    debug!(?trigger, "Tracking time change");
    let one_shot = trigger.is_one_shot();
    // Two runs may hold the listener at once; only one of them may act
    let fired = AtomicBool::new(false);

    bus.listen(TIME_CHANGED, move |event: &mut Event| {
        let Some(TimeChangedData { now }) = event.parse_data::<TimeChangedData>() else {
            return;
        };

        if !trigger.matches(&now) {
            return;
        }

        if one_shot {
            event.remove_listener();
            if fired.swap(true, Ordering::SeqCst) {
                return;
            }
        }

        trace!(%now, "Time change matched");
        action(now);
    })
}

/// Call `action` once, on the first tick after `point_in_time`
pub fn track_point_in_time<F>(bus: &EventBus, action: F, point_in_time: DateTime<Local>) -> ListenerId
where
    F: Fn(DateTime<Local>) + Send + Sync + 'static,
{
    track_time_change(bus, action, TimeTrigger::At(point_in_time))
}
