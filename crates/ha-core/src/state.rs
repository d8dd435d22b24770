//! State type representing an entity's current state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Represents the state of an entity at a point in time
///
/// `last_changed` records when `state` last took a different value; writing
/// the same value again leaves it untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    /// The entity this state belongs to (e.g., "light.kitchen")
    pub entity_id: String,

    /// The state value (e.g., "on", "off", "home")
    pub state: String,

    /// When the state was last changed (different from previous state)
    pub last_changed: DateTime<Utc>,
}

impl State {
    /// Create a new state observed at `now`
    pub fn new(
        entity_id: impl Into<String>,
        state: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            state: state.into(),
            last_changed: now,
        }
    }

    /// Check whether the state value equals `candidate`
    pub fn is(&self, candidate: &str) -> bool {
        self.state == candidate
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        // Timestamps are not compared
        self.entity_id == other.entity_id && self.state == other.state
    }
}
