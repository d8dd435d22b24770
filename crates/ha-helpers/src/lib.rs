//! Tracking helpers for Home Assistant
//!
//! Convenience subscriptions layered on the event bus:
//!
//! - [`track_state_change`] - an entity went from one set of states to another
//! - [`track_time_change`] - a timer tick matched a calendar pattern
//! - [`track_point_in_time`] - the first tick after an instant
//!
//! Filters use [`Match`], which is either a wildcard or a set of values.

pub mod event;
pub mod matcher;

pub use event::{track_point_in_time, track_state_change, track_time_change, TimeTrigger};
pub use matcher::{Match, TimePattern, MATCH_ALL};
