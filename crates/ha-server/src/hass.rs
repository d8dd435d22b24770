//! The Home Assistant context object
//!
//! Owns the bus, the state machine and the timer. Everything that needs
//! one of them gets it from here instead of from a global.

use ha_config::CoreConfig;
use ha_core::events::{SHUTDOWN, START};
use ha_core::{Clock, Event, SystemClock};
use ha_event_bus::EventBus;
use ha_state_machine::StateMachine;
use ha_timer::{Timer, TimerConfig, TimerResult};
use std::sync::Arc;
use tracing::info;

/// The central Home Assistant instance
pub struct HomeAssistant {
    /// Event bus for pub/sub communication
    pub bus: Arc<EventBus>,
    /// State machine for entity states
    pub states: Arc<StateMachine>,
    /// Timer driving TIME_CHANGED
    pub timer: Timer,
}

impl HomeAssistant {
    /// Create a new Home Assistant instance on the system clock
    pub fn new(config: &CoreConfig) -> TimerResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a new Home Assistant instance on a given clock
    pub fn with_clock(config: &CoreConfig, clock: Arc<dyn Clock>) -> TimerResult<Self> {
        let bus = Arc::new(EventBus::new());
        let states = Arc::new(StateMachine::with_clock(bus.clone(), clock.clone()));
        let timer_config = TimerConfig {
            interval: config.timer_interval,
            resolution: config.timer_resolution(),
        };
        let timer = Timer::with_clock(bus.clone(), timer_config, clock)?;

        Ok(Self { bus, states, timer })
    }

    /// Announce START; the timer begins ticking
    pub fn start(&self) {
        info!(interval = self.timer.interval(), "Starting Home Assistant core");
        self.bus.fire(Event::empty(START));
    }

    /// Announce SHUTDOWN and wait for the bus to drain
    pub async fn stop(&self) {
        info!("Stopping Home Assistant core");
        self.bus.fire(Event::empty(SHUTDOWN));
        self.bus.block_till_done().await;
    }
}
