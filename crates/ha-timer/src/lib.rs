//! Wall-clock timer for Home Assistant
//!
//! The Timer fires a TIME_CHANGED event every `interval` seconds, aligned so
//! ticks only land on seconds where `second % interval == 0`. Sixty must be a
//! multiple of the interval so that every minute starts with a tick, which
//! lets helpers match on `second == 0` to run once a minute.
//!
//! The timer is driven by the bus: it starts on the first START event and
//! stops for good on SHUTDOWN.
//!
//! ```text
//! Idle --START--> Running --SHUTDOWN--> Stopped
//!   \----------------SHUTDOWN------------^
//! ```

use chrono::{Local, Timelike};
use ha_core::events::{TimeChangedData, SHUTDOWN, START};
use ha_core::{Clock, Event, SystemClock};
use ha_event_bus::{EventBus, ListenerId};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

/// Default seconds between ticks
pub const DEFAULT_INTERVAL: u32 = 10;

/// Default pause between two looks at the clock
pub const DEFAULT_RESOLUTION: Duration = Duration::from_millis(500);

/// Timer configuration errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TimerError {
    #[error("timer interval must be a divisor of 60, got {0}")]
    InvalidInterval(u32),

    #[error("timer resolution must be between 1ms and 1s, got {0:?}")]
    InvalidResolution(Duration),
}

/// Result type for timer construction
pub type TimerResult<T> = Result<T, TimerError>;

/// Lifecycle of a timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerStatus {
    /// Waiting for START
    Idle,
    /// Firing ticks
    Running,
    /// Shut down; terminal
    Stopped,
}

/// Timer settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerConfig {
    /// Seconds between ticks; must divide 60
    pub interval: u32,
    /// Sleep slice between clock samples
    pub resolution: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            resolution: DEFAULT_RESOLUTION,
        }
    }
}

impl TimerConfig {
    /// Check the interval and resolution
    pub fn validate(&self) -> TimerResult<()> {
        if self.interval == 0 || 60 % self.interval != 0 {
            return Err(TimerError::InvalidInterval(self.interval));
        }
        if self.resolution.is_zero() || self.resolution > Duration::from_secs(1) {
            return Err(TimerError::InvalidResolution(self.resolution));
        }
        Ok(())
    }
}

/// Fires aligned TIME_CHANGED events while running
///
/// Dropping the Timer removes its START listener. The SHUTDOWN listener is
/// removed too unless the loop is running, in which case it stays so the
/// loop can still be stopped.
pub struct Timer {
    inner: Arc<TimerInner>,
    start_listener: ListenerId,
    shutdown_listener: ListenerId,
}

struct TimerInner {
    bus: Arc<EventBus>,
    config: TimerConfig,
    clock: Arc<dyn Clock>,
    status: Mutex<TimerStatus>,
}

impl Timer {
    /// Create a timer ticking every `interval` seconds on the system clock
    pub fn new(bus: Arc<EventBus>, interval: u32) -> TimerResult<Self> {
        let config = TimerConfig {
            interval,
            ..TimerConfig::default()
        };
        Self::with_clock(bus, config, Arc::new(SystemClock))
    }

    /// Create a timer with explicit settings and time source
    ///
    /// Registers the START and SHUTDOWN listeners on `bus`. Nothing is
    /// registered when the configuration is invalid.
    pub fn with_clock(
        bus: Arc<EventBus>,
        config: TimerConfig,
        clock: Arc<dyn Clock>,
    ) -> TimerResult<Self> {
        config.validate()?;

        let inner = Arc::new(TimerInner {
            bus: bus.clone(),
            config,
            clock,
            status: Mutex::new(TimerStatus::Idle),
        });

        let weak: Weak<TimerInner> = Arc::downgrade(&inner);
        let start_listener = bus.listen(START, move |_event: &mut Event| {
            if let Some(inner) = weak.upgrade() {
                inner.start();
            }
        });

        let weak: Weak<TimerInner> = Arc::downgrade(&inner);
        let shutdown_listener = bus.listen(SHUTDOWN, move |_event: &mut Event| {
            if let Some(inner) = weak.upgrade() {
                inner.stop();
            }
        });

        Ok(Self {
            inner,
            start_listener,
            shutdown_listener,
        })
    }

    /// Current lifecycle status
    pub fn status(&self) -> TimerStatus {
        *self.inner.lock()
    }

    /// Seconds between ticks
    pub fn interval(&self) -> u32 {
        self.inner.config.interval
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let bus = &self.inner.bus;
        bus.remove_listener(START, self.start_listener);
        if self.status() != TimerStatus::Running {
            bus.remove_listener(SHUTDOWN, self.shutdown_listener);
        }
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("config", &self.inner.config)
            .field("status", &self.status())
            .finish()
    }
}

impl TimerInner {
    fn lock(&self) -> MutexGuard<'_, TimerStatus> {
        self.status.lock().expect("timer status lock poisoned")
    }

    fn start(self: &Arc<Self>) {
        {
            let mut status = self.lock();
            match *status {
                TimerStatus::Idle => *status = TimerStatus::Running,
                TimerStatus::Running => {
                    debug!("Timer already running");
                    return;
                }
                TimerStatus::Stopped => {
                    warn!("Timer was shut down before it started");
                    return;
                }
            }
        }

        let inner = Arc::clone(self);
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(inner.run());
            }
            Err(_) => {
                std::thread::spawn(move || {
                    match tokio::runtime::Builder::new_current_thread()
                        .enable_time()
                        .build()
                    {
                        Ok(runtime) => runtime.block_on(inner.run()),
                        Err(err) => {
                            error!(error = %err, "Unable to build timer runtime");
                            *inner.lock() = TimerStatus::Stopped;
                        }
                    }
                });
            }
        }
    }

    fn stop(&self) {
        let mut status = self.lock();
        if *status != TimerStatus::Stopped {
            info!("Timer stopping");
            *status = TimerStatus::Stopped;
        }
    }

    async fn run(self: Arc<Self>) {
        let interval = self.config.interval;
        info!(interval, "Timer started");

        // Unix second of the last tick; a second is never fired twice
        let mut last_tick: Option<i64> = None;

        loop {
            tokio::time::sleep(self.config.resolution).await;

            let now = self.clock.now().with_timezone(&Local);
            let aligned = now.second() % interval == 0;
            let second = now.timestamp();

            {
                let status = self.lock();
                if *status != TimerStatus::Running {
                    break;
                }
                if aligned && last_tick != Some(second) {
                    last_tick = Some(second);
                    // Fired with the status lock held so no tick follows SHUTDOWN
                    self.bus.fire_typed(TimeChangedData { now });
                }
            }
        }

        info!("Timer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use ha_core::events::TIME_CHANGED;
    use ha_core::ManualClock;
    use tokio_test::{assert_err, assert_ok};

    const POLL: Duration = Duration::from_millis(10);
    const SETTLE: Duration = Duration::from_millis(150);

    fn at(second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap() + chrono::Duration::seconds(second as i64)
    }

    struct Harness {
        bus: Arc<EventBus>,
        clock: ManualClock,
        timer: Timer,
        ticks: Arc<Mutex<Vec<TimeChangedData>>>,
    }

    fn harness(interval: u32) -> Harness {
        let bus = Arc::new(EventBus::new());
        let clock = ManualClock::at(at(29));
        let config = TimerConfig {
            interval,
            resolution: POLL,
        };
        let timer = assert_ok!(Timer::with_clock(bus.clone(), config, Arc::new(clock.clone())));

        let ticks = Arc::new(Mutex::new(Vec::new()));
        let t = ticks.clone();
        bus.listen(TIME_CHANGED, move |event: &mut Event| {
            if let Some(data) = event.parse_data::<TimeChangedData>() {
                t.lock().unwrap().push(data);
            }
        });

        Harness {
            bus,
            clock,
            timer,
            ticks,
        }
    }

    async fn settle(bus: &EventBus) {
        tokio::time::sleep(SETTLE).await;
        bus.block_till_done().await;
    }

    #[test]
    fn test_interval_must_divide_sixty() {
        let bus = Arc::new(EventBus::new());
        for interval in [0, 7, 11, 25, 45, 61] {
            let err = assert_err!(Timer::new(bus.clone(), interval));
            assert_eq!(err, TimerError::InvalidInterval(interval));
        }
        assert!(bus.listeners().is_empty());

        for interval in [1, 2, 3, 4, 5, 6, 10, 12, 15, 20, 30, 60] {
            assert_ok!(Timer::new(bus.clone(), interval));
        }
        assert!(bus.listeners().is_empty());
    }

    #[test]
    fn test_drop_before_start_removes_listeners() {
        let bus = Arc::new(EventBus::new());
        let timer = assert_ok!(Timer::new(bus.clone(), 10));
        assert_eq!(bus.listeners().get(START), Some(&1));
        assert_eq!(bus.listeners().get(SHUTDOWN), Some(&1));

        drop(timer);
        assert!(bus.listeners().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_running_timer_still_stops_on_shutdown() {
        let Harness {
            bus,
            clock,
            timer,
            ticks,
        } = harness(10);
        bus.fire(Event::empty(START));
        settle(&bus).await;
        assert_eq!(timer.status(), TimerStatus::Running);

        drop(timer);
        assert!(bus.listeners().get(START).is_none());
        assert_eq!(bus.listeners().get(SHUTDOWN), Some(&1));

        bus.fire(Event::empty(SHUTDOWN));
        settle(&bus).await;

        clock.set(at(30));
        settle(&bus).await;
        assert!(ticks.lock().unwrap().is_empty());
    }

    #[test]
    fn test_resolution_bounds() {
        let bus = Arc::new(EventBus::new());
        for resolution in [Duration::ZERO, Duration::from_secs(2)] {
            let config = TimerConfig {
                interval: 10,
                resolution,
            };
            let err = assert_err!(Timer::with_clock(bus.clone(), config, Arc::new(SystemClock)));
            assert_eq!(err, TimerError::InvalidResolution(resolution));
        }
    }

    #[tokio::test]
    async fn test_idle_until_start() {
        let h = harness(10);
        assert_eq!(h.timer.status(), TimerStatus::Idle);

        h.clock.set(at(30));
        settle(&h.bus).await;
        assert!(h.ticks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fires_once_on_aligned_second() {
        let h = harness(10);
        h.bus.fire(Event::empty(START));
        settle(&h.bus).await;
        assert_eq!(h.timer.status(), TimerStatus::Running);
        assert!(h.ticks.lock().unwrap().is_empty());

        h.clock.set(at(30));
        settle(&h.bus).await;
        // Still inside the same second: no duplicate
        settle(&h.bus).await;

        {
            let ticks = h.ticks.lock().unwrap();
            assert_eq!(ticks.len(), 1);
            assert_eq!(ticks[0].now.second(), 30);
            assert_eq!(ticks[0].now.second() % 10, 0);
        }

        h.clock.set(at(35));
        settle(&h.bus).await;
        assert_eq!(h.ticks.lock().unwrap().len(), 1);

        h.clock.set(at(40));
        settle(&h.bus).await;
        assert_eq!(h.ticks.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_start_twice_runs_one_loop() {
        let h = harness(10);
        h.bus.fire(Event::empty(START));
        h.bus.fire(Event::empty(START));
        settle(&h.bus).await;

        h.clock.set(at(30));
        settle(&h.bus).await;

        assert_eq!(h.ticks.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_no_ticks_after_shutdown() {
        let h = harness(10);
        h.bus.fire(Event::empty(START));
        settle(&h.bus).await;

        h.bus.fire(Event::empty(SHUTDOWN));
        settle(&h.bus).await;
        assert_eq!(h.timer.status(), TimerStatus::Stopped);

        h.clock.set(at(30));
        settle(&h.bus).await;
        assert!(h.ticks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_before_start_is_terminal() {
        let h = harness(10);
        h.bus.fire(Event::empty(SHUTDOWN));
        settle(&h.bus).await;
        h.bus.fire(Event::empty(START));
        settle(&h.bus).await;

        assert_eq!(h.timer.status(), TimerStatus::Stopped);
        h.clock.set(at(30));
        settle(&h.bus).await;
        assert!(h.ticks.lock().unwrap().is_empty());
    }
}
