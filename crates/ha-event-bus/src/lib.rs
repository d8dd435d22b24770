//! Event bus with listener callbacks for Home Assistant
//!
//! This crate provides the EventBus, which is the central message broker
//! for Home Assistant. Components register callbacks for an event type (or
//! for every event type) and fire events without knowing who listens.
//!
//! # Dispatch
//!
//! `fire` never waits for listeners. Each call starts one dispatch run on its
//! own task which invokes, in registration order, every MATCH_ALL listener and
//! then every listener of the event's type. While handling the event a
//! listener may:
//!
//! - call [`Event::remove_listener`] to unsubscribe itself
//! - call [`Event::stop_propagation`] to skip the rest of the run
//!
//! A listener that panics is logged and skipped; the run carries on.

use ha_core::{Event, EventData, EventType};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::{debug, error, trace};

/// A unique identifier for an event listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Callback invoked for every matching event
pub type Callback = Arc<dyn Fn(&mut Event) + Send + Sync>;

/// One registration of a callback
struct Listener {
    id: ListenerId,
    callback: Callback,
    /// Cleared on removal so in-flight runs holding a snapshot skip it
    active: AtomicBool,
}

/// The event bus for publishing and subscribing to events
///
/// The EventBus is the central message broker in Home Assistant. It supports:
/// - Listening to specific event types
/// - Listening to all events (MATCH_ALL)
/// - Firing events without blocking the caller
/// - Waiting until every in-flight dispatch run has finished
pub struct EventBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    /// Listener sequences keyed by event type, MATCH_ALL included
    listeners: Mutex<HashMap<EventType, Vec<Arc<Listener>>>>,
    /// Counter for generating unique listener IDs
    next_listener_id: AtomicU64,
    /// Dispatch runs started but not yet finished
    pending: AtomicUsize,
    /// Signalled whenever `pending` drops to zero
    idle: Notify,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                listeners: Mutex::new(HashMap::new()),
                next_listener_id: AtomicU64::new(1),
                pending: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    /// Listen for events of a specific type
    ///
    /// Pass [`EventType::MATCH_ALL`] to receive every event. Registering the
    /// same closure twice yields two independent listeners.
    pub fn listen<F>(&self, event_type: impl Into<EventType>, callback: F) -> ListenerId
    where
        F: Fn(&mut Event) + Send + Sync + 'static,
    {
        let event_type = event_type.into();
        let id = ListenerId(self.inner.next_listener_id.fetch_add(1, Ordering::SeqCst));
        trace!(event_type = %event_type, listener = id.0, "Adding listener");

        let listener = Arc::new(Listener {
            id,
            callback: Arc::new(callback),
            active: AtomicBool::new(true),
        });
        self.inner
            .lock()
            .entry(event_type)
            .or_default()
            .push(listener);
        id
    }

    /// Listen for the next event of a type only
    pub fn listen_once<F>(&self, event_type: impl Into<EventType>, callback: F) -> ListenerId
    where
        F: Fn(&mut Event) + Send + Sync + 'static,
    {
        self.listen(event_type, move |event: &mut Event| {
            event.remove_listener();
            callback(event);
        })
    }

    /// Remove a listener registered under `event_type`
    ///
    /// Returns false when no such registration exists.
    pub fn remove_listener(&self, event_type: impl Into<EventType>, id: ListenerId) -> bool {
        let event_type = event_type.into();
        let mut listeners = self.inner.lock();

        let Some(sequence) = listeners.get_mut(&event_type) else {
            return false;
        };
        let Some(pos) = sequence.iter().position(|l| l.id == id) else {
            return false;
        };

        let listener = sequence.remove(pos);
        listener.active.store(false, Ordering::SeqCst);
        if sequence.is_empty() {
            listeners.remove(&event_type);
        }
        debug!(event_type = %event_type, listener = id.0, "Removed listener");
        true
    }

    /// Number of listeners per event type
    pub fn listeners(&self) -> HashMap<String, usize> {
        self.inner
            .lock()
            .iter()
            .map(|(event_type, sequence)| (event_type.to_string(), sequence.len()))
            .collect()
    }

    /// Fire an event to all listeners
    ///
    /// Returns immediately; listeners run on a separate task. Inside a tokio
    /// runtime the run goes to the blocking pool since listeners may block,
    /// otherwise it gets its own thread.
    pub fn fire(&self, event: Event) {
        debug!(event_type = %event.event_type, data = %event.data, "Firing event");

        let guard = PendingRun::new(&self.inner);
        let run = move || {
            let mut event = event;
            guard.inner.dispatch(&mut event);
            drop(guard);
        };

        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(run);
            }
            Err(_) => {
                std::thread::spawn(run);
            }
        }
    }

    /// Fire a typed event
    pub fn fire_typed<T: EventData + serde::Serialize>(&self, data: T) {
        let data = match serde_json::to_value(&data) {
            Ok(data) => data,
            Err(err) => {
                error!(event_type = T::event_type(), error = %err, "Unable to encode event data");
                return;
            }
        };
        self.fire(Event::new(T::event_type(), data));
    }

    /// Wait until no dispatch run is in flight
    ///
    /// Events fired by listeners while waiting are waited for as well.
    pub async fn block_till_done(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.inner.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl BusInner {
    fn lock(&self) -> MutexGuard<'_, HashMap<EventType, Vec<Arc<Listener>>>> {
        self.listeners.lock().expect("event bus lock poisoned")
    }

    /// Run every matching listener against one event
    fn dispatch(&self, event: &mut Event) {
        // Snapshot under the lock; callbacks run without it so they can
        // listen, fire or set state themselves.
        let run: Vec<Arc<Listener>> = {
            let listeners = self.lock();
            let match_all = listeners.get(&EventType::match_all());
            let specific = if event.event_type.is_match_all() {
                None
            } else {
                listeners.get(&event.event_type)
            };
            match_all
                .into_iter()
                .chain(specific)
                .flatten()
                .cloned()
                .collect()
        };

        trace!(event_type = %event.event_type, listeners = run.len(), "Dispatching event");

        for listener in run {
            if !listener.active.load(Ordering::SeqCst) {
                continue;
            }

            let callback = &listener.callback;
            if panic::catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                error!(
                    event_type = %event.event_type,
                    listener = listener.id.0,
                    "Error running listener"
                );
            }

            if event.take_remove_listener() {
                self.remove_everywhere(&event.event_type, listener.id);
            }

            if event.is_propagation_stopped() {
                trace!(event_type = %event.event_type, "Propagation stopped");
                break;
            }
        }
    }

    /// Drop a listener from the MATCH_ALL and the event's own sequence
    fn remove_everywhere(&self, event_type: &EventType, id: ListenerId) {
        let mut listeners = self.lock();
        for key in [EventType::match_all(), event_type.clone()] {
            if let Some(sequence) = listeners.get_mut(&key) {
                sequence.retain(|l| {
                    if l.id == id {
                        l.active.store(false, Ordering::SeqCst);
                        false
                    } else {
                        true
                    }
                });
                if sequence.is_empty() {
                    listeners.remove(&key);
                }
            }
        }
        debug!(event_type = %event_type, listener = id.0, "Listener removed itself");
    }

    fn finish_run(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Counts one dispatch run as in flight until dropped
///
/// Dropped at the end of the run, or unrun if the runtime discards it.
struct PendingRun {
    inner: Arc<BusInner>,
}

impl PendingRun {
    fn new(inner: &Arc<BusInner>) -> Self {
        inner.pending.fetch_add(1, Ordering::SeqCst);
        Self {
            inner: Arc::clone(inner),
        }
    }
}

impl Drop for PendingRun {
    fn drop(&mut self) {
        self.inner.finish_run();
    }
}
