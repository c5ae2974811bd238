//! Typed event registration and dispatch.
//!
//! The supervisor publishes lifecycle events ([`EventKey`] built-ins) and
//! applications may define their own string-keyed events. Listeners are
//! plain callables invoked in registration order; a panicking listener is
//! isolated, reported, and never unwinds the dispatcher.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe, Location};

use serde_json::Value;
use tracing::error;

use crate::error::DaemonError;

/// Event identity.
///
/// Built-in lifecycle events are a closed set; user-defined events live in
/// a distinct string-keyed space and may not shadow a built-in name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKey {
    /// A recoverable error was recorded.
    Error,
    /// An OS signal was received; payload carries the signal number.
    Signal,
    /// Initialization finished; fired before the application's setup.
    Init,
    /// Start of a run-loop iteration, before the application executes.
    Run,
    /// A child process is about to be forked.
    Fork,
    /// The process id changed (daemonize); payload carries the new pid.
    NewPid,
    /// The process is about to replace itself.
    Restart,
    /// Normal loop exit; counterpart to `Init`.
    Shutdown,
    /// Application-defined event.
    Custom(String),
}

impl EventKey {
    const BUILTIN_NAMES: &'static [&'static str] = &[
        "error", "signal", "init", "run", "fork", "newpid", "restart", "shutdown",
    ];

    /// Create a user-defined event key.
    ///
    /// Names colliding with a built-in event (case-insensitively) are
    /// rejected so the two spaces cannot overlap.
    pub fn custom(name: impl Into<String>) -> Result<Self, DaemonError> {
        let name = name.into();
        if Self::BUILTIN_NAMES.contains(&name.to_ascii_lowercase().as_str()) {
            return Err(DaemonError::EventKeyReserved { name });
        }
        Ok(EventKey::Custom(name))
    }

    /// Stable name for logging.
    pub fn as_str(&self) -> &str {
        match self {
            EventKey::Error => "error",
            EventKey::Signal => "signal",
            EventKey::Init => "init",
            EventKey::Run => "run",
            EventKey::Fork => "fork",
            EventKey::NewPid => "newpid",
            EventKey::Restart => "restart",
            EventKey::Shutdown => "shutdown",
            EventKey::Custom(name) => name,
        }
    }
}

/// A dispatched event: key plus structured payload.
#[derive(Debug, Clone)]
pub struct Event {
    pub key: EventKey,
    pub payload: Value,
}

impl Event {
    /// Create an event with an empty payload.
    pub fn new(key: EventKey) -> Self {
        Self {
            key,
            payload: Value::Null,
        }
    }

    /// Attach a payload.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Listener callable. Receives a borrowed event; must not panic, but a
/// panic is contained if it does.
pub type Listener = Box<dyn FnMut(&Event) + Send + Sync>;

/// Opaque handle identifying one registered listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerHandle {
    key: EventKey,
    slot: u64,
}

impl ListenerHandle {
    /// The event this handle is registered under.
    pub fn key(&self) -> &EventKey {
        &self.key
    }
}

struct Slot {
    id: u64,
    origin: &'static Location<'static>,
    callback: Listener,
}

/// Ordered listener registry with isolated dispatch.
#[derive(Default)]
pub struct EventBus {
    slots: HashMap<EventKey, Vec<Slot>>,
    next_slot: u64,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener at the end of the event's list.
    ///
    /// The registration site is captured for failure reports.
    #[track_caller]
    pub fn on(&mut self, key: EventKey, callback: Listener) -> ListenerHandle {
        let id = self.next_slot;
        self.next_slot += 1;

        let origin = Location::caller();
        self.slots.entry(key.clone()).or_default().push(Slot {
            id,
            origin,
            callback,
        });

        ListenerHandle { key, slot: id }
    }

    /// Remove a listener, returning the callable it held.
    ///
    /// A stale handle (already removed, or never valid) yields `None`.
    pub fn off(&mut self, handle: &ListenerHandle) -> Option<Listener> {
        let slots = self.slots.get_mut(&handle.key)?;
        let idx = slots.iter().position(|s| s.id == handle.slot)?;
        Some(slots.remove(idx).callback)
    }

    /// Number of listeners registered for an event.
    pub fn listener_count(&self, key: &EventKey) -> usize {
        self.slots.get(key).map_or(0, Vec::len)
    }

    /// Invoke every listener registered for the event, in insertion order.
    ///
    /// A listener panic is caught, reported at ERROR severity with the
    /// event key, slot id, and registration site, and dispatch continues
    /// with the remaining listeners.
    pub fn dispatch(&mut self, key: &EventKey, payload: Value) {
        let event = Event {
            key: key.clone(),
            payload,
        };
        let Some(slots) = self.slots.get_mut(key) else {
            return;
        };

        for slot in slots.iter_mut() {
            invoke_contained(slot, &event);
        }
    }

    /// Invoke exactly one listener, identified by its handle.
    pub fn dispatch_to(&mut self, handle: &ListenerHandle, payload: Value) {
        let event = Event {
            key: handle.key.clone(),
            payload,
        };
        let Some(slots) = self.slots.get_mut(&handle.key) else {
            return;
        };

        if let Some(slot) = slots.iter_mut().find(|s| s.id == handle.slot) {
            invoke_contained(slot, &event);
        }
    }
}

/// Run one listener behind an unwind boundary.
fn invoke_contained(slot: &mut Slot, event: &Event) {
    let result = panic::catch_unwind(AssertUnwindSafe(|| (slot.callback)(event)));

    if let Err(payload) = result {
        let message = if let Some(msg) = payload.downcast_ref::<&'static str>() {
            (*msg).to_string()
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            msg.clone()
        } else {
            "unknown panic".to_string()
        };

        error!(
            event = event.key.as_str(),
            slot = slot.id,
            registered_at = %slot.origin,
            "listener panicked: {message}"
        );
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
