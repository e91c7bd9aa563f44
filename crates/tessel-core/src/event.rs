//! Synchronous publish/subscribe event bus.
//!
//! One [`EventBus`] is shared by the whole world and one more is owned by
//! every entity. Delivery is synchronous: [`EventBus::publish`] invokes each
//! handler subscribed to the event name, in subscription order, before it
//! returns.
//!
//! # Busy handlers
//!
//! A handler may answer with [`Reply::Busy`] carrying a [`BusyToken`]. Until
//! that token settles, publishes skip that one handler; every other handler
//! on the bus, including others subscribed to the same name, still runs.
//! A publish in which every subscriber was skipped this way is reported as
//! [`Publish::Suppressed`].
//!
//! # Faults
//!
//! A handler returning `Err` aborts the dispatch: handlers after it do not
//! run for that publish, and the error comes back to the publisher as
//! [`CoreError::Handler`].
//!
//! # Example
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use tessel_core::prelude::*;
//!
//! let bus = EventBus::new();
//! let hits = Rc::new(Cell::new(0));
//! let counter = Rc::clone(&hits);
//! let sub = bus.subscribe("ping", move |_| {
//!     counter.set(counter.get() + 1);
//!     Ok(Reply::Done)
//! });
//!
//! bus.publish("ping", Payload::Empty).unwrap();
//! sub.cancel();
//! bus.publish("ping", Payload::Empty).unwrap();
//! assert_eq!(hits.get(), 1);
//! ```

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::entity::{EntityRef, Position};
use crate::CoreError;

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// Data carried by an event.
#[derive(Debug, Clone, Default)]
pub enum Payload {
    #[default]
    Empty,
    /// A grid cell, e.g. the target of a movement outcome.
    Position(Position),
    /// Another entity, e.g. the other party of a collision.
    Entity(EntityRef),
    /// Free-form script data.
    Value(serde_json::Value),
}

impl Payload {
    pub fn position(&self) -> Option<Position> {
        match self {
            Payload::Position(p) => Some(*p),
            _ => None,
        }
    }

    pub fn entity(&self) -> Option<&EntityRef> {
        match self {
            Payload::Entity(e) => Some(e),
            _ => None,
        }
    }

    pub fn value(&self) -> Option<&serde_json::Value> {
        match self {
            Payload::Value(v) => Some(v),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// BusyToken / Reply
// ---------------------------------------------------------------------------

/// A settle-once marker a handler hands back to say "not ready for the next
/// one yet".
///
/// Clones share state: settling any clone settles all of them.
#[derive(Clone, Default)]
pub struct BusyToken(Rc<Cell<bool>>);

impl BusyToken {
    /// A new, unsettled token.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn settle(&self) {
        self.0.set(true);
    }

    pub fn is_settled(&self) -> bool {
        self.0.get()
    }
}

impl fmt::Debug for BusyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BusyToken(settled: {})", self.is_settled())
    }
}

/// What a handler returns when it finishes without error.
#[derive(Debug, Clone)]
pub enum Reply {
    Done,
    /// Hold back further deliveries of this event name until the token
    /// settles.
    Busy(BusyToken),
}

/// The result type handlers return.
pub type HandlerResult = anyhow::Result<Reply>;

/// Outcome of [`EventBus::publish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Publish {
    /// Carries how many subscribers ran. Busy subscribers are not counted.
    Delivered(usize),
    /// Every subscriber is still busy with an earlier delivery; none ran.
    Suppressed,
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

type Handler = Rc<dyn Fn(&Payload) -> HandlerResult>;

#[derive(Default)]
struct BusState {
    next_id: u64,
    /// Event name -> handlers in subscription order.
    handlers: HashMap<String, Vec<(u64, Handler)>>,
    /// Subscription id -> token that handler returned and has not settled.
    in_flight: HashMap<u64, BusyToken>,
}

impl BusState {
    fn is_subscribed(&self, name: &str, id: u64) -> bool {
        self.handlers
            .get(name)
            .is_some_and(|list| list.iter().any(|(sid, _)| *sid == id))
    }

    /// Whether handler `id` is waiting on an unsettled token. Forgets the
    /// token once it has settled.
    fn is_handler_busy(&mut self, id: u64) -> bool {
        let settled = match self.in_flight.get(&id) {
            Some(token) => token.is_settled(),
            None => return false,
        };
        if settled {
            self.in_flight.remove(&id);
        }
        !settled
    }
}

/// A synchronous publish/subscribe channel.
///
/// `EventBus` is a cheap handle; clones refer to the same bus. No internal
/// borrow is held while a handler runs, so handlers may freely subscribe,
/// cancel, or publish (on this bus or any other).
#[derive(Clone, Default)]
pub struct EventBus {
    state: Rc<RefCell<BusState>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events named `name`.
    ///
    /// The returned [`Subscription`] removes exactly this registration when
    /// cancelled. Dropping it without cancelling keeps the handler
    /// subscribed.
    pub fn subscribe<F>(&self, name: &str, handler: F) -> Subscription
    where
        F: Fn(&Payload) -> HandlerResult + 'static,
    {
        let handler: Handler = Rc::new(handler);
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = state.next_id;
        state
            .handlers
            .entry(name.to_owned())
            .or_default()
            .push((id, handler));
        Subscription {
            bus: Rc::downgrade(&self.state),
            name: name.to_owned(),
            id,
            cancelled: Cell::new(false),
        }
    }

    /// Deliver `payload` to every handler subscribed to `name`.
    ///
    /// The subscriber list is snapshotted up front. Handlers added during
    /// the dispatch are not called; handlers cancelled during the dispatch
    /// are skipped if they have not run yet. Handlers still busy from an
    /// earlier delivery are skipped as well.
    pub fn publish(&self, name: &str, payload: Payload) -> Result<Publish, CoreError> {
        let snapshot: Vec<(u64, Handler)> = self.state.borrow().handlers.get(name).cloned().unwrap_or_default();

        let mut delivered = 0;
        let mut busy = 0;
        for (id, handler) in snapshot {
            {
                let mut state = self.state.borrow_mut();
                if !state.is_subscribed(name, id) {
                    continue;
                }
                if state.is_handler_busy(id) {
                    busy += 1;
                    continue;
                }
            }
            let reply = handler(&payload).map_err(|source| CoreError::Handler {
                event: name.to_owned(),
                source,
            })?;
            delivered += 1;
            if let Reply::Busy(token) = reply {
                let mut state = self.state.borrow_mut();
                if !token.is_settled() && state.is_subscribed(name, id) {
                    state.in_flight.insert(id, token);
                }
            }
        }
        if delivered == 0 && busy > 0 {
            debug!(event = name, busy, "dropping event while every handler is busy");
            return Ok(Publish::Suppressed);
        }
        if busy > 0 {
            debug!(event = name, busy, delivered, "skipped busy handlers");
        }
        Ok(Publish::Delivered(delivered))
    }

    /// Number of live subscriptions for `name`.
    pub fn subscriber_count(&self, name: &str) -> usize {
        self.state.borrow().handlers.get(name).map_or(0, Vec::len)
    }

    /// Whether any handler subscribed to `name` is waiting on a busy token.
    pub fn is_busy(&self, name: &str) -> bool {
        let mut state = self.state.borrow_mut();
        let ids: Vec<u64> = state
            .handlers
            .get(name)
            .map(|list| list.iter().map(|(id, _)| *id).collect())
            .unwrap_or_default();
        let mut busy = false;
        for id in ids {
            busy |= state.is_handler_busy(id);
        }
        busy
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        let mut names: Vec<&str> = state.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("EventBus").field("events", &names).finish()
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Capability to remove one subscription from its bus.
#[derive(Debug)]
pub struct Subscription {
    bus: Weak<RefCell<BusState>>,
    name: String,
    id: u64,
    cancelled: Cell<bool>,
}

impl Subscription {
    /// Remove the handler from its bus. Calling this more than once, or after
    /// the bus is gone, does nothing.
    pub fn cancel(&self) {
        if self.cancelled.replace(true) {
            return;
        }
        let Some(state) = self.bus.upgrade() else {
            return;
        };
        let mut state = state.borrow_mut();
        state.in_flight.remove(&self.id);
        if let Some(list) = state.handlers.get_mut(&self.name) {
            list.retain(|(id, _)| *id != self.id);
            if list.is_empty() {
                state.handlers.remove(&self.name);
            }
        }
    }

    pub fn event(&self) -> &str {
        &self.name
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(bus: &EventBus, name: &str, log: &Rc<RefCell<Vec<String>>>, tag: &str) -> Subscription {
        let log = Rc::clone(log);
        let tag = tag.to_owned();
        bus.subscribe(name, move |_| {
            log.borrow_mut().push(tag.clone());
            Ok(Reply::Done)
        })
    }

    #[test]
    fn delivers_in_subscription_order() {
        let bus = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        recorder(&bus, "tick", &log, "a");
        recorder(&bus, "tick", &log, "b");
        recorder(&bus, "other", &log, "x");
        recorder(&bus, "tick", &log, "c");

        let outcome = bus.publish("tick", Payload::Empty).unwrap();
        assert_eq!(outcome, Publish::Delivered(3));
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn publish_without_subscribers_delivers_nothing() {
        let bus = EventBus::new();
        assert_eq!(bus.publish("nobody", Payload::Empty).unwrap(), Publish::Delivered(0));
    }

    #[test]
    fn cancel_is_idempotent_and_targets_one_subscription() {
        let bus = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = recorder(&bus, "tick", &log, "a");
        recorder(&bus, "tick", &log, "b");

        a.cancel();
        a.cancel();
        assert!(a.is_cancelled());
        assert_eq!(bus.subscriber_count("tick"), 1);

        bus.publish("tick", Payload::Empty).unwrap();
        assert_eq!(*log.borrow(), vec!["b"]);
    }

    #[test]
    fn cancel_after_bus_dropped_is_harmless() {
        let bus = EventBus::new();
        let sub = bus.subscribe("tick", |_| Ok(Reply::Done));
        drop(bus);
        sub.cancel();
    }

    #[test]
    fn handler_error_stops_remaining_handlers() {
        let bus = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        recorder(&bus, "tick", &log, "a");
        bus.subscribe("tick", |_| Err(anyhow::anyhow!("boom")));
        recorder(&bus, "tick", &log, "c");

        let err = bus.publish("tick", Payload::Empty).unwrap_err();
        match err {
            CoreError::Handler { event, source } => {
                assert_eq!(event, "tick");
                assert_eq!(source.to_string(), "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(*log.borrow(), vec!["a"]);
    }

    #[test]
    fn handler_cancelled_mid_dispatch_is_skipped() {
        let bus = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let victim: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let slot = Rc::clone(&victim);
        bus.subscribe("tick", move |_| {
            if let Some(sub) = slot.borrow().as_ref() {
                sub.cancel();
            }
            Ok(Reply::Done)
        });
        *victim.borrow_mut() = Some(recorder(&bus, "tick", &log, "victim"));

        assert_eq!(bus.publish("tick", Payload::Empty).unwrap(), Publish::Delivered(1));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn handler_subscribed_mid_dispatch_waits_for_next_publish() {
        let bus = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let inner_bus = bus.clone();
        let inner_log = Rc::clone(&log);
        let once = Cell::new(false);
        bus.subscribe("tick", move |_| {
            if !once.replace(true) {
                recorder(&inner_bus, "tick", &inner_log, "late");
            }
            Ok(Reply::Done)
        });

        bus.publish("tick", Payload::Empty).unwrap();
        assert!(log.borrow().is_empty());
        bus.publish("tick", Payload::Empty).unwrap();
        assert_eq!(*log.borrow(), vec!["late"]);
    }

    #[test]
    fn busy_token_suppresses_until_settled() {
        let bus = EventBus::new();
        let token = BusyToken::new();
        let calls = Rc::new(Cell::new(0));

        let handed_out = token.clone();
        let counter = Rc::clone(&calls);
        bus.subscribe("interaction", move |_| {
            counter.set(counter.get() + 1);
            Ok(Reply::Busy(handed_out.clone()))
        });

        assert_eq!(bus.publish("interaction", Payload::Empty).unwrap(), Publish::Delivered(1));
        assert!(bus.is_busy("interaction"));
        assert_eq!(bus.publish("interaction", Payload::Empty).unwrap(), Publish::Suppressed);
        assert_eq!(calls.get(), 1);

        // Other event names are unaffected.
        assert_eq!(bus.publish("other", Payload::Empty).unwrap(), Publish::Delivered(0));

        token.settle();
        assert!(!bus.is_busy("interaction"));
        assert_eq!(bus.publish("interaction", Payload::Empty).unwrap(), Publish::Delivered(1));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn busy_handler_does_not_block_its_neighbours() {
        let bus = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let token = BusyToken::new();

        let handed_out = token.clone();
        let slow_log = Rc::clone(&log);
        bus.subscribe("moved", move |_| {
            slow_log.borrow_mut().push("slow".to_owned());
            Ok(Reply::Busy(handed_out.clone()))
        });
        recorder(&bus, "moved", &log, "fast");

        assert_eq!(bus.publish("moved", Payload::Empty).unwrap(), Publish::Delivered(2));
        assert_eq!(bus.publish("moved", Payload::Empty).unwrap(), Publish::Delivered(1));
        assert!(bus.is_busy("moved"));
        assert_eq!(*log.borrow(), vec!["slow", "fast", "fast"]);

        token.settle();
        assert_eq!(bus.publish("moved", Payload::Empty).unwrap(), Publish::Delivered(2));
        assert!(!bus.is_busy("moved"));
    }

    #[test]
    fn cancelling_a_busy_handler_forgets_its_token() {
        let bus = EventBus::new();
        let sub = bus.subscribe("tick", |_| Ok(Reply::Busy(BusyToken::new())));
        bus.publish("tick", Payload::Empty).unwrap();
        assert!(bus.is_busy("tick"));
        sub.cancel();
        assert!(!bus.is_busy("tick"));
        assert!(bus.state.borrow().in_flight.is_empty());
    }

    #[test]
    fn already_settled_token_does_not_block() {
        let bus = EventBus::new();
        bus.subscribe("tick", |_| {
            let token = BusyToken::new();
            token.settle();
            Ok(Reply::Busy(token))
        });
        bus.publish("tick", Payload::Empty).unwrap();
        assert!(!bus.is_busy("tick"));
    }

    #[test]
    fn payload_accessors() {
        let p = Payload::Position(Position::new(1, 2));
        assert_eq!(p.position(), Some(Position::new(1, 2)));
        assert!(p.entity().is_none());
        let v = Payload::Value(serde_json::json!({"score": 3}));
        assert_eq!(v.value().unwrap()["score"], 3);
        assert!(Payload::default().position().is_none());
    }
}
