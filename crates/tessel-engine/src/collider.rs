//! Built-in capabilities that translate engine notifications into script
//! events.
//!
//! A [`Collider`] receives collision notifications from the
//! [`CollisionCoordinator`](crate::collision::CollisionCoordinator) and
//! re-publishes them on its owner's bus as [`COLLISION`], [`TRIGGER`] or
//! [`TRIGGER_EXIT`], carrying the other entity. Scripts subscribe to those
//! names and never see the coordinator.

use std::cell::Cell;
use std::rc::Rc;

use tessel_core::prelude::*;

use crate::events::{COLLISION, INTERACTION, TRIGGER, TRIGGER_EXIT};

// ---------------------------------------------------------------------------
// Collider
// ---------------------------------------------------------------------------

/// Grid-occupancy collider.
///
/// `walkable` tells the movement system whether other entities may enter
/// this cell. It starts out equal to `is_trigger`: trigger volumes can be
/// walked into, solid colliders cannot.
#[derive(Debug)]
pub struct Collider {
    is_trigger: bool,
    walkable: Cell<bool>,
    events: EventBus,
}

impl Capability for Collider {
    const KIND: &'static str = "Collider";
}

impl Collider {
    /// `events` is the owning entity's bus.
    pub fn new(events: EventBus, is_trigger: bool) -> Self {
        Self {
            is_trigger,
            walkable: Cell::new(is_trigger),
            events,
        }
    }

    pub fn is_trigger(&self) -> bool {
        self.is_trigger
    }

    pub fn walkable(&self) -> bool {
        self.walkable.get()
    }

    pub fn set_walkable(&self, walkable: bool) {
        self.walkable.set(walkable);
    }

    /// `other` tried to move into this cell and was refused.
    pub fn on_collision(&self, other: &EntityRef) -> Result<Publish, CoreError> {
        self.events.publish(COLLISION, Payload::Entity(Rc::clone(other)))
    }

    /// `other` moved into this cell.
    pub fn on_trigger(&self, other: &EntityRef) -> Result<Publish, CoreError> {
        self.events.publish(TRIGGER, Payload::Entity(Rc::clone(other)))
    }

    /// `other` moved out of this cell.
    pub fn on_trigger_exit(&self, other: &EntityRef) -> Result<Publish, CoreError> {
        self.events.publish(TRIGGER_EXIT, Payload::Entity(Rc::clone(other)))
    }
}

// ---------------------------------------------------------------------------
// Interactable
// ---------------------------------------------------------------------------

/// Marks an entity as something others can interact with.
#[derive(Debug)]
pub struct Interactable {
    events: EventBus,
}

impl Capability for Interactable {
    const KIND: &'static str = "Interactable";
}

impl Interactable {
    pub fn new(events: EventBus) -> Self {
        Self { events }
    }

    /// Publish [`INTERACTION`] on the owner's bus with `by` as payload.
    ///
    /// Returns [`Publish::Suppressed`] while the owner's script is still busy
    /// with a previous interaction.
    pub fn interact(&self, by: &EntityRef) -> Result<Publish, CoreError> {
        self.events.publish(INTERACTION, Payload::Entity(Rc::clone(by)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn entity(id: u64) -> EntityRef {
        Entity::new(EntityId::from_raw(id), Position::default()).into_ref()
    }

    fn record(bus: &EventBus, name: &str, log: &Rc<RefCell<Vec<(String, EntityId)>>>) {
        let log = Rc::clone(log);
        let name_owned = name.to_owned();
        bus.subscribe(name, move |payload| {
            if let Some(other) = payload.entity() {
                log.borrow_mut().push((name_owned.clone(), other.id()));
            }
            Ok(Reply::Done)
        });
    }

    #[test]
    fn walkable_defaults_to_trigger_flag() {
        let owner = entity(1);
        assert!(!Collider::new(owner.events().clone(), false).walkable());
        let trigger = Collider::new(owner.events().clone(), true);
        assert!(trigger.walkable());
        trigger.set_walkable(false);
        assert!(!trigger.walkable());
        assert!(trigger.is_trigger());
    }

    #[test]
    fn notifications_are_republished_on_owner_bus() {
        let owner = entity(1);
        let other = entity(2);
        let log = Rc::new(RefCell::new(Vec::new()));
        for name in [COLLISION, TRIGGER, TRIGGER_EXIT] {
            record(owner.events(), name, &log);
        }

        let collider = Collider::new(owner.events().clone(), false);
        collider.on_collision(&other).unwrap();
        collider.on_trigger(&other).unwrap();
        collider.on_trigger_exit(&other).unwrap();

        assert_eq!(
            *log.borrow(),
            vec![
                (COLLISION.to_owned(), other.id()),
                (TRIGGER.to_owned(), other.id()),
                (TRIGGER_EXIT.to_owned(), other.id()),
            ]
        );
    }

    #[test]
    fn interact_respects_busy_script() {
        let owner = entity(1);
        let visitor = entity(2);
        let token = BusyToken::new();
        let handed_out = token.clone();
        owner
            .events()
            .subscribe(INTERACTION, move |_| Ok(Reply::Busy(handed_out.clone())));

        let interactable = Interactable::new(owner.events().clone());
        assert_eq!(interactable.interact(&visitor).unwrap(), Publish::Delivered(1));
        assert_eq!(interactable.interact(&visitor).unwrap(), Publish::Suppressed);
        token.settle();
        assert_eq!(interactable.interact(&visitor).unwrap(), Publish::Delivered(1));
    }
}
