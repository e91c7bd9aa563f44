//! Collision coordination: movement outcomes in, collider notifications out.
//!
//! The [`CollisionCoordinator`] attaches to one entity that carries a
//! [`Collider`] and listens on that entity's own bus:
//!
//! 1. [`CANNOT_MOVE`] at `(x, y)`: every enabled occupant of `(x, y)` with a
//!    collider gets [`Collider::on_collision`] with the entity that tried to
//!    move. The mover failed to enter the cell, so it cannot be among them.
//! 2. [`POSITION_CHANGED`] to `(x, y)`: occupants of `(x, y)` other than the
//!    mover get [`Collider::on_trigger`]; then occupants of the cell the
//!    mover was last seen in get [`Collider::on_trigger_exit`], even when
//!    that is `(x, y)` again. The tracked position becomes `(x, y)` once the
//!    handler has read the old value.
//!
//! The movement system must relocate the entity through the registry before
//! publishing [`POSITION_CHANGED`]. Occupant lists are snapshots, so
//! notification handlers may move, spawn or despawn entities without
//! disturbing the dispatch in progress. Order follows registration order of
//! the occupants.

use std::cell::Cell;
use std::rc::{Rc, Weak};

use anyhow::anyhow;
use tracing::{debug, trace};

use tessel_core::prelude::*;

use crate::collider::Collider;
use crate::events::{CANNOT_MOVE, POSITION_CHANGED};

// ---------------------------------------------------------------------------
// Dispatch helpers
// ---------------------------------------------------------------------------

/// Enabled occupants of `cell` that carry a collider, excluding `mover`.
fn colliders_at(registry: &EntityRegistry, cell: Position, mover: &EntityRef) -> Vec<Rc<Collider>> {
    registry
        .find_by_position(cell.x, cell.y)
        .into_iter()
        .filter(|occupant| !Entity::same(occupant, mover))
        .filter_map(|occupant| occupant.components().find::<Collider>())
        .collect()
}

/// Tell everything at `target` that `mover` bumped into it. Returns the
/// number of colliders notified.
pub fn notify_blocked(registry: &EntityRegistry, mover: &EntityRef, target: Position) -> Result<usize, CoreError> {
    let colliders = colliders_at(registry, target, mover);
    for collider in &colliders {
        collider.on_collision(mover)?;
    }
    trace!(entity = %mover.id(), %target, notified = colliders.len(), "collision dispatched");
    Ok(colliders.len())
}

/// Tell everything at `to` that `mover` arrived, then everything at `from`
/// that it left. A move within one cell does both for the same occupants.
/// Returns `(triggered, exited)` counts.
pub fn notify_moved(
    registry: &EntityRegistry,
    mover: &EntityRef,
    from: Position,
    to: Position,
) -> Result<(usize, usize), CoreError> {
    let entered = colliders_at(registry, to, mover);
    for collider in &entered {
        collider.on_trigger(mover)?;
    }

    let left = colliders_at(registry, from, mover);
    for collider in &left {
        collider.on_trigger_exit(mover)?;
    }
    trace!(entity = %mover.id(), %from, %to, entered = entered.len(), exited = left.len(), "move dispatched");
    Ok((entered.len(), left.len()))
}

// ---------------------------------------------------------------------------
// CollisionCoordinator
// ---------------------------------------------------------------------------

/// The pair of subscriptions that drive collision notifications for one
/// entity.
///
/// Holds only weak references to the entity and the registry; once either
/// is gone the handlers do nothing.
#[derive(Debug)]
pub struct CollisionCoordinator {
    entity: EntityId,
    previous: Rc<Cell<Position>>,
    subscriptions: [Subscription; 2],
}

impl CollisionCoordinator {
    /// Subscribe the coordinator's handlers on `entity`'s bus. The entity's
    /// current position becomes the tracked previous position.
    pub fn attach(entity: &EntityRef, registry: &EntityRegistry) -> Self {
        let previous = Rc::new(Cell::new(entity.position()));

        let blocked = {
            let registry = registry.downgrade();
            let me: Weak<Entity> = Rc::downgrade(entity);
            entity.events().subscribe(CANNOT_MOVE, move |payload| {
                let (Some(registry), Some(me)) = (registry.upgrade(), me.upgrade()) else {
                    return Ok(Reply::Done);
                };
                let target = payload
                    .position()
                    .ok_or_else(|| anyhow!("'{CANNOT_MOVE}' published without a target cell"))?;
                notify_blocked(&registry, &me, target)?;
                Ok(Reply::Done)
            })
        };

        let moved = {
            let registry = registry.downgrade();
            let me: Weak<Entity> = Rc::downgrade(entity);
            let previous = Rc::clone(&previous);
            entity.events().subscribe(POSITION_CHANGED, move |payload| {
                let (Some(registry), Some(me)) = (registry.upgrade(), me.upgrade()) else {
                    return Ok(Reply::Done);
                };
                let to = payload
                    .position()
                    .ok_or_else(|| anyhow!("'{POSITION_CHANGED}' published without a target cell"))?;
                // Swapped before dispatch: a nested move from inside a
                // notification must see `to` as the cell being left.
                let from = previous.replace(to);
                notify_moved(&registry, &me, from, to)?;
                Ok(Reply::Done)
            })
        };

        debug!(entity = %entity.id(), "collision coordinator attached");
        Self {
            entity: entity.id(),
            previous,
            subscriptions: [blocked, moved],
        }
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    /// The last position this coordinator saw the entity arrive at.
    pub fn previous_position(&self) -> Position {
        self.previous.get()
    }

    /// Unsubscribe both handlers. Idempotent.
    pub fn detach(&self) {
        for sub in &self.subscriptions {
            sub.cancel();
        }
    }

    pub fn is_attached(&self) -> bool {
        self.subscriptions.iter().all(|s| !s.is_cancelled())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
