//! The multi-index entity registry.
//!
//! [`EntityRegistry`] keeps four lookup structures over live entities:
//!
//! | index     | key          | value                         |
//! |-----------|--------------|-------------------------------|
//! | id        | [`EntityId`] | one handle                    |
//! | name      | `String`     | one handle (last writer wins) |
//! | position  | [`Position`] | handles in registration order |
//! | layer     | `String`     | handles in registration order |
//!
//! All four change together, and only through [`register`], [`unregister`],
//! [`relocate`] and [`reset_all`]. No borrow of the indices escapes a call,
//! so lookups always return owned snapshots that stay valid while handlers
//! mutate the registry.
//!
//! [`register`]: EntityRegistry::register
//! [`unregister`]: EntityRegistry::unregister
//! [`relocate`]: EntityRegistry::relocate
//! [`reset_all`]: EntityRegistry::reset_all

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, warn};

use crate::entity::{Entity, EntityId, EntityRef, Position};

// ---------------------------------------------------------------------------
// Indices
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Indices {
    by_id: HashMap<EntityId, EntityRef>,
    by_name: HashMap<String, EntityRef>,
    by_position: HashMap<Position, Vec<EntityRef>>,
    by_layer: HashMap<String, Vec<EntityRef>>,
}

impl Indices {
    fn is_live(&self, entity: &EntityRef) -> bool {
        self.by_id
            .get(&entity.id())
            .is_some_and(|e| Entity::same(e, entity))
    }
}

/// Removes `entity` (by handle identity) from the bucket under `key`,
/// dropping the bucket once empty.
fn remove_from_bucket<K>(buckets: &mut HashMap<K, Vec<EntityRef>>, key: &K, entity: &EntityRef) -> bool
where
    K: std::hash::Hash + Eq,
{
    let Some(list) = buckets.get_mut(key) else {
        return false;
    };
    let Some(index) = list.iter().position(|e| Entity::same(e, entity)) else {
        return false;
    };
    list.remove(index);
    if list.is_empty() {
        buckets.remove(key);
    }
    true
}

fn enabled(list: Option<&Vec<EntityRef>>) -> Vec<EntityRef> {
    list.map(|l| l.iter().filter(|e| !e.is_disabled()).cloned().collect())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// EntityRegistry
// ---------------------------------------------------------------------------

/// Shared handle to the world's entity indices. Clones refer to the same
/// registry.
#[derive(Clone, Default)]
pub struct EntityRegistry {
    indices: Rc<RefCell<Indices>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index `entity` under its id, name, current position and layer.
    ///
    /// A name already held by another entity is taken over silently.
    pub fn register(&self, entity: &EntityRef) {
        let mut idx = self.indices.borrow_mut();
        if idx.is_live(entity) {
            warn!(entity = %entity.id(), "entity registered twice; ignoring");
            return;
        }
        if let Some(previous) = idx.by_id.insert(entity.id(), Rc::clone(entity)) {
            // A different handle under the same id: forget the old one entirely.
            warn!(entity = %entity.id(), "id reused by a different handle; replacing");
            Self::unindex_secondary(&mut idx, &previous);
        }
        if let Some(name) = entity.name() {
            if let Some(prev) = idx.by_name.insert(name.to_owned(), Rc::clone(entity)) {
                debug!(name, previous = %prev.id(), entity = %entity.id(), "name taken over");
            }
        }
        idx.by_position
            .entry(entity.position())
            .or_default()
            .push(Rc::clone(entity));
        if let Some(layer) = entity.layer() {
            idx.by_layer
                .entry(layer.to_owned())
                .or_default()
                .push(Rc::clone(entity));
        }
        debug!(entity = %entity.id(), position = %entity.position(), "registered");
    }

    /// Reverse [`register`](Self::register). Unknown handles are ignored.
    pub fn unregister(&self, entity: &EntityRef) {
        let mut idx = self.indices.borrow_mut();
        if !idx.is_live(entity) {
            return;
        }
        idx.by_id.remove(&entity.id());
        Self::unindex_secondary(&mut idx, entity);
        debug!(entity = %entity.id(), "unregistered");
    }

    /// Everything except the id entry.
    fn unindex_secondary(idx: &mut Indices, entity: &EntityRef) {
        if let Some(name) = entity.name() {
            if idx.by_name.get(name).is_some_and(|e| Entity::same(e, entity)) {
                idx.by_name.remove(name);
            }
        }
        remove_from_bucket(&mut idx.by_position, &entity.position(), entity);
        if let Some(layer) = entity.layer() {
            remove_from_bucket(&mut idx.by_layer, &layer.to_owned(), entity);
        }
    }

    /// Move `entity` to `to`, re-bucketing it before returning. Returns the
    /// position it left.
    ///
    /// This is the only way to change an entity's position. A relocated
    /// entity goes to the back of its new bucket. Entities that are not
    /// registered just have their position updated.
    pub fn relocate(&self, entity: &EntityRef, to: Position) -> Position {
        let from = entity.position();
        if from == to {
            return from;
        }
        let mut idx = self.indices.borrow_mut();
        if idx.is_live(entity) {
            remove_from_bucket(&mut idx.by_position, &from, entity);
            entity.set_position(to);
            idx.by_position
                .entry(to)
                .or_default()
                .push(Rc::clone(entity));
        } else {
            entity.set_position(to);
        }
        debug!(entity = %entity.id(), %from, %to, "relocated");
        from
    }

    pub fn find_by_id(&self, id: EntityId) -> Option<EntityRef> {
        self.indices.borrow().by_id.get(&id).cloned()
    }

    pub fn find_by_name(&self, name: &str) -> Option<EntityRef> {
        self.indices.borrow().by_name.get(name).cloned()
    }

    /// Enabled entities standing at `(x, y)`, in registration order.
    pub fn find_by_position(&self, x: i32, y: i32) -> Vec<EntityRef> {
        enabled(self.indices.borrow().by_position.get(&Position::new(x, y)))
    }

    /// Enabled entities tagged with `layer`, in registration order.
    pub fn find_by_layer(&self, layer: &str) -> Vec<EntityRef> {
        enabled(self.indices.borrow().by_layer.get(layer))
    }

    /// Whether this exact handle is registered.
    pub fn contains(&self, entity: &EntityRef) -> bool {
        self.indices.borrow().is_live(entity)
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.indices.borrow().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.borrow().by_id.is_empty()
    }

    /// Drop every entry from all four indices at once.
    pub fn reset_all(&self) {
        let mut idx = self.indices.borrow_mut();
        let count = idx.by_id.len();
        *idx = Indices::default();
        debug!(count, "registry reset");
    }

    /// A non-owning handle, for use inside event handlers.
    pub fn downgrade(&self) -> WeakRegistry {
        WeakRegistry {
            indices: Rc::downgrade(&self.indices),
        }
    }
}

impl fmt::Debug for EntityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let idx = self.indices.borrow();
        f.debug_struct("EntityRegistry")
            .field("entities", &idx.by_id.len())
            .field("names", &idx.by_name.len())
            .field("cells", &idx.by_position.len())
            .field("layers", &idx.by_layer.len())
            .finish()
    }
}

/// Weak counterpart of [`EntityRegistry`].
#[derive(Clone, Default)]
pub struct WeakRegistry {
    indices: Weak<RefCell<Indices>>,
}

impl WeakRegistry {
    pub fn upgrade(&self) -> Option<EntityRegistry> {
        self.indices.upgrade().map(|indices| EntityRegistry { indices })
    }
}

impl fmt::Debug for WeakRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakRegistry")
            .field("alive", &(self.indices.strong_count() > 0))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
