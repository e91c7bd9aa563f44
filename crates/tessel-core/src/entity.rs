//! Entity identifiers, grid positions, and the shared entity handle.
//!
//! An [`EntityId`] is a 64-bit opaque handle handed out by an
//! [`EntityIdAllocator`]. Ids are never reused for the lifetime of the
//! allocator, so a stale id simply stops resolving once its entity is gone.
//!
//! An [`Entity`] is shared as an [`EntityRef`] (`Rc<Entity>`). Two handles are
//! the same entity only when they point at the same allocation; see
//! [`Entity::same`].

use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::component::ComponentTable;
use crate::event::EventBus;

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// An opaque entity identifier.
///
/// The value `0` is reserved for [`EntityId::INVALID`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// The null / invalid entity sentinel.
    pub const INVALID: EntityId = EntityId(0);

    /// Raw `u64` representation.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }

    /// Reconstruct from a raw `u64`.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns `true` unless this is [`EntityId::INVALID`].
    #[inline]
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// EntityIdAllocator
// ---------------------------------------------------------------------------

/// Allocates monotonically increasing [`EntityId`]s, starting at 1.
#[derive(Debug)]
pub struct EntityIdAllocator {
    next: u64,
}

impl EntityIdAllocator {
    /// Create a new allocator.
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Allocate a fresh, never-before-seen [`EntityId`].
    pub fn allocate(&mut self) -> EntityId {
        let id = EntityId(self.next);
        self.next += 1;
        id
    }

    /// Number of ids handed out so far.
    pub fn allocated(&self) -> u64 {
        self.next - 1
    }
}

impl Default for EntityIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// An integer grid cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl Position {
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<(i32, i32)> for Position {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// Shared handle to a live entity.
pub type EntityRef = Rc<Entity>;

type TeardownFn = Box<dyn FnOnce(&Entity)>;

/// An addressable world object.
///
/// Identity, name and layer are fixed at construction. The grid position can
/// only be changed through [`EntityRegistry::relocate`](crate::registry::EntityRegistry::relocate)
/// so that the position index never goes stale.
pub struct Entity {
    id: EntityId,
    name: Option<String>,
    layer: Option<String>,
    position: Cell<Position>,
    disabled: Cell<bool>,
    components: ComponentTable,
    events: EventBus,
    teardown: RefCell<Vec<TeardownFn>>,
}

impl Entity {
    /// Create an unnamed, unlayered, enabled entity at `position`.
    pub fn new(id: EntityId, position: Position) -> Self {
        Self {
            id,
            name: None,
            layer: None,
            position: Cell::new(position),
            disabled: Cell::new(false),
            components: ComponentTable::new(id),
            events: EventBus::new(),
            teardown: RefCell::new(Vec::new()),
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the layer tag.
    pub fn with_layer(mut self, layer: impl Into<String>) -> Self {
        self.layer = Some(layer.into());
        self
    }

    /// Start out disabled.
    pub fn with_disabled(self, disabled: bool) -> Self {
        self.disabled.set(disabled);
        self
    }

    /// Wrap into a shared [`EntityRef`].
    pub fn into_ref(self) -> EntityRef {
        Rc::new(self)
    }

    #[inline]
    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn layer(&self) -> Option<&str> {
        self.layer.as_deref()
    }

    #[inline]
    pub fn position(&self) -> Position {
        self.position.get()
    }

    /// Only the registry moves entities.
    pub(crate) fn set_position(&self, position: Position) {
        self.position.set(position);
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.get()
    }

    /// Disabled entities are hidden from position and layer lookups.
    pub fn set_disabled(&self, disabled: bool) {
        self.disabled.set(disabled);
    }

    /// The entity's capability table.
    pub fn components(&self) -> &ComponentTable {
        &self.components
    }

    /// The entity's own event bus.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Queue a callback to run when the entity is torn down.
    pub fn on_teardown(&self, f: impl FnOnce(&Entity) + 'static) {
        self.teardown.borrow_mut().push(Box::new(f));
    }

    /// Run and discard every queued teardown callback, in the order they were
    /// queued. A second call runs nothing.
    ///
    /// Returns the number of callbacks run.
    pub fn run_teardown(&self) -> usize {
        let callbacks = std::mem::take(&mut *self.teardown.borrow_mut());
        let count = callbacks.len();
        for callback in callbacks {
            callback(self);
        }
        count
    }

    /// Handle identity: `true` if both point at the same entity allocation.
    #[inline]
    pub fn same(a: &EntityRef, b: &EntityRef) -> bool {
        Rc::ptr_eq(a, b)
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("layer", &self.layer)
            .field("position", &self.position.get())
            .field("disabled", &self.disabled.get())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
