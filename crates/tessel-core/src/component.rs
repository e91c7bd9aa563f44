//! Per-entity capability lookup.
//!
//! Every entity owns a [`ComponentTable`] mapping a capability *kind* (for
//! example `"Collider"` or `"Sprite"`) to the object implementing it. Only one
//! object per kind is kept; registering a kind again replaces the previous
//! object.
//!
//! Lookups are typed: [`ComponentTable::get`] downcasts the stored object to
//! the requested Rust type. Asking for a kind that was never registered is a
//! configuration error and yields [`CoreError::ComponentNotFound`].

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::entity::EntityId;
use crate::CoreError;

// ---------------------------------------------------------------------------
// Capability
// ---------------------------------------------------------------------------

/// A component type with a fixed kind name.
pub trait Capability: Any {
    /// The kind this capability is registered under.
    const KIND: &'static str;
}

// ---------------------------------------------------------------------------
// ComponentTable
// ---------------------------------------------------------------------------

/// Kind -> capability object, for a single entity.
pub struct ComponentTable {
    owner: EntityId,
    entries: RefCell<HashMap<String, Rc<dyn Any>>>,
}

impl ComponentTable {
    /// Create an empty table for the entity `owner`.
    pub fn new(owner: EntityId) -> Self {
        Self {
            owner,
            entries: RefCell::new(HashMap::new()),
        }
    }

    /// Store `capability` under `kind`, replacing any previous object.
    pub fn register(&self, kind: &str, capability: Rc<dyn Any>) {
        let replaced = self
            .entries
            .borrow_mut()
            .insert(kind.to_owned(), capability)
            .is_some();
        if replaced {
            debug!(entity = %self.owner, kind, "component replaced");
        }
    }

    /// Store a typed capability under its [`Capability::KIND`].
    pub fn insert<C: Capability>(&self, capability: Rc<C>) {
        self.register(C::KIND, capability);
    }

    /// Fetch the object registered under `kind` as a `C`.
    pub fn get<C: Any>(&self, kind: &str) -> Result<Rc<C>, CoreError> {
        let stored = self
            .entries
            .borrow()
            .get(kind)
            .cloned()
            .ok_or_else(|| CoreError::ComponentNotFound {
                kind: kind.to_owned(),
                entity: self.owner,
            })?;
        stored
            .downcast::<C>()
            .map_err(|_| CoreError::ComponentTypeMismatch {
                kind: kind.to_owned(),
                entity: self.owner,
            })
    }

    /// Typed shortcut for [`get`](Self::get) using [`Capability::KIND`].
    pub fn capability<C: Capability>(&self) -> Result<Rc<C>, CoreError> {
        self.get::<C>(C::KIND)
    }

    /// Like [`capability`](Self::capability), but `None` when the entity does
    /// not carry it. For callers that deliberately tolerate absence.
    pub fn find<C: Capability>(&self) -> Option<Rc<C>> {
        let stored = self.entries.borrow().get(C::KIND).cloned()?;
        stored.downcast::<C>().ok()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.entries.borrow().contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.entries.borrow().keys().cloned().collect();
        kinds.sort();
        kinds
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl fmt::Debug for ComponentTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentTable")
            .field("owner", &self.owner)
            .field("kinds", &self.kinds())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug)]
    struct Sprite {
        state: RefCell<String>,
    }

    impl Capability for Sprite {
        const KIND: &'static str = "Sprite";
    }

    #[derive(Debug)]
    struct Counter(Cell<u32>);

    impl Capability for Counter {
        const KIND: &'static str = "Counter";
    }

    fn table() -> ComponentTable {
        ComponentTable::new(EntityId::from_raw(3))
    }

    #[test]
    fn register_and_get() {
        let t = table();
        t.insert(Rc::new(Sprite {
            state: RefCell::new("idle".to_owned()),
        }));
        let sprite = t.capability::<Sprite>().unwrap();
        *sprite.state.borrow_mut() = "walk".to_owned();
        assert_eq!(*t.capability::<Sprite>().unwrap().state.borrow(), "walk");
        assert!(t.contains("Sprite"));
    }

    #[test]
    fn reregistering_a_kind_overwrites() {
        let t = table();
        t.insert(Rc::new(Counter(Cell::new(1))));
        t.insert(Rc::new(Counter(Cell::new(2))));
        assert_eq!(t.len(), 1);
        assert_eq!(t.capability::<Counter>().unwrap().0.get(), 2);
    }

    #[test]
    fn missing_kind_is_component_not_found() {
        let t = table();
        let err = t.capability::<Sprite>().unwrap_err();
        match err {
            CoreError::ComponentNotFound { kind, entity } => {
                assert_eq!(kind, "Sprite");
                assert_eq!(entity, EntityId::from_raw(3));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(t.find::<Sprite>().is_none());
    }

    #[test]
    fn wrong_type_is_mismatch() {
        let t = table();
        t.register("Sprite", Rc::new(Counter(Cell::new(0))));
        assert!(matches!(
            t.get::<Sprite>("Sprite"),
            Err(CoreError::ComponentTypeMismatch { .. })
        ));
    }

    #[test]
    fn kinds_are_sorted() {
        let t = table();
        t.insert(Rc::new(Counter(Cell::new(0))));
        t.insert(Rc::new(Sprite {
            state: RefCell::new(String::new()),
        }));
        assert_eq!(t.kinds(), vec!["Counter".to_owned(), "Sprite".to_owned()]);
    }
}
