//! Tessel Core -- entity registry, event buses and capability tables for
//! tile-based worlds.
//!
//! This crate provides the data structures the Tessel engine is built on:
//!
//! - [`EntityRegistry`](registry::EntityRegistry): four consistent indices
//!   (id, name, grid cell, layer) over live entities.
//! - [`EventBus`](event::EventBus): synchronous publish/subscribe, one global
//!   instance plus one per entity.
//! - [`ComponentTable`](component::ComponentTable): per-entity lookup from a
//!   capability kind to its implementation.
//!
//! Everything is single-threaded and synchronous. Shared state lives behind
//! `Rc`/`RefCell`, and no borrow is held while user code runs.
//!
//! # Quick Start
//!
//! ```
//! use tessel_core::prelude::*;
//!
//! let registry = EntityRegistry::new();
//! let mut ids = EntityIdAllocator::new();
//!
//! let plant = Entity::new(ids.allocate(), Position::new(2, 1))
//!     .with_name("plant")
//!     .with_layer("obstacle")
//!     .into_ref();
//! registry.register(&plant);
//!
//! assert_eq!(registry.find_by_position(2, 1).len(), 1);
//! assert!(registry.find_by_name("plant").is_some());
//!
//! registry.relocate(&plant, Position::new(3, 1));
//! assert!(registry.find_by_position(2, 1).is_empty());
//! ```

#![deny(unsafe_code)]

pub mod component;
pub mod entity;
pub mod event;
pub mod registry;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by core operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A capability kind was requested that the entity never registered.
    #[error("component '{kind}' not registered on entity {entity}")]
    ComponentNotFound {
        kind: String,
        entity: entity::EntityId,
    },

    /// The capability exists but is not of the requested Rust type.
    #[error("component '{kind}' on entity {entity} has an unexpected type")]
    ComponentTypeMismatch {
        kind: String,
        entity: entity::EntityId,
    },

    /// An event handler failed; the rest of that dispatch was abandoned.
    #[error("handler for event '{event}' failed")]
    Handler {
        event: String,
        #[source]
        source: anyhow::Error,
    },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::component::{Capability, ComponentTable};
    pub use crate::entity::{Entity, EntityId, EntityIdAllocator, EntityRef, Position};
    pub use crate::event::{BusyToken, EventBus, HandlerResult, Payload, Publish, Reply, Subscription};
    pub use crate::registry::{EntityRegistry, WeakRegistry};
    pub use crate::CoreError;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------
