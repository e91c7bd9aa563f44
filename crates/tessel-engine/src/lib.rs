//! Tessel Engine -- scene runtime with grid collision notifications.
//!
//! This crate builds on [`tessel_core`] to provide the pieces a tile-based
//! game runs on: a [`World`](world::World) that owns the global bus and the
//! entity registry, built-in [`Collider`](collider::Collider) and
//! [`Interactable`](collider::Interactable) capabilities, and the
//! [`CollisionCoordinator`](collision::CollisionCoordinator) that turns
//! movement outcomes into "collision", "trigger" and "trigger-exit" events.
//!
//! Deciding whether a move is legal belongs to the game's movement system.
//! It reports outcomes through [`World::report_blocked`](world::World::report_blocked)
//! and [`World::commit_move`](world::World::commit_move).
//!
//! # Quick Start
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use tessel_engine::prelude::*;
//!
//! let mut world = World::new(WorldConfig::default()).unwrap();
//! let pad = world.spawn(EntityBuilder::at(1, 0).collider(true));
//! let player = world.spawn(EntityBuilder::at(0, 0).name("player").collider(false));
//!
//! let stepped_on = Rc::new(Cell::new(false));
//! let flag = Rc::clone(&stepped_on);
//! pad.events().subscribe(TRIGGER, move |_| {
//!     flag.set(true);
//!     Ok(Reply::Done)
//! });
//!
//! world.commit_move(&player, Position::new(1, 0)).unwrap();
//! assert!(stepped_on.get());
//! ```

#![deny(unsafe_code)]

pub mod collider;
pub mod collision;
pub mod config;
pub mod delay;
pub mod events;
pub mod telemetry;
pub mod world;

/// Re-export the core crate for convenience.
pub use tessel_core;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] tessel_core::CoreError),

    /// The world configuration failed validation.
    #[error("invalid world config: {0}")]
    InvalidConfig(String),

    /// The world configuration document could not be parsed.
    #[error("failed to parse world config: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// A stored game-state value does not deserialize into the requested type.
    #[error("game state '{key}' has an unexpected shape: {source}")]
    GameState {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The entity was not spawned by this world (or was already despawned).
    #[error("entity {0} is not managed by this world")]
    UnknownEntity(tessel_core::entity::EntityId),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    pub use tessel_core::prelude::*;

    pub use crate::collider::{Collider, Interactable};
    pub use crate::collision::{notify_blocked, notify_moved, CollisionCoordinator};
    pub use crate::config::WorldConfig;
    pub use crate::delay::DelayQueue;
    pub use crate::events::*;
    pub use crate::world::{EntityBuilder, World};
    pub use crate::EngineError;
}
