//! Well-known event names.
//!
//! Movement outcomes arrive on the moving entity's bus; collision outcomes
//! are re-published on the bus of the entity being notified; scene exit is
//! published on the world's global bus.

/// A move into the payload cell was refused. Payload: [`Payload::Position`](tessel_core::event::Payload::Position).
pub const CANNOT_MOVE: &str = "cannot-move";

/// The entity now stands at the payload cell and the registry already
/// reflects it. Payload: [`Payload::Position`](tessel_core::event::Payload::Position).
pub const POSITION_CHANGED: &str = "position-changed";

/// The current scene is being left. Published on the global bus.
pub const SCENE_EXIT: &str = "scene-exit";

/// Another entity failed to move into this entity's cell.
pub const COLLISION: &str = "collision";

/// Another entity entered this entity's cell.
pub const TRIGGER: &str = "trigger";

/// Another entity left this entity's cell.
pub const TRIGGER_EXIT: &str = "trigger-exit";

/// Another entity interacted with this one.
pub const INTERACTION: &str = "interaction";
