//! The [`World`] is the top-level container for a running scene. It owns the
//! global event bus, the entity registry, the frame clock, and the lifecycle
//! of every entity it spawns.
//!
//! # Lifecycle
//!
//! [`World::spawn`] allocates an id, builds the entity with its capabilities,
//! registers it, and attaches a [`CollisionCoordinator`] when it has a
//! [`Collider`]. [`World::despawn`] runs the entity's teardown callbacks
//! (exactly once), detaches the coordinator and unregisters it.
//!
//! # Scene exit
//!
//! The registry listens for [`SCENE_EXIT`] on the global bus and clears all
//! of its indices when it sees one, whoever publishes it.
//! [`World::exit_scene`] additionally tears down every entity the world
//! spawned before publishing.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use tessel_core::prelude::*;

use crate::collider::{Collider, Interactable};
use crate::collision::CollisionCoordinator;
use crate::config::WorldConfig;
use crate::delay::DelayQueue;
use crate::events::{CANNOT_MOVE, POSITION_CHANGED, SCENE_EXIT};
use crate::EngineError;

// ---------------------------------------------------------------------------
// EntityBuilder
// ---------------------------------------------------------------------------

/// Description of an entity to spawn.
///
/// ```
/// use tessel_engine::prelude::*;
///
/// let mut world = World::new(WorldConfig::default()).unwrap();
/// let plant = world.spawn(
///     EntityBuilder::at(2, 1)
///         .name("plant")
///         .layer("obstacle")
///         .collider(false),
/// );
/// assert!(world.registry().find_by_name("plant").is_some());
/// assert!(!plant.components().capability::<Collider>().unwrap().walkable());
/// ```
#[must_use]
pub struct EntityBuilder {
    position: Position,
    name: Option<String>,
    layer: Option<String>,
    disabled: bool,
    /// `Some(is_trigger)` when the entity gets a collider.
    collider: Option<bool>,
    interactable: bool,
    capabilities: Vec<(String, Rc<dyn Any>)>,
}

impl EntityBuilder {
    pub fn at(x: i32, y: i32) -> Self {
        Self {
            position: Position::new(x, y),
            name: None,
            layer: None,
            disabled: false,
            collider: None,
            interactable: false,
            capabilities: Vec::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn layer(mut self, layer: impl Into<String>) -> Self {
        self.layer = Some(layer.into());
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Give the entity a [`Collider`]. Trigger colliders start walkable.
    pub fn collider(mut self, is_trigger: bool) -> Self {
        self.collider = Some(is_trigger);
        self
    }

    /// Give the entity an [`Interactable`].
    pub fn interactable(mut self) -> Self {
        self.interactable = true;
        self
    }

    /// Attach an arbitrary capability under `kind`.
    pub fn capability(mut self, kind: impl Into<String>, capability: Rc<dyn Any>) -> Self {
        self.capabilities.push((kind.into(), capability));
        self
    }

    /// Attach a typed capability under its own kind.
    pub fn with<C: Capability>(self, capability: Rc<C>) -> Self {
        self.capability(C::KIND, capability)
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// An entity spawned by this world, plus the machinery attached to it.
struct Managed {
    entity: EntityRef,
    coordinator: Option<CollisionCoordinator>,
}

impl Managed {
    fn tear_down(&self, registry: &EntityRegistry) {
        let callbacks = self.entity.run_teardown();
        if let Some(coordinator) = &self.coordinator {
            coordinator.detach();
        }
        registry.unregister(&self.entity);
        debug!(entity = %self.entity.id(), callbacks, "entity torn down");
    }
}

/// A running scene.
pub struct World {
    config: WorldConfig,
    events: EventBus,
    registry: EntityRegistry,
    delays: DelayQueue,
    ids: EntityIdAllocator,
    /// Spawned entities, in spawn order.
    managed: BTreeMap<EntityId, Managed>,
    paused: bool,
    map_size: [u32; 2],
    game_state: HashMap<String, serde_json::Value>,
    scene_exit: Subscription,
}

impl World {
    /// Create an empty world. Fails if `config` does not validate.
    pub fn new(config: WorldConfig) -> Result<Self, EngineError> {
        config.validate()?;

        let events = EventBus::new();
        let registry = EntityRegistry::new();
        let scene_exit = {
            let registry = registry.downgrade();
            events.subscribe(SCENE_EXIT, move |_| {
                if let Some(registry) = registry.upgrade() {
                    registry.reset_all();
                }
                Ok(Reply::Done)
            })
        };

        info!(
            movement_ms = config.movement_duration_ms,
            zoom = config.camera_zoom,
            "world created"
        );
        Ok(Self {
            paused: config.start_paused,
            map_size: config.map_size,
            config,
            events,
            registry,
            delays: DelayQueue::new(),
            ids: EntityIdAllocator::new(),
            managed: BTreeMap::new(),
            game_state: HashMap::new(),
            scene_exit,
        })
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// The world-wide event bus.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// The frame clock. Clone it into handlers that need [`DelayQueue::schedule`].
    pub fn delays(&self) -> &DelayQueue {
        &self.delays
    }

    // -- Entity lifecycle ---------------------------------------------------

    /// Build, register and wire up a new entity.
    pub fn spawn(&mut self, builder: EntityBuilder) -> EntityRef {
        let id = self.ids.allocate();
        let mut entity = Entity::new(id, builder.position).with_disabled(builder.disabled);
        if let Some(name) = builder.name {
            entity = entity.with_name(name);
        }
        if let Some(layer) = builder.layer {
            entity = entity.with_layer(layer);
        }
        let entity = entity.into_ref();

        if let Some(is_trigger) = builder.collider {
            entity
                .components()
                .insert(Rc::new(Collider::new(entity.events().clone(), is_trigger)));
        }
        if builder.interactable {
            entity
                .components()
                .insert(Rc::new(Interactable::new(entity.events().clone())));
        }
        for (kind, capability) in builder.capabilities {
            entity.components().register(&kind, capability);
        }

        self.registry.register(&entity);
        let coordinator = entity
            .components()
            .contains(Collider::KIND)
            .then(|| CollisionCoordinator::attach(&entity, &self.registry));

        debug!(entity = %id, name = ?entity.name(), position = %entity.position(), "spawned");
        self.managed.insert(
            id,
            Managed {
                entity: Rc::clone(&entity),
                coordinator,
            },
        );
        entity
    }

    /// Give an already spawned entity a collider, attaching a coordinator if
    /// it has none yet. Replaces any existing collider.
    pub fn attach_collider(&mut self, entity: &EntityRef, is_trigger: bool) -> Result<Rc<Collider>, EngineError> {
        let managed = self
            .managed
            .get_mut(&entity.id())
            .filter(|m| Entity::same(&m.entity, entity))
            .ok_or(EngineError::UnknownEntity(entity.id()))?;

        let collider = Rc::new(Collider::new(entity.events().clone(), is_trigger));
        entity.components().insert(Rc::clone(&collider));
        if managed.coordinator.is_none() {
            managed.coordinator = Some(CollisionCoordinator::attach(entity, &self.registry));
        }
        Ok(collider)
    }

    /// Tear down and unregister an entity spawned by this world. Returns
    /// `false` (and does nothing) for anything else.
    pub fn despawn(&mut self, entity: &EntityRef) -> bool {
        match self.managed.get(&entity.id()) {
            Some(m) if Entity::same(&m.entity, entity) => {}
            _ => return false,
        }
        if let Some(managed) = self.managed.remove(&entity.id()) {
            managed.tear_down(&self.registry);
        }
        true
    }

    /// Number of entities this world spawned and has not despawned.
    pub fn entity_count(&self) -> usize {
        self.managed.len()
    }

    /// Tear down every spawned entity (in spawn order), then publish
    /// [`SCENE_EXIT`] on the global bus, which clears the registry.
    pub fn exit_scene(&mut self) -> Result<Publish, EngineError> {
        let managed = std::mem::take(&mut self.managed);
        let count = managed.len();
        for m in managed.values() {
            m.tear_down(&self.registry);
        }
        let outcome = self.events.publish(SCENE_EXIT, Payload::Empty)?;
        info!(entities = count, "scene exited");
        Ok(outcome)
    }

    // -- Movement outcomes --------------------------------------------------

    /// Report that `entity` tried to enter `to` and was refused.
    pub fn report_blocked(&self, entity: &EntityRef, to: Position) -> Result<Publish, EngineError> {
        Ok(entity.events().publish(CANNOT_MOVE, Payload::Position(to))?)
    }

    /// Record a successful move: re-index `entity` at `to`, then publish
    /// [`POSITION_CHANGED`] on its bus.
    pub fn commit_move(&self, entity: &EntityRef, to: Position) -> Result<Publish, EngineError> {
        if !self.registry.contains(entity) {
            warn!(entity = %entity.id(), "moving an entity that is not registered");
        }
        self.registry.relocate(entity, to);
        Ok(entity.events().publish(POSITION_CHANGED, Payload::Position(to))?)
    }

    // -- Frame clock --------------------------------------------------------

    /// A busy token that settles after `after` of unpaused frame time.
    pub fn delay(&self, after: Duration) -> BusyToken {
        self.delays.schedule(after)
    }

    /// Advance the frame clock. Does nothing while paused.
    pub fn advance(&self, dt: Duration) -> usize {
        if self.paused {
            return 0;
        }
        self.delays.advance(dt)
    }

    pub fn paused(&self) -> bool {
        self.paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn map_size(&self) -> [u32; 2] {
        self.map_size
    }

    pub fn set_map_size(&mut self, map_size: [u32; 2]) {
        self.map_size = map_size;
    }

    // -- Game state ---------------------------------------------------------

    /// Store a value that outlives scenes.
    pub fn set_game_state(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.game_state.insert(key.into(), value);
    }

    pub fn game_state(&self, key: &str) -> Option<&serde_json::Value> {
        self.game_state.get(key)
    }

    /// Read a stored value back as `T`.
    pub fn game_state_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, EngineError> {
        self.game_state
            .get(key)
            .map(|value| {
                serde_json::from_value(value.clone()).map_err(|source| EngineError::GameState {
                    key: key.to_owned(),
                    source,
                })
            })
            .transpose()
    }
}

impl Drop for World {
    fn drop(&mut self) {
        self.scene_exit.cancel();
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("config", &self.config)
            .field("entities", &self.managed.len())
            .field("registry", &self.registry)
            .field("paused", &self.paused)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
