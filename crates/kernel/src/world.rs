use multiworld_common::{EntityId, Transform, WorldId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::WorldConfig;
use crate::terrain::{Terrain, splitmix64};

/// Errors from entity store mutations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    #[error("entity {0} is already present in this world")]
    EntityExists(EntityId),
}

/// What kind of live entity this is. Players count toward occupancy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    Player { name: String },
    Object,
}

/// Per-entity data stored in the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityData {
    pub kind: EntityKind,
    pub transform: Transform,
}

impl EntityData {
    pub fn player(name: impl Into<String>, transform: Transform) -> Self {
        Self {
            kind: EntityKind::Player { name: name.into() },
            transform,
        }
    }

    pub fn object(transform: Transform) -> Self {
        Self {
            kind: EntityKind::Object,
            transform,
        }
    }

    pub fn is_player(&self) -> bool {
        matches!(self.kind, EntityKind::Player { .. })
    }
}

/// The authoritative state of one world.
///
/// Owned by the world's own thread; every mutation happens there. Entities
/// live in a BTreeMap for deterministic iteration order.
#[derive(Debug, Clone)]
pub struct World {
    config: WorldConfig,
    terrain: Terrain,
    entities: BTreeMap<EntityId, EntityData>,
    tick: u64,
    /// Advanced each step for reproducibility.
    seed: u64,
}

impl World {
    /// An empty world at tick 0, with terrain chosen by the config's world type.
    pub fn new(config: WorldConfig) -> Self {
        let terrain = Terrain::new(config.world_type.generator(config.seed));
        let seed = config.seed;
        Self {
            config,
            terrain,
            entities: BTreeMap::new(),
            tick: 0,
            seed,
        }
    }

    /// Reassemble a world from persisted parts.
    pub fn from_parts(
        config: WorldConfig,
        terrain: Terrain,
        entities: BTreeMap<EntityId, EntityData>,
        tick: u64,
        seed: u64,
    ) -> Self {
        Self {
            config,
            terrain,
            entities,
            tick,
            seed,
        }
    }

    /// Identity token from the config record.
    pub fn id(&self) -> WorldId {
        self.config.id
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut WorldConfig {
        &mut self.config
    }

    pub fn terrain(&self) -> &Terrain {
        &self.terrain
    }

    pub fn terrain_mut(&mut self) -> &mut Terrain {
        &mut self.terrain
    }

    /// Current simulation tick.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Current RNG seed.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of entities in the world.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Number of player entities.
    pub fn player_count(&self) -> usize {
        self.entities.values().filter(|e| e.is_player()).count()
    }

    /// Read-only access to all entities (BTreeMap for deterministic iteration).
    pub fn entities(&self) -> &BTreeMap<EntityId, EntityData> {
        &self.entities
    }

    /// Spawn a new entity. Returns its id.
    pub fn spawn(&mut self, data: EntityData) -> EntityId {
        let id = EntityId::new();
        self.entities.insert(id, data);
        id
    }

    /// Insert an entity that arrives from another world under its existing id.
    pub fn attach(&mut self, id: EntityId, data: EntityData) -> Result<(), WorldError> {
        if self.entities.contains_key(&id) {
            return Err(WorldError::EntityExists(id));
        }
        self.entities.insert(id, data);
        Ok(())
    }

    /// Remove an entity. Returns the data if it existed.
    pub fn detach(&mut self, id: EntityId) -> Option<EntityData> {
        self.entities.remove(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Get a reference to entity data.
    pub fn get(&self, id: EntityId) -> Option<&EntityData> {
        self.entities.get(&id)
    }

    /// Advance the simulation by one tick.
    pub fn step(&mut self) {
        self.tick += 1;
        self.seed = splitmix64(self.seed);
    }
}
