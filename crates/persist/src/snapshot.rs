use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use multiworld_common::EntityId;
use multiworld_kernel::{EntityData, Terrain, World, WorldConfig};

/// The entity set of a world at a specific tick.
///
/// The hash is computed from the captured state, enabling corruption
/// detection on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// The tick at which this snapshot was taken.
    pub tick: u64,
    /// The seed at snapshot time (for deterministic continuation).
    pub seed: u64,
    pub entities: BTreeMap<EntityId, EntityData>,
    /// FNV-1a over the captured state.
    pub hash: u64,
}

impl EntitySnapshot {
    /// Capture the entity set of the given world.
    pub fn capture(world: &World) -> Self {
        let entities = world.entities().clone();
        let tick = world.tick();
        let seed = world.seed();
        let hash = fnv1a_hash(&format!("{tick}{seed}{entities:?}"));

        Self {
            tick,
            seed,
            entities,
            hash,
        }
    }

    /// Verify the snapshot integrity by recomputing the hash.
    pub fn verify(&self) -> bool {
        let expected = fnv1a_hash(&format!("{}{}{:?}", self.tick, self.seed, self.entities));
        self.hash == expected
    }

    /// Rebuild a world around this entity set.
    pub fn into_world(self, config: WorldConfig, terrain: Terrain) -> World {
        World::from_parts(config, terrain, self.entities, self.tick, self.seed)
    }
}

fn fnv1a_hash(data: &str) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in data.bytes() {
        h ^= b as u64;
        h = h.wrapping_mul(0x0100_0000_01b3);
    }
    h
}
