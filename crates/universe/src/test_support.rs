use multiworld_kernel::{World, WorldConfig, WorldType};
use multiworld_persist::WorldStore;
use std::path::Path;
use std::sync::Arc;

use crate::context::WorldState;
use crate::handle::WorldHandle;
use crate::registry::Registry;

/// A fresh world stored at `root/<dir>`.
pub(crate) fn world_state(root: &Path, dir: &str, kind: WorldType) -> WorldState {
    world_state_with(root, dir, WorldConfig::new(kind, 7))
}

pub(crate) fn world_state_with(root: &Path, dir: &str, config: WorldConfig) -> WorldState {
    let store = WorldStore::create(root.join(dir), &config).unwrap();
    WorldState::new(World::new(config), store)
}

/// Start and register a fresh world named `name`, stored at `root/<name>`.
pub(crate) fn start_world(
    registry: &Registry,
    root: &Path,
    name: &str,
    kind: WorldType,
) -> Arc<WorldHandle> {
    let world = WorldHandle::start(name, world_state(root, name, kind), None).unwrap();
    registry.register(Arc::clone(&world)).unwrap();
    world
}
