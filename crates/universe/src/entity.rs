use multiworld_common::EntityId;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::handle::WorldHandle;

/// Shared handle to one live entity and the world it is bound to.
///
/// Clones share the binding. The binding only changes on a world thread: it
/// moves from source to target when a relocation attaches, and is cleared
/// if the entity is lost in transit.
#[derive(Clone)]
pub struct EntityRef {
    id: EntityId,
    binding: Arc<Mutex<Option<Arc<WorldHandle>>>>,
}

impl EntityRef {
    pub(crate) fn bound(id: EntityId, world: Arc<WorldHandle>) -> Self {
        Self {
            id,
            binding: Arc::new(Mutex::new(Some(world))),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    /// The world this entity lives in, unless it is unbound or that world is
    /// shutting down.
    pub fn world(&self) -> Option<Arc<WorldHandle>> {
        self.binding
            .lock()
            .as_ref()
            .filter(|world| !world.is_closing())
            .cloned()
    }

    pub fn world_name(&self) -> Option<String> {
        self.world().map(|world| world.name().to_string())
    }

    pub fn is_bound(&self) -> bool {
        self.world().is_some()
    }

    pub(crate) fn rebind(&self, world: Option<Arc<WorldHandle>>) {
        *self.binding.lock() = world;
    }
}

impl std::fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityRef")
            .field("id", &self.id)
            .field("world", &self.world_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::world_state;
    use multiworld_common::Transform;
    use multiworld_kernel::{EntityData, WorldType};

    #[test]
    fn clones_share_binding() {
        let tmp = tempfile::tempdir().unwrap();
        let world =
            WorldHandle::start("a", world_state(tmp.path(), "a", WorldType::Void), None).unwrap();
        let entity = world
            .spawn_entity(EntityData::object(Transform::default()))
            .wait()
            .unwrap();
        let copy = entity.clone();
        assert_eq!(copy.world_name().as_deref(), Some("a"));

        entity.rebind(None);
        assert!(!copy.is_bound());
        assert_eq!(copy.id(), entity.id());

        world.close();
        world.join();
    }

    #[test]
    fn closing_world_unbinds() {
        let tmp = tempfile::tempdir().unwrap();
        let world =
            WorldHandle::start("a", world_state(tmp.path(), "a", WorldType::Void), None).unwrap();
        let entity = world
            .spawn_entity(EntityData::object(Transform::default()))
            .wait()
            .unwrap();
        world.close();
        assert!(entity.world().is_none());
        world.join();
    }
}
