//! Moving one entity from the world it lives in to another world.
//!
//! A relocation is a small state machine sent as a single message along
//! two hops: first to the source world's thread, which detaches the entity,
//! then to the target world's thread, which attaches it. Each hop runs in
//! FIFO order with that world's other work, so neither world is ever
//! touched from outside its own thread and neither loop waits on the other.

use glam::{Quat, Vec3};
use multiworld_common::Transform;
use multiworld_kernel::{EntityData, Terrain};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::context::WorldState;
use crate::entity::EntityRef;
use crate::handle::WorldHandle;
use crate::pending::{Completer, Pending, pending};
use crate::registry::Registry;

/// Height used for surface placement when the target column is not resident.
pub const FALLBACK_HEIGHT: f32 = 100.0;

/// Where an entity should land in the target world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Placement {
    /// One block above the terrain at column `(x, z)`.
    Surface { x: f32, z: f32 },
    /// Exactly this position.
    Exact(Vec3),
}

impl Default for Placement {
    fn default() -> Self {
        Self::Surface { x: 0.0, z: 0.0 }
    }
}

impl Placement {
    /// Final position in a world with the given terrain.
    pub fn resolve(&self, terrain: &Terrain) -> Vec3 {
        match *self {
            Self::Exact(position) => position,
            Self::Surface { x, z } => {
                // Floor, not truncation: x = -0.5 lies in column -1.
                let y = terrain
                    .surface_height(x.floor() as i32, z.floor() as i32)
                    .map_or(FALLBACK_HEIGHT, |h| f32::from(h) + 1.0);
                Vec3::new(x, y, z)
            }
        }
    }
}

/// Terminal result of a relocation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocationOutcome {
    Success,
    TargetNotFound,
    AlreadyInTarget,
    SourceEntityUnbound,
    InternalError,
}

impl RelocationOutcome {
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl Pending<RelocationOutcome> {
    /// Block for the outcome. A relocation that was dropped in flight, for
    /// example behind a world shutdown, counts as an internal error.
    pub fn outcome(self) -> RelocationOutcome {
        self.wait().unwrap_or(RelocationOutcome::InternalError)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Queued on the source world; the entity is still bound there.
    Detaching,
    /// Queued on the target world; the entity is held only by this message.
    Attaching,
}

/// A relocation in flight.
///
/// Dropping one before it resolves (a queue discarded behind a shutdown, or a
/// panic while advancing) completes it with `InternalError`. If the entity was
/// already detached it is unbound as well, so it never points at a world that
/// no longer holds it.
pub(crate) struct Relocation {
    entity: EntityRef,
    source: Arc<WorldHandle>,
    target: Arc<WorldHandle>,
    placement: Placement,
    stage: Stage,
    cargo: Option<EntityData>,
    done: Option<Completer<RelocationOutcome>>,
}

/// Move `entity` into the world named `target`.
///
/// Preconditions are checked on the calling thread; everything that touches
/// world state runs on the world threads. The returned slot resolves exactly
/// once.
pub fn relocate(
    registry: &Registry,
    entity: &EntityRef,
    target: &str,
    placement: Placement,
) -> Pending<RelocationOutcome> {
    let Some(target) = registry.lookup(target) else {
        return Pending::ready(RelocationOutcome::TargetNotFound);
    };
    let Some(source) = entity.world() else {
        return Pending::ready(RelocationOutcome::SourceEntityUnbound);
    };
    if source.matches(target.name()) {
        return Pending::ready(RelocationOutcome::AlreadyInTarget);
    }

    let (done, pending) = pending();
    let relocation = Relocation {
        entity: entity.clone(),
        source: Arc::clone(&source),
        target,
        placement,
        stage: Stage::Detaching,
        cargo: None,
        done: Some(done),
    };
    if let Err(mut relocation) = source.send_relocation(relocation) {
        // The source world closed after we resolved it.
        relocation.resolve(RelocationOutcome::SourceEntityUnbound);
    }
    pending
}

impl Relocation {
    /// Run the current stage on the thread that owns `state`.
    pub(crate) fn advance(mut self, state: &mut WorldState) {
        let id = self.entity.id();
        match self.stage {
            Stage::Detaching => {
                let Some(data) = state.world_mut().detach(id) else {
                    debug!(entity = %id, world = %self.source.name(), "entity left before detach");
                    self.resolve(RelocationOutcome::SourceEntityUnbound);
                    return;
                };
                debug!(
                    entity = %id,
                    from = %self.source.name(),
                    to = %self.target.name(),
                    "detached"
                );
                self.stage = Stage::Attaching;
                self.cargo = Some(data);
                let target = Arc::clone(&self.target);
                if let Err(relocation) = target.send_relocation(self) {
                    relocation.lose("target world closed during handoff");
                }
            }
            Stage::Attaching => {
                let Some(mut data) = self.cargo.take() else {
                    self.lose("nothing to attach");
                    return;
                };
                if self.target.is_closing() {
                    self.lose("target world is shutting down");
                    return;
                }
                let position = self.placement.resolve(state.world().terrain());
                data.transform = Transform {
                    position,
                    rotation: Quat::IDENTITY,
                    scale: data.transform.scale,
                };
                match state.world_mut().attach(id, data) {
                    Ok(()) => {
                        info!(
                            entity = %id,
                            from = %self.source.name(),
                            to = %self.target.name(),
                            x = position.x,
                            y = position.y,
                            z = position.z,
                            "relocated entity"
                        );
                        self.entity.rebind(Some(Arc::clone(&self.target)));
                        self.resolve(RelocationOutcome::Success);
                    }
                    Err(err) => self.lose(&err.to_string()),
                }
            }
        }
    }

    /// Complete the caller's slot. Later calls and the drop are no-ops.
    fn resolve(&mut self, outcome: RelocationOutcome) {
        if let Some(done) = self.done.take() {
            done.complete(outcome);
        }
    }

    /// Resolve after the entity was detached but could not be attached.
    fn lose(mut self, reason: &str) {
        warn!(entity = %self.entity.id(), reason, "relocation failed after detach");
        self.entity.rebind(None);
        self.resolve(RelocationOutcome::InternalError);
    }
}

impl Drop for Relocation {
    fn drop(&mut self) {
        if self.done.is_none() {
            return;
        }
        if self.stage == Stage::Attaching {
            warn!(
                entity = %self.entity.id(),
                to = %self.target.name(),
                "relocation dropped after detach"
            );
            self.entity.rebind(None);
        }
        self.resolve(RelocationOutcome::InternalError);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::start_world;
    use multiworld_kernel::{ChunkCoord, WorldType};

    struct Fixture {
        _tmp: tempfile::TempDir,
        registry: Registry,
        spawn: Arc<WorldHandle>,
        arena: Arc<WorldHandle>,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let registry = Registry::new();
            let spawn = start_world(&registry, tmp.path(), "spawn", WorldType::Flat);
            let arena = start_world(&registry, tmp.path(), "arena", WorldType::Normal);
            Self {
                _tmp: tmp,
                registry,
                spawn,
                arena,
            }
        }

        fn player(&self, world: &Arc<WorldHandle>) -> EntityRef {
            world
                .spawn_entity(EntityData::player("ada", Transform::default()))
                .wait()
                .unwrap()
        }

        fn holds(world: &WorldHandle, entity: &EntityRef) -> bool {
            let id = entity.id();
            world.call(move |s| s.world().contains(id)).wait().unwrap()
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            for world in self.registry.drain() {
                world.close();
                world.join();
            }
        }
    }

    #[test]
    fn surface_placement_lands_above_resident_terrain() {
        let mut terrain = Terrain::new(WorldType::Flat.generator(0));
        terrain.load_chunk(ChunkCoord::containing(5, 7));
        terrain.set_surface_height(5, 7, 64);
        let at = Placement::Surface { x: 5.5, z: 7.2 }.resolve(&terrain);
        assert_eq!(at, Vec3::new(5.5, 65.0, 7.2));
    }

    #[test]
    fn surface_placement_falls_back_when_not_resident() {
        let terrain = Terrain::new(WorldType::Flat.generator(0));
        let at = Placement::Surface { x: 5.0, z: 7.0 }.resolve(&terrain);
        assert_eq!(at.y, FALLBACK_HEIGHT);
    }

    #[test]
    fn negative_columns_use_floor() {
        let mut terrain = Terrain::new(WorldType::Void.generator(0));
        terrain.load_chunk(ChunkCoord::new(-1, -1));
        terrain.set_surface_height(-1, -1, 9);
        let at = Placement::Surface { x: -0.5, z: -0.5 }.resolve(&terrain);
        assert_eq!(at.y, 10.0);
    }

    #[test]
    fn exact_placement_is_kept() {
        let terrain = Terrain::new(WorldType::Dummy.generator(0));
        let p = Vec3::new(1.0, -4.0, 2.0);
        assert_eq!(Placement::Exact(p).resolve(&terrain), p);
        assert_eq!(Placement::default(), Placement::Surface { x: 0.0, z: 0.0 });
    }

    #[test]
    fn missing_target_leaves_entity_in_place() {
        let fx = Fixture::new();
        let entity = fx.player(&fx.spawn);
        let outcome = relocate(&fx.registry, &entity, "nowhere", Placement::default()).outcome();
        assert_eq!(outcome, RelocationOutcome::TargetNotFound);
        assert_eq!(entity.world_name().as_deref(), Some("spawn"));
        assert!(Fixture::holds(&fx.spawn, &entity));
    }

    #[test]
    fn same_world_is_a_noop() {
        let fx = Fixture::new();
        let entity = fx.player(&fx.spawn);
        let outcome = relocate(&fx.registry, &entity, "SPAWN", Placement::default()).outcome();
        assert_eq!(outcome, RelocationOutcome::AlreadyInTarget);
        assert_eq!(entity.world_name().as_deref(), Some("spawn"));
        assert!(Fixture::holds(&fx.spawn, &entity));
    }

    #[test]
    fn success_moves_binding_and_store() {
        let fx = Fixture::new();
        let entity = fx.player(&fx.spawn);
        let outcome = relocate(
            &fx.registry,
            &entity,
            "arena",
            Placement::Exact(Vec3::new(3.0, 70.0, -2.0)),
        )
        .outcome();
        assert_eq!(outcome, RelocationOutcome::Success);
        assert!(Arc::ptr_eq(&entity.world().unwrap(), &fx.arena));
        assert!(!Fixture::holds(&fx.spawn, &entity));
        assert!(Fixture::holds(&fx.arena, &entity));

        let id = entity.id();
        let position = fx
            .arena
            .call(move |s| s.world().get(id).map(|e| e.transform.position))
            .wait()
            .unwrap();
        assert_eq!(position, Some(Vec3::new(3.0, 70.0, -2.0)));
        assert_eq!(fx.arena.player_count(), 1);
        assert_eq!(fx.spawn.player_count(), 0);
    }

    #[test]
    fn surface_relocation_uses_target_terrain() {
        let fx = Fixture::new();
        let expected = fx
            .arena
            .call(|s| {
                let terrain = s.world_mut().terrain_mut();
                terrain.load_chunk(ChunkCoord::containing(5, 7));
                terrain.surface_height(5, 7)
            })
            .wait()
            .unwrap()
            .unwrap();
        let entity = fx.player(&fx.spawn);
        let outcome =
            relocate(&fx.registry, &entity, "arena", Placement::Surface { x: 5.0, z: 7.0 })
                .outcome();
        assert_eq!(outcome, RelocationOutcome::Success);

        let id = entity.id();
        let y = fx
            .arena
            .call(move |s| s.world().get(id).unwrap().transform.position.y)
            .wait()
            .unwrap();
        assert_eq!(y, f32::from(expected) + 1.0);
    }

    #[test]
    fn surface_relocation_to_unloaded_column_uses_fallback() {
        let fx = Fixture::new();
        let entity = fx.player(&fx.spawn);
        let outcome = relocate(
            &fx.registry,
            &entity,
            "arena",
            Placement::Surface { x: 5000.0, z: 7000.0 },
        )
        .outcome();
        assert_eq!(outcome, RelocationOutcome::Success);
        let id = entity.id();
        let y = fx
            .arena
            .call(move |s| s.world().get(id).unwrap().transform.position.y)
            .wait()
            .unwrap();
        assert_eq!(y, FALLBACK_HEIGHT);
    }

    #[test]
    fn entity_gone_before_detach_is_unbound() {
        let fx = Fixture::new();
        let entity = fx.player(&fx.spawn);
        let id = entity.id();
        // Queued ahead of the relocation on the same thread.
        fx.spawn
            .execute(move |s| {
                s.world_mut().detach(id);
            })
            .unwrap();
        let outcome = relocate(&fx.registry, &entity, "arena", Placement::default()).outcome();
        assert_eq!(outcome, RelocationOutcome::SourceEntityUnbound);
        assert!(!Fixture::holds(&fx.arena, &entity));
    }

    #[test]
    fn unbound_entity_is_rejected() {
        let fx = Fixture::new();
        let entity = fx.player(&fx.spawn);
        entity.rebind(None);
        let outcome = relocate(&fx.registry, &entity, "arena", Placement::default()).outcome();
        assert_eq!(outcome, RelocationOutcome::SourceEntityUnbound);
    }

    #[test]
    fn second_concurrent_relocation_finds_entity_gone() {
        let fx = Fixture::new();
        let entity = fx.player(&fx.spawn);
        let first = relocate(&fx.registry, &entity, "arena", Placement::default());
        let second = relocate(&fx.registry, &entity, "arena", Placement::default());
        let outcomes = [first.outcome(), second.outcome()];
        assert!(outcomes.contains(&RelocationOutcome::Success));
        assert!(
            outcomes.contains(&RelocationOutcome::SourceEntityUnbound)
                || outcomes.contains(&RelocationOutcome::AlreadyInTarget)
        );
        assert!(Fixture::holds(&fx.arena, &entity));
        assert!(!Fixture::holds(&fx.spawn, &entity));
    }

    #[test]
    fn target_closing_mid_handoff_is_internal_error() {
        let fx = Fixture::new();
        let entity = fx.player(&fx.spawn);
        let gate = Arc::new(std::sync::Barrier::new(2));
        let g = Arc::clone(&gate);
        // Hold the source thread so the target can close before the hop.
        fx.spawn
            .execute(move |_| {
                g.wait();
                g.wait();
            })
            .unwrap();
        gate.wait();
        let pending = relocate(&fx.registry, &entity, "arena", Placement::default());
        let arena = fx.registry.unregister("arena", false).unwrap();
        gate.wait();

        assert_eq!(pending.outcome(), RelocationOutcome::InternalError);
        assert!(!entity.is_bound());
        assert!(!Fixture::holds(&fx.spawn, &entity));
        arena.join();
    }

    fn in_flight(
        fx: &Fixture,
        entity: &EntityRef,
        stage: Stage,
        cargo: Option<EntityData>,
    ) -> (Relocation, Pending<RelocationOutcome>) {
        let (done, pending) = pending();
        let relocation = Relocation {
            entity: entity.clone(),
            source: Arc::clone(&fx.spawn),
            target: Arc::clone(&fx.arena),
            placement: Placement::default(),
            stage,
            cargo,
            done: Some(done),
        };
        (relocation, pending)
    }

    #[test]
    fn attach_dropped_behind_shutdown_unbinds_entity() {
        let fx = Fixture::new();
        let entity = fx.player(&fx.spawn);
        let id = entity.id();
        let data = fx
            .spawn
            .call(move |s| s.world_mut().detach(id))
            .wait()
            .unwrap()
            .unwrap();

        let gate = Arc::new(std::sync::Barrier::new(2));
        let g = Arc::clone(&gate);
        fx.arena
            .execute(move |_| {
                g.wait();
                g.wait();
            })
            .unwrap();
        gate.wait();
        fx.arena.close();

        let (relocation, pending) = in_flight(&fx, &entity, Stage::Attaching, Some(data));
        assert!(fx.arena.send_relocation_unchecked(relocation));
        gate.wait();

        assert_eq!(pending.outcome(), RelocationOutcome::InternalError);
        assert!(!entity.is_bound());
        fx.arena.join();
    }

    #[test]
    fn dropped_before_detach_keeps_binding() {
        let fx = Fixture::new();
        let entity = fx.player(&fx.spawn);
        let (relocation, pending) = in_flight(&fx, &entity, Stage::Detaching, None);
        drop(relocation);
        assert_eq!(pending.outcome(), RelocationOutcome::InternalError);
        assert_eq!(entity.world_name().as_deref(), Some("spawn"));
        assert!(Fixture::holds(&fx.spawn, &entity));
    }

    #[test]
    fn colliding_id_in_target_is_internal_error() {
        let fx = Fixture::new();
        let entity = fx.player(&fx.spawn);
        let id = entity.id();
        fx.arena
            .call(move |s| s.world_mut().attach(id, EntityData::object(Transform::default())))
            .wait()
            .unwrap()
            .unwrap();
        let outcome = relocate(&fx.registry, &entity, "arena", Placement::default()).outcome();
        assert_eq!(outcome, RelocationOutcome::InternalError);
        assert!(!entity.is_bound());
    }
}
