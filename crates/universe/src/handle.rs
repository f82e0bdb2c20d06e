use multiworld_common::WorldId;
use multiworld_kernel::{EntityData, World};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crate::context::{Message, WorldContext, WorldState};
use crate::entity::EntityRef;
use crate::error::UniverseError;
use crate::pending::{Pending, pending};
use crate::relocate::Relocation;

/// Counters published by the world thread after every message, readable
/// from any thread without touching world state.
#[derive(Debug, Default)]
pub(crate) struct WorldStats {
    players: AtomicUsize,
    entities: AtomicUsize,
    protected: AtomicBool,
    tick: AtomicU64,
}

impl WorldStats {
    pub(crate) fn publish(&self, world: &World) {
        self.players.store(world.player_count(), Ordering::Relaxed);
        self.entities.store(world.entity_count(), Ordering::Relaxed);
        self.protected
            .store(world.config().is_protected(), Ordering::Relaxed);
        self.tick.store(world.tick(), Ordering::Relaxed);
    }

    pub(crate) fn players(&self) -> usize {
        self.players.load(Ordering::Relaxed)
    }

    pub(crate) fn entities(&self) -> usize {
        self.entities.load(Ordering::Relaxed)
    }

    pub(crate) fn is_protected(&self) -> bool {
        self.protected.load(Ordering::Relaxed)
    }

    pub(crate) fn tick(&self) -> u64 {
        self.tick.load(Ordering::Relaxed)
    }
}

/// One line of a world listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldSummary {
    pub name: String,
    pub players: usize,
    pub entities: usize,
    pub protected: bool,
    pub is_default: bool,
}

/// A loaded world: its identity, its directory and the queue of its thread.
pub struct WorldHandle {
    name: String,
    id: WorldId,
    path: PathBuf,
    stats: Arc<WorldStats>,
    context: WorldContext,
}

impl std::fmt::Debug for WorldHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldHandle")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("path", &self.path)
            .field("closing", &self.is_closing())
            .finish()
    }
}

impl WorldHandle {
    /// Start the thread that owns `state`.
    pub(crate) fn start(
        name: &str,
        state: WorldState,
        tick: Option<Duration>,
    ) -> Result<Arc<Self>, UniverseError> {
        let stats = Arc::new(WorldStats::default());
        stats.publish(state.world());
        let id = state.world().id();
        let path = state.store().root().to_path_buf();
        let context = WorldContext::spawn(name, state, Arc::clone(&stats), tick)?;
        Ok(Arc::new(Self {
            name: name.to_string(),
            id,
            path,
            stats,
            context,
        }))
    }

    /// Name as it was given when the world was created or loaded.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Case-insensitive name comparison.
    pub fn matches(&self, name: &str) -> bool {
        name_key(&self.name) == name_key(name)
    }

    pub fn id(&self) -> WorldId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn player_count(&self) -> usize {
        self.stats.players()
    }

    pub fn entity_count(&self) -> usize {
        self.stats.entities()
    }

    pub fn is_protected(&self) -> bool {
        self.stats.is_protected()
    }

    pub fn tick(&self) -> u64 {
        self.stats.tick()
    }

    pub fn summary(&self) -> WorldSummary {
        WorldSummary {
            name: self.name.clone(),
            players: self.player_count(),
            entities: self.entity_count(),
            protected: self.is_protected(),
            is_default: false,
        }
    }

    /// Whether the world has been asked to shut down.
    pub fn is_closing(&self) -> bool {
        self.context.is_closing()
    }

    /// Queue `f` on the world thread.
    pub fn execute(
        &self,
        f: impl FnOnce(&mut WorldState) + Send + 'static,
    ) -> Result<(), UniverseError> {
        self.context
            .send(Message::Run(Box::new(f)))
            .map_err(|_| UniverseError::ContextClosed(self.name.clone()))
    }

    /// Queue `f` on the world thread and get its result back.
    ///
    /// If the world is closing the result is abandoned.
    pub fn call<T: Send + 'static>(
        &self,
        f: impl FnOnce(&mut WorldState) -> T + Send + 'static,
    ) -> Pending<T> {
        let (done, pending) = pending();
        // On refusal the closure, and with it `done`, is dropped.
        let _ = self.execute(move |state| done.complete(f(state)));
        pending
    }

    /// Spawn an entity in this world and return a reference bound to it.
    pub fn spawn_entity(self: &Arc<Self>, data: EntityData) -> Pending<EntityRef> {
        let world = Arc::clone(self);
        self.call(move |state| {
            let id = state.world_mut().spawn(data);
            EntityRef::bound(id, world)
        })
    }

    pub(crate) fn send_relocation(&self, relocation: Relocation) -> Result<(), Relocation> {
        match self.context.send(Message::Relocate(relocation)) {
            Ok(()) => Ok(()),
            Err(msg) => msg.into_relocation().map_or(Ok(()), Err),
        }
    }

    #[cfg(test)]
    pub(crate) fn send_relocation_unchecked(&self, relocation: Relocation) -> bool {
        self.context.send_unchecked(Message::Relocate(relocation)).is_ok()
    }

    /// Mark the world directory for deletion when the thread exits.
    pub(crate) fn mark_for_deletion(&self) -> Result<(), UniverseError> {
        self.execute(|state| state.world_mut().config_mut().delete_on_remove = true)
    }

    /// Stop accepting work; the thread saves (or deletes) and exits.
    pub(crate) fn close(&self) {
        self.context.close();
    }

    /// Block until the world thread has exited.
    pub fn join(&self) {
        self.context.join();
    }
}

/// Registry key for a world name.
pub(crate) fn name_key(name: &str) -> String {
    name.to_lowercase()
}
