//! Creating, loading, cloning and destroying worlds.

use multiworld_common::{Transform, WorldId};
use multiworld_kernel::{World, WorldConfig, WorldType};
use multiworld_persist::{
    CONFIG_FILE, StoreError, WorldStore, copy_tree_or_clean, delete_tree, regenerate_identity,
};
use parking_lot::{Mutex, RwLock};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::UniverseConfig;
use crate::context::WorldState;
use crate::entity::EntityRef;
use crate::error::UniverseError;
use crate::handle::{WorldHandle, WorldSummary, name_key};
use crate::pending::Pending;
use crate::registry::Registry;
use crate::relocate::{Placement, RelocationOutcome, relocate};

/// Directory under the universe root holding one directory per world.
const WORLDS_DIR: &str = "worlds";

/// Result of a destroy request that found the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyOutcome {
    /// Unloaded; `deleted` tells whether its directory was removed too.
    Removed { deleted: bool },
    /// The default world cannot be destroyed.
    RefusedDefault,
    /// At least one world must stay loaded.
    RefusedLast,
}

/// The set of worlds under one root directory.
#[derive(Debug)]
pub struct Universe {
    root: PathBuf,
    config: RwLock<UniverseConfig>,
    registry: Arc<Registry>,
    /// Held while checking and changing which worlds may be destroyed.
    lifecycle: Mutex<()>,
}

impl Universe {
    /// Open the universe at `root` with the settings in its `universe.json`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, UniverseError> {
        let root = root.into();
        let config = UniverseConfig::load(&root)?;
        Self::open_with(root, config)
    }

    /// Open the universe at `root`: load every world directory found under
    /// `worlds/`, then create the default world if it is missing.
    pub fn open_with(
        root: impl Into<PathBuf>,
        config: UniverseConfig,
    ) -> Result<Self, UniverseError> {
        let root = root.into();
        fs::create_dir_all(root.join(WORLDS_DIR))?;
        let universe = Self {
            root,
            config: RwLock::new(config),
            registry: Arc::new(Registry::new()),
            lifecycle: Mutex::new(()),
        };

        let mut names = Vec::new();
        for entry in fs::read_dir(universe.worlds_dir())? {
            let entry = entry?;
            if entry.file_type()?.is_dir() && WorldStore::is_world_dir(&entry.path()) {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        for name in &names {
            if let Err(err) = universe.load(name) {
                warn!(world = %name, %err, "skipping world");
            }
        }

        let default = universe.default_world();
        if !universe.registry.contains(&default) {
            let world_type = universe.config.read().default_world_type;
            info!(world = %default, %world_type, "creating default world");
            universe.create(&default, world_type).wait()??;
        }
        info!(
            root = %universe.root.display(),
            worlds = universe.registry.len(),
            "universe open"
        );
        Ok(universe)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> UniverseConfig {
        self.config.read().clone()
    }

    pub fn worlds_dir(&self) -> PathBuf {
        self.root.join(WORLDS_DIR)
    }

    /// Directory a world named `name` is stored in.
    pub fn world_path(&self, name: &str) -> PathBuf {
        self.worlds_dir().join(name)
    }

    pub fn world(&self, name: &str) -> Option<Arc<WorldHandle>> {
        self.registry.lookup(name)
    }

    /// Create and materialize a new world.
    ///
    /// Name collisions are reported in the returned slot without scheduling
    /// anything. Otherwise the directory is claimed, the world thread started
    /// and the spawn area generated and saved on it; the world is registered
    /// once that has succeeded.
    pub fn create(
        &self,
        name: &str,
        world_type: WorldType,
    ) -> Pending<Result<Arc<WorldHandle>, UniverseError>> {
        match self.start_new(name, world_type) {
            Ok(world) => self.materialize(world),
            Err(err) => Pending::ready(Err(err)),
        }
    }

    /// [`create`](Self::create) with the world type given by name.
    pub fn create_by_name(
        &self,
        name: &str,
        world_type: &str,
    ) -> Pending<Result<Arc<WorldHandle>, UniverseError>> {
        match world_type.parse::<WorldType>() {
            Ok(world_type) => self.create(name, world_type),
            Err(err) => Pending::ready(Err(err.into())),
        }
    }

    fn start_new(
        &self,
        name: &str,
        world_type: WorldType,
    ) -> Result<Arc<WorldHandle>, UniverseError> {
        self.check_free(name)?;
        let id = WorldId::new();
        let config = WorldConfig {
            id,
            ..WorldConfig::new(world_type, seed_for(id))
        };
        let path = self.world_path(name);
        let store = WorldStore::create(&path, &config).map_err(|err| match err {
            StoreError::AlreadyExists(_) => UniverseError::AlreadyOnDisk(name.to_string()),
            err => err.into(),
        })?;
        let state = WorldState::new(World::new(config), store);
        WorldHandle::start(name, state, self.config.read().tick_interval()).inspect_err(|_| {
            if let Err(err) = delete_tree(&path) {
                error!(world = %name, %err, "failed to remove new world directory");
            }
        })
    }

    fn materialize(
        &self,
        world: Arc<WorldHandle>,
    ) -> Pending<Result<Arc<WorldHandle>, UniverseError>> {
        let registry = Arc::clone(&self.registry);
        let radius = self.config.read().spawn_chunk_radius;
        let handle = Arc::clone(&world);
        world.call(move |state| {
            let generated = state.world_mut().terrain_mut().load_around_origin(radius);
            let result = state
                .flush()
                .map_err(UniverseError::from)
                .and_then(|_| registry.register(Arc::clone(&handle)));
            match result {
                Ok(()) => {
                    info!(
                        world = %handle.name(),
                        id = %handle.id(),
                        chunks = generated,
                        "created world"
                    );
                    Ok(handle)
                }
                Err(err) => {
                    warn!(world = %handle.name(), %err, "world creation failed, discarding");
                    state.world_mut().config_mut().delete_on_remove = true;
                    handle.close();
                    Err(err)
                }
            }
        })
    }

    /// Load the existing world directory `worlds/<name>` and register it.
    pub fn load(&self, name: &str) -> Result<Arc<WorldHandle>, UniverseError> {
        validate_name(name)?;
        if self.registry.contains(name) {
            return Err(UniverseError::AlreadyExists(name.to_string()));
        }
        let path = self.world_path(name);
        if !WorldStore::is_world_dir(&path) {
            return Err(UniverseError::NotFound(name.to_string()));
        }
        let store = WorldStore::open(&path)?;
        let world = store.load_world()?;
        let state = WorldState::new(world, store);
        let handle = WorldHandle::start(name, state, self.config.read().tick_interval())?;
        if let Err(err) = self.registry.register(Arc::clone(&handle)) {
            handle.close();
            handle.join();
            return Err(err);
        }
        info!(world = %name, id = %handle.id(), "loaded world");
        Ok(handle)
    }

    /// Unload a world, optionally deleting its directory.
    ///
    /// Returns `None` if no such world is loaded. Blocks until the world
    /// thread has finished its queue and saved or deleted the world.
    pub fn destroy(&self, name: &str, also_delete: bool) -> Option<DestroyOutcome> {
        let removed = {
            let _lifecycle = self.lifecycle.lock();
            let world = self.registry.lookup(name)?;
            if world.matches(&self.default_world()) {
                return Some(DestroyOutcome::RefusedDefault);
            }
            if self.registry.len() <= 1 {
                return Some(DestroyOutcome::RefusedLast);
            }
            self.registry.unregister(name, also_delete)?
        };
        removed.join();
        info!(world = %removed.name(), deleted = also_delete, "destroyed world");
        Some(DestroyOutcome::Removed {
            deleted: also_delete,
        })
    }

    /// Copy the world `source` to a new world `new_name` with a fresh
    /// identity token, and load the copy.
    ///
    /// The flush and the copy run as one task on the source's thread, so no
    /// other write to the source directory can land while it is being read.
    /// The caller blocks until the copy is done. A copy that fails part way
    /// is removed before the error is returned.
    pub fn clone_world(
        &self,
        source: &str,
        new_name: &str,
    ) -> Result<Arc<WorldHandle>, UniverseError> {
        self.check_free(new_name)?;
        let source = self
            .registry
            .lookup(source)
            .ok_or_else(|| UniverseError::NotFound(source.to_string()))?;

        let target = self.world_path(new_name);
        match fs::create_dir(&target) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(UniverseError::AlreadyOnDisk(new_name.to_string()));
            }
            Err(err) => return Err(err.into()),
        }

        let from = source.path().to_path_buf();
        let to = target.clone();
        let name = source.name().to_string();
        let files = source
            .call(move |state| -> Result<u64, UniverseError> {
                let flushed = state.flush()?;
                debug!(
                    world = %name,
                    chunks = flushed.chunks,
                    entities = flushed.entities,
                    "source flushed for clone"
                );
                Ok(copy_tree_or_clean(&from, &to)?)
            })
            .wait()
            .map_err(UniverseError::from)
            .and_then(|copied| copied)
            .inspect_err(|err| {
                warn!(world = %new_name, %err, "copy failed, removing target");
                remove_partial(&target);
            })?;
        let id = regenerate_identity(&target.join(CONFIG_FILE)).inspect_err(|err| {
            warn!(world = %new_name, %err, "identity rewrite failed, removing copy");
            remove_partial(&target);
        })?;
        info!(from = %source.name(), to = %new_name, files, %id, "copied world");

        self.load(new_name).inspect_err(|err| {
            if !matches!(err, UniverseError::AlreadyExists(_)) {
                warn!(world = %new_name, %err, "cloned world failed to load, removing copy");
                remove_partial(&target);
            }
        })
    }

    /// Name of the world that cannot be destroyed.
    pub fn default_world(&self) -> String {
        self.config.read().default_world.clone()
    }

    /// Make the loaded world `name` the default and save `universe.json`.
    pub fn set_default(&self, name: &str) -> Result<(), UniverseError> {
        let _lifecycle = self.lifecycle.lock();
        let world = self
            .registry
            .lookup(name)
            .ok_or_else(|| UniverseError::NotFound(name.to_string()))?;
        let mut config = self.config.write();
        config.default_world = world.name().to_string();
        config.save(&self.root)?;
        info!(world = %world.name(), "default world changed");
        Ok(())
    }

    /// Switch the world's gameplay profile between protected and default.
    pub fn set_protection(
        &self,
        name: &str,
        enabled: bool,
    ) -> Pending<Result<(), UniverseError>> {
        let Some(world) = self.registry.lookup(name) else {
            return Pending::ready(Err(UniverseError::NotFound(name.to_string())));
        };
        let shown = world.name().to_string();
        world.call(move |state| {
            state.world_mut().config_mut().set_protected(enabled);
            info!(world = %shown, enabled, "protection changed");
            Ok(())
        })
    }

    /// Record the entity's current transform as its world's spawn point.
    /// Resolves to `None` if the entity is not in a loaded world.
    pub fn set_spawn_point(&self, entity: &EntityRef) -> Pending<Option<Transform>> {
        let Some(world) = entity.world() else {
            return Pending::ready(None);
        };
        let id = entity.id();
        world.call(move |state| {
            let transform = state.world().get(id)?.transform;
            state.world_mut().config_mut().spawn_point = Some(transform);
            Some(transform)
        })
    }

    /// Remove an entity from its world and unbind the reference. Resolves to
    /// false when the entity was not there.
    pub fn despawn(&self, entity: &EntityRef) -> Pending<bool> {
        let Some(world) = entity.world() else {
            return Pending::ready(false);
        };
        let entity = entity.clone();
        world.call(move |state| {
            let removed = state.world_mut().detach(entity.id()).is_some();
            if removed {
                entity.rebind(None);
            }
            removed
        })
    }

    /// Summaries of every loaded world, sorted by name.
    pub fn list(&self) -> Vec<WorldSummary> {
        let default = self.default_world();
        let mut summaries = self.registry.list();
        for summary in &mut summaries {
            summary.is_default = name_key(&summary.name) == name_key(&default);
        }
        summaries
    }

    /// Move `entity` to the world named `target`.
    pub fn relocate(
        &self,
        entity: &EntityRef,
        target: &str,
        placement: Placement,
    ) -> Pending<RelocationOutcome> {
        relocate(&self.registry, entity, target, placement)
    }

    /// Close every world and wait for each to save.
    pub fn shutdown(&self) {
        let worlds = self.registry.drain();
        if worlds.is_empty() {
            return;
        }
        for world in &worlds {
            world.close();
        }
        for world in &worlds {
            world.join();
        }
        info!(worlds = worlds.len(), "universe shut down");
    }

    /// Fails if `name` is invalid, loaded, or already has a directory.
    fn check_free(&self, name: &str) -> Result<(), UniverseError> {
        validate_name(name)?;
        if self.registry.contains(name) {
            return Err(UniverseError::AlreadyExists(name.to_string()));
        }
        if self.world_path(name).exists() {
            return Err(UniverseError::AlreadyOnDisk(name.to_string()));
        }
        Ok(())
    }
}

impl Drop for Universe {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// World names become directory names.
fn validate_name(name: &str) -> Result<(), UniverseError> {
    let invalid = name.trim().is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control);
    if invalid {
        return Err(UniverseError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Terrain seed taken from the identity token.
fn seed_for(id: WorldId) -> u64 {
    let bytes = id.to_bytes();
    let mut seed = [0u8; 8];
    seed.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(seed)
}

fn remove_partial(path: &Path) {
    if let Err(err) = delete_tree(path) {
        error!(path = %path.display(), %err, "failed to remove partial world copy");
    }
}
