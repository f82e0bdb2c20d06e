use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::UniverseError;
use crate::handle::{WorldHandle, WorldSummary, name_key};

/// Every loaded world, by case-insensitive name.
///
/// All access goes through one mutex; nothing here waits on a world thread.
#[derive(Debug, Default)]
pub struct Registry {
    worlds: Mutex<HashMap<String, Arc<WorldHandle>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<WorldHandle>> {
        self.worlds.lock().get(&name_key(name)).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.worlds.lock().contains_key(&name_key(name))
    }

    pub fn len(&self) -> usize {
        self.worlds.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.worlds.lock().is_empty()
    }

    /// Summaries of every loaded world, sorted by name.
    pub fn list(&self) -> Vec<WorldSummary> {
        let mut summaries: Vec<WorldSummary> =
            self.worlds.lock().values().map(|w| w.summary()).collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    /// Add a world. Fails if its name or identity token is already taken.
    pub fn register(&self, world: Arc<WorldHandle>) -> Result<(), UniverseError> {
        let key = name_key(world.name());
        let mut worlds = self.worlds.lock();
        if worlds.contains_key(&key) {
            return Err(UniverseError::AlreadyExists(world.name().to_string()));
        }
        if let Some(existing) = worlds.values().find(|w| w.id() == world.id()) {
            return Err(UniverseError::DuplicateIdentity {
                name: world.name().to_string(),
                existing: existing.name().to_string(),
            });
        }
        info!(world = %world.name(), id = %world.id(), "registered world");
        worlds.insert(key, world);
        Ok(())
    }

    /// Remove a world and shut its thread down.
    ///
    /// With `delete_files` the world directory is deleted once the thread
    /// has drained its queue; otherwise the world is saved.
    pub fn unregister(&self, name: &str, delete_files: bool) -> Option<Arc<WorldHandle>> {
        let world = self.worlds.lock().remove(&name_key(name))?;
        if delete_files {
            if let Err(err) = world.mark_for_deletion() {
                warn!(world = %world.name(), %err, "could not mark world for deletion");
            }
        }
        world.close();
        info!(world = %world.name(), delete_files, "unregistered world");
        Some(world)
    }

    /// Remove every world without closing them.
    pub(crate) fn drain(&self) -> Vec<Arc<WorldHandle>> {
        self.worlds.lock().drain().map(|(_, w)| w).collect()
    }
}
