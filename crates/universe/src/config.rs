//! Universe-wide settings, persisted as `universe.json` in the root.

use multiworld_kernel::WorldType;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::UniverseError;

/// Universe-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UniverseConfig {
    /// World that can never be destroyed. Created on open if missing.
    pub default_world: String,
    /// Type used when the default world has to be created.
    pub default_world_type: WorldType,
    /// Step each idle world this often. `None` disables ticking.
    pub tick_interval_ms: Option<u64>,
    /// Chunks generated around the origin when a world is created.
    pub spawn_chunk_radius: i32,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self {
            default_world: "default".to_string(),
            default_world_type: WorldType::Normal,
            tick_interval_ms: None,
            spawn_chunk_radius: 1,
        }
    }
}

impl UniverseConfig {
    pub const FILE: &'static str = "universe.json";

    /// Read `universe.json` from `root`, or defaults when it does not exist.
    pub fn load(root: &Path) -> Result<Self, UniverseError> {
        let path = root.join(Self::FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_reader(std::fs::File::open(path)?)?)
    }

    pub fn save(&self, root: &Path) -> Result<(), UniverseError> {
        std::fs::create_dir_all(root)?;
        serde_json::to_writer_pretty(std::fs::File::create(root.join(Self::FILE))?, self)?;
        Ok(())
    }

    pub fn tick_interval(&self) -> Option<Duration> {
        self.tick_interval_ms.map(Duration::from_millis)
    }
}
