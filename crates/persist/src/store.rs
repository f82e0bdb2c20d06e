//! File-backed world directory.
//!
//! Layout inside a world directory:
//! ```text
//! config.json                      - WorldConfig, including the identity token
//! chunks/
//!   <x>.<z>.chunk.cbor.zst         - CBOR+zstd compressed heightmap chunks
//! resources/
//!   entities.cbor.zst              - CBOR+zstd compressed entity snapshot
//! ```

use crate::snapshot::EntitySnapshot;
use multiworld_kernel::{Chunk, ChunkCoord, Terrain, World, WorldConfig};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Name of the config record inside a world directory.
pub const CONFIG_FILE: &str = "config.json";

const CHUNKS_DIR: &str = "chunks";
const RESOURCES_DIR: &str = "resources";
const ENTITIES_FILE: &str = "entities.cbor.zst";
const CHUNK_SUFFIX: &str = ".chunk.cbor.zst";
const CONFIG_VERSION: u32 = multiworld_kernel::config::CONFIG_VERSION;

/// Errors from file-backed persistence operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CBOR serialization error: {0}")]
    CborEncode(String),
    #[error("CBOR deserialization error: {0}")]
    CborDecode(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("integrity check failed for {0}")]
    IntegrityMismatch(String),
    #[error("config version mismatch: file has v{file_version}, expected v{expected_version}")]
    SchemaMismatch {
        file_version: u32,
        expected_version: u32,
    },
    #[error("directory {0} already exists")]
    AlreadyExists(PathBuf),
    #[error("{0} is not a world directory")]
    NotAWorld(PathBuf),
    #[error("config record has no identity marker")]
    IdentityMarkerMissing,
}

/// What a flush wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub chunks: usize,
    pub entities: usize,
}

/// A world directory on disk.
#[derive(Debug, Clone)]
pub struct WorldStore {
    root: PathBuf,
}

impl WorldStore {
    /// Create a new world directory and write its config.
    ///
    /// Fails with [`StoreError::AlreadyExists`] if the directory is already
    /// there, so two creators of the same name cannot both succeed.
    pub fn create(path: impl AsRef<Path>, config: &WorldConfig) -> Result<Self, StoreError> {
        let root = path.as_ref().to_path_buf();
        if let Some(parent) = root.parent() {
            std::fs::create_dir_all(parent)?;
        }
        match std::fs::create_dir(&root) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StoreError::AlreadyExists(root));
            }
            Err(err) => return Err(err.into()),
        }
        std::fs::create_dir_all(root.join(CHUNKS_DIR))?;
        std::fs::create_dir_all(root.join(RESOURCES_DIR))?;

        let store = Self { root };
        store.save_config(config)?;
        Ok(store)
    }

    /// Open an existing world directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = path.as_ref().to_path_buf();
        if !root.join(CONFIG_FILE).is_file() {
            return Err(StoreError::NotAWorld(root));
        }
        std::fs::create_dir_all(root.join(CHUNKS_DIR))?;
        std::fs::create_dir_all(root.join(RESOURCES_DIR))?;
        Ok(Self { root })
    }

    /// Whether `path` looks like a world directory.
    pub fn is_world_dir(path: &Path) -> bool {
        path.join(CONFIG_FILE).is_file()
    }

    /// Get the path to the store root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn read_config(&self) -> Result<WorldConfig, StoreError> {
        let config: WorldConfig =
            serde_json::from_reader(std::fs::File::open(self.config_path())?)?;
        if config.version != CONFIG_VERSION {
            return Err(StoreError::SchemaMismatch {
                file_version: config.version,
                expected_version: CONFIG_VERSION,
            });
        }
        Ok(config)
    }

    pub fn save_config(&self, config: &WorldConfig) -> Result<(), StoreError> {
        serde_json::to_writer_pretty(std::fs::File::create(self.config_path())?, config)?;
        Ok(())
    }

    pub fn save_chunk(&self, chunk: &Chunk) -> Result<(), StoreError> {
        let compressed = zstd_compress(&cbor_serialize(chunk)?)?;
        std::fs::write(self.chunk_path(chunk.coord), compressed)?;
        Ok(())
    }

    /// Write every dirty chunk and mark the terrain clean.
    pub fn save_dirty_chunks(&self, terrain: &mut Terrain) -> Result<usize, StoreError> {
        let mut saved = 0;
        for chunk in terrain.dirty_chunks() {
            self.save_chunk(chunk)?;
            saved += 1;
        }
        terrain.mark_clean();
        Ok(saved)
    }

    /// Make every chunk on disk resident in `terrain`.
    pub fn load_chunks(&self, terrain: &mut Terrain) -> Result<usize, StoreError> {
        let mut loaded = 0;
        for entry in std::fs::read_dir(self.root.join(CHUNKS_DIR))? {
            let path = entry?.path();
            let is_chunk = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(CHUNK_SUFFIX));
            if !is_chunk {
                continue;
            }
            let chunk: Chunk = cbor_deserialize(&zstd_decompress(&std::fs::read(&path)?)?)?;
            if !chunk.is_well_formed() {
                return Err(StoreError::IntegrityMismatch(path.display().to_string()));
            }
            terrain.insert(chunk);
            loaded += 1;
        }
        Ok(loaded)
    }

    pub fn save_entities(&self, world: &World) -> Result<usize, StoreError> {
        let snap = EntitySnapshot::capture(world);
        let compressed = zstd_compress(&cbor_serialize(&snap)?)?;
        std::fs::write(self.entities_path(), compressed)?;
        Ok(snap.entities.len())
    }

    /// The saved entity snapshot, if the world has ever been flushed.
    pub fn load_entities(&self) -> Result<Option<EntitySnapshot>, StoreError> {
        let path = self.entities_path();
        if !path.exists() {
            return Ok(None);
        }
        let snap: EntitySnapshot = cbor_deserialize(&zstd_decompress(&std::fs::read(&path)?)?)?;
        if !snap.verify() {
            return Err(StoreError::IntegrityMismatch(path.display().to_string()));
        }
        Ok(Some(snap))
    }

    /// Reconstruct the world stored in this directory.
    pub fn load_world(&self) -> Result<World, StoreError> {
        let config = self.read_config()?;
        let mut terrain = Terrain::new(config.world_type.generator(config.seed));
        let chunks = self.load_chunks(&mut terrain)?;
        let world = match self.load_entities()? {
            Some(snap) => snap.into_world(config, terrain),
            None => World::from_parts(config.clone(), terrain, Default::default(), 0, config.seed),
        };
        tracing::debug!(
            root = %self.root.display(),
            chunks,
            entities = world.entity_count(),
            "loaded world"
        );
        Ok(world)
    }

    /// Write config, dirty chunks and entities to disk.
    pub fn flush(&self, world: &mut World) -> Result<FlushStats, StoreError> {
        self.save_config(world.config())?;
        let chunks = self.save_dirty_chunks(world.terrain_mut())?;
        let entities = self.save_entities(world)?;
        Ok(FlushStats { chunks, entities })
    }

    fn chunk_path(&self, coord: ChunkCoord) -> PathBuf {
        self.root
            .join(CHUNKS_DIR)
            .join(format!("{coord}{CHUNK_SUFFIX}"))
    }

    fn entities_path(&self) -> PathBuf {
        self.root.join(RESOURCES_DIR).join(ENTITIES_FILE)
    }
}

fn cbor_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, StoreError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| StoreError::CborEncode(e.to_string()))?;
    Ok(buf)
}

fn cbor_deserialize<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, StoreError> {
    ciborium::from_reader(data).map_err(|e| StoreError::CborDecode(e.to_string()))
}

fn zstd_compress(data: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut encoder = zstd::Encoder::new(Vec::new(), 3)?;
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn zstd_decompress(data: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut decoder = zstd::Decoder::new(data)?;
    let mut buf = Vec::new();
    decoder.read_to_end(&mut buf)?;
    Ok(buf)
}
