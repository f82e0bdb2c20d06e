//! Heightmap terrain, split into fixed-size chunks.
//!
//! Only chunks that are resident in memory can answer height queries. Chunks
//! are made resident either by the store (loaded from disk) or by generating
//! them from the world's [`Generator`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Columns along each horizontal axis of a chunk.
pub const CHUNK_SIZE: i32 = 32;

const CHUNK_SHIFT: i32 = 5;
const CHUNK_MASK: i32 = CHUNK_SIZE - 1;

/// Height of every column in a flat world.
const FLAT_HEIGHT: i16 = 80;
/// Base height and amplitude of the rolling heightmap.
const ROLLING_BASE: f32 = 56.0;
const ROLLING_AMPLITUDE: f32 = 16.0;
/// Distance in columns between rolling heightmap lattice points.
const ROLLING_CELL: i32 = 16;

/// Horizontal coordinate of a chunk (block coordinate divided by [`CHUNK_SIZE`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkCoord {
    pub x: i32,
    pub z: i32,
}

impl ChunkCoord {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// The chunk containing block column `(x, z)`.
    pub fn containing(x: i32, z: i32) -> Self {
        Self {
            x: x >> CHUNK_SHIFT,
            z: z >> CHUNK_SHIFT,
        }
    }

    /// First block column of this chunk.
    pub fn origin(self) -> (i32, i32) {
        (self.x << CHUNK_SHIFT, self.z << CHUNK_SHIFT)
    }
}

impl fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.x, self.z)
    }
}

/// One chunk of surface heights, row-major by local z then local x.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub coord: ChunkCoord,
    heights: Vec<i16>,
}

impl Chunk {
    /// A chunk where every column has the same height.
    pub fn filled(coord: ChunkCoord, height: i16) -> Self {
        Self {
            coord,
            heights: vec![height; (CHUNK_SIZE * CHUNK_SIZE) as usize],
        }
    }

    /// Height of the topmost block at block column `(x, z)`.
    ///
    /// Only the low bits of the coordinates are used, so callers may pass
    /// world coordinates directly.
    pub fn height(&self, x: i32, z: i32) -> i16 {
        self.heights[Self::index(x, z)]
    }

    pub fn set_height(&mut self, x: i32, z: i32, height: i16) {
        let idx = Self::index(x, z);
        self.heights[idx] = height;
    }

    /// Whether the decoded height table has the expected size.
    pub fn is_well_formed(&self) -> bool {
        self.heights.len() == (CHUNK_SIZE * CHUNK_SIZE) as usize
    }

    fn index(x: i32, z: i32) -> usize {
        ((z & CHUNK_MASK) * CHUNK_SIZE + (x & CHUNK_MASK)) as usize
    }
}

/// Kind of world, selected when the world is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorldType {
    #[default]
    Normal,
    Flat,
    Void,
    Dummy,
}

impl WorldType {
    pub const ALL: [WorldType; 4] = [Self::Normal, Self::Flat, Self::Void, Self::Dummy];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Flat => "flat",
            Self::Void => "void",
            Self::Dummy => "dummy",
        }
    }

    /// The terrain strategy for this world type.
    pub fn generator(self, seed: u64) -> Generator {
        match self {
            Self::Normal => Generator::Rolling { seed },
            Self::Flat => Generator::Flat {
                height: FLAT_HEIGHT,
            },
            Self::Void => Generator::Void,
            Self::Dummy => Generator::Dummy,
        }
    }
}

impl fmt::Display for WorldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a world type name is not one of `normal`, `flat`, `void`, `dummy`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown world type '{0}' (expected normal, flat, void or dummy)")]
pub struct ParseWorldTypeError(pub String);

impl FromStr for WorldType {
    type Err = ParseWorldTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseWorldTypeError(s.to_string()))
    }
}

/// Terrain generation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generator {
    /// Seeded rolling hills.
    Rolling { seed: u64 },
    /// Every column at the same height.
    Flat { height: i16 },
    /// Empty columns.
    Void,
    /// Generates nothing; height queries always miss.
    Dummy,
}

impl Generator {
    /// Produce the chunk at `coord`, or `None` if this strategy has no terrain.
    pub fn generate(&self, coord: ChunkCoord) -> Option<Chunk> {
        match *self {
            Self::Rolling { seed } => {
                let mut chunk = Chunk::filled(coord, 0);
                let (ox, oz) = coord.origin();
                for dz in 0..CHUNK_SIZE {
                    for dx in 0..CHUNK_SIZE {
                        let (x, z) = (ox + dx, oz + dz);
                        chunk.set_height(x, z, rolling_height(seed, x, z));
                    }
                }
                Some(chunk)
            }
            Self::Flat { height } => Some(Chunk::filled(coord, height)),
            Self::Void => Some(Chunk::filled(coord, 0)),
            Self::Dummy => None,
        }
    }
}

/// The resident chunks of one world.
#[derive(Debug, Clone)]
pub struct Terrain {
    generator: Generator,
    chunks: BTreeMap<ChunkCoord, Chunk>,
    dirty: BTreeSet<ChunkCoord>,
}

impl Terrain {
    pub fn new(generator: Generator) -> Self {
        Self {
            generator,
            chunks: BTreeMap::new(),
            dirty: BTreeSet::new(),
        }
    }

    /// Make a chunk read from disk resident. It is not considered dirty.
    pub fn insert(&mut self, chunk: Chunk) {
        self.dirty.remove(&chunk.coord);
        self.chunks.insert(chunk.coord, chunk);
    }

    /// Resident chunk at `coord`, generating it if needed.
    pub fn load_chunk(&mut self, coord: ChunkCoord) -> Option<&Chunk> {
        if !self.chunks.contains_key(&coord) {
            let chunk = self.generator.generate(coord)?;
            tracing::trace!(chunk = %coord, "generated chunk");
            self.dirty.insert(coord);
            self.chunks.insert(coord, chunk);
        }
        self.chunks.get(&coord)
    }

    /// Load every chunk within `radius` chunks of the origin.
    pub fn load_around_origin(&mut self, radius: i32) -> usize {
        let mut loaded = 0;
        for z in -radius..=radius {
            for x in -radius..=radius {
                if self.load_chunk(ChunkCoord::new(x, z)).is_some() {
                    loaded += 1;
                }
            }
        }
        loaded
    }

    /// Resident chunk at `coord`, without generating.
    pub fn resident(&self, coord: ChunkCoord) -> Option<&Chunk> {
        self.chunks.get(&coord)
    }

    pub fn is_resident(&self, coord: ChunkCoord) -> bool {
        self.chunks.contains_key(&coord)
    }

    /// Height of the topmost block at column `(x, z)` if its chunk is resident.
    pub fn surface_height(&self, x: i32, z: i32) -> Option<i16> {
        self.resident(ChunkCoord::containing(x, z))
            .map(|chunk| chunk.height(x, z))
    }

    /// Overwrite the height of a resident column. Returns false if the chunk
    /// is not resident.
    pub fn set_surface_height(&mut self, x: i32, z: i32, height: i16) -> bool {
        let coord = ChunkCoord::containing(x, z);
        match self.chunks.get_mut(&coord) {
            Some(chunk) => {
                chunk.set_height(x, z, height);
                self.dirty.insert(coord);
                true
            }
            None => false,
        }
    }

    pub fn resident_count(&self) -> usize {
        self.chunks.len()
    }

    /// Chunks modified or generated since the last [`Terrain::mark_clean`].
    pub fn dirty_chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.dirty.iter().filter_map(|c| self.chunks.get(c))
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    pub fn mark_clean(&mut self) {
        self.dirty.clear();
    }
}

/// Splitmix64, a fast deterministic mixing step.
pub(crate) fn splitmix64(mut state: u64) -> u64 {
    state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Value in `[0, 1)` attached to a lattice point.
fn lattice(seed: u64, lx: i32, lz: i32) -> f32 {
    let key = seed
        ^ (lx as u32 as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15)
        ^ (lz as u32 as u64).wrapping_mul(0xc2b2_ae3d_27d4_eb4f);
    (splitmix64(key) >> 40) as f32 / (1u64 << 24) as f32
}

/// Bilinear value noise over a lattice of [`ROLLING_CELL`] columns.
fn rolling_height(seed: u64, x: i32, z: i32) -> i16 {
    let (lx, lz) = (x.div_euclid(ROLLING_CELL), z.div_euclid(ROLLING_CELL));
    let tx = x.rem_euclid(ROLLING_CELL) as f32 / ROLLING_CELL as f32;
    let tz = z.rem_euclid(ROLLING_CELL) as f32 / ROLLING_CELL as f32;
    let top = lerp(lattice(seed, lx, lz), lattice(seed, lx + 1, lz), tx);
    let bottom = lerp(lattice(seed, lx, lz + 1), lattice(seed, lx + 1, lz + 1), tx);
    (ROLLING_BASE + lerp(top, bottom, tz) * ROLLING_AMPLITUDE) as i16
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_coord_from_blocks() {
        assert_eq!(ChunkCoord::containing(5, 7), ChunkCoord::new(0, 0));
        assert_eq!(ChunkCoord::containing(32, 31), ChunkCoord::new(1, 0));
        assert_eq!(ChunkCoord::containing(-1, -33), ChunkCoord::new(-1, -2));
        assert_eq!(ChunkCoord::new(-1, 2).origin(), (-32, 64));
    }

    #[test]
    fn chunk_height_uses_local_bits() {
        let mut chunk = Chunk::filled(ChunkCoord::new(1, 1), 10);
        chunk.set_height(37, 39, 42);
        assert_eq!(chunk.height(37, 39), 42);
        assert_eq!(chunk.height(5, 7), 42);
        assert_eq!(chunk.height(38, 39), 10);
    }

    #[test]
    fn world_type_parse_is_case_insensitive() {
        assert_eq!("FLAT".parse::<WorldType>(), Ok(WorldType::Flat));
        assert_eq!("Void".parse::<WorldType>(), Ok(WorldType::Void));
        assert_eq!("normal".parse::<WorldType>(), Ok(WorldType::Normal));
        assert_eq!("dummy".parse::<WorldType>(), Ok(WorldType::Dummy));
        assert!("lava".parse::<WorldType>().is_err());
    }

    #[test]
    fn each_type_has_distinct_generator() {
        let gens: Vec<Generator> = WorldType::ALL.iter().map(|t| t.generator(1)).collect();
        for (i, a) in gens.iter().enumerate() {
            for b in &gens[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn flat_and_void_heights() {
        let coord = ChunkCoord::new(0, 0);
        let flat = WorldType::Flat.generator(0).generate(coord).unwrap();
        assert_eq!(flat.height(3, 3), FLAT_HEIGHT);
        let void = WorldType::Void.generator(0).generate(coord).unwrap();
        assert_eq!(void.height(3, 3), 0);
        assert!(WorldType::Dummy.generator(0).generate(coord).is_none());
    }

    #[test]
    fn rolling_terrain_is_deterministic_and_bounded() {
        let a = Generator::Rolling { seed: 9 }.generate(ChunkCoord::new(2, -3)).unwrap();
        let b = Generator::Rolling { seed: 9 }.generate(ChunkCoord::new(2, -3)).unwrap();
        assert_eq!(a, b);
        for z in 0..CHUNK_SIZE {
            for x in 0..CHUNK_SIZE {
                let h = a.height(x, z);
                assert!((56..=72).contains(&h), "height {h} out of range");
            }
        }
    }

    #[test]
    fn surface_height_requires_resident_chunk() {
        let mut terrain = Terrain::new(Generator::Flat { height: 12 });
        assert_eq!(terrain.surface_height(5, 7), None);
        terrain.load_chunk(ChunkCoord::containing(5, 7));
        assert_eq!(terrain.surface_height(5, 7), Some(12));
        assert_eq!(terrain.dirty_count(), 1);
    }

    #[test]
    fn dummy_terrain_never_resident() {
        let mut terrain = Terrain::new(Generator::Dummy);
        assert_eq!(terrain.load_around_origin(1), 0);
        assert_eq!(terrain.surface_height(0, 0), None);
    }

    #[test]
    fn set_height_marks_dirty() {
        let mut terrain = Terrain::new(Generator::Void);
        assert!(!terrain.set_surface_height(1, 1, 5));
        terrain.insert(Chunk::filled(ChunkCoord::new(0, 0), 0));
        assert_eq!(terrain.dirty_count(), 0);
        assert!(terrain.set_surface_height(1, 1, 5));
        assert_eq!(terrain.dirty_chunks().count(), 1);
        terrain.mark_clean();
        assert_eq!(terrain.dirty_count(), 0);
        assert_eq!(terrain.surface_height(1, 1), Some(5));
    }

    #[test]
    fn load_around_origin_counts_chunks() {
        let mut terrain = Terrain::new(Generator::Flat { height: 1 });
        assert_eq!(terrain.load_around_origin(1), 9);
        assert_eq!(terrain.resident_count(), 9);
        assert_eq!(terrain.dirty_count(), 9);
    }
}
