//! World kernel: the state a single partition owns.
//!
//! # Invariants
//! - A `World` is only ever mutated by the thread that runs its partition.
//! - An entity id is present in at most one `World` at a time.
//! - Terrain heights are deterministic for a given world type and seed.

pub mod config;
pub mod terrain;
pub mod world;

pub use config::{DEFAULT_PROFILE, IDENTITY_MARKER, PROTECTED_PROFILE, WorldConfig};
pub use terrain::{
    CHUNK_SIZE, Chunk, ChunkCoord, Generator, ParseWorldTypeError, Terrain, WorldType,
};
pub use world::{EntityData, EntityKind, World, WorldError};
