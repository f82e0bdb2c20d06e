//! Shared types used by every multiworld crate.

mod types;

pub use types::{EntityId, Transform, WorldId};
