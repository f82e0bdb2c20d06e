//! Persistence: one directory per world, plus whole-directory copy and delete.
//!
//! # Invariants
//! - A world directory always holds a `config.json` with an identity token.
//! - Snapshots are hashed and verified on load.
//! - A failed tree copy leaves no partial destination behind.

pub mod identity;
mod snapshot;
mod store;
pub mod tree;

pub use identity::{read_identity, regenerate_identity, rewrite_identity};
pub use snapshot::EntitySnapshot;
pub use store::{CONFIG_FILE, FlushStats, StoreError, WorldStore};
pub use tree::{copy_tree, copy_tree_or_clean, delete_tree, tree_manifest};
