//! Universe: the set of loaded worlds and the operations that span them.
//!
//! Every world runs on its own thread and owns its state exclusively. Work on
//! a world is sent to that thread as a message and executed in FIFO order.
//!
//! # Invariants
//! - World state is only touched from the world's own thread.
//! - The registry is the only structure shared between arbitrary threads.
//! - A relocation detaches on the source thread strictly before it attaches
//!   on the target thread, and resolves exactly once.
//! - No two registered worlds share a name (case-insensitive) or identity token.

mod config;
mod context;
mod entity;
mod error;
mod handle;
mod lifecycle;
pub mod messages;
mod pending;
mod registry;
mod relocate;

#[cfg(test)]
mod test_support;

pub use config::UniverseConfig;
pub use context::WorldState;
pub use entity::EntityRef;
pub use error::UniverseError;
pub use handle::{WorldHandle, WorldSummary};
pub use lifecycle::{DestroyOutcome, Universe};
pub use pending::{Abandoned, Completer, Pending, pending};
pub use registry::Registry;
pub use relocate::{FALLBACK_HEIGHT, Placement, RelocationOutcome, relocate};
