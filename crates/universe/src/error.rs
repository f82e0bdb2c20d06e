use multiworld_kernel::ParseWorldTypeError;
use multiworld_persist::StoreError;

use crate::pending::Abandoned;

/// Errors from universe operations.
#[derive(Debug, thiserror::Error)]
pub enum UniverseError {
    #[error("world '{0}' already exists")]
    AlreadyExists(String),
    #[error("world folder '{0}' already exists on disk")]
    AlreadyOnDisk(String),
    #[error("world '{0}' not found")]
    NotFound(String),
    #[error("invalid world name '{0}'")]
    InvalidName(String),
    #[error("world '{name}' has the same identity token as loaded world '{existing}'")]
    DuplicateIdentity { name: String, existing: String },
    #[error("world '{0}' is shutting down")]
    ContextClosed(String),
    #[error(transparent)]
    UnknownWorldType(#[from] ParseWorldTypeError),
    #[error(transparent)]
    Abandoned(#[from] Abandoned),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
