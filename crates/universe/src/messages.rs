//! Text shown to whoever issued an administrative command.

use crate::error::UniverseError;
use crate::handle::WorldSummary;
use crate::lifecycle::DestroyOutcome;
use crate::relocate::RelocationOutcome;

pub fn world_already_exists(name: &str) -> String {
    format!("World '{name}' already exists")
}

pub fn world_folder_exists(name: &str) -> String {
    format!("World folder '{name}' already exists on disk")
}

pub fn world_not_found(name: &str) -> String {
    format!("World '{name}' not found")
}

pub fn world_created(name: &str, world_type: &str) -> String {
    format!("Created {world_type} world '{name}'")
}

pub fn default_changed(name: &str) -> String {
    format!("Default world is now '{name}'")
}

pub fn protection(name: &str, enabled: bool) -> String {
    let state = if enabled { "ENABLED" } else { "DISABLED" };
    format!("Protection {state} for '{name}'")
}

pub fn spawn_point_set(name: &str) -> String {
    format!("Spawn point set for '{name}'")
}

pub fn teleport(outcome: RelocationOutcome, target: &str) -> String {
    match outcome {
        RelocationOutcome::Success => format!("Teleported to '{target}'"),
        RelocationOutcome::TargetNotFound => world_not_found(target),
        RelocationOutcome::AlreadyInTarget => format!("Already in world '{target}'"),
        RelocationOutcome::SourceEntityUnbound => "You are not in a world".to_string(),
        RelocationOutcome::InternalError => format!("Teleport to '{target}' failed"),
    }
}

pub fn destroy(outcome: DestroyOutcome, name: &str) -> String {
    match outcome {
        DestroyOutcome::RefusedDefault => {
            "Cannot destroy the default world. Change it first with 'default <other>'".to_string()
        }
        DestroyOutcome::RefusedLast => "Cannot destroy the only loaded world".to_string(),
        DestroyOutcome::Removed { deleted: true } => {
            format!("Permanently deleted world '{name}'")
        }
        DestroyOutcome::Removed { deleted: false } => format!("Unloaded world '{name}'"),
    }
}

pub fn clone_started(source: &str, target: &str) -> String {
    format!("Cloning world '{source}' to '{target}'...")
}

pub fn clone_succeeded(target: &str) -> String {
    format!("World '{target}' cloned successfully!")
}

pub fn clone_failed(err: &UniverseError) -> String {
    format!("Failed to clone world: {}", error(err))
}

/// Header and one line per world, or a single line if there are none.
pub fn list(worlds: &[WorldSummary]) -> Vec<String> {
    if worlds.is_empty() {
        return vec!["No worlds loaded".to_string()];
    }
    let mut lines = Vec::with_capacity(worlds.len() + 1);
    lines.push(format!("Worlds ({}):", worlds.len()));
    for world in worlds {
        let mut line = format!("  - {} [{} players]", world.name, world.players);
        if world.protected {
            line.push_str(" [protected]");
        }
        if world.is_default {
            line.push_str(" [default]");
        }
        lines.push(line);
    }
    lines
}

/// User-facing text for an error.
pub fn error(err: &UniverseError) -> String {
    match err {
        UniverseError::AlreadyExists(name) => world_already_exists(name),
        UniverseError::AlreadyOnDisk(name) => world_folder_exists(name),
        UniverseError::NotFound(name) => world_not_found(name),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(name: &str, players: usize, protected: bool, is_default: bool) -> WorldSummary {
        WorldSummary {
            name: name.to_string(),
            players,
            entities: players,
            protected,
            is_default,
        }
    }

    #[test]
    fn list_marks_default_and_protection() {
        let lines = list(&[
            summary("arena", 2, true, false),
            summary("spawn", 0, false, true),
        ]);
        assert_eq!(
            lines,
            vec![
                "Worlds (2):",
                "  - arena [2 players] [protected]",
                "  - spawn [0 players] [default]",
            ]
        );
        assert_eq!(list(&[]), vec!["No worlds loaded"]);
    }

    #[test]
    fn errors_use_command_wording() {
        assert_eq!(
            error(&UniverseError::AlreadyOnDisk("b".into())),
            "World folder 'b' already exists on disk"
        );
        assert_eq!(
            clone_failed(&UniverseError::NotFound("a".into())),
            "Failed to clone world: World 'a' not found"
        );
        assert_eq!(
            error(&UniverseError::InvalidName("..".into())),
            "invalid world name '..'"
        );
    }

    #[test]
    fn outcome_wording() {
        assert_eq!(protection("arena", false), "Protection DISABLED for 'arena'");
        assert_eq!(
            teleport(RelocationOutcome::TargetNotFound, "x"),
            "World 'x' not found"
        );
        assert_eq!(
            destroy(DestroyOutcome::Removed { deleted: false }, "arena"),
            "Unloaded world 'arena'"
        );
        assert!(destroy(DestroyOutcome::RefusedDefault, "spawn").starts_with("Cannot destroy"));
    }
}
