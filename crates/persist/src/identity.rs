//! Identity token rewrite inside a copied `config.json`.
//!
//! The record is edited as text: only the quoted value after the identity
//! marker changes, every other byte stays as it was.

use multiworld_common::WorldId;
use multiworld_kernel::IDENTITY_MARKER;
use multiworld_kernel::config::binary_id;
use std::fs;
use std::ops::Range;
use std::path::Path;

use crate::store::StoreError;

/// Byte range of the token text (without quotes) following the marker.
fn token_span(text: &str) -> Option<Range<usize>> {
    let after_marker = text.find(IDENTITY_MARKER)? + IDENTITY_MARKER.len();
    let rest = &text[after_marker..];
    let colon = rest.len() - rest.trim_start().len();
    let rest = rest.trim_start().strip_prefix(':')?;
    let gap = rest.len() - rest.trim_start().len();
    let rest = rest.trim_start().strip_prefix('"')?;
    let len = rest.find('"')?;
    let start = after_marker + colon + 1 + gap + 1;
    Some(start..start + len)
}

/// The identity token stored in a config record, if one can be found.
pub fn read_identity(text: &str) -> Option<WorldId> {
    token_span(text).and_then(|span| binary_id::decode(&text[span]))
}

/// Replace the identity token in `text` with `id`.
pub fn rewrite_identity(text: &str, id: WorldId) -> Result<String, StoreError> {
    let span = token_span(text).ok_or(StoreError::IdentityMarkerMissing)?;
    let mut out = String::with_capacity(text.len());
    out.push_str(&text[..span.start]);
    out.push_str(&binary_id::encode(id));
    out.push_str(&text[span.end..]);
    Ok(out)
}

/// Give the config record at `path` a freshly generated identity token.
pub fn regenerate_identity(path: &Path) -> Result<WorldId, StoreError> {
    let text = fs::read_to_string(path)?;
    let id = WorldId::new();
    fs::write(path, rewrite_identity(&text, id)?)?;
    tracing::debug!(config = %path.display(), %id, "regenerated identity token");
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use multiworld_kernel::{WorldConfig, WorldType};

    #[test]
    fn rewrite_changes_only_the_token() {
        let config = WorldConfig::new(WorldType::Flat, 1);
        let text = serde_json::to_string_pretty(&config).unwrap();
        let id = WorldId::new();
        let out = rewrite_identity(&text, id).unwrap();

        assert_eq!(read_identity(&text), Some(config.id));
        assert_eq!(read_identity(&out), Some(id));
        assert_eq!(out.len(), text.len());
        let differing = text.bytes().zip(out.bytes()).filter(|(a, b)| a != b).count();
        assert!(differing <= 24);

        let parsed: WorldConfig = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed.id, id);
        assert_eq!(parsed.seed, config.seed);
    }

    #[test]
    fn marker_tolerates_whitespace() {
        let old = binary_id::encode(WorldId::new());
        let text = format!(
            "{{ \"UUID\": {{ \"$binary\"  :\n  \"{old}\", \"$type\": \"04\" }}, \"X\": 1 }}"
        );
        let id = WorldId::new();
        let out = rewrite_identity(&text, id).unwrap();
        assert_eq!(out, text.replace(&old, &binary_id::encode(id)));
    }

    #[test]
    fn missing_marker_is_an_error() {
        let err = rewrite_identity(r#"{"Name": "x"}"#, WorldId::new()).unwrap_err();
        assert!(matches!(err, StoreError::IdentityMarkerMissing));
        assert!(read_identity(r#"{"$binary": 5}"#).is_none());
    }

    #[test]
    fn regenerate_writes_new_token() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        let config = WorldConfig::new(WorldType::Normal, 2);
        fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let id = regenerate_identity(&path).unwrap();
        assert_ne!(id, config.id);
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(read_identity(&text), Some(id));
    }
}
