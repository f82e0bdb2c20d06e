//! The per-world configuration record (`config.json`).

use multiworld_common::{Transform, WorldId};
use serde::{Deserialize, Serialize};

use crate::terrain::WorldType;

/// Current config record version.
pub const CONFIG_VERSION: u32 = 1;

/// Gameplay profile that forbids terrain modification.
pub const PROTECTED_PROFILE: &str = "Protected";
/// Gameplay profile of an unprotected world.
pub const DEFAULT_PROFILE: &str = "Default";

/// Textual key that precedes the encoded identity token in the record.
///
/// Cloning locates the token through this marker and rewrites only its value.
pub const IDENTITY_MARKER: &str = "\"$binary\"";

/// Configuration of one world, persisted as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WorldConfig {
    pub version: u32,
    #[serde(rename = "UUID", with = "binary_id")]
    pub id: WorldId,
    pub world_type: WorldType,
    pub seed: u64,
    pub gameplay_config: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawn_point: Option<Transform>,
    #[serde(default)]
    pub delete_on_remove: bool,
}

impl WorldConfig {
    /// A fresh config with a new identity token.
    pub fn new(world_type: WorldType, seed: u64) -> Self {
        Self {
            version: CONFIG_VERSION,
            id: WorldId::new(),
            world_type,
            seed,
            gameplay_config: DEFAULT_PROFILE.to_string(),
            spawn_point: None,
            delete_on_remove: false,
        }
    }

    /// Protection is on whenever the gameplay profile is [`PROTECTED_PROFILE`].
    pub fn is_protected(&self) -> bool {
        self.gameplay_config == PROTECTED_PROFILE
    }

    pub fn set_protected(&mut self, protected: bool) {
        let profile = if protected {
            PROTECTED_PROFILE
        } else {
            DEFAULT_PROFILE
        };
        self.gameplay_config = profile.to_string();
    }
}

/// Writes a [`WorldId`] as `{"$binary": "<base64>", "$type": "04"}`.
pub mod binary_id {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use multiworld_common::WorldId;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    const UUID_SUBTYPE: &str = "04";

    #[derive(Serialize, Deserialize)]
    struct Binary {
        #[serde(rename = "$binary")]
        binary: String,
        #[serde(rename = "$type")]
        subtype: String,
    }

    /// Base64 text of the token's big-endian bytes, as stored after the
    /// identity marker.
    pub fn encode(id: WorldId) -> String {
        STANDARD.encode(id.to_bytes())
    }

    pub fn decode(text: &str) -> Option<WorldId> {
        let bytes: [u8; 16] = STANDARD.decode(text).ok()?.try_into().ok()?;
        Some(WorldId::from_bytes(bytes))
    }

    pub fn serialize<S: Serializer>(id: &WorldId, s: S) -> Result<S::Ok, S::Error> {
        Binary {
            binary: encode(*id),
            subtype: UUID_SUBTYPE.to_string(),
        }
        .serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<WorldId, D::Error> {
        let raw = Binary::deserialize(d)?;
        if raw.subtype != UUID_SUBTYPE {
            return Err(D::Error::custom(format!(
                "unsupported binary subtype {}",
                raw.subtype
            )));
        }
        decode(&raw.binary).ok_or_else(|| D::Error::custom("malformed identity token"))
    }
}
