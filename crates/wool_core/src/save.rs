//! The persisted game save aggregate.
//!
//! [`GameSave`] is the strongly typed form. Persisted documents arrive as
//! loose JSON ([`serde_json::Value`]) and are only converted to `GameSave`
//! after the integrity engine has validated (and if needed repaired) them.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::decimal::Amount;
use crate::error::Result;
use crate::ids::{BuildingMap, TierMap};

/// Current save schema version.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Practical ceiling on building levels.
pub const MAX_BUILDING_LEVEL: u32 = 10_000;

/// Top-level fields every persisted save document must carry.
pub const REQUIRED_FIELDS: [&str; 12] = [
    "version",
    "playerId",
    "timestamp",
    "lastSaveTime",
    "resources",
    "buildings",
    "purchasedUpgrades",
    "unlockedAchievements",
    "totalProduced",
    "totalPrestiges",
    "playTime",
    "settings",
];

/// Level and unlock flag of one building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BuildingState {
    /// Current level (0 means not built).
    pub level: u32,
    /// Set on first purchase; never reverts.
    pub unlocked: bool,
}

impl BuildingState {
    /// A building at `level`, unlocked if it has been built at all.
    #[must_use]
    pub const fn at_level(level: u32) -> Self {
        Self {
            level,
            unlocked: level > 0,
        }
    }

    /// Whether this building contributes production.
    #[must_use]
    pub const fn is_producing(&self) -> bool {
        self.unlocked && self.level > 0
    }
}

/// A player's persisted game state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSave {
    /// Save schema version, used for migration decisions.
    pub version: String,
    /// Owning player.
    pub player_id: String,
    /// Revision counter, bumped by every server write.
    #[serde(default)]
    pub revision: u64,
    /// Authoring time (ms since the Unix epoch).
    pub timestamp: i64,
    /// Time of the last save (ms since the Unix epoch).
    pub last_save_time: i64,
    /// Current wool stock per tier.
    pub resources: TierMap<Amount>,
    /// Building levels.
    pub buildings: BuildingMap<BuildingState>,
    /// Purchased upgrade ids.
    #[serde(default)]
    pub purchased_upgrades: BTreeSet<String>,
    /// Unlocked achievement ids.
    #[serde(default)]
    pub unlocked_achievements: BTreeSet<String>,
    /// Lifetime production since the last prestige.
    pub total_produced: Amount,
    /// Number of prestige resets.
    pub total_prestiges: u32,
    /// Total play time in seconds.
    pub play_time: u64,
    /// Opaque client settings.
    #[serde(default = "empty_object")]
    pub settings: Value,
    /// Integrity digest over the canonical fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl GameSave {
    /// A fresh save for a new player.
    #[must_use]
    pub fn new(player_id: impl Into<String>, now: i64) -> Self {
        Self {
            version: SCHEMA_VERSION.to_string(),
            player_id: player_id.into(),
            revision: 0,
            timestamp: now,
            last_save_time: now,
            resources: TierMap::default(),
            buildings: BuildingMap::default(),
            purchased_upgrades: BTreeSet::new(),
            unlocked_achievements: BTreeSet::new(),
            total_produced: Amount::zero(),
            total_prestiges: 0,
            play_time: 0,
            settings: empty_object(),
            checksum: None,
        }
    }

    /// Convert to a loose JSON document.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_document(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Strictly convert a (validated) JSON document into a typed save.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::WoolError::SaveFormat`] if any field has the
    /// wrong shape.
    pub fn from_document(document: Value) -> Result<Self> {
        Ok(serde_json::from_value(document)?)
    }

    /// Parse a typed save from JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed JSON or a wrong shape. Use
    /// [`crate::integrity::IntegrityEngine::load_save`] for untrusted input.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serialize to JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Build the default value of a required top-level field.
    ///
    /// Used when reconstructing structurally damaged documents.
    #[must_use]
    pub fn default_field(field: &str, now: i64) -> Value {
        match field {
            "version" => Value::String(SCHEMA_VERSION.to_string()),
            "playerId" => Value::String(String::new()),
            "timestamp" | "lastSaveTime" => Value::from(now),
            "resources" | "buildings" | "settings" => empty_object(),
            "purchasedUpgrades" | "unlockedAchievements" => Value::Array(Vec::new()),
            "totalProduced" => Value::String("0".to_string()),
            "totalPrestiges" | "playTime" | "revision" => Value::from(0),
            _ => Value::Null,
        }
    }
}
