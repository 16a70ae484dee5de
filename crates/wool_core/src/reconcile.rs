//! Client/server save reconciliation.
//!
//! A sync carries the client's save plus the time of its last successful
//! sync. The server's stored copy conflicts with it when the server was
//! written after that point *and* the two revision counters differ.
//! Conflicts are resolved per [`ConflictPolicy`]; without a policy both
//! copies go back to the caller untouched.
//!
//! Every outcome that writes a save carries a freshly sealed checksum.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::checksum;
use crate::decimal::Amount;
use crate::ids::{BuildingMap, TierMap};
use crate::save::{BuildingState, GameSave};

/// How to resolve a detected conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// The client copy wins outright.
    Client,
    /// The stored server copy is kept.
    Server,
    /// Deep-merge both copies.
    Merge,
    /// Hand both copies back to the caller. Unknown policy names land here.
    #[serde(other)]
    Manual,
}

/// Which path a reconciliation took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Resolution {
    /// No stored copy existed.
    FirstWrite,
    /// No conflict; the client copy replaced the stored one.
    Overwrite,
    /// Client and server already agree.
    Unchanged,
    /// Conflict resolved in the client's favor.
    Client,
    /// Conflict resolved in the server's favor.
    Server,
    /// Conflict resolved by merging.
    Merge,
    /// Conflict left to the caller.
    Manual,
}

impl Resolution {
    /// Stable tag used in responses and logs.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::FirstWrite => "first-write",
            Self::Overwrite => "overwrite",
            Self::Unchanged => "unchanged",
            Self::Client => "client",
            Self::Server => "server",
            Self::Merge => "merge",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A stored save and the time it was last written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRecord {
    /// The stored save.
    pub save: GameSave,
    /// Last write time (ms since the Unix epoch).
    pub updated_at: i64,
}

/// Result of [`reconcile`].
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// A new record must be persisted.
    Write {
        /// Record to persist; its checksum is sealed.
        record: SaveRecord,
        /// Whether a conflict was detected.
        conflict: bool,
        /// Path taken.
        resolution: Resolution,
    },
    /// The stored record stays as it is.
    Keep {
        /// The stored record.
        record: SaveRecord,
        /// Whether a conflict was detected.
        conflict: bool,
        /// Path taken.
        resolution: Resolution,
    },
    /// Unresolved conflict; nothing is written.
    Manual {
        /// Stored copy.
        server: SaveRecord,
        /// Incoming copy.
        client: GameSave,
    },
}

impl Reconciliation {
    /// Whether a conflict was detected.
    #[must_use]
    pub fn conflict(&self) -> bool {
        match self {
            Self::Write { conflict, .. } | Self::Keep { conflict, .. } => *conflict,
            Self::Manual { .. } => true,
        }
    }

    /// Path taken.
    #[must_use]
    pub fn resolution(&self) -> Resolution {
        match self {
            Self::Write { resolution, .. } | Self::Keep { resolution, .. } => *resolution,
            Self::Manual { .. } => Resolution::Manual,
        }
    }

    /// Build the wire response.
    #[must_use]
    pub fn into_response(self, now: i64) -> SyncResponse {
        let conflict = self.conflict();
        let resolution = Some(self.resolution());
        let (game_state, server_state) = match self {
            Self::Write { record, .. } | Self::Keep { record, .. } => (record.save, None),
            Self::Manual { server, client } => (client, Some(server.save)),
        };
        SyncResponse {
            game_state,
            conflict,
            resolution,
            server_state,
            timestamp: now,
        }
    }
}

/// Incoming sync payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    /// Client save.
    pub game_state: GameSave,
    /// Time of the client's last successful sync.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<i64>,
    /// Policy to apply on conflict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict_resolution: Option<ConflictPolicy>,
}

/// Outgoing sync payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    /// Canonical save after the sync (the client copy for manual conflicts).
    pub game_state: GameSave,
    /// Whether a conflict was detected.
    pub conflict: bool,
    /// Path taken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    /// Stored copy, present only for manual conflicts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_state: Option<GameSave>,
    /// Response time (ms since the Unix epoch).
    pub timestamp: i64,
}

/// Whether `client` conflicts with the stored record.
///
/// An absent `last_sync_time` counts as "never synced" (0).
#[must_use]
pub fn is_conflict(server: &SaveRecord, client: &GameSave, last_sync_time: Option<i64>) -> bool {
    server.updated_at > last_sync_time.unwrap_or(0) && server.save.revision != client.revision
}

/// Decide what to persist for an incoming client save.
#[must_use]
pub fn reconcile(
    server: Option<&SaveRecord>,
    client: GameSave,
    last_sync_time: Option<i64>,
    policy: Option<ConflictPolicy>,
    now: i64,
) -> Reconciliation {
    let Some(server) = server else {
        let revision = client.revision.saturating_add(1);
        return write(client, revision, now, false, Resolution::FirstWrite);
    };

    if !is_conflict(server, &client, last_sync_time) {
        if same_content(&server.save, &client) {
            return Reconciliation::Keep {
                record: server.clone(),
                conflict: false,
                resolution: Resolution::Unchanged,
            };
        }
        let revision = next_revision(&server.save, &client);
        return write(client, revision, now, false, Resolution::Overwrite);
    }

    tracing::warn!(
        player = %client.player_id,
        server_revision = server.save.revision,
        client_revision = client.revision,
        ?policy,
        "Save conflict"
    );

    match policy.unwrap_or(ConflictPolicy::Manual) {
        ConflictPolicy::Client => {
            let revision = next_revision(&server.save, &client);
            write(client, revision, now, true, Resolution::Client)
        }
        ConflictPolicy::Server => Reconciliation::Keep {
            record: server.clone(),
            conflict: true,
            resolution: Resolution::Server,
        },
        ConflictPolicy::Merge => {
            let merged = merge_saves(&server.save, &client);
            let revision = merged.revision;
            write(merged, revision, now, true, Resolution::Merge)
        }
        ConflictPolicy::Manual => Reconciliation::Manual {
            server: server.clone(),
            client,
        },
    }
}

fn next_revision(server: &GameSave, client: &GameSave) -> u64 {
    server.revision.max(client.revision).saturating_add(1)
}

fn write(
    mut save: GameSave,
    revision: u64,
    now: i64,
    conflict: bool,
    resolution: Resolution,
) -> Reconciliation {
    save.revision = revision;
    checksum::seal(&mut save);
    Reconciliation::Write {
        record: SaveRecord {
            save,
            updated_at: now,
        },
        conflict,
        resolution,
    }
}

fn same_content(a: &GameSave, b: &GameSave) -> bool {
    let strip = |save: &GameSave| GameSave {
        checksum: None,
        ..save.clone()
    };
    strip(a) == strip(b)
}

/// Merge two diverged saves without losing progress from either side.
///
/// Counters and totals take the larger value, id sets are unioned, the
/// higher-level building record wins (with `unlocked` ORed), and `settings`
/// are merged with [`merge_values`]. Identity fields come from the client.
/// The result has revision `max + 1` and a sealed checksum.
#[must_use]
pub fn merge_saves(server: &GameSave, client: &GameSave) -> GameSave {
    let resources = TierMap::from_fn(|tier| {
        server.resources[tier]
            .max_of(&client.resources[tier])
            .clone()
    });
    let buildings = BuildingMap::from_fn(|kind| merge_building(server.buildings[kind], client.buildings[kind]));

    let mut merged = GameSave {
        version: client.version.clone(),
        player_id: client.player_id.clone(),
        revision: next_revision(server, client),
        timestamp: server.timestamp.max(client.timestamp),
        last_save_time: server.last_save_time.max(client.last_save_time),
        resources,
        buildings,
        purchased_upgrades: server
            .purchased_upgrades
            .union(&client.purchased_upgrades)
            .cloned()
            .collect(),
        unlocked_achievements: server
            .unlocked_achievements
            .union(&client.unlocked_achievements)
            .cloned()
            .collect(),
        total_produced: server.total_produced.max_of(&client.total_produced).clone(),
        total_prestiges: server.total_prestiges.max(client.total_prestiges),
        play_time: server.play_time.max(client.play_time),
        settings: merge_values(&server.settings, &client.settings),
        checksum: None,
    };
    checksum::seal(&mut merged);
    merged
}

fn merge_building(server: BuildingState, client: BuildingState) -> BuildingState {
    BuildingState {
        level: server.level.max(client.level),
        unlocked: server.unlocked || client.unlocked,
    }
}

/// Type-aware deep merge of two JSON values.
///
/// Numbers take the larger value, arrays the de-duplicated union (server
/// order first), objects merge key by key, and every other combination
/// takes the client value.
#[must_use]
pub fn merge_values(server: &Value, client: &Value) -> Value {
    match (server, client) {
        (Value::Number(a), Value::Number(b)) => {
            if compare_numbers(a, b) == Ordering::Greater {
                server.clone()
            } else {
                client.clone()
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            let mut union: Vec<Value> = Vec::with_capacity(a.len() + b.len());
            for item in a.iter().chain(b) {
                if !union.contains(item) {
                    union.push(item.clone());
                }
            }
            Value::Array(union)
        }
        (Value::Object(a), Value::Object(b)) => {
            let mut merged = Map::new();
            for (key, value) in a {
                let entry = match b.get(key) {
                    Some(other) => merge_values(value, other),
                    None => value.clone(),
                };
                merged.insert(key.clone(), entry);
            }
            for (key, value) in b {
                if !a.contains_key(key) {
                    merged.insert(key.clone(), value.clone());
                }
            }
            Value::Object(merged)
        }
        _ => client.clone(),
    }
}

/// Exact ordering of two JSON numbers, via their decimal text.
fn compare_numbers(a: &serde_json::Number, b: &serde_json::Number) -> Ordering {
    match (Amount::parse(&a.to_string()), Amount::parse(&b.to_string())) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{BuildingType, ResourceTier};
    use serde_json::json;

    const NOW: i64 = 1_700_000_000_000;

    fn amt(s: &str) -> Amount {
        Amount::parse(s).unwrap()
    }

    fn save(revision: u64, basic: &str) -> GameSave {
        let mut save = GameSave::new("llama-1", NOW - 10_000);
        save.revision = revision;
        save.resources[ResourceTier::Basic] = amt(basic);
        save
    }

    fn record(save: GameSave, updated_at: i64) -> SaveRecord {
        SaveRecord { save, updated_at }
    }

    #[test]
    fn test_first_write_accepts_client() {
        let outcome = reconcile(None, save(0, "5"), None, None, NOW);
        match outcome {
            Reconciliation::Write {
                record,
                conflict,
                resolution,
            } => {
                assert!(!conflict);
                assert_eq!(resolution, Resolution::FirstWrite);
                assert_eq!(record.save.revision, 1);
                assert_eq!(record.updated_at, NOW);
                assert!(checksum::verify(&record.save, record.save.checksum.as_deref().unwrap()));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_no_conflict_overwrites() {
        let server = record(save(2, "100"), NOW - 5_000);
        // Client synced after the server's last write.
        let outcome = reconcile(Some(&server), save(2, "150"), Some(NOW - 1_000), None, NOW);
        assert!(!outcome.conflict());
        assert_eq!(outcome.resolution(), Resolution::Overwrite);
        let response = outcome.into_response(NOW);
        assert_eq!(response.game_state.revision, 3);
        assert_eq!(response.game_state.resources[ResourceTier::Basic], amt("150"));
    }

    #[test]
    fn test_reconcile_with_self_is_unchanged() {
        let mut stored = save(4, "77");
        checksum::seal(&mut stored);
        let server = record(stored.clone(), NOW - 5_000);
        let outcome = reconcile(Some(&server), stored, Some(0), Some(ConflictPolicy::Merge), NOW);
        assert_eq!(
            outcome,
            Reconciliation::Keep {
                record: server,
                conflict: false,
                resolution: Resolution::Unchanged,
            }
        );
    }

    #[test]
    fn test_server_policy_keeps_stored_copy() {
        let server = record(save(2, "100"), NOW - 5_000);
        let outcome = reconcile(
            Some(&server),
            save(3, "150"),
            Some(NOW - 9_000),
            Some(ConflictPolicy::Server),
            NOW,
        );
        assert!(outcome.conflict());
        let response = outcome.into_response(NOW);
        assert_eq!(response.resolution, Some(Resolution::Server));
        assert_eq!(response.game_state, server.save);
    }

    #[test]
    fn test_client_policy_overrides() {
        let server = record(save(5, "900"), NOW - 5_000);
        let outcome = reconcile(
            Some(&server),
            save(3, "150"),
            None,
            Some(ConflictPolicy::Client),
            NOW,
        );
        let response = outcome.into_response(NOW);
        assert!(response.conflict);
        assert_eq!(response.game_state.revision, 6);
        assert_eq!(response.game_state.resources[ResourceTier::Basic], amt("150"));
    }

    #[test]
    fn test_missing_policy_returns_both_copies() {
        let server = record(save(2, "100"), NOW - 5_000);
        let client = save(3, "150");
        let outcome = reconcile(Some(&server), client.clone(), None, None, NOW);
        let response = outcome.into_response(NOW);
        assert!(response.conflict);
        assert_eq!(response.resolution, Some(Resolution::Manual));
        assert_eq!(response.game_state, client);
        assert_eq!(response.server_state, Some(server.save));
    }

    #[test]
    fn test_merge_takes_max_and_bumps_revision() {
        let server = record(save(2, "100"), NOW - 5_000);
        let outcome = reconcile(
            Some(&server),
            save(3, "150"),
            Some(NOW - 9_000),
            Some(ConflictPolicy::Merge),
            NOW,
        );
        let response = outcome.into_response(NOW);
        assert_eq!(response.resolution, Some(Resolution::Merge));
        assert_eq!(response.game_state.resources[ResourceTier::Basic], amt("150"));
        assert_eq!(response.game_state.revision, 4);
    }

    #[test]
    fn test_building_merge_keeps_level_and_unlock_together() {
        let mut server = save(1, "0");
        server.buildings[BuildingType::Barn] = BuildingState::at_level(8);
        let mut client = save(2, "0");
        client.buildings[BuildingType::Barn] = BuildingState::at_level(3);
        client.buildings[BuildingType::ShearingShed] = BuildingState::at_level(1);

        let merged = merge_saves(&server, &client);
        assert_eq!(merged.buildings[BuildingType::Barn], BuildingState::at_level(8));
        assert_eq!(merged.buildings[BuildingType::ShearingShed], BuildingState::at_level(1));
    }

    #[test]
    fn test_merge_unions_id_sets() {
        let mut server = save(1, "0");
        server.purchased_upgrades.insert("golden_shears".into());
        let mut client = save(2, "0");
        client.purchased_upgrades.insert("llama_feed".into());
        client.purchased_upgrades.insert("golden_shears".into());

        let merged = merge_saves(&server, &client);
        assert_eq!(merged.purchased_upgrades.len(), 2);
    }

    #[test]
    fn test_merge_values_rules() {
        let server = json!({
            "volume": 7,
            "tags": ["a", "b"],
            "theme": "dark",
            "audio": {"music": 0.5, "sfx": true},
            "serverOnly": 1
        });
        let client = json!({
            "volume": 3,
            "tags": ["b", "c"],
            "theme": "light",
            "audio": {"music": 0.8, "sfx": false},
            "clientOnly": 2
        });
        let merged = merge_values(&server, &client);
        assert_eq!(
            merged,
            json!({
                "volume": 7,
                "tags": ["a", "b", "c"],
                "theme": "light",
                "audio": {"music": 0.8, "sfx": false},
                "serverOnly": 1,
                "clientOnly": 2
            })
        );
    }

    #[test]
    fn test_unknown_policy_name_is_manual() {
        let policy: ConflictPolicy = serde_json::from_str("\"coin-flip\"").unwrap();
        assert_eq!(policy, ConflictPolicy::Manual);
        let policy: ConflictPolicy = serde_json::from_str("\"merge\"").unwrap();
        assert_eq!(policy, ConflictPolicy::Merge);
    }

    #[test]
    fn test_sync_request_wire_shape() {
        let request = SyncRequest {
            game_state: save(1, "10"),
            last_sync_time: Some(NOW),
            conflict_resolution: Some(ConflictPolicy::Merge),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("gameState").is_some());
        assert_eq!(value["lastSyncTime"], json!(NOW));
        assert_eq!(value["conflictResolution"], json!("merge"));
    }
}
