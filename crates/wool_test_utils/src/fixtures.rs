//! Test fixtures and helpers.
//!
//! Pre-built saves and damaged save documents with a fixed clock, for
//! consistent testing.

use std::sync::Arc;

use serde_json::{json, Value};
use wool_core::catalog::Catalog;
use wool_core::checksum;
use wool_core::decimal::Amount;
use wool_core::ids::{BuildingType, ResourceTier};
use wool_core::reconcile::SaveRecord;
use wool_core::save::{BuildingState, GameSave};

/// Fixed "current time" for tests: 2023-11-14T22:13:20Z in ms.
pub const NOW: i64 = 1_700_000_000_000;

/// One hour in ms.
pub const HOUR_MS: u64 = 3_600_000;

/// Parse a decimal literal.
///
/// # Panics
///
/// Panics if `text` is not a valid decimal (tests only).
#[must_use]
pub fn amount(text: &str) -> Amount {
    Amount::parse(text).unwrap_or_else(|e| panic!("bad test amount {text:?}: {e}"))
}

/// The built-in catalog behind an `Arc`, as the engines expect it.
#[must_use]
pub fn catalog() -> Arc<Catalog> {
    Arc::new(Catalog::llama_farm())
}

/// A mid-game save with a sealed checksum, last saved a minute before
/// [`NOW`].
#[must_use]
pub fn sample_save(player_id: &str) -> GameSave {
    let mut save = GameSave::new(player_id, NOW - 60_000);
    save.revision = 3;
    save.resources[ResourceTier::Basic] = amount("1500");
    save.resources[ResourceTier::Silver] = amount("42.5");
    save.buildings[BuildingType::Barn] = BuildingState::at_level(12);
    save.buildings[BuildingType::ShearingShed] = BuildingState::at_level(2);
    save.purchased_upgrades.insert("golden_shears".into());
    save.unlocked_achievements.insert("first_steps".into());
    save.total_produced = amount("25000");
    save.play_time = 5_400;
    save.settings = json!({"sound": true, "volume": 70});
    checksum::seal(&mut save);
    save
}

/// A stored record for `save`, written at `updated_at`.
#[must_use]
pub fn save_record(save: GameSave, updated_at: i64) -> SaveRecord {
    SaveRecord { save, updated_at }
}

/// [`sample_save`] as a loose JSON document.
///
/// # Panics
///
/// Panics if the save cannot be serialized (tests only).
#[must_use]
pub fn sample_document(player_id: &str) -> Value {
    sample_save(player_id)
        .to_document()
        .unwrap_or_else(|e| panic!("sample save did not serialize: {e}"))
}

/// [`sample_document`] with one top-level field removed.
#[must_use]
pub fn document_without(field: &str) -> Value {
    let mut document = sample_document("llama-1");
    if let Some(object) = document.as_object_mut() {
        object.remove(field);
    }
    document
}

/// A save document with one of each repairable problem:
///
/// - negative basic wool
/// - an orphaned resource key
/// - a building level above the ceiling
/// - a dangling upgrade id
/// - `lastSaveTime` after `timestamp`
/// - a stale checksum
#[must_use]
pub fn corrupted_save_document() -> Value {
    let mut document = sample_document("llama-1");
    document["resources"]["basic"] = json!("-5");
    document["resources"]["mythril"] = json!("10");
    document["buildings"]["barn"]["level"] = json!(12_000);
    document["purchasedUpgrades"] = json!(["golden_shears", "diamond_shears"]);
    document["timestamp"] = json!(NOW - 1_000);
    document["lastSaveTime"] = json!(NOW - 500);
    document
}
