//! Integrity digests for saves.
//!
//! The digest covers a canonical subset of the save (resources, buildings,
//! purchased upgrades, unlocked achievements, totals and play time). Object
//! keys are written in sorted order, every tier and building is present,
//! decimal strings are canonicalized and id lists are sorted and
//! de-duplicated, so a typed save and the JSON document it came from always
//! hash the same. The canonical text is hashed with SHA-256 and hex encoded.
//!
//! The digest detects corruption; it is not a tamper-proof MAC.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::decimal::Amount;
use crate::ids::{BuildingType, ResourceTier};
use crate::save::GameSave;

/// Save fields covered by the digest.
pub const CHECKSUM_FIELDS: [&str; 7] = [
    "resources",
    "buildings",
    "purchasedUpgrades",
    "unlockedAchievements",
    "totalProduced",
    "totalPrestiges",
    "playTime",
];

/// Digest of a typed save.
#[must_use]
pub fn generate(save: &GameSave) -> String {
    let mut resources = Map::new();
    for (tier, amount) in save.resources.iter() {
        resources.insert(
            tier.key().to_string(),
            Value::String(amount.to_canonical_string()),
        );
    }

    let mut buildings = Map::new();
    for (kind, state) in save.buildings.iter() {
        buildings.insert(
            kind.key().to_string(),
            building_value(state.level.into(), state.unlocked.into()),
        );
    }

    let mut view = Map::new();
    view.insert("resources".into(), Value::Object(resources));
    view.insert("buildings".into(), Value::Object(buildings));
    view.insert("purchasedUpgrades".into(), string_array(&save.purchased_upgrades));
    view.insert(
        "unlockedAchievements".into(),
        string_array(&save.unlocked_achievements),
    );
    view.insert(
        "totalProduced".into(),
        Value::String(save.total_produced.to_canonical_string()),
    );
    view.insert("totalPrestiges".into(), Value::from(save.total_prestiges));
    view.insert("playTime".into(), Value::from(save.play_time));

    document_checksum(&Value::Object(view))
}

/// Digest of a loose save document. Fields outside [`CHECKSUM_FIELDS`]
/// are ignored, as are unknown tier and building keys. Absent maps hash
/// like empty ones.
#[must_use]
pub fn document_checksum(document: &Value) -> String {
    let payload = canonical_payload(document);
    let mut text = String::new();
    write_canonical(&payload, &mut text);

    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Store a fresh digest on the save.
pub fn seal(save: &mut GameSave) {
    save.checksum = Some(generate(save));
}

/// Whether `checksum` matches the save's current content.
#[must_use]
pub fn verify(save: &GameSave, checksum: &str) -> bool {
    generate(save) == checksum
}

/// Check the document's own `checksum` field.
///
/// Returns `None` when the document carries no checksum string.
#[must_use]
pub fn verify_document(document: &Value) -> Option<bool> {
    let stored = document.get("checksum")?.as_str()?;
    Some(document_checksum(document) == stored)
}

/// Normalized subset of `document` that the digest covers.
#[must_use]
pub fn canonical_payload(document: &Value) -> Value {
    let mut payload = Map::new();

    let empty = Map::new();

    payload.insert(
        "resources".into(),
        match document.get("resources") {
            Some(Value::Object(map)) => canonical_resources(map),
            None => canonical_resources(&empty),
            Some(other) => other.clone(),
        },
    );

    payload.insert(
        "buildings".into(),
        match document.get("buildings") {
            Some(Value::Object(map)) => canonical_buildings(map),
            None => canonical_buildings(&empty),
            Some(other) => other.clone(),
        },
    );

    for field in ["purchasedUpgrades", "unlockedAchievements"] {
        let value = match document.get(field) {
            Some(Value::Array(items)) => {
                let mut keyed: BTreeMap<String, Value> = BTreeMap::new();
                for item in items {
                    keyed.insert(item_key(item), item.clone());
                }
                Value::Array(keyed.into_values().collect())
            }
            Some(other) => other.clone(),
            None => Value::Array(Vec::new()),
        };
        payload.insert(field.into(), value);
    }

    payload.insert(
        "totalProduced".into(),
        canonical_amount(document.get("totalProduced")),
    );
    for field in ["totalPrestiges", "playTime"] {
        payload.insert(
            field.into(),
            document.get(field).cloned().unwrap_or_else(|| Value::from(0)),
        );
    }

    Value::Object(payload)
}

/// Sort key for id list entries: strings by content, anything else by its
/// JSON text.
#[must_use]
pub fn item_key(item: &Value) -> String {
    match item {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn canonical_resources(map: &Map<String, Value>) -> Value {
    let mut out = Map::new();
    for tier in ResourceTier::ALL {
        out.insert(tier.key().to_string(), canonical_amount(map.get(tier.key())));
    }
    Value::Object(out)
}

fn canonical_buildings(map: &Map<String, Value>) -> Value {
    let mut out = Map::new();
    for kind in BuildingType::ALL {
        let entry = match map.get(kind.key()) {
            None => building_value(Value::from(0), Value::Bool(false)),
            Some(Value::Object(record)) => building_value(
                record.get("level").cloned().unwrap_or_else(|| Value::from(0)),
                record.get("unlocked").cloned().unwrap_or(Value::Bool(false)),
            ),
            Some(other) => other.clone(),
        };
        out.insert(kind.key().to_string(), entry);
    }
    Value::Object(out)
}

fn building_value(level: Value, unlocked: Value) -> Value {
    let mut record = Map::new();
    record.insert("level".into(), level);
    record.insert("unlocked".into(), unlocked);
    Value::Object(record)
}

fn string_array<'a>(items: impl IntoIterator<Item = &'a String>) -> Value {
    Value::Array(items.into_iter().cloned().map(Value::String).collect())
}

fn canonical_amount(value: Option<&Value>) -> Value {
    match value {
        None => Value::String("0".to_string()),
        Some(Value::String(text)) => match Amount::parse(text) {
            Ok(amount) => Value::String(amount.to_canonical_string()),
            Err(_) => Value::String(text.clone()),
        },
        Some(Value::Number(number)) => match Amount::parse(&number.to_string()) {
            Ok(amount) => Value::String(amount.to_canonical_string()),
            Err(_) => Value::Number(number.clone()),
        },
        Some(other) => other.clone(),
    }
}

/// Write `value` as compact JSON with object keys in sorted order,
/// independent of how the `Map` orders them.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                if let Some(inner) = map.get(key) {
                    write_canonical(inner, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::save::BuildingState;

    const NOW: i64 = 1_700_000_000_000;

    fn sample() -> GameSave {
        let mut save = GameSave::new("llama-1", NOW);
        save.resources[ResourceTier::Basic] = Amount::parse("1234.5").unwrap();
        save.buildings[BuildingType::Barn] = BuildingState::at_level(7);
        save.purchased_upgrades.insert("golden_shears".into());
        save.unlocked_achievements.insert("first_steps".into());
        save.total_produced = Amount::from_int(5_000);
        save.play_time = 3_600;
        save
    }

    #[test]
    fn test_generate_then_verify() {
        let save = sample();
        let digest = generate(&save);
        assert_eq!(digest.len(), 64);
        assert!(verify(&save, &digest));
    }

    #[test]
    fn test_mutation_breaks_stale_checksum() {
        let mut save = sample();
        let digest = generate(&save);
        save.resources[ResourceTier::Basic] = Amount::from_int(1);
        assert!(!verify(&save, &digest));
    }

    #[test]
    fn test_excluded_fields_do_not_affect_digest() {
        let mut save = sample();
        let digest = generate(&save);
        save.timestamp += 1_000;
        save.settings = serde_json::json!({"music": false});
        save.revision = 9;
        assert!(verify(&save, &digest));
    }

    #[test]
    fn test_typed_and_document_digests_agree() {
        let save = sample();
        let doc = save.to_document().unwrap();
        assert_eq!(document_checksum(&doc), generate(&save));
    }

    #[test]
    fn test_document_normalization() {
        let save = sample();
        let mut doc = save.to_document().unwrap();
        // Trailing zeros, missing zero tiers, unknown keys and unsorted ids
        // are all canonicalized away.
        doc["resources"] = serde_json::json!({"basic": "1234.50", "mythril": "9"});
        doc["purchasedUpgrades"] = serde_json::json!(["golden_shears", "golden_shears"]);
        assert_eq!(document_checksum(&doc), generate(&save));
    }

    #[test]
    fn test_verify_document() {
        let mut save = sample();
        assert_eq!(verify_document(&save.to_document().unwrap()), None);
        seal(&mut save);
        let mut doc = save.to_document().unwrap();
        assert_eq!(verify_document(&doc), Some(true));
        doc["playTime"] = Value::from(1);
        assert_eq!(verify_document(&doc), Some(false));
    }
}
