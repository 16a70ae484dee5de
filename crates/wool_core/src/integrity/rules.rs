//! Validation rules, one visitor per field family.
//!
//! [`inspect`] walks a save document once: the structural pass first, then
//! resources, buildings, timestamps, counters, id references and finally
//! the checksum. A visitor only runs on a field whose container shape the
//! structural pass accepted, so one root cause produces one issue.

use serde_json::{Map, Number, Value};

use super::{
    describe, CorruptionIssue, CorruptionKind, FieldPath, IntegrityConfig, RepairStrategy,
    Severity,
};
use crate::catalog::Catalog;
use crate::checksum;
use crate::decimal::Amount;
use crate::ids::{BuildingType, ResourceTier};
use crate::save::{GameSave, REQUIRED_FIELDS};

/// Required fields that must hold JSON objects.
const OBJECT_FIELDS: [&str; 3] = ["resources", "buildings", "settings"];

/// Required fields that must hold JSON arrays.
const LIST_FIELDS: [&str; 2] = ["purchasedUpgrades", "unlockedAchievements"];

/// Run every rule against `document`.
#[must_use]
pub fn inspect(
    document: &Value,
    catalog: &Catalog,
    config: &IntegrityConfig,
    now: i64,
) -> Vec<CorruptionIssue> {
    let mut inspector = Inspector {
        catalog,
        config,
        now,
        issues: Vec::new(),
    };
    inspector.run(document);
    inspector.issues
}

/// A fresh, valid save document.
#[must_use]
pub fn default_document(config: &IntegrityConfig, now: i64) -> Value {
    let mut object = Map::new();
    for field in REQUIRED_FIELDS {
        object.insert(field.to_string(), default_field(config, field, now));
    }
    Value::Object(object)
}

fn default_field(config: &IntegrityConfig, field: &str, now: i64) -> Value {
    if field == "version" {
        Value::String(config.schema_version.clone())
    } else {
        GameSave::default_field(field, now)
    }
}

fn default_building() -> Value {
    serde_json::json!({"level": 0, "unlocked": false})
}

struct Inspector<'a> {
    catalog: &'a Catalog,
    config: &'a IntegrityConfig,
    now: i64,
    issues: Vec<CorruptionIssue>,
}

impl Inspector<'_> {
    fn flag(
        &mut self,
        kind: CorruptionKind,
        path: FieldPath,
        severity: Severity,
        expected: impl Into<String>,
        actual: Option<&Value>,
        strategy: RepairStrategy,
    ) {
        let id = format!("issue-{}", self.issues.len() + 1);
        self.issues.push(CorruptionIssue {
            id,
            kind,
            path,
            severity,
            expected: expected.into(),
            actual: describe(actual),
            repairable: !matches!(strategy, RepairStrategy::Unrepairable),
            strategy,
        });
    }

    fn run(&mut self, document: &Value) {
        let Some(object) = document.as_object() else {
            self.flag(
                CorruptionKind::StructuralCorruption,
                FieldPath::Root,
                Severity::Critical,
                "a save object",
                Some(document),
                RepairStrategy::Reconstruct(default_document(self.config, self.now)),
            );
            return;
        };

        self.check_structure(object);

        if let Some(Value::Object(resources)) = object.get("resources") {
            self.check_resources(resources);
        }
        if let Some(value) = object.get("totalProduced") {
            self.check_amount(FieldPath::Field("totalProduced".into()), value);
        }
        if let Some(Value::Object(buildings)) = object.get("buildings") {
            self.check_buildings(buildings);
        }
        self.check_timestamps(object);
        self.check_counters(object);
        self.check_identity(object);

        let catalog = self.catalog;
        if let Some(Value::Array(items)) = object.get("purchasedUpgrades") {
            self.check_references("purchasedUpgrades", items, |id| catalog.upgrade(id).is_some());
        }
        if let Some(Value::Array(items)) = object.get("unlockedAchievements") {
            self.check_references("unlockedAchievements", items, |id| {
                catalog.achievement(id).is_some()
            });
        }

        self.check_checksum(document, object);
    }

    /// Required fields present, containers of the right type.
    fn check_structure(&mut self, object: &Map<String, Value>) {
        for field in REQUIRED_FIELDS {
            let value = object.get(field);
            let shape_ok = match value {
                None => {
                    self.flag(
                        CorruptionKind::StructuralCorruption,
                        FieldPath::Field(field.into()),
                        Severity::Critical,
                        "required field",
                        None,
                        RepairStrategy::Reconstruct(default_field(self.config, field, self.now)),
                    );
                    continue;
                }
                Some(value) if OBJECT_FIELDS.contains(&field) => value.is_object(),
                Some(value) if LIST_FIELDS.contains(&field) => value.is_array(),
                Some(_) => true,
            };
            if !shape_ok {
                let expected = if OBJECT_FIELDS.contains(&field) {
                    "an object"
                } else {
                    "an array"
                };
                self.flag(
                    CorruptionKind::StructuralCorruption,
                    FieldPath::Field(field.into()),
                    Severity::Critical,
                    expected,
                    value,
                    RepairStrategy::Reconstruct(default_field(self.config, field, self.now)),
                );
            }
        }
    }

    fn check_resources(&mut self, resources: &Map<String, Value>) {
        for (key, value) in resources {
            if ResourceTier::from_key(key).is_none() {
                self.flag(
                    CorruptionKind::OrphanedData,
                    FieldPath::Resource(key.clone()),
                    Severity::Low,
                    "a known wool tier",
                    Some(value),
                    RepairStrategy::Drop,
                );
                continue;
            }
            self.check_amount(FieldPath::Resource(key.clone()), value);
        }
    }

    /// A decimal string in `[0, ceiling]`.
    fn check_amount(&mut self, path: FieldPath, value: &Value) {
        let config = self.config;
        let ceiling = &config.resource_ceiling;
        let expected = format!("a decimal string in [0, {ceiling}]");
        let zero = || Value::String("0".to_string());

        match value {
            Value::String(text) => match Amount::parse(text) {
                Err(_) => self.flag(
                    CorruptionKind::TypeMismatch,
                    path,
                    Severity::Medium,
                    expected,
                    Some(value),
                    RepairStrategy::Replace(zero()),
                ),
                Ok(amount) if amount.is_negative() => self.flag(
                    CorruptionKind::InvalidRange,
                    path,
                    Severity::Medium,
                    expected,
                    Some(value),
                    RepairStrategy::Replace(zero()),
                ),
                Ok(amount) if &amount > ceiling => {
                    let clamped = Value::String(ceiling.to_canonical_string());
                    self.flag(
                        CorruptionKind::InvalidRange,
                        path,
                        Severity::Medium,
                        expected,
                        Some(value),
                        RepairStrategy::Replace(clamped),
                    );
                }
                Ok(_) => {}
            },
            Value::Number(number) => {
                let repaired = Amount::parse(&number.to_string())
                    .map(|amount| amount.clamp_to(&Amount::zero(), ceiling))
                    .map(|amount| Value::String(amount.to_canonical_string()))
                    .unwrap_or_else(|_| zero());
                self.flag(
                    CorruptionKind::TypeMismatch,
                    path,
                    Severity::Low,
                    expected,
                    Some(value),
                    RepairStrategy::Replace(repaired),
                );
            }
            _ => self.flag(
                CorruptionKind::TypeMismatch,
                path,
                Severity::Medium,
                expected,
                Some(value),
                RepairStrategy::Replace(zero()),
            ),
        }
    }

    fn check_buildings(&mut self, buildings: &Map<String, Value>) {
        for (key, value) in buildings {
            if BuildingType::from_key(key).is_none() {
                self.flag(
                    CorruptionKind::OrphanedData,
                    FieldPath::Building(key.clone()),
                    Severity::Low,
                    "a known building type",
                    Some(value),
                    RepairStrategy::Drop,
                );
                continue;
            }
            let Some(record) = value.as_object() else {
                self.flag(
                    CorruptionKind::TypeMismatch,
                    FieldPath::Building(key.clone()),
                    Severity::High,
                    "an object with level and unlocked",
                    Some(value),
                    RepairStrategy::Replace(default_building()),
                );
                continue;
            };
            self.check_building(key, record);
        }
    }

    /// Integer level in `[0, max]`, boolean unlocked, and built implies unlocked.
    fn check_building(&mut self, key: &str, record: &Map<String, Value>) {
        let max = u64::from(self.config.max_building_level);
        let expected_level = format!("an integer in [0, {max}]");
        let raw_level = record.get("level");

        let level = match raw_level {
            Some(Value::Number(number)) => match number.as_u64() {
                Some(level) if level <= max => level,
                _ => {
                    let repaired = round_and_clamp(number, max);
                    self.flag(
                        CorruptionKind::InvalidRange,
                        FieldPath::BuildingField(key.into(), "level"),
                        Severity::Medium,
                        expected_level,
                        raw_level,
                        RepairStrategy::Replace(Value::from(repaired)),
                    );
                    repaired
                }
            },
            _ => {
                self.flag(
                    CorruptionKind::TypeMismatch,
                    FieldPath::BuildingField(key.into(), "level"),
                    Severity::Medium,
                    expected_level,
                    raw_level,
                    RepairStrategy::Replace(Value::from(0)),
                );
                0
            }
        };

        let raw_unlocked = record.get("unlocked");
        match raw_unlocked {
            Some(Value::Bool(false)) if level > 0 => self.flag(
                CorruptionKind::InvalidRange,
                FieldPath::BuildingField(key.into(), "unlocked"),
                Severity::Low,
                "unlocked once built",
                raw_unlocked,
                RepairStrategy::Replace(Value::Bool(true)),
            ),
            Some(Value::Bool(_)) => {}
            _ => self.flag(
                CorruptionKind::TypeMismatch,
                FieldPath::BuildingField(key.into(), "unlocked"),
                Severity::Low,
                "a boolean",
                raw_unlocked,
                RepairStrategy::Replace(Value::Bool(level > 0)),
            ),
        }
    }

    /// Both save times inside the plausible window and in order.
    fn check_timestamps(&mut self, object: &Map<String, Value>) {
        let earliest = self.config.earliest_timestamp;
        let latest = self.now.saturating_add(self.config.future_tolerance_ms);
        let expected = format!("ms timestamp in [{earliest}, {latest}]");

        let mut effective = [None, None];
        for (slot, field) in ["timestamp", "lastSaveTime"].into_iter().enumerate() {
            let Some(value) = object.get(field) else {
                continue;
            };
            let path = FieldPath::Field(field.into());
            match value.as_i64() {
                None => {
                    self.flag(
                        CorruptionKind::TypeMismatch,
                        path,
                        Severity::Medium,
                        expected.clone(),
                        Some(value),
                        RepairStrategy::Replace(Value::from(self.now)),
                    );
                    effective[slot] = Some(self.now);
                }
                Some(ms) if ms < earliest || ms > latest => {
                    let clamped = ms.clamp(earliest, latest);
                    self.flag(
                        CorruptionKind::TemporalInconsistency,
                        path,
                        Severity::Medium,
                        expected.clone(),
                        Some(value),
                        RepairStrategy::Replace(Value::from(clamped)),
                    );
                    effective[slot] = Some(clamped);
                }
                Some(ms) => effective[slot] = Some(ms),
            }
        }

        if let [Some(timestamp), Some(last_save)] = effective {
            if last_save > timestamp {
                self.flag(
                    CorruptionKind::TemporalInconsistency,
                    FieldPath::Field("lastSaveTime".into()),
                    Severity::Low,
                    "lastSaveTime <= timestamp",
                    object.get("lastSaveTime"),
                    RepairStrategy::SwapSaveTimes,
                );
            }
        }
    }

    /// Non-negative integer counters.
    fn check_counters(&mut self, object: &Map<String, Value>) {
        for (field, max) in [
            ("totalPrestiges", u64::from(u32::MAX)),
            ("playTime", u64::MAX),
            ("revision", u64::MAX),
        ] {
            let Some(value) = object.get(field) else {
                continue;
            };
            let path = FieldPath::Field(field.into());
            let expected = format!("an integer in [0, {max}]");
            match value {
                Value::Number(number) => match number.as_u64() {
                    Some(count) if count <= max => {}
                    _ => self.flag(
                        CorruptionKind::InvalidRange,
                        path,
                        Severity::Medium,
                        expected,
                        Some(value),
                        RepairStrategy::Replace(Value::from(round_and_clamp(number, max))),
                    ),
                },
                _ => self.flag(
                    CorruptionKind::TypeMismatch,
                    path,
                    Severity::Medium,
                    expected,
                    Some(value),
                    RepairStrategy::Replace(Value::from(0)),
                ),
            }
        }
    }

    /// `version` and `playerId` are strings.
    fn check_identity(&mut self, object: &Map<String, Value>) {
        if let Some(value) = object.get("version") {
            if !value.is_string() {
                self.flag(
                    CorruptionKind::TypeMismatch,
                    FieldPath::Field("version".into()),
                    Severity::Medium,
                    "a schema version string",
                    Some(value),
                    RepairStrategy::Replace(Value::String(self.config.schema_version.clone())),
                );
            }
        }
        if let Some(value) = object.get("playerId") {
            if !value.is_string() {
                let repaired = match value {
                    Value::Number(number) => number.to_string(),
                    _ => String::new(),
                };
                self.flag(
                    CorruptionKind::TypeMismatch,
                    FieldPath::Field("playerId".into()),
                    Severity::High,
                    "a player id string",
                    Some(value),
                    RepairStrategy::Replace(Value::String(repaired)),
                );
            }
        }
    }

    /// Every listed id resolves in the catalog.
    fn check_references(&mut self, list: &'static str, items: &[Value], known: impl Fn(&str) -> bool) {
        for item in items {
            let key = checksum::item_key(item);
            match item.as_str() {
                Some(id) if known(id) => {}
                Some(_) => self.flag(
                    CorruptionKind::MissingReference,
                    FieldPath::ListItem(list, key),
                    Severity::Low,
                    "a known catalog id",
                    Some(item),
                    RepairStrategy::Drop,
                ),
                None => self.flag(
                    CorruptionKind::TypeMismatch,
                    FieldPath::ListItem(list, key),
                    Severity::Low,
                    "an id string",
                    Some(item),
                    RepairStrategy::Drop,
                ),
            }
        }
    }

    /// A stored checksum matches the content.
    fn check_checksum(&mut self, document: &Value, object: &Map<String, Value>) {
        let Some(stored) = object.get("checksum") else {
            return;
        };
        let computed = checksum::document_checksum(document);
        if stored.as_str() != Some(computed.as_str()) {
            self.flag(
                CorruptionKind::ChecksumMismatch,
                FieldPath::Field("checksum".into()),
                Severity::High,
                computed,
                Some(stored),
                RepairStrategy::RegenerateChecksum,
            );
        }
    }
}

/// Round half up to an integer and clamp into `[0, max]`.
fn round_and_clamp(number: &Number, max: u64) -> u64 {
    let Ok(amount) = Amount::parse(&number.to_string()) else {
        return 0;
    };
    let rounded = (amount + Amount::scaled(5, 1)).floor();
    if rounded.is_negative() {
        return 0;
    }
    rounded.to_u64().map_or(max, |value| value.min(max))
}
