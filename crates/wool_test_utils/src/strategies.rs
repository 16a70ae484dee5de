//! Proptest strategies for saves, amounts and save damage.
//!
//! These strategies generate random but reproducible inputs for
//! property-based testing of merge, checksum and repair behavior.

use proptest::prelude::*;
use serde_json::{json, Value};
use wool_core::checksum;
use wool_core::decimal::Amount;
use wool_core::ids::{BuildingMap, BuildingType, ResourceTier, TierMap};
use wool_core::save::{BuildingState, GameSave, REQUIRED_FIELDS};

use crate::fixtures::NOW;

/// Upgrade ids defined by the built-in catalog.
pub const UPGRADE_IDS: [&str; 6] = [
    "barn_expansion",
    "golden_shears",
    "llama_feed",
    "mill_automation",
    "sturdy_gloves",
    "quantum_clicker",
];

/// Achievement ids defined by the built-in catalog.
pub const ACHIEVEMENT_IDS: [&str; 5] = [
    "first_steps",
    "wool_baron",
    "cosmic_herder",
    "prestige_llama",
    "quantum_leap",
];

const DAY_MS: i64 = 86_400_000;

/// Non-negative amounts with up to four decimal places.
///
/// Range: 0 to 1e18
pub fn arb_amount() -> impl Strategy<Value = Amount> {
    (0i64..1_000_000_000_000_000_000, 0i64..=4)
        .prop_map(|(mantissa, scale)| Amount::scaled(mantissa, scale))
}

/// Amounts spanning the late game, up to `9.99e99`.
pub fn arb_large_amount() -> impl Strategy<Value = Amount> {
    (1i64..1_000, 0i64..=97)
        .prop_map(|(mantissa, exponent)| Amount::scaled(mantissa, -exponent))
}

/// Building levels inside the allowed range (0-500).
pub fn arb_building_state() -> impl Strategy<Value = BuildingState> {
    (0u32..500).prop_map(BuildingState::at_level)
}

/// Opaque client settings.
pub fn arb_settings() -> impl Strategy<Value = Value> {
    (
        any::<bool>(),
        0u32..=100,
        proptest::sample::subsequence(vec!["en", "fr", "de", "ja"], 0..=4),
    )
        .prop_map(|(sound, volume, languages)| {
            json!({"sound": sound, "volume": volume, "languages": languages})
        })
}

/// A healthy save with a sealed checksum, last saved within 30 days of
/// [`NOW`].
pub fn arb_save() -> impl Strategy<Value = GameSave> {
    (
        proptest::collection::vec(arb_amount(), ResourceTier::COUNT),
        proptest::collection::vec(arb_building_state(), BuildingType::COUNT),
        proptest::sample::subsequence(UPGRADE_IDS.to_vec(), 0..=UPGRADE_IDS.len()),
        proptest::sample::subsequence(ACHIEVEMENT_IDS.to_vec(), 0..=ACHIEVEMENT_IDS.len()),
        arb_amount(),
        0u32..20,
        0u64..10_000_000,
        0u64..50,
        0i64..30 * DAY_MS,
        arb_settings(),
    )
        .prop_map(
            |(
                resources,
                buildings,
                upgrades,
                achievements,
                total,
                prestiges,
                play_time,
                revision,
                age,
                settings,
            )| {
                let mut save = GameSave::new("llama-prop", NOW - age);
                save.revision = revision;
                save.resources = TierMap::from_fn(|tier| resources[tier.index()].clone());
                save.buildings = BuildingMap::from_fn(|kind| buildings[kind.index()]);
                save.purchased_upgrades = upgrades.into_iter().map(String::from).collect();
                save.unlocked_achievements = achievements.into_iter().map(String::from).collect();
                save.total_produced = total;
                save.total_prestiges = prestiges;
                save.play_time = play_time;
                save.settings = settings;
                checksum::seal(&mut save);
                save
            },
        )
}

/// One kind of damage a persisted save can suffer.
#[derive(Debug, Clone)]
pub enum Damage {
    /// A resource set to a negative amount.
    NegativeResource(ResourceTier),
    /// A resource set to a non-numeric string.
    GarbageResource(ResourceTier),
    /// A resource far above the sanity ceiling.
    HugeResource(ResourceTier),
    /// A resource key for a tier that does not exist.
    OrphanedResource,
    /// A building level outside `[0, 10000]`.
    BuildingLevel(BuildingType, i64),
    /// A building record that is not an object.
    BuildingNotObject(BuildingType),
    /// An upgrade id missing from the catalog.
    DanglingUpgrade,
    /// A required top-level field removed.
    MissingField(&'static str),
    /// `lastSaveTime` moved a minute after `timestamp`.
    SwappedTimes,
    /// Timestamp years in the future.
    FutureTimestamp,
    /// Checksum overwritten with junk.
    StaleChecksum,
    /// Revision set to a negative number or a word.
    BadRevision(bool),
}

impl Damage {
    /// Apply the damage to a save document.
    pub fn apply(&self, document: &mut Value) {
        match self {
            Self::NegativeResource(tier) => {
                set(document, "resources", tier.key(), json!("-17.5"));
            }
            Self::GarbageResource(tier) => {
                set(document, "resources", tier.key(), json!("lots of wool"));
            }
            Self::HugeResource(tier) => set(document, "resources", tier.key(), json!("1e250")),
            Self::OrphanedResource => set(document, "resources", "mythril", json!("12")),
            Self::BuildingLevel(kind, level) => {
                if let Some(record) = document
                    .get_mut("buildings")
                    .and_then(|buildings| buildings.get_mut(kind.key()))
                    .and_then(Value::as_object_mut)
                {
                    record.insert("level".into(), json!(level));
                }
            }
            Self::BuildingNotObject(kind) => set(document, "buildings", kind.key(), json!(7)),
            Self::DanglingUpgrade => {
                if let Some(list) = document
                    .get_mut("purchasedUpgrades")
                    .and_then(Value::as_array_mut)
                {
                    list.push(json!("diamond_shears"));
                }
            }
            Self::MissingField(field) => {
                if let Some(object) = document.as_object_mut() {
                    object.remove(*field);
                }
            }
            Self::SwappedTimes => {
                if let Some(object) = document.as_object_mut() {
                    if let Some(timestamp) = object.get("timestamp").and_then(Value::as_i64) {
                        object.insert("lastSaveTime".into(), json!(timestamp + 60_000));
                    }
                }
            }
            Self::FutureTimestamp => {
                if let Some(object) = document.as_object_mut() {
                    object.insert("timestamp".into(), json!(NOW + 5 * 365 * DAY_MS));
                }
            }
            Self::StaleChecksum => {
                if let Some(object) = document.as_object_mut() {
                    object.insert("checksum".into(), json!("0badc0de"));
                }
            }
            Self::BadRevision(negative) => {
                if let Some(object) = document.as_object_mut() {
                    let value = if *negative { json!(-1) } else { json!("seven") };
                    object.insert("revision".into(), value);
                }
            }
        }
    }
}

fn set(document: &mut Value, map: &str, key: &str, value: Value) {
    if let Some(object) = document.get_mut(map).and_then(Value::as_object_mut) {
        object.insert(key.to_string(), value);
    }
}

fn arb_tier() -> impl Strategy<Value = ResourceTier> {
    proptest::sample::select(ResourceTier::ALL.to_vec())
}

fn arb_building() -> impl Strategy<Value = BuildingType> {
    proptest::sample::select(BuildingType::ALL.to_vec())
}

/// Any single [`Damage`].
pub fn arb_damage() -> impl Strategy<Value = Damage> {
    prop_oneof![
        arb_tier().prop_map(Damage::NegativeResource),
        arb_tier().prop_map(Damage::GarbageResource),
        arb_tier().prop_map(Damage::HugeResource),
        Just(Damage::OrphanedResource),
        (arb_building(), prop_oneof![-50i64..0, 10_001i64..1_000_000])
            .prop_map(|(kind, level)| Damage::BuildingLevel(kind, level)),
        arb_building().prop_map(Damage::BuildingNotObject),
        Just(Damage::DanglingUpgrade),
        proptest::sample::select(REQUIRED_FIELDS.to_vec()).prop_map(Damage::MissingField),
        Just(Damage::SwappedTimes),
        Just(Damage::FutureTimestamp),
        Just(Damage::StaleChecksum),
        any::<bool>().prop_map(Damage::BadRevision),
    ]
}

/// A healthy save document with up to `max_damage` kinds of damage applied.
pub fn arb_damaged_document(max_damage: usize) -> impl Strategy<Value = Value> {
    (arb_save(), proptest::collection::vec(arb_damage(), 1..=max_damage)).prop_map(
        |(save, damage)| {
            let mut document = serde_json::to_value(&save).unwrap_or(Value::Null);
            for item in &damage {
                item.apply(&mut document);
            }
            document
        },
    )
}
