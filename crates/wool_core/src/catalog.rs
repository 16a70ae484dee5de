//! Static content tables: wool tiers, buildings, upgrades and achievements.
//!
//! The catalog is pure, read-only data. Engines receive it as an
//! `Arc<Catalog>` at construction time; nothing in the core reads a global.
//! A catalog can be built in code ([`Catalog::llama_farm`]) or loaded from a
//! RON document ([`Catalog::from_ron`]).
//!
//! # Example RON
//!
//! ```ron
//! (
//!     tiers: [
//!         (tier: basic, name: "Basic Wool", base_value: "1", production_rate: "1", unlock_cost: "0"),
//!         // ...one entry per tier
//!     ],
//!     buildings: [
//!         (
//!             kind: barn,
//!             name: "Barn",
//!             base_cost: "10",
//!             cost_multiplier: "1.15",
//!             base_production: "1",
//!             produces: [basic],
//!             unlock: None,
//!         ),
//!         // ...one entry per building
//!     ],
//!     upgrades: [],
//!     achievements: [],
//! )
//! ```

use serde::{Deserialize, Serialize};

use crate::decimal::Amount;
use crate::error::{Result, WoolError};
use crate::ids::{BuildingType, ResourceTier};
use crate::integrity::{validate_catalog, CorruptionReport};

/// Properties of one wool tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierDef {
    /// Tier this entry describes.
    pub tier: ResourceTier,
    /// Display name.
    pub name: String,
    /// Monetary worth of one unit.
    pub base_value: Amount,
    /// Relative production weight, used for balance reporting.
    pub production_rate: Amount,
    /// Lifetime production needed before the tier is revealed.
    pub unlock_cost: Amount,
}

/// Building that must reach a level first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingPrerequisite {
    /// Required building.
    pub building: BuildingType,
    /// Minimum level of that building.
    pub level: u32,
}

/// Resource stock that must be held first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcePrerequisite {
    /// Required tier.
    pub tier: ResourceTier,
    /// Minimum amount currently held.
    pub amount: Amount,
}

/// Unlock condition for a building. Every present clause must hold.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UnlockRequirement {
    /// Building prerequisite.
    #[serde(default)]
    pub building: Option<BuildingPrerequisite>,
    /// Resource prerequisite.
    #[serde(default)]
    pub resource: Option<ResourcePrerequisite>,
}

/// Properties of one building type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingDef {
    /// Building this entry describes.
    pub kind: BuildingType,
    /// Display name.
    pub name: String,
    /// Cost of the first level, paid in basic wool.
    pub base_cost: Amount,
    /// Geometric cost growth per level (must be > 1).
    pub cost_multiplier: Amount,
    /// Production per level per second, for every produced tier.
    pub base_production: Amount,
    /// Tiers this building produces.
    pub produces: Vec<ResourceTier>,
    /// Unlock condition, if any.
    #[serde(default)]
    pub unlock: Option<UnlockRequirement>,
}

impl BuildingDef {
    /// Whether this building produces `tier`.
    #[must_use]
    pub fn produces_tier(&self, tier: ResourceTier) -> bool {
        self.produces.contains(&tier)
    }
}

/// What an upgrade modifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectTarget {
    /// Global production.
    Production,
    /// Every building's output.
    AllBuildings,
    /// One building type's output.
    Building(BuildingType),
    /// Manual shearing (clicks). Has no effect on passive production.
    Click,
}

/// How an upgrade modifies its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    /// Multiply the target by `value`.
    Multiply,
    /// Add `value` to the target.
    Add,
}

/// Effect of an upgrade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeEffect {
    /// Modified quantity.
    pub target: EffectTarget,
    /// Modification kind.
    pub kind: EffectKind,
    /// Factor or addend.
    pub value: Amount,
}

/// A one-time purchasable upgrade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeDef {
    /// Stable identifier referenced by saves.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Price in basic wool.
    pub cost: Amount,
    /// Effect once purchased.
    pub effect: UpgradeEffect,
}

/// An achievement granting a permanent production multiplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementDef {
    /// Stable identifier referenced by saves.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Production multiplier granted while unlocked.
    pub reward_multiplier: Amount,
}

/// On-disk shape of a catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogFile {
    tiers: Vec<TierDef>,
    buildings: Vec<BuildingDef>,
    #[serde(default)]
    upgrades: Vec<UpgradeDef>,
    #[serde(default)]
    achievements: Vec<AchievementDef>,
}

/// Complete content catalog.
///
/// Invariant: `tiers[i].tier.index() == i` and `buildings[i].kind.index() == i`
/// for every defined tier and building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CatalogFile", into = "CatalogFile")]
pub struct Catalog {
    tiers: Vec<TierDef>,
    buildings: Vec<BuildingDef>,
    upgrades: Vec<UpgradeDef>,
    achievements: Vec<AchievementDef>,
}

impl TryFrom<CatalogFile> for Catalog {
    type Error = WoolError;

    fn try_from(file: CatalogFile) -> Result<Self> {
        Self::new(file.tiers, file.buildings, file.upgrades, file.achievements)
    }
}

impl From<Catalog> for CatalogFile {
    fn from(catalog: Catalog) -> Self {
        Self {
            tiers: catalog.tiers,
            buildings: catalog.buildings,
            upgrades: catalog.upgrades,
            achievements: catalog.achievements,
        }
    }
}

impl Catalog {
    /// Assemble a catalog, checking that every tier and building is defined
    /// exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`WoolError::CatalogIncomplete`] on missing or duplicate entries.
    pub fn new(
        mut tiers: Vec<TierDef>,
        mut buildings: Vec<BuildingDef>,
        upgrades: Vec<UpgradeDef>,
        achievements: Vec<AchievementDef>,
    ) -> Result<Self> {
        tiers.sort_by_key(|def| def.tier);
        buildings.sort_by_key(|def| def.kind);

        let tier_keys: Vec<ResourceTier> = tiers.iter().map(|def| def.tier).collect();
        if tier_keys != ResourceTier::ALL {
            return Err(WoolError::CatalogIncomplete(format!(
                "expected one entry per tier, found {tier_keys:?}"
            )));
        }

        let building_keys: Vec<BuildingType> = buildings.iter().map(|def| def.kind).collect();
        if building_keys != BuildingType::ALL {
            return Err(WoolError::CatalogIncomplete(format!(
                "expected one entry per building, found {building_keys:?}"
            )));
        }

        Ok(Self {
            tiers,
            buildings,
            upgrades,
            achievements,
        })
    }

    /// Parse a catalog from RON text.
    ///
    /// `label` names the source (usually a path) in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`WoolError::CatalogParse`] if the text is not a valid catalog.
    pub fn from_ron(text: &str, label: &str) -> Result<Self> {
        ron::from_str(text).map_err(|e| WoolError::CatalogParse {
            path: label.to_string(),
            message: e.to_string(),
        })
    }

    /// Render the catalog as pretty RON.
    ///
    /// # Errors
    ///
    /// Returns [`WoolError::InvalidState`] if serialization fails.
    pub fn to_ron(&self) -> Result<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| WoolError::InvalidState(format!("Failed to serialize catalog: {e}")))
    }

    /// Tier properties.
    #[must_use]
    pub fn tier(&self, tier: ResourceTier) -> &TierDef {
        &self.tiers[tier.index()]
    }

    /// Building properties.
    #[must_use]
    pub fn building(&self, kind: BuildingType) -> &BuildingDef {
        &self.buildings[kind.index()]
    }

    /// All tiers in unlock order.
    pub fn tiers(&self) -> impl Iterator<Item = &TierDef> {
        self.tiers.iter()
    }

    /// All buildings in catalog order.
    pub fn buildings(&self) -> impl Iterator<Item = &BuildingDef> {
        self.buildings.iter()
    }

    /// All upgrades.
    pub fn upgrades(&self) -> impl Iterator<Item = &UpgradeDef> {
        self.upgrades.iter()
    }

    /// All achievements.
    pub fn achievements(&self) -> impl Iterator<Item = &AchievementDef> {
        self.achievements.iter()
    }

    /// Look up an upgrade by id.
    #[must_use]
    pub fn upgrade(&self, id: &str) -> Option<&UpgradeDef> {
        self.upgrades.iter().find(|def| def.id == id)
    }

    /// Look up an achievement by id.
    #[must_use]
    pub fn achievement(&self, id: &str) -> Option<&AchievementDef> {
        self.achievements.iter().find(|def| def.id == id)
    }

    /// Check content consistency: prerequisite cycles, cost growth, tier
    /// ordering and duplicate ids.
    #[must_use]
    pub fn validate(&self, checked_at: i64) -> CorruptionReport {
        validate_catalog(self, checked_at)
    }

    /// The built-in Llama Wool Farm content.
    #[must_use]
    pub fn llama_farm() -> Self {
        let tiers = vec![
            tier(ResourceTier::Basic, "Basic Wool", 0, Amount::one(), 0),
            tier(ResourceTier::Silver, "Silver Wool", 1, Amount::scaled(5, 1), 3),
            tier(ResourceTier::Golden, "Golden Wool", 2, Amount::scaled(25, 2), 5),
            tier(ResourceTier::Rainbow, "Rainbow Wool", 3, Amount::scaled(1, 1), 7),
            tier(ResourceTier::Cosmic, "Cosmic Wool", 4, Amount::scaled(5, 2), 9),
            tier(ResourceTier::Ethereal, "Ethereal Wool", 5, Amount::scaled(25, 3), 12),
            tier(ResourceTier::Temporal, "Temporal Wool", 6, Amount::scaled(1, 2), 15),
            tier(ResourceTier::Dimensional, "Dimensional Wool", 7, Amount::scaled(5, 3), 18),
            tier(ResourceTier::Celestial, "Celestial Wool", 8, Amount::scaled(25, 4), 22),
            tier(ResourceTier::Quantum, "Quantum Wool", 9, Amount::scaled(1, 3), 26),
        ];

        let buildings = vec![
            BuildingDef {
                kind: BuildingType::Barn,
                name: "Barn".into(),
                base_cost: Amount::from_int(10),
                cost_multiplier: Amount::scaled(115, 2),
                base_production: Amount::one(),
                produces: vec![ResourceTier::Basic],
                unlock: None,
            },
            BuildingDef {
                kind: BuildingType::ShearingShed,
                name: "Shearing Shed".into(),
                base_cost: Amount::from_int(100),
                cost_multiplier: Amount::scaled(115, 2),
                base_production: Amount::from_int(5),
                produces: vec![ResourceTier::Basic, ResourceTier::Silver],
                unlock: requires(BuildingType::Barn, 5, None),
            },
            BuildingDef {
                kind: BuildingType::SpinningMill,
                name: "Spinning Mill".into(),
                base_cost: Amount::from_int(1_100),
                cost_multiplier: Amount::scaled(115, 2),
                base_production: Amount::from_int(20),
                produces: vec![ResourceTier::Silver, ResourceTier::Golden],
                unlock: requires(
                    BuildingType::ShearingShed,
                    10,
                    Some((ResourceTier::Silver, Amount::from_int(100))),
                ),
            },
            BuildingDef {
                kind: BuildingType::DyeWorks,
                name: "Dye Works".into(),
                base_cost: Amount::from_int(12_000),
                cost_multiplier: Amount::scaled(116, 2),
                base_production: Amount::from_int(80),
                produces: vec![ResourceTier::Golden, ResourceTier::Rainbow],
                unlock: requires(BuildingType::SpinningMill, 10, None),
            },
            BuildingDef {
                kind: BuildingType::Observatory,
                name: "Observatory".into(),
                base_cost: Amount::from_int(130_000),
                cost_multiplier: Amount::scaled(117, 2),
                base_production: Amount::from_int(300),
                produces: vec![ResourceTier::Rainbow, ResourceTier::Cosmic],
                unlock: requires(
                    BuildingType::DyeWorks,
                    10,
                    Some((ResourceTier::Rainbow, Amount::from_int(1_000))),
                ),
            },
            BuildingDef {
                kind: BuildingType::TimeLoom,
                name: "Time Loom".into(),
                base_cost: Amount::from_int(1_400_000),
                cost_multiplier: Amount::scaled(118, 2),
                base_production: Amount::from_int(1_200),
                produces: vec![
                    ResourceTier::Cosmic,
                    ResourceTier::Ethereal,
                    ResourceTier::Temporal,
                ],
                unlock: requires(BuildingType::Observatory, 10, None),
            },
            BuildingDef {
                kind: BuildingType::PortalGate,
                name: "Portal Gate".into(),
                base_cost: Amount::from_int(20_000_000),
                cost_multiplier: Amount::scaled(119, 2),
                base_production: Amount::from_int(5_000),
                produces: vec![ResourceTier::Temporal, ResourceTier::Dimensional],
                unlock: requires(BuildingType::TimeLoom, 10, None),
            },
            BuildingDef {
                kind: BuildingType::QuantumForge,
                name: "Quantum Forge".into(),
                base_cost: Amount::from_int(330_000_000),
                cost_multiplier: Amount::scaled(12, 1),
                base_production: Amount::from_int(25_000),
                produces: vec![ResourceTier::Celestial, ResourceTier::Quantum],
                unlock: requires(
                    BuildingType::PortalGate,
                    10,
                    Some((ResourceTier::Dimensional, Amount::from_int(1_000_000))),
                ),
            },
        ];

        let upgrades = vec![
            upgrade(
                "barn_expansion",
                "Barn Expansion",
                100,
                EffectTarget::Building(BuildingType::Barn),
                EffectKind::Multiply,
                Amount::from_int(2),
            ),
            upgrade(
                "golden_shears",
                "Golden Shears",
                500,
                EffectTarget::Production,
                EffectKind::Multiply,
                Amount::from_int(2),
            ),
            upgrade(
                "llama_feed",
                "Premium Llama Feed",
                2_000,
                EffectTarget::AllBuildings,
                EffectKind::Multiply,
                Amount::scaled(15, 1),
            ),
            upgrade(
                "mill_automation",
                "Mill Automation",
                50_000,
                EffectTarget::Building(BuildingType::SpinningMill),
                EffectKind::Multiply,
                Amount::from_int(2),
            ),
            upgrade(
                "sturdy_gloves",
                "Sturdy Gloves",
                50,
                EffectTarget::Click,
                EffectKind::Add,
                Amount::one(),
            ),
            upgrade(
                "quantum_clicker",
                "Quantum Clicker",
                1_000_000,
                EffectTarget::Click,
                EffectKind::Multiply,
                Amount::from_int(10),
            ),
        ];

        let achievements = vec![
            achievement("first_steps", "First Steps", Amount::scaled(105, 2)),
            achievement("wool_baron", "Wool Baron", Amount::scaled(11, 1)),
            achievement("cosmic_herder", "Cosmic Herder", Amount::scaled(125, 2)),
            achievement("prestige_llama", "Prestige Llama", Amount::scaled(15, 1)),
            achievement("quantum_leap", "Quantum Leap", Amount::from_int(2)),
        ];

        Self {
            tiers,
            buildings,
            upgrades,
            achievements,
        }
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::llama_farm()
    }
}

fn tier(
    tier: ResourceTier,
    name: &str,
    value_exponent: i64,
    production_rate: Amount,
    unlock_exponent: i64,
) -> TierDef {
    TierDef {
        tier,
        name: name.into(),
        base_value: Amount::power_of_ten(value_exponent),
        production_rate,
        unlock_cost: if unlock_exponent == 0 {
            Amount::zero()
        } else {
            Amount::power_of_ten(unlock_exponent)
        },
    }
}

fn requires(
    building: BuildingType,
    level: u32,
    resource: Option<(ResourceTier, Amount)>,
) -> Option<UnlockRequirement> {
    Some(UnlockRequirement {
        building: Some(BuildingPrerequisite { building, level }),
        resource: resource.map(|(tier, amount)| ResourcePrerequisite { tier, amount }),
    })
}

fn upgrade(
    id: &str,
    name: &str,
    cost: i64,
    target: EffectTarget,
    kind: EffectKind,
    value: Amount,
) -> UpgradeDef {
    UpgradeDef {
        id: id.into(),
        name: name.into(),
        cost: Amount::from_int(cost),
        effect: UpgradeEffect {
            target,
            kind,
            value,
        },
    }
}

fn achievement(id: &str, name: &str, reward_multiplier: Amount) -> AchievementDef {
    AchievementDef {
        id: id.into(),
        name: name.into(),
        reward_multiplier,
    }
}
