//! Production engine: per-tier rates, tick quantization and offline earnings.
//!
//! Rates are derived from building levels and a strictly multiplicative
//! modifier stack:
//!
//! ```text
//! total = base(1) × buildings × upgrades × achievements × prestige × temporary
//! ```
//!
//! The engine caches the last computed [`ProductionSnapshot`]. Ticks and
//! offline calculations read that snapshot, so call
//! [`ProductionEngine::calculate_production`] again after any change to
//! buildings, upgrades, achievements, prestige or boosts.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, EffectKind, EffectTarget};
use crate::decimal::Amount;
use crate::ids::{BuildingMap, ResourceTier, TierMap};
use crate::save::{BuildingState, MAX_BUILDING_LEVEL};

/// Milliseconds per materialized production step.
const MS_PER_SECOND: u64 = 1_000;

/// Milliseconds per hour.
const MS_PER_HOUR: u64 = 3_600 * MS_PER_SECOND;

/// Tunables for the production engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductionConfig {
    /// Fraction of the online rate credited while offline.
    pub offline_efficiency: Amount,
    /// Default cap on credited offline time.
    pub max_offline_hours: u32,
    /// Intrinsic basic-wool rate that needs no buildings.
    pub base_tier_floor: Amount,
    /// Levels above this are not counted.
    pub max_building_level: u32,
}

impl Default for ProductionConfig {
    fn default() -> Self {
        Self {
            offline_efficiency: Amount::scaled(5, 1),
            max_offline_hours: 24,
            base_tier_floor: Amount::scaled(1, 1),
            max_building_level: MAX_BUILDING_LEVEL,
        }
    }
}

/// A time-limited production multiplier (events, ads, potions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporaryBoost {
    /// Where the boost came from.
    pub source: String,
    /// Multiplicative factor.
    pub factor: Amount,
    /// Expiry time (ms since the Unix epoch).
    pub expires_at: i64,
}

/// The multiplier stack, factor by factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiplierBreakdown {
    /// Always one.
    pub base: Amount,
    /// Upgrades targeting every building.
    pub buildings: Amount,
    /// Upgrades targeting global production.
    pub upgrades: Amount,
    /// Unlocked achievement rewards.
    pub achievements: Amount,
    /// Prestige bonus.
    pub prestige: Amount,
    /// Active temporary boosts.
    pub temporary: Amount,
    /// Product of every factor above.
    pub total: Amount,
}

impl Default for MultiplierBreakdown {
    fn default() -> Self {
        Self {
            base: Amount::one(),
            buildings: Amount::one(),
            upgrades: Amount::one(),
            achievements: Amount::one(),
            prestige: Amount::one(),
            temporary: Amount::one(),
            total: Amount::one(),
        }
    }
}

/// Result of a production calculation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductionSnapshot {
    /// Rate per tier, per second.
    pub per_tier: TierMap<Amount>,
    /// Sum of all tier rates, per second.
    pub total_rate: Amount,
    /// `total_rate` scaled by offline efficiency.
    pub offline_rate: Amount,
    /// How the total multiplier was composed.
    pub breakdown: MultiplierBreakdown,
}

/// Wool materialized by one tick for one tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionEvent {
    /// Tier produced.
    pub tier: ResourceTier,
    /// Amount produced this tick.
    pub amount: Amount,
    /// Rate the amount was derived from.
    pub rate: Amount,
}

/// Computes production from building levels and the multiplier stack.
#[derive(Debug, Clone)]
pub struct ProductionEngine {
    catalog: Arc<Catalog>,
    config: ProductionConfig,
    achievements: Amount,
    boosts: Vec<TemporaryBoost>,
    snapshot: ProductionSnapshot,
    accumulated_ms: u64,
}

impl ProductionEngine {
    /// Create an engine. The initial snapshot has no buildings, so only the
    /// base-tier floor produces.
    #[must_use]
    pub fn new(catalog: Arc<Catalog>, config: ProductionConfig) -> Self {
        let mut engine = Self {
            catalog,
            config,
            achievements: Amount::one(),
            boosts: Vec::new(),
            snapshot: ProductionSnapshot::default(),
            accumulated_ms: 0,
        };
        engine.calculate_production(&BuildingMap::default(), &BTreeSet::new(), &Amount::one());
        engine
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &ProductionConfig {
        &self.config
    }

    /// Content catalog.
    #[must_use]
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Last computed snapshot.
    #[must_use]
    pub fn snapshot(&self) -> &ProductionSnapshot {
        &self.snapshot
    }

    /// Milliseconds accumulated towards the next whole second.
    #[must_use]
    pub fn pending_ms(&self) -> u64 {
        self.accumulated_ms
    }

    /// Set the achievement factor from the unlocked achievement ids.
    /// Ids missing from the catalog contribute nothing.
    pub fn set_achievements<'a>(&mut self, unlocked: impl IntoIterator<Item = &'a String>) {
        self.achievements = unlocked
            .into_iter()
            .filter_map(|id| self.catalog.achievement(id))
            .map(|def| def.reward_multiplier.clone())
            .product();
    }

    /// Activate a temporary boost.
    pub fn add_boost(&mut self, boost: TemporaryBoost) {
        tracing::debug!(source = %boost.source, factor = %boost.factor, "Boost added");
        self.boosts.push(boost);
    }

    /// Drop boosts that expired at or before `now`. Returns how many were removed.
    pub fn expire_boosts(&mut self, now: i64) -> usize {
        let before = self.boosts.len();
        self.boosts.retain(|boost| boost.expires_at > now);
        before - self.boosts.len()
    }

    /// Currently active boosts.
    #[must_use]
    pub fn boosts(&self) -> &[TemporaryBoost] {
        &self.boosts
    }

    /// Recompute per-tier rates and cache the result.
    ///
    /// Buildings contribute `base_production × level × production_multiplier`
    /// to every tier they produce, but only while unlocked and above level 0.
    /// The basic tier additionally receives the configured floor.
    ///
    /// Every boost still held counts toward the temporary factor. Call
    /// [`expire_boosts`](Self::expire_boosts) with the current time first.
    pub fn calculate_production(
        &mut self,
        buildings: &BuildingMap<BuildingState>,
        upgrades: &BTreeSet<String>,
        prestige_multiplier: &Amount,
    ) -> &ProductionSnapshot {
        let mut building_multipliers = BuildingMap::from_fn(|_| Amount::one());
        let mut buildings_factor = Amount::one();
        let mut upgrades_factor = Amount::one();

        for id in upgrades {
            let Some(def) = self.catalog.upgrade(id) else {
                tracing::debug!(upgrade = %id, "Ignoring unknown upgrade");
                continue;
            };
            if def.effect.kind != EffectKind::Multiply {
                continue;
            }
            match def.effect.target {
                EffectTarget::Production => upgrades_factor *= &def.effect.value,
                EffectTarget::AllBuildings => buildings_factor *= &def.effect.value,
                EffectTarget::Building(kind) => building_multipliers[kind] *= &def.effect.value,
                EffectTarget::Click => {}
            }
        }

        let mut base: TierMap<Amount> = TierMap::default();
        for def in self.catalog.buildings() {
            let state = buildings[def.kind];
            if !state.is_producing() {
                continue;
            }
            let level = state.level.min(self.config.max_building_level);
            let output =
                &def.base_production.mul_count(u64::from(level)) * &building_multipliers[def.kind];
            for tier in ResourceTier::ALL {
                if def.produces_tier(tier) {
                    base[tier] += &output;
                }
            }
        }
        base[ResourceTier::Basic] += &self.config.base_tier_floor;

        let temporary: Amount = self.boosts.iter().map(|boost| boost.factor.clone()).product();
        let mut total = [
            &buildings_factor,
            &upgrades_factor,
            &self.achievements,
            prestige_multiplier,
            &temporary,
        ]
        .into_iter()
        .fold(Amount::one(), |acc, factor| &acc * factor);
        if total.is_negative() {
            total = Amount::zero();
        }

        let per_tier = base.map(|_, rate| {
            if rate.is_zero() || rate.is_negative() || total.is_zero() {
                Amount::zero()
            } else {
                rate * &total
            }
        });
        let total_rate: Amount = per_tier.values().sum();
        let offline_rate = &total_rate * &self.config.offline_efficiency;

        self.snapshot = ProductionSnapshot {
            per_tier,
            total_rate,
            offline_rate,
            breakdown: MultiplierBreakdown {
                base: Amount::one(),
                buildings: buildings_factor,
                upgrades: upgrades_factor,
                achievements: self.achievements.clone(),
                prestige: prestige_multiplier.clone(),
                temporary,
                total,
            },
        };
        &self.snapshot
    }

    /// Advance by `delta_ms`.
    ///
    /// Production materializes only in whole seconds; the remainder carries
    /// over to the next call. Emits one event per tier with a non-zero rate.
    pub fn update(&mut self, delta_ms: u64) -> Vec<ProductionEvent> {
        self.accumulated_ms = self.accumulated_ms.saturating_add(delta_ms);
        let seconds = self.accumulated_ms / MS_PER_SECOND;
        if seconds == 0 {
            return Vec::new();
        }
        self.accumulated_ms %= MS_PER_SECOND;

        let events: Vec<ProductionEvent> = self
            .snapshot
            .per_tier
            .iter()
            .filter(|(_, rate)| !rate.is_zero())
            .map(|(tier, rate)| ProductionEvent {
                tier,
                amount: rate.mul_count(seconds),
                rate: rate.clone(),
            })
            .collect();

        tracing::debug!(seconds, events = events.len(), "Production tick");
        events
    }

    /// Earnings for `duration_ms` spent offline.
    ///
    /// The duration is capped at `max_offline_hours`, scaled by offline
    /// efficiency and counted in whole seconds.
    #[must_use]
    pub fn calculate_offline_production(
        &self,
        duration_ms: u64,
        max_offline_hours: u32,
    ) -> TierMap<Amount> {
        let cap_ms = u64::from(max_offline_hours).saturating_mul(MS_PER_HOUR);
        let seconds = duration_ms.min(cap_ms) / MS_PER_SECOND;

        self.snapshot.per_tier.map(|_, rate| {
            if rate.is_zero() || seconds == 0 {
                Amount::zero()
            } else {
                (rate * &self.config.offline_efficiency).mul_count(seconds)
            }
        })
    }

    /// Offline earnings between `last_seen` and `now`, using the configured cap.
    /// A `last_seen` in the future earns nothing.
    #[must_use]
    pub fn offline_since(&self, last_seen: i64, now: i64) -> TierMap<Amount> {
        let elapsed = u64::try_from(now.saturating_sub(last_seen)).unwrap_or(0);
        self.calculate_offline_production(elapsed, self.config.max_offline_hours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::BuildingType;

    fn engine() -> ProductionEngine {
        ProductionEngine::new(Arc::new(Catalog::llama_farm()), ProductionConfig::default())
    }

    fn amt(s: &str) -> Amount {
        Amount::parse(s).unwrap()
    }

    fn with_barn(level: u32) -> BuildingMap<BuildingState> {
        let mut buildings = BuildingMap::default();
        buildings[BuildingType::Barn] = BuildingState::at_level(level);
        buildings
    }

    #[test]
    fn test_empty_farm_produces_only_floor() {
        let mut engine = engine();
        let snapshot =
            engine.calculate_production(&BuildingMap::default(), &BTreeSet::new(), &Amount::one());
        assert_eq!(snapshot.total_rate, amt("0.1"));
        assert_eq!(snapshot.per_tier[ResourceTier::Basic], amt("0.1"));
        for tier in ResourceTier::ALL.into_iter().skip(1) {
            assert!(snapshot.per_tier[tier].is_zero(), "{tier} should be zero");
        }
    }

    #[test]
    fn test_building_level_scales_rate() {
        let mut engine = engine();
        let snapshot = engine.calculate_production(&with_barn(5), &BTreeSet::new(), &Amount::one());
        assert_eq!(snapshot.per_tier[ResourceTier::Basic], amt("5.1"));
    }

    #[test]
    fn test_locked_or_unbuilt_building_contributes_nothing() {
        let mut engine = engine();
        let mut buildings = BuildingMap::default();
        buildings[BuildingType::ShearingShed] = BuildingState {
            level: 7,
            unlocked: false,
        };
        let snapshot = engine.calculate_production(&buildings, &BTreeSet::new(), &Amount::one());
        assert!(snapshot.per_tier[ResourceTier::Silver].is_zero());
        assert_eq!(snapshot.per_tier[ResourceTier::Basic], amt("0.1"));
    }

    #[test]
    fn test_multiplier_stack_order_and_breakdown() {
        let mut engine = engine();
        engine.set_achievements(&["first_steps".to_string()]);
        engine.add_boost(TemporaryBoost {
            source: "festival".into(),
            factor: amt("3"),
            expires_at: 10_000,
        });
        let upgrades: BTreeSet<String> = ["golden_shears", "llama_feed", "barn_expansion", "sturdy_gloves"]
            .into_iter()
            .map(String::from)
            .collect();

        let snapshot = engine.calculate_production(&with_barn(10), &upgrades, &amt("1.5"));
        let breakdown = &snapshot.breakdown;
        assert_eq!(breakdown.buildings, amt("1.5"));
        assert_eq!(breakdown.upgrades, amt("2"));
        assert_eq!(breakdown.achievements, amt("1.05"));
        assert_eq!(breakdown.prestige, amt("1.5"));
        assert_eq!(breakdown.temporary, amt("3"));
        assert_eq!(breakdown.total, amt("14.175"));

        // barn: 1 × 10 × 2 (barn_expansion) + 0.1 floor = 20.1
        assert_eq!(snapshot.per_tier[ResourceTier::Basic], amt("20.1") * amt("14.175"));
    }

    #[test]
    fn test_expired_boosts_are_dropped() {
        let mut engine = engine();
        engine.add_boost(TemporaryBoost {
            source: "ad".into(),
            factor: amt("2"),
            expires_at: 5_000,
        });
        assert_eq!(engine.expire_boosts(4_999), 0);
        let boosted = engine.calculate_production(&with_barn(1), &BTreeSet::new(), &Amount::one());
        assert_eq!(boosted.breakdown.temporary, amt("2"));

        assert_eq!(engine.expire_boosts(5_000), 1);
        assert!(engine.boosts().is_empty());
        let plain = engine.calculate_production(&with_barn(1), &BTreeSet::new(), &Amount::one());
        assert_eq!(plain.breakdown.temporary, Amount::one());
        assert_eq!(plain.per_tier[ResourceTier::Basic], amt("1.1"));
    }

    #[test]
    fn test_repeated_tier_in_produces_counts_once() {
        let base = Catalog::llama_farm();
        let mut buildings: Vec<_> = base.buildings().cloned().collect();
        buildings[BuildingType::Barn.index()].produces =
            vec![ResourceTier::Basic, ResourceTier::Basic];
        let catalog = Catalog::new(
            base.tiers().cloned().collect(),
            buildings,
            base.upgrades().cloned().collect(),
            base.achievements().cloned().collect(),
        )
        .unwrap();

        let mut engine = ProductionEngine::new(Arc::new(catalog), ProductionConfig::default());
        let snapshot = engine.calculate_production(&with_barn(5), &BTreeSet::new(), &Amount::one());
        assert_eq!(snapshot.per_tier[ResourceTier::Basic], amt("5.1"));
    }

    #[test]
    fn test_update_quantizes_to_whole_seconds() {
        let mut engine = engine();
        engine.calculate_production(&with_barn(1), &BTreeSet::new(), &Amount::one());

        assert!(engine.update(400).is_empty());
        assert!(engine.update(500).is_empty());
        let events = engine.update(1_350);
        assert_eq!(engine.pending_ms(), 250);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].tier, ResourceTier::Basic);
        assert_eq!(events[0].amount, amt("2.2"));
    }

    #[test]
    fn test_offline_production_caps_duration() {
        let mut engine = engine();
        let mut buildings = BuildingMap::default();
        buildings[BuildingType::Barn] = BuildingState::at_level(10);
        engine.calculate_production(&buildings, &BTreeSet::new(), &Amount::one());

        let hour = 3_600_000;
        let capped = engine.calculate_offline_production(30 * hour, 24);
        let exact = engine.calculate_offline_production(24 * hour, 24);
        assert_eq!(capped, exact);
        // (10 + 0.1) × 0.5 × 86 400
        assert_eq!(capped[ResourceTier::Basic], amt("436320"));
        assert!(capped[ResourceTier::Quantum].is_zero());
    }

    #[test]
    fn test_offline_since_ignores_future_timestamps() {
        let engine = engine();
        let earned = engine.offline_since(2_000, 1_000);
        assert!(earned.values().all(Amount::is_zero));
    }
}
