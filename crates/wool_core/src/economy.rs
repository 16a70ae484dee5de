//! Purchases, production bookkeeping and prestige.
//!
//! Every price is paid in basic wool. Costs grow geometrically:
//! `cost(level) = base_cost × cost_multiplier^level`.

use crate::catalog::{BuildingDef, Catalog};
use crate::decimal::Amount;
use crate::error::{Result, WoolError};
use crate::ids::{BuildingMap, BuildingType, ResourceTier, TierMap};
use crate::production::ProductionEvent;
use crate::save::{BuildingState, GameSave, MAX_BUILDING_LEVEL};

/// Basic wool that must have been produced since the last reset before a
/// prestige is allowed.
pub const PRESTIGE_THRESHOLD_EXPONENT: i64 = 6;

/// Price of raising `def` from `level` to `level + 1`.
#[must_use]
pub fn building_cost(def: &BuildingDef, level: u32) -> Amount {
    &def.base_cost * &def.cost_multiplier.pow(level)
}

/// Total price of `count` consecutive levels starting at `level`.
#[must_use]
pub fn bulk_cost(def: &BuildingDef, level: u32, count: u32) -> Amount {
    let mut price = building_cost(def, level);
    let mut total = Amount::zero();
    for _ in 0..count {
        total += &price;
        price *= &def.cost_multiplier;
    }
    total
}

/// Production multiplier granted by `total_prestiges` resets (`1 + 0.1n`).
#[must_use]
pub fn prestige_multiplier(total_prestiges: u32) -> Amount {
    Amount::one() + Amount::scaled(i64::from(total_prestiges), 1)
}

/// Tiers revealed by `total_produced` basic wool, in unlock order.
#[must_use]
pub fn unlocked_tiers(catalog: &Catalog, total_produced: &Amount) -> Vec<ResourceTier> {
    catalog
        .tiers()
        .filter(|def| total_produced >= &def.unlock_cost)
        .map(|def| def.tier)
        .collect()
}

/// Check a building's unlock requirement against the save.
///
/// Buildings that were unlocked before stay unlocked.
///
/// # Errors
///
/// Returns [`WoolError::LockedBuilding`] naming the unmet clause.
pub fn check_unlock(catalog: &Catalog, save: &GameSave, kind: BuildingType) -> Result<()> {
    if save.buildings[kind].unlocked {
        return Ok(());
    }
    let Some(requirement) = &catalog.building(kind).unlock else {
        return Ok(());
    };

    if let Some(prerequisite) = &requirement.building {
        let level = save.buildings[prerequisite.building].level;
        if level < prerequisite.level {
            return Err(WoolError::LockedBuilding {
                building: kind,
                requirement: format!(
                    "{} level {} (currently {level})",
                    prerequisite.building, prerequisite.level
                ),
            });
        }
    }
    if let Some(prerequisite) = &requirement.resource {
        let held = &save.resources[prerequisite.tier];
        if held < &prerequisite.amount {
            return Err(WoolError::LockedBuilding {
                building: kind,
                requirement: format!(
                    "{} {} wool (currently {held})",
                    prerequisite.amount, prerequisite.tier
                ),
            });
        }
    }
    Ok(())
}

/// Buy one level of `kind`. Returns the price paid.
///
/// # Errors
///
/// Returns [`WoolError::LockedBuilding`], [`WoolError::MaxLevel`] or
/// [`WoolError::InsufficientResources`]; the save is untouched on error.
pub fn purchase_building(catalog: &Catalog, save: &mut GameSave, kind: BuildingType) -> Result<Amount> {
    check_unlock(catalog, save, kind)?;

    let state = save.buildings[kind];
    if state.level >= MAX_BUILDING_LEVEL {
        return Err(WoolError::MaxLevel {
            building: kind,
            level: state.level,
        });
    }

    let price = building_cost(catalog.building(kind), state.level);
    pay(save, &price)?;
    save.buildings[kind] = BuildingState {
        level: state.level + 1,
        unlocked: true,
    };
    tracing::debug!(building = %kind, level = state.level + 1, %price, "Building purchased");
    Ok(price)
}

/// Buy upgrade `id`. Returns the price paid.
///
/// # Errors
///
/// Returns [`WoolError::UnknownUpgrade`], [`WoolError::AlreadyPurchased`] or
/// [`WoolError::InsufficientResources`].
pub fn purchase_upgrade(catalog: &Catalog, save: &mut GameSave, id: &str) -> Result<Amount> {
    let def = catalog
        .upgrade(id)
        .ok_or_else(|| WoolError::UnknownUpgrade(id.to_string()))?;
    if save.purchased_upgrades.contains(id) {
        return Err(WoolError::AlreadyPurchased(id.to_string()));
    }

    pay(save, &def.cost)?;
    save.purchased_upgrades.insert(def.id.clone());
    tracing::debug!(upgrade = %id, price = %def.cost, "Upgrade purchased");
    Ok(def.cost.clone())
}

fn pay(save: &mut GameSave, price: &Amount) -> Result<()> {
    let available = &save.resources[ResourceTier::Basic];
    if available < price {
        return Err(WoolError::InsufficientResources {
            resource: ResourceTier::Basic,
            required: price.clone(),
            available: available.clone(),
        });
    }
    save.resources[ResourceTier::Basic] = available.saturating_sub(price);
    Ok(())
}

/// Credit earnings to the save. Basic-tier earnings also count towards
/// `total_produced`, which drives tier unlocks.
pub fn apply_production(save: &mut GameSave, earned: &TierMap<Amount>) {
    for (tier, amount) in earned.iter() {
        if amount.is_zero() || amount.is_negative() {
            continue;
        }
        save.resources[tier] += amount;
        if tier == ResourceTier::Basic {
            save.total_produced += amount;
        }
    }
}

/// Credit the events of one production tick.
pub fn apply_events(save: &mut GameSave, events: &[ProductionEvent]) {
    let mut earned = TierMap::default();
    for event in events {
        earned[event.tier] += &event.amount;
    }
    apply_production(save, &earned);
}

/// Whether the save has produced enough to prestige.
#[must_use]
pub fn can_prestige(save: &GameSave) -> bool {
    save.total_produced >= Amount::power_of_ten(PRESTIGE_THRESHOLD_EXPONENT)
}

/// Reset progress in exchange for a permanent multiplier.
///
/// Resources, buildings, upgrades and `total_produced` are cleared.
/// Achievements, settings and play time survive. Returns the new prestige
/// count.
///
/// # Errors
///
/// Returns [`WoolError::InvalidState`] if the threshold is not reached.
pub fn prestige(save: &mut GameSave, now: i64) -> Result<u32> {
    if !can_prestige(save) {
        return Err(WoolError::InvalidState(format!(
            "prestige requires 1e{PRESTIGE_THRESHOLD_EXPONENT} basic wool produced, have {}",
            save.total_produced
        )));
    }

    save.resources = TierMap::default();
    save.buildings = BuildingMap::default();
    save.purchased_upgrades.clear();
    save.total_produced = Amount::zero();
    save.total_prestiges = save.total_prestiges.saturating_add(1);
    save.last_save_time = now;
    save.timestamp = now;
    tracing::info!(player = %save.player_id, prestiges = save.total_prestiges, "Prestige");
    Ok(save.total_prestiges)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    fn amt(s: &str) -> Amount {
        Amount::parse(s).unwrap()
    }

    fn rich_save() -> GameSave {
        let mut save = GameSave::new("llama-1", NOW);
        save.resources[ResourceTier::Basic] = amt("1e12");
        save
    }

    #[test]
    fn test_building_cost_is_geometric() {
        let catalog = Catalog::llama_farm();
        let barn = catalog.building(BuildingType::Barn);
        assert_eq!(building_cost(barn, 0), amt("10"));
        assert_eq!(building_cost(barn, 1), amt("11.5"));
        assert_eq!(building_cost(barn, 2), amt("13.225"));
        assert_eq!(bulk_cost(barn, 0, 3), amt("34.725"));
        assert!(bulk_cost(barn, 5, 0).is_zero());
    }

    #[test]
    fn test_purchase_deducts_and_unlocks() {
        let catalog = Catalog::llama_farm();
        let mut save = GameSave::new("llama-1", NOW);
        save.resources[ResourceTier::Basic] = amt("25");

        let paid = purchase_building(&catalog, &mut save, BuildingType::Barn).unwrap();
        assert_eq!(paid, amt("10"));
        assert_eq!(save.resources[ResourceTier::Basic], amt("15"));
        assert_eq!(save.buildings[BuildingType::Barn], BuildingState::at_level(1));

        purchase_building(&catalog, &mut save, BuildingType::Barn).unwrap();
        let err = purchase_building(&catalog, &mut save, BuildingType::Barn).unwrap_err();
        assert!(matches!(err, WoolError::InsufficientResources { .. }));
        assert_eq!(save.buildings[BuildingType::Barn].level, 2);
    }

    #[test]
    fn test_unlock_requirement_enforced() {
        let catalog = Catalog::llama_farm();
        let mut save = rich_save();
        let err = purchase_building(&catalog, &mut save, BuildingType::ShearingShed).unwrap_err();
        assert!(matches!(err, WoolError::LockedBuilding { .. }));

        save.buildings[BuildingType::Barn] = BuildingState::at_level(5);
        purchase_building(&catalog, &mut save, BuildingType::ShearingShed).unwrap();

        // Once unlocked, the building stays purchasable.
        save.buildings[BuildingType::Barn] = BuildingState::at_level(1);
        purchase_building(&catalog, &mut save, BuildingType::ShearingShed).unwrap();
    }

    #[test]
    fn test_resource_prerequisite() {
        let catalog = Catalog::llama_farm();
        let mut save = rich_save();
        save.buildings[BuildingType::ShearingShed] = BuildingState::at_level(10);
        assert!(check_unlock(&catalog, &save, BuildingType::SpinningMill).is_err());
        save.resources[ResourceTier::Silver] = amt("100");
        assert!(check_unlock(&catalog, &save, BuildingType::SpinningMill).is_ok());
    }

    #[test]
    fn test_max_level() {
        let catalog = Catalog::llama_farm();
        let mut save = rich_save();
        save.buildings[BuildingType::Barn] = BuildingState::at_level(MAX_BUILDING_LEVEL);
        let err = purchase_building(&catalog, &mut save, BuildingType::Barn).unwrap_err();
        assert!(matches!(err, WoolError::MaxLevel { level: MAX_BUILDING_LEVEL, .. }));
    }

    #[test]
    fn test_upgrade_purchase() {
        let catalog = Catalog::llama_farm();
        let mut save = rich_save();
        purchase_upgrade(&catalog, &mut save, "golden_shears").unwrap();
        assert!(save.purchased_upgrades.contains("golden_shears"));
        assert!(matches!(
            purchase_upgrade(&catalog, &mut save, "golden_shears"),
            Err(WoolError::AlreadyPurchased(_))
        ));
        assert!(matches!(
            purchase_upgrade(&catalog, &mut save, "diamond_shears"),
            Err(WoolError::UnknownUpgrade(_))
        ));
    }

    #[test]
    fn test_apply_production_tracks_basic_total() {
        let mut save = GameSave::new("llama-1", NOW);
        let mut earned = TierMap::default();
        earned[ResourceTier::Basic] = amt("12.5");
        earned[ResourceTier::Silver] = amt("3");
        apply_production(&mut save, &earned);
        assert_eq!(save.resources[ResourceTier::Silver], amt("3"));
        assert_eq!(save.total_produced, amt("12.5"));
    }

    #[test]
    fn test_unlocked_tiers_follow_total_produced() {
        let catalog = Catalog::llama_farm();
        assert_eq!(unlocked_tiers(&catalog, &Amount::zero()), vec![ResourceTier::Basic]);
        assert_eq!(
            unlocked_tiers(&catalog, &amt("1e5")),
            vec![ResourceTier::Basic, ResourceTier::Silver, ResourceTier::Golden]
        );
    }

    #[test]
    fn test_prestige_resets_progress() {
        let mut save = rich_save();
        save.unlocked_achievements.insert("first_steps".into());
        save.buildings[BuildingType::Barn] = BuildingState::at_level(50);
        assert!(prestige(&mut save, NOW).is_err());

        save.total_produced = amt("2e6");
        assert_eq!(prestige(&mut save, NOW + 1).unwrap(), 1);
        assert!(save.resources[ResourceTier::Basic].is_zero());
        assert_eq!(save.buildings[BuildingType::Barn], BuildingState::default());
        assert!(save.unlocked_achievements.contains("first_steps"));
        assert_eq!(prestige_multiplier(save.total_prestiges), amt("1.1"));
    }
}
