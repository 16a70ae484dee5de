//! Property-based tests for wool_core.
//!
//! Random saves and damaged documents come from
//! `wool_test_utils::strategies`.

use std::collections::BTreeSet;

use proptest::prelude::*;
use serde_json::{json, Value};
use wool_core::catalog::Catalog;
use wool_core::checksum;
use wool_core::decimal::Amount;
use wool_core::economy::building_cost;
use wool_core::ids::{BuildingMap, BuildingType, ResourceTier};
use wool_core::integrity::{IntegrityConfig, IntegrityEngine, Severity};
use wool_core::production::{ProductionConfig, ProductionEngine};
use wool_core::reconcile::{
    merge_saves, merge_values, reconcile, ConflictPolicy, Reconciliation, Resolution,
};
use wool_core::save::{BuildingState, GameSave};
use wool_test_utils::fixtures::{catalog, save_record, HOUR_MS, NOW};
use wool_test_utils::strategies::{arb_damaged_document, arb_large_amount, arb_save};

fn arb_policy() -> impl Strategy<Value = Option<ConflictPolicy>> {
    prop_oneof![
        Just(None),
        Just(Some(ConflictPolicy::Client)),
        Just(Some(ConflictPolicy::Server)),
        Just(Some(ConflictPolicy::Merge)),
        Just(Some(ConflictPolicy::Manual)),
    ]
}

fn member_set(value: &Value) -> BTreeSet<String> {
    value
        .as_array()
        .map(|items| items.iter().map(Value::to_string).collect())
        .unwrap_or_default()
}

proptest! {
    /// Merging never lowers a counter, a resource or a building level.
    #[test]
    fn prop_merge_never_regresses(server in arb_save(), client in arb_save()) {
        let merged = merge_saves(&server, &client);

        for tier in ResourceTier::ALL {
            prop_assert!(merged.resources[tier] >= server.resources[tier]);
            prop_assert!(merged.resources[tier] >= client.resources[tier]);
        }
        for kind in BuildingType::ALL {
            let level = merged.buildings[kind].level;
            prop_assert_eq!(level, server.buildings[kind].level.max(client.buildings[kind].level));
        }
        prop_assert!(merged.total_produced >= server.total_produced);
        prop_assert!(merged.total_produced >= client.total_produced);
        prop_assert!(merged.total_prestiges >= server.total_prestiges.max(client.total_prestiges));
        prop_assert!(merged.play_time >= server.play_time.max(client.play_time));
        prop_assert_eq!(merged.revision, server.revision.max(client.revision) + 1);
    }

    /// Id sets merge to the union, regardless of which side is the server.
    #[test]
    fn prop_merge_unions_id_sets(a in arb_save(), b in arb_save()) {
        let ab = merge_saves(&a, &b);
        let ba = merge_saves(&b, &a);

        let expected: BTreeSet<String> =
            a.purchased_upgrades.union(&b.purchased_upgrades).cloned().collect();
        prop_assert_eq!(&ab.purchased_upgrades, &expected);
        prop_assert_eq!(&ab.purchased_upgrades, &ba.purchased_upgrades);
        prop_assert_eq!(&ab.unlocked_achievements, &ba.unlocked_achievements);
    }

    /// JSON arrays merge to the de-duplicated union; numbers to the maximum.
    #[test]
    fn prop_merge_values_arrays_and_numbers(
        left in proptest::collection::vec(0u32..20, 0..10),
        right in proptest::collection::vec(0u32..20, 0..10),
        x in any::<i64>(),
        y in any::<i64>(),
    ) {
        let merged = merge_values(&json!({"ids": &left, "n": x}), &json!({"ids": &right, "n": y}));

        let ids = &merged["ids"];
        let items = ids.as_array().unwrap();
        let unique: BTreeSet<String> = member_set(ids);
        prop_assert_eq!(items.len(), unique.len());
        let mut expected = member_set(&json!(left));
        expected.extend(member_set(&json!(right)));
        prop_assert_eq!(unique, expected);
        prop_assert_eq!(merged["n"].as_i64(), Some(x.max(y)));
    }

    /// Each level costs strictly more than the one before.
    #[test]
    fn prop_cost_is_monotonic(level in 0u32..5_000) {
        let catalog = Catalog::llama_farm();
        for def in catalog.buildings() {
            prop_assert!(building_cost(def, level + 1) > building_cost(def, level));
        }
    }

    /// Offline time beyond the cap earns exactly what the cap earns.
    #[test]
    fn prop_offline_cap_is_exact(
        levels in proptest::collection::vec(0u32..300, BuildingType::COUNT),
        extra_ms in 1u64..(30 * 24 * HOUR_MS),
        max_hours in 1u32..72,
    ) {
        let mut engine = ProductionEngine::new(catalog(), ProductionConfig::default());
        let buildings = BuildingMap::from_fn(|kind| BuildingState::at_level(levels[kind.index()]));
        engine.calculate_production(&buildings, &BTreeSet::new(), &Amount::one());

        let cap_ms = u64::from(max_hours) * HOUR_MS;
        prop_assert_eq!(
            engine.calculate_offline_production(cap_ms + extra_ms, max_hours),
            engine.calculate_offline_production(cap_ms, max_hours)
        );
    }

    /// A fresh checksum verifies; a stale one fails after any tracked change.
    #[test]
    fn prop_checksum_round_trip(save in arb_save(), bump in arb_large_amount(), field in 0usize..5) {
        let digest = checksum::generate(&save);
        prop_assert!(checksum::verify(&save, &digest));

        let mut changed = save.clone();
        match field {
            0 => changed.resources[ResourceTier::Basic] += &bump,
            1 => changed.buildings[BuildingType::Barn].level += 1,
            2 => { changed.purchased_upgrades.insert("not_in_catalog".into()); }
            3 => changed.total_prestiges += 1,
            _ => changed.play_time += 1,
        }
        prop_assert!(!checksum::verify(&changed, &digest));
    }

    /// Repair removes every critical issue and leaves a loadable save.
    #[test]
    fn prop_repair_converges(document in arb_damaged_document(4)) {
        let engine = IntegrityEngine::new(catalog(), IntegrityConfig::default());
        let before = engine.detect_corruption(&document, NOW);
        prop_assert!(!before.is_clean());

        let (_, outcome) = engine.validate_and_repair(&document, NOW);
        let after = engine.detect_corruption(&outcome.document, NOW);
        prop_assert!(after.count(Severity::Critical) <= before.count(Severity::Critical));
        prop_assert_eq!(after.count(Severity::Critical), 0);
        prop_assert!(GameSave::from_document(outcome.document).is_ok());
    }

    /// Reconciling a save with its own stored copy changes nothing.
    #[test]
    fn prop_reconcile_with_self_is_unchanged(
        save in arb_save(),
        last_sync in proptest::option::of(0i64..NOW),
        policy in arb_policy(),
    ) {
        let stored = save_record(save.clone(), NOW - 1_000);
        let outcome = reconcile(Some(&stored), save, last_sync, policy, NOW);
        prop_assert_eq!(
            outcome,
            Reconciliation::Keep {
                record: stored,
                conflict: false,
                resolution: Resolution::Unchanged,
            }
        );
    }
}
