//! Consistency checks for content catalogs.
//!
//! A catalog that parses can still be unplayable: a prerequisite cycle
//! makes buildings impossible to unlock, a cost multiplier of one or less
//! breaks cost growth, and tiers whose unlock costs do not increase reveal
//! out of order. These checks run in the `catalog` tool and at server start.

use std::collections::BTreeSet;

use serde_json::Value;

use super::{
    CorruptionIssue, CorruptionKind, CorruptionReport, FieldPath, RepairStrategy, Severity,
};
use crate::catalog::Catalog;
use crate::decimal::Amount;
use crate::ids::{BuildingMap, BuildingType};

/// Check `catalog` for content errors. None of them are repairable.
#[must_use]
pub fn validate_catalog(catalog: &Catalog, checked_at: i64) -> CorruptionReport {
    let mut issues = Vec::new();
    let mut flag = |kind, path, severity, expected: String, actual: String| {
        issues.push(CorruptionIssue {
            id: format!("issue-{}", issues.len() + 1),
            kind,
            path,
            severity,
            expected,
            actual,
            repairable: false,
            strategy: RepairStrategy::Unrepairable,
        });
    };

    for kind in unlock_cycles(catalog) {
        let prerequisite = catalog
            .building(kind)
            .unlock
            .as_ref()
            .and_then(|requirement| requirement.building.as_ref())
            .map_or_else(String::new, |p| p.building.to_string());
        flag(
            CorruptionKind::CircularReference,
            FieldPath::CatalogBuilding(kind),
            Severity::Critical,
            "an acyclic unlock chain".into(),
            format!("requires {prerequisite}"),
        );
    }

    let mut previous: Option<&Amount> = None;
    for def in catalog.tiers() {
        if let Some(prev) = previous {
            if &def.unlock_cost <= prev {
                flag(
                    CorruptionKind::InvalidRange,
                    FieldPath::CatalogTier(def.tier),
                    Severity::High,
                    format!("unlock cost above {prev}"),
                    def.unlock_cost.to_string(),
                );
            }
        }
        previous = Some(&def.unlock_cost);
    }

    for def in catalog.buildings() {
        if def.cost_multiplier <= Amount::one() {
            flag(
                CorruptionKind::InvalidRange,
                FieldPath::CatalogBuilding(def.kind),
                Severity::High,
                "cost multiplier > 1".into(),
                def.cost_multiplier.to_string(),
            );
        }
        if def.base_cost.is_negative() || def.base_production.is_negative() {
            flag(
                CorruptionKind::InvalidRange,
                FieldPath::CatalogBuilding(def.kind),
                Severity::High,
                "non-negative cost and production".into(),
                format!("cost {}, production {}", def.base_cost, def.base_production),
            );
        }
        if def.produces.is_empty() {
            flag(
                CorruptionKind::OrphanedData,
                FieldPath::CatalogBuilding(def.kind),
                Severity::Low,
                "at least one produced tier".into(),
                "[]".into(),
            );
        }
    }

    let mut seen = BTreeSet::new();
    for def in catalog.upgrades() {
        if !seen.insert(def.id.as_str()) {
            flag(
                CorruptionKind::StructuralCorruption,
                FieldPath::CatalogUpgrade(def.id.clone()),
                Severity::Medium,
                "a unique upgrade id".into(),
                Value::String(def.id.clone()).to_string(),
            );
        }
    }
    let mut seen = BTreeSet::new();
    for def in catalog.achievements() {
        if !seen.insert(def.id.as_str()) {
            flag(
                CorruptionKind::StructuralCorruption,
                FieldPath::CatalogAchievement(def.id.clone()),
                Severity::Medium,
                "a unique achievement id".into(),
                Value::String(def.id.clone()).to_string(),
            );
        }
    }

    CorruptionReport {
        issues,
        checked_at,
    }
}

/// Buildings that sit on a prerequisite cycle.
///
/// Each building has at most one building prerequisite, so the graph is a
/// functional graph: following the chain from any node either ends or
/// loops.
fn unlock_cycles(catalog: &Catalog) -> Vec<BuildingType> {
    let next = BuildingMap::from_fn(|kind| {
        catalog
            .building(kind)
            .unlock
            .as_ref()
            .and_then(|requirement| requirement.building.as_ref())
            .map(|prerequisite| prerequisite.building)
    });

    let mut on_cycle = BTreeSet::new();
    for start in BuildingType::ALL {
        let mut path = Vec::new();
        let mut current = Some(start);
        while let Some(kind) = current {
            if let Some(position) = path.iter().position(|&seen| seen == kind) {
                on_cycle.extend(path[position..].iter().copied());
                break;
            }
            path.push(kind);
            current = next[kind];
        }
    }
    on_cycle.into_iter().collect()
}
