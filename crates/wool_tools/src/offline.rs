//! Offline earnings estimates for save files.

use std::path::Path;

use serde::Serialize;
use wool_core::decimal::Amount;
use wool_core::economy::prestige_multiplier;
use wool_core::ids::TierMap;
use wool_core::integrity::IntegrityEngine;
use wool_core::production::{ProductionConfig, ProductionEngine};
use wool_core::save::GameSave;

use crate::error::Result;
use crate::validate::read_text;

/// Earnings a player would collect on return.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineEstimate {
    /// Time since the save's last write, uncapped.
    pub elapsed_ms: u64,
    /// Cap applied to the elapsed time.
    pub max_offline_hours: u32,
    /// Credited amount per tier.
    pub earned: TierMap<Amount>,
}

/// Estimate offline earnings for `save` at `now`.
///
/// `max_hours` overrides the configured cap.
#[must_use]
pub fn estimate(
    engine: &IntegrityEngine,
    config: &ProductionConfig,
    save: &GameSave,
    now: i64,
    max_hours: Option<u32>,
) -> OfflineEstimate {
    let mut production = ProductionEngine::new(engine.catalog().clone(), config.clone());
    production.set_achievements(&save.unlocked_achievements);
    production.calculate_production(
        &save.buildings,
        &save.purchased_upgrades,
        &prestige_multiplier(save.total_prestiges),
    );

    let elapsed_ms = u64::try_from(now.saturating_sub(save.last_save_time)).unwrap_or(0);
    let max_offline_hours = max_hours.unwrap_or(config.max_offline_hours);
    OfflineEstimate {
        elapsed_ms,
        max_offline_hours,
        earned: production.calculate_offline_production(elapsed_ms, max_offline_hours),
    }
}

/// Load a save file (repairing it in memory) and estimate its earnings.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn estimate_file(
    engine: &IntegrityEngine,
    config: &ProductionConfig,
    path: &Path,
    now: i64,
    max_hours: Option<u32>,
) -> Result<OfflineEstimate> {
    let loaded = engine.load_save(&read_text(path)?, now);
    if !loaded.report.is_clean() {
        tracing::warn!(
            path = %path.display(),
            issues = loaded.report.issues.len(),
            "Save needed repair before estimating"
        );
    }
    Ok(estimate(engine, config, &loaded.save, now, max_hours))
}
