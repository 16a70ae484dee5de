//! Save integrity engine: detect, plan and repair corruption.
//!
//! Persisted saves are inspected as loose JSON documents, because a damaged
//! save cannot be represented by [`GameSave`] at all. Validation is a set of
//! typed visitors ([`rules`]), one per field family, that emit
//! [`CorruptionIssue`]s. [`recovery`] turns a report into an ordered
//! [`RecoveryPlan`] and applies it to a working copy.
//!
//! Nothing here fails on malformed input. The worst case is a save rebuilt
//! from defaults.

pub mod catalog_rules;
pub mod recovery;
pub mod rules;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::catalog::Catalog;
use crate::decimal::Amount;
use crate::error::Result;
use crate::ids::{BuildingType, ResourceTier};
use crate::save::{GameSave, MAX_BUILDING_LEVEL, SCHEMA_VERSION};

pub use catalog_rules::validate_catalog;
pub use recovery::{
    FailedStep, RecoveryAction, RecoveryOutcome, RecoveryPlan, RecoveryStep, RepairError,
    RiskLevel,
};

/// January 1st 2020, 00:00 UTC, in ms.
pub const EARLIEST_TIMESTAMP_MS: i64 = 1_577_836_800_000;

/// One year in ms.
pub const ONE_YEAR_MS: i64 = 365 * 24 * 3_600 * 1_000;

/// Category of a detected deviation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CorruptionKind {
    /// Value outside its allowed range.
    InvalidRange,
    /// Id that does not resolve in the catalog.
    MissingReference,
    /// Timestamp out of window or out of order.
    TemporalInconsistency,
    /// Stored digest differs from the content.
    ChecksumMismatch,
    /// Value of the wrong JSON type.
    TypeMismatch,
    /// Required field missing or of the wrong container type.
    StructuralCorruption,
    /// Dependency cycle.
    CircularReference,
    /// Key for content that no longer exists.
    OrphanedData,
}

impl CorruptionKind {
    /// Stable tag.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::InvalidRange => "invalid-range",
            Self::MissingReference => "missing-reference",
            Self::TemporalInconsistency => "temporal-inconsistency",
            Self::ChecksumMismatch => "checksum-mismatch",
            Self::TypeMismatch => "type-mismatch",
            Self::StructuralCorruption => "structural-corruption",
            Self::CircularReference => "circular-reference",
            Self::OrphanedData => "orphaned-data",
        }
    }
}

impl fmt::Display for CorruptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Issue severity, ordered `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Fixed silently.
    Low,
    /// Fixed, logged.
    Medium,
    /// Fixed and reported to the caller.
    High,
    /// Fixed and reported; progress may be lost.
    Critical,
}

impl Severity {
    /// Estimated data loss in tenths (0, 1, 3 or 5).
    #[must_use]
    pub const fn loss_tenths(self) -> u32 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 3,
            Self::Critical => 5,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        })
    }
}

/// Typed locator of an issue, rendered as a dotted path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldPath {
    /// The whole document.
    Root,
    /// A top-level field.
    Field(String),
    /// `resources.<key>`.
    Resource(String),
    /// `buildings.<key>`.
    Building(String),
    /// `buildings.<key>.<field>`.
    BuildingField(String, &'static str),
    /// An entry of a top-level id list, identified by its sort key.
    ListItem(&'static str, String),
    /// `catalog.tiers.<tier>`.
    CatalogTier(ResourceTier),
    /// `catalog.buildings.<kind>`.
    CatalogBuilding(BuildingType),
    /// `catalog.upgrades.<id>`.
    CatalogUpgrade(String),
    /// `catalog.achievements.<id>`.
    CatalogAchievement(String),
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => f.write_str("$"),
            Self::Field(name) => f.write_str(name),
            Self::Resource(key) => write!(f, "resources.{key}"),
            Self::Building(key) => write!(f, "buildings.{key}"),
            Self::BuildingField(key, field) => write!(f, "buildings.{key}.{field}"),
            Self::ListItem(list, key) => write!(f, "{list}.{key}"),
            Self::CatalogTier(tier) => write!(f, "catalog.tiers.{tier}"),
            Self::CatalogBuilding(kind) => write!(f, "catalog.buildings.{kind}"),
            Self::CatalogUpgrade(id) => write!(f, "catalog.upgrades.{id}"),
            Self::CatalogAchievement(id) => write!(f, "catalog.achievements.{id}"),
        }
    }
}

impl Serialize for FieldPath {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// How an issue is fixed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "strategy", content = "value", rename_all = "kebab-case")]
pub enum RepairStrategy {
    /// Overwrite the value at the path.
    Replace(Value),
    /// Swap `timestamp` and `lastSaveTime`.
    SwapSaveTimes,
    /// Recompute the stored checksum.
    RegenerateChecksum,
    /// Remove the entry at the path.
    Drop,
    /// Rebuild the field (or document) from defaults.
    Reconstruct(Value),
    /// No automatic fix exists.
    Unrepairable,
}

impl RepairStrategy {
    /// Stable identifier.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Replace(_) => "replace",
            Self::SwapSaveTimes => "swap-save-times",
            Self::RegenerateChecksum => "regenerate-checksum",
            Self::Drop => "drop",
            Self::Reconstruct(_) => "reconstruct",
            Self::Unrepairable => "unrepairable",
        }
    }
}

/// A single detected deviation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorruptionIssue {
    /// Identifier, unique within its report.
    pub id: String,
    /// Category.
    pub kind: CorruptionKind,
    /// Location.
    pub path: FieldPath,
    /// Severity.
    pub severity: Severity,
    /// What the rule expects.
    pub expected: String,
    /// What was found.
    pub actual: String,
    /// Whether `strategy` can fix it.
    pub repairable: bool,
    /// Fix to apply.
    pub strategy: RepairStrategy,
}

/// Result of one validation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CorruptionReport {
    /// Issues in detection order.
    pub issues: Vec<CorruptionIssue>,
    /// Validation time (ms since the Unix epoch).
    pub checked_at: i64,
}

impl CorruptionReport {
    /// Whether no issue was found.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Maximum issue severity, `None` for a clean report.
    #[must_use]
    pub fn severity(&self) -> Option<Severity> {
        self.issues.iter().map(|issue| issue.severity).max()
    }

    /// Number of issues with exactly `severity`.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.issues
            .iter()
            .filter(|issue| issue.severity == severity)
            .count()
    }

    /// Issues of one kind.
    pub fn of_kind(&self, kind: CorruptionKind) -> impl Iterator<Item = &CorruptionIssue> {
        self.issues.iter().filter(move |issue| issue.kind == kind)
    }
}

/// Validation limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrityConfig {
    /// Largest plausible resource amount.
    pub resource_ceiling: Amount,
    /// Largest valid building level.
    pub max_building_level: u32,
    /// Earliest plausible timestamp (ms).
    pub earliest_timestamp: i64,
    /// How far past `now` a timestamp may lie (ms).
    pub future_tolerance_ms: i64,
    /// Version written into reconstructed saves.
    pub schema_version: String,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            resource_ceiling: Amount::power_of_ten(100),
            max_building_level: MAX_BUILDING_LEVEL,
            earliest_timestamp: EARLIEST_TIMESTAMP_MS,
            future_tolerance_ms: ONE_YEAR_MS,
            schema_version: SCHEMA_VERSION.to_string(),
        }
    }
}

/// A typed save recovered from untrusted input.
#[derive(Debug, Clone)]
pub struct LoadedSave {
    /// The usable save.
    pub save: GameSave,
    /// Findings on the input as given.
    pub report: CorruptionReport,
    /// Whether high or critical issues were repaired.
    pub remediated: bool,
    /// Whether the input was unusable and a fresh save was substituted.
    pub fresh: bool,
}

/// Validates and repairs persisted saves against a catalog.
#[derive(Debug, Clone)]
pub struct IntegrityEngine {
    catalog: Arc<Catalog>,
    config: IntegrityConfig,
}

impl IntegrityEngine {
    /// Create an engine.
    #[must_use]
    pub fn new(catalog: Arc<Catalog>, config: IntegrityConfig) -> Self {
        Self { catalog, config }
    }

    /// Validation limits.
    #[must_use]
    pub fn config(&self) -> &IntegrityConfig {
        &self.config
    }

    /// Content catalog.
    #[must_use]
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Run every rule against `document`.
    #[must_use]
    pub fn detect_corruption(&self, document: &Value, now: i64) -> CorruptionReport {
        CorruptionReport {
            issues: rules::inspect(document, &self.catalog, &self.config, now),
            checked_at: now,
        }
    }

    /// Order the report's issues into a recovery plan.
    #[must_use]
    pub fn create_recovery_plan(&self, document: &Value, report: &CorruptionReport) -> RecoveryPlan {
        recovery::create_plan(document, report)
    }

    /// Apply `plan` to a copy of `document` and re-validate the result.
    #[must_use]
    pub fn execute_recovery(&self, document: &Value, plan: &RecoveryPlan) -> RecoveryOutcome {
        let outcome = recovery::execute(document, plan);
        let remaining = self.detect_corruption(&outcome.document, plan.timestamp);
        outcome.finish(remaining)
    }

    /// Detect, plan and repair in one step. Clean documents come back as-is.
    #[must_use]
    pub fn validate_and_repair(&self, document: &Value, now: i64) -> (CorruptionReport, RecoveryOutcome) {
        let report = self.detect_corruption(document, now);
        if report.is_clean() {
            let outcome = RecoveryOutcome::untouched(document.clone(), now);
            return (report, outcome);
        }
        let plan = self.create_recovery_plan(document, &report);
        let outcome = self.execute_recovery(document, &plan);
        (report, outcome)
    }

    /// Turn untrusted JSON text into a usable save. Never fails: unparseable
    /// text is treated like a document with no usable structure.
    #[must_use]
    pub fn load_save(&self, raw: &str, now: i64) -> LoadedSave {
        let document = serde_json::from_str::<Value>(raw).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Save is not valid JSON, rebuilding from defaults");
            Value::Null
        });

        let (report, outcome) = self.validate_and_repair(&document, now);
        let remediated = outcome.remediated;
        match GameSave::from_document(outcome.document) {
            Ok(save) => LoadedSave {
                save,
                report,
                remediated,
                fresh: false,
            },
            Err(e) => {
                tracing::warn!(error = %e, "Repaired save still unreadable, starting fresh");
                LoadedSave {
                    save: GameSave::new(String::new(), now),
                    report,
                    remediated: true,
                    fresh: true,
                }
            }
        }
    }

    /// Validate a typed save (for example a merge result) and repair what
    /// the rules flag. Returns the repaired save and the findings.
    ///
    /// # Errors
    ///
    /// Returns an error if the save cannot be converted to or from JSON.
    pub fn repair_save(&self, save: &GameSave, now: i64) -> Result<(GameSave, CorruptionReport)> {
        let document = save.to_document()?;
        let (report, outcome) = self.validate_and_repair(&document, now);
        if report.is_clean() {
            return Ok((save.clone(), report));
        }
        Ok((GameSave::from_document(outcome.document)?, report))
    }
}

/// Short rendering of a value for issue reports.
pub(crate) fn describe(value: Option<&Value>) -> String {
    const LIMIT: usize = 64;
    match value {
        None => "<missing>".to_string(),
        Some(value) => {
            let text = value.to_string();
            if text.chars().count() > LIMIT {
                let mut short: String = text.chars().take(LIMIT).collect();
                short.push_str("...");
                short
            } else {
                text
            }
        }
    }
}
