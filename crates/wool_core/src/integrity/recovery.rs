//! Recovery planning and execution.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use super::{
    CorruptionIssue, CorruptionKind, CorruptionReport, FieldPath, RepairStrategy, Severity,
};
use crate::checksum;
use crate::decimal::{fraction_serde, Fraction};

/// Estimated-loss cap, in tenths.
const MAX_LOSS_TENTHS: u32 = 10;

/// Kind of action a recovery step performs, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryAction {
    /// Fix a value in place (clamp, reorder).
    Repair,
    /// Rebuild missing structure from defaults.
    Reconstruct,
    /// Swap a wrongly typed value for a valid one.
    Substitute,
    /// Delete dangling or orphaned entries.
    Remove,
    /// Recompute derived data (the checksum).
    Reset,
}

impl RecoveryAction {
    /// Action used for issues of `kind`.
    #[must_use]
    pub const fn for_kind(kind: CorruptionKind) -> Self {
        match kind {
            CorruptionKind::InvalidRange | CorruptionKind::TemporalInconsistency => Self::Repair,
            CorruptionKind::StructuralCorruption => Self::Reconstruct,
            CorruptionKind::TypeMismatch => Self::Substitute,
            CorruptionKind::MissingReference
            | CorruptionKind::OrphanedData
            | CorruptionKind::CircularReference => Self::Remove,
            CorruptionKind::ChecksumMismatch => Self::Reset,
        }
    }
}

/// Overall risk of applying a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// No progress lost.
    Low,
    /// Minor values reset.
    Medium,
    /// Noticeable progress may be lost.
    High,
    /// Structure was rebuilt or much was reset.
    Critical,
}

impl RiskLevel {
    /// Classify from the issues' severities and the estimated loss in tenths.
    #[must_use]
    pub fn classify(has_critical: bool, loss_tenths: u32) -> Self {
        if has_critical || loss_tenths > 3 {
            Self::Critical
        } else if loss_tenths >= 2 {
            Self::High
        } else if loss_tenths >= 1 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        })
    }
}

/// One planned fix.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveryStep {
    /// Position in the plan, starting at 1.
    pub order: usize,
    /// What to do.
    pub action: RecoveryAction,
    /// The issue being fixed.
    pub issue: CorruptionIssue,
}

/// Ordered fixes for one corruption report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveryPlan {
    /// Plan identifier.
    pub id: String,
    /// Planning time, also used as "now" during execution.
    pub timestamp: i64,
    /// Checksum of the document the plan was made for.
    pub target_checksum: String,
    /// Findings the plan addresses.
    pub report: CorruptionReport,
    /// Steps in execution order.
    pub steps: Vec<RecoveryStep>,
    /// Expected fraction of progress lost, in `[0, 1]`.
    #[serde(with = "fraction_serde")]
    pub estimated_data_loss: Fraction,
    /// Risk classification.
    pub risk_level: RiskLevel,
}

/// Why a step could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepairError {
    /// The issue has no automatic fix.
    #[error("no automatic repair for {0}")]
    Unrepairable(String),
    /// The parent container of the path is missing or of the wrong type.
    #[error("cannot reach {0}")]
    Unreachable(String),
}

/// A step that failed and was skipped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedStep {
    /// The step.
    pub step: RecoveryStep,
    /// Failure reason.
    pub reason: String,
}

/// Result of executing a plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveryOutcome {
    /// The repaired document.
    pub document: Value,
    /// Steps that were applied.
    pub applied: Vec<RecoveryStep>,
    /// Steps that failed.
    pub failed: Vec<FailedStep>,
    /// Findings on the repaired document.
    pub remaining: CorruptionReport,
    /// Whether a high or critical issue was repaired.
    pub remediated: bool,
}

impl RecoveryOutcome {
    /// Outcome for a document that needed no work.
    #[must_use]
    pub fn untouched(document: Value, now: i64) -> Self {
        Self {
            document,
            applied: Vec::new(),
            failed: Vec::new(),
            remaining: CorruptionReport {
                issues: Vec::new(),
                checked_at: now,
            },
            remediated: false,
        }
    }

    /// Whether every planned step succeeded and nothing remains.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.remaining.is_clean()
    }

    pub(super) fn finish(mut self, remaining: CorruptionReport) -> Self {
        if !remaining.is_clean() {
            tracing::warn!(
                remaining = remaining.issues.len(),
                failed = self.failed.len(),
                "Partial save recovery"
            );
        }
        self.remaining = remaining;
        self
    }
}

/// Build a plan with one step per issue.
///
/// Steps run repair, reconstruct, substitute, remove, reset; within one
/// action, higher severity first.
#[must_use]
pub fn create_plan(document: &Value, report: &CorruptionReport) -> RecoveryPlan {
    let mut steps: Vec<RecoveryStep> = report
        .issues
        .iter()
        .map(|issue| RecoveryStep {
            order: 0,
            action: RecoveryAction::for_kind(issue.kind),
            issue: issue.clone(),
        })
        .collect();
    steps.sort_by(|a, b| {
        a.action
            .cmp(&b.action)
            .then_with(|| b.issue.severity.cmp(&a.issue.severity))
    });
    for (i, step) in steps.iter_mut().enumerate() {
        step.order = i + 1;
    }

    let loss_tenths = estimate_loss_tenths(&report.issues);
    let has_critical = report.issues.iter().any(|issue| issue.severity == Severity::Critical);

    RecoveryPlan {
        id: format!("plan-{}", report.checked_at),
        timestamp: report.checked_at,
        target_checksum: checksum::document_checksum(document),
        report: report.clone(),
        steps,
        estimated_data_loss: Fraction::from_num(loss_tenths) / Fraction::from_num(MAX_LOSS_TENTHS),
        risk_level: RiskLevel::classify(has_critical, loss_tenths),
    }
}

/// Summed severity losses in tenths, capped at 10.
#[must_use]
pub fn estimate_loss_tenths(issues: &[CorruptionIssue]) -> u32 {
    issues
        .iter()
        .map(|issue| issue.severity.loss_tenths())
        .sum::<u32>()
        .min(MAX_LOSS_TENTHS)
}

/// Apply every step to a copy of `document`. Failing steps are skipped.
/// The caller re-validates the result.
pub(super) fn execute(document: &Value, plan: &RecoveryPlan) -> RecoveryOutcome {
    let mut working = document.clone();
    let mut applied = Vec::new();
    let mut failed = Vec::new();

    for step in &plan.steps {
        let issue = &step.issue;
        match apply(&mut working, issue) {
            Ok(()) => {
                if issue.severity >= Severity::High {
                    tracing::warn!(
                        issue = %issue.id,
                        kind = %issue.kind,
                        path = %issue.path,
                        strategy = issue.strategy.name(),
                        "Repaired save corruption"
                    );
                } else {
                    tracing::debug!(
                        issue = %issue.id,
                        kind = %issue.kind,
                        path = %issue.path,
                        strategy = issue.strategy.name(),
                        "Repaired save corruption"
                    );
                }
                applied.push(step.clone());
            }
            Err(e) => {
                tracing::warn!(issue = %issue.id, path = %issue.path, error = %e, "Skipping recovery step");
                failed.push(FailedStep {
                    step: step.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    if working != *document {
        let sealed = checksum::document_checksum(&working);
        if let Some(object) = working.as_object_mut() {
            object.insert("checksum".into(), Value::String(sealed));
        }
    }

    let remediated = applied
        .iter()
        .any(|step| step.issue.severity >= Severity::High);

    RecoveryOutcome {
        document: working,
        applied,
        failed,
        remaining: CorruptionReport::default(),
        remediated,
    }
}

fn apply(document: &mut Value, issue: &CorruptionIssue) -> Result<(), RepairError> {
    match &issue.strategy {
        RepairStrategy::Replace(value) | RepairStrategy::Reconstruct(value) => {
            set(document, &issue.path, value.clone())
        }
        RepairStrategy::Drop => remove(document, &issue.path),
        RepairStrategy::SwapSaveTimes => {
            let object = root(document, &issue.path)?;
            let timestamp = object.get("timestamp").and_then(Value::as_i64);
            let last_save = object.get("lastSaveTime").and_then(Value::as_i64);
            match (timestamp, last_save) {
                (Some(timestamp), Some(last_save)) if last_save > timestamp => {
                    object.insert("timestamp".into(), Value::from(last_save));
                    object.insert("lastSaveTime".into(), Value::from(timestamp));
                    Ok(())
                }
                (Some(_), Some(_)) => Ok(()),
                _ => Err(RepairError::Unreachable(issue.path.to_string())),
            }
        }
        RepairStrategy::RegenerateChecksum => {
            let sealed = checksum::document_checksum(document);
            root(document, &issue.path)?.insert("checksum".into(), Value::String(sealed));
            Ok(())
        }
        RepairStrategy::Unrepairable => Err(RepairError::Unrepairable(issue.path.to_string())),
    }
}

fn root<'a>(
    document: &'a mut Value,
    path: &FieldPath,
) -> Result<&'a mut Map<String, Value>, RepairError> {
    document
        .as_object_mut()
        .ok_or_else(|| RepairError::Unreachable(path.to_string()))
}

fn child<'a>(
    document: &'a mut Value,
    field: &str,
    path: &FieldPath,
) -> Result<&'a mut Map<String, Value>, RepairError> {
    root(document, path)?
        .get_mut(field)
        .and_then(Value::as_object_mut)
        .ok_or_else(|| RepairError::Unreachable(path.to_string()))
}

fn set(document: &mut Value, path: &FieldPath, value: Value) -> Result<(), RepairError> {
    match path {
        FieldPath::Root => *document = value,
        FieldPath::Field(field) => {
            root(document, path)?.insert(field.clone(), value);
        }
        FieldPath::Resource(key) => {
            child(document, "resources", path)?.insert(key.clone(), value);
        }
        FieldPath::Building(key) => {
            child(document, "buildings", path)?.insert(key.clone(), value);
        }
        FieldPath::BuildingField(key, field) => {
            child(document, "buildings", path)?
                .get_mut(key)
                .and_then(Value::as_object_mut)
                .ok_or_else(|| RepairError::Unreachable(path.to_string()))?
                .insert((*field).to_string(), value);
        }
        _ => return Err(RepairError::Unrepairable(path.to_string())),
    }
    Ok(())
}

fn remove(document: &mut Value, path: &FieldPath) -> Result<(), RepairError> {
    match path {
        FieldPath::Resource(key) => {
            child(document, "resources", path)?.remove(key);
        }
        FieldPath::Building(key) => {
            child(document, "buildings", path)?.remove(key);
        }
        FieldPath::ListItem(list, key) => {
            root(document, path)?
                .get_mut(*list)
                .and_then(Value::as_array_mut)
                .ok_or_else(|| RepairError::Unreachable(path.to_string()))?
                .retain(|item| checksum::item_key(item) != *key);
        }
        _ => return Err(RepairError::Unrepairable(path.to_string())),
    }
    Ok(())
}
