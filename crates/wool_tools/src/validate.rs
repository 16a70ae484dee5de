//! Save and catalog validation.
//!
//! Save files are read as raw JSON and checked with the same rules the
//! sync server applies, so a file that passes here loads cleanly there.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use wool_core::catalog::Catalog;
use wool_core::integrity::{CorruptionReport, IntegrityEngine, RecoveryPlan};

use crate::error::{Result, ToolError};

/// What a repair run did.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairSummary {
    /// Findings before repair.
    pub report: CorruptionReport,
    /// The plan that was executed.
    pub plan: RecoveryPlan,
    /// Steps that applied.
    pub applied: usize,
    /// Steps that failed.
    pub failed: usize,
    /// Findings left after repair.
    pub remaining: CorruptionReport,
    /// Whether a high or critical issue was repaired.
    pub remediated: bool,
    /// Where the repaired save went, if it was written.
    pub written: Option<PathBuf>,
}

pub(crate) fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| ToolError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Load a catalog from a RON file, or the built-in one when `path` is `None`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_catalog(path: Option<&Path>) -> Result<Arc<Catalog>> {
    let catalog = match path {
        Some(path) => Catalog::from_ron(&read_text(path)?, &path.display().to_string())?,
        None => Catalog::llama_farm(),
    };
    Ok(Arc::new(catalog))
}

/// Read a save file as a JSON document. Text that is not JSON becomes
/// `null`, which the structural rules report as critical.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn read_document(path: &Path) -> Result<Value> {
    let text = read_text(path)?;
    Ok(serde_json::from_str(&text).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "Save is not valid JSON");
        Value::Null
    }))
}

/// Check a save file without changing it.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn check_save(engine: &IntegrityEngine, path: &Path, now: i64) -> Result<CorruptionReport> {
    let document = read_document(path)?;
    let report = engine.detect_corruption(&document, now);
    tracing::info!(
        path = %path.display(),
        issues = report.issues.len(),
        "Checked save"
    );
    Ok(report)
}

/// Repair a save file. The repaired document goes to `output` when given;
/// nothing is written otherwise.
///
/// # Errors
///
/// Returns an error if a file cannot be read or written.
pub fn repair_save(
    engine: &IntegrityEngine,
    input: &Path,
    output: Option<&Path>,
    now: i64,
) -> Result<RepairSummary> {
    let document = read_document(input)?;
    let report = engine.detect_corruption(&document, now);
    let plan = engine.create_recovery_plan(&document, &report);
    let outcome = engine.execute_recovery(&document, &plan);

    let written = match output {
        Some(path) if !report.is_clean() => {
            let text = serde_json::to_string_pretty(&outcome.document)?;
            fs::write(path, text).map_err(|source| ToolError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            tracing::info!(path = %path.display(), steps = outcome.applied.len(), "Wrote repaired save");
            Some(path.to_path_buf())
        }
        _ => None,
    };

    Ok(RepairSummary {
        applied: outcome.applied.len(),
        failed: outcome.failed.len(),
        remaining: outcome.remaining,
        remediated: outcome.remediated,
        report,
        plan,
        written,
    })
}

/// Load and check a catalog file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn check_catalog(path: Option<&Path>, now: i64) -> Result<CorruptionReport> {
    let catalog = load_catalog(path)?;
    Ok(catalog.validate(now))
}

/// One line per issue, for terminal output.
#[must_use]
pub fn describe_report(report: &CorruptionReport) -> Vec<String> {
    report
        .issues
        .iter()
        .map(|issue| {
            format!(
                "[{}] {} at {}: expected {}, found {}",
                issue.severity, issue.kind, issue.path, issue.expected, issue.actual
            )
        })
        .collect()
}
