//! Plain-text validation reports

use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::PathBuf;

use serde::Serialize;

use super::validator::ValidationResult;

/// Totals across a set of validation results
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub total_errors: usize,
    pub total_warnings: usize,
    /// Percentage of valid results, one decimal; NaN when there are none
    pub success_rate: f64,
}

impl ValidationSummary {
    pub fn from_results(results: &BTreeMap<PathBuf, ValidationResult>) -> Self {
        let total = results.len();
        let valid = results.values().filter(|r| r.is_valid).count();
        let rate = valid as f64 / total as f64 * 100.0;

        Self {
            total,
            valid,
            invalid: total - valid,
            total_errors: results.values().map(|r| r.errors.len()).sum(),
            total_warnings: results.values().map(|r| r.warnings.len()).sum(),
            success_rate: (rate * 10.0).round() / 10.0,
        }
    }
}

/// Render a per-file breakdown followed by a summary
pub fn generate_validation_report(results: &BTreeMap<PathBuf, ValidationResult>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Backup Validation Report");
    let _ = writeln!(out, "========================");

    for (path, result) in results {
        let _ = writeln!(out);
        let _ = writeln!(out, "File: {}", path.display());
        let _ = writeln!(
            out,
            "  Status:   {}",
            if result.is_valid { "VALID" } else { "INVALID" }
        );
        let _ = writeln!(out, "  Size:     {} bytes", result.size);
        if !result.checksum.is_empty() {
            let _ = writeln!(out, "  Checksum: {}", result.checksum);
        }
        let _ = writeln!(out, "  Time:     {} ms", result.validation_time_ms);

        if !result.errors.is_empty() {
            let _ = writeln!(out, "  Errors:");
            for error in &result.errors {
                let _ = writeln!(out, "    - {}", error);
            }
        }
        if !result.warnings.is_empty() {
            let _ = writeln!(out, "  Warnings:");
            for warning in &result.warnings {
                let _ = writeln!(out, "    - {}", warning);
            }
        }
    }

    let summary = ValidationSummary::from_results(results);
    let _ = writeln!(out);
    let _ = writeln!(out, "Summary");
    let _ = writeln!(out, "-------");
    let _ = writeln!(out, "Total backups:  {}", summary.total);
    let _ = writeln!(out, "Valid:          {}", summary.valid);
    let _ = writeln!(out, "Invalid:        {}", summary.invalid);
    let _ = writeln!(out, "Total errors:   {}", summary.total_errors);
    let _ = writeln!(out, "Total warnings: {}", summary.total_warnings);
    let _ = writeln!(out, "Success rate:   {:.1}%", summary.success_rate);

    out
}
