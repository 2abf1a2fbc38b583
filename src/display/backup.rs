//! Backup display formatting
//!
//! Formats backup records and validation results for terminal output.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::Utc;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use super::format::{format_age, format_duration_ms, format_size};
use crate::models::BackupRecord;
use crate::validation::ValidationResult;

#[derive(Tabled)]
struct BackupRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "File")]
    filename: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Age")]
    age: String,
    #[tabled(rename = "Duration")]
    duration: String,
}

impl From<&BackupRecord> for BackupRow {
    fn from(record: &BackupRecord) -> Self {
        Self {
            id: short_id(&record.id).to_string(),
            filename: record.filename.clone(),
            status: record.status.to_string(),
            size: format_size(record.size),
            age: format_age(record.age()),
            duration: format_duration_ms(record.duration_ms),
        }
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Format backup records as a table
pub fn format_backup_list(records: &[BackupRecord]) -> String {
    if records.is_empty() {
        return "No backups found.".to_string();
    }

    let rows: Vec<BackupRow> = records.iter().map(BackupRow::from).collect();
    let total: u64 = records.iter().map(|r| r.size).sum();

    let mut output = Table::new(rows).with(Style::rounded()).to_string();
    output.push_str(&format!(
        "\nTotal: {} backup(s), {}\n",
        records.len(),
        format_size(total)
    ));
    output
}

/// Format a single backup record in detail
pub fn format_backup_details(record: &BackupRecord) -> String {
    let mut output = String::new();
    output.push_str("Backup Details\n");
    output.push_str("==============\n");
    output.push_str(&format!("ID:       {}\n", record.id));
    output.push_str(&format!("File:     {}\n", record.file_path.display()));
    output.push_str(&format!("Status:   {}\n", record.status));
    output.push_str(&format!("Size:     {}\n", format_size(record.size)));
    output.push_str(&format!(
        "Created:  {} ({} ago)\n",
        record.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
        format_age(Utc::now() - record.created_at)
    ));
    if let Some(created_by) = &record.created_by {
        output.push_str(&format!("By:       {}\n", created_by));
    }
    output.push_str(&format!("Duration: {}\n", format_duration_ms(record.duration_ms)));
    output.push_str(&format!("Checksum: {}\n", record.checksum));
    output.push_str(&format!(
        "Version:  {} (schema {})\n",
        record.version, record.schema_version
    ));
    output
}

/// Format one validation result
pub fn format_validation_result(path: &std::path::Path, result: &ValidationResult) -> String {
    let mut output = format!(
        "{}: {} ({}, {})\n",
        path.display(),
        if result.is_valid { "VALID" } else { "INVALID" },
        format_size(result.size),
        format_duration_ms(result.validation_time_ms)
    );
    if !result.checksum.is_empty() {
        output.push_str(&format!("  Checksum: {}\n", result.checksum));
    }
    for error in &result.errors {
        output.push_str(&format!("  Error:    {}\n", error));
    }
    for warning in &result.warnings {
        output.push_str(&format!("  Warning:  {}\n", warning));
    }
    output
}

/// Format several validation results in path order
pub fn format_validation_results(results: &BTreeMap<PathBuf, ValidationResult>) -> String {
    results
        .iter()
        .map(|(path, result)| format_validation_result(path, result))
        .collect::<Vec<_>>()
        .join("\n")
}
