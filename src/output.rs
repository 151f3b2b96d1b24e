//! Simple Output and Reporting
//!
//! This module provides output formatting for namespace listings and
//! validation results.

use serde::Serialize;
use std::path::PathBuf;

use crate::cli::{OutputFormat, VerbosityLevel};
use crate::libxml2::ValidationResult;

/// Outcome of validating one file
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ReportStatus {
    Valid,
    Invalid { error_count: i32, errors: Vec<String> },
    Error { message: String },
}

impl From<ValidationResult> for ReportStatus {
    fn from(result: ValidationResult) -> Self {
        match result {
            ValidationResult::Valid => ReportStatus::Valid,
            ValidationResult::Invalid {
                error_count,
                errors,
            } => ReportStatus::Invalid {
                error_count,
                errors,
            },
            ValidationResult::InternalError { code } => ReportStatus::Error {
                message: format!("libxml2 internal error (code {})", code),
            },
        }
    }
}

/// Validation report for a single file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub namespace: Option<String>,
    #[serde(flatten)]
    pub status: ReportStatus,
}

impl FileReport {
    pub fn is_valid(&self) -> bool {
        matches!(self.status, ReportStatus::Valid)
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    files: &'a [FileReport],
    total: usize,
    valid: usize,
    invalid: usize,
    errors: usize,
}

/// Simple output formatter for human-readable and JSON results
pub struct Output {
    verbosity: VerbosityLevel,
    format: OutputFormat,
    show_colors: bool,
}

impl Output {
    pub fn new(verbosity: VerbosityLevel, format: OutputFormat) -> Self {
        Self {
            verbosity,
            format,
            show_colors: format == OutputFormat::Human && atty::is(atty::Stream::Stdout),
        }
    }

    fn colorize(&self, text: &str, color: &str) -> String {
        if self.show_colors {
            format!("\x1b[{}m{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    /// Format the cached namespaces, one per line for humans
    pub fn format_namespaces(&self, namespaces: &[String]) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(namespaces).unwrap_or_else(|_| "[]".to_string())
            }
            OutputFormat::Human => {
                let mut output = String::new();
                for (index, namespace) in namespaces.iter().enumerate() {
                    output.push_str(&format!("{:>4}  {}\n", index, namespace));
                }
                output
            }
        }
    }

    pub fn format_reports(&self, reports: &[FileReport]) -> String {
        let valid = reports.iter().filter(|r| r.is_valid()).count();
        let invalid = reports
            .iter()
            .filter(|r| matches!(r.status, ReportStatus::Invalid { .. }))
            .count();
        let errors = reports.len() - valid - invalid;

        if self.format == OutputFormat::Json {
            let report = JsonReport {
                files: reports,
                total: reports.len(),
                valid,
                invalid,
                errors,
            };
            return serde_json::to_string_pretty(&report).unwrap_or_else(|_| "{}".to_string());
        }

        let mut output = String::new();
        for report in reports {
            if report.is_valid() && self.verbosity == VerbosityLevel::Quiet {
                continue;
            }
            output.push_str(&self.format_file_report(report));
            output.push('\n');
        }

        if self.verbosity > VerbosityLevel::Quiet || valid != reports.len() {
            output.push_str("Validation Summary:\n");
            output.push_str(&format!("  Total files: {}\n", reports.len()));
            output.push_str(&format!("  {} {}\n", self.colorize("Valid:", "32"), valid));
            if invalid > 0 {
                output.push_str(&format!("  {} {}\n", self.colorize("Invalid:", "31"), invalid));
            }
            if errors > 0 {
                output.push_str(&format!("  {} {}\n", self.colorize("Errors:", "33"), errors));
            }
        }

        output
    }

    pub fn format_file_report(&self, report: &FileReport) -> String {
        let path_display = report.path.display();

        match &report.status {
            ReportStatus::Valid => {
                format!("{}  {}", self.colorize("✓ VALID", "32"), path_display)
            }
            ReportStatus::Invalid {
                error_count,
                errors,
            } => {
                let mut output = format!(
                    "{}  {} - {} error{}",
                    self.colorize("✗ INVALID", "31"),
                    path_display,
                    error_count,
                    if *error_count == 1 { "" } else { "s" }
                );

                if self.verbosity >= VerbosityLevel::Verbose {
                    for error_detail in errors {
                        output.push_str(&format!("\n    {}", error_detail));
                    }
                }
                output
            }
            ReportStatus::Error { message } => {
                format!(
                    "{}  {} - {}",
                    self.colorize("⚠ ERROR", "33"),
                    path_display,
                    message
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reports() -> Vec<FileReport> {
        vec![
            FileReport {
                path: PathBuf::from("good.xml"),
                namespace: Some("urn:a".to_string()),
                status: ReportStatus::Valid,
            },
            FileReport {
                path: PathBuf::from("bad.xml"),
                namespace: Some("urn:a".to_string()),
                status: ReportStatus::Invalid {
                    error_count: 1,
                    errors: vec!["Element 'x': not expected".to_string()],
                },
            },
            FileReport {
                path: PathBuf::from("orphan.xml"),
                namespace: None,
                status: ReportStatus::Error {
                    message: "Schema not found: ".to_string(),
                },
            },
        ]
    }

    #[test]
    fn test_human_summary() {
        let output = Output::new(VerbosityLevel::Normal, OutputFormat::Human);
        let formatted = output.format_reports(&reports());

        assert!(formatted.contains("Validation Summary:"));
        assert!(formatted.contains("Total files: 3"));
        assert!(formatted.contains("good.xml"));
        assert!(formatted.contains("bad.xml - 1 error"));
        assert!(!formatted.contains("not expected"));
    }

    #[test]
    fn test_verbose_shows_error_details() {
        let output = Output::new(VerbosityLevel::Verbose, OutputFormat::Human);
        let formatted = output.format_reports(&reports());
        assert!(formatted.contains("Element 'x': not expected"));
    }

    #[test]
    fn test_quiet_hides_valid_files() {
        let output = Output::new(VerbosityLevel::Quiet, OutputFormat::Human);
        let formatted = output.format_reports(&reports());
        assert!(!formatted.contains("good.xml"));
        assert!(formatted.contains("bad.xml"));
    }

    #[test]
    fn test_json_report() {
        let output = Output::new(VerbosityLevel::Normal, OutputFormat::Json);
        let formatted = output.format_reports(&reports());
        let value: serde_json::Value = serde_json::from_str(&formatted).unwrap();

        assert_eq!(value["total"], 3);
        assert_eq!(value["valid"], 1);
        assert_eq!(value["invalid"], 1);
        assert_eq!(value["errors"], 1);
        assert_eq!(value["files"][0]["status"], "valid");
        assert_eq!(value["files"][1]["error_count"], 1);
    }

    #[test]
    fn test_format_namespaces() {
        let namespaces = vec!["urn:a".to_string(), "urn:b".to_string()];

        let human = Output::new(VerbosityLevel::Normal, OutputFormat::Human);
        assert_eq!(
            human.format_namespaces(&namespaces),
            "   0  urn:a\n   1  urn:b\n"
        );

        let json = Output::new(VerbosityLevel::Normal, OutputFormat::Json);
        let value: serde_json::Value =
            serde_json::from_str(&json.format_namespaces(&namespaces)).unwrap();
        assert_eq!(value, serde_json::json!(["urn:a", "urn:b"]));
    }

    #[test]
    fn test_status_from_validation_result() {
        assert_eq!(
            ReportStatus::from(ValidationResult::Valid),
            ReportStatus::Valid
        );
        assert!(matches!(
            ReportStatus::from(ValidationResult::InternalError { code: -2 }),
            ReportStatus::Error { .. }
        ));
    }
}
