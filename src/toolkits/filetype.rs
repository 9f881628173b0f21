//! File-type distribution analyzer

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

use super::walk_files;
use crate::tools::{optional_bool, optional_str, required_str, ToolDefinition, Toolkit};

#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("The directory '{0}' does not exist.")]
    DirectoryNotFound(String),
    #[error("Unsupported output format: {0}. Use 'json' or 'txt'.")]
    UnsupportedFormat(String),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

/// Counts and shares of each extension (lowercased, with the leading dot;
/// files without one are counted under "")
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FileTypeReport {
    pub file_counts: BTreeMap<String, u64>,
    pub percentages: BTreeMap<String, f64>,
    pub total_files: u64,
}

impl FileTypeReport {
    /// Percentages, largest first
    fn ranked(&self) -> Vec<(&str, f64)> {
        let mut ranked: Vec<(&str, f64)> = self
            .percentages
            .iter()
            .map(|(ext, pct)| (ext.as_str(), *pct))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(b.0)));
        ranked
    }
}

fn label(ext: &str) -> &str {
    if ext.is_empty() {
        "Other"
    } else {
        ext
    }
}

pub fn analyze(dir: &Path, recursive: bool, exclude: &[String]) -> Result<FileTypeReport, AnalyzerError> {
    if !dir.exists() {
        return Err(AnalyzerError::DirectoryNotFound(dir.display().to_string()));
    }

    let excluded: Vec<PathBuf> = exclude.iter().map(|p| dir.join(p)).collect();
    let is_excluded = |path: &Path| excluded.iter().any(|e| path.starts_with(e));

    let mut file_counts: BTreeMap<String, u64> = BTreeMap::new();
    for file in walk_files(dir, recursive, &is_excluded)? {
        let ext = file
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        *file_counts.entry(ext).or_default() += 1;
    }

    let total_files: u64 = file_counts.values().sum();
    let percentages = file_counts
        .iter()
        .map(|(ext, count)| (ext.clone(), *count as f64 / total_files as f64 * 100.0))
        .collect();

    Ok(FileTypeReport {
        file_counts,
        percentages,
        total_files,
    })
}

/// Write the report as pretty JSON or `ext: pct%` lines
pub fn write_report(report: &FileTypeReport, format: &str, output: &Path) -> Result<(), AnalyzerError> {
    let body = match format {
        "json" => serde_json::to_string_pretty(report)?,
        "txt" => report
            .percentages
            .iter()
            .map(|(ext, pct)| format!("{}: {:.2}%\n", ext, pct))
            .collect(),
        other => return Err(AnalyzerError::UnsupportedFormat(other.to_string())),
    };
    std::fs::write(output, body)?;
    Ok(())
}

pub fn render_summary(report: &FileTypeReport) -> String {
    let mut out = String::from("\nFile Type Analysis Summary:\n\n");
    let _ = writeln!(out, "Total Files Analyzed: {}", report.total_files);
    out.push_str("File Counts by Type:\n");

    let mut counts: Vec<_> = report.file_counts.iter().collect();
    counts.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
    for (ext, count) in counts {
        let _ = writeln!(out, "  {:<10}: {}", label(ext), count);
    }
    out
}

pub fn render_bar_chart(report: &FileTypeReport) -> String {
    let mut out = String::from("\nFile Type Distribution (Bar Chart):\n\n");
    for (ext, pct) in report.ranked() {
        let bar = "█".repeat((pct / 2.0) as usize);
        let _ = writeln!(out, "{:<10}: {} {:.2}%", label(ext), bar, pct);
    }
    out
}

pub fn render_pie_chart(report: &FileTypeReport) -> String {
    let mut out = String::from("\nFile Type Distribution (Pie Chart):\n\n");
    let total: f64 = report.percentages.values().sum();
    for (ext, pct) in report.ranked() {
        let segment = "○".repeat((pct / total * 20.0) as usize);
        let _ = writeln!(out, "{:<10}: {} {:.2}%", label(ext), segment, pct);
    }
    out
}

#[derive(Default)]
pub struct FileTypeAnalyzerToolkit;

impl FileTypeAnalyzerToolkit {
    pub fn new() -> Self {
        Self
    }

    fn run(&self, args: &Value) -> Result<String> {
        let project_dir = required_str(args, "project_dir")?;
        let recursive = optional_bool(args, "include_subdirectories", true);
        let exclude: Vec<String> = args
            .get("exclude_paths")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();
        let format = optional_str(args, "output_format").unwrap_or("json");
        let output_file = optional_str(args, "output_file");
        let visualize = optional_bool(args, "visualize", true);

        let outcome = analyze(Path::new(project_dir), recursive, &exclude).and_then(|report| {
            if let Some(file) = output_file {
                write_report(&report, format, Path::new(file))?;
            }
            Ok(report)
        });

        let report = match outcome {
            Ok(report) => report,
            Err(e) => return Ok(json!({"status": "error", "message": e.to_string()}).to_string()),
        };

        let mut out = serde_json::to_string_pretty(&report)?;
        if visualize {
            let charts = [
                render_summary(&report),
                render_bar_chart(&report),
                render_pie_chart(&report),
            ]
            .concat();
            info!("{}", charts);
            out.push('\n');
            out.push_str(&charts);
        }
        Ok(out)
    }
}

#[async_trait]
impl Toolkit for FileTypeAnalyzerToolkit {
    fn name(&self) -> &'static str {
        "filetype_analyzer"
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition::new(
            "analyze_file_types",
            "Analyze the percentage distribution of file types in a directory, with explicit path exclusions.",
            json!({
                "type": "object",
                "properties": {
                    "project_dir": {"type": "string", "description": "Path to the project directory."},
                    "include_subdirectories": {"type": "boolean", "description": "Include subdirectories (default true)."},
                    "exclude_paths": {"type": "array", "items": {"type": "string"}, "description": "File or directory paths to exclude, relative to project_dir."},
                    "output_format": {"type": "string", "enum": ["json", "txt"], "description": "Report format (default json)."},
                    "output_file": {"type": "string", "description": "Optional report file."},
                    "visualize": {"type": "boolean", "description": "Append text charts (default true)."}
                },
                "required": ["project_dir"]
            }),
        )]
    }

    async fn call(&self, _tool: &str, args: &Value) -> Result<String> {
        self.run(args)
    }
}
