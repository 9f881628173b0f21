//! Code complexity toolkit for Python projects

pub mod metrics;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use tracing::warn;

use super::walk_files;
use crate::tools::{required_str, ToolDefinition, Toolkit};
pub use metrics::{cyclomatic_complexity, halstead, maintainability_index, HalsteadMetrics};

#[derive(Default)]
pub struct CodeComplexityToolkit;

impl CodeComplexityToolkit {
    pub fn new() -> Self {
        Self
    }

    /// Every `.py` file under `directory`; an unreadable directory yields none
    pub fn python_files(&self, directory: &str) -> Vec<String> {
        match walk_files(Path::new(directory), true, &|_| false) {
            Ok(files) => files
                .into_iter()
                .filter(|p| p.extension().is_some_and(|e| e == "py"))
                .map(|p| p.display().to_string())
                .collect(),
            Err(e) => {
                warn!("Cannot list {}: {}", directory, e);
                Vec::new()
            }
        }
    }

    /// Average cyclomatic complexity, Halstead volume and MI over a directory
    pub fn analyze_complexity(&self, directory: &str) -> Value {
        let files = self.python_files(directory);
        if files.is_empty() {
            return json!({"error": format!("No Python files found in the directory: {}", directory)});
        }

        let (mut cc, mut volume, mut mi, mut count) = (0.0, 0.0, 0.0, 0usize);
        for file in &files {
            let code = match std::fs::read_to_string(file) {
                Ok(code) => code,
                Err(e) => {
                    warn!("Error processing {}: {}", file, e);
                    continue;
                }
            };
            cc += cyclomatic_complexity(&code) as f64;
            volume += halstead(&code).volume;
            mi += maintainability_index(&code);
            count += 1;
        }

        if count == 0 {
            return json!({"error": "No valid Python files to analyze."});
        }
        let n = count as f64;
        json!({
            "avg_cyclomatic_complexity": cc / n,
            "avg_halstead_complexity": volume / n,
            "avg_maintainability_index": mi / n,
        })
    }

    /// Average precomputed per-file metrics
    pub fn aggregate_results(&self, results: &Value) -> Value {
        let numbers = |key: &str| -> Vec<f64> {
            results
                .get(key)
                .and_then(|v| v.as_array())
                .map(|a| a.iter().filter_map(|v| v.as_f64()).collect())
                .unwrap_or_default()
        };
        let volumes: Vec<f64> = results
            .get("halstead_metrics")
            .and_then(|v| v.as_array())
            .map(|a| {
                a.iter()
                    .filter_map(|h| {
                        h.as_f64()
                            .or_else(|| h.get("volume").and_then(|v| v.as_f64()))
                            .or_else(|| h.get("halstead_volume").and_then(|v| v.as_f64()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let average = |xs: &[f64]| xs.iter().sum::<f64>() / xs.len() as f64;
        let cc = numbers("cyclomatic_complexity");
        let mi = numbers("maintainability_index");
        if cc.is_empty() || volumes.is_empty() || mi.is_empty() {
            return json!({"error": "No valid results to aggregate."});
        }

        json!({
            "avg_cyclomatic_complexity": average(&cc),
            "avg_halstead_complexity": average(&volumes),
            "avg_maintainability_index": average(&mi),
        })
    }
}

fn code_schema() -> Value {
    json!({
        "type": "object",
        "properties": {"code": {"type": "string", "description": "The Python code to analyze."}},
        "required": ["code"]
    })
}

fn directory_schema() -> Value {
    json!({
        "type": "object",
        "properties": {"directory": {"type": "string", "description": "Directory containing Python files."}},
        "required": ["directory"]
    })
}

#[async_trait]
impl Toolkit for CodeComplexityToolkit {
    fn name(&self) -> &'static str {
        "code_complexity"
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new("get_python_files", "Retrieve all Python files from the specified directory.", directory_schema()),
            ToolDefinition::new(
                "analyze_complexity",
                "Average cyclomatic complexity, Halstead volume and maintainability index for all Python files in a directory.",
                directory_schema(),
            ),
            ToolDefinition::new("cyclomatic_complexity", "Calculate the cyclomatic complexity of Python code.", code_schema()),
            ToolDefinition::new("halstead_complexity", "Calculate Halstead metrics (volume, difficulty, effort...) of Python code.", code_schema()),
            ToolDefinition::new("maintainability_index", "Calculate the maintainability index (0-100) of Python code.", code_schema()),
            ToolDefinition::new(
                "aggregate_results",
                "Average lists of per-file complexity metrics.",
                json!({
                    "type": "object",
                    "properties": {
                        "results": {
                            "type": "object",
                            "description": "Lists under cyclomatic_complexity, halstead_metrics and maintainability_index."
                        }
                    },
                    "required": ["results"]
                }),
            ),
        ]
    }

    async fn call(&self, tool: &str, args: &Value) -> Result<String> {
        let out = match tool {
            "get_python_files" => json!(self.python_files(required_str(args, "directory")?)),
            "analyze_complexity" => self.analyze_complexity(required_str(args, "directory")?),
            "cyclomatic_complexity" => json!(cyclomatic_complexity(required_str(args, "code")?)),
            "halstead_complexity" => serde_json::to_value(halstead(required_str(args, "code")?))?,
            "maintainability_index" => json!(maintainability_index(required_str(args, "code")?)),
            "aggregate_results" => self.aggregate_results(args.get("results").unwrap_or(&Value::Null)),
            other => anyhow::bail!("Unknown tool: {}", other),
        };
        Ok(out.to_string())
    }
}
