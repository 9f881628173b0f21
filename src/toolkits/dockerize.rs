//! Dockerize toolkit
//!
//! Detects a project's ecosystem from its manifest and writes a starter
//! `Dockerfile` and `.dockerignore`.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::tools::{optional_str, required_str, ToolDefinition, Toolkit};

#[derive(Debug, thiserror::Error)]
pub enum DockerizeError {
    #[error("Unsupported project type or no recognizable files found.")]
    UnsupportedProject,
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
    Nodejs,
    Python,
    Java,
}

impl ProjectType {
    /// First matching manifest wins: package.json, requirements.txt, pom.xml
    pub fn detect(project_dir: &Path) -> Result<Self, DockerizeError> {
        [
            ("package.json", Self::Nodejs),
            ("requirements.txt", Self::Python),
            ("pom.xml", Self::Java),
        ]
        .into_iter()
        .find(|(manifest, _)| project_dir.join(manifest).exists())
        .map(|(_, kind)| kind)
        .ok_or(DockerizeError::UnsupportedProject)
    }

    fn dockerfile(self) -> &'static str {
        match self {
            Self::Nodejs => "FROM node:18-alpine\nWORKDIR /app\nCOPY package*.json ./\nRUN npm install\nCOPY . .\nCMD [\"npm\", \"start\"]\n",
            Self::Python => "FROM python:3.10-slim\nWORKDIR /app\nCOPY requirements.txt .\nRUN pip install --no-cache-dir -r requirements.txt\nCOPY . .\nCMD [\"python\", \"app.py\"]\n",
            Self::Java => "FROM openjdk:17-slim\nWORKDIR /app\nCOPY . .\nRUN ./mvnw clean package\nCMD [\"java\", \"-jar\", \"target/app.jar\"]\n",
        }
    }

    fn dockerignore(self) -> &'static str {
        match self {
            Self::Nodejs => "node_modules/\nnpm-debug.log\n.git/\n",
            Self::Python => "__pycache__/\n*.pyc\n.env\n.git/\n",
            Self::Java => "target/\n.git/\n",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DockerizeDetails {
    pub project_type: ProjectType,
    pub output_dir: PathBuf,
}

/// Write Docker files for the project into `output_dir` (default: the project itself)
pub fn generate(project_dir: &Path, output_dir: Option<&Path>) -> Result<DockerizeDetails, DockerizeError> {
    let project_type = ProjectType::detect(project_dir)?;
    let output_dir = output_dir.unwrap_or(project_dir).to_path_buf();

    std::fs::create_dir_all(&output_dir)?;
    std::fs::write(output_dir.join("Dockerfile"), project_type.dockerfile())?;
    std::fs::write(output_dir.join(".dockerignore"), project_type.dockerignore())?;

    info!("Wrote {:?} Docker files to {}", project_type, output_dir.display());
    Ok(DockerizeDetails {
        project_type,
        output_dir,
    })
}

#[derive(Default)]
pub struct DockerizationToolkit;

impl DockerizationToolkit {
    pub fn new() -> Self {
        Self
    }

    pub fn dockerize(&self, project_dir: &str, output_dir: Option<&str>) -> Value {
        match generate(Path::new(project_dir), output_dir.map(Path::new)) {
            Ok(details) => json!({"status": "success", "details": details}),
            Err(e) => json!({"status": "error", "message": e.to_string()}),
        }
    }
}

#[async_trait]
impl Toolkit for DockerizationToolkit {
    fn name(&self) -> &'static str {
        "dockerize"
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition::new(
            "dockerize",
            "Dockerize a project (Node.js, Python, Java) by generating a Dockerfile and .dockerignore.",
            json!({
                "type": "object",
                "properties": {
                    "project_dir": {"type": "string", "description": "Path to the project directory."},
                    "output_dir": {"type": "string", "description": "Output directory for Docker files. Defaults to the project directory."}
                },
                "required": ["project_dir"]
            }),
        )]
    }

    async fn call(&self, _tool: &str, args: &Value) -> Result<String> {
        let result = self.dockerize(required_str(args, "project_dir")?, optional_str(args, "output_dir"));
        Ok(result.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_detects_python_and_writes_files() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("requirements.txt"), "flask\n").unwrap();

        let out = DockerizationToolkit::new().dockerize(temp.path().to_str().unwrap(), None);
        assert_eq!(out["status"], "success");
        assert_eq!(out["details"]["project_type"], "python");

        let dockerfile = std::fs::read_to_string(temp.path().join("Dockerfile")).unwrap();
        assert!(dockerfile.starts_with("FROM python:3.10-slim"));
        assert!(temp.path().join(".dockerignore").exists());
    }

    #[test]
    fn test_node_wins_over_python() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("package.json"), "{}").unwrap();
        std::fs::write(temp.path().join("requirements.txt"), "").unwrap();
        assert_eq!(ProjectType::detect(temp.path()).unwrap(), ProjectType::Nodejs);
    }

    #[test]
    fn test_separate_output_dir() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("pom.xml"), "<project/>").unwrap();
        let out_dir = temp.path().join("docker");

        let details = generate(temp.path(), Some(&out_dir)).unwrap();
        assert_eq!(details.project_type, ProjectType::Java);
        assert!(out_dir.join("Dockerfile").exists());
        assert!(!temp.path().join("Dockerfile").exists());
    }

    #[test]
    fn test_unknown_project_reports_error() {
        let temp = TempDir::new().unwrap();
        let out = DockerizationToolkit::new().dockerize(temp.path().to_str().unwrap(), None);
        assert_eq!(
            out,
            json!({"status": "error", "message": "Unsupported project type or no recognizable files found."})
        );
    }
}
