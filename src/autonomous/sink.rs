//! Result Sink
//!
//! One text file per (task, iteration) under the results directory, kept for
//! post-hoc debugging. Nothing reads these back.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ResultSink {
    dir: PathBuf,
}

impl ResultSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<task_id>_iteration_<n>.txt`
    pub fn snapshot_path(&self, task_id: &str, iteration: u64) -> PathBuf {
        self.dir.join(format!("{}_iteration_{}.txt", task_id, iteration))
    }

    /// Create the results directory if needed
    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create results dir {}", self.dir.display()))
    }

    /// Persist one iteration's output
    pub async fn write_intermediate(
        &self,
        task_id: &str,
        iteration: u64,
        result: &str,
    ) -> Result<PathBuf> {
        let path = self.snapshot_path(task_id, iteration);
        let body = format!(
            "Task ID: {}\nIteration: {}\nResult:\n{}\n",
            task_id, iteration, result
        );
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        debug!("Wrote snapshot {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_snapshot_layout() {
        let temp = TempDir::new().unwrap();
        let sink = ResultSink::new(temp.path().join("results"));
        sink.ensure_dir().await.unwrap();

        let path = sink.write_intermediate("task_1", 2, "line one\nline two").await.unwrap();
        assert!(path.ends_with("task_1_iteration_2.txt"));

        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content, "Task ID: task_1\nIteration: 2\nResult:\nline one\nline two\n");
    }

    #[tokio::test]
    async fn test_write_fails_without_dir() {
        let temp = TempDir::new().unwrap();
        let sink = ResultSink::new(temp.path().join("missing"));
        assert!(sink.write_intermediate("task_1", 1, "x").await.is_err());
    }
}
