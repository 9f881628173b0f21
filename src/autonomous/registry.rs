//! Task Registry
//!
//! Single owner of every autonomous task's state: the ongoing set, the
//! completed and failed histories, final results, latest in-progress
//! snapshots and pause flags. All of it sits behind one mutex so that a
//! worker finishing an iteration and a caller pausing or aborting the same
//! task can never interleave half-applied updates.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::watch;
use tracing::debug;

/// Task lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
    Aborted,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// One run of the autonomous loop
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub duration_seconds: u64,
    pub end_time: Option<DateTime<Utc>>,
    pub result: Option<String>,
    pub status: TaskStatus,
    /// Iterations run before the task was finalized
    pub iterations: u64,
}

impl Task {
    /// Seconds since start (or total run time once finished)
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> f64 {
        let end = self.end_time.unwrap_or(now);
        (end - self.start_time).num_milliseconds().max(0) as f64 / 1000.0
    }

    /// Seconds left before the loop deadline
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> f64 {
        (self.duration_seconds as f64 - self.elapsed_secs(now)).max(0.0)
    }
}

/// Most recent in-progress snapshot of a running task
#[derive(Debug, Clone, Serialize)]
pub struct LatestResult {
    pub task_id: String,
    pub current_answer: String,
    pub iterations: u64,
    pub elapsed_secs: u64,
    pub status: TaskStatus,
}

#[derive(Default)]
struct RegistryState {
    ongoing: BTreeMap<String, Task>,
    completed: Vec<Task>,
    failed: Vec<Task>,
    final_results: HashMap<String, String>,
    latest: HashMap<String, LatestResult>,
    pause_flags: HashMap<String, watch::Sender<bool>>,
}

impl RegistryState {
    fn knows(&self, id: &str) -> bool {
        self.pause_flags.contains_key(id)
            || self.ongoing.contains_key(id)
            || self.completed.iter().any(|t| t.id == id)
            || self.failed.iter().any(|t| t.id == id)
    }

    fn finalize(&mut self, task_id: &str, result: &str, status: TaskStatus) -> bool {
        let Some(mut task) = self.ongoing.remove(task_id) else {
            debug!("Ignoring finalization of {}: not ongoing", task_id);
            return false;
        };

        if let Some(latest) = self.latest.remove(task_id) {
            task.iterations = task.iterations.max(latest.iterations);
        }
        task.result = Some(result.to_string());
        task.end_time = Some(Utc::now());
        task.status = status;

        if status == TaskStatus::Completed {
            self.final_results.insert(task_id.to_string(), result.to_string());
            self.completed.push(task);
        } else {
            self.failed.push(task);
        }
        true
    }
}

/// Registry of autonomous tasks
#[derive(Default)]
pub struct TaskRegistry {
    state: Mutex<RegistryState>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a fresh `task_<unix seconds>` id, suffixed when the second is taken
    pub fn next_task_id(&self, now: DateTime<Utc>) -> String {
        let state = self.state.lock();
        let base = format!("task_{}", now.timestamp());
        if !state.knows(&base) {
            return base;
        }
        let mut n = 1;
        loop {
            let candidate = format!("{}_{}", base, n);
            if !state.knows(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Register a running task; returns the receiving side of its pause flag
    pub fn add_task(
        &self,
        task_id: &str,
        description: &str,
        duration_seconds: u64,
    ) -> watch::Receiver<bool> {
        let mut state = self.state.lock();

        let task = Task {
            id: task_id.to_string(),
            description: description.to_string(),
            start_time: Utc::now(),
            duration_seconds,
            end_time: None,
            result: None,
            status: TaskStatus::Running,
            iterations: 0,
        };
        state.ongoing.insert(task_id.to_string(), task);

        state.latest.insert(
            task_id.to_string(),
            LatestResult {
                task_id: task_id.to_string(),
                current_answer: String::new(),
                iterations: 0,
                elapsed_secs: 0,
                status: TaskStatus::Running,
            },
        );

        let (tx, rx) = watch::channel(false);
        state.pause_flags.insert(task_id.to_string(), tx);
        rx
    }

    /// Record the latest answer of a running task. No-op once finalized.
    pub fn update_latest(&self, task_id: &str, answer: &str, iterations: u64, elapsed_secs: u64) {
        let mut state = self.state.lock();
        if !state.ongoing.contains_key(task_id) {
            return;
        }
        if let Some(task) = state.ongoing.get_mut(task_id) {
            task.iterations = iterations;
        }
        state.latest.insert(
            task_id.to_string(),
            LatestResult {
                task_id: task_id.to_string(),
                current_answer: answer.to_string(),
                iterations,
                elapsed_secs,
                status: TaskStatus::Running,
            },
        );
    }

    /// Record how many iterations have started, without touching the answer
    pub fn record_iteration(&self, task_id: &str, iterations: u64) {
        let mut state = self.state.lock();
        if let Some(task) = state.ongoing.get_mut(task_id) {
            task.iterations = iterations;
        }
    }

    /// Move a task from ongoing to completed (`success`) or failed.
    ///
    /// Returns `false` and changes nothing when the task is not ongoing, so a
    /// second call for the same id is a silent no-op.
    pub fn complete_task(&self, task_id: &str, result: &str, success: bool) -> bool {
        let status = if success {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };
        self.state.lock().finalize(task_id, result, status)
    }

    /// Pause and finalize an ongoing task as aborted with result "Task aborted"
    pub fn abort_task(&self, task_id: &str) -> bool {
        let mut state = self.state.lock();
        if !state.ongoing.contains_key(task_id) {
            return false;
        }
        if let Some(flag) = state.pause_flags.get(task_id) {
            flag.send_replace(true);
        }
        state.finalize(task_id, "Task aborted", TaskStatus::Aborted)
    }

    /// Set a task's pause flag. Returns `false` for unknown ids.
    pub fn set_paused(&self, task_id: &str, paused: bool) -> bool {
        let state = self.state.lock();
        match state.pause_flags.get(task_id) {
            Some(flag) => {
                flag.send_replace(paused);
                true
            }
            None => false,
        }
    }

    /// Current pause flag, `None` if the task was never started
    pub fn is_paused(&self, task_id: &str) -> Option<bool> {
        self.state.lock().pause_flags.get(task_id).map(|f| *f.borrow())
    }

    pub fn is_ongoing(&self, task_id: &str) -> bool {
        self.state.lock().ongoing.contains_key(task_id)
    }

    /// Ongoing tasks ordered by id
    pub fn ongoing(&self) -> Vec<Task> {
        self.state.lock().ongoing.values().cloned().collect()
    }

    /// Completed tasks in completion order
    pub fn completed(&self) -> Vec<Task> {
        self.state.lock().completed.clone()
    }

    /// Failed and aborted tasks in completion order
    pub fn failed(&self) -> Vec<Task> {
        self.state.lock().failed.clone()
    }

    pub fn latest(&self, task_id: &str) -> Option<LatestResult> {
        self.state.lock().latest.get(task_id).cloned()
    }

    pub fn final_result(&self, task_id: &str) -> Option<String> {
        self.state.lock().final_results.get(task_id).cloned()
    }

    /// Look a task up in any collection
    pub fn find(&self, task_id: &str) -> Option<Task> {
        let state = self.state.lock();
        state
            .ongoing
            .get(task_id)
            .or_else(|| state.completed.iter().find(|t| t.id == task_id))
            .or_else(|| state.failed.iter().find(|t| t.id == task_id))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_moves_task_once() {
        let registry = TaskRegistry::new();
        registry.add_task("task_1", "think", 60);
        registry.update_latest("task_1", "draft", 3, 10);

        assert!(registry.complete_task("task_1", "done", true));
        assert!(!registry.complete_task("task_1", "again", false));

        assert!(registry.ongoing().is_empty());
        assert_eq!(registry.completed().len(), 1);
        assert!(registry.failed().is_empty());
        assert_eq!(registry.final_result("task_1").as_deref(), Some("done"));
        assert!(registry.latest("task_1").is_none());

        let task = registry.find("task_1").unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.iterations, 3);
    }

    #[test]
    fn test_abort_marks_failed_and_paused() {
        let registry = TaskRegistry::new();
        let pause = registry.add_task("task_2", "think", 60);

        assert!(registry.abort_task("task_2"));
        assert!(*pause.borrow());
        assert!(!registry.is_ongoing("task_2"));

        let failed = registry.failed();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].status, TaskStatus::Aborted);
        assert_eq!(failed[0].result.as_deref(), Some("Task aborted"));
        assert!(!registry.abort_task("task_2"));
    }

    #[test]
    fn test_pause_flags_exist_only_for_started_tasks() {
        let registry = TaskRegistry::new();
        assert!(!registry.set_paused("task_9", true));
        assert_eq!(registry.is_paused("task_9"), None);

        registry.add_task("task_9", "x", 5);
        assert_eq!(registry.is_paused("task_9"), Some(false));
        assert!(registry.set_paused("task_9", true));
        assert_eq!(registry.is_paused("task_9"), Some(true));

        // Flags outlive the task
        registry.complete_task("task_9", "r", true);
        assert!(registry.set_paused("task_9", false));
    }

    #[test]
    fn test_task_ids_are_unique_within_a_second() {
        let registry = TaskRegistry::new();
        let now = Utc::now();
        let first = registry.next_task_id(now);
        registry.add_task(&first, "a", 1);
        let second = registry.next_task_id(now);
        assert_eq!(first, format!("task_{}", now.timestamp()));
        assert_eq!(second, format!("task_{}_1", now.timestamp()));
    }

    #[test]
    fn test_updates_after_finalization_are_ignored() {
        let registry = TaskRegistry::new();
        registry.add_task("task_3", "x", 5);
        registry.complete_task("task_3", "r", false);
        registry.update_latest("task_3", "late", 9, 1);
        assert!(registry.latest("task_3").is_none());
    }
}
