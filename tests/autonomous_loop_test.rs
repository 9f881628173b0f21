//! Autonomous loop lifecycle tests
//!
//! Drives the task runner with a scripted oracle and millisecond timings.

use anyhow::Result;
use async_trait::async_trait;
use goose_plugins::autonomous::{
    IterationContext, IterationOracle, LoopSettings, ResultSink, StopDecision, TaskRegistry,
    TaskRunner, TaskStatus,
};
use goose_plugins::session_log::SessionLog;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[derive(Default)]
struct ScriptedOracle {
    /// Stop once this iteration is reached
    stop_after: Option<u64>,
    /// Iterations whose refine call fails
    fail_on: Vec<u64>,
}

#[async_trait]
impl IterationOracle for ScriptedOracle {
    async fn refine(&self, ctx: &IterationContext<'_>) -> Result<String> {
        if self.fail_on.contains(&ctx.iteration) {
            anyhow::bail!("model unavailable");
        }
        Ok(format!("answer {}", ctx.iteration))
    }

    async fn should_stop(&self, ctx: &IterationContext<'_>) -> Result<StopDecision> {
        Ok(StopDecision {
            should_stop: self.stop_after.is_some_and(|n| ctx.iteration >= n),
            reasoning: "good enough".to_string(),
        })
    }
}

fn settings() -> LoopSettings {
    LoopSettings {
        interval: Duration::from_millis(20),
        pause_poll: Duration::from_millis(5),
        abort_join_timeout: Duration::from_millis(200),
        desktop_notifications: false,
    }
}

fn runner(results_dir: &Path, log_dir: &Path, oracle: ScriptedOracle) -> TaskRunner {
    TaskRunner::new(
        Arc::new(TaskRegistry::new()),
        Arc::new(oracle),
        ResultSink::new(results_dir),
        SessionLog::new(log_dir.join("session_log.json"), log_dir.join("tool_calls.log")),
        settings(),
    )
}

async fn wait_until_finished(runner: &TaskRunner, id: &str) {
    for _ in 0..500 {
        if !runner.registry().is_ongoing(id) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {} never finished", id);
}

fn iterations(runner: &TaskRunner, id: &str) -> u64 {
    runner.registry().find(id).unwrap().iterations
}

#[tokio::test]
async fn test_loop_completes_at_deadline() {
    let temp = TempDir::new().unwrap();
    let results = temp.path().join("results");
    let runner = runner(&results, temp.path(), ScriptedOracle::default());

    let id = runner.start("summarize", Duration::from_millis(150));
    assert!(runner.registry().is_ongoing(&id));
    wait_until_finished(&runner, &id).await;

    let completed = runner.registry().completed();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].status, TaskStatus::Completed);
    assert!(completed[0].iterations >= 2);

    let result = runner.registry().final_result(&id).unwrap();
    assert!(result.starts_with("Continuous task 'summarize' completed. Final answer: answer "));
    assert!(results.join(format!("{}_iteration_1.txt", id)).exists());

    let log = std::fs::read_to_string(temp.path().join("session_log.json")).unwrap();
    assert!(log.contains("task_started"));
    assert!(log.contains("task_completed"));
}

#[tokio::test]
async fn test_oracle_stops_loop_early() {
    let temp = TempDir::new().unwrap();
    let oracle = ScriptedOracle {
        stop_after: Some(2),
        ..Default::default()
    };
    let runner = runner(&temp.path().join("results"), temp.path(), oracle);

    let id = runner.start("find the bug", Duration::from_secs(10));
    wait_until_finished(&runner, &id).await;

    let task = runner.registry().find(&id).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.iterations, 2);

    let result = runner.registry().final_result(&id).unwrap();
    assert_eq!(
        result,
        "Continuous task 'find the bug' completed. Final answer: answer 2\nStop reasoning: good enough"
    );
}

#[tokio::test]
async fn test_abort_marks_task_aborted() {
    let temp = TempDir::new().unwrap();
    let runner = runner(&temp.path().join("results"), temp.path(), ScriptedOracle::default());

    let id = runner.start("long job", Duration::from_secs(10));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(runner.abort(&id).await);

    let failed = runner.registry().failed();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].status, TaskStatus::Aborted);
    assert_eq!(failed[0].result.as_deref(), Some("Task aborted"));

    // The worker must not overwrite the aborted outcome
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(runner.registry().completed().is_empty());
    assert!(runner.registry().final_result(&id).is_none());
    assert!(!runner.abort(&id).await);
}

#[tokio::test]
async fn test_pause_freezes_iterations_until_resume() {
    let temp = TempDir::new().unwrap();
    let runner = runner(&temp.path().join("results"), temp.path(), ScriptedOracle::default());

    let id = runner.start("steady", Duration::from_secs(10));
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(runner.pause(&id));
    assert_eq!(runner.registry().is_paused(&id), Some(true));

    // Let an in-flight iteration land before sampling
    tokio::time::sleep(Duration::from_millis(50)).await;
    let frozen = iterations(&runner, &id);
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(iterations(&runner, &id), frozen);
    assert!(runner.registry().is_ongoing(&id));

    assert!(runner.resume(&id));
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(iterations(&runner, &id) > frozen);

    assert!(runner.abort(&id).await);
}

#[tokio::test]
async fn test_iteration_error_is_recorded_and_loop_continues() {
    let temp = TempDir::new().unwrap();
    let results = temp.path().join("results");
    let oracle = ScriptedOracle {
        stop_after: Some(3),
        fail_on: vec![1],
    };
    let runner = runner(&results, temp.path(), oracle);

    let id = runner.start("flaky", Duration::from_secs(10));
    wait_until_finished(&runner, &id).await;

    let snapshot = std::fs::read_to_string(results.join(format!("{}_iteration_1.txt", id))).unwrap();
    assert!(snapshot.contains("ERROR: Error in iteration 1: model unavailable"));

    let task = runner.registry().find(&id).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.iterations, 3);
}

#[tokio::test]
async fn test_unwritable_results_dir_fails_task() {
    let temp = TempDir::new().unwrap();
    let not_a_dir = temp.path().join("results");
    std::fs::write(&not_a_dir, "occupied").unwrap();
    let runner = runner(&not_a_dir, temp.path(), ScriptedOracle::default());

    let id = runner.start("doomed", Duration::from_secs(10));
    wait_until_finished(&runner, &id).await;

    let task = runner.registry().find(&id).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    let result = task.result.unwrap();
    assert!(result.starts_with("Continuous task 'doomed' failed. Error: Critical error in task"));
    assert!(runner.registry().final_result(&id).is_none());
}

#[tokio::test]
async fn test_shutdown_aborts_everything() {
    let temp = TempDir::new().unwrap();
    let runner = runner(&temp.path().join("results"), temp.path(), ScriptedOracle::default());

    let a = runner.start("one", Duration::from_secs(10));
    let b = runner.start("two", Duration::from_secs(10));
    assert_ne!(a, b);

    runner.shutdown().await;
    assert!(runner.registry().ongoing().is_empty());
    assert_eq!(runner.registry().failed().len(), 2);
}
