//! Iteration Engine
//!
//! Runs each autonomous loop as its own tokio task. Every iteration asks the
//! oracle for a refined answer, asks whether to stop, records the latest
//! answer and writes a snapshot, then sleeps until the next iteration.
//!
//! Suspension points are the pause wait and the inter-iteration sleep; both
//! observe the task's cancellation token. An oracle call already in flight
//! is never interrupted.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::notify::desktop_dialog;
use super::oracle::{IterationContext, IterationOracle};
use super::registry::TaskRegistry;
use super::sink::ResultSink;
use crate::config::Config;
use crate::session_log::SessionLog;

/// Timing knobs for autonomous loops
#[derive(Debug, Clone)]
pub struct LoopSettings {
    /// Sleep between iterations
    pub interval: Duration,
    /// How often a paused loop re-checks its deadline
    pub pause_poll: Duration,
    /// How long abort waits for the worker to wind down
    pub abort_join_timeout: Duration,
    /// Raise a desktop dialog when a task finishes
    pub desktop_notifications: bool,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(20),
            pause_poll: Duration::from_secs(1),
            abort_join_timeout: Duration::from_secs(1),
            desktop_notifications: true,
        }
    }
}

impl LoopSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.loop_interval,
            desktop_notifications: config.desktop_notifications,
            ..Self::default()
        }
    }
}

/// How a loop ended
#[derive(Debug)]
enum LoopOutcome {
    /// Deadline reached
    Finished { answer: String, iterations: u64 },
    /// Oracle decided the answer is good enough
    Stopped {
        answer: String,
        iterations: u64,
        reasoning: String,
    },
    /// Cancellation observed; whoever cancelled finalizes the task
    Cancelled,
    /// An error escaped the loop body
    Failed { iterations: u64, error: String },
}

enum Step {
    Continue(String),
    Stop { answer: String, reasoning: String },
}

#[derive(Default)]
struct LoopState {
    answer: String,
    iterations: u64,
}

struct Worker {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Everything one background loop needs, cloned into its task
#[derive(Clone)]
struct LoopJob {
    id: String,
    description: String,
    total: Duration,
    registry: Arc<TaskRegistry>,
    oracle: Arc<dyn IterationOracle>,
    sink: ResultSink,
    log: SessionLog,
    settings: LoopSettings,
}

impl LoopJob {
    async fn supervise(self, pause: watch::Receiver<bool>, cancel: CancellationToken) {
        self.log.log_action("task_started", &format!("{}: {}", self.id, self.description)).await;

        let outcome = match tokio::spawn(self.clone().iterate(pause, cancel)).await {
            Ok(outcome) => outcome,
            Err(e) => LoopOutcome::Failed {
                iterations: self.registry.find(&self.id).map(|t| t.iterations).unwrap_or(0),
                error: format!("worker task ended abnormally: {}", e),
            },
        };

        self.finish(outcome).await;
    }

    async fn iterate(self, mut pause: watch::Receiver<bool>, cancel: CancellationToken) -> LoopOutcome {
        let mut state = LoopState::default();
        match self.drive(&mut state, &mut pause, &cancel).await {
            Ok(outcome) => outcome,
            Err(e) => LoopOutcome::Failed {
                iterations: state.iterations,
                error: e.to_string(),
            },
        }
    }

    async fn drive(
        &self,
        state: &mut LoopState,
        pause: &mut watch::Receiver<bool>,
        cancel: &CancellationToken,
    ) -> anyhow::Result<LoopOutcome> {
        self.sink.ensure_dir().await?;
        let start = Instant::now();

        while start.elapsed() < self.total {
            if cancel.is_cancelled() {
                return Ok(LoopOutcome::Cancelled);
            }

            let paused = *pause.borrow();
            if paused {
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(LoopOutcome::Cancelled),
                    changed = pause.changed() => {
                        if changed.is_err() {
                            tokio::time::sleep(self.settings.pause_poll).await;
                        }
                    }
                    _ = tokio::time::sleep(self.settings.pause_poll) => {}
                }
                continue;
            }

            state.iterations += 1;
            self.registry.record_iteration(&self.id, state.iterations);
            let elapsed = start.elapsed().as_secs();

            match self.step(state, elapsed).await {
                Ok(Step::Continue(answer)) => state.answer = answer,
                Ok(Step::Stop { answer, reasoning }) => {
                    info!("Task {} stopping early: {}", self.id, reasoning);
                    return Ok(LoopOutcome::Stopped {
                        answer,
                        iterations: state.iterations,
                        reasoning,
                    });
                }
                Err(e) => {
                    let message = format!("Error in iteration {}: {}", state.iterations, e);
                    warn!("Task {}: {}", self.id, message);
                    self.sink
                        .write_intermediate(&self.id, state.iterations, &format!("ERROR: {}", message))
                        .await?;
                }
            }

            let remaining = self.total.saturating_sub(start.elapsed());
            tokio::select! {
                _ = cancel.cancelled() => return Ok(LoopOutcome::Cancelled),
                _ = tokio::time::sleep(self.settings.interval.min(remaining)) => {}
            }
        }

        Ok(LoopOutcome::Finished {
            answer: std::mem::take(&mut state.answer),
            iterations: state.iterations,
        })
    }

    /// One refine + stop-check cycle. Errors here are not fatal to the loop.
    async fn step(&self, state: &LoopState, elapsed_secs: u64) -> anyhow::Result<Step> {
        let ctx = IterationContext {
            task_description: &self.description,
            current_answer: &state.answer,
            iteration: state.iterations,
            elapsed_secs,
            total_secs: self.total.as_secs(),
        };
        let refined = self.oracle.refine(&ctx).await?;

        let check_ctx = IterationContext {
            current_answer: &refined,
            ..ctx
        };
        let decision = self.oracle.should_stop(&check_ctx).await?;
        if decision.should_stop {
            return Ok(Step::Stop {
                answer: refined,
                reasoning: decision.reasoning,
            });
        }

        self.registry
            .update_latest(&self.id, &refined, state.iterations, elapsed_secs);
        self.sink
            .write_intermediate(&self.id, state.iterations, &refined)
            .await?;

        Ok(Step::Continue(refined))
    }

    async fn finish(&self, outcome: LoopOutcome) {
        match outcome {
            LoopOutcome::Cancelled => {
                info!("Task {} cancelled", self.id);
            }
            LoopOutcome::Finished { answer, iterations } => {
                let result = format!(
                    "Continuous task '{}' completed. Final answer: {}",
                    self.description, answer
                );
                self.complete(&result, true, iterations).await;
            }
            LoopOutcome::Stopped {
                answer,
                iterations,
                reasoning,
            } => {
                let result = format!(
                    "Continuous task '{}' completed. Final answer: {}\nStop reasoning: {}",
                    self.description, answer, reasoning
                );
                self.complete(&result, true, iterations).await;
            }
            LoopOutcome::Failed { iterations, error } => {
                let message = format!("Critical error in task {}: {}", self.id, error);
                error!("{}", message);
                if let Err(e) = self
                    .sink
                    .write_intermediate(&self.id, iterations, &format!("CRITICAL ERROR: {}", message))
                    .await
                {
                    warn!("Could not record critical error for {}: {}", self.id, e);
                }
                let result = format!(
                    "Continuous task '{}' failed. Error: {}",
                    self.description, message
                );
                self.complete(&result, false, iterations).await;
            }
        }
    }

    async fn complete(&self, result: &str, success: bool, iterations: u64) {
        if !self.registry.complete_task(&self.id, result, success) {
            return;
        }

        let (action, title, verb) = if success {
            ("task_completed", "Task Completed", "completed")
        } else {
            ("task_failed", "Task Failed", "failed")
        };
        info!("Task {} {} after {} iterations", self.id, verb, iterations);
        self.log.log_action(action, &format!("{}: {}", self.id, result)).await;

        if self.settings.desktop_notifications {
            let message = format!("Continuous task {} after {} iterations.", verb, iterations);
            tokio::spawn(async move { desktop_dialog(title, &message).await });
        }
    }
}

/// Launches and controls autonomous loops
pub struct TaskRunner {
    registry: Arc<TaskRegistry>,
    oracle: Arc<dyn IterationOracle>,
    sink: ResultSink,
    log: SessionLog,
    settings: LoopSettings,
    workers: Mutex<HashMap<String, Worker>>,
}

impl TaskRunner {
    pub fn new(
        registry: Arc<TaskRegistry>,
        oracle: Arc<dyn IterationOracle>,
        sink: ResultSink,
        log: SessionLog,
        settings: LoopSettings,
    ) -> Self {
        Self {
            registry,
            oracle,
            sink,
            log,
            settings,
            workers: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Start a loop in the background and return its task id immediately
    pub fn start(&self, description: &str, total: Duration) -> String {
        let id = self.registry.next_task_id(chrono::Utc::now());
        let pause = self.registry.add_task(&id, description, total.as_secs());
        let cancel = CancellationToken::new();

        let job = LoopJob {
            id: id.clone(),
            description: description.to_string(),
            total,
            registry: self.registry.clone(),
            oracle: self.oracle.clone(),
            sink: self.sink.clone(),
            log: self.log.clone(),
            settings: self.settings.clone(),
        };
        let handle = tokio::spawn(job.supervise(pause, cancel.clone()));

        let mut workers = self.workers.lock();
        workers.retain(|_, w| !w.handle.is_finished());
        workers.insert(id.clone(), Worker { handle, cancel });

        info!("Starting autonomous loop for task {}: {}", id, description);
        id
    }

    /// Suspend a task at its next suspension point
    pub fn pause(&self, task_id: &str) -> bool {
        self.registry.set_paused(task_id, true)
    }

    /// Let a paused task continue
    pub fn resume(&self, task_id: &str) -> bool {
        self.registry.set_paused(task_id, false)
    }

    /// Cancel a running task and finalize it as aborted.
    ///
    /// Waits briefly for the worker; a worker blocked in an oracle call keeps
    /// running detached but can no longer change the task's outcome.
    pub async fn abort(&self, task_id: &str) -> bool {
        if !self.registry.is_ongoing(task_id) {
            return false;
        }
        self.registry.set_paused(task_id, true);

        let worker = self.workers.lock().remove(task_id);
        if let Some(worker) = worker {
            worker.cancel.cancel();
            if tokio::time::timeout(self.settings.abort_join_timeout, worker.handle)
                .await
                .is_err()
            {
                warn!("Task {} did not stop within {:?}", task_id, self.settings.abort_join_timeout);
            }
        }

        let aborted = self.registry.abort_task(task_id);
        if aborted {
            info!("Task {} aborted", task_id);
            self.log.log_action("task_aborted", task_id).await;
        }
        aborted
    }

    /// Abort every ongoing task
    pub async fn shutdown(&self) {
        let ongoing: Vec<String> = self.registry.ongoing().into_iter().map(|t| t.id).collect();
        if ongoing.is_empty() {
            return;
        }
        info!("Cleaning up and aborting {} tasks...", ongoing.len());

        for worker in self.workers.lock().values() {
            worker.cancel.cancel();
        }
        for id in ongoing {
            self.abort(&id).await;
        }
        info!("All tasks aborted");
    }
}
