//! Critical Systems Thinking Toolkit
//!
//! Reasoning tools for complex problems plus the autonomous background
//! loop that keeps refining an answer while the host agent does other work.
//!
//! - **Search**: Serper web search and page review
//! - **Analysis**: eight prompt-driven analyses (MECE, stakeholders, risks...)
//! - **Tasks**: launch, pause, resume, abort and query autonomous loops

mod analysis;
mod search;
mod web;

pub use analysis::AnalysisKind;
pub use search::SerperClient;
pub use web::{extract_body_text, PageFetcher};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::autonomous::{
    self, query, IterationOracle, LlmOracle, LoopSettings, ResultSink, TaskRegistry, TaskRunner,
};
use crate::claude::Reasoner;
use crate::config::Config;
use crate::session_log::SessionLog;
use crate::tools::{optional_str, required_str, ToolDefinition, Toolkit};

pub const SYSTEM_PROMPT: &str = "\
You are a critical systems thinker helping a developer understand and solve complex problems.
Break problems into mutually exclusive, collectively exhaustive parts, look for feedback loops
and second-order effects, consider every stakeholder, and state your assumptions.
Prefer concrete, verifiable recommendations over generic advice.
When asked for JSON, reply with JSON only.";

const TASK_TOOLS: [&str; 9] = [
    "autonomous_loop",
    "get_background_job_status",
    "pause_autonomous_loop",
    "resume_autonomous_loop",
    "abort_autonomous_loop",
    "get_latest_results",
    "list_task_ids",
    "get_task_info",
    "interpret_task_query",
];

pub struct CriticalSystemsThinking {
    reasoner: Arc<dyn Reasoner>,
    runner: TaskRunner,
    search: SerperClient,
    fetcher: PageFetcher,
    log: SessionLog,
}

impl CriticalSystemsThinking {
    /// Build the toolkit with the model-backed oracle
    pub fn new(config: Arc<Config>, reasoner: Arc<dyn Reasoner>) -> Result<Self> {
        let oracle: Arc<dyn IterationOracle> =
            Arc::new(LlmOracle::new(reasoner.clone(), SYSTEM_PROMPT));
        Self::with_oracle(config.clone(), reasoner, oracle, LoopSettings::from_config(&config))
    }

    /// Build the toolkit around an explicit oracle and loop timing
    pub fn with_oracle(
        config: Arc<Config>,
        reasoner: Arc<dyn Reasoner>,
        oracle: Arc<dyn IterationOracle>,
        settings: LoopSettings,
    ) -> Result<Self> {
        let results_dir = config.results_dir();
        std::fs::create_dir_all(&results_dir)
            .with_context(|| format!("Failed to create {}", results_dir.display()))?;

        let log = SessionLog::new(config.session_log_path(), config.tool_log_path());
        let runner = TaskRunner::new(
            Arc::new(TaskRegistry::new()),
            oracle,
            ResultSink::new(results_dir),
            log.clone(),
            settings,
        );

        Ok(Self {
            reasoner,
            runner,
            search: SerperClient::from_config(&config),
            fetcher: PageFetcher::new(config.http_timeout),
            log,
        })
    }

    pub fn runner(&self) -> &TaskRunner {
        &self.runner
    }

    fn registry(&self) -> &TaskRegistry {
        self.runner.registry()
    }

    async fn review_web_page(&self, url: &str) -> String {
        info!("Fetching content from {}", url);
        let content = match self.fetcher.fetch_text(url).await {
            Ok(content) => content,
            Err(e) => return format!("Error: {}", e),
        };
        let prompt = format!("summarize the following content: {}", content);
        match self.reasoner.ask(&prompt, None).await {
            Ok(summary) => summary,
            Err(e) => format!("Error: {}", e),
        }
    }

    fn start_loop(&self, description: &str, duration: &str) -> String {
        let total = match autonomous::parse_duration_str(duration) {
            Ok(total) => total,
            Err(e) => return e.to_string(),
        };
        let id = self.runner.start(description, total);
        format!(
            "Continuous background task '{}' (ID: {}) has been started with a duration of {}.",
            description, id, duration
        )
    }

    async fn call_task_tool(&self, tool: &str, args: &Value) -> Result<String> {
        let out = match tool {
            "autonomous_loop" => self.start_loop(
                required_str(args, "task_description")?,
                optional_str(args, "duration").unwrap_or("1m"),
            ),
            "get_background_job_status" => query::background_job_status(self.registry(), Utc::now()),
            "pause_autonomous_loop" => {
                let id = required_str(args, "task_id")?;
                if self.runner.pause(id) {
                    format!("Task {} has been paused.", id)
                } else {
                    format!("Task {} not found.", id)
                }
            }
            "resume_autonomous_loop" => {
                let id = required_str(args, "task_id")?;
                if self.runner.resume(id) {
                    format!("Task {} has been resumed.", id)
                } else {
                    format!("Task {} not found.", id)
                }
            }
            "abort_autonomous_loop" => {
                let id = required_str(args, "task_id")?;
                if self.runner.abort(id).await {
                    format!("Task {} has been aborted.", id)
                } else {
                    format!("Task {} not found or already finished.", id)
                }
            }
            "get_latest_results" => query::latest_results(self.registry(), required_str(args, "task_id")?),
            "list_task_ids" => query::list_task_ids(self.registry()),
            "get_task_info" => {
                query::task_info(self.registry(), required_str(args, "task_id")?, Utc::now())
            }
            "interpret_task_query" => {
                query::interpret_task_query(
                    self.registry(),
                    self.reasoner.as_ref(),
                    SYSTEM_PROMPT,
                    required_str(args, "query")?,
                )
                .await?
            }
            other => anyhow::bail!("Unknown tool: {}", other),
        };
        Ok(out)
    }
}

fn string_tool(name: &str, description: &str, params: &[(&str, &str)], required: &[&str]) -> ToolDefinition {
    let properties: serde_json::Map<String, Value> = params
        .iter()
        .map(|(p, d)| (p.to_string(), json!({"type": "string", "description": d})))
        .collect();
    ToolDefinition::new(
        name,
        description,
        json!({"type": "object", "properties": properties, "required": required}),
    )
}

#[async_trait]
impl Toolkit for CriticalSystemsThinking {
    fn name(&self) -> &'static str {
        "critical_systems_thinking"
    }

    fn system(&self) -> Option<String> {
        Some(format!(
            "{}\n\nUse autonomous_loop for problems that benefit from long, unattended refinement. \
             It returns a task id immediately; check progress with get_latest_results or \
             get_background_job_status.",
            SYSTEM_PROMPT
        ))
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        const TASK_ID: (&str, &str) = ("task_id", "The ID of the task.");

        let mut defs = vec![
            string_tool(
                "search",
                "Search the web for information using the Serper API. Returns the raw JSON results.",
                &[("query", "Query to search for.")],
                &["query"],
            ),
            string_tool(
                "review_web_page",
                "Review the content of a web page by providing a summary of the content.",
                &[("url", "URL of the web page to review.")],
                &["url"],
            ),
        ];
        defs.extend(AnalysisKind::ALL.into_iter().map(AnalysisKind::definition));
        defs.extend([
            string_tool(
                "autonomous_loop",
                "Run a task autonomously in the background, continuously working on a problem and building a final answer.",
                &[
                    ("task_description", "A description of the task to be performed."),
                    ("duration", "Total duration as <number><unit>, unit s, m or h (e.g. \"30s\", \"5m\", \"1h\"). Default \"1m\"."),
                ],
                &["task_description"],
            ),
            string_tool(
                "get_background_job_status",
                "Get the status of all background jobs (ongoing, completed, and failed).",
                &[],
                &[],
            ),
            string_tool("pause_autonomous_loop", "Pause the autonomous loop for a given task.", &[TASK_ID], &["task_id"]),
            string_tool("resume_autonomous_loop", "Resume the autonomous loop for a given task.", &[TASK_ID], &["task_id"]),
            string_tool("abort_autonomous_loop", "Abort a running autonomous loop; it is recorded as failed.", &[TASK_ID], &["task_id"]),
            string_tool(
                "get_latest_results",
                "Get the latest results and iteration count for a task, or its final result once finished.",
                &[TASK_ID],
                &["task_id"],
            ),
            string_tool("list_task_ids", "List all task IDs: ongoing, completed and failed.", &[], &[]),
            string_tool("get_task_info", "Get detailed information about a specific task.", &[TASK_ID], &["task_id"]),
            string_tool(
                "interpret_task_query",
                "Interpret a natural language query about tasks and provide relevant information.",
                &[("query", "A natural language query about tasks.")],
                &["query"],
            ),
        ]);
        defs
    }

    async fn call(&self, tool: &str, args: &Value) -> Result<String> {
        self.log.log_tool_call(tool, args).await;

        if let Some(kind) = AnalysisKind::from_tool(tool) {
            info!("Running {}", tool);
            let prompt = kind.render(args)?;
            let system = kind.uses_system_prompt().then_some(SYSTEM_PROMPT);
            return self.reasoner.ask(&prompt, system).await;
        }

        match tool {
            "search" => self.search.search(required_str(args, "query")?).await,
            "review_web_page" => Ok(self.review_web_page(required_str(args, "url")?).await),
            t if TASK_TOOLS.contains(&t) => self.call_task_tool(t, args).await,
            other => anyhow::bail!("Unknown tool: {}", other),
        }
    }

    async fn shutdown(&self) {
        self.runner.shutdown().await;
    }
}
