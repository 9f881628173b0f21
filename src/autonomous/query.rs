//! Status reports and natural-language task queries.

use chrono::{DateTime, Local, Utc};
use serde::Deserialize;
use std::fmt::Write as _;
use tracing::warn;

use super::oracle::extract_json_object;
use super::registry::{Task, TaskRegistry, TaskStatus};
use crate::claude::Reasoner;

pub const UNINTERPRETABLE_QUERY: &str =
    "Error: Unable to interpret the query. Please try rephrasing your question about the tasks.";

/// One task's block in the status report
pub fn format_task_status(task: &Task, now: DateTime<Utc>) -> String {
    let mut out = format!(
        "- Task ID: {}\n  Description: {}\n",
        task.id, task.description
    );
    if task.end_time.is_some() {
        let _ = writeln!(out, "  Duration: {:.2} seconds", task.elapsed_secs(now));
        let _ = writeln!(out, "  Result: {}", task.result.as_deref().unwrap_or(""));
    } else {
        let _ = writeln!(out, "  Elapsed Time: {:.2} seconds", task.elapsed_secs(now));
        let _ = writeln!(out, "  Remaining Time: {:.2} seconds", task.remaining_secs(now));
    }
    out
}

/// Ongoing, completed and failed tasks in one report
pub fn background_job_status(registry: &TaskRegistry, now: DateTime<Utc>) -> String {
    let mut sections = vec!["Background Job Status:\n".to_string()];

    for (title, tasks) in [
        ("Ongoing Tasks:", registry.ongoing()),
        ("Completed Tasks:", registry.completed()),
        ("Failed Tasks:", registry.failed()),
    ] {
        if tasks.is_empty() {
            continue;
        }
        sections.push(format!("\n{}", title));
        sections.extend(tasks.iter().map(|t| format_task_status(t, now)));
    }

    sections.join("\n")
}

pub fn latest_results(registry: &TaskRegistry, task_id: &str) -> String {
    if let Some(result) = registry.final_result(task_id) {
        return format!("Final result for completed task {}:\n{}", task_id, result);
    }
    if let Some(latest) = registry.latest(task_id) {
        return format!(
            "Latest results for ongoing task {}:\nIterations: {}\nCurrent answer: {}",
            task_id, latest.iterations, latest.current_answer
        );
    }
    match registry.find(task_id) {
        Some(task) if task.status.is_terminal() => format!(
            "Final result for {} task {}:\n{}",
            task.status.as_str(),
            task_id,
            task.result.unwrap_or_default()
        ),
        _ => format!("No results found for task {}.", task_id),
    }
}

/// Ids of ongoing tasks followed by finished ones
pub fn list_task_ids(registry: &TaskRegistry) -> String {
    let ids: Vec<String> = registry
        .ongoing()
        .into_iter()
        .chain(registry.completed())
        .chain(registry.failed())
        .map(|t| t.id)
        .collect();
    format!("Task IDs:\n{}", ids.join("\n"))
}

fn local_time(t: DateTime<Utc>) -> String {
    t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn task_info(registry: &TaskRegistry, task_id: &str, now: DateTime<Utc>) -> String {
    let Some(task) = registry.find(task_id) else {
        return format!("No task found with ID: {}", task_id);
    };

    let mut out = format!(
        "Task ID: {}\nDescription: {}\n",
        task.id, task.description
    );

    if task.status == TaskStatus::Running {
        let latest = registry.latest(task_id);
        let _ = writeln!(out, "Status: Ongoing");
        let _ = writeln!(out, "Start Time: {}", local_time(task.start_time));
        let _ = writeln!(out, "Elapsed Time: {} seconds", task.elapsed_secs(now) as u64);
        let _ = writeln!(out, "Iterations: {}", task.iterations);
        let _ = writeln!(
            out,
            "Current Answer: {}",
            latest.map(|l| l.current_answer).unwrap_or_else(|| "N/A".to_string())
        );
    } else {
        let status = match task.status {
            TaskStatus::Completed => "Completed",
            TaskStatus::Failed => "Failed",
            _ => "Aborted",
        };
        let _ = writeln!(out, "Status: {}", status);
        let _ = writeln!(out, "Start Time: {}", local_time(task.start_time));
        if let Some(end) = task.end_time {
            let _ = writeln!(out, "End Time: {}", local_time(end));
        }
        let _ = writeln!(out, "Duration: {} seconds", task.elapsed_secs(now) as u64);
        let _ = writeln!(out, "Iterations: {}", task.iterations);
        let _ = writeln!(out, "Result: {}", task.result.as_deref().unwrap_or(""));
    }
    out
}

/// Report the model may pick to answer a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseMethod {
    ListTaskIds,
    BackgroundJobStatus,
    TaskInfo,
    LatestResults,
    Unknown(String),
}

impl ResponseMethod {
    pub fn from_name(name: &str) -> Self {
        match name.trim() {
            "list_task_ids" => Self::ListTaskIds,
            "get_background_job_status" => Self::BackgroundJobStatus,
            "get_task_info" => Self::TaskInfo,
            "get_latest_results" => Self::LatestResults,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// The model's reading of a task query
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TaskQueryInterpretation {
    pub interpreted_task_ids: Vec<String>,
    pub requested_info: String,
    pub response_method: String,
    pub additional_context: String,
    pub include_failed_tasks: bool,
}

impl TaskQueryInterpretation {
    pub fn method(&self) -> ResponseMethod {
        ResponseMethod::from_name(&self.response_method)
    }
}

fn interpret_prompt(query: &str) -> String {
    format!(
        r#"Given the following natural language query about tasks, interpret the request and provide the most relevant information:

Query: {query}

Consider the following context:
- There may be ongoing, completed, and failed tasks.
- Task IDs are usually in the format "task_timestamp".
- The query might refer to the "last task" or use other relative terms.
- The user might use shorthand or informal language.
- The user might be specifically asking about failed tasks.

Based on this query, determine:
1. What specific task(s) is the user asking about?
2. What information does the user want to know?
3. Is the user specifically asking about failed tasks?
4. How should I respond to this query using the available task information?

Provide your response in the following JSON format:
{{
    "interpreted_task_ids": ["list", "of", "relevant", "task", "ids"],
    "requested_info": "brief description of the information requested",
    "response_method": "name of the method to use for responding (e.g., 'get_task_info', 'get_latest_results', 'list_task_ids', 'get_background_job_status')",
    "additional_context": "any additional context or instructions for formulating the response",
    "include_failed_tasks": boolean
}}"#
    )
}

/// Answer a free-form question about tasks by letting the model pick a report
pub async fn interpret_task_query(
    registry: &TaskRegistry,
    reasoner: &dyn Reasoner,
    system: &str,
    query: &str,
) -> anyhow::Result<String> {
    let reply = reasoner.ask(&interpret_prompt(query), Some(system)).await?;
    match serde_json::from_str::<TaskQueryInterpretation>(extract_json_object(&reply)) {
        Ok(interpretation) => Ok(render_interpretation(registry, &interpretation, Utc::now())),
        Err(e) => {
            warn!("Unparseable task query interpretation: {}", e);
            Ok(UNINTERPRETABLE_QUERY.to_string())
        }
    }
}

/// Build the answer for an already-interpreted query
pub fn render_interpretation(
    registry: &TaskRegistry,
    interpretation: &TaskQueryInterpretation,
    now: DateTime<Utc>,
) -> String {
    let mut response = format!("Interpreted request: {}\n\n", interpretation.requested_info);

    match interpretation.method() {
        ResponseMethod::ListTaskIds => response.push_str(&list_task_ids(registry)),
        ResponseMethod::BackgroundJobStatus => {
            response.push_str(&background_job_status(registry, now))
        }
        ResponseMethod::TaskInfo => {
            for id in &interpretation.interpreted_task_ids {
                response.push_str(&task_info(registry, id, now));
                response.push('\n');
            }
        }
        ResponseMethod::LatestResults => {
            for id in &interpretation.interpreted_task_ids {
                response.push_str(&latest_results(registry, id));
                response.push('\n');
            }
        }
        ResponseMethod::Unknown(name) => {
            let _ = write!(response, "Unable to process the request using method: {}", name);
        }
    }

    if interpretation.include_failed_tasks {
        let failed = registry.failed();
        if failed.is_empty() {
            response.push_str("\nNo failed tasks found.");
        } else {
            response.push_str("\nFailed Tasks:\n");
            for task in failed {
                let _ = writeln!(
                    response,
                    "- Task ID: {}\n  Result: {}",
                    task.id,
                    task.result.as_deref().unwrap_or("")
                );
            }
        }
    }

    if !interpretation.additional_context.is_empty() {
        let _ = write!(response, "\nAdditional context: {}", interpretation.additional_context);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;

    struct Canned(&'static str);

    #[async_trait]
    impl Reasoner for Canned {
        async fn ask(&self, _prompt: &str, _system: Option<&str>) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    fn registry_with_tasks() -> TaskRegistry {
        let registry = TaskRegistry::new();
        registry.add_task("task_1", "map the system", 60);
        registry.update_latest("task_1", "draft map", 2, 30);
        registry.add_task("task_2", "assess risks", 60);
        registry.complete_task("task_2", "all clear", true);
        registry.add_task("task_3", "broken", 60);
        registry.complete_task("task_3", "Continuous task 'broken' failed. Error: boom", false);
        registry
    }

    #[test]
    fn test_status_report_sections() {
        let registry = registry_with_tasks();
        let report = background_job_status(&registry, Utc::now());

        assert!(report.starts_with("Background Job Status:\n"));
        let ongoing = report.find("Ongoing Tasks:").unwrap();
        let completed = report.find("Completed Tasks:").unwrap();
        let failed = report.find("Failed Tasks:").unwrap();
        assert!(ongoing < completed && completed < failed);
        assert!(report.contains("- Task ID: task_1\n  Description: map the system\n  Elapsed Time:"));
        assert!(report.contains("Remaining Time:"));
        assert!(report.contains("- Task ID: task_2"));
        assert!(report.contains("  Result: all clear"));
    }

    #[test]
    fn test_empty_status_report() {
        let registry = TaskRegistry::new();
        assert_eq!(background_job_status(&registry, Utc::now()), "Background Job Status:\n");
    }

    #[test]
    fn test_latest_results_variants() {
        let registry = registry_with_tasks();
        assert_eq!(
            latest_results(&registry, "task_1"),
            "Latest results for ongoing task task_1:\nIterations: 2\nCurrent answer: draft map"
        );
        assert_eq!(
            latest_results(&registry, "task_2"),
            "Final result for completed task task_2:\nall clear"
        );
        assert!(latest_results(&registry, "task_3").starts_with("Final result for failed task task_3:"));
        assert_eq!(latest_results(&registry, "task_x"), "No results found for task task_x.");
    }

    #[test]
    fn test_list_and_info() {
        let registry = registry_with_tasks();
        assert_eq!(list_task_ids(&registry), "Task IDs:\ntask_1\ntask_2\ntask_3");

        let info = task_info(&registry, "task_1", Utc::now());
        assert!(info.contains("Status: Ongoing"));
        assert!(info.contains("Current Answer: draft map"));

        let done = task_info(&registry, "task_2", Utc::now());
        assert!(done.contains("Status: Completed"));
        assert!(done.contains("Result: all clear"));

        assert_eq!(task_info(&registry, "nope", Utc::now()), "No task found with ID: nope");
    }

    #[test]
    fn test_response_method_names() {
        assert_eq!(ResponseMethod::from_name("list_task_ids"), ResponseMethod::ListTaskIds);
        assert_eq!(ResponseMethod::from_name("get_task_info"), ResponseMethod::TaskInfo);
        assert_eq!(
            ResponseMethod::from_name("summarize"),
            ResponseMethod::Unknown("summarize".to_string())
        );
    }

    #[test]
    fn test_render_with_failed_and_context() {
        let registry = registry_with_tasks();
        let interpretation = TaskQueryInterpretation {
            interpreted_task_ids: vec!["task_2".into()],
            requested_info: "result of task 2".into(),
            response_method: "get_latest_results".into(),
            additional_context: "user is impatient".into(),
            include_failed_tasks: true,
        };
        let out = render_interpretation(&registry, &interpretation, Utc::now());
        assert!(out.starts_with("Interpreted request: result of task 2\n\n"));
        assert!(out.contains("Final result for completed task task_2:\nall clear"));
        assert!(out.contains("\nFailed Tasks:\n- Task ID: task_3\n"));
        assert!(out.ends_with("\nAdditional context: user is impatient"));
    }

    #[test]
    fn test_unknown_method_reported() {
        let registry = TaskRegistry::new();
        let interpretation = TaskQueryInterpretation {
            response_method: "dance".into(),
            include_failed_tasks: true,
            ..Default::default()
        };
        let out = render_interpretation(&registry, &interpretation, Utc::now());
        assert!(out.contains("Unable to process the request using method: dance"));
        assert!(out.ends_with("\nNo failed tasks found."));
    }

    #[tokio::test]
    async fn test_interpret_query_dispatches() {
        let registry = registry_with_tasks();
        let reasoner = Canned(
            r#"{"interpreted_task_ids": [], "requested_info": "all ids", "response_method": "list_task_ids", "additional_context": "", "include_failed_tasks": false}"#,
        );
        let out = interpret_task_query(&registry, &reasoner, "sys", "what tasks exist?")
            .await
            .unwrap();
        assert_eq!(out, "Interpreted request: all ids\n\nTask IDs:\ntask_1\ntask_2\ntask_3");
    }

    #[tokio::test]
    async fn test_interpret_query_malformed() {
        let registry = TaskRegistry::new();
        let out = interpret_task_query(&registry, &Canned("no idea"), "sys", "huh")
            .await
            .unwrap();
        assert_eq!(out, UNINTERPRETABLE_QUERY);
    }
}
