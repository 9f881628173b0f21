//! Toolkit behavior through the MCP surface

use anyhow::Result;
use async_trait::async_trait;
use goose_plugins::autonomous::{IterationContext, IterationOracle, LoopSettings, StopDecision};
use goose_plugins::critical::SYSTEM_PROMPT;
use goose_plugins::toolkits::{DataToolkit, TodoToolkit};
use goose_plugins::{Config, CriticalSystemsThinking, McpServer, Reasoner, ToolRegistry, Toolkit};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Records the last prompt and answers with a fixed string
#[derive(Default)]
struct FakeReasoner {
    last: Mutex<Option<(String, Option<String>)>>,
}

#[async_trait]
impl Reasoner for FakeReasoner {
    async fn ask(&self, prompt: &str, system: Option<&str>) -> Result<String> {
        *self.last.lock() = Some((prompt.to_string(), system.map(String::from)));
        Ok("considered answer".to_string())
    }
}

struct SlowOracle;

#[async_trait]
impl IterationOracle for SlowOracle {
    async fn refine(&self, ctx: &IterationContext<'_>) -> Result<String> {
        Ok(format!("draft {}", ctx.iteration))
    }

    async fn should_stop(&self, _ctx: &IterationContext<'_>) -> Result<StopDecision> {
        Ok(StopDecision::keep_going("more to do"))
    }
}

fn critical(temp: &TempDir, reasoner: Arc<FakeReasoner>) -> CriticalSystemsThinking {
    let config = Arc::new(Config::offline(temp.path()));
    let settings = LoopSettings {
        interval: Duration::from_millis(20),
        pause_poll: Duration::from_millis(5),
        abort_join_timeout: Duration::from_millis(200),
        desktop_notifications: false,
    };
    CriticalSystemsThinking::with_oracle(config, reasoner, Arc::new(SlowOracle), settings).unwrap()
}

fn task_id(launch_message: &str) -> String {
    let start = launch_message.find("(ID: ").unwrap() + "(ID: ".len();
    let end = launch_message[start..].find(')').unwrap() + start;
    launch_message[start..end].to_string()
}

#[tokio::test]
async fn test_invalid_duration_is_reported() {
    let temp = TempDir::new().unwrap();
    let toolkit = critical(&temp, Arc::default());
    let out = toolkit
        .call("autonomous_loop", &json!({"task_description": "x", "duration": "5d"}))
        .await
        .unwrap();
    assert_eq!(
        out,
        "Invalid duration format. Use 's' for seconds, 'm' for minutes, or 'h' for hours."
    );
    assert!(toolkit.runner().registry().ongoing().is_empty());
}

#[tokio::test]
async fn test_loop_lifecycle_through_tools() {
    let temp = TempDir::new().unwrap();
    let toolkit = critical(&temp, Arc::default());

    let launched = toolkit
        .call("autonomous_loop", &json!({"task_description": "map the system", "duration": "30s"}))
        .await
        .unwrap();
    let id = task_id(&launched);
    assert_eq!(
        launched,
        format!(
            "Continuous background task 'map the system' (ID: {}) has been started with a duration of 30s.",
            id
        )
    );

    let ids = toolkit.call("list_task_ids", &json!({})).await.unwrap();
    assert!(ids.starts_with("Task IDs:\n"));
    assert!(ids.contains(&id));

    let paused = toolkit.call("pause_autonomous_loop", &json!({"task_id": &id})).await.unwrap();
    assert_eq!(paused, format!("Task {} has been paused.", id));
    let resumed = toolkit.call("resume_autonomous_loop", &json!({"task_id": &id})).await.unwrap();
    assert_eq!(resumed, format!("Task {} has been resumed.", id));

    let status = toolkit.call("get_background_job_status", &json!({})).await.unwrap();
    assert!(status.contains(&id));

    let aborted = toolkit.call("abort_autonomous_loop", &json!({"task_id": &id})).await.unwrap();
    assert_eq!(aborted, format!("Task {} has been aborted.", id));

    let again = toolkit.call("abort_autonomous_loop", &json!({"task_id": &id})).await.unwrap();
    assert_eq!(again, format!("Task {} not found or already finished.", id));

    let tool_log = std::fs::read_to_string(temp.path().join("tool_calls.log")).unwrap();
    assert!(tool_log.contains("autonomous_loop"));
}

#[tokio::test]
async fn test_unknown_task_messages() {
    let temp = TempDir::new().unwrap();
    let toolkit = critical(&temp, Arc::default());

    let out = toolkit.call("pause_autonomous_loop", &json!({"task_id": "nope"})).await.unwrap();
    assert_eq!(out, "Task nope not found.");
    let out = toolkit.call("resume_autonomous_loop", &json!({"task_id": "nope"})).await.unwrap();
    assert_eq!(out, "Task nope not found.");
    let out = toolkit.call("get_latest_results", &json!({"task_id": "nope"})).await.unwrap();
    assert_eq!(out, "No results found for task nope.");
}

#[tokio::test]
async fn test_analysis_tools_route_to_reasoner() {
    let temp = TempDir::new().unwrap();
    let reasoner = Arc::new(FakeReasoner::default());
    let toolkit = critical(&temp, reasoner.clone());

    let out = toolkit
        .call("structured_analysis", &json!({"problem": "Checkout latency doubled"}))
        .await
        .unwrap();
    assert_eq!(out, "considered answer");
    let (prompt, system) = reasoner.last.lock().clone().unwrap();
    assert!(prompt.contains("Checkout latency doubled"));
    assert!(system.is_none());

    toolkit
        .call("analyze_request", &json!({"statement": "Make it faster"}))
        .await
        .unwrap();
    let (_, system) = reasoner.last.lock().clone().unwrap();
    assert_eq!(system.as_deref(), Some(SYSTEM_PROMPT));

    assert!(toolkit.call("structured_analysis", &json!({})).await.is_err());
}

#[tokio::test]
async fn test_search_without_key_fails() {
    let temp = TempDir::new().unwrap();
    let toolkit = critical(&temp, Arc::default());
    let err = toolkit.call("search", &json!({"query": "rust"})).await.unwrap_err();
    assert!(err.to_string().contains("SERPER_API_KEY"));
}

#[tokio::test]
async fn test_registry_lists_every_toolkit() {
    let temp = TempDir::new().unwrap();
    let toolkits: Vec<Arc<dyn Toolkit>> = vec![
        Arc::new(critical(&temp, Arc::default())),
        Arc::new(TodoToolkit::new()),
        Arc::new(DataToolkit::new().unwrap()),
    ];
    let registry = ToolRegistry::with_toolkits(toolkits).unwrap();
    let server = McpServer::with_registry(Arc::new(registry));

    let response = server
        .handle_line(r#"{"jsonrpc":"2.0","method":"tools/list","id":1}"#)
        .await
        .unwrap();
    let result = response.result.unwrap();
    let names: Vec<&str> = result["tools"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    for expected in ["autonomous_loop", "system_mapping", "add_task", "load", "query", "visualize"] {
        assert!(names.contains(&expected), "missing {}", expected);
    }

    let init = server
        .handle_line(r#"{"jsonrpc":"2.0","method":"initialize","id":2}"#)
        .await
        .unwrap();
    let instructions = init.result.unwrap()["instructions"].as_str().unwrap().to_string();
    assert!(instructions.contains("[critical_systems_thinking]"));
    assert!(instructions.contains("[data]"));
}

#[tokio::test]
async fn test_data_tools_over_mcp() {
    let temp = TempDir::new().unwrap();
    let csv = temp.path().join("sales.csv");
    std::fs::write(&csv, "region,units\nnorth,10\nsouth,4\nnorth,5\n").unwrap();

    let registry = ToolRegistry::with_toolkits(vec![Arc::new(DataToolkit::new().unwrap())]).unwrap();
    let loaded = registry
        .call("load", json!({"path": csv.to_str().unwrap(), "table_name": "sales"}))
        .await
        .unwrap();
    assert!(loaded.ends_with("Schema:\nregion: VARCHAR\nunits: BIGINT"));

    let table = registry
        .call(
            "query",
            json!({"sql": "SELECT region, SUM(units) AS total FROM sales GROUP BY region ORDER BY region"}),
        )
        .await
        .unwrap();
    let lines: Vec<&str> = table.lines().collect();
    assert_eq!(lines[0], "region | total");
    assert_eq!(lines[1], "-".repeat(14));
    assert_eq!(lines[2], "north  | 15   ");
    assert_eq!(lines[3], "south  | 4    ");

    let missing: Value = json!({"sql": "SELECT * FROM nowhere"});
    let err = registry.call("query", missing).await.unwrap();
    assert!(err.starts_with("Error executing query:"));
}
