//! MCP Tool Registry
//!
//! Collects the toolkits, publishes their tool definitions and routes
//! `tools/call` requests to the toolkit that owns the tool.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::claude::{ClaudeClient, Reasoner};
use crate::config::Config;
use crate::critical::CriticalSystemsThinking;
use crate::toolkits::{
    ArtifyToolkit, CodeComplexityToolkit, DataToolkit, DockerizationToolkit,
    FileTypeAnalyzerToolkit, TodoToolkit,
};

/// Tool definition for MCP
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl ToolDefinition {
    pub fn new(name: &str, description: &str, input_schema: Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema,
        }
    }
}

/// A named collection of tools exposed to the host agent.
#[async_trait]
pub trait Toolkit: Send + Sync {
    /// Toolkit name used in logs
    fn name(&self) -> &'static str;

    /// Usage instructions for the host agent
    fn system(&self) -> Option<String> {
        None
    }

    /// Tools this toolkit provides
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Execute one of this toolkit's tools
    async fn call(&self, tool: &str, args: &Value) -> Result<String>;

    /// Release background work before the process exits
    async fn shutdown(&self) {}
}

/// Tool registry with all toolkits
pub struct ToolRegistry {
    toolkits: Vec<Arc<dyn Toolkit>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Create the registry with every toolkit wired to `config`
    pub async fn new(config: Arc<Config>) -> Result<Self> {
        let reasoner: Arc<dyn Reasoner> = Arc::new(ClaudeClient::from_config(&config));

        let toolkits: Vec<Arc<dyn Toolkit>> = vec![
            Arc::new(ArtifyToolkit::from_config(&config)),
            Arc::new(TodoToolkit::new()),
            Arc::new(DockerizationToolkit::new()),
            Arc::new(FileTypeAnalyzerToolkit::new()),
            Arc::new(CodeComplexityToolkit::new()),
            Arc::new(DataToolkit::new()?),
            Arc::new(CriticalSystemsThinking::new(config.clone(), reasoner)?),
        ];

        Self::with_toolkits(toolkits)
    }

    /// Create a registry from explicit toolkits
    pub fn with_toolkits(toolkits: Vec<Arc<dyn Toolkit>>) -> Result<Self> {
        let mut index = HashMap::new();
        for (i, toolkit) in toolkits.iter().enumerate() {
            for def in toolkit.definitions() {
                if let Some(prev) = index.insert(def.name.clone(), i) {
                    anyhow::bail!(
                        "Tool '{}' registered by both {} and {}",
                        def.name,
                        toolkits[prev].name(),
                        toolkit.name()
                    );
                }
            }
        }
        Ok(Self { toolkits, index })
    }

    /// List all tool definitions
    pub fn list_definitions(&self) -> Vec<ToolDefinition> {
        self.toolkits.iter().flat_map(|t| t.definitions()).collect()
    }

    /// Whether a tool with this name is registered
    pub fn has_tool(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Combined toolkit instructions for the `initialize` response
    pub fn instructions(&self) -> String {
        self.toolkits
            .iter()
            .filter_map(|t| t.system().map(|s| format!("[{}]\n{}", t.name(), s.trim())))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Call a tool by name
    pub async fn call(&self, name: &str, args: Value) -> Result<String> {
        info!("Tool call: {} with args: {}", name, args);
        let start = std::time::Instant::now();

        let toolkit = self
            .index
            .get(name)
            .map(|&i| &self.toolkits[i])
            .ok_or_else(|| anyhow!("Unknown tool: {}", name))?;

        let result = toolkit.call(name, &args).await;

        // Log tool execution time
        let elapsed = start.elapsed();
        if elapsed > Duration::from_millis(100) {
            info!("Tool {} completed in {}ms", name, elapsed.as_millis());
        }

        result
    }

    /// Stop background work in every toolkit
    pub async fn shutdown(&self) {
        for toolkit in &self.toolkits {
            toolkit.shutdown().await;
        }
    }
}

/// Required string argument
pub fn required_str<'a>(args: &'a Value, name: &str) -> Result<&'a str> {
    args.get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("Missing '{}' parameter", name))
}

/// Optional string argument; empty strings count as absent
pub fn optional_str<'a>(args: &'a Value, name: &str) -> Option<&'a str> {
    args.get(name)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}

/// Required integer argument, accepting numeric strings from loose clients
pub fn required_i64(args: &Value, name: &str) -> Result<i64> {
    match args.get(name) {
        Some(Value::Number(n)) => n
            .as_i64()
            .ok_or_else(|| anyhow!("Parameter '{}' must be an integer", name)),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| anyhow!("Parameter '{}' must be an integer", name)),
        _ => Err(anyhow!("Missing '{}' parameter", name)),
    }
}

/// Optional boolean argument with default
pub fn optional_bool(args: &Value, name: &str, default: bool) -> bool {
    args.get(name).and_then(|v| v.as_bool()).unwrap_or(default)
}
