//! Goose Plugins MCP Server
//!
//! Model Context Protocol server bundling the Goose plugin toolkits and an
//! autonomous background task runner.
//!
//! # Features
//!
//! - **MCP Protocol**: JSON-RPC 2.0 over stdio
//! - **Critical Systems Thinking**: structured analysis, web search and page
//!   review backed by Claude
//! - **Autonomous Loops**: time-boxed background tasks that refine an answer,
//!   snapshot every iteration and can be paused, resumed or aborted
//! - **Project Toolkits**: Dockerization, file-type analysis, Python code
//!   complexity, SQL over CSV data, image generation and a todo list
//! - **Session Log**: JSON-lines log of task events, streamable with
//!   `--stream-log`
//!
//! # Architecture
//!
//! ```text
//! Goose ──► MCP Protocol ──► ToolRegistry ──► Toolkits
//!             (stdio)              │
//!                                  ├── CriticalSystemsThinking ──► Claude API
//!                                  │      ├── TaskRunner (tokio tasks)
//!                                  │      │     ├── TaskRegistry
//!                                  │      │     ├── ResultSink (~/.goose/results)
//!                                  │      │     └── SessionLog
//!                                  │      ├── SerperClient + SearchCache (Moka)
//!                                  │      └── PageFetcher
//!                                  ├── Dockerization / FileType / Complexity
//!                                  ├── Data (SQLite + YouPlot)
//!                                  ├── Artify (Images API)
//!                                  └── Todo
//! ```

pub mod autonomous;
pub mod cache;
pub mod claude;
pub mod config;
pub mod critical;
pub mod mcp;
pub mod session_log;
pub mod toolkits;
pub mod tools;

pub use autonomous::{LoopSettings, TaskRegistry, TaskRunner, TaskStatus};
pub use cache::SearchCache;
pub use claude::{ClaudeClient, Reasoner};
pub use config::Config;
pub use critical::CriticalSystemsThinking;
pub use mcp::{McpRequest, McpResponse, McpServer};
pub use session_log::SessionLog;
pub use tools::{ToolDefinition, ToolRegistry, Toolkit};
