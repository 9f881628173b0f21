//! Autonomous Task System
//!
//! Long-running "keep thinking about this" loops that run in the background
//! while the MCP server keeps answering requests:
//! - **Registry**: single owner of task state (ongoing, completed, failed)
//! - **Engine**: one tokio task per loop with pause, resume and abort
//! - **Oracle**: refine / stop decisions, normally backed by Claude
//! - **Sink**: per-iteration snapshot files for debugging
//! - **Query**: status reports and natural-language task questions

mod duration;
mod engine;
mod notify;
mod oracle;
pub mod query;
mod registry;
mod sink;

pub use duration::{parse as parse_duration_str, parse_duration, DurationError};
pub use engine::{LoopSettings, TaskRunner};
pub use notify::desktop_dialog;
pub use oracle::{parse_stop_decision, IterationContext, IterationOracle, LlmOracle, StopDecision};
pub use query::{ResponseMethod, TaskQueryInterpretation};
pub use registry::{LatestResult, Task, TaskRegistry, TaskStatus};
pub use sink::ResultSink;
