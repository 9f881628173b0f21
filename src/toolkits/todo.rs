//! To-do list toolkit
//!
//! A session-scoped, 1-based task list. Nothing is persisted.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::info;

use crate::tools::{required_i64, required_str, ToolDefinition, Toolkit};

const INVALID_NUMBER: &str = "User input invalid task number and needs to try again.";

#[derive(Debug, Clone)]
struct TodoItem {
    description: String,
    completed: bool,
}

#[derive(Default)]
pub struct TodoToolkit {
    items: Mutex<Vec<TodoItem>>,
}

/// Render lines the way a Python list literal prints
fn list_literal(lines: &[String]) -> String {
    let quoted: Vec<String> = lines
        .iter()
        .map(|l| {
            if l.contains('\'') && !l.contains('"') {
                format!("\"{}\"", l)
            } else {
                format!("'{}'", l.replace('\'', "\\'"))
            }
        })
        .collect();
    format!("[{}]", quoted.join(", "))
}

impl TodoToolkit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero-based index for a 1-based task number, if it exists
    fn index(items: &[TodoItem], task_number: i64) -> Option<usize> {
        let idx = usize::try_from(task_number).ok()?.checked_sub(1)?;
        (idx < items.len()).then_some(idx)
    }

    pub fn add_task(&self, task: &str) -> String {
        self.items.lock().push(TodoItem {
            description: task.to_string(),
            completed: false,
        });
        info!("Added task: '{}'", task);
        format!("Added task: '{}'", task)
    }

    pub fn list_tasks(&self) -> String {
        let items = self.items.lock();
        if items.is_empty() {
            return "No tasks in the to-do list. Give user instructions on how to add tasks."
                .to_string();
        }
        let lines: Vec<String> = items
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let mark = if t.completed { "✓" } else { " " };
                format!("{}. [{}] {}", i + 1, mark, t.description)
            })
            .collect();
        format!("Tasks listed successfully: {}", list_literal(&lines))
    }

    pub fn remove_task(&self, task_number: i64) -> String {
        let mut items = self.items.lock();
        match Self::index(&items, task_number) {
            Some(idx) => {
                let removed = items.remove(idx);
                format!("Removed task: '{}'", removed.description)
            }
            None => INVALID_NUMBER.to_string(),
        }
    }

    pub fn mark_as_complete(&self, task_number: i64) -> String {
        let mut items = self.items.lock();
        match Self::index(&items, task_number) {
            Some(idx) => {
                items[idx].completed = true;
                format!(
                    "Marked task {} as complete: '{}'",
                    task_number, items[idx].description
                )
            }
            None => INVALID_NUMBER.to_string(),
        }
    }

    pub fn list_completed_tasks(&self) -> String {
        let items = self.items.lock();
        let lines: Vec<String> = items
            .iter()
            .filter(|t| t.completed)
            .enumerate()
            .map(|(i, t)| format!("{}. [✓] {}", i + 1, t.description))
            .collect();
        if lines.is_empty() {
            return "No completed tasks. Provide instructions for marking tasks as complete."
                .to_string();
        }
        format!("Tasks listed successfully: {}", list_literal(&lines))
    }

    pub fn update_task(&self, task_number: i64, new_description: &str) -> String {
        let mut items = self.items.lock();
        match Self::index(&items, task_number) {
            Some(idx) => {
                let old = std::mem::replace(&mut items[idx].description, new_description.to_string());
                info!("Updated task {} from '{}' to '{}'", task_number, old, new_description);
                format!("Updated task {} successfully.", task_number)
            }
            None => "Invalid task number. Unable to update.".to_string(),
        }
    }
}

fn number_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "task_number": {"type": "integer", "description": "The task number, starting from 1."}
        },
        "required": ["task_number"]
    })
}

#[async_trait]
impl Toolkit for TodoToolkit {
    fn name(&self) -> &'static str {
        "todo"
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new(
                "add_task",
                "Add a new task to the to-do list.",
                json!({
                    "type": "object",
                    "properties": {
                        "task": {"type": "string", "description": "The task description to add to the list."}
                    },
                    "required": ["task"]
                }),
            ),
            ToolDefinition::new(
                "list_tasks",
                "List all tasks in the to-do list.",
                json!({"type": "object", "properties": {}}),
            ),
            ToolDefinition::new(
                "remove_task",
                "Remove a task from the to-do list by its number.",
                number_schema(),
            ),
            ToolDefinition::new(
                "mark_as_complete",
                "Mark a task as complete by its number.",
                number_schema(),
            ),
            ToolDefinition::new(
                "list_completed_tasks",
                "List all completed tasks.",
                json!({"type": "object", "properties": {}}),
            ),
            ToolDefinition::new(
                "update_task",
                "Update the description of a task by its number.",
                json!({
                    "type": "object",
                    "properties": {
                        "task_number": {"type": "integer", "description": "The task number, starting from 1."},
                        "new_description": {"type": "string", "description": "The new description for the task."}
                    },
                    "required": ["task_number", "new_description"]
                }),
            ),
        ]
    }

    async fn call(&self, tool: &str, args: &Value) -> Result<String> {
        let out = match tool {
            "add_task" => self.add_task(required_str(args, "task")?),
            "list_tasks" => self.list_tasks(),
            "remove_task" => self.remove_task(required_i64(args, "task_number")?),
            "mark_as_complete" => self.mark_as_complete(required_i64(args, "task_number")?),
            "list_completed_tasks" => self.list_completed_tasks(),
            "update_task" => self.update_task(
                required_i64(args, "task_number")?,
                required_str(args, "new_description")?,
            ),
            other => anyhow::bail!("Unknown tool: {}", other),
        };
        Ok(out)
    }
}
