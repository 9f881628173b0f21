//! Refine / stop decisions for the iteration engine.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

use crate::claude::Reasoner;

/// State handed to the oracle for one iteration
#[derive(Debug, Clone)]
pub struct IterationContext<'a> {
    pub task_description: &'a str,
    pub current_answer: &'a str,
    pub iteration: u64,
    pub elapsed_secs: u64,
    pub total_secs: u64,
}

/// Outcome of the stop check
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StopDecision {
    pub should_stop: bool,
    pub reasoning: String,
}

impl StopDecision {
    pub fn keep_going(reasoning: &str) -> Self {
        Self {
            should_stop: false,
            reasoning: reasoning.to_string(),
        }
    }
}

/// External operations the engine drives each iteration
#[async_trait]
pub trait IterationOracle: Send + Sync {
    /// Produce a refined answer for the task
    async fn refine(&self, ctx: &IterationContext<'_>) -> Result<String>;

    /// Decide whether the refined answer is good enough to stop
    async fn should_stop(&self, ctx: &IterationContext<'_>) -> Result<StopDecision>;
}

/// Oracle backed by a language model
pub struct LlmOracle {
    reasoner: Arc<dyn Reasoner>,
    system_prompt: String,
}

impl LlmOracle {
    pub fn new(reasoner: Arc<dyn Reasoner>, system_prompt: impl Into<String>) -> Self {
        Self {
            reasoner,
            system_prompt: system_prompt.into(),
        }
    }

    fn refine_prompt(ctx: &IterationContext<'_>) -> String {
        format!(
            "Task: {}\n\
             Current answer: {}\n\
             Iteration: {}\n\
             Elapsed time: {} seconds\n\
             Total duration: {} seconds\n\n\
             Please refine the current answer using your critical thinking skills and the task description.",
            ctx.task_description, ctx.current_answer, ctx.iteration, ctx.elapsed_secs, ctx.total_secs
        )
    }

    fn stop_prompt(ctx: &IterationContext<'_>) -> String {
        format!(
            "Task: {}\n\
             Current answer: {}\n\
             Iterations completed: {}\n\
             Elapsed time: {} seconds\n\
             Total allowed duration: {} seconds\n\n\
             Based on the current state of the task, determine if the autonomous loop should stop.\n\
             Consider the quality and completeness of the current answer, the number of iterations,\n\
             and the time constraints.\n\n\
             Provide your response in the following JSON format:\n\
             {{\n    \"should_stop\": boolean,\n    \"reasoning\": \"A brief explanation of why the task should or should not stop.\"\n}}",
            ctx.task_description, ctx.current_answer, ctx.iteration, ctx.elapsed_secs, ctx.total_secs
        )
    }
}

#[async_trait]
impl IterationOracle for LlmOracle {
    async fn refine(&self, ctx: &IterationContext<'_>) -> Result<String> {
        self.reasoner
            .ask(&Self::refine_prompt(ctx), Some(&self.system_prompt))
            .await
    }

    async fn should_stop(&self, ctx: &IterationContext<'_>) -> Result<StopDecision> {
        let response = self
            .reasoner
            .ask(&Self::stop_prompt(ctx), Some(&self.system_prompt))
            .await?;
        Ok(parse_stop_decision(&response))
    }
}

/// Parse the model's stop decision, falling back to "continue" on bad output
pub fn parse_stop_decision(response: &str) -> StopDecision {
    let value: serde_json::Value = match serde_json::from_str(extract_json_object(response)) {
        Ok(v) => v,
        Err(_) => {
            warn!("Invalid JSON response from LLM for stop condition check");
            return StopDecision::keep_going("Error in LLM response format. Continuing task.");
        }
    };

    match serde_json::from_value::<StopDecision>(value) {
        Ok(decision) => decision,
        Err(e) => {
            warn!("Invalid stop condition structure: {}", e);
            StopDecision::keep_going("Error in LLM response structure. Continuing task.")
        }
    }
}

/// Outermost `{...}` span of a model reply, tolerating prose or code fences around it
pub(crate) fn extract_json_object(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => text.trim(),
    }
}
