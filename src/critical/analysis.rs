//! Analysis prompts
//!
//! Each analysis tool is a single prompt template sent to the reasoning
//! model. The templates ask for JSON where a structured answer helps the
//! host agent, but the model's reply is returned as-is.

use anyhow::Result;
use serde_json::{json, Map, Value};

use crate::tools::{required_str, ToolDefinition};

/// The analysis tools offered by the critical-systems toolkit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisKind {
    Structured,
    Request,
    Solutions,
    Stakeholder,
    FutureScenarios,
    SystemMapping,
    Risk,
    Ethical,
}

const PROBLEM: (&str, &str) = ("problem_statement", "A description of the problem or situation.");
const SOLUTION: (&str, &str) = ("proposed_solution", "A description of the proposed solution.");
const STATEMENT: (&str, &str) = ("statement", "Description of problem or errors seen.");

impl AnalysisKind {
    pub const ALL: [AnalysisKind; 8] = [
        Self::Structured,
        Self::Request,
        Self::Solutions,
        Self::Stakeholder,
        Self::FutureScenarios,
        Self::SystemMapping,
        Self::Risk,
        Self::Ethical,
    ];

    pub fn tool_name(self) -> &'static str {
        match self {
            Self::Structured => "structured_analysis",
            Self::Request => "analyze_request",
            Self::Solutions => "consider_solutions",
            Self::Stakeholder => "stakeholder_analysis",
            Self::FutureScenarios => "generate_future_scenarios",
            Self::SystemMapping => "system_mapping",
            Self::Risk => "risk_assessment",
            Self::Ethical => "ethical_analysis",
        }
    }

    pub fn from_tool(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.tool_name() == name)
    }

    /// Whether the toolkit's system prompt accompanies this analysis
    pub fn uses_system_prompt(self) -> bool {
        matches!(self, Self::Request)
    }

    fn description(self) -> &'static str {
        match self {
            Self::Structured => "Perform a structured analysis of the given problem using the MECE principle. Returns a JSON string.",
            Self::Request => "When a request is unclear, high-level or ambiguous, analyze it and ask up to 5 short clarifying questions.",
            Self::Solutions => "Summarize the problem and provide a solution or a set of up to 5 solutions.",
            Self::Stakeholder => "Identify key stakeholders related to the problem, their interests and potential impacts.",
            Self::FutureScenarios => "Generate potential future scenarios for the problem over a time horizon. Returns a JSON string.",
            Self::SystemMapping => "Create a high-level system map of components, relationships and feedback loops. Returns a JSON string.",
            Self::Risk => "Assess risks of a proposed solution: likelihood, impact and mitigation. Returns a JSON string.",
            Self::Ethical => "Perform an ethical analysis of a problem and proposed solution. Returns a JSON string.",
        }
    }

    fn params(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Structured => &[("problem", "A description of the problem to analyze.")],
            Self::Request | Self::Solutions => &[STATEMENT],
            Self::Stakeholder | Self::SystemMapping => &[PROBLEM],
            Self::FutureScenarios => &[
                PROBLEM,
                ("time_horizon", "The future time frame to consider (e.g. \"5 years\", \"10 years\")."),
            ],
            Self::Risk | Self::Ethical => &[PROBLEM, SOLUTION],
        }
    }

    pub fn definition(self) -> ToolDefinition {
        let mut properties = Map::new();
        for (name, desc) in self.params() {
            properties.insert(name.to_string(), json!({"type": "string", "description": desc}));
        }
        let required: Vec<&str> = self.params().iter().map(|(name, _)| *name).collect();

        ToolDefinition::new(
            self.tool_name(),
            self.description(),
            json!({
                "type": "object",
                "properties": properties,
                "required": required
            }),
        )
    }

    /// Fill the prompt template from the tool arguments
    pub fn render(self, args: &Value) -> Result<String> {
        let prompt = match self {
            Self::Structured => format!(
                r#"Perform a structured analysis of the following problem using the MECE principle:
{}
Return the results as a JSON string with the following structure:
{{
    "problem": "Brief restatement of the problem",
    "categories": [
        {{
            "name": "Category Name",
            "elements": ["Element 1", "Element 2", ...],
            "analysis": "Brief analysis of this category"
        }},
        ...
    ],
    "conclusion": "Overall conclusion based on the structured analysis"
}}"#,
                required_str(args, "problem")?
            ),
            Self::Request => format!(
                "Analyze the user statement: {}\n\
                 If you need to immediately clarify something and it's something\n\
                 short and simple, respond with your question(s).\n\
                 If you need multiple questions, you can ask multiple questions.\n\
                 Please bullet point your questions.\n\
                 Limit your response to 5 questions.",
                required_str(args, "statement")?
            ),
            Self::Solutions => format!(
                "Analyze the user statement: {}\n\
                 Consider the existing message history and provide a well thought out response.\n\
                 Provide one or more potential solutions to the problem.\n\
                 Limit your response to 5 solutions.",
                required_str(args, "statement")?
            ),
            Self::Stakeholder => format!(
                "Analyze the following problem statement and identify key stakeholders:\n\
                 {}\n\
                 For each stakeholder, determine their interests and potential impacts.",
                required_str(args, PROBLEM.0)?
            ),
            Self::FutureScenarios => format!(
                "Based on the following problem statement and time horizon, generate potential future scenarios:\n\
                 Problem: {}\n\
                 Time Horizon: {}\n\n\
                 Consider various factors such as technological advancements, societal changes,\n\
                 environmental impacts, and potential policy shifts.\n\n\
                 Return the results as a JSON string with scenarios including name, description,\n\
                 key factors, and potential outcomes.\n\
                 Generate at least 3 distinct scenarios.",
                required_str(args, PROBLEM.0)?,
                required_str(args, "time_horizon")?
            ),
            Self::SystemMapping => format!(
                "Based on the following problem statement, create a high-level system map:\n\
                 {}\n\n\
                 Identify key components, their relationships, and potential feedback loops.\n\
                 Return results as JSON with components and feedback loops.",
                required_str(args, PROBLEM.0)?
            ),
            Self::Risk => format!(
                "Perform a risk assessment for the following problem and proposed solution:\n\
                 Problem: {}\n\
                 Proposed Solution: {}\n\n\
                 Identify potential risks, their likelihood, impact, and possible mitigation strategies.\n\
                 Return results as JSON with detailed risk assessments.",
                required_str(args, PROBLEM.0)?,
                required_str(args, SOLUTION.0)?
            ),
            Self::Ethical => format!(
                "Perform an ethical analysis for the following problem and proposed solution:\n\
                 Problem: {}\n\
                 Proposed Solution: {}\n\n\
                 Consider various ethical frameworks and principles, potential ethical dilemmas,\n\
                 and the impact on different stakeholders.\n\
                 Return results as JSON with ethical considerations and overall assessment.",
                required_str(args, PROBLEM.0)?,
                required_str(args, SOLUTION.0)?
            ),
        };
        Ok(prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_names_round_trip() {
        for kind in AnalysisKind::ALL {
            assert_eq!(AnalysisKind::from_tool(kind.tool_name()), Some(kind));
        }
        assert_eq!(AnalysisKind::from_tool("autonomous_loop"), None);
    }

    #[test]
    fn test_risk_prompt_includes_both_arguments() {
        let prompt = AnalysisKind::Risk
            .render(&json!({
                "problem_statement": "grid instability",
                "proposed_solution": "home batteries"
            }))
            .unwrap();
        assert!(prompt.contains("Problem: grid instability"));
        assert!(prompt.contains("Proposed Solution: home batteries"));
        assert!(prompt.contains("mitigation strategies"));
    }

    #[test]
    fn test_structured_prompt_keeps_json_braces() {
        let prompt = AnalysisKind::Structured
            .render(&json!({"problem": "traffic"}))
            .unwrap();
        assert!(prompt.contains("MECE principle:\ntraffic"));
        assert!(prompt.contains("\"categories\": ["));
    }

    #[test]
    fn test_missing_argument_is_an_error() {
        let err = AnalysisKind::FutureScenarios
            .render(&json!({"problem_statement": "x"}))
            .unwrap_err();
        assert!(err.to_string().contains("time_horizon"));
    }

    #[test]
    fn test_definitions_list_required_params() {
        let def = AnalysisKind::Ethical.definition();
        assert_eq!(def.name, "ethical_analysis");
        assert_eq!(
            def.input_schema["required"],
            json!(["problem_statement", "proposed_solution"])
        );
    }
}
