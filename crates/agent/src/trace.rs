use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Observation text kept in the trace (and shown to the model) is capped at
/// this many characters; the full tool output stays in `tool_output`.
pub const OBSERVATION_LIMIT: usize = 500;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Thought,
    Action,
    Observation,
    FinalAnswer,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Finished,
    MaxIterationsReached,
    Errored,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub index: u32,
    pub kind: StepKind,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_output: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Step {
    fn new(index: u32, kind: StepKind, text: String) -> Self {
        Self { index, kind, text, tool_name: None, tool_input: None, tool_output: None, timestamp: Utc::now() }
    }
}

/// Record of one query's Thought/Action/Observation sequence. Steps of the
/// same iteration share an index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReasoningTrace {
    pub correlation_id: String,
    pub query: String,
    pub steps: Vec<Step>,
    pub final_answer: Option<String>,
    pub success: bool,
    pub status: Option<RunStatus>,
    pub max_iterations: u32,
    pub started_at: DateTime<Utc>,
}

impl ReasoningTrace {
    pub fn new(query: impl Into<String>, max_iterations: u32) -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            query: query.into(),
            steps: Vec::new(),
            final_answer: None,
            success: false,
            status: None,
            max_iterations,
            started_at: Utc::now(),
        }
    }

    pub fn add_thought(&mut self, index: u32, thought: impl Into<String>) {
        self.steps.push(Step::new(index, StepKind::Thought, thought.into()));
    }

    pub fn add_action(&mut self, index: u32, tool_name: &str, tool_input: Value) {
        let mut step = Step::new(index, StepKind::Action, format!("{tool_name}({tool_input})"));
        step.tool_name = Some(tool_name.to_string());
        step.tool_input = Some(tool_input);
        self.steps.push(step);
    }

    pub fn add_observation(&mut self, index: u32, tool_name: &str, output: String) {
        let mut step = Step::new(index, StepKind::Observation, truncate_chars(&output, OBSERVATION_LIMIT));
        step.tool_name = Some(tool_name.to_string());
        step.tool_output = Some(output);
        self.steps.push(step);
    }

    pub fn add_final_answer(&mut self, index: u32, answer: impl Into<String>) {
        self.steps.push(Step::new(index, StepKind::FinalAnswer, answer.into()));
    }

    pub fn finish(&mut self, answer: impl Into<String>, success: bool, status: RunStatus) {
        self.final_answer = Some(answer.into());
        self.success = success;
        self.status = Some(status);
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_some()
    }

    /// Number of Thought steps, i.e. reasoner turns taken.
    pub fn iterations(&self) -> u32 {
        let count = self.steps.iter().filter(|step| step.kind == StepKind::Thought).count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// Tools invoked, in order of first use.
    pub fn tools_used(&self) -> Vec<String> {
        let mut used: Vec<String> = Vec::new();
        for step in &self.steps {
            if step.kind != StepKind::Action {
                continue;
            }
            if let Some(name) = &step.tool_name {
                if !used.contains(name) {
                    used.push(name.clone());
                }
            }
        }
        used
    }

    /// Plain-text transcript handed to the reasoner.
    pub fn context_summary(&self) -> String {
        let mut summary =
            format!("Query: {}\n\nReasoning trace ({} steps):\n", self.query, self.steps.len());
        for step in &self.steps {
            let line = match step.kind {
                StepKind::Thought => format!("Thought {}: {}", step.index, step.text),
                StepKind::Action => format!("Action: {}", step.text),
                StepKind::Observation => format!("Observation: {}", step.text),
                StepKind::FinalAnswer => format!("Final Answer: {}", step.text),
            };
            summary.push_str(&line);
            summary.push('\n');
        }
        summary
    }
}

/// Truncates to at most `limit` characters without splitting a code point.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}
