use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::intent::{infer_intent, Classification, Intent, IntentClassifier, LearningStats};
use crate::memory::ConversationMemory;
use crate::parser::ProposedStep;
use crate::reasoner::Reasoner;
use crate::tools::{ToolContext, ToolRegistry, FINISH_TOOL};
use crate::trace::{ReasoningTrace, RunStatus};

pub const DEFAULT_MAX_ITERATIONS: u32 = 10;
pub const MAX_ITERATIONS_ANSWER: &str = "Maximum reasoning iterations reached. Could not complete task.";
const MISSING_ANSWER: &str = "No answer provided";
/// Remembered turns offered to a follow-up query.
const FOLLOW_UP_TURNS: usize = 3;

/// Result of one query through the loop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub query: String,
    pub final_answer: String,
    pub success: bool,
    pub status: RunStatus,
    pub iterations: u32,
    pub tools_used: Vec<String>,
    /// Keyword classification made before the run.
    pub classification: Classification,
    /// Intent the run actually served, judged from `tools_used`.
    pub inferred_intent: Intent,
    pub reasoning_trace: ReasoningTrace,
}

impl RunOutcome {
    fn from_trace(trace: &ReasoningTrace, classification: Classification) -> Self {
        let tools_used = trace.tools_used();
        Self {
            query: trace.query.clone(),
            final_answer: trace.final_answer.clone().unwrap_or_default(),
            success: trace.success,
            status: trace.status.unwrap_or(RunStatus::Errored),
            iterations: trace.iterations(),
            inferred_intent: infer_intent(&tools_used),
            tools_used,
            classification,
            reasoning_trace: trace.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentStats {
    pub total_queries: usize,
    pub successful_queries: usize,
    pub success_rate: f64,
    pub avg_iterations: f64,
    pub avg_steps_per_query: f64,
    pub tools_usage: BTreeMap<String, u64>,
    pub max_iterations_reached: usize,
    pub tool_invocations: u64,
    /// Runs per inferred intent.
    pub intents: BTreeMap<Intent, usize>,
    pub learning: LearningStats,
}

/// Thought → Action → Observation loop over a [`Reasoner`] and a
/// [`ToolRegistry`]. Completed traces are kept for [`ReasoningLoop::stats`];
/// answered turns are remembered for follow-up queries.
pub struct ReasoningLoop<R> {
    reasoner: R,
    tools: ToolRegistry,
    max_iterations: u32,
    history: Mutex<Vec<ReasoningTrace>>,
    classifier: IntentClassifier,
    memory: Mutex<ConversationMemory>,
}

impl<R: Reasoner> ReasoningLoop<R> {
    pub fn new(reasoner: R, tools: ToolRegistry) -> Self {
        Self {
            reasoner,
            tools,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            history: Mutex::new(Vec::new()),
            classifier: IntentClassifier::new(),
            memory: Mutex::new(ConversationMemory::default()),
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Runs `query` to completion. `max_iterations` overrides the loop's
    /// default cap for this query only. A context without conversation
    /// history gets the remembered turns when `query` reads as a follow-up.
    pub async fn run(&self, query: &str, context: &ToolContext, max_iterations: Option<u32>) -> RunOutcome {
        let limit = max_iterations.unwrap_or(self.max_iterations).max(1);
        let mut trace = ReasoningTrace::new(query, limit);
        let specs = self.tools.specs();
        let classification = self.classifier.classify(query);
        let context = self.with_remembered_turns(query, context);
        let context = &context;
        info!(
            event_name = "agent.run.started",
            correlation_id = %trace.correlation_id,
            max_iterations = limit,
            product = context.selected_product.as_deref().unwrap_or(""),
            intent = classification.intent.as_str(),
            confidence = classification.confidence,
            "reasoning run started"
        );

        for iteration in 1..=limit {
            let step = match self.reasoner.propose_step(&trace, context, &specs).await {
                Ok(step) => step,
                Err(error) => {
                    warn!(
                        event_name = "agent.run.reasoner_failed",
                        correlation_id = %trace.correlation_id,
                        iteration,
                        error = %error,
                        "reasoner failed"
                    );
                    trace.finish(format!("Error during reasoning: {error:#}"), false, RunStatus::Errored);
                    break;
                }
            };

            info!(
                event_name = "agent.step.thought",
                correlation_id = %trace.correlation_id,
                iteration,
                thought = %step.thought,
                action = %step.action,
                "reasoner proposed step"
            );
            trace.add_thought(iteration, step.thought.as_str());

            if step.action == FINISH_TOOL {
                let answer = finish_answer(&step.action_input);
                trace.add_final_answer(iteration, answer.as_str());
                trace.finish(answer, true, RunStatus::Finished);
                break;
            }

            trace.add_action(iteration, &step.action, step.action_input.clone());
            let observation = self.observe(&step, context).await;
            info!(
                event_name = "agent.step.observation",
                correlation_id = %trace.correlation_id,
                iteration,
                tool = %step.action,
                observation_chars = observation.chars().count(),
                "tool observation recorded"
            );
            trace.add_observation(iteration, &step.action, observation);
        }

        if !trace.is_terminal() {
            warn!(
                event_name = "agent.run.max_iterations",
                correlation_id = %trace.correlation_id,
                max_iterations = limit,
                "maximum reasoning iterations reached"
            );
            trace.finish(MAX_ITERATIONS_ANSWER, false, RunStatus::MaxIterationsReached);
        }

        let outcome = RunOutcome::from_trace(&trace, classification);
        self.classifier.learn_from_feedback(query, outcome.classification.intent, outcome.inferred_intent);
        if outcome.success {
            self.lock_memory().add_turn(query, outcome.final_answer.as_str());
        }
        info!(
            event_name = "agent.run.finished",
            correlation_id = %trace.correlation_id,
            success = outcome.success,
            iterations = outcome.iterations,
            steps = trace.steps.len(),
            inferred_intent = outcome.inferred_intent.as_str(),
            "reasoning run finished"
        );
        self.lock_history().push(trace);
        outcome
    }

    fn with_remembered_turns(&self, query: &str, context: &ToolContext) -> ToolContext {
        let mut context = context.clone();
        if context.conversation_history.is_empty() {
            context.conversation_history = self.lock_memory().context_for(query, FOLLOW_UP_TURNS);
        }
        context
    }

    async fn observe(&self, step: &ProposedStep, context: &ToolContext) -> String {
        if !self.tools.contains(&step.action) {
            let mut available = self.tools.names();
            available.push(FINISH_TOOL.to_string());
            return format!(
                "Error: Unknown action '{}'. Available tools: [{}]",
                step.action,
                available.join(", ")
            );
        }
        match self.tools.execute(&step.action, &step.action_input.to_string(), context).await {
            Ok(observation) => observation,
            Err(error) => {
                warn!(
                    event_name = "agent.tool.failed",
                    tool = %step.action,
                    error = %error,
                    "tool execution failed"
                );
                format!("Error executing {}: {error:#}", step.action)
            }
        }
    }

    pub fn history(&self) -> Vec<ReasoningTrace> {
        self.lock_history().clone()
    }

    pub fn conversation(&self) -> ConversationMemory {
        self.lock_memory().clone()
    }

    pub fn clear_conversation(&self) {
        self.lock_memory().clear();
    }

    pub fn stats(&self) -> AgentStats {
        let history = self.lock_history();
        let tools_usage = self.tools.usage_snapshot();
        let tool_invocations = tools_usage.values().sum();

        let learning = self.classifier.stats();
        let intents = learning.actual_intents.clone();

        let total_queries = history.len();
        if total_queries == 0 {
            return AgentStats { tools_usage, tool_invocations, intents, learning, ..AgentStats::default() };
        }

        let successful_queries = history.iter().filter(|trace| trace.success).count();
        let total_iterations: u64 = history.iter().map(|trace| u64::from(trace.iterations())).sum();
        let total_steps: usize = history.iter().map(|trace| trace.steps.len()).sum();
        let max_iterations_reached = history
            .iter()
            .filter(|trace| trace.status == Some(RunStatus::MaxIterationsReached))
            .count();
        let queries = total_queries as f64;

        AgentStats {
            total_queries,
            successful_queries,
            success_rate: successful_queries as f64 / queries,
            avg_iterations: total_iterations as f64 / queries,
            avg_steps_per_query: total_steps as f64 / queries,
            tools_usage,
            max_iterations_reached,
            tool_invocations,
            intents,
            learning,
        }
    }

    /// Clears the run history, the tool usage counters and intent learning.
    /// Conversation memory is kept.
    pub fn reset_stats(&self) {
        self.lock_history().clear();
        self.tools.reset_usage();
        self.classifier.reset();
    }

    fn lock_history(&self) -> MutexGuard<'_, Vec<ReasoningTrace>> {
        match self.history.lock() {
            Ok(history) => history,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_memory(&self) -> MutexGuard<'_, ConversationMemory> {
        match self.memory.lock() {
            Ok(memory) => memory,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn finish_answer(input: &Value) -> String {
    match input.get("answer").unwrap_or(input) {
        Value::String(answer) => answer.clone(),
        Value::Null => MISSING_ANSWER.to_string(),
        Value::Object(map) if map.is_empty() => MISSING_ANSWER.to_string(),
        other => other.to_string(),
    }
}
