//! Agent runtime for the insurance assistant.
//!
//! A query runs through a ReAct loop: the [`reasoner::Reasoner`] proposes a
//! Thought and an Action, the [`tools::ToolRegistry`] executes it, and the
//! Observation is appended to the [`trace::ReasoningTrace`] that the next
//! proposal sees. The loop ends on the `finish` pseudo-tool, on a reasoner
//! failure, or at the iteration cap.
//!
//! The model never prices anything itself. Premiums come from the
//! deterministic engine in `premia-core`, reached through the
//! `premium_calculator` and `policy_comparator` tools.

pub mod intent;
pub mod llm;
pub mod memory;
pub mod parser;
pub mod prompts;
pub mod reasoner;
pub mod runtime;
pub mod tools;
pub mod trace;

pub use intent::{infer_intent, Classification, Intent, IntentClassifier, LearningStats};
pub use llm::{ChatMessage, ChatRole, LlmClient, OpenAiCompatibleClient};
pub use memory::ConversationMemory;
pub use parser::{parse_react_response, ProposedStep};
pub use reasoner::{LlmReasoner, Reasoner};
pub use runtime::{AgentStats, ReasoningLoop, RunOutcome};
pub use tools::{standard_registry, Tool, ToolContext, ToolDependencies, ToolRegistry};
pub use trace::{ReasoningTrace, RunStatus, Step, StepKind};
