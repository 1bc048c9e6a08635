use crate::llm::{ChatMessage, ChatRole};
use crate::tools::{ToolContext, ToolSpec, FINISH_TOOL};
use crate::trace::ReasoningTrace;

/// How many earlier conversation turns are replayed into the user prompt.
const HISTORY_TURNS: usize = 6;

pub fn system_prompt(tools: &[ToolSpec]) -> String {
    let mut prompt = String::from(
        "You are an insurance assistant that answers questions about health insurance products.\n\
         You work step by step. At every step reply in exactly this format:\n\n\
         Thought: <your reasoning about what to do next>\n\
         Action: <one tool name from the list below>\n\
         Action Input: <a JSON object with the tool's arguments>\n\n\
         Available tools:\n",
    );
    for tool in tools {
        prompt.push_str(&format!("- {}: {}\n", tool.name, tool.description));
    }
    prompt.push_str(&format!(
        "- {FINISH_TOOL}: Give the final answer to the user. Input: {{\"answer\": \"<final answer>\"}}\n\n"
    ));
    prompt.push_str(
        "Rules:\n\
         - Never compute premiums yourself; use premium_calculator or policy_comparator.\n\
         - Base policy answers on document_retriever observations.\n\
         - Use one action per step and wait for its observation.\n\
         - When you have enough information, use finish.\n",
    );
    prompt
}

pub fn user_prompt(trace: &ReasoningTrace, context: &ToolContext) -> String {
    let mut prompt = String::new();

    let history = &context.conversation_history;
    if !history.is_empty() {
        prompt.push_str("Conversation so far:\n");
        let skip = history.len().saturating_sub(HISTORY_TURNS);
        for message in &history[skip..] {
            let speaker = match message.role {
                ChatRole::User => "User",
                ChatRole::Assistant => "Assistant",
                ChatRole::System => "System",
            };
            prompt.push_str(&format!("{speaker}: {}\n", message.content));
        }
        prompt.push('\n');
    }

    if let Some(product) = &context.selected_product {
        prompt.push_str(&format!("Selected product: {product}\n\n"));
    }

    prompt.push_str(&trace.context_summary());
    prompt.push_str("\nWhat is the next step?");
    prompt
}

pub fn build_messages(trace: &ReasoningTrace, context: &ToolContext, tools: &[ToolSpec]) -> Vec<ChatMessage> {
    vec![ChatMessage::system(system_prompt(tools)), ChatMessage::user(user_prompt(trace, context))]
}
