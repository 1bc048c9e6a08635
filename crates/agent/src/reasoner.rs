use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::llm::LlmClient;
use crate::parser::{parse_react_response, ProposedStep};
use crate::prompts::build_messages;
use crate::tools::{ToolContext, ToolSpec};
use crate::trace::ReasoningTrace;

/// Decides the next step from the trace so far.
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn propose_step(
        &self,
        trace: &ReasoningTrace,
        context: &ToolContext,
        tools: &[ToolSpec],
    ) -> Result<ProposedStep>;
}

/// Reasoner backed by a chat model speaking the ReAct text format.
pub struct LlmReasoner<C> {
    client: C,
}

impl<C: LlmClient> LlmReasoner<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }
}

#[async_trait]
impl<C: LlmClient> Reasoner for LlmReasoner<C> {
    async fn propose_step(
        &self,
        trace: &ReasoningTrace,
        context: &ToolContext,
        tools: &[ToolSpec],
    ) -> Result<ProposedStep> {
        let messages = build_messages(trace, context, tools);
        let response = self.client.complete(&messages).await?;
        debug!(
            event_name = "agent.reasoner.response",
            correlation_id = %trace.correlation_id,
            response = %response,
            "raw reasoner response"
        );
        Ok(parse_react_response(&response))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use anyhow::Result;
    use async_trait::async_trait;

    use super::{LlmReasoner, Reasoner};
    use crate::llm::{ChatMessage, LlmClient};
    use crate::tools::ToolContext;
    use crate::trace::ReasoningTrace;

    struct RecordingClient {
        reply: String,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    #[async_trait]
    impl LlmClient for RecordingClient {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
            self.seen.lock().expect("lock").push(messages.to_vec());
            Ok(self.reply.clone())
        }
    }

    #[tokio::test]
    async fn parses_model_reply_into_step() {
        let reasoner = LlmReasoner::new(RecordingClient {
            reply: "Thought: list first\nAction: list_products\nAction Input: {}".to_string(),
            seen: Mutex::new(Vec::new()),
        });
        let trace = ReasoningTrace::new("which products exist?", 5);

        let step = reasoner.propose_step(&trace, &ToolContext::default(), &[]).await.expect("step");

        assert_eq!(step.action, "list_products");
        let seen = reasoner.client().seen.lock().expect("lock");
        assert_eq!(seen.len(), 1);
        assert!(seen[0][1].content.contains("Query: which products exist?"));
    }
}
