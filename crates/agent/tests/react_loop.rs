use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use premia_agent::{
    standard_registry, ChatMessage, Intent, LlmClient, LlmReasoner, ReasoningLoop, RunStatus,
    StepKind, ToolContext, ToolDependencies,
};
use premia_core::premium::catalog::PremiumCatalog;
use premia_core::retrieval::{CollectionCatalog, InMemoryDocumentStore, StoredDocument};
use tempfile::TempDir;

/// Chat model stand-in that replies from a script and then repeats its last
/// reply.
struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    last: Mutex<String>,
}

impl ScriptedModel {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|reply| reply.to_string()).collect()),
            last: Mutex::new(String::new()),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedModel {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
        let next = self.replies.lock().expect("lock").pop_front();
        let mut last = self.last.lock().expect("lock");
        match next {
            Some(reply) => {
                *last = reply.clone();
                Ok(reply)
            }
            None if last.is_empty() => Err(anyhow!("model unavailable")),
            None => Ok(last.clone()),
        }
    }
}

fn fixture(dir: &Path) -> ToolDependencies {
    fs::write(
        dir.join("activ_assure.json"),
        r#"{"sheets": [
            {"name": "Individual", "columns": ["3L", "5L", "10L"], "rows": [
                {"age_band": "18-25", "premiums": {"3L": "4100", "5L": "5120", "10L": "7400"}},
                {"age_band": "26-35", "premiums": {"3L": "5300", "5L": "6887", "10L": "9350"}}
            ]}
        ]}"#,
    )
    .expect("write workbook");
    let registry = dir.join("premium_workbooks_registry.json");
    fs::write(&registry, r#"{"ActivAssure": {"excel_path": "activ_assure.json"}}"#)
        .expect("write registry");

    let collections_root = dir.join("collections");
    fs::create_dir_all(collections_root.join("ActivAssure")).expect("create collection");
    let collections = CollectionCatalog::new(&collections_root, Some("ActivAssure".to_string()));
    let mut store = InMemoryDocumentStore::new();
    let mut metadata = BTreeMap::new();
    metadata.insert("source".to_string(), "policy_wording.pdf".to_string());
    store.insert(
        collections.collection_path("ActivAssure"),
        vec![StoredDocument {
            content: "Pre-existing diseases are covered after a waiting period of 36 months".to_string(),
            metadata,
        }],
    );

    ToolDependencies {
        catalog: Arc::new(PremiumCatalog::new(registry)),
        store: Arc::new(store),
        collections,
        default_sum_insured: 500_000,
        default_k: 5,
    }
}

fn agent(dir: &TempDir, replies: &[&str]) -> ReasoningLoop<LlmReasoner<ScriptedModel>> {
    ReasoningLoop::new(LlmReasoner::new(ScriptedModel::new(replies)), standard_registry(fixture(dir.path())))
        .with_max_iterations(5)
}

#[tokio::test]
async fn premium_question_is_answered_from_the_rate_table() {
    let dir = TempDir::new().expect("tempdir");
    let agent = agent(
        &dir,
        &[
            "Thought: I should price ActivAssure for a 35 year old\nAction: premium_calculator\nAction Input: {\"policy_name\": \"Activ Assure\", \"members\": [{\"age\": 35}], \"sum_insured\": \"5L\"}",
            "Thought: I have the premium\nAction: finish\nAction Input: {\"answer\": \"ActivAssure costs ₹8,126.66 a year including GST.\"}",
        ],
    );

    let outcome = agent.run("What is the ActivAssure premium for a 35 year old?", &ToolContext::default(), None).await;

    assert!(outcome.success);
    assert_eq!(outcome.status, RunStatus::Finished);
    assert_eq!(outcome.iterations, 2);
    assert_eq!(outcome.tools_used, vec!["premium_calculator"]);
    assert_eq!(outcome.final_answer, "ActivAssure costs ₹8,126.66 a year including GST.");
    let observation = outcome
        .reasoning_trace
        .steps
        .iter()
        .find(|step| step.kind == StepKind::Observation)
        .expect("observation step");
    assert_eq!(
        observation.text,
        "Premium calculated for ActivAssure: ₹8,126.66 annually. Base premium: ₹6,887.00, GST: ₹1,239.66"
    );
    assert_eq!(agent.tools().usage("premium_calculator"), 1);
    assert_eq!(outcome.classification.intent, Intent::PremiumCalculation);
    assert_eq!(outcome.inferred_intent, Intent::PremiumCalculation);
    assert_eq!(agent.stats().intents.get(&Intent::PremiumCalculation), Some(&1));
}

#[tokio::test]
async fn model_that_never_finishes_hits_the_cap() {
    let dir = TempDir::new().expect("tempdir");
    let agent = agent(
        &dir,
        &["Thought: search again\nAction: document_retriever\nAction Input: {\"query\": \"waiting period\"}"],
    );

    let outcome = agent.run("waiting period?", &ToolContext::default(), Some(4)).await;

    assert!(!outcome.success);
    assert_eq!(outcome.status, RunStatus::MaxIterationsReached);
    assert_eq!(outcome.iterations, 4);
    assert_eq!(agent.tools().usage("document_retriever"), 4);
    assert!(outcome.reasoning_trace.steps[2].text.starts_with("Retrieved 1 relevant documents."));
    assert_eq!(agent.stats().max_iterations_reached, 1);
}

#[tokio::test]
async fn unknown_product_is_observed_and_the_model_recovers() {
    let dir = TempDir::new().expect("tempdir");
    let agent = agent(
        &dir,
        &[
            "Thought: price it\nAction: premium_calculator\nAction Input: {\"policy_name\": \"Zeta Shield\", \"members\": [40]}",
            "Thought: that product is not available\nFinal Answer: Zeta Shield is not offered. Available: ActivAssure.",
        ],
    );

    let outcome = agent.run("Price Zeta Shield for me", &ToolContext::default(), None).await;

    assert!(outcome.success);
    assert_eq!(
        outcome.reasoning_trace.steps[2].text,
        "Error: No premium chart found for 'Zeta Shield'. Available products: ActivAssure"
    );
    assert_eq!(outcome.final_answer, "Zeta Shield is not offered. Available: ActivAssure.");
}

#[tokio::test]
async fn transport_failure_fails_the_run() {
    let dir = TempDir::new().expect("tempdir");
    let agent = agent(&dir, &[]);

    let outcome = agent.run("anything", &ToolContext::default(), None).await;

    assert!(!outcome.success);
    assert_eq!(outcome.status, RunStatus::Errored);
    assert_eq!(outcome.final_answer, "Error during reasoning: model unavailable");
    assert!(outcome.reasoning_trace.steps.is_empty());
}
