use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use premia_core::premium::catalog::{CatalogError, PremiumCatalog};
use premia_core::premium::rate_table::parse_sum_insured;
use premia_core::premium::{format_amount, Member, PremiumEngine, PremiumQuote, PremiumRequest};
use premia_core::retrieval::{CollectionCatalog, DocumentStore};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::ChatMessage;

pub mod comparator;
pub mod premium;
pub mod products;
pub mod retriever;

pub use comparator::PolicyComparatorTool;
pub use premium::PremiumCalculatorTool;
pub use products::ListProductsTool;
pub use retriever::DocumentRetrieverTool;

/// Terminal pseudo-tool; handled by the reasoning loop, never registered.
pub const FINISH_TOOL: &str = "finish";
pub const INVALID_JSON_OBSERVATION: &str = "Error: Invalid JSON format in action_input";

/// Per-query state handed to every tool call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolContext {
    pub selected_product: Option<String>,
    pub collection_path: Option<PathBuf>,
    #[serde(default)]
    pub conversation_history: Vec<ChatMessage>,
}

impl ToolContext {
    pub fn for_product(product: impl Into<String>) -> Self {
        Self { selected_product: Some(product.into()), ..Self::default() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
}

/// A named capability the reasoner can invoke. Input is the raw JSON text of
/// the action input. Invalid input is reported as an `Ok("Error: ...")`
/// observation; `Err` is reserved for failures of the tool itself.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    async fn execute(&self, input: &str, context: &ToolContext) -> Result<String>;
}

struct RegisteredTool {
    tool: Arc<dyn Tool>,
    usage: AtomicU64,
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(
            tool.name().to_string(),
            RegisteredTool { tool: Arc::new(tool), usage: AtomicU64::new(0) },
        );
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .values()
            .map(|registered| ToolSpec {
                name: registered.tool.name().to_string(),
                description: registered.tool.description().to_string(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Runs `name`, counting the call whether or not it succeeds.
    pub async fn execute(&self, name: &str, input: &str, context: &ToolContext) -> Result<String> {
        let Some(registered) = self.tools.get(name) else {
            bail!("unknown tool `{name}`");
        };
        registered.usage.fetch_add(1, Ordering::Relaxed);
        registered.tool.execute(input, context).await
    }

    pub fn usage(&self, name: &str) -> u64 {
        self.tools.get(name).map(|registered| registered.usage.load(Ordering::Relaxed)).unwrap_or(0)
    }

    pub fn usage_snapshot(&self) -> BTreeMap<String, u64> {
        self.tools
            .iter()
            .map(|(name, registered)| (name.clone(), registered.usage.load(Ordering::Relaxed)))
            .collect()
    }

    pub fn reset_usage(&self) {
        for registered in self.tools.values() {
            registered.usage.store(0, Ordering::Relaxed);
        }
    }
}

/// Shared collaborators for the standard insurance tool set.
#[derive(Clone)]
pub struct ToolDependencies {
    pub catalog: Arc<PremiumCatalog>,
    pub store: Arc<dyn DocumentStore>,
    pub collections: CollectionCatalog,
    pub default_sum_insured: u64,
    pub default_k: usize,
}

/// Registry with `premium_calculator`, `policy_comparator`,
/// `document_retriever` and `list_products`.
pub fn standard_registry(deps: ToolDependencies) -> ToolRegistry {
    let mut registry = ToolRegistry::default();
    registry.register(PremiumCalculatorTool::new(Arc::clone(&deps.catalog), deps.default_sum_insured));
    registry.register(PolicyComparatorTool::new(Arc::clone(&deps.catalog), deps.default_sum_insured));
    registry.register(DocumentRetrieverTool::new(
        Arc::clone(&deps.store),
        deps.collections.clone(),
        deps.default_k,
    ));
    registry.register(ListProductsTool::new(deps.catalog, deps.collections));
    registry
}

/// Parses the action input into `T`, mapping failures to observation text.
pub(crate) fn parse_input<T: DeserializeOwned>(input: &str) -> Result<T, String> {
    let value: Value =
        serde_json::from_str(input).map_err(|_| INVALID_JSON_OBSERVATION.to_string())?;
    if !value.is_object() {
        return Err(INVALID_JSON_OBSERVATION.to_string());
    }
    serde_json::from_value(value).map_err(|error| format!("Error: Invalid action_input fields: {error}"))
}

/// A member given either as a bare age or as `{"age": .., "relation": ..}`.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum MemberInput {
    Age(u32),
    Detailed(Member),
}

impl From<MemberInput> for Member {
    fn from(value: MemberInput) -> Self {
        match value {
            MemberInput::Age(age) => Member::aged(age),
            MemberInput::Detailed(member) => member,
        }
    }
}

/// Sum insured as a number of rupees or a label such as "5L".
pub(crate) fn resolve_sum_insured(value: Option<&Value>, default: u64) -> Result<u64, String> {
    let invalid = |raw: &Value| format!("Error: Invalid sum_insured '{raw}'");
    match value {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Number(number)) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|amount| *amount >= 0.0).map(|amount| amount.trunc() as u64))
            .ok_or_else(|| invalid(&Value::Number(number.clone()))),
        Some(Value::String(label)) => {
            parse_sum_insured(label).map_err(|_| invalid(&Value::String(label.clone())))
        }
        Some(other) => Err(invalid(other)),
    }
}

/// Resolves `product` through the catalog and prices `request`. Errors are
/// observation-ready text.
pub(crate) fn price_product(
    catalog: &PremiumCatalog,
    product: &str,
    request: &PremiumRequest,
) -> Result<(String, PremiumQuote), String> {
    let (key, engine): (String, Arc<PremiumEngine>) =
        catalog.engine_for(product).map_err(|error| catalog_observation(&error))?;
    let quote = engine.calculate(request).map_err(|error| format!("Error: {error}"))?;
    Ok((key, quote))
}

pub(crate) fn catalog_observation(error: &CatalogError) -> String {
    match error {
        CatalogError::UnknownProduct { requested, available } => format!(
            "Error: No premium chart found for '{requested}'. Available products: {}",
            available.join(", ")
        ),
        CatalogError::Registry(source) => format!(
            "Error: Premium rate tables are not configured ({source}). Please run premium workbook ingestion first."
        ),
        CatalogError::Workbook { .. } => format!("Error: {error}"),
    }
}

pub(crate) fn rupees(amount: rust_decimal::Decimal) -> String {
    format!("₹{}", format_amount(amount))
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::json;

    use super::{resolve_sum_insured, Tool, ToolContext, ToolRegistry};

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn description(&self) -> &'static str {
            "Echoes its input"
        }

        async fn execute(&self, input: &str, _context: &ToolContext) -> Result<String> {
            if input.contains("boom") {
                anyhow::bail!("echo exploded");
            }
            Ok(input.to_string())
        }
    }

    #[tokio::test]
    async fn usage_counts_successes_and_failures() {
        let mut registry = ToolRegistry::default();
        registry.register(EchoTool);
        let context = ToolContext::default();

        assert_eq!(registry.execute("echo", "hi", &context).await.ok().as_deref(), Some("hi"));
        assert!(registry.execute("echo", "boom", &context).await.is_err());
        assert!(registry.execute("missing", "hi", &context).await.is_err());

        assert_eq!(registry.usage("echo"), 2);
        assert_eq!(registry.usage("missing"), 0);
        assert_eq!(registry.names(), vec!["echo"]);
        assert_eq!(registry.specs()[0].description, "Echoes its input");

        registry.reset_usage();
        assert_eq!(registry.usage_snapshot().get("echo"), Some(&0));
    }

    #[test]
    fn sum_insured_accepts_numbers_and_lakh_labels() {
        assert_eq!(resolve_sum_insured(None, 500_000), Ok(500_000));
        assert_eq!(resolve_sum_insured(Some(&json!(1_000_000)), 500_000), Ok(1_000_000));
        assert_eq!(resolve_sum_insured(Some(&json!(750000.0)), 500_000), Ok(750_000));
        assert_eq!(resolve_sum_insured(Some(&json!("5L")), 0), Ok(500_000));
        assert!(resolve_sum_insured(Some(&json!("lots")), 0).is_err());
        assert!(resolve_sum_insured(Some(&json!(-1)), 0).is_err());
    }
}
