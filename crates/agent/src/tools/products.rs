use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use premia_core::premium::catalog::PremiumCatalog;
use premia_core::retrieval::CollectionCatalog;
use serde_json::{Map, Value};
use tracing::warn;

use super::{parse_input, Tool, ToolContext};

pub struct ListProductsTool {
    catalog: Arc<PremiumCatalog>,
    collections: CollectionCatalog,
}

impl ListProductsTool {
    pub fn new(catalog: Arc<PremiumCatalog>, collections: CollectionCatalog) -> Self {
        Self { catalog, collections }
    }
}

#[async_trait]
impl Tool for ListProductsTool {
    fn name(&self) -> &'static str {
        "list_products"
    }

    fn description(&self) -> &'static str {
        "List the products that have premium rate tables and the products that have searchable documents. Input: {}"
    }

    async fn execute(&self, input: &str, _context: &ToolContext) -> Result<String> {
        if let Err(observation) = parse_input::<Map<String, Value>>(input) {
            return Ok(observation);
        }

        let priced = match self.catalog.product_names() {
            Ok(names) if names.is_empty() => "none".to_string(),
            Ok(names) => names.join(", "),
            Err(error) => {
                warn!(
                    event_name = "tool.list_products.registry_unavailable",
                    error = %error,
                    "premium registry unavailable"
                );
                "unavailable (premium rate tables are not configured)".to_string()
            }
        };

        let documented = self.collections.product_names();
        let documented =
            if documented.is_empty() { "none".to_string() } else { documented.join(", ") };

        Ok(format!(
            "Products with premium rate tables: {priced}. Products with documents: {documented}"
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;

    use premia_core::premium::catalog::PremiumCatalog;
    use premia_core::retrieval::CollectionCatalog;
    use tempfile::TempDir;

    use super::ListProductsTool;
    use crate::tools::{Tool, ToolContext, INVALID_JSON_OBSERVATION};

    #[tokio::test]
    async fn lists_priced_and_documented_products() {
        let dir = TempDir::new().expect("tempdir");
        let registry = dir.path().join("registry.json");
        fs::write(
            &registry,
            r#"{"ActivFit": {"excel_path": "fit.xlsx"}, "ActivAssure": {"excel_path": "assure.xlsx"}}"#,
        )
        .expect("write registry");
        let collections_root = dir.path().join("collections");
        fs::create_dir_all(collections_root.join("ActivAssure")).expect("create collection");

        let tool = ListProductsTool::new(
            Arc::new(PremiumCatalog::new(registry)),
            CollectionCatalog::new(collections_root, None),
        );
        let observation = tool.execute("{}", &ToolContext::default()).await.expect("tool runs");

        assert_eq!(
            observation,
            "Products with premium rate tables: ActivAssure, ActivFit. Products with documents: ActivAssure"
        );
    }

    #[tokio::test]
    async fn missing_registry_is_reported_not_raised() {
        let dir = TempDir::new().expect("tempdir");
        let tool = ListProductsTool::new(
            Arc::new(PremiumCatalog::new(dir.path().join("missing.json"))),
            CollectionCatalog::new(dir.path().join("nowhere"), None),
        );

        let observation = tool.execute("{}", &ToolContext::default()).await.expect("tool runs");

        assert_eq!(
            observation,
            "Products with premium rate tables: unavailable (premium rate tables are not configured). Products with documents: none"
        );
    }

    #[tokio::test]
    async fn malformed_input_is_an_invalid_json_observation() {
        let dir = TempDir::new().expect("tempdir");
        let tool = ListProductsTool::new(
            Arc::new(PremiumCatalog::new(dir.path().join("registry.json"))),
            CollectionCatalog::new(dir.path().join("collections"), None),
        );

        for input in ["{not json", r#""ActivAssure""#] {
            let observation = tool.execute(input, &ToolContext::default()).await.expect("tool runs");
            assert_eq!(observation, INVALID_JSON_OBSERVATION, "input: {input}");
        }
    }
}
