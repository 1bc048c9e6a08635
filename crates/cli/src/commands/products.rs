use premia_core::config::LoadOptions;
use premia_core::premium::catalog::PremiumCatalog;
use premia_core::retrieval::CollectionCatalog;
use serde::Serialize;

use super::{load_config, CommandResult};

#[derive(Debug, Serialize)]
struct ProductListing {
    rate_tables: Vec<String>,
    documents: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    registry_error: Option<String>,
}

pub fn run(options: LoadOptions) -> CommandResult {
    let config = match load_config("products", options) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let catalog = PremiumCatalog::new(&config.premium.registry_path);
    let (rate_tables, registry_error) = match catalog.product_names() {
        Ok(names) => (names, None),
        Err(error) => (Vec::new(), Some(error.to_string())),
    };
    let documents = CollectionCatalog::new(
        &config.retrieval.collections_root,
        config.retrieval.default_product.clone(),
    )
    .product_names();

    let message = format!(
        "{} products with rate tables, {} products with documents",
        rate_tables.len(),
        documents.len()
    );
    let listing = ProductListing { rate_tables, documents, registry_error };
    CommandResult::success_with_data("products", message, serde_json::to_value(&listing).ok())
}
