use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use premia_core::retrieval::{detect_product, CollectionCatalog, DocumentQuery, DocumentStore};
use serde::Deserialize;
use tracing::{info, warn};

use super::{parse_input, Tool, ToolContext};
use crate::trace::truncate_chars;

const PREVIEW_CHARS: usize = 300;

#[derive(Debug, Deserialize)]
struct RetrieveInput {
    query: Option<String>,
    k: Option<usize>,
    doc_type_filter: Option<DocTypeFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DocTypeFilter {
    One(String),
    Many(Vec<String>),
}

impl DocTypeFilter {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(doc_type) => vec![doc_type],
            Self::Many(doc_types) => doc_types,
        }
    }
}

pub struct DocumentRetrieverTool {
    store: Arc<dyn DocumentStore>,
    collections: CollectionCatalog,
    default_k: usize,
}

impl DocumentRetrieverTool {
    pub fn new(store: Arc<dyn DocumentStore>, collections: CollectionCatalog, default_k: usize) -> Self {
        Self { store, collections, default_k }
    }

    /// Picks the collection for `query`: a product named in the query wins,
    /// then the caller's collection, then the selected and default products.
    fn target(&self, query: &str, context: &ToolContext) -> Option<(String, PathBuf)> {
        if let Some(product) = detect_product(query, &self.collections.product_names()) {
            let path = self.collections.collection_path(&product);
            return Some((product, path));
        }
        if let Some(path) = &context.collection_path {
            let label = context
                .selected_product
                .clone()
                .unwrap_or_else(|| path.display().to_string());
            return Some((label, path.clone()));
        }
        context
            .selected_product
            .as_deref()
            .or(self.collections.default_product())
            .map(|product| (product.to_string(), self.collections.collection_path(product)))
    }
}

#[async_trait]
impl Tool for DocumentRetrieverTool {
    fn name(&self) -> &'static str {
        "document_retriever"
    }

    fn description(&self) -> &'static str {
        "Search the policy documents of a product (wordings, brochures, prospectus). Input: {\"query\": \"<question>\", optional \"k\": 5, optional \"doc_type_filter\": \"policy_wording\"}"
    }

    async fn execute(&self, input: &str, context: &ToolContext) -> Result<String> {
        let input = match parse_input::<RetrieveInput>(input) {
            Ok(input) => input,
            Err(observation) => return Ok(observation),
        };
        let Some(query) = input.query.filter(|query| !query.trim().is_empty()) else {
            return Ok("Error: query parameter is required".to_string());
        };

        let Some((product, collection)) = self.target(&query, context) else {
            return Ok("Error: No product selected and no default product configured. Please choose a product first.".to_string());
        };
        if !self.store.has_collection(&collection).await {
            warn!(
                event_name = "tool.document_retriever.empty_collection",
                product = %product,
                collection = %collection.display(),
                "document collection is empty or missing"
            );
            return Ok(format!(
                "Error: No documents available for '{product}'. The product database is empty or not initialized. Please run ingestion for this product first."
            ));
        }

        let mut document_query = DocumentQuery::new(query.as_str(), input.k.filter(|k| *k > 0).unwrap_or(self.default_k));
        if let Some(filter) = input.doc_type_filter {
            document_query.doc_types = filter.into_vec();
        }

        let documents = self
            .store
            .query(&collection, &document_query)
            .await
            .with_context(|| format!("document search failed for product `{product}`"))?;
        info!(
            event_name = "tool.document_retriever.searched",
            product = %product,
            k = document_query.k,
            hits = documents.len(),
            "document search finished"
        );

        let Some(top) = documents.first() else {
            return Ok("No relevant documents found for the query".to_string());
        };
        Ok(format!(
            "Retrieved {} relevant documents. Top result: {}... (Source: {})",
            documents.len(),
            truncate_chars(&top.content, PREVIEW_CHARS),
            top.source()
        ))
    }
}
