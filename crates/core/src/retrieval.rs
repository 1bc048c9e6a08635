//! Read-side port for the product document collections.
//!
//! Collections live under a root directory, one sub-directory per product.
//! The vector store itself is external; [`InMemoryDocumentStore`] ranks by
//! term overlap and is what the CLI and tests run against.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const CHUNKS_FILE: &str = "chunks.json";
pub const DOC_TYPE_KEY: &str = "doc_type";
pub const SOURCE_KEY: &str = "source";

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("could not read collection data `{path}`: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("could not parse collection data `{path}`: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("collection `{0}` does not exist")]
    CollectionNotFound(PathBuf),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentQuery {
    pub text: String,
    pub k: usize,
    #[serde(default)]
    pub doc_types: Vec<String>,
    #[serde(default)]
    pub exclude_doc_types: Vec<String>,
}

impl DocumentQuery {
    pub fn new(text: impl Into<String>, k: usize) -> Self {
        Self { text: text.into(), k, doc_types: Vec::new(), exclude_doc_types: Vec::new() }
    }

    fn admits(&self, metadata: &BTreeMap<String, String>) -> bool {
        let doc_type = metadata.get(DOC_TYPE_KEY).map(String::as_str);
        if !self.doc_types.is_empty()
            && !doc_type.is_some_and(|value| self.doc_types.iter().any(|wanted| wanted == value))
        {
            return false;
        }
        !doc_type.is_some_and(|value| self.exclude_doc_types.iter().any(|excluded| excluded == value))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub content: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub content: String,
    pub metadata: BTreeMap<String, String>,
    pub distance: f32,
}

impl RetrievedDocument {
    pub fn source(&self) -> &str {
        self.metadata.get(SOURCE_KEY).map(String::as_str).unwrap_or("Unknown")
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn query(
        &self,
        collection: &Path,
        query: &DocumentQuery,
    ) -> Result<Vec<RetrievedDocument>, RetrievalError>;

    /// True when the collection exists and holds at least one document.
    async fn has_collection(&self, collection: &Path) -> bool;
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryDocumentStore {
    collections: HashMap<PathBuf, Vec<StoredDocument>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, collection: impl Into<PathBuf>, documents: Vec<StoredDocument>) {
        self.collections.entry(collection.into()).or_default().extend(documents);
    }

    /// Loads `<root>/<product>/chunks.json` for every product directory.
    /// Directories without a chunks file are left out.
    pub fn load_from_root(root: &Path) -> Result<Self, RetrievalError> {
        let mut store = Self::new();
        let catalog = CollectionCatalog::new(root, None);
        for product in catalog.product_names() {
            let collection = catalog.collection_path(&product);
            let chunks = collection.join(CHUNKS_FILE);
            if !chunks.exists() {
                debug!(
                    event_name = "retrieval.collection.no_chunks",
                    product = %product,
                    "collection has no chunks file"
                );
                continue;
            }
            let raw = fs::read_to_string(&chunks)
                .map_err(|source| RetrievalError::Io { path: chunks.clone(), source })?;
            let documents: Vec<StoredDocument> = serde_json::from_str(&raw)
                .map_err(|source| RetrievalError::Parse { path: chunks.clone(), source })?;
            info!(
                event_name = "retrieval.collection.loaded",
                product = %product,
                documents = documents.len(),
                "loaded document collection"
            );
            store.insert(collection, documents);
        }
        Ok(store)
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn query(
        &self,
        collection: &Path,
        query: &DocumentQuery,
    ) -> Result<Vec<RetrievedDocument>, RetrievalError> {
        let documents = self
            .collections
            .get(collection)
            .ok_or_else(|| RetrievalError::CollectionNotFound(collection.to_path_buf()))?;

        let terms = tokenize(&query.text);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut ranked: Vec<RetrievedDocument> = documents
            .iter()
            .filter(|document| query.admits(&document.metadata))
            .filter_map(|document| {
                let words = tokenize(&document.content);
                let overlap = terms.iter().filter(|term| words.contains(*term)).count();
                if overlap == 0 {
                    return None;
                }
                Some(RetrievedDocument {
                    content: document.content.clone(),
                    metadata: document.metadata.clone(),
                    distance: 1.0 - overlap as f32 / terms.len() as f32,
                })
            })
            .collect();
        ranked.sort_by(|left, right| left.distance.total_cmp(&right.distance));
        ranked.truncate(query.k);

        debug!(
            event_name = "retrieval.query.completed",
            collection = %collection.display(),
            hits = ranked.len(),
            "document query completed"
        );
        Ok(ranked)
    }

    async fn has_collection(&self, collection: &Path) -> bool {
        self.collections.get(collection).is_some_and(|documents| !documents.is_empty())
    }
}

/// Product collections under one root directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectionCatalog {
    root: PathBuf,
    default_product: Option<String>,
}

impl CollectionCatalog {
    pub fn new(root: impl Into<PathBuf>, default_product: Option<String>) -> Self {
        Self { root: root.into(), default_product }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn default_product(&self) -> Option<&str> {
        self.default_product.as_deref()
    }

    /// Sub-directory names of the root, sorted. A missing root has no products.
    pub fn product_names(&self) -> Vec<String> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(error) => {
                warn!(
                    event_name = "retrieval.catalog.unreadable",
                    root = %self.root.display(),
                    error = %error,
                    "collections root is not readable"
                );
                return Vec::new();
            }
        };

        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().map(|kind| kind.is_dir()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .collect();
        names.sort();
        names
    }

    pub fn collection_path(&self, product: &str) -> PathBuf {
        self.root.join(product)
    }
}

/// Finds the first product whose name appears in `query` as a whole word,
/// ignoring case.
pub fn detect_product<S: AsRef<str>>(query: &str, products: &[S]) -> Option<String> {
    products.iter().map(|product| product.as_ref()).find_map(|product| {
        let pattern = format!(r"(?i)\b{}\b", regex::escape(product));
        match Regex::new(&pattern) {
            Ok(regex) if regex.is_match(query) => {
                info!(event_name = "retrieval.product.detected", product, "detected product in query");
                Some(product.to_string())
            }
            _ => None,
        }
    })
}

fn tokenize(text: &str) -> BTreeSet<String> {
    static WORD: OnceLock<Regex> = OnceLock::new();
    let word = WORD.get_or_init(|| Regex::new(r"[[:alnum:]]+").expect("valid regex"));
    word.find_iter(&text.to_lowercase()).map(|found| found.as_str().to_string()).collect()
}
