use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Kind of reference material
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// Retrieved document excerpt
    #[default]
    Document,
    /// A past proposal used as precedent
    Case,
}

/// A reference snippet supplied by the retrieval collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(default, rename = "type")]
    pub kind: ReferenceKind,
    pub content: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Reference {
    pub fn document(content: impl Into<String>, source: impl Into<String>) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("source".to_string(), source.into());
        Self {
            kind: ReferenceKind::Document,
            content: content.into(),
            metadata,
        }
    }

    pub fn case(content: impl Into<String>) -> Self {
        Self {
            kind: ReferenceKind::Case,
            content: content.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").map(String::as_str)
    }
}

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Failed to read reference file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse reference file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Retrieval backend error: {0}")]
    Backend(String),
}

/// Supplies reference snippets for a query
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Reference>, RetrievalError>;
}

/// Retriever over a fixed, in-memory set of references.
///
/// Ranking is plain term overlap with the query; ties keep file order.
pub struct StaticRetriever {
    references: Vec<Reference>,
}

impl StaticRetriever {
    pub fn new(references: Vec<Reference>) -> Self {
        Self { references }
    }

    /// Load a JSON array of references
    pub fn from_file(path: &Path) -> Result<Self, RetrievalError> {
        let content = std::fs::read_to_string(path)?;
        let references: Vec<Reference> = serde_json::from_str(&content)?;
        debug!(path = %path.display(), count = references.len(), "Loaded references");
        Ok(Self::new(references))
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Reference>, RetrievalError> {
        let query_terms = terms(query);

        let mut scored: Vec<(usize, usize)> = self
            .references
            .iter()
            .enumerate()
            .map(|(idx, r)| (idx, terms(&r.content).intersection(&query_terms).count()))
            .collect();

        // Stable sort keeps file order among equal scores
        scored.sort_by(|a, b| b.1.cmp(&a.1));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(idx, _)| self.references[idx].clone())
            .collect())
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(str::to_lowercase)
        .collect()
}
