//! The contract this crate consumes from an existing document-store driver.
//!
//! Every call is blocking and is expected to surface timeouts and transport
//! failures as ordinary [StoreError]s, so the per-record error path of
//! `commit()` triggers on them like on any other failure.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A document body, or a partial body for updates
pub type Document = serde_json::Value;

/// A query in the store's query DSL
pub type Query = serde_json::Value;

/// A bulk-update script in the store's scripting DSL
pub type Script = serde_json::Value;

/// One document returned by a search
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub id: String,
    pub source: Document,
}

impl Hit {
    pub fn new(id: impl Into<String>, source: Document) -> Self {
        Self {
            id: id.into(),
            source,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Document {id} already exists in index {index}")]
    Conflict { index: String, id: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store rejected the request: {0}")]
    Rejected(String),
}

impl StoreError {
    /// The distinguishable "not found" condition of the store contract
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Driver for the backing document store.
///
/// The store only guarantees single-document atomic writes and
/// eventually-visible reads; [StoreClient::refresh] forces visibility.
#[cfg_attr(any(test, feature = "test_utils"), mockall::automock)]
pub trait StoreClient: Send + Sync {
    /// Whether the document exists, without fetching it
    fn exists(&self, index: &str, doc_type: &str, id: &str) -> StoreResult<bool>;

    /// Fetch the document body. Fails with [StoreError::NotFound] if absent.
    fn get_source(&self, index: &str, doc_type: &str, id: &str) -> StoreResult<Document>;

    /// Create a document. Fails with [StoreError::Conflict] if it already exists.
    fn create(&self, index: &str, doc_type: &str, id: &str, body: &Document) -> StoreResult<()>;

    /// Create the document or replace its whole body
    fn index(&self, index: &str, doc_type: &str, id: &str, body: &Document) -> StoreResult<()>;

    /// Merge a partial body into an existing document
    fn update(&self, index: &str, doc_type: &str, id: &str, partial: &Document)
        -> StoreResult<()>;

    fn delete(&self, index: &str, doc_type: &str, id: &str) -> StoreResult<()>;

    fn search(&self, index: &str, doc_type: &str, query: &Query) -> StoreResult<Vec<Hit>>;

    fn update_by_query(
        &self,
        index: &str,
        doc_type: &str,
        query: &Query,
        script: &Script,
    ) -> StoreResult<()>;

    fn delete_by_query(&self, index: &str, doc_type: &str, query: &Query) -> StoreResult<()>;

    fn index_exists(&self, index: &str) -> StoreResult<bool>;

    fn create_index(&self, index: &str) -> StoreResult<()>;

    fn delete_index(&self, index: &str) -> StoreResult<()>;

    /// Make everything written to these indices visible to reads and searches
    fn refresh(&self, indices: &[String]) -> StoreResult<()>;
}

/// Merge a partial body into a document the way a partial update does:
/// objects are merged key by key, recursively, anything else is replaced.
pub fn merge_document(target: &mut Document, partial: &Document) {
    match (target, partial) {
        (Document::Object(target), Document::Object(partial)) => {
            for (key, value) in partial {
                match target.get_mut(key) {
                    Some(existing) => merge_document(existing, value),
                    None => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, partial) => *target = partial.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn merge_is_recursive_for_objects() {
        let mut doc = json!({"a": 1, "nested": {"x": 1, "y": 2}, "list": [1, 2]});
        merge_document(&mut doc, &json!({"b": 2, "nested": {"y": 3}, "list": [3]}));
        assert_eq!(
            doc,
            json!({"a": 1, "b": 2, "nested": {"x": 1, "y": 3}, "list": [3]})
        );
    }

    #[test]
    fn not_found_is_distinguishable() {
        assert!(StoreError::NotFound("i/doc/1".into()).is_not_found());
        assert!(!StoreError::Unavailable("down".into()).is_not_found());
    }
}
