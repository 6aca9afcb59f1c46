//! Utilities for testing code that talks to a [StoreClient].

use crate::store::{merge_document, Document, Hit, Query, Script, StoreClient, StoreError, StoreResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// The [StoreClient] calls failures can be injected into
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreOp {
    Exists,
    GetSource,
    Create,
    Index,
    Update,
    Delete,
    Search,
    UpdateByQuery,
    DeleteByQuery,
    IndexExists,
    CreateIndex,
    DeleteIndex,
    Refresh,
}

#[derive(Clone, Debug)]
struct Failure {
    op: StoreOp,
    id: Option<String>,
    error: StoreError,
}

/// Documents of one index, keyed by type then id
type Documents = BTreeMap<(String, String), Document>;

#[derive(Debug, Default)]
struct Inner {
    indices: BTreeMap<String, Documents>,
    refreshes: Vec<Vec<String>>,
    failures: Vec<Failure>,
}

/// An in-memory document store.
///
/// Writes are visible immediately; [StoreClient::refresh] calls are only
/// recorded. Queries understand `match_all`, `term` on a top-level field
/// and `ids`. Scripts merge their `params` object into each matched
/// document.
#[derive(Debug, Default)]
pub struct MemoryStore(Mutex<Inner>);

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an empty index
    pub fn with_index(self, index: &str) -> Self {
        self.0.lock().indices.entry(index.to_string()).or_default();
        self
    }

    /// Seed a document, creating its index if needed
    pub fn with_document(self, index: &str, doc_type: &str, id: &str, body: Document) -> Self {
        self.0
            .lock()
            .indices
            .entry(index.to_string())
            .or_default()
            .insert((doc_type.to_string(), id.to_string()), body);
        self
    }

    pub fn document(&self, index: &str, doc_type: &str, id: &str) -> Option<Document> {
        self.0
            .lock()
            .indices
            .get(index)?
            .get(&(doc_type.to_string(), id.to_string()))
            .cloned()
    }

    pub fn has_index(&self, index: &str) -> bool {
        self.0.lock().indices.contains_key(index)
    }

    /// Every index and document, for comparing whole-store states
    pub fn snapshot(&self) -> BTreeMap<String, Documents> {
        self.0.lock().indices.clone()
    }

    /// The indices passed to every successful refresh call, in call order
    pub fn refreshes(&self) -> Vec<Vec<String>> {
        self.0.lock().refreshes.clone()
    }

    pub fn refresh_count(&self) -> usize {
        self.0.lock().refreshes.len()
    }

    /// Make every `op` call fail with `error` until cleared
    pub fn fail(&self, op: StoreOp, error: StoreError) {
        self.0.lock().failures.push(Failure {
            op,
            id: None,
            error,
        });
    }

    /// Make `op` calls concerning document `id` fail with `error` until
    /// cleared
    pub fn fail_for(&self, op: StoreOp, id: &str, error: StoreError) {
        self.0.lock().failures.push(Failure {
            op,
            id: Some(id.to_string()),
            error,
        });
    }

    pub fn clear_failures(&self) {
        self.0.lock().failures.clear();
    }
}

impl Inner {
    fn check(&self, op: StoreOp, id: Option<&str>) -> StoreResult<()> {
        let failure = self
            .failures
            .iter()
            .find(|f| f.op == op && (f.id.is_none() || f.id.as_deref() == id));
        match failure {
            Some(f) => Err(f.error.clone()),
            None => Ok(()),
        }
    }

    fn index(&self, index: &str) -> StoreResult<&Documents> {
        self.indices
            .get(index)
            .ok_or_else(|| StoreError::NotFound(format!("index {}", index)))
    }

    fn index_mut(&mut self, index: &str) -> StoreResult<&mut Documents> {
        self.indices
            .get_mut(index)
            .ok_or_else(|| StoreError::NotFound(format!("index {}", index)))
    }

    fn search(&self, index: &str, doc_type: &str, query: &Query) -> StoreResult<Vec<Hit>> {
        let docs = self.index(index)?;
        let mut hits = Vec::new();
        for ((t, id), source) in docs {
            if t == doc_type && matches_query(query, id, source)? {
                hits.push(Hit::new(id.clone(), source.clone()));
            }
        }
        Ok(hits)
    }
}

fn not_found(index: &str, doc_type: &str, id: &str) -> StoreError {
    StoreError::NotFound(format!("{}/{}/{}", index, doc_type, id))
}

fn matches_query(query: &Query, id: &str, source: &Document) -> StoreResult<bool> {
    if query.get("match_all").is_some() {
        return Ok(true);
    }
    if let Some(term) = query.get("term").and_then(|t| t.as_object()) {
        return Ok(term
            .iter()
            .all(|(field, value)| source.get(field) == Some(value)));
    }
    if let Some(values) = query
        .get("ids")
        .and_then(|ids| ids.get("values"))
        .and_then(|v| v.as_array())
    {
        return Ok(values.iter().any(|v| v.as_str() == Some(id)));
    }
    Err(StoreError::Rejected(format!("unsupported query {}", query)))
}

impl StoreClient for MemoryStore {
    fn exists(&self, index: &str, doc_type: &str, id: &str) -> StoreResult<bool> {
        let inner = self.0.lock();
        inner.check(StoreOp::Exists, Some(id))?;
        Ok(inner
            .indices
            .get(index)
            .map(|docs| docs.contains_key(&(doc_type.to_string(), id.to_string())))
            .unwrap_or(false))
    }

    fn get_source(&self, index: &str, doc_type: &str, id: &str) -> StoreResult<Document> {
        let inner = self.0.lock();
        inner.check(StoreOp::GetSource, Some(id))?;
        inner
            .index(index)?
            .get(&(doc_type.to_string(), id.to_string()))
            .cloned()
            .ok_or_else(|| not_found(index, doc_type, id))
    }

    fn create(&self, index: &str, doc_type: &str, id: &str, body: &Document) -> StoreResult<()> {
        let mut inner = self.0.lock();
        inner.check(StoreOp::Create, Some(id))?;
        let docs = inner.indices.entry(index.to_string()).or_default();
        let key = (doc_type.to_string(), id.to_string());
        if docs.contains_key(&key) {
            return Err(StoreError::Conflict {
                index: index.to_string(),
                id: id.to_string(),
            });
        }
        docs.insert(key, body.clone());
        Ok(())
    }

    fn index(&self, index: &str, doc_type: &str, id: &str, body: &Document) -> StoreResult<()> {
        let mut inner = self.0.lock();
        inner.check(StoreOp::Index, Some(id))?;
        inner
            .indices
            .entry(index.to_string())
            .or_default()
            .insert((doc_type.to_string(), id.to_string()), body.clone());
        Ok(())
    }

    fn update(&self, index: &str, doc_type: &str, id: &str, partial: &Document) -> StoreResult<()> {
        let mut inner = self.0.lock();
        inner.check(StoreOp::Update, Some(id))?;
        let doc = inner
            .index_mut(index)?
            .get_mut(&(doc_type.to_string(), id.to_string()))
            .ok_or_else(|| not_found(index, doc_type, id))?;
        merge_document(doc, partial);
        Ok(())
    }

    fn delete(&self, index: &str, doc_type: &str, id: &str) -> StoreResult<()> {
        let mut inner = self.0.lock();
        inner.check(StoreOp::Delete, Some(id))?;
        inner
            .index_mut(index)?
            .remove(&(doc_type.to_string(), id.to_string()))
            .map(|_| ())
            .ok_or_else(|| not_found(index, doc_type, id))
    }

    fn search(&self, index: &str, doc_type: &str, query: &Query) -> StoreResult<Vec<Hit>> {
        let inner = self.0.lock();
        inner.check(StoreOp::Search, None)?;
        inner.search(index, doc_type, query)
    }

    fn update_by_query(
        &self,
        index: &str,
        doc_type: &str,
        query: &Query,
        script: &Script,
    ) -> StoreResult<()> {
        let mut inner = self.0.lock();
        inner.check(StoreOp::UpdateByQuery, None)?;
        let params = script
            .get("params")
            .cloned()
            .ok_or_else(|| StoreError::Rejected(format!("unsupported script {}", script)))?;
        let hits = inner.search(index, doc_type, query)?;
        let docs = inner.index_mut(index)?;
        for hit in hits {
            if let Some(doc) = docs.get_mut(&(doc_type.to_string(), hit.id)) {
                merge_document(doc, &params);
            }
        }
        Ok(())
    }

    fn delete_by_query(&self, index: &str, doc_type: &str, query: &Query) -> StoreResult<()> {
        let mut inner = self.0.lock();
        inner.check(StoreOp::DeleteByQuery, None)?;
        let hits = inner.search(index, doc_type, query)?;
        let docs = inner.index_mut(index)?;
        for hit in hits {
            docs.remove(&(doc_type.to_string(), hit.id));
        }
        Ok(())
    }

    fn index_exists(&self, index: &str) -> StoreResult<bool> {
        let inner = self.0.lock();
        inner.check(StoreOp::IndexExists, None)?;
        Ok(inner.indices.contains_key(index))
    }

    fn create_index(&self, index: &str) -> StoreResult<()> {
        let mut inner = self.0.lock();
        inner.check(StoreOp::CreateIndex, None)?;
        if inner.indices.contains_key(index) {
            return Err(StoreError::Rejected(format!("index {} already exists", index)));
        }
        inner.indices.insert(index.to_string(), Documents::new());
        Ok(())
    }

    fn delete_index(&self, index: &str) -> StoreResult<()> {
        let mut inner = self.0.lock();
        inner.check(StoreOp::DeleteIndex, None)?;
        inner
            .indices
            .remove(index)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("index {}", index)))
    }

    fn refresh(&self, indices: &[String]) -> StoreResult<()> {
        let mut inner = self.0.lock();
        inner.check(StoreOp::Refresh, None)?;
        for index in indices {
            inner.index(index)?;
        }
        inner.refreshes.push(indices.to_vec());
        Ok(())
    }
}
