//! The uncommitted side-buffer and savepoints over it.

use crate::sort_key::SortKey;
use crate::store::{merge_document, Document};
use std::collections::BTreeMap;

/// A staged change to a single document, as seen before commit
#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    /// The document will hold this whole body
    Put(Document),
    /// This partial body will be merged into whatever the store holds
    Patch(Document),
    /// The document will be gone
    Delete,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct DocKey {
    index: String,
    doc_type: String,
    id: String,
}

impl DocKey {
    fn new(index: &str, doc_type: &str, id: &str) -> Self {
        Self {
            index: index.to_string(),
            doc_type: doc_type.to_string(),
            id: id.to_string(),
        }
    }
}

/// The "scratch" is an in-memory overlay of the single-document operations
/// staged in the current transaction, so staging calls can see their own
/// earlier writes before anything reaches the store.
///
/// By-query operations are not reflected here.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Scratch {
    ops: BTreeMap<DocKey, Op>,
}

impl Scratch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, index: &str, doc_type: &str, id: &str, body: Document) {
        self.ops.insert(DocKey::new(index, doc_type, id), Op::Put(body));
    }

    pub fn patch(&mut self, index: &str, doc_type: &str, id: &str, partial: Document) {
        let key = DocKey::new(index, doc_type, id);
        let op = match self.ops.remove(&key) {
            Some(Op::Put(mut body)) => {
                merge_document(&mut body, &partial);
                Op::Put(body)
            }
            Some(Op::Patch(mut body)) => {
                merge_document(&mut body, &partial);
                Op::Patch(body)
            }
            // Updating a document that will be gone recreates it
            Some(Op::Delete) => Op::Put(partial),
            None => Op::Patch(partial),
        };
        self.ops.insert(key, op);
    }

    pub fn delete(&mut self, index: &str, doc_type: &str, id: &str) {
        self.ops.insert(DocKey::new(index, doc_type, id), Op::Delete);
    }

    pub fn get(&self, index: &str, doc_type: &str, id: &str) -> Option<&Op> {
        self.ops.get(&DocKey::new(index, doc_type, id))
    }

    /// Whether the document exists once the staged ops are applied, or
    /// `None` if the scratch alone can't tell and the store must be asked.
    pub fn contains(&self, index: &str, doc_type: &str, id: &str) -> Option<bool> {
        match self.get(index, doc_type, id)? {
            Op::Put(_) => Some(true),
            Op::Delete => Some(false),
            Op::Patch(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }
}

/// A checkpoint of the staged, not yet committed state of one participant.
///
/// Only valid for the participant and transaction it was taken in.
#[derive(Clone, Debug, PartialEq)]
pub struct Savepoint {
    owner: SortKey,
    generation: u64,
    watermark: usize,
    scratch: Scratch,
}

impl Savepoint {
    pub(crate) fn new(owner: SortKey, generation: u64, watermark: usize, scratch: Scratch) -> Self {
        Self {
            owner,
            generation,
            watermark,
            scratch,
        }
    }

    /// The participant this savepoint belongs to
    pub fn owner(&self) -> &SortKey {
        &self.owner
    }

    pub(crate) fn is_for(&self, owner: &SortKey, generation: u64) -> bool {
        &self.owner == owner && self.generation == generation
    }

    /// Number of batch records staged when the savepoint was taken
    pub fn watermark(&self) -> usize {
        self.watermark
    }

    pub(crate) fn into_scratch(self) -> Scratch {
        self.scratch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn patches_fold_into_puts() {
        let mut scratch = Scratch::new();
        scratch.put("i", "doc", "1", json!({"a": 1}));
        scratch.patch("i", "doc", "1", json!({"b": 2}));
        assert_eq!(
            scratch.get("i", "doc", "1"),
            Some(&Op::Put(json!({"a": 1, "b": 2})))
        );
        assert_eq!(scratch.contains("i", "doc", "1"), Some(true));
    }

    #[test]
    fn patch_alone_defers_to_the_store() {
        let mut scratch = Scratch::new();
        scratch.patch("i", "doc", "1", json!({"a": 1}));
        scratch.patch("i", "doc", "1", json!({"b": 2}));
        assert_eq!(
            scratch.get("i", "doc", "1"),
            Some(&Op::Patch(json!({"a": 1, "b": 2})))
        );
        assert_eq!(scratch.contains("i", "doc", "1"), None);
        assert_eq!(scratch.contains("i", "doc", "2"), None);
    }

    #[test]
    fn delete_then_patch_recreates() {
        let mut scratch = Scratch::new();
        scratch.delete("i", "doc", "1");
        assert_eq!(scratch.contains("i", "doc", "1"), Some(false));
        scratch.patch("i", "doc", "1", json!({"a": 1}));
        assert_eq!(scratch.get("i", "doc", "1"), Some(&Op::Put(json!({"a": 1}))));
    }

    #[test]
    fn keys_include_type_and_index() {
        let mut scratch = Scratch::new();
        scratch.put("i", "doc", "1", json!({}));
        assert_eq!(scratch.contains("j", "doc", "1"), None);
        assert_eq!(scratch.contains("i", "other", "1"), None);
        assert_eq!(scratch.len(), 1);
    }

    #[test]
    fn savepoint_is_tied_to_owner_and_generation() {
        let owner = SortKey::from_parts("docstore", "a");
        let savepoint = Savepoint::new(owner.clone(), 3, 2, Scratch::new());
        assert!(savepoint.is_for(&owner, 3));
        assert!(!savepoint.is_for(&owner, 4));
        assert!(!savepoint.is_for(&SortKey::from_parts("docstore", "b"), 3));
        assert_eq!(savepoint.watermark(), 2);
    }
}
