use crate::record::MutationRecord;
use std::collections::BTreeSet;

/// The ordered records staged during one transaction.
///
/// Iteration order is staging order and is the order records are applied
/// in; compensation walks it backwards. A batch never outlives the
/// transaction it was filled for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    records: Vec<MutationRecord>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: MutationRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MutationRecord> {
        self.records.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, MutationRecord> {
        self.records.iter_mut()
    }

    /// Every distinct index any record targets
    pub fn indices(&self) -> BTreeSet<String> {
        self.records.iter().map(|r| r.index().to_string()).collect()
    }

    pub fn processed_count(&self) -> usize {
        self.records.iter().filter(|r| r.processed()).count()
    }

    /// Drop everything staged after the first `len` records
    pub(crate) fn truncate(&mut self, len: usize) {
        self.records.truncate(len);
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Item, MutationKind};
    use serde_json::json;

    fn record(kind: MutationKind, index: &str, id: &str) -> MutationRecord {
        let item = Item::document(index, "doc", id)
            .with_source(json!({"v": 1}))
            .with_query(json!({"match_all": {}}));
        MutationRecord::from_item(kind, item, None, None).unwrap()
    }

    #[test]
    fn keeps_staging_order() {
        let mut batch = Batch::new();
        batch.push(record(MutationKind::Add, "a", "1"));
        batch.push(record(MutationKind::Remove, "b", "1"));
        batch.push(record(MutationKind::Add, "a", "2"));

        let kinds: Vec<_> = batch.iter().map(|r| r.kind()).collect();
        assert_eq!(
            kinds,
            vec![MutationKind::Add, MutationKind::Remove, MutationKind::Add]
        );
        let reversed: Vec<_> = batch.iter().rev().map(|r| r.id().unwrap()).collect();
        assert_eq!(reversed, vec!["2", "1", "1"]);
    }

    #[test]
    fn distinct_indices() {
        let mut batch = Batch::new();
        batch.push(record(MutationKind::Add, "b", "1"));
        batch.push(record(MutationKind::Add, "a", "1"));
        batch.push(record(MutationKind::DeleteByQuery, "b", "x"));
        assert_eq!(
            batch.indices().into_iter().collect::<Vec<_>>(),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn truncate_and_clear() {
        let mut batch = Batch::new();
        batch.push(record(MutationKind::Add, "a", "1"));
        batch.push(record(MutationKind::Add, "a", "2"));
        batch.iter_mut().next().unwrap().mark_processed();
        assert_eq!(batch.processed_count(), 1);

        batch.truncate(1);
        assert_eq!(batch.len(), 1);
        batch.clear();
        assert!(batch.is_empty());
    }
}
