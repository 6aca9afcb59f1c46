use crate::batch::Batch;
use crate::error::CompensationError;
use crate::record::{Backup, Mutation, MutationRecord};
use crate::refresh::RefreshCoordinator;
use crate::store::{StoreClient, StoreError};
use std::collections::BTreeSet;
use tracing::*;

/// Undo every processed record, last applied first.
///
/// A failure on one record is logged and collected, and the walk carries on
/// with the next one. Refreshes follow the same kind-boundary rule as
/// commit and never stop the walk either.
pub(super) fn compensate_batch<S: StoreClient + ?Sized>(
    store: &S,
    batch: &Batch,
) -> Vec<CompensationError> {
    let mut failures = Vec::new();
    let mut deleted_indices = BTreeSet::new();
    let mut refresh = RefreshCoordinator::new();

    for (position, record) in batch.iter().enumerate().rev() {
        if !record.processed() {
            continue;
        }
        if let Some(indices) = refresh.before_apply(record.kind()) {
            try_refresh(store, &indices);
        }

        let mut undo = Undo {
            store,
            position,
            record,
            failures: &mut failures,
        };
        if undo.run() {
            deleted_indices.insert(record.index().to_string());
            refresh.forget(record.index());
        } else if !deleted_indices.contains(record.index()) {
            refresh.touch(record.index());
        }
    }

    let indices: Vec<String> = refresh
        .drain()
        .into_iter()
        .filter(|i| !deleted_indices.contains(i))
        .collect();
    if !indices.is_empty() {
        try_refresh(store, &indices);
    }
    failures
}

fn try_refresh<S: StoreClient + ?Sized>(store: &S, indices: &[String]) {
    if let Err(e) = store.refresh(indices) {
        warn!(?indices, ?e, "refresh during compensation failed");
    }
}

/// Compensation of a single record
struct Undo<'a, S: ?Sized> {
    store: &'a S,
    position: usize,
    record: &'a MutationRecord,
    failures: &'a mut Vec<CompensationError>,
}

impl<'a, S: StoreClient + ?Sized> Undo<'a, S> {
    /// Returns whether the record's index was deleted
    fn run(&mut self) -> bool {
        let record = self.record;
        let index = record.index();
        let doc_type = record.doc_type();

        match (record.mutation(), record.backup()) {
            (Mutation::Add { id, .. }, _) => {
                match self.store.delete(index, doc_type, id) {
                    Ok(()) => (),
                    Err(e) if e.is_not_found() => {
                        debug!(index, %id, "added document is already gone")
                    }
                    Err(e) => self.fail(Some(id), e),
                }
                if record.index_was_created() {
                    match self.store.delete_index(index) {
                        Ok(()) => {
                            info!(index, "deleted index created by this transaction");
                            return true;
                        }
                        Err(e) => self.fail(None, e),
                    }
                }
            }
            (Mutation::Remove { id }, Some(Backup::Document(body))) => {
                if let Err(e) = self.store.create(index, doc_type, id, body) {
                    self.fail(Some(id), e);
                }
            }
            (Mutation::Update { id, .. }, Some(Backup::Document(body))) => {
                if let Err(e) = self.store.index(index, doc_type, id, body) {
                    self.fail(Some(id), e);
                }
            }
            (Mutation::UpdateByQuery { .. }, Some(Backup::Hits(hits))) => {
                for hit in hits {
                    let restored = match self.store.exists(index, doc_type, &hit.id) {
                        Ok(true) => self.store.index(index, doc_type, &hit.id, &hit.source),
                        Ok(false) => {
                            debug!(index, id = %hit.id, "updated document is gone, not restoring");
                            Ok(())
                        }
                        Err(e) => Err(e),
                    };
                    if let Err(e) = restored {
                        self.fail(Some(&hit.id), e);
                    }
                }
            }
            (Mutation::DeleteByQuery { .. }, Some(Backup::Hits(hits))) => {
                for hit in hits {
                    if let Err(e) = self.store.create(index, doc_type, &hit.id, &hit.source) {
                        self.fail(Some(&hit.id), e);
                    }
                }
            }
            (mutation, backup) => {
                error!(
                    position = self.position,
                    kind = %mutation.kind(),
                    ?backup,
                    "processed record has no usable backup, skipping"
                );
            }
        }
        false
    }

    fn fail(&mut self, id: Option<&str>, source: StoreError) {
        let failure = CompensationError {
            position: self.position,
            kind: self.record.kind(),
            index: self.record.index().to_string(),
            id: id.map(String::from),
            source,
        };
        error!(%failure, "compensation failed");
        self.failures.push(failure);
    }
}
