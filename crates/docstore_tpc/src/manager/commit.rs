use crate::batch::Batch;
use crate::config::ResourceManagerConfig;
use crate::error::{NotFound, TpcError, TpcResult};
use crate::record::{Backup, Mutation, MutationKind, MutationRecord};
use crate::refresh::RefreshCoordinator;
use crate::store::{Document, StoreClient, StoreError};
use tracing::*;

/// Apply every record in staging order.
///
/// Stops at the first failure. Records applied before it stay processed so
/// `tpc_abort` can undo them.
pub(super) fn apply_batch<S: StoreClient + ?Sized>(
    store: &S,
    batch: &mut Batch,
    config: &ResourceManagerConfig,
) -> TpcResult<()> {
    let mut refresh = RefreshCoordinator::new();
    for (position, record) in batch.iter_mut().enumerate() {
        if let Some(indices) = refresh.before_apply(record.kind()) {
            debug!(?indices, "refreshing at kind boundary");
            store.refresh(&indices)?;
        }
        apply(store, record, config)?;
        record.mark_processed();
        refresh.touch(record.index());
        debug!(
            position,
            kind = %record.kind(),
            index = record.index(),
            id = ?record.id(),
            "applied"
        );
    }
    Ok(())
}

fn apply<S: StoreClient + ?Sized>(
    store: &S,
    record: &mut MutationRecord,
    config: &ResourceManagerConfig,
) -> TpcResult<()> {
    let index = record.index().to_string();
    let doc_type = record.doc_type().to_string();

    if let Mutation::Update { id, .. } = record.mutation() {
        if !store.exists(&index, &doc_type, id)? {
            debug!(%index, %id, "update target is absent, applying it as an add");
            record.demote_to_add();
        }
    }

    match record.mutation().clone() {
        Mutation::Add { id, source } => {
            let created = ensure_index(store, &index, config)?;
            record.set_index_was_created(created);
            if let Err(e) = store.create(&index, &doc_type, &id, &source) {
                // The record stays unprocessed, so tpc_abort won't see this index
                if created {
                    match store.delete_index(&index) {
                        Ok(()) => {
                            record.set_index_was_created(false);
                            debug!(%index, "dropped the index created for a failed add");
                        }
                        Err(drop_error) => error!(
                            %index,
                            ?drop_error,
                            "unable to drop the index created for a failed add"
                        ),
                    }
                }
                return Err(e.into());
            }
        }
        Mutation::Remove { id } => {
            if !store.exists(&index, &doc_type, &id)? {
                return Err(NotFound::Document {
                    index,
                    doc_type,
                    id,
                }
                .into());
            }
            let backup = read_backup(store, &index, &doc_type, &id)?;
            record.set_backup(Backup::Document(backup));
            store.delete(&index, &doc_type, &id)?;
        }
        Mutation::Update { id, source } => {
            let backup = read_backup(store, &index, &doc_type, &id)?;
            record.set_backup(Backup::Document(backup));
            store.update(&index, &doc_type, &id, &source)?;
        }
        Mutation::UpdateByQuery { query, script } => {
            let hits = store.search(&index, &doc_type, &query)?;
            debug!(%index, matched = hits.len(), "captured update-by-query backup");
            record.set_backup(Backup::Hits(hits));
            store.update_by_query(&index, &doc_type, &query, &script)?;
        }
        Mutation::DeleteByQuery { query } => {
            let hits = store.search(&index, &doc_type, &query)?;
            debug!(%index, matched = hits.len(), "captured delete-by-query backup");
            record.set_backup(Backup::Hits(hits));
            store.delete_by_query(&index, &doc_type, &query)?;
        }
    }
    Ok(())
}

/// Create the target index of an Add if it's missing and we're allowed to.
/// Returns whether it was created.
fn ensure_index<S: StoreClient + ?Sized>(
    store: &S,
    index: &str,
    config: &ResourceManagerConfig,
) -> TpcResult<bool> {
    if !config.auto_create_index || store.index_exists(index)? {
        return Ok(false);
    }
    store.create_index(index)?;
    info!(index, "created missing index");
    Ok(true)
}

/// Read the current body of a document known to exist
fn read_backup<S: StoreClient + ?Sized>(
    store: &S,
    index: &str,
    doc_type: &str,
    id: &str,
) -> TpcResult<Document> {
    store
        .get_source(index, doc_type, id)
        .map_err(|e| match e {
            StoreError::NotFound(reason) => TpcError::Consistency {
                index: index.to_string(),
                doc_type: doc_type.to_string(),
                id: id.to_string(),
                reason,
            },
            e => e.into(),
        })
}

/// Check that every applied Add and Update is actually there.
/// Returns false on the first missing document or store failure.
pub(super) fn verify_batch<S: StoreClient + ?Sized>(store: &S, batch: &Batch) -> bool {
    batch
        .iter()
        .filter(|r| r.processed())
        .filter(|r| matches!(r.kind(), MutationKind::Add | MutationKind::Update))
        .all(|record| {
            let id = record.id().unwrap_or_default();
            match store.exists(record.index(), record.doc_type(), id) {
                Ok(true) => true,
                Ok(false) => {
                    warn!(index = record.index(), id, "applied document is missing");
                    false
                }
                Err(e) => {
                    warn!(index = record.index(), id, ?e, "unable to verify applied document");
                    false
                }
            }
        })
}
