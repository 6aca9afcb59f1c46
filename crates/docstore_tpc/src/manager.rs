//! The resource manager: stages document mutations during a transaction and
//! takes part in two-phase commit on behalf of the document store.

use crate::batch::Batch;
use crate::config::ResourceManagerConfig;
use crate::coordinator::TransactionHandle;
use crate::error::{CompensationError, TpcError, TpcResult};
use crate::participant::{Participant, Vote};
use crate::record::{Item, Mutation, MutationKind, MutationRecord};
use crate::scratch::{Savepoint, Scratch};
use crate::sort_key::SortKey;
use crate::store::StoreClient;
use std::sync::Arc;
use tracing::*;

mod commit;
mod compensate;


/// Where a [ResourceManager] is in the lifetime of one transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq, derive_more::Display)]
pub enum TxnState {
    /// Not part of any transaction
    Idle,
    /// Joined, accepting mutations
    Staging,
    /// Applying the batch to the store
    Committing,
    /// Every record was applied
    Committed,
    /// Applying the batch failed part way
    Failed,
    /// Committed and voted to keep the changes
    VotedYes,
    /// Voted to drop the changes, waiting for `tpc_abort`
    VotedNo,
}

impl TxnState {
    fn is_staging(&self) -> bool {
        matches!(self, TxnState::Idle | TxnState::Staging)
    }
}

/// Lets a document store take part in a coordinated transaction.
///
/// Mutations are only staged while the transaction runs. `commit` applies
/// them in staging order, capturing what each one overwrites; if another
/// participant then votes no, `tpc_abort` undoes them in reverse order.
pub struct ResourceManager<S: StoreClient> {
    store: Arc<S>,
    transaction: Arc<dyn TransactionHandle>,
    config: ResourceManagerConfig,
    sort_key: SortKey,
    batch: Batch,
    scratch: Scratch,
    state: TxnState,
    /// Bumped whenever a transaction ends, invalidating its savepoints
    generation: u64,
    compensation_failures: Vec<CompensationError>,
}

impl<S: StoreClient> std::fmt::Debug for ResourceManager<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceManager")
            .field("sort_key", &self.sort_key)
            .field("state", &self.state)
            .field("batch", &self.batch.len())
            .field("generation", &self.generation)
            .finish()
    }
}

impl<S: StoreClient> ResourceManager<S> {
    pub fn new(
        store: Arc<S>,
        transaction: Arc<dyn TransactionHandle>,
        config: ResourceManagerConfig,
    ) -> Self {
        let sort_key = SortKey::generate(&config.role);
        Self {
            store,
            transaction,
            config,
            sort_key,
            batch: Batch::new(),
            scratch: Scratch::new(),
            state: TxnState::Idle,
            generation: 0,
            compensation_failures: Vec::new(),
        }
    }

    /// Stage the creation of a document
    pub fn add(&mut self, item: Item) -> TpcResult<()> {
        self.stage(MutationKind::Add, item, false)
    }

    /// Stage the deletion of a document. With `check_existence`, nothing is
    /// staged if the document doesn't exist.
    pub fn remove(&mut self, item: Item, check_existence: bool) -> TpcResult<()> {
        self.stage(MutationKind::Remove, item, check_existence)
    }

    /// Stage a partial update of a document. Without `check_existence`, an
    /// absent document is created at commit instead.
    pub fn update(&mut self, item: Item, check_existence: bool) -> TpcResult<()> {
        self.stage(MutationKind::Update, item, check_existence)
    }

    pub fn update_by_query(&mut self, item: Item) -> TpcResult<()> {
        self.stage(MutationKind::UpdateByQuery, item, false)
    }

    pub fn delete_by_query(&mut self, item: Item) -> TpcResult<()> {
        self.stage(MutationKind::DeleteByQuery, item, false)
    }

    pub fn state(&self) -> TxnState {
        self.state
    }

    pub fn batch(&self) -> &Batch {
        &self.batch
    }

    pub fn scratch(&self) -> &Scratch {
        &self.scratch
    }

    pub fn config(&self) -> &ResourceManagerConfig {
        &self.config
    }

    /// Records that could not be undone by the last `tpc_abort`. Kept until
    /// the next transaction starts.
    pub fn compensation_failures(&self) -> &[CompensationError] {
        &self.compensation_failures
    }

    fn stage(&mut self, kind: MutationKind, item: Item, check_existence: bool) -> TpcResult<()> {
        if !self.state.is_staging() {
            return Err(TpcError::Protocol {
                op: "stage a mutation",
                state: self.state,
            });
        }

        let record = MutationRecord::from_item(
            kind,
            item,
            self.config.usable_default_index(),
            self.config.single_mapping_type.as_deref(),
        )?;

        if check_existence && !self.target_exists(&record)? {
            debug!(
                %kind,
                index = record.index(),
                id = ?record.id(),
                "target does not exist, nothing staged"
            );
            return Ok(());
        }

        if self.state == TxnState::Idle {
            self.join()?;
        }

        match record.mutation() {
            Mutation::Add { id, source } => {
                self.scratch
                    .put(record.index(), record.doc_type(), id, source.clone())
            }
            Mutation::Remove { id } => self.scratch.delete(record.index(), record.doc_type(), id),
            Mutation::Update { id, source } => {
                self.scratch
                    .patch(record.index(), record.doc_type(), id, source.clone())
            }
            Mutation::UpdateByQuery { .. } | Mutation::DeleteByQuery { .. } => (),
        }

        debug!(
            key = %self.sort_key,
            %kind,
            index = record.index(),
            id = ?record.id(),
            "staged"
        );
        self.batch.push(record);
        Ok(())
    }

    /// Whether the target of a single-document record exists, seen through
    /// what is already staged
    fn target_exists(&self, record: &MutationRecord) -> TpcResult<bool> {
        let id = match record.id() {
            Some(id) => id,
            None => return Ok(true),
        };
        match self.scratch.contains(record.index(), record.doc_type(), id) {
            Some(exists) => Ok(exists),
            None => Ok(self.store.exists(record.index(), record.doc_type(), id)?),
        }
    }

    fn join(&mut self) -> TpcResult<()> {
        self.transaction.join(&self.sort_key)?;
        self.compensation_failures.clear();
        self.state = TxnState::Staging;
        info!(key = %self.sort_key, generation = self.generation, "joined transaction");
        Ok(())
    }

    /// Forget the transaction. The manager is ready for the next one.
    fn reset(&mut self) {
        self.batch.clear();
        self.scratch.clear();
        self.state = TxnState::Idle;
        self.generation += 1;
    }
}

impl<S: StoreClient> Participant for ResourceManager<S> {
    #[instrument(skip(self), fields(key = %self.sort_key))]
    fn abort(&mut self) -> TpcResult<()> {
        let processed = self.batch.processed_count();
        if processed > 0 {
            warn!(
                processed,
                "aborting a batch with applied records, they stay in the store; use tpc_abort to undo them"
            );
        }
        info!(records = self.batch.len(), "discarding staged batch");
        self.reset();
        Ok(())
    }

    #[instrument(skip(self), fields(key = %self.sort_key))]
    fn begin(&mut self) -> TpcResult<()> {
        if !self.state.is_staging() {
            return Err(TpcError::Protocol {
                op: "begin",
                state: self.state,
            });
        }
        debug!(records = self.batch.len(), "begin");
        Ok(())
    }

    #[instrument(skip(self), fields(key = %self.sort_key))]
    fn commit(&mut self) -> TpcResult<()> {
        if !self.state.is_staging() {
            return Err(TpcError::Protocol {
                op: "commit",
                state: self.state,
            });
        }
        self.state = TxnState::Committing;
        info!(records = self.batch.len(), "committing");

        match commit::apply_batch(self.store.as_ref(), &mut self.batch, &self.config) {
            Ok(()) => {
                self.state = TxnState::Committed;
                Ok(())
            }
            Err(e) => {
                self.state = TxnState::Failed;
                warn!(
                    ?e,
                    processed = self.batch.processed_count(),
                    "commit failed"
                );
                Err(e)
            }
        }
    }

    #[instrument(skip(self), fields(key = %self.sort_key))]
    fn vote(&mut self) -> TpcResult<Vote> {
        let vote = match self.state {
            TxnState::Committed if self.config.verify_on_vote => {
                if commit::verify_batch(self.store.as_ref(), &self.batch) {
                    Vote::Yes
                } else {
                    Vote::No
                }
            }
            TxnState::Committed => Vote::Yes,
            _ => Vote::No,
        };
        self.state = match vote {
            Vote::Yes => TxnState::VotedYes,
            Vote::No => TxnState::VotedNo,
        };
        info!(?vote, "voted");
        Ok(vote)
    }

    #[instrument(skip(self), fields(key = %self.sort_key))]
    fn finish(&mut self) -> TpcResult<()> {
        if !matches!(self.state, TxnState::Committed | TxnState::VotedYes) {
            return Err(TpcError::Protocol {
                op: "finish",
                state: self.state,
            });
        }
        let indices: Vec<String> = self.batch.indices().into_iter().collect();
        let result = if indices.is_empty() {
            Ok(())
        } else {
            self.store.refresh(&indices)
        };
        self.reset();
        match result {
            Ok(()) => {
                info!(?indices, "finished");
                Ok(())
            }
            Err(source) => {
                error!(
                    ?indices,
                    ?source,
                    "committed changes could not be made visible"
                );
                Err(TpcError::Unflushed { indices, source })
            }
        }
    }

    #[instrument(skip(self), fields(key = %self.sort_key))]
    fn tpc_abort(&mut self) -> TpcResult<()> {
        let processed = self.batch.processed_count();
        info!(processed, records = self.batch.len(), "compensating");
        self.compensation_failures = compensate::compensate_batch(self.store.as_ref(), &self.batch);
        if !self.compensation_failures.is_empty() {
            warn!(
                failures = self.compensation_failures.len(),
                "batch was only partially undone"
            );
        }
        self.reset();
        Ok(())
    }

    fn sort_key(&self) -> &SortKey {
        &self.sort_key
    }

    fn savepoint(&mut self) -> TpcResult<Savepoint> {
        if !self.state.is_staging() {
            return Err(TpcError::Protocol {
                op: "take a savepoint",
                state: self.state,
            });
        }
        debug!(key = %self.sort_key, watermark = self.batch.len(), "savepoint");
        Ok(Savepoint::new(
            self.sort_key.clone(),
            self.generation,
            self.batch.len(),
            self.scratch.clone(),
        ))
    }

    fn rollback(&mut self, savepoint: Savepoint) -> TpcResult<()> {
        if !self.state.is_staging() {
            return Err(TpcError::Protocol {
                op: "roll back to a savepoint",
                state: self.state,
            });
        }
        if !savepoint.is_for(&self.sort_key, self.generation)
            || savepoint.watermark() > self.batch.len()
        {
            return Err(TpcError::StaleSavepoint(self.sort_key.clone()));
        }
        debug!(
            key = %self.sort_key,
            dropped = self.batch.len() - savepoint.watermark(),
            "rolling back to savepoint"
        );
        self.batch.truncate(savepoint.watermark());
        self.scratch = savepoint.into_scratch();
        Ok(())
    }
}
