//! The coordinator side of the two-phase commit contract.

use crate::error::{TpcError, TpcResult};
use crate::participant::{Participant, Vote};
use crate::scratch::Savepoint;
use crate::sort_key::SortKey;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use tracing::*;

/// What a participant sees of the transaction it joins
#[cfg_attr(any(test, feature = "test_utils"), mockall::automock)]
pub trait TransactionHandle: Send + Sync {
    /// Register a participant with the active transaction
    fn join(&self, key: &SortKey) -> TpcResult<()>;
}

/// A minimal coordinator driving every joined participant through two-phase
/// commit, in sort-key order.
///
/// Participants join through [TransactionHandle]; the caller then hands
/// the participants themselves to [Transaction::commit] or
/// [Transaction::abort]. Participants that never joined are left alone.
/// Every outcome ends the transaction, so the same handle can be reused.
#[derive(Debug, Default)]
pub struct Transaction {
    joined: Mutex<BTreeSet<SortKey>>,
}

impl TransactionHandle for Transaction {
    fn join(&self, key: &SortKey) -> TpcResult<()> {
        if self.joined.lock().insert(key.clone()) {
            debug!(%key, "participant joined");
        }
        Ok(())
    }
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// The participants that joined so far, in commit order
    pub fn joined(&self) -> Vec<SortKey> {
        self.joined.lock().iter().cloned().collect()
    }

    /// Run both phases over every joined participant.
    ///
    /// On an error or a no vote every joined participant is asked to
    /// `tpc_abort` and the triggering error is returned. If a joined
    /// participant is missing from `participants`, nothing is applied: the
    /// others are aborted and the missing keys stay joined.
    #[instrument(skip_all)]
    pub fn commit(&self, participants: &mut [&mut dyn Participant]) -> TpcResult<()> {
        let (order, missing) = self.take_joined(participants);
        if !missing.is_empty() {
            warn!(?missing, "joined participants are missing, aborting the others");
            abort_each(participants, &order).ok();
            return Err(TpcError::MissingParticipants(missing));
        }
        info!(participants = order.len(), "committing");

        match prepare(participants, &order) {
            Ok(()) => {
                let mut first_error = None;
                for &i in &order {
                    if let Err(e) = participants[i].finish() {
                        error!(key = %participants[i].sort_key(), ?e, "finish failed");
                        first_error.get_or_insert(e);
                    }
                }
                match first_error {
                    Some(e) => Err(e),
                    None => Ok(()),
                }
            }
            Err(e) => {
                warn!(?e, "aborting");
                for &i in &order {
                    if let Err(abort_error) = participants[i].tpc_abort() {
                        error!(key = %participants[i].sort_key(), ?abort_error, "tpc_abort failed");
                    }
                }
                Err(e)
            }
        }
    }

    /// Abort before phase one: every joined participant discards its staged
    /// changes. Returns the first error after all were asked.
    ///
    /// Joined participants missing from `participants` stay joined and are
    /// reported, so a later call can still reach them.
    #[instrument(skip_all)]
    pub fn abort(&self, participants: &mut [&mut dyn Participant]) -> TpcResult<()> {
        let (order, missing) = self.take_joined(participants);
        let result = abort_each(participants, &order);
        if !missing.is_empty() {
            warn!(?missing, "joined participants are missing");
            return Err(TpcError::MissingParticipants(missing));
        }
        result
    }

    /// Checkpoint every joined participant. Fails as soon as one of them
    /// can't take a savepoint.
    pub fn savepoint(&self, participants: &mut [&mut dyn Participant]) -> TpcResult<Vec<Savepoint>> {
        self.ordered(participants)?
            .into_iter()
            .map(|i| participants[i].savepoint())
            .collect()
    }

    /// Hand each savepoint back to the participant that took it
    pub fn rollback(
        &self,
        participants: &mut [&mut dyn Participant],
        savepoints: Vec<Savepoint>,
    ) -> TpcResult<()> {
        for savepoint in savepoints {
            let owner = savepoint.owner().clone();
            let participant = participants
                .iter_mut()
                .find(|p| p.sort_key() == &owner)
                .ok_or_else(|| TpcError::StaleSavepoint(owner.clone()))?;
            participant.rollback(savepoint)?;
        }
        Ok(())
    }

    /// Indices of the joined participants, sorted by key. Every joined
    /// participant must be present.
    fn ordered(&self, participants: &[&mut dyn Participant]) -> TpcResult<Vec<usize>> {
        let joined = self.joined.lock();
        let order = sort_joined(participants, &joined);
        let missing = missing_from(participants, &order, &joined);
        if missing.is_empty() {
            Ok(order)
        } else {
            Err(TpcError::MissingParticipants(missing))
        }
    }

    /// Like [Self::ordered], but ends the transaction for the participants
    /// found. Joined keys with no participant stay joined and are returned.
    fn take_joined(&self, participants: &[&mut dyn Participant]) -> (Vec<usize>, Vec<SortKey>) {
        let mut joined = self.joined.lock();
        let order = sort_joined(participants, &joined);
        let missing = missing_from(participants, &order, &joined);
        *joined = missing.iter().cloned().collect();
        (order, missing)
    }
}

fn missing_from(
    participants: &[&mut dyn Participant],
    order: &[usize],
    joined: &BTreeSet<SortKey>,
) -> Vec<SortKey> {
    joined
        .iter()
        .filter(|key| !order.iter().any(|&i| participants[i].sort_key() == *key))
        .cloned()
        .collect()
}

/// Ask each participant to abort, returning the first error after all were
/// asked
fn abort_each(participants: &mut [&mut dyn Participant], order: &[usize]) -> TpcResult<()> {
    let mut first_error = None;
    for &i in order {
        if let Err(e) = participants[i].abort() {
            warn!(key = %participants[i].sort_key(), ?e, "abort failed");
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn sort_joined(participants: &[&mut dyn Participant], joined: &BTreeSet<SortKey>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..participants.len())
        .filter(|&i| joined.contains(participants[i].sort_key()))
        .collect();
    order.sort_by(|&a, &b| participants[a].sort_key().cmp(participants[b].sort_key()));
    order.dedup_by(|a, b| participants[*a].sort_key() == participants[*b].sort_key());
    order
}

/// Phase one: begin, commit and vote on every participant
fn prepare(participants: &mut [&mut dyn Participant], order: &[usize]) -> TpcResult<()> {
    for &i in order {
        participants[i].begin()?;
    }
    for &i in order {
        participants[i].commit()?;
    }
    for &i in order {
        if participants[i].vote()? == Vote::No {
            return Err(TpcError::VotedNo(participants[i].sort_key().clone()));
        }
    }
    Ok(())
}
