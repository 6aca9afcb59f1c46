//! The two-phase commit surface a cohort exposes to its coordinator.

use crate::error::{TpcError, TpcResult};
use crate::scratch::Savepoint;
use crate::sort_key::SortKey;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Vote {
    Yes,
    No,
}

/// One cohort of a coordinated transaction.
///
/// The coordinator calls exactly one phase at a time, from one thread:
/// `begin`, `commit` and `vote` on every cohort, then either `finish` on all
/// of them after unanimous yes votes, or `tpc_abort` on all of them.
/// `abort` is only used before phase one starts.
#[cfg_attr(any(test, feature = "test_utils"), mockall::automock)]
pub trait Participant {
    /// Discard everything staged. Nothing has been applied yet.
    fn abort(&mut self) -> TpcResult<()>;

    /// Acquire whatever `commit` needs. An error counts as a no vote.
    fn begin(&mut self) -> TpcResult<()>;

    /// Apply the staged changes
    fn commit(&mut self) -> TpcResult<()>;

    /// Last chance to object before the coordinator decides
    fn vote(&mut self) -> TpcResult<Vote>;

    /// Every cohort voted yes. Failing here leaves committed data behind.
    fn finish(&mut self) -> TpcResult<()>;

    /// Some cohort voted no: undo whatever `commit` applied
    fn tpc_abort(&mut self) -> TpcResult<()>;

    fn sort_key(&self) -> &SortKey;

    /// Checkpoint the staged, uncommitted state
    fn savepoint(&mut self) -> TpcResult<Savepoint> {
        Err(TpcError::SavepointUnsupported(self.sort_key().clone()))
    }

    /// Restore the staged state captured by [Participant::savepoint]
    fn rollback(&mut self, savepoint: Savepoint) -> TpcResult<()> {
        let _ = savepoint;
        Err(TpcError::SavepointUnsupported(self.sort_key().clone()))
    }
}
