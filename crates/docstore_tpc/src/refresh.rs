//! Bounding the cost of index-visibility refreshes.
//!
//! Refreshing after every applied record is always correct but expensive.
//! Instead a refresh happens whenever the kind of the record about to be
//! applied differs from the kind of the previous one, covering every index
//! touched since the last refresh. Reads between two records of the same
//! kind may therefore not see the first one yet.

use crate::record::MutationKind;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default)]
pub struct RefreshCoordinator {
    last_kind: Option<MutationKind>,
    pending: BTreeSet<String>,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A refresh is due at every kind boundary, never before the first record
    pub fn should_refresh(last_kind: Option<MutationKind>, current_kind: MutationKind) -> bool {
        match last_kind {
            Some(last) => last != current_kind,
            None => false,
        }
    }

    /// Call before applying a record of `kind`. Returns the indices that must
    /// be refreshed first, if a refresh is due; the tracked set is cleared.
    pub fn before_apply(&mut self, kind: MutationKind) -> Option<Vec<String>> {
        let due = Self::should_refresh(self.last_kind, kind) && !self.pending.is_empty();
        self.last_kind = Some(kind);
        if due {
            Some(self.drain())
        } else {
            None
        }
    }

    /// Track an index written to since the last refresh
    pub fn touch(&mut self, index: &str) {
        self.pending.insert(index.to_string());
    }

    /// Stop tracking an index, e.g. because it was deleted
    pub fn forget(&mut self, index: &str) {
        self.pending.remove(index);
    }

    /// Take every index touched since the last refresh
    pub fn drain(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending).into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use MutationKind::*;

    #[test]
    fn no_refresh_without_a_previous_kind() {
        assert!(!RefreshCoordinator::should_refresh(None, Add));
        assert!(!RefreshCoordinator::should_refresh(Some(Add), Add));
        assert!(RefreshCoordinator::should_refresh(Some(Add), Remove));
    }

    #[test]
    fn refreshes_only_at_kind_boundaries() {
        let mut refresh = RefreshCoordinator::new();
        let mut refreshes = vec![];
        for (kind, index) in [(Add, "a"), (Add, "b"), (Remove, "a"), (Remove, "a"), (Add, "c")] {
            if let Some(indices) = refresh.before_apply(kind) {
                refreshes.push(indices);
            }
            refresh.touch(index);
        }
        assert_eq!(
            refreshes,
            vec![
                vec!["a".to_string(), "b".to_string()],
                vec!["a".to_string()]
            ]
        );
        assert_eq!(refresh.drain(), vec!["c".to_string()]);
        assert!(refresh.drain().is_empty());
    }

    #[test]
    fn forgotten_indices_are_not_refreshed() {
        let mut refresh = RefreshCoordinator::new();
        refresh.before_apply(Add);
        refresh.touch("gone");
        refresh.forget("gone");
        assert_eq!(refresh.before_apply(Remove), None);
    }
}
