//! Two-phase commit for a document store that has no transactions of its own.
//!
//! A [ResourceManager](manager::ResourceManager) collects the document
//! mutations issued during a logical transaction and joins that
//! transaction as one of its cohorts. When the coordinator drives it
//! through [Participant](participant::Participant), it applies the
//! mutations in order, votes, and then either makes the changes visible
//! (`finish`) or undoes everything it applied (`tpc_abort`). The store
//! only guarantees single-document atomic writes, so atomicity across a
//! batch comes from compensation: each record captures what it overwrites
//! right before it is applied.
//!
//! ```rust
//! use docstore_tpc::prelude::*;
//! use docstore_tpc::test_utils::MemoryStore;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! let txn = Arc::new(Transaction::new());
//! let mut manager = ResourceManager::new(
//!     store.clone(),
//!     txn.clone(),
//!     ResourceManagerConfig::default().with_default_index("products"),
//! );
//!
//! manager
//!     .add(Item::new().with_type("doc").with_id("1").with_source(json!({"v": 1})))
//!     .unwrap();
//! txn.commit(&mut [&mut manager]).unwrap();
//!
//! assert_eq!(store.document("products", "doc", "1"), Some(json!({"v": 1})));
//! ```

pub mod batch;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod manager;
pub mod participant;
pub mod record;
pub mod refresh;
pub mod scratch;
pub mod sort_key;
pub mod store;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

/// Common imports
pub mod prelude {
    pub use crate::batch::Batch;
    pub use crate::config::ResourceManagerConfig;
    pub use crate::coordinator::{Transaction, TransactionHandle};
    pub use crate::error::{
        CompensationError, NotFound, TpcError, TpcResult, ValidationError,
    };
    pub use crate::manager::{ResourceManager, TxnState};
    pub use crate::participant::{Participant, Vote};
    pub use crate::record::{Backup, Item, Mutation, MutationKind, MutationRecord};
    pub use crate::refresh::RefreshCoordinator;
    pub use crate::scratch::{Op, Savepoint, Scratch};
    pub use crate::sort_key::SortKey;
    pub use crate::store::{Document, Hit, StoreClient, StoreError, StoreResult};
}
