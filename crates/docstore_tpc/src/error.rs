// Error types are self-explanatory
#![allow(missing_docs)]

use crate::manager::TxnState;
use crate::record::MutationKind;
use crate::sort_key::SortKey;
use crate::store::StoreError;
use thiserror::Error;

/// A staged call was missing something it needs. Raised before anything is
/// staged and before any store I/O.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("`{field}` is required for a {kind} mutation")]
    Missing {
        kind: MutationKind,
        field: &'static str,
    },

    #[error("`{field}` must not be empty for a {kind} mutation")]
    Empty {
        kind: MutationKind,
        field: &'static str,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotFound {
    #[error("Unable to find {id} in type {doc_type} and in index {index}")]
    Document {
        index: String,
        doc_type: String,
        id: String,
    },

    #[error("Custom type `{doc_type}` is not supported by this store, the type must be `{expected}`")]
    MappingType { doc_type: String, expected: String },
}

#[derive(Error, Debug)]
pub enum TpcError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    NotFound(#[from] NotFound),

    #[error("Unable to capture a backup of {index}/{doc_type}/{id}: {reason}")]
    Consistency {
        index: String,
        doc_type: String,
        id: String,
        reason: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Cannot {op} while the participant is {state}")]
    Protocol { op: &'static str, state: TxnState },

    #[error("Participant {0} does not support savepoints")]
    SavepointUnsupported(SortKey),

    #[error("Savepoint is not valid for the current transaction of {0}")]
    StaleSavepoint(SortKey),

    #[error("Participant {0} voted no")]
    VotedNo(SortKey),

    #[error("Joined participants were not handed to the coordinator: {0:?}")]
    MissingParticipants(Vec<SortKey>),

    #[error("Changes were committed but could not be made visible in {indices:?}: {source}")]
    Unflushed {
        indices: Vec<String>,
        #[source]
        source: StoreError,
    },

    #[error("Unable to parse configuration: {0}")]
    Config(#[from] serde_yaml::Error),
}

pub type TpcResult<T> = Result<T, TpcError>;

/// Failure to undo one applied record during `tpc_abort`.
///
/// These are logged and collected, never propagated: the remaining records
/// are still compensated.
#[derive(Error, Debug)]
#[error("Failed to compensate {kind} record #{position} on {index} (document: {id:?}): {source}")]
pub struct CompensationError {
    /// Position of the record in the batch
    pub position: usize,
    pub kind: MutationKind,
    pub index: String,
    /// The document being restored, if the failure concerns a single document
    pub id: Option<String>,
    #[source]
    pub source: StoreError,
}
