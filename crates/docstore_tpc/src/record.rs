//! Staged mutations and the compensation data captured for them.

use crate::error::{NotFound, TpcError, TpcResult, ValidationError};
use crate::store::{Document, Hit, Query, Script};
use serde::{Deserialize, Serialize};

mod item;
mod wire;

#[cfg(test)]
mod tests;

pub use item::Item;

/// The closed set of operations a record can stage
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MutationKind {
    Add,
    Remove,
    Update,
    UpdateByQuery,
    DeleteByQuery,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Add => "add",
            MutationKind::Remove => "remove",
            MutationKind::Update => "update",
            MutationKind::UpdateByQuery => "updateByQuery",
            MutationKind::DeleteByQuery => "deleteByQuery",
        }
    }

    pub fn is_by_query(&self) -> bool {
        matches!(self, MutationKind::UpdateByQuery | MutationKind::DeleteByQuery)
    }
}

impl std::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind-specific part of a record. Each variant only carries the fields
/// its kind requires, so a constructed record is always complete.
#[derive(Clone, Debug, PartialEq)]
pub enum Mutation {
    Add { id: String, source: Document },
    Remove { id: String },
    Update { id: String, source: Document },
    UpdateByQuery { query: Query, script: Script },
    DeleteByQuery { query: Query },
}

impl Mutation {
    pub fn kind(&self) -> MutationKind {
        match self {
            Mutation::Add { .. } => MutationKind::Add,
            Mutation::Remove { .. } => MutationKind::Remove,
            Mutation::Update { .. } => MutationKind::Update,
            Mutation::UpdateByQuery { .. } => MutationKind::UpdateByQuery,
            Mutation::DeleteByQuery { .. } => MutationKind::DeleteByQuery,
        }
    }

    /// The target document id, absent for the by-query kinds
    pub fn id(&self) -> Option<&str> {
        match self {
            Mutation::Add { id, .. } | Mutation::Remove { id } | Mutation::Update { id, .. } => {
                Some(id)
            }
            Mutation::UpdateByQuery { .. } | Mutation::DeleteByQuery { .. } => None,
        }
    }
}

/// Prior state captured right before a record is applied
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Backup {
    /// The previous body of a single document (Remove, Update)
    Document(Document),
    /// Every document the query matched (UpdateByQuery, DeleteByQuery)
    Hits(Vec<Hit>),
}

/// One staged operation plus what is needed to undo it.
///
/// `processed` only ever goes from false to true, and only once the store
/// call has returned successfully. It is the sole thing compensation looks
/// at to decide whether a record needs undoing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(into = "wire::RecordWire", try_from = "wire::RecordWire")]
pub struct MutationRecord {
    index: String,
    doc_type: String,
    mutation: Mutation,
    processed: bool,
    index_was_created: bool,
    backup: Option<Backup>,
}

impl MutationRecord {
    /// Build a record from a resolved index, type and mutation. The index is
    /// resolved once here and never again.
    pub fn new(index: impl Into<String>, doc_type: impl Into<String>, mutation: Mutation) -> Self {
        Self {
            index: index.into(),
            doc_type: doc_type.into(),
            mutation,
            processed: false,
            index_was_created: false,
            backup: None,
        }
    }

    /// Validate an [Item] for the given kind and turn it into a record.
    ///
    /// A missing index with no usable default is a configuration problem,
    /// everything else missing is a validation problem.
    pub fn from_item(
        kind: MutationKind,
        item: Item,
        default_index: Option<&str>,
        single_mapping_type: Option<&str>,
    ) -> TpcResult<Self> {
        let Item {
            index,
            doc_type,
            id,
            source,
            query,
            script,
        } = item;

        let index = index
            .filter(|i| !i.is_empty())
            .or_else(|| default_index.filter(|i| !i.is_empty()).map(String::from))
            .ok_or_else(|| {
                TpcError::Configuration(
                    "_index input missing and default index is not set".to_string(),
                )
            })?;

        let doc_type = doc_type.ok_or(ValidationError::Missing {
            kind,
            field: "type",
        })?;
        if let Some(expected) = single_mapping_type {
            if doc_type != expected {
                return Err(NotFound::MappingType {
                    doc_type,
                    expected: expected.to_string(),
                }
                .into());
            }
        }

        let require_id = |id: Option<String>| {
            id.ok_or(ValidationError::Missing { kind, field: "id" })
        };

        let mutation = match kind {
            MutationKind::Add => Mutation::Add {
                id: require_id(id)?,
                source: source.ok_or(ValidationError::Missing {
                    kind,
                    field: "source",
                })?,
            },
            MutationKind::Remove => Mutation::Remove {
                id: require_id(id)?,
            },
            MutationKind::Update => {
                let id = require_id(id)?;
                let source = source.ok_or(ValidationError::Missing {
                    kind,
                    field: "source",
                })?;
                if is_empty_document(&source) {
                    return Err(ValidationError::Empty {
                        kind,
                        field: "source",
                    }
                    .into());
                }
                Mutation::Update { id, source }
            }
            MutationKind::UpdateByQuery => Mutation::UpdateByQuery {
                query: query.ok_or(ValidationError::Missing {
                    kind,
                    field: "query",
                })?,
                script: script.ok_or(ValidationError::Missing {
                    kind,
                    field: "script",
                })?,
            },
            MutationKind::DeleteByQuery => Mutation::DeleteByQuery {
                query: query.ok_or(ValidationError::Missing {
                    kind,
                    field: "query",
                })?,
            },
        };

        Ok(Self::new(index, doc_type, mutation))
    }

    pub fn kind(&self) -> MutationKind {
        self.mutation.kind()
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn doc_type(&self) -> &str {
        &self.doc_type
    }

    pub fn id(&self) -> Option<&str> {
        self.mutation.id()
    }

    pub fn mutation(&self) -> &Mutation {
        &self.mutation
    }

    pub fn processed(&self) -> bool {
        self.processed
    }

    pub fn index_was_created(&self) -> bool {
        self.index_was_created
    }

    pub fn backup(&self) -> Option<&Backup> {
        self.backup.as_ref()
    }

    pub(crate) fn mark_processed(&mut self) {
        self.processed = true;
    }

    pub(crate) fn set_index_was_created(&mut self, created: bool) {
        self.index_was_created = created;
    }

    pub(crate) fn set_backup(&mut self, backup: Backup) {
        self.backup = Some(backup);
    }

    /// Turn an Update whose target turned out to be absent into an Add, so
    /// that compensation deletes the document instead of restoring it.
    /// Returns whether the record was demoted.
    pub(crate) fn demote_to_add(&mut self) -> bool {
        if let Mutation::Update { id, source } = &mut self.mutation {
            let id = std::mem::take(id);
            let source = source.take();
            self.mutation = Mutation::Add { id, source };
            true
        } else {
            false
        }
    }
}

fn is_empty_document(doc: &Document) -> bool {
    match doc {
        Document::Null => true,
        Document::Object(map) => map.is_empty(),
        _ => false,
    }
}
