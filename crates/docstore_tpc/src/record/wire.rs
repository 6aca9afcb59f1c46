//! Flat persisted/debugging shape of a [MutationRecord]:
//! `{kind, index, type, id?, payload?, query?, script?, processed, indexWasCreated, backup?}`

use super::{Backup, Mutation, MutationKind, MutationRecord};
use crate::error::ValidationError;
use crate::store::{Document, Query, Script};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RecordWire {
    kind: MutationKind,
    index: String,
    #[serde(rename = "type")]
    doc_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    query: Option<Query>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    script: Option<Script>,
    processed: bool,
    index_was_created: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    backup: Option<Backup>,
}

impl From<MutationRecord> for RecordWire {
    fn from(record: MutationRecord) -> Self {
        let kind = record.kind();
        let (id, payload, query, script) = match record.mutation {
            Mutation::Add { id, source } | Mutation::Update { id, source } => {
                (Some(id), Some(source), None, None)
            }
            Mutation::Remove { id } => (Some(id), None, None, None),
            Mutation::UpdateByQuery { query, script } => (None, None, Some(query), Some(script)),
            Mutation::DeleteByQuery { query } => (None, None, Some(query), None),
        };
        Self {
            kind,
            index: record.index,
            doc_type: record.doc_type,
            id,
            payload,
            query,
            script,
            processed: record.processed,
            index_was_created: record.index_was_created,
            backup: record.backup,
        }
    }
}

impl TryFrom<RecordWire> for MutationRecord {
    type Error = ValidationError;

    fn try_from(wire: RecordWire) -> Result<Self, Self::Error> {
        let kind = wire.kind;
        let missing = |field| ValidationError::Missing { kind, field };
        let mutation = match kind {
            MutationKind::Add => Mutation::Add {
                id: wire.id.ok_or_else(|| missing("id"))?,
                source: wire.payload.ok_or_else(|| missing("payload"))?,
            },
            MutationKind::Remove => Mutation::Remove {
                id: wire.id.ok_or_else(|| missing("id"))?,
            },
            MutationKind::Update => Mutation::Update {
                id: wire.id.ok_or_else(|| missing("id"))?,
                source: wire.payload.ok_or_else(|| missing("payload"))?,
            },
            MutationKind::UpdateByQuery => Mutation::UpdateByQuery {
                query: wire.query.ok_or_else(|| missing("query"))?,
                script: wire.script.ok_or_else(|| missing("script"))?,
            },
            MutationKind::DeleteByQuery => Mutation::DeleteByQuery {
                query: wire.query.ok_or_else(|| missing("query"))?,
            },
        };
        Ok(MutationRecord {
            index: wire.index,
            doc_type: wire.doc_type,
            mutation,
            processed: wire.processed,
            index_was_created: wire.index_was_created,
            backup: wire.backup,
        })
    }
}
