use crate::store::{Document, Query, Script};
use serde::{Deserialize, Serialize};

/// What the application hands to a staging call.
///
/// Every field is optional here; which ones are required depends on the
/// kind of mutation and is checked when the item is turned into a
/// [MutationRecord](super::MutationRecord).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Item {
    /// Falls back to the configured default index when absent
    pub index: Option<String>,
    #[serde(rename = "type")]
    pub doc_type: Option<String>,
    pub id: Option<String>,
    /// Full body for Add, partial body for Update
    pub source: Option<Document>,
    pub query: Option<Query>,
    pub script: Option<Script>,
}

impl Item {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for the common index/type/id triple
    pub fn document(
        index: impl Into<String>,
        doc_type: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self::new().with_index(index).with_type(doc_type).with_id(id)
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn with_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = Some(doc_type.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_source(mut self, source: Document) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_query(mut self, query: Query) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_script(mut self, script: Script) -> Self {
        self.script = Some(script);
        self
    }
}
