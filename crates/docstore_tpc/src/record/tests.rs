use super::*;
use crate::error::{NotFound, TpcError, ValidationError};
use matches::assert_matches;
use pretty_assertions::assert_eq;
use serde_json::json;
use test_case::test_case;

fn doc_item() -> Item {
    Item::document("i", "doc", "1").with_source(json!({"v": 1}))
}

#[test]
fn add_resolves_default_index() {
    let item = Item::new()
        .with_type("doc")
        .with_id("1")
        .with_source(json!({"v": 1}));
    let record = MutationRecord::from_item(MutationKind::Add, item, Some("fallback"), None).unwrap();
    assert_eq!(record.index(), "fallback");
    assert_eq!(record.kind(), MutationKind::Add);
    assert!(!record.processed());
    assert!(record.backup().is_none());
}

#[test]
fn explicit_index_wins_over_default() {
    let record =
        MutationRecord::from_item(MutationKind::Add, doc_item(), Some("fallback"), None).unwrap();
    assert_eq!(record.index(), "i");
}

#[test_case(None ; "no default")]
#[test_case(Some("") ; "empty default")]
fn missing_index_is_configuration_error(default_index: Option<&str>) {
    let item = Item::new()
        .with_type("doc")
        .with_id("1")
        .with_source(json!({}));
    let err = MutationRecord::from_item(MutationKind::Add, item, default_index, None).unwrap_err();
    assert_matches!(err, TpcError::Configuration(_));
}

#[test_case(MutationKind::Add, Item::new().with_index("i").with_id("1"), "type" ; "add without type")]
#[test_case(MutationKind::Remove, Item::new().with_index("i").with_type("doc"), "id" ; "remove without id")]
#[test_case(MutationKind::Update, Item::document("i", "doc", "1"), "source" ; "update without source")]
#[test_case(MutationKind::Add, Item::document("i", "doc", "1"), "source" ; "add without source")]
#[test_case(MutationKind::UpdateByQuery, Item::new().with_index("i").with_type("doc").with_query(json!({"match_all": {}})), "script" ; "update by query without script")]
#[test_case(MutationKind::DeleteByQuery, Item::new().with_index("i").with_type("doc"), "query" ; "delete by query without query")]
fn missing_required_field(kind: MutationKind, item: Item, field: &'static str) {
    let err = MutationRecord::from_item(kind, item, None, None).unwrap_err();
    match err {
        TpcError::Validation(ValidationError::Missing { kind: k, field: f }) => {
            assert_eq!(k, kind);
            assert_eq!(f, field);
        }
        other => panic!("expected a missing field, got {:?}", other),
    }
}

#[test]
fn update_rejects_empty_payload() {
    let item = Item::document("i", "doc", "1").with_source(json!({}));
    let err = MutationRecord::from_item(MutationKind::Update, item, None, None).unwrap_err();
    assert_matches!(
        err,
        TpcError::Validation(ValidationError::Empty {
            kind: MutationKind::Update,
            field: "source"
        })
    );
}

#[test]
fn single_mapping_type_rejects_custom_types() {
    let item = Item::document("i", "person", "1").with_source(json!({"v": 1}));
    let err = MutationRecord::from_item(MutationKind::Add, item, None, Some("doc")).unwrap_err();
    assert_matches!(err, TpcError::NotFound(NotFound::MappingType { .. }));

    MutationRecord::from_item(MutationKind::Add, doc_item(), None, Some("doc")).unwrap();
}

#[test]
fn by_query_records_have_no_id() {
    let item = Item::new()
        .with_index("i")
        .with_type("doc")
        .with_id("ignored")
        .with_query(json!({"match_all": {}}));
    let record = MutationRecord::from_item(MutationKind::DeleteByQuery, item, None, None).unwrap();
    assert_eq!(record.id(), None);
    assert!(record.kind().is_by_query());
}

#[test]
fn demotion_only_applies_to_updates() {
    let item = Item::document("i", "doc", "1").with_source(json!({"v": 2}));
    let mut update = MutationRecord::from_item(MutationKind::Update, item, None, None).unwrap();
    assert!(update.demote_to_add());
    assert_eq!(update.kind(), MutationKind::Add);
    assert_eq!(
        update.mutation(),
        &Mutation::Add {
            id: "1".into(),
            source: json!({"v": 2})
        }
    );

    let mut add = MutationRecord::from_item(MutationKind::Add, doc_item(), None, None).unwrap();
    assert!(!add.demote_to_add());
    assert_eq!(add.kind(), MutationKind::Add);
}

#[test]
fn wire_shape_is_flat_camel_case() {
    let mut record = MutationRecord::from_item(
        MutationKind::Update,
        Item::document("i", "doc", "1").with_source(json!({"v": 2})),
        None,
        None,
    )
    .unwrap();
    record.set_backup(Backup::Document(json!({"v": 1})));
    record.mark_processed();

    let value = serde_json::to_value(&record).unwrap();
    assert_eq!(
        value,
        json!({
            "kind": "update",
            "index": "i",
            "type": "doc",
            "id": "1",
            "payload": {"v": 2},
            "processed": true,
            "indexWasCreated": false,
            "backup": {"document": {"v": 1}},
        })
    );

    let back: MutationRecord = serde_json::from_value(value).unwrap();
    assert_eq!(back, record);
}

#[test]
fn wire_shape_rejects_incomplete_records() {
    let value = json!({
        "kind": "updateByQuery",
        "index": "i",
        "type": "doc",
        "query": {"match_all": {}},
        "processed": false,
        "indexWasCreated": false,
    });
    let err = serde_json::from_value::<MutationRecord>(value).unwrap_err();
    assert!(err.to_string().contains("script"));
}
