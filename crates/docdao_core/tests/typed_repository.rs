use docdao_core::{
    DocumentId, Entity, FieldDefault, Filter, MemoryDocumentStore, ModelDescriptor, RepoError,
    Repository, SortOrder, SqliteDocumentStore, TypedRepository,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Customer {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    id: Option<DocumentId>,
    name: String,
    #[serde(
        rename = "creationTimestamp",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    created_at: Option<i64>,
}

impl Customer {
    fn named(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            created_at: None,
        }
    }
}

impl Entity for Customer {
    fn descriptor() -> ModelDescriptor {
        ModelDescriptor::new("customer")
            .with_default("creationTimestamp", FieldDefault::EpochMillis)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Label(String);

impl Entity for Label {
    fn descriptor() -> ModelDescriptor {
        ModelDescriptor::new("label")
    }
}

#[test]
fn typed_create_returns_entity_with_key_and_defaults() {
    let customers: TypedRepository<Customer, _> =
        TypedRepository::for_entity(SqliteDocumentStore::open_in_memory().unwrap());

    let created = customers.create_one(&Customer::named("Ada")).unwrap();
    let id = created.id.clone().unwrap();
    assert_eq!(created.name, "Ada");
    assert!(created.created_at.is_some());

    assert_eq!(customers.get_by_id(&id).unwrap(), created);
}

#[test]
fn typed_crud_follows_document_semantics() {
    let customers: TypedRepository<Customer, _> =
        TypedRepository::for_entity(MemoryDocumentStore::new());

    let created = customers
        .create(&[Customer::named("b"), Customer::named("a")])
        .unwrap();
    let ids: Vec<DocumentId> = created.iter().filter_map(|c| c.id.clone()).collect();
    assert_eq!(ids.len(), 2);

    let sorted = customers
        .filter(&Filter::new().sort_by("name", SortOrder::Asc))
        .unwrap();
    assert_eq!(sorted[0].name, "a");

    let renamed = customers
        .update_by_id(&ids[0], json!({"name": "c"}).as_object().unwrap())
        .unwrap();
    assert_eq!(renamed.name, "c");
    assert_eq!(renamed.id.as_ref(), Some(&ids[0]));

    let found = customers
        .get_one(&Filter::new().where_eq("name", "c"))
        .unwrap();
    assert_eq!(found.id.as_ref(), Some(&ids[0]));

    assert_eq!(customers.remove(&ids).unwrap(), vec![true, true]);
    assert!(customers.all().unwrap().is_empty());
    assert!(!customers.remove_by_id(&ids[0]).unwrap());
}

#[test]
fn entity_that_is_not_a_map_is_invalid_data() {
    let labels: TypedRepository<Label, _> = TypedRepository::for_entity(MemoryDocumentStore::new());
    let err = labels.create_one(&Label("x".to_string())).unwrap_err();
    assert!(matches!(err, RepoError::InvalidData(_)));
}

#[test]
fn record_not_matching_entity_is_invalid_data() {
    let store = MemoryDocumentStore::new();
    let raw = Repository::with_model(&store, Customer::descriptor());
    docdao_core::DocumentRepository::create_one(
        &raw,
        json!({"_id": "k", "name": 42}).as_object().unwrap(),
    )
    .unwrap();

    let customers: TypedRepository<Customer, _> = TypedRepository::new(raw);
    let err = customers.get_by_id(&DocumentId::from("k")).unwrap_err();
    assert!(matches!(err, RepoError::InvalidData(_)));
    assert!(customers.inner().model().is_some());
}
