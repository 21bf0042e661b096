use chrono::{DateTime, TimeZone, Utc};
use docbridge::{
    bson::{Bson, doc, oid::ObjectId},
    error::DocumentStoreError,
    memory::InMemoryStore,
    prelude::*,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Identity)]
struct Invoice {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none", default)]
    id: Option<Id<Invoice>>,
    number: String,
    total: Decimal,
    #[serde(with = "docbridge::temporal::as_date")]
    issued_at: DateTime<Utc>,
    customer: Option<ObjectId>,
    lines: Vec<Line>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Line {
    sku: String,
    price: Decimal,
    quantity: i32,
}

impl Document for Invoice {
    fn collection_name() -> &'static str {
        "invoices"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Identity)]
struct Tag {
    #[serde(rename = "_id")]
    id: String,
    label: String,
}

impl Document for Tag {
    fn collection_name() -> &'static str {
        "tags"
    }
}

fn invoice(number: &str, total: &str) -> Invoice {
    Invoice {
        id: None,
        number: number.to_string(),
        total: total.parse().unwrap(),
        issued_at: Utc.timestamp_millis_opt(1_700_000_000_123).unwrap(),
        customer: Some(ObjectId::new()),
        lines: vec![Line {
            sku: "A-1".to_string(),
            price: total.parse().unwrap(),
            quantity: 1,
        }],
    }
}

#[tokio::test]
async fn insert_generates_ids_and_round_trips() {
    let store = DocumentStore::new(InMemoryStore::builder().build().await.unwrap());
    let invoices = store.typed_collection::<Invoice>();

    let stored = invoices.insert_one(invoice("INV-1", "19.99")).await.unwrap();
    let id = stored.id.clone().unwrap();
    assert!(id.as_object_id().is_some());

    let found = invoices.get(id.clone()).await.unwrap().unwrap();
    assert_eq!(found, stored);
    assert_eq!(found.total.to_string(), "19.99");

    let raw = store
        .collection("invoices")
        .find(doc! { "number": "INV-1" })
        .await
        .unwrap();
    assert!(matches!(raw[0].get("_id"), Some(Bson::ObjectId(_))));
    assert!(matches!(raw[0].get("total"), Some(Bson::Decimal128(_))));
    assert!(matches!(raw[0].get("issued_at"), Some(Bson::DateTime(_))));

    store.shutdown().await.unwrap();
}

#[tokio::test]
async fn find_replace_and_delete() {
    let store = DocumentStore::new(InMemoryStore::new());
    let invoices = store.typed_collection::<Invoice>();

    let mut stored = invoices
        .insert(vec![invoice("INV-1", "10"), invoice("INV-2", "20.50")])
        .await
        .unwrap();
    assert_eq!(invoices.count(doc! {}).await.unwrap(), 2);

    let second = stored.pop().unwrap();
    let found = invoices.find(doc! { "number": "INV-2" }).await.unwrap();
    assert_eq!(found, vec![second.clone()]);

    let mut updated = second.clone();
    updated.total = "21.00".parse().unwrap();
    invoices.replace(&updated).await.unwrap();

    let reread = invoices.get(second.id.clone().unwrap()).await.unwrap().unwrap();
    assert_eq!(reread.total.to_string(), "21.00");

    assert!(invoices.delete(&reread).await.unwrap());
    assert!(!invoices.delete(&reread).await.unwrap());
    assert_eq!(invoices.find_all().await.unwrap().len(), 1);

    let err = invoices.replace(&reread).await.unwrap_err();
    assert!(matches!(err, DocumentStoreError::DocumentNotFound(_, _)));
}

#[tokio::test]
async fn duplicate_identifiers_are_rejected() {
    let store = DocumentStore::new(InMemoryStore::new());
    let tags = store.typed_collection::<Tag>();

    tags.insert_one(Tag { id: "rust".into(), label: "Rust".into() })
        .await
        .unwrap();

    let err = tags
        .insert_one(Tag { id: "rust".into(), label: "Again".into() })
        .await
        .unwrap_err();
    assert!(matches!(err, DocumentStoreError::DocumentAlreadyExists(_, ref c) if c == "tags"));

    assert!(tags.delete_by_id("rust").await.unwrap());
    assert!(tags.get("rust").await.unwrap().is_none());
}

#[tokio::test]
async fn shared_codec_configuration() {
    let codec = std::sync::Arc::new(
        Codec::builder()
            .id_generator(IdGenerator::UuidString)
            .build(),
    );
    let store = DocumentStore::with_codec(InMemoryStore::new(), codec.clone());
    let invoices = store.typed_collection::<Invoice>();

    let stored = invoices.insert_one(invoice("INV-9", "1.5")).await.unwrap();
    let id = stored.id.clone().unwrap();
    assert_eq!(id.as_str().map(str::len), Some(36));

    let text = codec.to_text(&stored).unwrap();
    let back: Invoice = codec.from_text(&text).unwrap();
    assert_eq!(back, stored);

    let found = invoices.get(id).await.unwrap();
    assert_eq!(found, Some(stored));
}
