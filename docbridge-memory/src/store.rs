//! In-memory storage implementation for document stores.
//!
//! Documents are kept as encoded BSON bytes, one vector per collection in
//! insertion order, behind an async-aware read-write lock. Every read decodes
//! the stored bytes again, so values come back exactly as a wire round trip
//! would return them.

use std::{collections::HashMap, sync::Arc};
use async_trait::async_trait;
use mea::rwlock::RwLock;
use bson::{Bson, Document, oid::ObjectId};
use tracing::{debug, trace};

use docbridge_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    error::{DocumentStoreError, DocumentStoreResult},
    extjson,
};

type StoreMap = HashMap<String, Vec<StoredDocument>>;

/// A document held in encoded form, together with its decoded `_id` for lookups.
#[derive(Clone, Debug)]
struct StoredDocument {
    id: Bson,
    bytes: Vec<u8>,
}

impl StoredDocument {
    fn encode(document: &Document) -> DocumentStoreResult<Self> {
        let id = document
            .get("_id")
            .cloned()
            .ok_or_else(|| DocumentStoreError::Backend("document has no _id".into()))?;

        Ok(Self {
            id,
            bytes: bson::ser::serialize_to_vec(document)?,
        })
    }

    fn decode(&self) -> DocumentStoreResult<Document> {
        Ok(bson::de::deserialize_from_slice(&self.bytes)?)
    }
}

/// Thread-safe in-memory document storage backend.
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing
/// it to be safely shared across async tasks. Multiple clones of the same instance
/// share the same underlying data.
///
/// # Filters
///
/// Filters are top-level (or dotted-path) equality matches. Operator keys such
/// as `$gt` are rejected with [`DocumentStoreError::Backend`].
///
/// # Example
///
/// ```ignore
/// use docbridge_memory::InMemoryStore;
/// use docbridge::backend::StoreBackend;
/// use bson::doc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = InMemoryStore::new();
///
///     store.insert_documents(vec![doc! { "_id": 1, "name": "Alice" }], "users").await?;
///
///     let docs = store.find_documents(doc! { "name": "Alice" }, "users").await?;
///     assert_eq!(docs.len(), 1);
///
///     Ok(())
/// }
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// collection_name -> documents in insertion order
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    /// Creates a builder for constructing an `InMemoryStore`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use docbridge_memory::InMemoryStore;
    ///
    /// let store = InMemoryStore::builder().build().await.unwrap();
    /// ```
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }
}

/// Checks the filter for operator keys, which this backend cannot evaluate.
fn validate_filter(filter: &Document) -> DocumentStoreResult<()> {
    match filter.keys().find(|key| key.starts_with('$')) {
        Some(key) => Err(DocumentStoreError::Backend(format!(
            "unsupported filter operator {key}"
        ))),
        None => Ok(()),
    }
}

fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

fn filter_matches(document: &Document, filter: &Document) -> bool {
    filter
        .iter()
        .all(|(path, expected)| match lookup(document, path) {
            Some(actual) => actual == expected,
            None => matches!(expected, Bson::Null),
        })
}

/// Returns the value of `key` in each document. Missing values are `None`.
fn key_values(documents: &[StoredDocument], key: &str) -> DocumentStoreResult<Vec<Option<Bson>>> {
    documents
        .iter()
        .map(|slot| match key {
            "_id" => Ok(Some(slot.id.clone())),
            _ => Ok(lookup(&slot.decode()?, key).cloned()),
        })
        .collect()
}

/// Fails if a value of `key` in `batch` repeats one in `stored` or earlier in `batch`.
fn ensure_unique(
    stored: &[StoredDocument],
    batch: &[StoredDocument],
    key: &str,
    collection: &str,
) -> DocumentStoreResult<()> {
    let mut seen: Vec<Bson> = key_values(stored, key)?.into_iter().flatten().collect();

    for value in key_values(batch, key)?.into_iter().flatten() {
        if seen.contains(&value) {
            return Err(DocumentStoreError::DocumentAlreadyExists(
                extjson::bson_to_text(&value),
                collection.to_string(),
            ));
        }
        seen.push(value);
    }

    Ok(())
}

impl InMemoryStore {
    async fn insert_unique_on(
        &self,
        documents: Vec<Document>,
        keys: &[&str],
        collection: &str,
    ) -> DocumentStoreResult<()> {
        let mut encoded = Vec::with_capacity(documents.len());

        for mut document in documents {
            if !document.contains_key("_id") {
                document.insert("_id", ObjectId::new());
            }
            encoded.push(StoredDocument::encode(&document)?);
        }

        let mut store = self.store.write().await;

        // Reject the whole batch before touching the collection.
        let stored = store.get(collection).map(Vec::as_slice).unwrap_or_default();
        for key in keys {
            ensure_unique(stored, &encoded, key, collection)?;
        }

        debug!(
            target: "docbridge::memory",
            collection,
            count = encoded.len(),
            "Stored documents"
        );
        store
            .entry(collection.to_string())
            .or_default()
            .extend(encoded);

        Ok(())
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn insert_documents(&self, documents: Vec<Document>, collection: &str) -> DocumentStoreResult<()> {
        self.insert_unique_on(documents, &["_id"], collection).await
    }

    async fn insert_keyed_documents(
        &self,
        documents: Vec<Document>,
        key: &str,
        collection: &str,
    ) -> DocumentStoreResult<()> {
        match key {
            "_id" => self.insert_unique_on(documents, &["_id"], collection).await,
            _ => self.insert_unique_on(documents, &["_id", key], collection).await,
        }
    }

    async fn replace_document(
        &self,
        filter: Document,
        mut document: Document,
        collection: &str,
    ) -> DocumentStoreResult<bool> {
        validate_filter(&filter)?;

        let mut store = self.store.write().await;
        let Some(stored) = store.get_mut(collection) else {
            return Ok(false);
        };

        for slot in stored.iter_mut() {
            let current = slot.decode()?;
            if !filter_matches(&current, &filter) {
                continue;
            }

            // A replacement keeps the stored identifier.
            document.insert("_id", slot.id.clone());
            *slot = StoredDocument::encode(&document)?;

            trace!(target: "docbridge::memory", collection, "Replaced document");
            return Ok(true);
        }

        Ok(false)
    }

    async fn find_documents(&self, filter: Document, collection: &str) -> DocumentStoreResult<Vec<Document>> {
        validate_filter(&filter)?;

        let store = self.store.read().await;
        let Some(stored) = store.get(collection) else {
            return Ok(vec![]);
        };

        let mut found = Vec::new();
        for slot in stored {
            let document = slot.decode()?;
            if filter_matches(&document, &filter) {
                found.push(document);
            }
        }

        trace!(
            target: "docbridge::memory",
            collection,
            scanned = stored.len(),
            matched = found.len(),
            "Scanned collection"
        );

        Ok(found)
    }

    async fn delete_documents(&self, filter: Document, collection: &str) -> DocumentStoreResult<u64> {
        validate_filter(&filter)?;

        let mut store = self.store.write().await;
        let Some(stored) = store.get_mut(collection) else {
            return Ok(0);
        };

        let flags = stored
            .iter()
            .map(|slot| Ok(filter_matches(&slot.decode()?, &filter)))
            .collect::<DocumentStoreResult<Vec<bool>>>()?;

        let mut flag = flags.iter();
        stored.retain(|_| !flag.next().copied().unwrap_or(false));
        let deleted = flags.iter().filter(|matched| **matched).count() as u64;

        debug!(target: "docbridge::memory", collection, deleted, "Deleted documents");

        Ok(deleted)
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.store
            .write()
            .await
            .remove(name);

        Ok(())
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        let mut names: Vec<String> = self.store
            .read()
            .await
            .keys()
            .cloned()
            .collect();
        names.sort();

        Ok(names)
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
///
/// # Example
///
/// ```ignore
/// use docbridge_memory::InMemoryStore;
/// use docbridge::backend::StoreBackendBuilder;
///
/// #[tokio::main]
/// async fn main() {
///     let store = InMemoryStore::builder().build().await.unwrap();
/// }
/// ```
#[derive(Default)]
pub struct InMemoryStoreBuilder;

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    /// Builds and returns a new [`InMemoryStore`] instance.
    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(InMemoryStore::new())
    }
}
