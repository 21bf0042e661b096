//! Storage backend abstraction for the document store.
//!
//! Backends only ever see encoded BSON documents. Encoding, decoding and
//! identity handling happen above them in [`TypedCollection`](crate::collection::TypedCollection),
//! so a backend is a thin adapter over a driver or an in-memory map.
//!
//! # Traits
//!
//! - [`StoreBackend`]: The core trait for storage backends
//! - [`StoreBackendBuilder`]: Factory trait for creating backend instances
//!
//! # Filters
//!
//! Filters are BSON documents. Every backend must support top-level equality
//! filters (`{"_id": ..., "name": "Alice"}`); the empty document matches
//! everything. Backends backed by a real database pass richer filters through
//! to the driver unchanged.
//!
//! # Examples
//!
//! ```ignore
//! use docbridge::backend::StoreBackend;
//! use bson::doc;
//!
//! let backend = MyBackendImpl::new();
//!
//! backend.insert_documents(vec![doc! { "_id": 1, "name": "Alice" }], "users").await?;
//! let found = backend.find_documents(doc! { "name": "Alice" }, "users").await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use bson::Document;
use std::fmt::Debug;

use crate::error::DocumentStoreResult;

/// Abstract interface for document storage backends.
///
/// # Thread Safety
///
/// All implementations must be thread-safe and support concurrent access from multiple
/// async tasks. The exact concurrency model is implementation-specific but should be
/// documented by the implementer.
///
/// # Error Handling
///
/// Operations return [`DocumentStoreResult<T>`](crate::error::DocumentStoreResult).
/// Driver failures are reported as [`DocumentStoreError::Backend`](crate::error::DocumentStoreError::Backend).
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Inserts new documents into a collection.
    ///
    /// # Arguments
    ///
    /// * `documents` - The encoded documents, each carrying its `_id`
    /// * `collection` - The name of the collection to insert into. Created automatically if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::DocumentAlreadyExists`](crate::error::DocumentStoreError::DocumentAlreadyExists)
    /// if a document with the same `_id` is already stored.
    async fn insert_documents(
        &self,
        documents: Vec<Document>,
        collection: &str,
    ) -> DocumentStoreResult<()>;

    /// Inserts new documents that must also be unique on `key`.
    ///
    /// `key` is the wire name of the documents' identity field. Documents
    /// without a value for `key` are not constrained by it.
    ///
    /// The default implementation defers to [`insert_documents`](Self::insert_documents),
    /// which only guarantees uniqueness of `_id`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::DocumentAlreadyExists`](crate::error::DocumentStoreError::DocumentAlreadyExists)
    /// if a stored document, or an earlier document of the batch, has the same `_id` or `key`.
    async fn insert_keyed_documents(
        &self,
        documents: Vec<Document>,
        _key: &str,
        collection: &str,
    ) -> DocumentStoreResult<()> {
        self.insert_documents(documents, collection).await
    }

    /// Replaces the first document matching `filter`.
    ///
    /// # Arguments
    ///
    /// * `filter` - Selects the document to replace
    /// * `document` - The new content
    /// * `collection` - The name of the collection
    ///
    /// # Returns
    ///
    /// Returns `Ok(true)` if a document was replaced and `Ok(false)` if nothing matched.
    async fn replace_document(
        &self,
        filter: Document,
        document: Document,
        collection: &str,
    ) -> DocumentStoreResult<bool>;

    /// Returns every document matching `filter`.
    ///
    /// Documents are returned in insertion order where the backend tracks it.
    async fn find_documents(
        &self,
        filter: Document,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>>;

    /// Deletes every document matching `filter`.
    ///
    /// # Returns
    ///
    /// The number of deleted documents.
    async fn delete_documents(&self, filter: Document, collection: &str) -> DocumentStoreResult<u64>;

    /// Counts the documents matching `filter`.
    async fn count_documents(&self, filter: Document, collection: &str) -> DocumentStoreResult<u64> {
        Ok(self.find_documents(filter, collection).await?.len() as u64)
    }

    /// Drops a collection and all its documents.
    ///
    /// Dropping a collection that doesn't exist is not an error.
    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()>;

    /// Lists the names of all collections in the store.
    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>>;

    /// Cleanly shuts down the backend, releasing all resources.
    ///
    /// The default implementation is a no-op, but backends with external
    /// connections should override this.
    async fn shutdown(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
impl<B> StoreBackend for &B
where
    B: StoreBackend,
{
    async fn insert_documents(
        &self,
        documents: Vec<Document>,
        collection: &str,
    ) -> DocumentStoreResult<()> {
        (*self)
            .insert_documents(documents, collection)
            .await
    }

    async fn insert_keyed_documents(
        &self,
        documents: Vec<Document>,
        key: &str,
        collection: &str,
    ) -> DocumentStoreResult<()> {
        (*self)
            .insert_keyed_documents(documents, key, collection)
            .await
    }

    async fn replace_document(
        &self,
        filter: Document,
        document: Document,
        collection: &str,
    ) -> DocumentStoreResult<bool> {
        (*self)
            .replace_document(filter, document, collection)
            .await
    }

    async fn find_documents(
        &self,
        filter: Document,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>> {
        (*self)
            .find_documents(filter, collection)
            .await
    }

    async fn delete_documents(&self, filter: Document, collection: &str) -> DocumentStoreResult<u64> {
        (*self)
            .delete_documents(filter, collection)
            .await
    }

    async fn count_documents(&self, filter: Document, collection: &str) -> DocumentStoreResult<u64> {
        (*self)
            .count_documents(filter, collection)
            .await
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        (*self).drop_collection(name).await
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        (*self).list_collections().await
    }
}

/// Factory for backends that need asynchronous setup, such as opening a connection.
///
/// # Example
///
/// ```ignore
/// let backend = InMemoryStore::builder().build().await?;
/// ```
#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
