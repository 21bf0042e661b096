//! Main document store interface for interacting with document backends.
//!
//! A [`DocumentStore`] pairs a backend with the [`Codec`] used to encode and
//! decode its documents. The codec is shared behind an `Arc`, so several
//! stores can reuse the same memo tables.
//!
//! # Example
//!
//! ```ignore
//! use docbridge::{store::DocumentStore, memory::InMemoryStore};
//!
//! let store = DocumentStore::new(InMemoryStore::new());
//! let users = store.typed_collection::<User>();
//! ```

use std::sync::Arc;

use crate::{
    backend::StoreBackend,
    codec::Codec,
    collection::{Collection, TypedCollection},
    document::Document,
    error::DocumentStoreResult,
};

/// A document store bound to a specific backend implementation.
///
/// # Type Parameters
///
/// * `B` - The backend implementation type
#[derive(Debug)]
pub struct DocumentStore<B: StoreBackend> {
    backend: B,
    codec: Arc<Codec>,
}

impl<B: StoreBackend> DocumentStore<B> {
    /// Creates a new document store with the given backend and a default codec.
    pub fn new(backend: B) -> Self {
        Self::with_codec(backend, Arc::new(Codec::default()))
    }

    /// Creates a new document store sharing an existing codec.
    pub fn with_codec(backend: B, codec: Arc<Codec>) -> Self {
        Self { backend, codec }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn codec(&self) -> &Arc<Codec> {
        &self.codec
    }

    /// Gets a typed collection for the specified document type.
    ///
    /// The collection name is determined by the document type's `collection_name()` method.
    pub fn typed_collection<'a, D: Document>(&'a self) -> TypedCollection<'a, B, D> {
        TypedCollection::new(D::collection_name().to_string(), &self.backend, &self.codec)
    }

    /// Gets an untyped collection with the given name.
    pub fn collection<'a>(&'a self, name: &str) -> Collection<'a, B> {
        Collection::new(name.to_string(), &self.backend)
    }

    /// Drops (deletes) a collection with the given name.
    pub async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.backend.drop_collection(name).await
    }

    /// Lists all collections in the store.
    pub async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        self.backend.list_collections().await
    }

    /// Shuts down the store and releases backend resources.
    ///
    /// # Errors
    ///
    /// Returns an error if the shutdown operation fails.
    pub async fn shutdown(self) -> DocumentStoreResult<()> {
        self.backend.shutdown().await?;

        Ok(())
    }
}
