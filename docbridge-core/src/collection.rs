//! Collection types for document store operations.
//!
//! # Collection Types
//!
//! - [`Collection`] - Untyped collection with explicit BSON documents
//! - [`TypedCollection`] - Type-safe collection for a specific document type
//!
//! Typed collections run every document through the store's [`Codec`]: inserts
//! fill in missing identifiers, lookups by id use the identity field's wire
//! name, and reads decode with the same special-type rules used for writing.
//!
//! # Example
//!
//! ```ignore
//! let users = store.typed_collection::<User>();
//!
//! let stored = users.insert_one(User { id: None, name: "Alice".into() }).await?;
//! let found = users.get(stored.id.clone().unwrap()).await?;
//! ```

use bson::{Bson, Document as BsonDocument};
use std::marker::PhantomData;
use tracing::debug;

use crate::{
    backend::StoreBackend,
    codec::Codec,
    document::{Document, DocumentExt, identity_filter},
    error::{DocumentStoreError, DocumentStoreResult},
    extjson,
};

/// An untyped collection with a reference to a storage backend.
///
/// # Type Parameters
///
/// * `'a` - Lifetime of the backend reference
/// * `B` - The storage backend type
#[derive(Debug)]
pub struct Collection<'a, B: StoreBackend> {
    name: String,
    backend: &'a B,
}

impl<'a, B: StoreBackend> Collection<'a, B> {
    pub(crate) fn new(name: String, backend: &'a B) -> Self {
        Self { name, backend }
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Inserts raw documents.
    ///
    /// # Errors
    ///
    /// Returns a [`DocumentStoreError`] if the operation fails.
    pub async fn insert(&self, documents: Vec<BsonDocument>) -> DocumentStoreResult<()> {
        self.backend
            .insert_documents(documents, self.name())
            .await
    }

    /// Returns the documents matching an equality filter.
    pub async fn find(&self, filter: BsonDocument) -> DocumentStoreResult<Vec<BsonDocument>> {
        self.backend
            .find_documents(filter, self.name())
            .await
    }

    /// Deletes the documents matching an equality filter, returning how many were removed.
    pub async fn delete(&self, filter: BsonDocument) -> DocumentStoreResult<u64> {
        self.backend
            .delete_documents(filter, self.name())
            .await
    }

    /// Counts the documents matching an equality filter.
    pub async fn count(&self, filter: BsonDocument) -> DocumentStoreResult<u64> {
        self.backend
            .count_documents(filter, self.name())
            .await
    }
}

/// A collection of documents of type `D`.
#[derive(Debug)]
pub struct TypedCollection<'a, B: StoreBackend, D: Document> {
    name: String,
    backend: &'a B,
    codec: &'a Codec,
    _marker: PhantomData<fn() -> D>,
}

impl<'a, B: StoreBackend, D: Document> TypedCollection<'a, B, D> {
    pub(crate) fn new(name: String, backend: &'a B, codec: &'a Codec) -> Self {
        Self {
            name,
            backend,
            codec,
            _marker: PhantomData,
        }
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Views the same collection as a different document type.
    pub fn with_type<T: Document>(&self) -> TypedCollection<'a, B, T> {
        TypedCollection::new(self.name.clone(), self.backend, self.codec)
    }

    /// Inserts documents, generating identifiers for those that have none.
    ///
    /// # Returns
    ///
    /// The documents as stored, with their identifiers filled in.
    ///
    /// # Errors
    ///
    /// Returns a [`DocumentStoreError`] if identity generation, encoding or
    /// insertion fails. Nothing is inserted if any document fails to encode.
    pub async fn insert(&self, documents: Vec<D>) -> DocumentStoreResult<Vec<D>> {
        let (stored, encoded): (Vec<D>, Vec<BsonDocument>) = documents
            .into_iter()
            .map(|document| self.codec.encode_for_insert(document))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .unzip();

        debug!(
            target: "docbridge::codec",
            collection = %self.name,
            count = encoded.len(),
            "Inserting documents"
        );

        match D::identity_field() {
            Some(field) => {
                self.backend
                    .insert_keyed_documents(encoded, field.wire_name(), self.name())
                    .await?
            }
            None => {
                self.backend
                    .insert_documents(encoded, self.name())
                    .await?
            }
        }

        Ok(stored)
    }

    /// Inserts a single document. See [`insert`](Self::insert).
    pub async fn insert_one(&self, document: D) -> DocumentStoreResult<D> {
        let mut stored = self.insert(vec![document]).await?;
        stored
            .pop()
            .ok_or_else(|| DocumentStoreError::Backend("insert returned no document".into()))
    }

    /// Looks up a document by its identifier.
    ///
    /// # Arguments
    ///
    /// * `id` - The identifier, in any form convertible to BSON (e.g. `Id<D>`, `ObjectId`, `&str`)
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::MissingIdentity`](crate::error::CodecError::MissingIdentity)
    /// if `D` has no identity field, or a decode error if the stored document
    /// cannot be read as `D`.
    pub async fn get(&self, id: impl Into<Bson>) -> DocumentStoreResult<Option<D>> {
        let filter = identity_filter::<D>(self.codec, id)?;
        Ok(self.find(filter).await?.into_iter().next())
    }

    /// Returns the documents matching an equality filter.
    pub async fn find(&self, filter: BsonDocument) -> DocumentStoreResult<Vec<D>> {
        debug!(
            target: "docbridge::codec",
            collection = %self.name,
            filter = %extjson::document_to_text(&filter),
            "Finding documents"
        );

        self.backend
            .find_documents(filter, self.name())
            .await?
            .into_iter()
            .map(|doc| D::from_document(doc, self.codec))
            .collect()
    }

    /// Returns every document in the collection.
    pub async fn find_all(&self) -> DocumentStoreResult<Vec<D>> {
        self.find(BsonDocument::new()).await
    }

    /// Replaces the stored document with the same identifier.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::DocumentNotFound`] if no stored document has
    /// this document's identifier.
    pub async fn replace(&self, document: &D) -> DocumentStoreResult<()> {
        let filter = document.identity_filter(self.codec)?;
        let encoded = document.to_document(self.codec)?;
        let replaced = self
            .backend
            .replace_document(filter.clone(), encoded, self.name())
            .await?;

        if !replaced {
            return Err(DocumentStoreError::DocumentNotFound(
                extjson::document_to_text(&filter),
                self.name.clone(),
            ));
        }

        Ok(())
    }

    /// Deletes the stored document with the same identifier as `document`.
    ///
    /// # Returns
    ///
    /// `true` if a document was deleted.
    pub async fn delete(&self, document: &D) -> DocumentStoreResult<bool> {
        let filter = document.identity_filter(self.codec)?;
        Ok(self.backend.delete_documents(filter, self.name()).await? > 0)
    }

    /// Deletes the document with the given identifier.
    pub async fn delete_by_id(&self, id: impl Into<Bson>) -> DocumentStoreResult<bool> {
        let filter = identity_filter::<D>(self.codec, id)?;
        Ok(self.backend.delete_documents(filter, self.name()).await? > 0)
    }

    /// Deletes every document matching an equality filter.
    pub async fn delete_many(&self, filter: BsonDocument) -> DocumentStoreResult<u64> {
        self.backend
            .delete_documents(filter, self.name())
            .await
    }

    /// Counts the documents matching an equality filter.
    pub async fn count(&self, filter: BsonDocument) -> DocumentStoreResult<u64> {
        self.backend
            .count_documents(filter, self.name())
            .await
    }
}
