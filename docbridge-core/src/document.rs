//! Core traits for typed documents.
//!
//! A [`Document`] is any serde type with an identity (possibly none) and a
//! collection name. All conversions go through a [`Codec`], so special types
//! nested in a document are written with their dedicated BSON elements.

use bson::{Bson, Document as BsonDocument};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    codec::Codec,
    error::{CodecError, DocumentStoreResult},
    identity::Identified,
};

/// Core trait that all documents stored in a document store must implement.
///
/// # Deriving
///
/// `Document` itself is implemented by hand, but its identity super-trait is
/// derived:
///
/// ```ignore
/// use docbridge::{Document, Identity, id::Id};
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize, Identity)]
/// pub struct User {
///     #[serde(rename = "_id", skip_serializing_if = "Option::is_none", default)]
///     pub id: Option<Id<User>>,
///     pub name: String,
/// }
///
/// impl Document for User {
///     fn collection_name() -> &'static str {
///         "users"
///     }
/// }
/// ```
pub trait Document: Serialize + DeserializeOwned + Identified + Send + Sync + 'static {
    /// Returns the name of the collection this document belongs to.
    ///
    /// This should be a static, lowercase identifier (e.g., "users", "products").
    fn collection_name() -> &'static str;
}

/// Extension trait providing codec-backed conversions for documents.
///
/// This trait is automatically implemented for all types that implement [`Document`].
pub trait DocumentExt: Document {
    /// Encodes this document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not encode to a BSON document.
    fn to_document(&self, codec: &Codec) -> DocumentStoreResult<BsonDocument>;

    /// Decodes a document.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding fails or the structure is invalid.
    fn from_document(document: BsonDocument, codec: &Codec) -> DocumentStoreResult<Self>;

    /// Renders this document as extended JSON text.
    fn to_text(&self, codec: &Codec) -> DocumentStoreResult<String>;

    /// Builds the equality filter selecting this document by its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::MissingIdentity`] or [`CodecError::UnsetIdentity`]
    /// if the document has no identifier to filter on.
    fn identity_filter(&self, codec: &Codec) -> DocumentStoreResult<BsonDocument>;
}

impl<D: Document> DocumentExt for D {
    fn to_document(&self, codec: &Codec) -> DocumentStoreResult<BsonDocument> {
        Ok(codec.encode_document(self)?)
    }

    fn from_document(document: BsonDocument, codec: &Codec) -> DocumentStoreResult<Self> {
        Ok(codec.decode_document(document)?)
    }

    fn to_text(&self, codec: &Codec) -> DocumentStoreResult<String> {
        Ok(codec.to_text(self)?)
    }

    fn identity_filter(&self, codec: &Codec) -> DocumentStoreResult<BsonDocument> {
        let id = codec.document_id(self)?;
        identity_filter::<D>(codec, id)
    }
}

/// Builds `{<identity wire name>: id}` for the document type `D`.
///
/// # Errors
///
/// Returns [`CodecError::MissingIdentity`] if `D` has no identity field.
pub fn identity_filter<D: Document>(codec: &Codec, id: impl Into<Bson>) -> DocumentStoreResult<BsonDocument> {
    let field = codec
        .find_identity_field::<D>()
        .ok_or_else(|| CodecError::MissingIdentity(std::any::type_name::<D>().to_string()))?;

    let mut filter = BsonDocument::new();
    filter.insert(field.wire_name(), id.into());
    Ok(filter)
}
