//! Error types and result types for codec and document store operations.
//!
//! Codec failures are reported as [`CodecError`] and use [`CodecResult<T>`].
//! Backend and collection operations use [`DocumentStoreResult<T>`], whose error
//! type wraps codec failures so callers can still match on them.

use bson::{error::Error as BsonError, spec::ElementType};
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

use crate::shape::WireShape;

/// Represents all possible errors raised while encoding or decoding values.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The wire value seen during decode does not match any shape accepted by the target type.
    #[error("Type mismatch: expected {expected}, found {found:?}")]
    TypeMismatch {
        /// The shape the target type accepts.
        expected: WireShape,
        /// The BSON element type that was actually read.
        found: ElementType,
    },
    /// An identifier wraps an underlying kind that cannot be written.
    #[error("Unsupported identifier kind: {0}")]
    UnsupportedIdentifierKind(String),
    /// An identity field's declared type cannot hold a generated identifier.
    #[error("Unsupported identity type: {0}")]
    UnsupportedIdentityType(String),
    /// The document type has no identity field, but the operation requires one.
    #[error("Document type {0} has no identity field")]
    MissingIdentity(String),
    /// The document type has an identity field, but it holds no value.
    #[error("Document of type {0} has an unset identity")]
    UnsetIdentity(String),
    /// A textual extended JSON envelope is malformed.
    #[error("Invalid extended JSON: {0}")]
    InvalidExtendedJson(String),
    /// A decimal literal cannot be represented as a Decimal128.
    #[error("Invalid decimal: {0}")]
    InvalidDecimal(String),
    /// Serialization/deserialization error raised by the structural mapper.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// The underlying byte stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized `Result` type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

impl CodecError {
    /// Builds a [`CodecError::TypeMismatch`] for the observed BSON value.
    pub fn mismatch(expected: WireShape, found: &bson::Bson) -> Self {
        CodecError::TypeMismatch {
            expected,
            found: found.element_type(),
        }
    }
}

impl From<BsonError> for CodecError {
    fn from(err: BsonError) -> Self {
        CodecError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for CodecError {
    fn from(err: SerdeJsonError) -> Self {
        CodecError::Serialization(err.to_string())
    }
}

/// Represents all possible errors that can occur when interacting with a document store.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// Encoding or decoding a document failed.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// Error during store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// A document with the given ID already exists in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DocumentAlreadyExists(String, String),
    /// The requested document was not found in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document not found {0} in collection {1}")]
    DocumentNotFound(String, String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A specialized `Result` type for document store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Codec(err.into())
    }
}
