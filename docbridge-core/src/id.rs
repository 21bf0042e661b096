//! Typed document identifiers.
//!
//! [`Id<T>`] is the identifier of a document of type `T`. It wraps exactly one
//! underlying [`IdValue`]: either a plain string or a 12-byte object id. On the
//! wire it is written as that underlying value, so a stored identifier keeps the
//! kind it was created with.

use std::{fmt, hash::Hash, marker::PhantomData, str::FromStr};

use bson::{Bson, oid::ObjectId};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};
use uuid::Uuid;

use crate::{
    error::{CodecError, CodecResult},
    shape::WireShape,
};

/// Newtype name `Id<T>` serializes under, so the classifier can recognise it.
pub(crate) const ID_NEWTYPE_NAME: &str = "$__docbridge_id";

/// The concrete wire form behind an [`Id<T>`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdValue {
    /// A textual identifier.
    String(String),
    /// A database-generated object id.
    ObjectId(ObjectId),
}

impl IdValue {
    /// Returns the BSON form of this value.
    pub fn to_bson(&self) -> Bson {
        match self {
            IdValue::String(s) => Bson::String(s.clone()),
            IdValue::ObjectId(oid) => Bson::ObjectId(*oid),
        }
    }
}

impl fmt::Display for IdValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdValue::String(s) => f.write_str(s),
            IdValue::ObjectId(oid) => write!(f, "{}", oid.to_hex()),
        }
    }
}

/// Identifier of a document of type `T`.
///
/// ```ignore
/// use docbridge::id::Id;
///
/// let id: Id<User> = Id::new();
/// assert!(id.as_object_id().is_some());
/// ```
pub struct Id<T> {
    value: IdValue,
    marker: PhantomData<fn() -> T>,
}

impl<T> Id<T> {
    /// Creates a fresh object-id backed identifier.
    pub fn new() -> Self {
        Self::from_object_id(ObjectId::new())
    }

    pub fn from_object_id(oid: ObjectId) -> Self {
        Self::from_value(IdValue::ObjectId(oid))
    }

    pub fn from_string(value: impl Into<String>) -> Self {
        Self::from_value(IdValue::String(value.into()))
    }

    pub fn from_value(value: IdValue) -> Self {
        Self {
            value,
            marker: PhantomData,
        }
    }

    /// Wraps a BSON value read from the wire.
    ///
    /// Strings become textual identifiers and object ids become object-id
    /// identifiers. Any other kind is rejected.
    pub fn try_from_bson(bson: Bson) -> CodecResult<Self> {
        match bson {
            Bson::String(s) => Ok(Self::from_string(s)),
            Bson::ObjectId(oid) => Ok(Self::from_object_id(oid)),
            Bson::Document(doc) => match doc.get_str("$oid") {
                Ok(hex) => ObjectId::parse_str(hex)
                    .map(Self::from_object_id)
                    .map_err(|e| CodecError::InvalidExtendedJson(e.to_string())),
                Err(_) => Err(CodecError::UnsupportedIdentifierKind(format!("document {doc}"))),
            },
            other => Err(CodecError::UnsupportedIdentifierKind(format!("{:?}", other.element_type()))),
        }
    }

    /// Returns the underlying value.
    pub fn value(&self) -> &IdValue {
        &self.value
    }

    /// Unwraps the identifier into its underlying value.
    pub fn into_value(self) -> IdValue {
        self.value
    }

    pub fn as_object_id(&self) -> Option<&ObjectId> {
        match &self.value {
            IdValue::ObjectId(oid) => Some(oid),
            IdValue::String(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            IdValue::String(s) => Some(s),
            IdValue::ObjectId(_) => None,
        }
    }

    /// The shape this identifier is written with.
    pub fn shape(&self) -> WireShape {
        match self.value {
            IdValue::String(_) => WireShape::String,
            IdValue::ObjectId(_) => WireShape::Identifier,
        }
    }

    pub fn to_bson(&self) -> Bson {
        self.value.to_bson()
    }

    /// Reinterprets this identifier as the identifier of another document type.
    pub fn cast<U>(self) -> Id<U> {
        Id::from_value(self.value)
    }
}

impl<T> Default for Id<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        Self::from_value(self.value.clone())
    }
}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Eq for Id<T> {}

impl<T> Hash for Id<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Id").field(&self.value).finish()
    }
}

impl<T> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

impl<T> From<ObjectId> for Id<T> {
    fn from(oid: ObjectId) -> Self {
        Self::from_object_id(oid)
    }
}

impl<T> From<String> for Id<T> {
    fn from(value: String) -> Self {
        Self::from_string(value)
    }
}

impl<T> From<&str> for Id<T> {
    fn from(value: &str) -> Self {
        Self::from_string(value)
    }
}

impl<T> From<Id<T>> for Bson {
    fn from(id: Id<T>) -> Self {
        id.to_bson()
    }
}

/// Parses a 24-digit hex string as an object id, anything else as a textual id.
impl<T> FromStr for Id<T> {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match ObjectId::parse_str(s) {
            Ok(oid) => Self::from_object_id(oid),
            Err(_) => Self::from_string(s),
        })
    }
}

impl<T> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.value {
            IdValue::String(s) => serializer.serialize_newtype_struct(ID_NEWTYPE_NAME, s),
            IdValue::ObjectId(oid) => serializer.serialize_newtype_struct(ID_NEWTYPE_NAME, oid),
        }
    }
}

impl<'de, T> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Id::try_from_bson(Bson::deserialize(deserializer)?).map_err(D::Error::custom)
    }
}

/// Strategy used to create identifiers for documents inserted without one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdGenerator {
    /// New object ids (hex encoded when the field is a string).
    #[default]
    ObjectId,
    /// Random version 4 UUIDs rendered as hyphenated strings.
    UuidString,
}

impl IdGenerator {
    /// Generates a new typed identifier.
    pub fn generate<T>(self) -> Id<T> {
        match self {
            IdGenerator::ObjectId => Id::new(),
            IdGenerator::UuidString => Id::from_string(Uuid::new_v4().to_string()),
        }
    }

    /// Generates a new identifier rendered as a string.
    pub fn generate_string(self) -> String {
        match self {
            IdGenerator::ObjectId => ObjectId::new().to_hex(),
            IdGenerator::UuidString => Uuid::new_v4().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use bson::{doc, ser::serialize_to_bson};

    use super::*;

    struct Order;

    #[test]
    fn test_object_id_unwraps_to_same_bytes() {
        let oid = ObjectId::from_bytes([1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
        let id: Id<Order> = Id::from(oid);

        assert_eq!(id.as_object_id(), Some(&oid));
        assert_eq!(id.as_str(), None);
        assert_eq!(id.into_value(), IdValue::ObjectId(oid));
    }

    #[test]
    fn test_wrap_preserves_stored_kind() {
        let hex = ObjectId::new().to_hex();
        let textual: Id<Order> = Id::try_from_bson(Bson::String(hex.clone())).unwrap();

        assert_eq!(textual.as_str(), Some(hex.as_str()));
        assert_eq!(textual.shape(), WireShape::String);
    }

    #[test]
    fn test_wrap_accepts_oid_envelope() {
        let oid = ObjectId::new();
        let id: Id<Order> = Id::try_from_bson(Bson::Document(doc! { "$oid": oid.to_hex() })).unwrap();

        assert_eq!(id.as_object_id(), Some(&oid));
    }

    #[test]
    fn test_wrap_rejects_other_kinds() {
        let err = Id::<Order>::try_from_bson(Bson::Int64(7)).unwrap_err();

        assert!(matches!(err, CodecError::UnsupportedIdentifierKind(_)));
    }

    #[test]
    fn test_serializes_as_underlying_value() {
        let oid = ObjectId::new();

        assert_eq!(serialize_to_bson(&Id::<Order>::from(oid)).unwrap(), Bson::ObjectId(oid));
        assert_eq!(
            serialize_to_bson(&Id::<Order>::from("order-1")).unwrap(),
            Bson::String("order-1".into())
        );
    }

    #[test]
    fn test_from_str_detects_object_ids() {
        let oid = ObjectId::new();

        assert_eq!(oid.to_hex().parse::<Id<Order>>().unwrap().as_object_id(), Some(&oid));
        assert_eq!("plain".parse::<Id<Order>>().unwrap().as_str(), Some("plain"));
    }

    #[test]
    fn test_generators_produce_requested_kind() {
        assert!(IdGenerator::ObjectId.generate::<Order>().as_object_id().is_some());
        assert!(IdGenerator::UuidString.generate::<Order>().as_str().is_some());
        assert_eq!(IdGenerator::ObjectId.generate_string().len(), 24);
        assert_eq!(IdGenerator::UuidString.generate_string().len(), 36);
    }
}
