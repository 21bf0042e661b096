//! Identity field discovery and identifier generation.
//!
//! A document type exposes its identity field through the [`Identified`] trait,
//! normally implemented by `#[derive(Identity)]`. The [`IdentityResolver`]
//! memoizes that lookup per type and uses it to read the current identifier,
//! to fill in a missing one before insert, and to demand one for lookups.
//!
//! Only optional identity fields can be generated. A present value is never
//! overwritten, even when it looks like a zero value.

use std::{
    any::{Any, TypeId, type_name},
    fmt,
    sync::Arc,
};

use bson::{Bson, oid::ObjectId, ser::serialize_to_bson};
use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

use crate::{
    error::{CodecError, CodecResult},
    id::{Id, IdGenerator},
};

/// A value that can sit in an identity field.
pub trait IdentityValue: Send + Sync + 'static {
    /// Returns the identifier as BSON, or `None` when it is unset.
    fn current(&self) -> CodecResult<Option<Bson>>;

    /// Generates an identifier if none is set. Returns `true` if one was generated.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnsupportedIdentityType`] when the field's type
    /// cannot hold a generated identifier.
    fn fill(&mut self, generator: IdGenerator) -> CodecResult<bool>;
}

/// Types that can hold a freshly generated identifier.
pub trait GeneratedIdentity: Serialize + Send + Sync + Sized + 'static {
    fn generate(generator: IdGenerator) -> CodecResult<Self>;
}

impl GeneratedIdentity for ObjectId {
    fn generate(_: IdGenerator) -> CodecResult<Self> {
        Ok(ObjectId::new())
    }
}

impl GeneratedIdentity for String {
    fn generate(generator: IdGenerator) -> CodecResult<Self> {
        Ok(generator.generate_string())
    }
}

impl<T: 'static> GeneratedIdentity for Id<T> {
    fn generate(generator: IdGenerator) -> CodecResult<Self> {
        Ok(generator.generate())
    }
}

macro_rules! impl_not_generated {
    ($($ty:ty),*) => {
        $(
            impl GeneratedIdentity for $ty {
                fn generate(_: IdGenerator) -> CodecResult<Self> {
                    Err(CodecError::UnsupportedIdentityType(type_name::<Self>().to_string()))
                }
            }
        )*
    };
}

impl_not_generated!(i32, i64, u32, u64, uuid::Uuid, bson::Uuid);

macro_rules! impl_present_identity {
    ($($ty:ty),*) => {
        $(
            impl IdentityValue for $ty {
                fn current(&self) -> CodecResult<Option<Bson>> {
                    Ok(Some(serialize_to_bson(self)?))
                }

                fn fill(&mut self, _: IdGenerator) -> CodecResult<bool> {
                    Ok(false)
                }
            }
        )*
    };
}

impl_present_identity!(ObjectId, String, i32, i64, u32, u64, uuid::Uuid, bson::Uuid);

impl<T: 'static> IdentityValue for Id<T> {
    fn current(&self) -> CodecResult<Option<Bson>> {
        Ok(Some(self.to_bson()))
    }

    fn fill(&mut self, _: IdGenerator) -> CodecResult<bool> {
        Ok(false)
    }
}

impl<V: GeneratedIdentity> IdentityValue for Option<V> {
    fn current(&self) -> CodecResult<Option<Bson>> {
        self.as_ref()
            .map(|value| serialize_to_bson(value).map_err(CodecError::from))
            .transpose()
    }

    fn fill(&mut self, generator: IdGenerator) -> CodecResult<bool> {
        if self.is_some() {
            return Ok(false);
        }
        *self = Some(V::generate(generator)?);
        Ok(true)
    }
}

/// Accessors for the identity field of a document type `D`.
pub struct IdentityField<D> {
    name: &'static str,
    wire_name: &'static str,
    get: fn(&D) -> &dyn IdentityValue,
    get_mut: fn(&mut D) -> &mut dyn IdentityValue,
}

impl<D> IdentityField<D> {
    /// Describes an identity field.
    ///
    /// # Arguments
    ///
    /// * `name` - The Rust field name
    /// * `wire_name` - The key the field is stored under
    /// * `get` / `get_mut` - Accessors returning the field
    pub const fn new(
        name: &'static str,
        wire_name: &'static str,
        get: fn(&D) -> &dyn IdentityValue,
        get_mut: fn(&mut D) -> &mut dyn IdentityValue,
    ) -> Self {
        Self {
            name,
            wire_name,
            get,
            get_mut,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The key used for this field in stored documents and filters.
    pub fn wire_name(&self) -> &'static str {
        self.wire_name
    }

    pub fn value<'a>(&self, document: &'a D) -> &'a dyn IdentityValue {
        (self.get)(document)
    }

    pub fn value_mut<'a>(&self, document: &'a mut D) -> &'a mut dyn IdentityValue {
        (self.get_mut)(document)
    }
}

impl<D> Clone for IdentityField<D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D> Copy for IdentityField<D> {}

impl<D> fmt::Debug for IdentityField<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityField")
            .field("name", &self.name)
            .field("wire_name", &self.wire_name)
            .finish()
    }
}

/// A document type with at most one identity field.
///
/// Usually derived:
///
/// ```ignore
/// #[derive(Serialize, Deserialize, Identity)]
/// struct User {
///     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
///     id: Option<Id<User>>,
///     name: String,
/// }
/// ```
pub trait Identified: Sized + 'static {
    /// Returns the identity field, or `None` if the type has none.
    fn identity_field() -> Option<IdentityField<Self>> {
        None
    }
}

/// Memoizes identity fields per document type.
#[derive(Default)]
pub struct IdentityResolver {
    fields: DashMap<TypeId, Option<Arc<dyn Any + Send + Sync>>>,
}

impl IdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the identity field of `D`, resolving it once per type.
    pub fn find_identity_field<D: Identified>(&self) -> Option<IdentityField<D>> {
        let type_id = TypeId::of::<D>();
        if let Some(entry) = self.fields.get(&type_id) {
            return entry
                .as_ref()
                .and_then(|field| field.downcast_ref::<IdentityField<D>>().copied());
        }

        let field = D::identity_field();
        debug!(
            target: "docbridge::identity",
            type_name = type_name::<D>(),
            field = ?field.map(|f| f.name()),
            "Resolved identity field"
        );
        self.fields
            .entry(type_id)
            .or_insert_with(|| field.map(|f| Arc::new(f) as Arc<dyn Any + Send + Sync>));
        field
    }

    /// Returns the identifier of `document`, or `None` if the type has no identity
    /// field or the field is unset.
    pub fn identity_value<D: Identified>(&self, document: &D) -> CodecResult<Option<Bson>> {
        match self.find_identity_field::<D>() {
            Some(field) => field.value(document).current(),
            None => Ok(None),
        }
    }

    /// Fills an unset identity field with a new identifier.
    ///
    /// Documents without an identity field, and documents whose identifier is
    /// already set, are returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnsupportedIdentityType`] if an identifier must be
    /// generated for a field type that cannot hold one.
    pub fn ensure_identity_present<D: Identified>(
        &self,
        mut document: D,
        generator: IdGenerator,
    ) -> CodecResult<D> {
        if let Some(field) = self.find_identity_field::<D>()
            && field.value_mut(&mut document).fill(generator)?
        {
            debug!(
                target: "docbridge::identity",
                type_name = type_name::<D>(),
                field = field.name(),
                ?generator,
                "Generated identifier"
            );
        }
        Ok(document)
    }

    /// Returns the identifier of `document`, failing when there is none.
    ///
    /// # Errors
    ///
    /// * [`CodecError::MissingIdentity`] - `D` has no identity field
    /// * [`CodecError::UnsetIdentity`] - the identity field holds no value
    pub fn document_id<D: Identified>(&self, document: &D) -> CodecResult<Bson> {
        let field = self
            .find_identity_field::<D>()
            .ok_or_else(|| CodecError::MissingIdentity(type_name::<D>().to_string()))?;
        field
            .value(document)
            .current()?
            .ok_or_else(|| CodecError::UnsetIdentity(type_name::<D>().to_string()))
    }

    /// Number of document types resolved so far.
    pub fn resolved_types(&self) -> usize {
        self.fields.len()
    }
}

impl fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityResolver")
            .field("resolved_types", &self.fields.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Tagged {
        id: Option<Id<Tagged>>,
    }

    impl Identified for Tagged {
        fn identity_field() -> Option<IdentityField<Self>> {
            Some(IdentityField::new("id", "_id", |d| &d.id, |d| &mut d.id))
        }
    }

    #[derive(Debug)]
    struct Counter {
        id: Option<i64>,
    }

    impl Identified for Counter {
        fn identity_field() -> Option<IdentityField<Self>> {
            Some(IdentityField::new("id", "_id", |d| &d.id, |d| &mut d.id))
        }
    }

    struct Named {
        id: String,
    }

    impl Identified for Named {
        fn identity_field() -> Option<IdentityField<Self>> {
            Some(IdentityField::new("id", "_id", |d| &d.id, |d| &mut d.id))
        }
    }

    struct Anonymous;

    impl Identified for Anonymous {}

    #[test]
    fn test_generates_only_when_unset() {
        let resolver = IdentityResolver::new();

        let filled = resolver
            .ensure_identity_present(Tagged { id: None }, IdGenerator::ObjectId)
            .unwrap();
        let first = filled.id.clone().unwrap();
        let again = resolver.ensure_identity_present(filled, IdGenerator::ObjectId).unwrap();

        assert!(first.as_object_id().is_some());
        assert_eq!(again.id, Some(first));
    }

    #[test]
    fn test_uuid_generator_produces_text_ids() {
        let resolver = IdentityResolver::new();

        let doc = resolver
            .ensure_identity_present(Tagged { id: None }, IdGenerator::UuidString)
            .unwrap();

        assert_eq!(doc.id.unwrap().as_str().map(str::len), Some(36));
    }

    #[test]
    fn test_present_zero_values_are_kept() {
        let resolver = IdentityResolver::new();

        let counter = resolver
            .ensure_identity_present(Counter { id: Some(0) }, IdGenerator::ObjectId)
            .unwrap();
        let named = resolver
            .ensure_identity_present(Named { id: String::new() }, IdGenerator::ObjectId)
            .unwrap();

        assert_eq!(counter.id, Some(0));
        assert_eq!(named.id, "");
    }

    #[test]
    fn test_unsupported_kind_fails_only_when_generating() {
        let resolver = IdentityResolver::new();

        let err = resolver
            .ensure_identity_present(Counter { id: None }, IdGenerator::ObjectId)
            .unwrap_err();

        assert!(matches!(err, CodecError::UnsupportedIdentityType(name) if name == "i64"));
    }

    #[test]
    fn test_document_id_distinguishes_missing_from_unset() {
        let resolver = IdentityResolver::new();

        assert!(matches!(
            resolver.document_id(&Anonymous),
            Err(CodecError::MissingIdentity(_))
        ));
        assert!(matches!(
            resolver.document_id(&Tagged { id: None }),
            Err(CodecError::UnsetIdentity(_))
        ));
        assert_eq!(
            resolver.document_id(&Counter { id: Some(9) }).unwrap(),
            Bson::Int64(9)
        );
    }

    #[test]
    fn test_absent_identity_reads_as_none() {
        let resolver = IdentityResolver::new();

        assert_eq!(resolver.identity_value(&Anonymous).unwrap(), None);
        assert_eq!(resolver.identity_value(&Tagged { id: None }).unwrap(), None);
    }

    #[test]
    fn test_fields_are_resolved_once_per_type() {
        let resolver = IdentityResolver::new();

        resolver.find_identity_field::<Tagged>();
        resolver.find_identity_field::<Tagged>();
        resolver.find_identity_field::<Anonymous>();

        assert_eq!(resolver.resolved_types(), 2);
        assert_eq!(resolver.find_identity_field::<Tagged>().map(|f| f.wire_name()), Some("_id"));
        assert!(resolver.find_identity_field::<Anonymous>().is_none());
    }
}
