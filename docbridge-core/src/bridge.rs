//! Serde adapters that send nested special values through the registry.
//!
//! The structural mapper only sees serde data model calls, so a
//! `DateTime<Utc>` inside a struct would otherwise be written as the RFC 3339
//! string its own `Serialize` impl produces. [`Routed`] and
//! [`RoutingDeserializer`] wrap the BSON serializer and deserializer; every
//! nested value whose type routes through the registry is handed to the
//! [`SpecialTypeRegistry`] instead.
//!
//! Type ids need `'static`, which serde's type parameters are not, so nested
//! values are matched with [`SpecialKind::named`].

use std::any::type_name;
use std::fmt;

use bson::{Bson, ser::serialize_to_bson};
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{
        self, DeserializeOwned, DeserializeSeed, EnumAccess, Error as _, MapAccess, SeqAccess,
        VariantAccess, Visitor,
    },
    ser::{
        Error as _, SerializeMap, SerializeSeq, SerializeStruct, SerializeStructVariant, SerializeTuple,
        SerializeTupleStruct, SerializeTupleVariant,
    },
};

use crate::{
    error::{CodecError, CodecResult},
    registry::{SpecialKind, SpecialTypeRegistry},
};

/// Newtype names with this prefix are private markers of bson or docbridge.
const MARKER_PREFIX: &str = "$__";

fn routed_kind<T: ?Sized>() -> Option<SpecialKind> {
    SpecialKind::named(type_name::<T>()).filter(|kind| kind.routes_nested())
}

/// Serializes `value` with the BSON serializer, routing nested special values.
pub(crate) fn to_bson<T: Serialize + ?Sized>(registry: &SpecialTypeRegistry, value: &T) -> CodecResult<Bson> {
    Ok(serialize_to_bson(&Routed { value, registry })?)
}

/// Deserializes `bson` with the BSON deserializer, routing nested special values.
pub(crate) fn from_bson<T: DeserializeOwned>(registry: &SpecialTypeRegistry, bson: Bson) -> CodecResult<T> {
    let deserializer = RoutingDeserializer {
        inner: bson::de::Deserializer::new(bson),
        registry,
    };
    Ok(T::deserialize(deserializer)?)
}

/// A value about to be written, together with the registry it may route to.
struct Routed<'a, T: ?Sized> {
    value: &'a T,
    registry: &'a SpecialTypeRegistry,
}

impl<T: Serialize + ?Sized> Serialize for Routed<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let Some(kind) = routed_kind::<T>() else {
            return self.value.serialize(RoutingSerializer {
                inner: serializer,
                registry: self.registry,
            });
        };

        let element = serialize_to_bson(self.value)
            .map_err(CodecError::from)
            .and_then(|serde_form| self.registry.encode_serde_form(kind, serde_form))
            .map_err(S::Error::custom)?;
        element.serialize(serializer)
    }
}

struct RoutingSerializer<'a, S> {
    inner: S,
    registry: &'a SpecialTypeRegistry,
}

macro_rules! forward_serialize {
    ($($method:ident($ty:ty)),* $(,)?) => {
        $(
            fn $method(self, v: $ty) -> Result<S::Ok, S::Error> {
                self.inner.$method(v)
            }
        )*
    };
}

impl<'a, S: Serializer> Serializer for RoutingSerializer<'a, S> {
    type Ok = S::Ok;
    type Error = S::Error;
    type SerializeSeq = RoutingCompound<'a, S::SerializeSeq>;
    type SerializeTuple = RoutingCompound<'a, S::SerializeTuple>;
    type SerializeTupleStruct = RoutingCompound<'a, S::SerializeTupleStruct>;
    type SerializeTupleVariant = RoutingCompound<'a, S::SerializeTupleVariant>;
    type SerializeMap = RoutingCompound<'a, S::SerializeMap>;
    type SerializeStruct = RoutingCompound<'a, S::SerializeStruct>;
    type SerializeStructVariant = RoutingCompound<'a, S::SerializeStructVariant>;

    forward_serialize!(
        serialize_bool(bool),
        serialize_i8(i8),
        serialize_i16(i16),
        serialize_i32(i32),
        serialize_i64(i64),
        serialize_i128(i128),
        serialize_u8(u8),
        serialize_u16(u16),
        serialize_u32(u32),
        serialize_u64(u64),
        serialize_u128(u128),
        serialize_f32(f32),
        serialize_f64(f64),
        serialize_char(char),
        serialize_str(&str),
        serialize_bytes(&[u8]),
        serialize_unit_struct(&'static str),
    );

    fn serialize_none(self) -> Result<S::Ok, S::Error> {
        self.inner.serialize_none()
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<S::Ok, S::Error> {
        self.inner.serialize_some(&Routed {
            value,
            registry: self.registry,
        })
    }

    fn serialize_unit(self) -> Result<S::Ok, S::Error> {
        self.inner.serialize_unit()
    }

    fn serialize_unit_variant(
        self,
        name: &'static str,
        variant_index: u32,
        variant: &'static str,
    ) -> Result<S::Ok, S::Error> {
        self.inner.serialize_unit_variant(name, variant_index, variant)
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        name: &'static str,
        value: &T,
    ) -> Result<S::Ok, S::Error> {
        // Marker newtypes expect the inner value's own serde form.
        if name.starts_with(MARKER_PREFIX) {
            return self.inner.serialize_newtype_struct(name, value);
        }
        self.inner.serialize_newtype_struct(
            name,
            &Routed {
                value,
                registry: self.registry,
            },
        )
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        name: &'static str,
        variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<S::Ok, S::Error> {
        self.inner.serialize_newtype_variant(
            name,
            variant_index,
            variant,
            &Routed {
                value,
                registry: self.registry,
            },
        )
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<Self::SerializeSeq, S::Error> {
        let registry = self.registry;
        Ok(RoutingCompound {
            inner: self.inner.serialize_seq(len)?,
            registry,
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<Self::SerializeTuple, S::Error> {
        let registry = self.registry;
        Ok(RoutingCompound {
            inner: self.inner.serialize_tuple(len)?,
            registry,
        })
    }

    fn serialize_tuple_struct(
        self,
        name: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleStruct, S::Error> {
        let registry = self.registry;
        Ok(RoutingCompound {
            inner: self.inner.serialize_tuple_struct(name, len)?,
            registry,
        })
    }

    fn serialize_tuple_variant(
        self,
        name: &'static str,
        variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleVariant, S::Error> {
        let registry = self.registry;
        Ok(RoutingCompound {
            inner: self
                .inner
                .serialize_tuple_variant(name, variant_index, variant, len)?,
            registry,
        })
    }

    fn serialize_map(self, len: Option<usize>) -> Result<Self::SerializeMap, S::Error> {
        let registry = self.registry;
        Ok(RoutingCompound {
            inner: self.inner.serialize_map(len)?,
            registry,
        })
    }

    fn serialize_struct(self, name: &'static str, len: usize) -> Result<Self::SerializeStruct, S::Error> {
        let registry = self.registry;
        Ok(RoutingCompound {
            inner: self.inner.serialize_struct(name, len)?,
            registry,
        })
    }

    fn serialize_struct_variant(
        self,
        name: &'static str,
        variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<Self::SerializeStructVariant, S::Error> {
        let registry = self.registry;
        Ok(RoutingCompound {
            inner: self
                .inner
                .serialize_struct_variant(name, variant_index, variant, len)?,
            registry,
        })
    }

    fn collect_str<T: fmt::Display + ?Sized>(self, value: &T) -> Result<S::Ok, S::Error> {
        self.inner.collect_str(value)
    }

    fn is_human_readable(&self) -> bool {
        self.inner.is_human_readable()
    }
}

/// A compound serializer whose elements are routed.
struct RoutingCompound<'a, C> {
    inner: C,
    registry: &'a SpecialTypeRegistry,
}

impl<C: SerializeSeq> SerializeSeq for RoutingCompound<'_, C> {
    type Ok = C::Ok;
    type Error = C::Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), C::Error> {
        self.inner.serialize_element(&Routed {
            value,
            registry: self.registry,
        })
    }

    fn end(self) -> Result<C::Ok, C::Error> {
        self.inner.end()
    }
}

impl<C: SerializeTuple> SerializeTuple for RoutingCompound<'_, C> {
    type Ok = C::Ok;
    type Error = C::Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), C::Error> {
        self.inner.serialize_element(&Routed {
            value,
            registry: self.registry,
        })
    }

    fn end(self) -> Result<C::Ok, C::Error> {
        self.inner.end()
    }
}

impl<C: SerializeTupleStruct> SerializeTupleStruct for RoutingCompound<'_, C> {
    type Ok = C::Ok;
    type Error = C::Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), C::Error> {
        self.inner.serialize_field(&Routed {
            value,
            registry: self.registry,
        })
    }

    fn end(self) -> Result<C::Ok, C::Error> {
        self.inner.end()
    }
}

impl<C: SerializeTupleVariant> SerializeTupleVariant for RoutingCompound<'_, C> {
    type Ok = C::Ok;
    type Error = C::Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), C::Error> {
        self.inner.serialize_field(&Routed {
            value,
            registry: self.registry,
        })
    }

    fn end(self) -> Result<C::Ok, C::Error> {
        self.inner.end()
    }
}

impl<C: SerializeMap> SerializeMap for RoutingCompound<'_, C> {
    type Ok = C::Ok;
    type Error = C::Error;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), C::Error> {
        self.inner.serialize_key(key)
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), C::Error> {
        self.inner.serialize_value(&Routed {
            value,
            registry: self.registry,
        })
    }

    fn end(self) -> Result<C::Ok, C::Error> {
        self.inner.end()
    }
}

impl<C: SerializeStruct> SerializeStruct for RoutingCompound<'_, C> {
    type Ok = C::Ok;
    type Error = C::Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, key: &'static str, value: &T) -> Result<(), C::Error> {
        self.inner.serialize_field(
            key,
            &Routed {
                value,
                registry: self.registry,
            },
        )
    }

    fn skip_field(&mut self, key: &'static str) -> Result<(), C::Error> {
        self.inner.skip_field(key)
    }

    fn end(self) -> Result<C::Ok, C::Error> {
        self.inner.end()
    }
}

impl<C: SerializeStructVariant> SerializeStructVariant for RoutingCompound<'_, C> {
    type Ok = C::Ok;
    type Error = C::Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, key: &'static str, value: &T) -> Result<(), C::Error> {
        self.inner.serialize_field(
            key,
            &Routed {
                value,
                registry: self.registry,
            },
        )
    }

    fn skip_field(&mut self, key: &'static str) -> Result<(), C::Error> {
        self.inner.skip_field(key)
    }

    fn end(self) -> Result<C::Ok, C::Error> {
        self.inner.end()
    }
}

/// Reads the wire value behind `deserializer` and rebuilds the serde form of `kind`.
fn serde_form<'de, D: Deserializer<'de>>(
    registry: &SpecialTypeRegistry,
    kind: SpecialKind,
    deserializer: D,
) -> Result<bson::de::Deserializer, D::Error> {
    let wire = Bson::deserialize(deserializer)?;
    let form = registry
        .decode_serde_form(kind, wire)
        .map_err(D::Error::custom)?;
    Ok(bson::de::Deserializer::new(form))
}

struct RoutingDeserializer<'a, D> {
    inner: D,
    registry: &'a SpecialTypeRegistry,
}

impl<'a, D> RoutingDeserializer<'a, D> {
    fn visitor<V>(&self, inner: V) -> RoutingVisitor<'a, V> {
        RoutingVisitor {
            inner,
            registry: self.registry,
        }
    }
}

macro_rules! forward_deserialize {
    ($($method:ident($($arg:ident: $ty:ty),*)),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self $(, $arg: $ty)*, visitor: V) -> Result<V::Value, D::Error> {
                let visitor = self.visitor(visitor);
                self.inner.$method($($arg,)* visitor)
            }
        )*
    };
}

// Text and byte requests are where foreign types such as chrono and uuid read
// themselves; the visitor's output type tells which one is asking.
macro_rules! route_deserialize {
    ($($method:ident),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, D::Error> {
                match routed_kind::<V::Value>() {
                    Some(kind) => serde_form(self.registry, kind, self.inner)?
                        .$method(visitor)
                        .map_err(D::Error::custom),
                    None => {
                        let visitor = self.visitor(visitor);
                        self.inner.$method(visitor)
                    }
                }
            }
        )*
    };
}

impl<'de, D: Deserializer<'de>> Deserializer<'de> for RoutingDeserializer<'_, D> {
    type Error = D::Error;

    forward_deserialize!(
        deserialize_any(),
        deserialize_bool(),
        deserialize_i8(),
        deserialize_i16(),
        deserialize_i32(),
        deserialize_i64(),
        deserialize_i128(),
        deserialize_u8(),
        deserialize_u16(),
        deserialize_u32(),
        deserialize_u64(),
        deserialize_u128(),
        deserialize_f32(),
        deserialize_f64(),
        deserialize_char(),
        deserialize_option(),
        deserialize_unit(),
        deserialize_unit_struct(name: &'static str),
        deserialize_seq(),
        deserialize_tuple(len: usize),
        deserialize_tuple_struct(name: &'static str, len: usize),
        deserialize_map(),
        deserialize_struct(name: &'static str, fields: &'static [&'static str]),
        deserialize_enum(name: &'static str, variants: &'static [&'static str]),
        deserialize_identifier(),
        deserialize_ignored_any(),
    );

    route_deserialize!(deserialize_str, deserialize_string, deserialize_bytes, deserialize_byte_buf);

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value, D::Error> {
        if name.starts_with(MARKER_PREFIX) {
            return self.inner.deserialize_newtype_struct(name, visitor);
        }
        let visitor = self.visitor(visitor);
        self.inner.deserialize_newtype_struct(name, visitor)
    }

    fn is_human_readable(&self) -> bool {
        self.inner.is_human_readable()
    }
}

/// Seeds a nested value, routing it when its target type is a routed kind.
struct RoutedSeed<'a, S> {
    seed: S,
    registry: &'a SpecialTypeRegistry,
}

impl<'de, S: DeserializeSeed<'de>> DeserializeSeed<'de> for RoutedSeed<'_, S> {
    type Value = S::Value;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<S::Value, D::Error> {
        match routed_kind::<S::Value>() {
            Some(kind) => self
                .seed
                .deserialize(serde_form(self.registry, kind, deserializer)?)
                .map_err(D::Error::custom),
            None => self.seed.deserialize(RoutingDeserializer {
                inner: deserializer,
                registry: self.registry,
            }),
        }
    }
}

struct RoutingVisitor<'a, V> {
    inner: V,
    registry: &'a SpecialTypeRegistry,
}

impl<'a, V> RoutingVisitor<'a, V> {
    fn access<A>(&self, inner: A) -> RoutingAccess<'a, A> {
        RoutingAccess {
            inner,
            registry: self.registry,
        }
    }

    fn deserializer<D>(&self, inner: D) -> RoutingDeserializer<'a, D> {
        RoutingDeserializer {
            inner,
            registry: self.registry,
        }
    }
}

macro_rules! forward_visit {
    ($($method:ident($ty:ty)),* $(,)?) => {
        $(
            fn $method<E: de::Error>(self, v: $ty) -> Result<V::Value, E> {
                self.inner.$method(v)
            }
        )*
    };
}

impl<'de, V: Visitor<'de>> Visitor<'de> for RoutingVisitor<'_, V> {
    type Value = V::Value;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        self.inner.expecting(formatter)
    }

    forward_visit!(
        visit_bool(bool),
        visit_i8(i8),
        visit_i16(i16),
        visit_i32(i32),
        visit_i64(i64),
        visit_i128(i128),
        visit_u8(u8),
        visit_u16(u16),
        visit_u32(u32),
        visit_u64(u64),
        visit_u128(u128),
        visit_f32(f32),
        visit_f64(f64),
        visit_char(char),
        visit_str(&str),
        visit_borrowed_str(&'de str),
        visit_string(String),
        visit_bytes(&[u8]),
        visit_borrowed_bytes(&'de [u8]),
        visit_byte_buf(Vec<u8>),
    );

    fn visit_none<E: de::Error>(self) -> Result<V::Value, E> {
        self.inner.visit_none()
    }

    fn visit_unit<E: de::Error>(self) -> Result<V::Value, E> {
        self.inner.visit_unit()
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<V::Value, D::Error> {
        let deserializer = self.deserializer(deserializer);
        self.inner.visit_some(deserializer)
    }

    fn visit_newtype_struct<D: Deserializer<'de>>(self, deserializer: D) -> Result<V::Value, D::Error> {
        let deserializer = self.deserializer(deserializer);
        self.inner.visit_newtype_struct(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, seq: A) -> Result<V::Value, A::Error> {
        let seq = self.access(seq);
        self.inner.visit_seq(seq)
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<V::Value, A::Error> {
        let map = self.access(map);
        self.inner.visit_map(map)
    }

    fn visit_enum<A: EnumAccess<'de>>(self, data: A) -> Result<V::Value, A::Error> {
        let data = self.access(data);
        self.inner.visit_enum(data)
    }
}

/// Sequence, map and enum access whose values are routed.
struct RoutingAccess<'a, A> {
    inner: A,
    registry: &'a SpecialTypeRegistry,
}

impl<'a, A> RoutingAccess<'a, A> {
    fn seed<S>(&self, seed: S) -> RoutedSeed<'a, S> {
        RoutedSeed {
            seed,
            registry: self.registry,
        }
    }
}

impl<'de, A: SeqAccess<'de>> SeqAccess<'de> for RoutingAccess<'_, A> {
    type Error = A::Error;

    fn next_element_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<Option<T::Value>, A::Error> {
        let seed = self.seed(seed);
        self.inner.next_element_seed(seed)
    }

    fn size_hint(&self) -> Option<usize> {
        SeqAccess::size_hint(&self.inner)
    }
}

impl<'de, A: MapAccess<'de>> MapAccess<'de> for RoutingAccess<'_, A> {
    type Error = A::Error;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>, A::Error> {
        self.inner.next_key_seed(seed)
    }

    fn next_value_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<T::Value, A::Error> {
        let seed = self.seed(seed);
        self.inner.next_value_seed(seed)
    }

    fn size_hint(&self) -> Option<usize> {
        MapAccess::size_hint(&self.inner)
    }
}

impl<'a, 'de, A: EnumAccess<'de>> EnumAccess<'de> for RoutingAccess<'a, A> {
    type Error = A::Error;
    type Variant = RoutingAccess<'a, A::Variant>;

    fn variant_seed<T: DeserializeSeed<'de>>(self, seed: T) -> Result<(T::Value, Self::Variant), A::Error> {
        let registry = self.registry;
        let (value, variant) = self.inner.variant_seed(seed)?;
        Ok((value, RoutingAccess { inner: variant, registry }))
    }
}

impl<'de, A: VariantAccess<'de>> VariantAccess<'de> for RoutingAccess<'_, A> {
    type Error = A::Error;

    fn unit_variant(self) -> Result<(), A::Error> {
        self.inner.unit_variant()
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(self, seed: T) -> Result<T::Value, A::Error> {
        let seed = self.seed(seed);
        self.inner.newtype_variant_seed(seed)
    }

    fn tuple_variant<V: Visitor<'de>>(self, len: usize, visitor: V) -> Result<V::Value, A::Error> {
        let visitor = RoutingVisitor {
            inner: visitor,
            registry: self.registry,
        };
        self.inner.tuple_variant(len, visitor)
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, A::Error> {
        let visitor = RoutingVisitor {
            inner: visitor,
            registry: self.registry,
        };
        self.inner.struct_variant(fields, visitor)
    }
}
