//! Wire shape classification.
//!
//! Every value handed to the codec is first classified into a [`WireShape`]. The
//! shape decides whether the value goes through the generic structural mapper or
//! through the special scalar path.
//!
//! Classification is a single function: registered special types are looked up
//! by [`TypeId`], everything else is fed through a short-circuiting serde
//! serializer that stops at the first token it sees. Results are memoized per
//! type when they cannot change from one value to the next.

use std::{any::TypeId, fmt};

use bson::spec::ElementType;
use dashmap::DashMap;
use serde::{
    Serialize,
    ser::{self, Impossible},
};
use tracing::debug;

use crate::{id::ID_NEWTYPE_NAME, registry::SpecialKind};

/// The structural category a value takes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireShape {
    String,
    Array,
    Number,
    Map,
    Object,
    Integer,
    Boolean,
    /// A 12-byte object id.
    Identifier,
    /// A date/time, written as epoch milliseconds.
    Temporal,
}

impl WireShape {
    /// Returns `true` for shapes handled by the generic structural mapper.
    pub fn is_structural(self) -> bool {
        matches!(self, WireShape::Array | WireShape::Map | WireShape::Object)
    }

    /// Maps a BSON element type onto the shape it carries.
    ///
    /// Returns `None` for null-like element types.
    pub fn of_element(element: ElementType) -> Option<WireShape> {
        Some(match element {
            ElementType::Double | ElementType::Decimal128 => WireShape::Number,
            ElementType::String | ElementType::Symbol => WireShape::String,
            ElementType::Int32 | ElementType::Int64 => WireShape::Integer,
            ElementType::Boolean => WireShape::Boolean,
            ElementType::Array => WireShape::Array,
            ElementType::ObjectId => WireShape::Identifier,
            ElementType::DateTime => WireShape::Temporal,
            ElementType::Null | ElementType::Undefined => return None,
            _ => WireShape::Object,
        })
    }
}

impl fmt::Display for WireShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WireShape::String => "string",
            WireShape::Array => "array",
            WireShape::Number => "number",
            WireShape::Map => "map",
            WireShape::Object => "object",
            WireShape::Integer => "integer",
            WireShape::Boolean => "boolean",
            WireShape::Identifier => "objectId",
            WireShape::Temporal => "date",
        })
    }
}

/// Classifies values into [`WireShape`]s, caching type-stable results.
///
/// The cache is append-only. Two threads classifying the same type at the same
/// time both compute the shape and insert the same entry.
#[derive(Debug, Default)]
pub struct TypeClassifier {
    cache: DashMap<TypeId, Option<WireShape>>,
}

impl TypeClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the shape of `value`, or `None` when it serializes as null.
    ///
    /// This never fails: a value whose `Serialize` impl errors out is treated
    /// as an object and left to the structural mapper to report.
    pub fn classify<T: Serialize + 'static>(&self, value: &T) -> Option<WireShape> {
        if let Some(kind) = SpecialKind::of::<T>() {
            return Some(kind.shape());
        }

        let type_id = TypeId::of::<T>();
        if let Some(shape) = self.cache.get(&type_id) {
            return *shape;
        }

        let probe = ShapeProbe::run(value);
        if probe.stable {
            debug!(
                target: "docbridge::codec",
                type_name = std::any::type_name::<T>(),
                shape = ?probe.shape,
                "Classified type"
            );
            self.cache.entry(type_id).or_insert(probe.shape);
        }

        probe.shape
    }

    /// Returns the shape known for `T` without looking at a value.
    ///
    /// Only registered special types and previously classified types are known.
    pub fn known_shape<T: 'static>(&self) -> Option<WireShape> {
        SpecialKind::of::<T>()
            .map(SpecialKind::shape)
            .or_else(|| self.cache.get(&TypeId::of::<T>()).and_then(|shape| *shape))
    }

    /// Number of memoized type classifications.
    pub fn cached_types(&self) -> usize {
        self.cache.len()
    }
}

/// The outcome of probing a value's first serde token.
#[derive(Debug, Clone, Copy)]
struct Probe {
    shape: Option<WireShape>,
    /// `false` when the shape depends on the value (options, enums, identifiers).
    stable: bool,
}

/// Stops the probe as soon as a compound value starts.
#[derive(Debug)]
enum ProbeHalt {
    Found(Probe),
    Failed(String),
}

impl fmt::Display for ProbeHalt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeHalt::Found(probe) => write!(f, "probe found {:?}", probe.shape),
            ProbeHalt::Failed(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for ProbeHalt {}

impl ser::Error for ProbeHalt {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        ProbeHalt::Failed(msg.to_string())
    }
}

/// A serde serializer that records the shape of the first token it receives.
struct ShapeProbe {
    stable: bool,
}

impl ShapeProbe {
    fn run<T: Serialize + ?Sized>(value: &T) -> Probe {
        Self::run_with(value, true)
    }

    fn run_with<T: Serialize + ?Sized>(value: &T, stable: bool) -> Probe {
        match value.serialize(ShapeProbe { stable }) {
            Ok(probe) | Err(ProbeHalt::Found(probe)) => probe,
            Err(ProbeHalt::Failed(_)) => Probe {
                shape: Some(WireShape::Object),
                stable: false,
            },
        }
    }

    fn found(&self, shape: WireShape) -> Probe {
        Probe {
            shape: Some(shape),
            stable: self.stable,
        }
    }

    fn halt<S>(&self, shape: WireShape) -> Result<S, ProbeHalt> {
        Err(ProbeHalt::Found(self.found(shape)))
    }

    fn struct_shape(name: &str) -> WireShape {
        match name {
            "$oid" => WireShape::Identifier,
            "$date" => WireShape::Temporal,
            "$numberDecimal" | "$numberDecimalBytes" => WireShape::Number,
            _ => WireShape::Object,
        }
    }
}

impl ser::Serializer for ShapeProbe {
    type Ok = Probe;
    type Error = ProbeHalt;

    type SerializeSeq = Impossible<Probe, ProbeHalt>;
    type SerializeTuple = Impossible<Probe, ProbeHalt>;
    type SerializeTupleStruct = Impossible<Probe, ProbeHalt>;
    type SerializeTupleVariant = Impossible<Probe, ProbeHalt>;
    type SerializeMap = Impossible<Probe, ProbeHalt>;
    type SerializeStruct = Impossible<Probe, ProbeHalt>;
    type SerializeStructVariant = Impossible<Probe, ProbeHalt>;

    fn serialize_bool(self, _: bool) -> Result<Probe, ProbeHalt> {
        Ok(self.found(WireShape::Boolean))
    }

    fn serialize_i8(self, _: i8) -> Result<Probe, ProbeHalt> {
        Ok(self.found(WireShape::Integer))
    }

    fn serialize_i16(self, _: i16) -> Result<Probe, ProbeHalt> {
        Ok(self.found(WireShape::Integer))
    }

    fn serialize_i32(self, _: i32) -> Result<Probe, ProbeHalt> {
        Ok(self.found(WireShape::Integer))
    }

    fn serialize_i64(self, _: i64) -> Result<Probe, ProbeHalt> {
        Ok(self.found(WireShape::Integer))
    }

    fn serialize_i128(self, _: i128) -> Result<Probe, ProbeHalt> {
        Ok(self.found(WireShape::Integer))
    }

    fn serialize_u8(self, _: u8) -> Result<Probe, ProbeHalt> {
        Ok(self.found(WireShape::Integer))
    }

    fn serialize_u16(self, _: u16) -> Result<Probe, ProbeHalt> {
        Ok(self.found(WireShape::Integer))
    }

    fn serialize_u32(self, _: u32) -> Result<Probe, ProbeHalt> {
        Ok(self.found(WireShape::Integer))
    }

    fn serialize_u64(self, _: u64) -> Result<Probe, ProbeHalt> {
        Ok(self.found(WireShape::Integer))
    }

    fn serialize_u128(self, _: u128) -> Result<Probe, ProbeHalt> {
        Ok(self.found(WireShape::Integer))
    }

    fn serialize_f32(self, _: f32) -> Result<Probe, ProbeHalt> {
        Ok(self.found(WireShape::Number))
    }

    fn serialize_f64(self, _: f64) -> Result<Probe, ProbeHalt> {
        Ok(self.found(WireShape::Number))
    }

    fn serialize_char(self, _: char) -> Result<Probe, ProbeHalt> {
        Ok(self.found(WireShape::String))
    }

    fn serialize_str(self, _: &str) -> Result<Probe, ProbeHalt> {
        Ok(self.found(WireShape::String))
    }

    // Raw bytes become a generic binary, which the structural mapper writes exactly.
    fn serialize_bytes(self, _: &[u8]) -> Result<Probe, ProbeHalt> {
        Ok(self.found(WireShape::Object))
    }

    fn serialize_none(self) -> Result<Probe, ProbeHalt> {
        Ok(Probe {
            shape: None,
            stable: false,
        })
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Probe, ProbeHalt> {
        Ok(Self::run_with(value, false))
    }

    fn serialize_unit(self) -> Result<Probe, ProbeHalt> {
        Ok(Probe {
            shape: None,
            stable: self.stable,
        })
    }

    fn serialize_unit_struct(self, _: &'static str) -> Result<Probe, ProbeHalt> {
        self.serialize_unit()
    }

    fn serialize_unit_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
    ) -> Result<Probe, ProbeHalt> {
        Ok(Probe {
            shape: Some(WireShape::String),
            stable: false,
        })
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        name: &'static str,
        value: &T,
    ) -> Result<Probe, ProbeHalt> {
        if name == ID_NEWTYPE_NAME {
            // Textual ids stay strings; object-id ids are identifiers.
            let inner = Self::run_with(value, false);
            return Ok(Probe {
                shape: Some(match inner.shape {
                    Some(WireShape::String) => WireShape::String,
                    _ => WireShape::Identifier,
                }),
                stable: false,
            });
        }

        Ok(Self::run_with(value, self.stable))
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: &T,
    ) -> Result<Probe, ProbeHalt> {
        Ok(Probe {
            shape: Some(WireShape::Object),
            stable: false,
        })
    }

    fn serialize_seq(self, _: Option<usize>) -> Result<Self::SerializeSeq, ProbeHalt> {
        self.halt(WireShape::Array)
    }

    fn serialize_tuple(self, _: usize) -> Result<Self::SerializeTuple, ProbeHalt> {
        self.halt(WireShape::Array)
    }

    fn serialize_tuple_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeTupleStruct, ProbeHalt> {
        self.halt(WireShape::Array)
    }

    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeTupleVariant, ProbeHalt> {
        Err(ProbeHalt::Found(Probe {
            shape: Some(WireShape::Object),
            stable: false,
        }))
    }

    fn serialize_map(self, _: Option<usize>) -> Result<Self::SerializeMap, ProbeHalt> {
        self.halt(WireShape::Map)
    }

    fn serialize_struct(
        self,
        name: &'static str,
        _: usize,
    ) -> Result<Self::SerializeStruct, ProbeHalt> {
        self.halt(Self::struct_shape(name))
    }

    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeStructVariant, ProbeHalt> {
        Err(ProbeHalt::Found(Probe {
            shape: Some(WireShape::Object),
            stable: false,
        }))
    }
}
