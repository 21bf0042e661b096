//! Dedicated encoders and decoders for types with their own BSON representation.
//!
//! The set of special types is closed and named by [`SpecialKind`]. Values of
//! these types skip the structural mapper entirely; the registry writes the
//! exact BSON element and, on the way back, accepts every wire and envelope
//! form a compatible writer may have produced.

use std::any::{Any, TypeId, type_name};
use std::time::SystemTime;

use bson::{
    Binary, Bson, Decimal128, Timestamp, de::deserialize_from_bson, oid::ObjectId, ser::serialize_to_bson,
    spec::BinarySubtype,
};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de::DeserializeOwned, de::Error as _};

use crate::{
    decimal::Decimal,
    error::{CodecError, CodecResult},
    extjson,
    shape::WireShape,
    temporal::{self, Temporal, TemporalKind},
};

/// Every concrete type with a dedicated codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialKind {
    ObjectId,
    Binary,
    Decimal,
    Decimal128,
    Timestamp,
    MinKey,
    MaxKey,
    Uuid,
    BsonUuid,
    Temporal(TemporalKind),
    Bson,
}

fn registered() -> [(TypeId, &'static str, SpecialKind); 17] {
    fn entry<T: ?Sized + 'static>(kind: SpecialKind) -> (TypeId, &'static str, SpecialKind) {
        (TypeId::of::<T>(), type_name::<T>(), kind)
    }

    [
        entry::<ObjectId>(SpecialKind::ObjectId),
        entry::<Binary>(SpecialKind::Binary),
        entry::<Decimal>(SpecialKind::Decimal),
        entry::<Decimal128>(SpecialKind::Decimal128),
        entry::<Timestamp>(SpecialKind::Timestamp),
        entry::<MinKey>(SpecialKind::MinKey),
        entry::<MaxKey>(SpecialKind::MaxKey),
        entry::<uuid::Uuid>(SpecialKind::Uuid),
        entry::<bson::Uuid>(SpecialKind::BsonUuid),
        entry::<DateTime<Utc>>(SpecialKind::Temporal(TemporalKind::Utc)),
        entry::<DateTime<FixedOffset>>(SpecialKind::Temporal(TemporalKind::FixedOffset)),
        entry::<NaiveDateTime>(SpecialKind::Temporal(TemporalKind::NaiveDateTime)),
        entry::<NaiveDate>(SpecialKind::Temporal(TemporalKind::NaiveDate)),
        entry::<NaiveTime>(SpecialKind::Temporal(TemporalKind::NaiveTime)),
        entry::<bson::DateTime>(SpecialKind::Temporal(TemporalKind::BsonDateTime)),
        entry::<SystemTime>(SpecialKind::Temporal(TemporalKind::SystemTime)),
        entry::<Bson>(SpecialKind::Bson),
    ]
}

impl SpecialKind {
    /// Looks up the special kind of `T`, if it is registered.
    pub fn of<T: ?Sized + 'static>() -> Option<SpecialKind> {
        let type_id = TypeId::of::<T>();
        registered()
            .iter()
            .find(|(registered_id, _, _)| *registered_id == type_id)
            .map(|(_, _, kind)| *kind)
    }

    /// Looks up a registered type by its [`type_name`].
    ///
    /// Used where only a non-`'static` type parameter is at hand, such as a
    /// value nested inside a serde data structure. Shared references resolve
    /// to their referent.
    pub fn named(name: &str) -> Option<SpecialKind> {
        let name = name.trim_start_matches('&').trim_start_matches("mut ");
        registered()
            .iter()
            .find(|(_, registered_name, _)| *registered_name == name)
            .map(|(_, _, kind)| *kind)
    }

    /// Whether nested values of this kind are rewritten by the registry.
    ///
    /// The serde form of these types is not the element the registry writes,
    /// or reading them needs the registry's fallbacks.
    pub fn routes_nested(self) -> bool {
        matches!(self, SpecialKind::Uuid | SpecialKind::BsonUuid | SpecialKind::Temporal(_))
    }

    /// The wire shape values of this kind take.
    pub fn shape(self) -> WireShape {
        match self {
            SpecialKind::ObjectId => WireShape::Identifier,
            SpecialKind::Decimal | SpecialKind::Decimal128 => WireShape::Number,
            SpecialKind::Uuid | SpecialKind::BsonUuid => WireShape::String,
            SpecialKind::Temporal(_) => WireShape::Temporal,
            SpecialKind::Binary
            | SpecialKind::Timestamp
            | SpecialKind::MinKey
            | SpecialKind::MaxKey
            | SpecialKind::Bson => WireShape::Object,
        }
    }
}

/// The BSON min key: compares lower than every other value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MinKey;

/// The BSON max key: compares higher than every other value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MaxKey;

fn is_key_marker(bson: &Bson, marker: &Bson, envelope: &str) -> bool {
    match bson {
        // Some writers store the keys as plain string literals.
        Bson::String(_) => true,
        Bson::Document(doc) => doc.len() == 1 && doc.contains_key(envelope),
        other => other == marker,
    }
}

impl Serialize for MinKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Bson::MinKey.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MinKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bson = Bson::deserialize(deserializer)?;
        if is_key_marker(&bson, &Bson::MinKey, "$minKey") {
            Ok(MinKey)
        } else {
            Err(D::Error::custom(CodecError::mismatch(WireShape::Object, &bson)))
        }
    }
}

impl Serialize for MaxKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Bson::MaxKey.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MaxKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bson = Bson::deserialize(deserializer)?;
        if is_key_marker(&bson, &Bson::MaxKey, "$maxKey") {
            Ok(MaxKey)
        } else {
            Err(D::Error::custom(CodecError::mismatch(WireShape::Object, &bson)))
        }
    }
}

/// Byte layout used for UUIDs stored as BSON binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UuidRepresentation {
    /// RFC 4122 byte order, binary subtype 4.
    Standard,
    /// Subtype 3 with each 8-byte half reversed.
    JavaLegacy,
    /// Subtype 3 with the first three groups little-endian.
    #[serde(rename = "csharp_legacy")]
    CSharpLegacy,
    /// Subtype 3 in RFC 4122 byte order.
    PythonLegacy,
}

impl UuidRepresentation {
    pub fn subtype(self) -> BinarySubtype {
        match self {
            UuidRepresentation::Standard => BinarySubtype::Uuid,
            _ => BinarySubtype::UuidOld,
        }
    }

    /// Reorders RFC 4122 bytes into this representation's layout.
    ///
    /// Every layout is its own inverse, so this also converts back.
    pub fn reorder(self, bytes: [u8; 16]) -> [u8; 16] {
        let mut out = bytes;
        match self {
            UuidRepresentation::Standard | UuidRepresentation::PythonLegacy => {}
            UuidRepresentation::JavaLegacy => {
                out[..8].reverse();
                out[8..].reverse();
            }
            UuidRepresentation::CSharpLegacy => {
                out[..4].reverse();
                out[4..6].reverse();
                out[6..8].reverse();
            }
        }
        out
    }
}

// Calls `$via::<T>(..)` with the concrete type behind a kind that routes nested values.
macro_rules! with_routed_type {
    ($kind:expr, $via:ident($($arg:expr),*), $otherwise:expr) => {
        match $kind {
            SpecialKind::Uuid => $via::<uuid::Uuid>($($arg),*),
            SpecialKind::BsonUuid => $via::<bson::Uuid>($($arg),*),
            SpecialKind::Temporal(TemporalKind::Utc) => $via::<DateTime<Utc>>($($arg),*),
            SpecialKind::Temporal(TemporalKind::FixedOffset) => $via::<DateTime<FixedOffset>>($($arg),*),
            SpecialKind::Temporal(TemporalKind::NaiveDateTime) => $via::<NaiveDateTime>($($arg),*),
            SpecialKind::Temporal(TemporalKind::NaiveDate) => $via::<NaiveDate>($($arg),*),
            SpecialKind::Temporal(TemporalKind::NaiveTime) => $via::<NaiveTime>($($arg),*),
            SpecialKind::Temporal(TemporalKind::BsonDateTime) => $via::<bson::DateTime>($($arg),*),
            SpecialKind::Temporal(TemporalKind::SystemTime) => $via::<SystemTime>($($arg),*),
            _ => $otherwise,
        }
    };
}

/// Encodes and decodes the closed set of special types.
#[derive(Debug, Clone, Default)]
pub struct SpecialTypeRegistry {
    uuid_representation: Option<UuidRepresentation>,
}

impl SpecialTypeRegistry {
    pub fn new(uuid_representation: Option<UuidRepresentation>) -> Self {
        Self { uuid_representation }
    }

    pub fn uuid_representation(&self) -> Option<UuidRepresentation> {
        self.uuid_representation
    }

    /// Writes `value`, a value of the registered type `kind`, as BSON.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Serialization`] if `T` is not the type `kind` names.
    pub fn encode<T: 'static>(&self, kind: SpecialKind, value: &T) -> CodecResult<Bson> {
        let any = value as &dyn Any;
        let encoded = match kind {
            SpecialKind::ObjectId => any.downcast_ref::<ObjectId>().map(|oid| Bson::ObjectId(*oid)),
            SpecialKind::Binary => any.downcast_ref::<Binary>().map(|bin| Bson::Binary(bin.clone())),
            SpecialKind::Decimal => any
                .downcast_ref::<Decimal>()
                .map(|dec| Bson::Decimal128(dec.to_decimal128())),
            SpecialKind::Decimal128 => any
                .downcast_ref::<Decimal128>()
                .map(|dec| Bson::Decimal128(Decimal128::from_bytes(dec.bytes()))),
            SpecialKind::Timestamp => any.downcast_ref::<Timestamp>().map(|ts| Bson::Timestamp(*ts)),
            SpecialKind::MinKey => any.downcast_ref::<MinKey>().map(|_| Bson::MinKey),
            SpecialKind::MaxKey => any.downcast_ref::<MaxKey>().map(|_| Bson::MaxKey),
            SpecialKind::Uuid => any
                .downcast_ref::<uuid::Uuid>()
                .map(|uuid| self.encode_uuid(*uuid.as_bytes())),
            SpecialKind::BsonUuid => any
                .downcast_ref::<bson::Uuid>()
                .map(|uuid| self.encode_uuid(uuid.bytes())),
            SpecialKind::Temporal(temporal) => encode_temporal(temporal, any),
            SpecialKind::Bson => any.downcast_ref::<Bson>().cloned(),
        };

        encoded.ok_or_else(|| not_registered::<T>(kind))
    }

    /// Reads a value of the registered type `kind` from BSON.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::TypeMismatch`] when the wire value cannot be read
    /// as `kind`, and envelope errors for malformed `$`-prefixed documents.
    pub fn decode<T: 'static>(&self, kind: SpecialKind, bson: Bson) -> CodecResult<T> {
        if kind == SpecialKind::Bson {
            return downcast(kind, Box::new(bson));
        }

        let bson = extjson::unwrap_envelope(bson)?;
        let decoded: Box<dyn Any> = match kind {
            SpecialKind::ObjectId => Box::new(decode_object_id(&bson)?),
            SpecialKind::Binary => match bson {
                Bson::Binary(bin) => Box::new(bin),
                other => return Err(CodecError::mismatch(WireShape::Object, &other)),
            },
            SpecialKind::Decimal => Box::new(Decimal::try_from_bson(&bson)?),
            SpecialKind::Decimal128 => match bson {
                Bson::Decimal128(dec) => Box::new(dec),
                other => Box::new(Decimal::try_from_bson(&other)?.to_decimal128()),
            },
            SpecialKind::Timestamp => match bson {
                Bson::Timestamp(ts) => Box::new(ts),
                other => return Err(CodecError::mismatch(WireShape::Object, &other)),
            },
            SpecialKind::MinKey if is_key_marker(&bson, &Bson::MinKey, "$minKey") => Box::new(MinKey),
            SpecialKind::MaxKey if is_key_marker(&bson, &Bson::MaxKey, "$maxKey") => Box::new(MaxKey),
            SpecialKind::MinKey | SpecialKind::MaxKey => {
                return Err(CodecError::mismatch(WireShape::Object, &bson));
            }
            SpecialKind::Uuid => Box::new(uuid::Uuid::from_bytes(self.decode_uuid(&bson)?)),
            SpecialKind::BsonUuid => Box::new(bson::Uuid::from_bytes(self.decode_uuid(&bson)?)),
            SpecialKind::Temporal(temporal) => decode_temporal(temporal, &bson)?,
            SpecialKind::Bson => Box::new(bson),
        };

        downcast(kind, decoded)
    }

    /// Turns the serde form of a nested `kind` value into the element the registry writes.
    pub fn encode_serde_form(&self, kind: SpecialKind, serde_form: Bson) -> CodecResult<Bson> {
        fn via<T: DeserializeOwned + 'static>(
            registry: &SpecialTypeRegistry,
            kind: SpecialKind,
            serde_form: Bson,
        ) -> CodecResult<Bson> {
            let value: T = deserialize_from_bson(serde_form)?;
            registry.encode(kind, &value)
        }

        with_routed_type!(kind, via(self, kind, serde_form), Ok(serde_form))
    }

    /// Reads a nested `kind` value from the wire and returns its serde form.
    pub fn decode_serde_form(&self, kind: SpecialKind, wire: Bson) -> CodecResult<Bson> {
        fn via<T: Serialize + 'static>(
            registry: &SpecialTypeRegistry,
            kind: SpecialKind,
            wire: Bson,
        ) -> CodecResult<Bson> {
            let value: T = registry.decode(kind, wire)?;
            Ok(serialize_to_bson(&value)?)
        }

        with_routed_type!(kind, via(self, kind, wire), Ok(wire))
    }

    fn encode_uuid(&self, bytes: [u8; 16]) -> Bson {
        match self.uuid_representation {
            None => Bson::String(uuid::Uuid::from_bytes(bytes).hyphenated().to_string()),
            Some(representation) => Bson::Binary(Binary {
                subtype: representation.subtype(),
                bytes: representation.reorder(bytes).to_vec(),
            }),
        }
    }

    fn decode_uuid(&self, bson: &Bson) -> CodecResult<[u8; 16]> {
        match bson {
            Bson::String(text) => uuid::Uuid::parse_str(text)
                .map(|uuid| *uuid.as_bytes())
                .map_err(|e| CodecError::Serialization(format!("invalid UUID {text:?}: {e}"))),
            Bson::Binary(bin) => {
                let bytes: [u8; 16] = bin
                    .bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| CodecError::mismatch(WireShape::String, bson))?;
                let representation = self.uuid_representation.unwrap_or(UuidRepresentation::Standard);
                if bin.subtype != representation.subtype() {
                    return Err(CodecError::mismatch(WireShape::String, bson));
                }
                Ok(representation.reorder(bytes))
            }
            other => Err(CodecError::mismatch(WireShape::String, other)),
        }
    }
}

fn decode_object_id(bson: &Bson) -> CodecResult<ObjectId> {
    match bson {
        Bson::ObjectId(oid) => Ok(*oid),
        Bson::String(hex) => {
            ObjectId::parse_str(hex).map_err(|_| CodecError::mismatch(WireShape::Identifier, bson))
        }
        other => Err(CodecError::mismatch(WireShape::Identifier, other)),
    }
}

fn encode_temporal(kind: TemporalKind, any: &dyn Any) -> Option<Bson> {
    fn to_date<T: Temporal + 'static>(any: &dyn Any) -> Option<Bson> {
        any.downcast_ref::<T>().map(|value| Bson::DateTime(value.to_bson_datetime()))
    }

    match kind {
        TemporalKind::Utc => to_date::<DateTime<Utc>>(any),
        TemporalKind::FixedOffset => to_date::<DateTime<FixedOffset>>(any),
        TemporalKind::NaiveDateTime => to_date::<NaiveDateTime>(any),
        TemporalKind::NaiveDate => to_date::<NaiveDate>(any),
        TemporalKind::NaiveTime => to_date::<NaiveTime>(any),
        TemporalKind::BsonDateTime => to_date::<bson::DateTime>(any),
        TemporalKind::SystemTime => to_date::<SystemTime>(any),
    }
}

fn decode_temporal(kind: TemporalKind, bson: &Bson) -> CodecResult<Box<dyn Any>> {
    Ok(match kind {
        TemporalKind::Utc => Box::new(temporal::from_bson::<DateTime<Utc>>(bson)?),
        TemporalKind::FixedOffset => Box::new(temporal::from_bson::<DateTime<FixedOffset>>(bson)?),
        TemporalKind::NaiveDateTime => Box::new(temporal::from_bson::<NaiveDateTime>(bson)?),
        TemporalKind::NaiveDate => Box::new(temporal::from_bson::<NaiveDate>(bson)?),
        TemporalKind::NaiveTime => Box::new(temporal::from_bson::<NaiveTime>(bson)?),
        TemporalKind::BsonDateTime => Box::new(temporal::from_bson::<bson::DateTime>(bson)?),
        TemporalKind::SystemTime => Box::new(temporal::from_bson::<SystemTime>(bson)?),
    })
}

fn downcast<T: 'static>(kind: SpecialKind, decoded: Box<dyn Any>) -> CodecResult<T> {
    decoded
        .downcast::<T>()
        .map(|value| *value)
        .map_err(|_| not_registered::<T>(kind))
}

fn not_registered<T>(kind: SpecialKind) -> CodecError {
    CodecError::Serialization(format!("{} is not registered as {kind:?}", type_name::<T>()))
}

#[cfg(test)]
mod tests {
    use bson::doc;
    use chrono::TimeZone;

    use super::*;

    fn round_trip<T: 'static>(registry: &SpecialTypeRegistry, value: &T) -> T {
        let kind = SpecialKind::of::<T>().expect("registered");
        let bson = registry.encode(kind, value).unwrap();
        registry.decode(kind, bson).unwrap()
    }

    #[test]
    fn test_round_trips_every_special_type() {
        let registry = SpecialTypeRegistry::default();

        let oid = ObjectId::new();
        assert_eq!(round_trip(&registry, &oid), oid);

        let bin = Binary { subtype: BinarySubtype::Generic, bytes: vec![0, 1, 2, 255] };
        assert_eq!(round_trip(&registry, &bin), bin);

        let dec: Decimal = "19.99".parse().unwrap();
        assert_eq!(round_trip(&registry, &dec).to_string(), "19.99");

        let ts = Timestamp { time: 1_700_000_000, increment: 7 };
        assert_eq!(round_trip(&registry, &ts), ts);

        assert_eq!(round_trip(&registry, &MinKey), MinKey);
        assert_eq!(round_trip(&registry, &MaxKey), MaxKey);

        let uuid = uuid::Uuid::new_v4();
        assert_eq!(round_trip(&registry, &uuid), uuid);

        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(round_trip(&registry, &at), at);

        let raw = Bson::Document(doc! { "a": 1 });
        assert_eq!(round_trip(&registry, &raw), raw);
    }

    #[test]
    fn test_object_id_accepts_hex_and_envelope() {
        let registry = SpecialTypeRegistry::default();
        let oid = ObjectId::new();

        let from_hex: ObjectId = registry.decode(SpecialKind::ObjectId, Bson::String(oid.to_hex())).unwrap();
        let from_envelope: ObjectId = registry
            .decode(SpecialKind::ObjectId, Bson::Document(doc! { "$oid": oid.to_hex() }))
            .unwrap();

        assert_eq!(from_hex, oid);
        assert_eq!(from_envelope, oid);
    }

    #[test]
    fn test_binary_accepts_both_envelopes() {
        let registry = SpecialTypeRegistry::default();
        let expected = Binary { subtype: BinarySubtype::Generic, bytes: b"hello".to_vec() };

        let legacy: Binary = registry
            .decode(
                SpecialKind::Binary,
                Bson::Document(doc! { "$binary": "aGVsbG8=", "$type": "00" }),
            )
            .unwrap();
        let canonical: Binary = registry
            .decode(
                SpecialKind::Binary,
                Bson::Document(doc! { "$binary": { "base64": "aGVsbG8=", "subType": "00" } }),
            )
            .unwrap();

        assert_eq!(legacy, expected);
        assert_eq!(canonical, expected);
    }

    #[test]
    fn test_decimal_from_other_numeric_forms() {
        let registry = SpecialTypeRegistry::default();

        let from_double: Decimal = registry.decode(SpecialKind::Decimal, Bson::Double(19.99)).unwrap();
        let from_int: Decimal = registry.decode(SpecialKind::Decimal, Bson::Int64(20)).unwrap();
        let from_envelope: Decimal = registry
            .decode(SpecialKind::Decimal, Bson::Document(doc! { "$numberDecimal": "19.99" }))
            .unwrap();

        assert_eq!(from_double.to_string(), "19.99");
        assert_eq!(from_int, Decimal::from(20i64));
        assert_eq!(from_envelope, from_double);
    }

    #[test]
    fn test_key_markers_accept_envelopes_and_strings() {
        let registry = SpecialTypeRegistry::default();

        let min: CodecResult<MinKey> =
            registry.decode(SpecialKind::MinKey, Bson::Document(doc! { "$minKey": 1 }));
        let max: CodecResult<MaxKey> = registry.decode(SpecialKind::MaxKey, Bson::String("max".into()));
        let wrong: CodecResult<MinKey> = registry.decode(SpecialKind::MinKey, Bson::Int32(1));

        assert!(min.is_ok());
        assert!(max.is_ok());
        assert!(wrong.is_err());
    }

    #[test]
    fn test_java_legacy_reverses_each_half() {
        let registry = SpecialTypeRegistry::new(Some(UuidRepresentation::JavaLegacy));
        let uuid = uuid::Uuid::from_bytes([0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15]);

        let bson = registry.encode(SpecialKind::Uuid, &uuid).unwrap();
        match &bson {
            Bson::Binary(bin) => {
                assert_eq!(bin.subtype, BinarySubtype::UuidOld);
                assert_eq!(bin.bytes, vec![7, 6, 5, 4, 3, 2, 1, 0, 15, 14, 13, 12, 11, 10, 9, 8]);
            }
            other => panic!("expected binary, got {other:?}"),
        }

        let back: uuid::Uuid = registry.decode(SpecialKind::Uuid, bson).unwrap();
        assert_eq!(back, uuid);
    }

    #[test]
    fn test_csharp_legacy_swaps_leading_groups() {
        let uuid = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15];

        assert_eq!(
            UuidRepresentation::CSharpLegacy.reorder(uuid),
            [3, 2, 1, 0, 5, 4, 7, 6, 8, 9, 10, 11, 12, 13, 14, 15]
        );
        assert_eq!(UuidRepresentation::PythonLegacy.reorder(uuid), uuid);
    }

    #[test]
    fn test_unconfigured_uuid_is_text_but_reads_standard_binary() {
        let registry = SpecialTypeRegistry::default();
        let uuid = uuid::Uuid::new_v4();

        assert_eq!(registry.encode(SpecialKind::Uuid, &uuid).unwrap(), Bson::String(uuid.to_string()));

        let binary = Bson::Binary(Binary { subtype: BinarySubtype::Uuid, bytes: uuid.as_bytes().to_vec() });
        let back: uuid::Uuid = registry.decode(SpecialKind::Uuid, binary).unwrap();
        assert_eq!(back, uuid);
    }

    #[test]
    fn test_temporal_accepts_bare_integers() {
        let registry = SpecialTypeRegistry::default();
        let kind = SpecialKind::Temporal(TemporalKind::Utc);

        let at: DateTime<Utc> = registry.decode(kind, Bson::Int64(86_400_000)).unwrap();

        assert_eq!(at, Utc.with_ymd_and_hms(1970, 1, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_incompatible_wire_value_is_type_mismatch() {
        let registry = SpecialTypeRegistry::default();

        let err = registry.decode::<Timestamp>(SpecialKind::Timestamp, Bson::Boolean(true)).unwrap_err();

        assert!(matches!(
            err,
            CodecError::TypeMismatch { expected: WireShape::Object, found: bson::spec::ElementType::Boolean }
        ));
    }

    #[test]
    fn test_wrong_target_type_is_reported() {
        let registry = SpecialTypeRegistry::default();

        let err = registry.encode(SpecialKind::ObjectId, &5i32).unwrap_err();

        assert!(matches!(err, CodecError::Serialization(_)));
    }
}
