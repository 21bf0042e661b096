//! The document codec.
//!
//! [`Codec`] converts application values to BSON and back. Each value is first
//! classified into a [`WireShape`]; from there it takes one of two paths:
//!
//! - **Special scalar path.** Registered special types go to the
//!   [`SpecialTypeRegistry`]. Other scalar shapes are rendered to a textual
//!   token and transcoded into the exact BSON element for their shape.
//! - **Generic structural path.** Structs, maps, sequences and null go through
//!   the serde-based BSON serializer. Special types nested anywhere inside are
//!   still routed to the registry, so a nested UUID follows the configured
//!   representation and a nested chrono value is written as a BSON datetime.
//!
//! A codec is built once and shared behind an `Arc`. Apart from its memo
//! tables it is read-only.
//!
//! # Example
//!
//! ```ignore
//! use docbridge::codec::Codec;
//! use docbridge::registry::UuidRepresentation;
//!
//! let codec = Codec::builder()
//!     .uuid_representation(UuidRepresentation::Standard)
//!     .build();
//!
//! let bytes = codec.encode_to_vec(&user)?;
//! let back: User = codec.decode_from_slice(&bytes)?;
//! ```

use std::io::{Read, Write};

use bson::{Bson, DateTime, Document, de::deserialize_from_slice, oid::ObjectId, ser::serialize_to_vec};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::debug;

use crate::{
    bridge,
    error::{CodecError, CodecResult},
    extjson,
    id::IdGenerator,
    identity::{Identified, IdentityField, IdentityResolver},
    registry::{SpecialKind, SpecialTypeRegistry, UuidRepresentation},
    shape::{TypeClassifier, WireShape},
    temporal,
};

/// Settings fixed when a [`Codec`] is built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// How UUIDs are written. `None` writes them as hyphenated strings.
    pub uuid_representation: Option<UuidRepresentation>,
    /// How identifiers are generated for documents inserted without one.
    pub id_generator: IdGenerator,
}

/// Builder for a [`Codec`].
#[derive(Debug, Clone, Default)]
pub struct CodecBuilder {
    config: CodecConfig,
}

impl CodecBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing configuration.
    pub fn with_config(config: CodecConfig) -> Self {
        Self { config }
    }

    pub fn uuid_representation(mut self, representation: UuidRepresentation) -> Self {
        self.config.uuid_representation = Some(representation);
        self
    }

    pub fn id_generator(mut self, generator: IdGenerator) -> Self {
        self.config.id_generator = generator;
        self
    }

    pub fn build(self) -> Codec {
        Codec::new(self.config)
    }
}

/// Converts values between Rust types, BSON values, BSON bytes and extended JSON.
#[derive(Debug, Default)]
pub struct Codec {
    config: CodecConfig,
    registry: SpecialTypeRegistry,
    classifier: TypeClassifier,
    identities: IdentityResolver,
}

impl Codec {
    pub fn new(config: CodecConfig) -> Self {
        Self {
            registry: SpecialTypeRegistry::new(config.uuid_representation),
            classifier: TypeClassifier::new(),
            identities: IdentityResolver::new(),
            config,
        }
    }

    pub fn builder() -> CodecBuilder {
        CodecBuilder::new()
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn classifier(&self) -> &TypeClassifier {
        &self.classifier
    }

    pub fn registry(&self) -> &SpecialTypeRegistry {
        &self.registry
    }

    /// Converts a value to BSON.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Serialization`] if the value cannot be represented
    /// in BSON, e.g. a map with non-string keys.
    pub fn encode<T: Serialize + 'static>(&self, value: &T) -> CodecResult<Bson> {
        if let Some(kind) = SpecialKind::of::<T>() {
            return self.registry.encode(kind, value);
        }

        match self.classifier.classify(value) {
            None => self.encode_structural(value),
            Some(shape) if shape.is_structural() => self.encode_structural(value),
            Some(shape) => self.encode_scalar(shape, value),
        }
    }

    fn encode_structural<T: Serialize + ?Sized>(&self, value: &T) -> CodecResult<Bson> {
        bridge::to_bson(&self.registry, value)
    }

    /// Renders a scalar through its textual token and rebuilds the BSON element for `shape`.
    fn encode_scalar<T: Serialize>(&self, shape: WireShape, value: &T) -> CodecResult<Bson> {
        let token = serde_json::to_value(value)?;
        let transcoded = match (shape, &token) {
            (WireShape::Integer, Value::Number(number)) => number.as_i64().map(Bson::Int64),
            (WireShape::Number, Value::Number(number)) => number.as_f64().map(Bson::Double),
            (WireShape::Boolean, Value::Bool(flag)) => Some(Bson::Boolean(*flag)),
            (WireShape::String, Value::String(text)) => Some(Bson::String(text.clone())),
            (WireShape::Identifier, Value::String(hex)) => ObjectId::parse_str(hex).ok().map(Bson::ObjectId),
            (WireShape::Temporal, Value::Number(millis)) => {
                millis.as_i64().map(|millis| Bson::DateTime(DateTime::from_millis(millis)))
            }
            (WireShape::Temporal, Value::String(text)) => temporal::parse_iso_millis(text)
                .ok()
                .map(|millis| Bson::DateTime(DateTime::from_millis(millis))),
            (WireShape::Identifier | WireShape::Temporal, Value::Object(_)) => {
                extjson::json_to_bson(token.clone())
                    .ok()
                    .filter(|bson| WireShape::of_element(bson.element_type()) == Some(shape))
            }
            _ => None,
        };

        match transcoded {
            Some(bson) => Ok(bson),
            None => {
                debug!(
                    target: "docbridge::codec",
                    type_name = std::any::type_name::<T>(),
                    %shape,
                    "Token does not fit its shape, using the structural mapper"
                );
                self.encode_structural(value)
            }
        }
    }

    /// Converts a value to a BSON document.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::TypeMismatch`] if the value does not encode to a document.
    pub fn encode_document<T: Serialize + 'static>(&self, value: &T) -> CodecResult<Document> {
        match self.encode(value)? {
            Bson::Document(doc) => Ok(doc),
            other => Err(CodecError::mismatch(WireShape::Object, &other)),
        }
    }

    /// Converts a value to BSON document bytes.
    pub fn encode_to_vec<T: Serialize + 'static>(&self, value: &T) -> CodecResult<Vec<u8>> {
        let doc = self.encode_document(value)?;
        Ok(serialize_to_vec(&doc)?)
    }

    /// Writes a value as BSON document bytes.
    ///
    /// The document is fully encoded before anything is written.
    pub fn encode_to_writer<T: Serialize + 'static, W: Write>(
        &self,
        value: &T,
        mut writer: W,
    ) -> CodecResult<()> {
        let bytes = self.encode_to_vec(value)?;
        writer.write_all(&bytes)?;
        Ok(())
    }

    /// Converts BSON to a value.
    ///
    /// A string that the structural mapper rejects is retried once as extended
    /// JSON text describing the target.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::TypeMismatch`] for incompatible special-type input
    /// and [`CodecError::Serialization`] when the structural mapper fails.
    pub fn decode<T: DeserializeOwned + 'static>(&self, bson: Bson) -> CodecResult<T> {
        if let Some(kind) = SpecialKind::of::<T>() {
            return self.registry.decode(kind, bson);
        }

        match bson {
            Bson::String(text) => match self.decode_structural::<T>(Bson::String(text.clone())) {
                Ok(value) => Ok(value),
                Err(err) => {
                    debug!(
                        target: "docbridge::codec",
                        type_name = std::any::type_name::<T>(),
                        error = %err,
                        "Retrying string as extended JSON"
                    );
                    self.decode_text_structural(&text).map_err(|_| err)
                }
            },
            other => self.decode_structural(other),
        }
    }

    fn decode_structural<T: DeserializeOwned>(&self, bson: Bson) -> CodecResult<T> {
        bridge::from_bson(&self.registry, bson)
    }

    /// Reads extended JSON text through the structural mapper only.
    fn decode_text_structural<T: DeserializeOwned>(&self, text: &str) -> CodecResult<T> {
        self.decode_structural(extjson::text_to_bson(text)?)
    }

    /// Converts a BSON document to a value.
    pub fn decode_document<T: DeserializeOwned + 'static>(&self, doc: Document) -> CodecResult<T> {
        self.decode(Bson::Document(doc))
    }

    /// Converts BSON document bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Serialization`] for malformed or truncated input.
    pub fn decode_from_slice<T: DeserializeOwned + 'static>(&self, bytes: &[u8]) -> CodecResult<T> {
        let doc: Document = deserialize_from_slice(bytes)?;
        self.decode_document(doc)
    }

    /// Reads one BSON document from `reader` and converts it to a value.
    pub fn decode_from_reader<T: DeserializeOwned + 'static, R: Read>(
        &self,
        mut reader: R,
    ) -> CodecResult<T> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        self.decode_from_slice(&bytes)
    }

    /// Renders a value as extended JSON text.
    pub fn to_text<T: Serialize + 'static>(&self, value: &T) -> CodecResult<String> {
        Ok(extjson::bson_to_text(&self.encode(value)?))
    }

    /// Reads a value from extended JSON text.
    pub fn from_text<T: DeserializeOwned + 'static>(&self, text: &str) -> CodecResult<T> {
        self.decode(extjson::text_to_bson(text)?)
    }

    /// Returns the identity field of `D`, if it has one.
    pub fn find_identity_field<D: Identified>(&self) -> Option<IdentityField<D>> {
        self.identities.find_identity_field::<D>()
    }

    /// Returns the identifier of `document`, or `None` when it has none.
    pub fn identity_value<D: Identified>(&self, document: &D) -> CodecResult<Option<Bson>> {
        self.identities.identity_value(document)
    }

    /// Fills an unset identity with an identifier from the configured generator.
    pub fn ensure_identity_present<D: Identified>(&self, document: D) -> CodecResult<D> {
        self.identities
            .ensure_identity_present(document, self.config.id_generator)
    }

    /// Returns the identifier of `document`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::MissingIdentity`] or [`CodecError::UnsetIdentity`]
    /// when there is no identifier to return.
    pub fn document_id<D: Identified>(&self, document: &D) -> CodecResult<Bson> {
        self.identities.document_id(document)
    }

    /// Makes sure `document` has an identifier, then encodes it.
    ///
    /// Returns the document as it will be stored alongside its encoded form.
    pub fn encode_for_insert<D: Identified + Serialize>(&self, document: D) -> CodecResult<(D, Document)> {
        let document = self.ensure_identity_present(document)?;
        let encoded = self.encode_document(&document)?;
        Ok((document, encoded))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use bson::{Binary, Timestamp, doc, spec::BinarySubtype};
    use chrono::{NaiveDate, TimeZone, Utc};
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::{
        decimal::Decimal,
        id::Id,
        identity::IdentityField,
        registry::{MaxKey, MinKey},
        temporal::as_date,
    };

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Order {
        #[serde(rename = "_id", skip_serializing_if = "Option::is_none", default)]
        id: Option<Id<Order>>,
        price: Decimal,
        #[serde(with = "as_date")]
        placed_at: chrono::DateTime<Utc>,
        tags: Vec<String>,
        low: MinKey,
        high: MaxKey,
        blob: Binary,
        ts: Timestamp,
    }

    impl Identified for Order {
        fn identity_field() -> Option<IdentityField<Self>> {
            Some(IdentityField::new("id", "_id", |d| &d.id, |d| &mut d.id))
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Reading {
        at: chrono::DateTime<Utc>,
        local: chrono::NaiveDateTime,
        day: NaiveDate,
        sensor: uuid::Uuid,
        batch: bson::Uuid,
        until: Option<chrono::DateTime<Utc>>,
        history: Vec<chrono::DateTime<Utc>>,
    }

    #[derive(Debug, PartialEq, Deserialize)]
    struct Stamp {
        at: chrono::DateTime<Utc>,
        day: Option<NaiveDate>,
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Celsius(f64);

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sku(String);

    const SENSOR: [u8; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15];

    fn reading() -> Reading {
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        Reading {
            at,
            local: at.naive_utc(),
            day: NaiveDate::from_ymd_opt(2023, 11, 14).unwrap(),
            sensor: uuid::Uuid::from_bytes(SENSOR),
            batch: bson::Uuid::from_bytes(SENSOR),
            until: Some(at),
            history: vec![Utc.timestamp_millis_opt(0).unwrap(), at],
        }
    }

    fn order() -> Order {
        Order {
            id: None,
            price: "19.99".parse().unwrap(),
            placed_at: Utc.timestamp_millis_opt(1_700_000_000_123).unwrap(),
            tags: vec!["new".into()],
            low: MinKey,
            high: MaxKey,
            blob: Binary { subtype: BinarySubtype::Generic, bytes: vec![1, 2, 3] },
            ts: Timestamp { time: 10, increment: 2 },
        }
    }

    #[test]
    fn test_document_round_trip_through_bytes() {
        let codec = Codec::default();
        let (stored, _) = codec.encode_for_insert(order()).unwrap();

        let bytes = codec.encode_to_vec(&stored).unwrap();
        let back: Order = codec.decode_from_slice(&bytes).unwrap();

        assert_eq!(back, stored);
        assert_eq!(back.price.to_string(), "19.99");
    }

    #[test]
    fn test_nested_special_types_use_their_elements() {
        let codec = Codec::default();
        let doc = codec.encode_document(&order()).unwrap();

        assert!(matches!(doc.get("price"), Some(Bson::Decimal128(_))));
        assert!(matches!(doc.get("placed_at"), Some(Bson::DateTime(_))));
        assert!(matches!(doc.get("low"), Some(Bson::MinKey)));
        assert!(matches!(doc.get("high"), Some(Bson::MaxKey)));
        assert!(matches!(doc.get("blob"), Some(Bson::Binary(_))));
        assert!(matches!(doc.get("ts"), Some(Bson::Timestamp(_))));
        assert!(!doc.contains_key("_id"));
    }

    #[test]
    fn test_scalars_are_transcoded_by_shape() {
        let codec = Codec::default();

        assert_eq!(codec.encode(&5i32).unwrap(), Bson::Int64(5));
        assert_eq!(codec.encode(&2.5f32).unwrap(), Bson::Double(2.5));
        assert_eq!(codec.encode(&true).unwrap(), Bson::Boolean(true));
        assert_eq!(codec.encode(&Celsius(21.5)).unwrap(), Bson::Double(21.5));
        assert_eq!(codec.encode(&Sku("A-1".into())).unwrap(), Bson::String("A-1".into()));
    }

    #[test]
    fn test_typed_ids_encode_as_their_kind() {
        let codec = Codec::default();
        let oid = ObjectId::new();

        assert_eq!(codec.encode(&Id::<Order>::from(oid)).unwrap(), Bson::ObjectId(oid));
        assert_eq!(codec.encode(&Id::<Order>::from("o-1")).unwrap(), Bson::String("o-1".into()));
    }

    #[test]
    fn test_object_id_round_trip() {
        let codec = Codec::default();
        let oid = ObjectId::new();

        let encoded = codec.encode(&oid).unwrap();
        let decoded: ObjectId = codec.decode(encoded).unwrap();

        assert_eq!(decoded, oid);
    }

    #[test]
    fn test_null_goes_through_structural_mapper() {
        let codec = Codec::default();

        assert_eq!(codec.encode(&Option::<i32>::None).unwrap(), Bson::Null);
        assert_eq!(codec.decode::<Option<i32>>(Bson::Null).unwrap(), None);
    }

    #[test]
    fn test_maps_and_sequences_are_structural() {
        let codec = Codec::default();
        let map = BTreeMap::from([("a".to_string(), 1i32)]);

        assert_eq!(codec.encode(&map).unwrap(), Bson::Document(doc! { "a": 1 }));
        assert_eq!(codec.encode(&vec![1i32, 2]).unwrap(), Bson::Array(vec![Bson::Int32(1), Bson::Int32(2)]));
    }

    #[test]
    fn test_string_input_is_retried_as_text() {
        let codec = Codec::default();
        let text = Bson::String(r#"{"a": 1}"#.into());

        let decoded: BTreeMap<String, i32> = codec.decode(text).unwrap();

        assert_eq!(decoded.get("a"), Some(&1));
    }

    #[test]
    fn test_failed_text_retry_reports_original_error() {
        let codec = Codec::default();

        let err = codec.decode::<Vec<i32>>(Bson::String("not json".into())).unwrap_err();

        assert!(matches!(err, CodecError::Serialization(_)));
    }

    #[test]
    fn test_text_and_binary_paths_agree() {
        let codec = Codec::default();
        let (stored, _) = codec.encode_for_insert(order()).unwrap();

        let text = codec.to_text(&stored).unwrap();
        let from_text: Order = codec.from_text(&text).unwrap();
        let from_bytes: Order = codec.decode_from_slice(&codec.encode_to_vec(&stored).unwrap()).unwrap();

        assert_eq!(from_text, from_bytes);
    }

    #[test]
    fn test_non_document_cannot_be_written_as_bytes() {
        let codec = Codec::default();

        let err = codec.encode_to_vec(&5i64).unwrap_err();

        assert!(matches!(err, CodecError::TypeMismatch { expected: WireShape::Object, .. }));
    }

    #[test]
    fn test_truncated_bytes_fail_without_partial_output() {
        let codec = Codec::default();
        let bytes = codec.encode_to_vec(&order()).unwrap();

        let result: CodecResult<Order> = codec.decode_from_slice(&bytes[..bytes.len() / 2]);

        assert!(result.is_err());
    }

    #[test]
    fn test_writer_and_reader_round_trip() {
        let codec = Codec::default();
        let mut buffer = Vec::new();

        codec.encode_to_writer(&order(), &mut buffer).unwrap();
        let back: Order = codec.decode_from_reader(buffer.as_slice()).unwrap();

        assert_eq!(back, order());
    }

    #[test]
    fn test_insert_fills_identity_from_configured_generator() {
        let codec = Codec::builder().id_generator(IdGenerator::UuidString).build();

        let (stored, encoded) = codec.encode_for_insert(order()).unwrap();
        let id = stored.id.clone().unwrap();

        assert!(id.as_str().is_some());
        assert_eq!(encoded.get("_id"), Some(&id.to_bson()));
        assert_eq!(codec.document_id(&stored).unwrap(), id.to_bson());
    }

    #[test]
    fn test_configured_uuid_representation_is_used() {
        let codec = Codec::builder()
            .uuid_representation(UuidRepresentation::Standard)
            .build();
        let uuid = uuid::Uuid::new_v4();

        match codec.encode(&uuid).unwrap() {
            Bson::Binary(bin) => assert_eq!(bin.subtype, BinarySubtype::Uuid),
            other => panic!("expected binary, got {other:?}"),
        }
    }

    #[test]
    fn test_nested_dates_and_uuids_reach_the_registry() {
        let codec = Codec::builder()
            .uuid_representation(UuidRepresentation::Standard)
            .build();
        let at = Bson::DateTime(DateTime::from_millis(1_700_000_000_123));
        let uuid = Bson::Binary(Binary { subtype: BinarySubtype::Uuid, bytes: SENSOR.to_vec() });

        let doc = codec.encode_document(&reading()).unwrap();

        assert_eq!(doc.get("at"), Some(&at));
        assert_eq!(doc.get("local"), Some(&at));
        assert_eq!(doc.get("day"), Some(&Bson::DateTime(DateTime::from_millis(1_699_920_000_000))));
        assert_eq!(doc.get("sensor"), Some(&uuid));
        assert_eq!(doc.get("batch"), Some(&uuid));
        assert_eq!(doc.get("until"), Some(&at));
        assert_eq!(
            doc.get_array("history").unwrap(),
            &vec![Bson::DateTime(DateTime::from_millis(0)), at.clone()]
        );

        let back: Reading = codec.decode_document(doc).unwrap();
        assert_eq!(back, reading());

        let from_bytes: Reading = codec.decode_from_slice(&codec.encode_to_vec(&reading()).unwrap()).unwrap();
        let from_text: Reading = codec.from_text(&codec.to_text(&reading()).unwrap()).unwrap();
        assert_eq!(from_bytes, reading());
        assert_eq!(from_text, reading());
    }

    #[test]
    fn test_nested_uuids_follow_every_representation() {
        let representations = [
            UuidRepresentation::Standard,
            UuidRepresentation::JavaLegacy,
            UuidRepresentation::CSharpLegacy,
            UuidRepresentation::PythonLegacy,
        ];

        for representation in representations {
            let codec = Codec::builder().uuid_representation(representation).build();
            let expected = Bson::Binary(Binary {
                subtype: representation.subtype(),
                bytes: representation.reorder(SENSOR).to_vec(),
            });

            let doc = codec.encode_document(&reading()).unwrap();
            assert_eq!(doc.get("sensor"), Some(&expected), "{representation:?}");
            assert_eq!(doc.get("batch"), Some(&expected), "{representation:?}");

            let back: Reading = codec.decode_document(doc).unwrap();
            assert_eq!(back, reading(), "{representation:?}");
        }

        let codec = Codec::default();
        let doc = codec.encode_document(&reading()).unwrap();
        let text = Bson::String(uuid::Uuid::from_bytes(SENSOR).hyphenated().to_string());
        assert_eq!(doc.get("sensor"), Some(&text));
        assert_eq!(doc.get("batch"), Some(&text));
        assert_eq!(codec.decode_document::<Reading>(doc).unwrap(), reading());
    }

    #[test]
    fn test_nested_dates_read_stored_datetimes_and_bare_integers() {
        let codec = Codec::default();
        let five = Utc.timestamp_millis_opt(5).unwrap();

        let from_date: Stamp = codec
            .decode_document(doc! { "at": DateTime::from_millis(5), "day": null })
            .unwrap();
        let from_long: Stamp = codec
            .decode_document(doc! { "at": 5i64, "day": 86_400_000i64 })
            .unwrap();
        let from_int: Stamp = codec.decode_document(doc! { "at": 5i32 }).unwrap();

        assert_eq!(from_date, Stamp { at: five, day: None });
        assert_eq!(from_long, Stamp { at: five, day: NaiveDate::from_ymd_opt(1970, 1, 2) });
        assert_eq!(from_int.at, five);

        let err = codec.decode_document::<Stamp>(doc! { "at": true }).unwrap_err();
        assert!(matches!(err, CodecError::Serialization(_)));
    }

    #[test]
    fn test_nested_legacy_uuid_is_rejected_without_matching_representation() {
        let codec = Codec::builder()
            .uuid_representation(UuidRepresentation::Standard)
            .build();
        let legacy = Binary { subtype: BinarySubtype::UuidOld, bytes: SENSOR.to_vec() };

        let result = codec.decode_document::<BTreeMap<String, uuid::Uuid>>(doc! { "u": legacy });

        assert!(result.is_err());
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: CodecConfig =
            serde_json::from_str(r#"{"uuid_representation": "java_legacy"}"#).unwrap();

        assert_eq!(config.uuid_representation, Some(UuidRepresentation::JavaLegacy));
        assert_eq!(config.id_generator, IdGenerator::ObjectId);
    }
}
