//! Textual rendering of BSON values as extended JSON.
//!
//! This is the fallback used wherever no binary writer is in scope: log lines,
//! textual filters and error messages. Writing uses the legacy envelopes
//! (`{"$oid": ...}`, `{"$date": <millis>}`, `{"$binary": ..., "$type": ...}`, ...).
//! Reading accepts those and the canonical extended JSON forms as well, so text
//! produced by other drivers parses too.
//!
//! Integers read back as `Int32` when they fit and `Int64` otherwise; every
//! special type survives a text round trip unchanged.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use bson::{Binary, Bson, DateTime, Document, Timestamp, oid::ObjectId, spec::BinarySubtype};
use serde_json::{Map, Value, json};

use crate::{
    decimal,
    error::{CodecError, CodecResult},
    temporal,
};

/// Renders a BSON value as extended JSON.
pub fn bson_to_json(bson: &Bson) -> Value {
    match bson {
        Bson::Double(value) if value.is_finite() => json!(value),
        Bson::Double(value) => {
            let text = if value.is_nan() {
                "NaN"
            } else if value.is_sign_negative() {
                "-Infinity"
            } else {
                "Infinity"
            };
            json!({ "$numberDouble": text })
        }
        Bson::String(text) => Value::String(text.clone()),
        Bson::Array(items) => Value::Array(items.iter().map(bson_to_json).collect()),
        Bson::Document(doc) => document_to_json(doc),
        Bson::Boolean(value) => Value::Bool(*value),
        Bson::Null => Value::Null,
        Bson::Int32(value) => json!(value),
        Bson::Int64(value) => json!(value),
        Bson::ObjectId(oid) => json!({ "$oid": oid.to_hex() }),
        Bson::DateTime(datetime) => json!({ "$date": datetime.timestamp_millis() }),
        Bson::Binary(bin) => json!({
            "$binary": STANDARD.encode(&bin.bytes),
            "$type": format!("{:02X}", u8::from(bin.subtype)),
        }),
        Bson::Decimal128(value) => json!({ "$numberDecimal": decimal::decimal128_to_string(value) }),
        Bson::Timestamp(ts) => json!({ "$timestamp": { "t": ts.time, "i": ts.increment } }),
        Bson::MinKey => json!({ "$minKey": 1 }),
        Bson::MaxKey => json!({ "$maxKey": 1 }),
        Bson::RegularExpression(_) => {
            let canonical = serde_json::to_value(bson).unwrap_or(Value::Null);
            let parts = &canonical["$regularExpression"];
            json!({ "$regex": parts["pattern"], "$options": parts["options"] })
        }
        other => serde_json::to_value(other).unwrap_or(Value::Null),
    }
}

/// Renders a document as an extended JSON object.
pub fn document_to_json(doc: &Document) -> Value {
    Value::Object(
        doc.iter()
            .map(|(key, value)| (key.clone(), bson_to_json(value)))
            .collect(),
    )
}

/// Renders a document as extended JSON text.
pub fn document_to_text(doc: &Document) -> String {
    document_to_json(doc).to_string()
}

/// Renders a BSON value as extended JSON text.
pub fn bson_to_text(bson: &Bson) -> String {
    bson_to_json(bson).to_string()
}

/// Reads extended JSON into BSON, resolving every known envelope.
///
/// # Errors
///
/// Returns [`CodecError::InvalidExtendedJson`] when an envelope's payload is
/// malformed, e.g. a `$oid` that is not 24 hex digits.
pub fn json_to_bson(value: Value) -> CodecResult<Bson> {
    Ok(match value {
        Value::Null => Bson::Null,
        Value::Bool(value) => Bson::Boolean(value),
        Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                i32::try_from(int).map(Bson::Int32).unwrap_or(Bson::Int64(int))
            } else {
                Bson::Double(number.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(text) => Bson::String(text),
        Value::Array(items) => Bson::Array(items.into_iter().map(json_to_bson).collect::<CodecResult<_>>()?),
        Value::Object(map) => match read_envelope(&map)? {
            Some(bson) => bson,
            None => Bson::Document(
                map.into_iter()
                    .map(|(key, value)| json_to_bson(value).map(|bson| (key, bson)))
                    .collect::<CodecResult<Document>>()?,
            ),
        },
    })
}

/// Parses extended JSON text into BSON.
pub fn text_to_bson(text: &str) -> CodecResult<Bson> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| CodecError::InvalidExtendedJson(e.to_string()))?;
    json_to_bson(value)
}

/// Parses extended JSON text that must describe a document.
pub fn text_to_document(text: &str) -> CodecResult<Document> {
    match text_to_bson(text)? {
        Bson::Document(doc) => Ok(doc),
        other => Err(CodecError::InvalidExtendedJson(format!(
            "expected a document, found {:?}",
            other.element_type()
        ))),
    }
}

/// Replaces a BSON document that spells out an envelope with the value it describes.
///
/// Values read through a structural decoder sometimes arrive as
/// `{"$oid": "..."}` documents instead of the element itself. Anything that is
/// not a recognised envelope is returned unchanged.
pub fn unwrap_envelope(bson: Bson) -> CodecResult<Bson> {
    let envelope = match &bson {
        Bson::Document(doc) if doc.keys().next().is_some_and(|key| key.starts_with('$')) => {
            match document_to_json(doc) {
                Value::Object(map) => read_envelope(&map)?,
                _ => None,
            }
        }
        _ => None,
    };
    Ok(envelope.unwrap_or(bson))
}

fn invalid(key: &str, value: &Value) -> CodecError {
    CodecError::InvalidExtendedJson(format!("malformed {key} envelope: {value}"))
}

fn string_field<'a>(key: &str, value: &'a Value) -> CodecResult<&'a str> {
    value.as_str().ok_or_else(|| invalid(key, value))
}

fn read_envelope(map: &Map<String, Value>) -> CodecResult<Option<Bson>> {
    let Some((key, value)) = map.iter().next() else {
        return Ok(None);
    };

    let bson = match (map.len(), key.as_str()) {
        (1, "$oid") => {
            let hex = string_field(key, value)?;
            Bson::ObjectId(ObjectId::parse_str(hex).map_err(|_| invalid(key, value))?)
        }
        (1, "$date") => Bson::DateTime(DateTime::from_millis(read_date(value)?)),
        (1, "$numberDecimal") => Bson::Decimal128(decimal::parse_decimal128(string_field(key, value)?)?),
        (1, "$numberLong") => Bson::Int64(string_field(key, value)?.parse().map_err(|_| invalid(key, value))?),
        (1, "$numberInt") => Bson::Int32(string_field(key, value)?.parse().map_err(|_| invalid(key, value))?),
        (1, "$numberDouble") => Bson::Double(read_double(string_field(key, value)?).ok_or_else(|| invalid(key, value))?),
        (1, "$timestamp") => {
            let field = |name: &str| {
                value[name]
                    .as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| invalid(key, value))
            };
            Bson::Timestamp(Timestamp { time: field("t")?, increment: field("i")? })
        }
        (1, "$minKey") => Bson::MinKey,
        (1, "$maxKey") => Bson::MaxKey,
        (1, "$binary") if value.is_object() => {
            let data = value["base64"].as_str().ok_or_else(|| invalid(key, value))?;
            let subtype = value["subType"].as_str().ok_or_else(|| invalid(key, value))?;
            binary(data, subtype).ok_or_else(|| invalid(key, value))?
        }
        (2, "$binary" | "$type") => {
            let data = map.get("$binary").and_then(Value::as_str);
            let subtype = map.get("$type").and_then(Value::as_str);
            let (Some(data), Some(subtype)) = (data, subtype) else {
                return Ok(None);
            };
            binary(data, subtype).ok_or_else(|| invalid("$binary", &Value::Object(map.clone())))?
        }
        (1, "$uuid") => {
            let uuid = uuid::Uuid::parse_str(string_field(key, value)?).map_err(|_| invalid(key, value))?;
            Bson::Binary(Binary { subtype: BinarySubtype::Uuid, bytes: uuid.as_bytes().to_vec() })
        }
        (1, "$regularExpression") => {
            let pattern = value["pattern"].as_str().ok_or_else(|| invalid(key, value))?;
            let options = value["options"].as_str().unwrap_or_default();
            regex(pattern, options)?
        }
        (2, "$regex" | "$options") => {
            let (Some(pattern), Some(options)) =
                (map.get("$regex").and_then(Value::as_str), map.get("$options").and_then(Value::as_str))
            else {
                return Ok(None);
            };
            regex(pattern, options)?
        }
        (1, "$symbol") => Bson::Symbol(string_field(key, value)?.to_string()),
        (1, "$code") => Bson::JavaScriptCode(string_field(key, value)?.to_string()),
        (1, "$undefined") => Bson::Undefined,
        _ => return Ok(None),
    };

    Ok(Some(bson))
}

fn read_date(value: &Value) -> CodecResult<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|millis| millis as i64))
            .ok_or_else(|| invalid("$date", value)),
        Value::String(text) => temporal::parse_iso_millis(text),
        Value::Object(inner) => inner
            .get("$numberLong")
            .and_then(Value::as_str)
            .and_then(|text| text.parse().ok())
            .ok_or_else(|| invalid("$date", value)),
        other => Err(invalid("$date", other)),
    }
}

fn read_double(text: &str) -> Option<f64> {
    match text {
        "NaN" => Some(f64::NAN),
        "Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        other => other.parse().ok(),
    }
}

fn binary(data: &str, subtype: &str) -> Option<Bson> {
    let bytes = STANDARD.decode(data).ok()?;
    let subtype = u8::from_str_radix(subtype, 16).ok()?;
    Some(Bson::Binary(Binary { subtype: BinarySubtype::from(subtype), bytes }))
}

fn regex(pattern: &str, options: &str) -> CodecResult<Bson> {
    serde_json::from_value::<Bson>(json!({
        "$regularExpression": { "pattern": pattern, "options": options }
    }))
    .map_err(|e| CodecError::InvalidExtendedJson(e.to_string()))
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;
    use crate::decimal::Decimal;

    fn text_round_trip(bson: Bson) -> Bson {
        text_to_bson(&bson_to_text(&bson)).unwrap()
    }

    #[test]
    fn test_writes_legacy_envelopes() {
        let oid = ObjectId::parse_str("65a1b2c3d4e5f60718293a4b").unwrap();
        let doc = doc! {
            "_id": oid,
            "at": DateTime::from_millis(1_500),
            "blob": Binary { subtype: BinarySubtype::Generic, bytes: b"hi".to_vec() },
            "price": Decimal::from(5i32).to_decimal128(),
            "ts": Timestamp { time: 3, increment: 4 },
            "low": Bson::MinKey,
        };

        assert_eq!(
            document_to_text(&doc),
            concat!(
                r#"{"_id":{"$oid":"65a1b2c3d4e5f60718293a4b"},"#,
                r#""at":{"$date":1500},"#,
                r#""blob":{"$binary":"aGk=","$type":"00"},"#,
                r#""price":{"$numberDecimal":"5"},"#,
                r#""ts":{"$timestamp":{"t":3,"i":4}},"#,
                r#""low":{"$minKey":1}}"#
            )
        );
    }

    #[test]
    fn test_special_types_survive_text_round_trip() {
        let values = [
            Bson::ObjectId(ObjectId::new()),
            Bson::DateTime(DateTime::from_millis(-86_400_000)),
            Bson::Binary(Binary { subtype: BinarySubtype::UserDefined(0x80), bytes: vec![9, 8, 7] }),
            Bson::Decimal128("19.99".parse::<Decimal>().unwrap().to_decimal128()),
            Bson::Timestamp(Timestamp { time: u32::MAX, increment: 1 }),
            Bson::MinKey,
            Bson::MaxKey,
            Bson::Int32(-5),
            Bson::Int64(i64::MAX),
            Bson::Double(2.5),
            Bson::Double(f64::INFINITY),
        ];

        for value in values {
            assert_eq!(text_round_trip(value.clone()), value);
        }
    }

    #[test]
    fn test_regex_round_trip() {
        let pattern = regex("^a.*z$", "i").unwrap();
        let json = bson_to_json(&pattern);

        assert_eq!(json, json!({ "$regex": "^a.*z$", "$options": "i" }));
        assert_eq!(json_to_bson(json).unwrap(), pattern);
    }

    #[test]
    fn test_reads_canonical_forms() {
        let parsed = text_to_document(
            r#"{
                "n": {"$numberLong": "12"},
                "i": {"$numberInt": "3"},
                "d": {"$numberDouble": "-Infinity"},
                "at": {"$date": {"$numberLong": "1000"}},
                "iso": {"$date": "1970-01-01T00:00:02Z"},
                "bin": {"$binary": {"base64": "AQI=", "subType": "05"}},
                "id": {"$uuid": "00112233-4455-6677-8899-aabbccddeeff"}
            }"#,
        )
        .unwrap();

        assert_eq!(parsed.get_i64("n").unwrap(), 12);
        assert_eq!(parsed.get_i32("i").unwrap(), 3);
        assert_eq!(parsed.get_f64("d").unwrap(), f64::NEG_INFINITY);
        assert_eq!(parsed.get_datetime("at").unwrap().timestamp_millis(), 1_000);
        assert_eq!(parsed.get_datetime("iso").unwrap().timestamp_millis(), 2_000);
        match parsed.get("bin") {
            Some(Bson::Binary(bin)) => assert_eq!(bin.subtype, BinarySubtype::Md5),
            other => panic!("expected md5 binary, got {other:?}"),
        }
        match parsed.get("id") {
            Some(Bson::Binary(bin)) => assert_eq!(bin.subtype, BinarySubtype::Uuid),
            other => panic!("expected uuid binary, got {other:?}"),
        }
    }

    #[test]
    fn test_small_integers_read_as_int32() {
        assert_eq!(json_to_bson(json!(7)).unwrap(), Bson::Int32(7));
        assert_eq!(json_to_bson(json!(5_000_000_000i64)).unwrap(), Bson::Int64(5_000_000_000));
    }

    #[test]
    fn test_query_operators_are_left_alone() {
        let filter = json!({ "age": { "$gt": 5 }, "name": { "$regex": "^a" } });

        let bson = json_to_bson(filter).unwrap();

        assert_eq!(bson, Bson::Document(doc! { "age": { "$gt": 5 }, "name": { "$regex": "^a" } }));
    }

    #[test]
    fn test_malformed_envelope_is_an_error() {
        let err = text_to_bson(r#"{"$oid": "not-hex"}"#).unwrap_err();

        assert!(matches!(err, CodecError::InvalidExtendedJson(_)));
    }

    #[test]
    fn test_unwrap_envelope_passes_plain_documents_through() {
        let plain = Bson::Document(doc! { "a": 1 });
        let wrapped = Bson::Document(doc! { "$minKey": 1 });

        assert_eq!(unwrap_envelope(plain.clone()).unwrap(), plain);
        assert_eq!(unwrap_envelope(wrapped).unwrap(), Bson::MinKey);
    }
}
