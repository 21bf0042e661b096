//! Date and time values on the wire.
//!
//! Every supported temporal type is stored as a BSON datetime, i.e. signed
//! milliseconds since the Unix epoch. Only the UTC instant survives a round
//! trip: offsets are dropped and sub-millisecond precision is truncated.
//!
//! Struct fields holding chrono types can opt into the datetime form with
//! [`as_date`]:
//!
//! ```ignore
//! #[derive(Serialize, Deserialize)]
//! struct Event {
//!     #[serde(with = "docbridge::temporal::as_date")]
//!     at: chrono::DateTime<chrono::Utc>,
//! }
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bson::Bson;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use tracing::debug;

use crate::{
    error::{CodecError, CodecResult},
    shape::WireShape,
};

const MILLIS_PER_DAY: i64 = 86_400_000;

/// A value that can be represented as epoch milliseconds.
pub trait Temporal: Sized {
    /// Milliseconds since the Unix epoch, in UTC.
    fn to_epoch_millis(&self) -> i64;

    /// Rebuilds a value from epoch milliseconds, `None` when out of range.
    fn from_epoch_millis(millis: i64) -> Option<Self>;

    fn to_bson_datetime(&self) -> bson::DateTime {
        bson::DateTime::from_millis(self.to_epoch_millis())
    }
}

/// The concrete temporal types known to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemporalKind {
    Utc,
    FixedOffset,
    NaiveDateTime,
    NaiveDate,
    NaiveTime,
    BsonDateTime,
    SystemTime,
}

impl Temporal for DateTime<Utc> {
    fn to_epoch_millis(&self) -> i64 {
        self.timestamp_millis()
    }

    fn from_epoch_millis(millis: i64) -> Option<Self> {
        DateTime::from_timestamp_millis(millis)
    }
}

/// Decoded values carry a zero offset.
impl Temporal for DateTime<FixedOffset> {
    fn to_epoch_millis(&self) -> i64 {
        self.timestamp_millis()
    }

    fn from_epoch_millis(millis: i64) -> Option<Self> {
        DateTime::from_timestamp_millis(millis).map(|utc| utc.fixed_offset())
    }
}

/// Naive date-times are taken to be in UTC.
impl Temporal for NaiveDateTime {
    fn to_epoch_millis(&self) -> i64 {
        self.and_utc().timestamp_millis()
    }

    fn from_epoch_millis(millis: i64) -> Option<Self> {
        DateTime::from_timestamp_millis(millis).map(|utc| utc.naive_utc())
    }
}

/// Dates are stored as midnight UTC.
impl Temporal for NaiveDate {
    fn to_epoch_millis(&self) -> i64 {
        self.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
    }

    fn from_epoch_millis(millis: i64) -> Option<Self> {
        DateTime::from_timestamp_millis(millis).map(|utc| utc.date_naive())
    }
}

/// Times of day are stored on the epoch day.
impl Temporal for NaiveTime {
    fn to_epoch_millis(&self) -> i64 {
        let millis = (self.nanosecond() / 1_000_000).min(999);
        i64::from(self.num_seconds_from_midnight()) * 1000 + i64::from(millis)
    }

    fn from_epoch_millis(millis: i64) -> Option<Self> {
        let of_day = millis.rem_euclid(MILLIS_PER_DAY);
        NaiveTime::from_num_seconds_from_midnight_opt(
            (of_day / 1000) as u32,
            ((of_day % 1000) * 1_000_000) as u32,
        )
    }
}

impl Temporal for bson::DateTime {
    fn to_epoch_millis(&self) -> i64 {
        self.timestamp_millis()
    }

    fn from_epoch_millis(millis: i64) -> Option<Self> {
        Some(bson::DateTime::from_millis(millis))
    }

    fn to_bson_datetime(&self) -> bson::DateTime {
        *self
    }
}

impl Temporal for SystemTime {
    fn to_epoch_millis(&self) -> i64 {
        match self.duration_since(UNIX_EPOCH) {
            Ok(after) => i64::try_from(after.as_millis()).unwrap_or(i64::MAX),
            Err(before) => {
                let millis = before.duration().as_millis();
                // Round toward negative infinity, matching epoch-millis truncation.
                let whole = i64::try_from(millis).unwrap_or(i64::MAX);
                if before.duration().subsec_nanos() % 1_000_000 != 0 {
                    -whole - 1
                } else {
                    -whole
                }
            }
        }
    }

    fn from_epoch_millis(millis: i64) -> Option<Self> {
        if millis >= 0 {
            UNIX_EPOCH.checked_add(Duration::from_millis(millis.unsigned_abs()))
        } else {
            UNIX_EPOCH.checked_sub(Duration::from_millis(millis.unsigned_abs()))
        }
    }
}

/// Reads epoch milliseconds from any wire form a temporal value may take.
///
/// Besides BSON datetimes this accepts `{"$date": ...}` envelopes and, for
/// compatibility with data written by older clients, bare 32/64-bit integers.
pub fn millis_from_bson(bson: &Bson) -> CodecResult<i64> {
    match bson {
        Bson::DateTime(datetime) => Ok(datetime.timestamp_millis()),
        Bson::Int64(millis) => {
            debug!(target: "docbridge::codec", millis, "Reading bare integer as datetime");
            Ok(*millis)
        }
        Bson::Int32(millis) => {
            debug!(target: "docbridge::codec", millis, "Reading bare integer as datetime");
            Ok(i64::from(*millis))
        }
        Bson::Document(doc) => match doc.get("$date") {
            Some(Bson::Int64(millis)) => Ok(*millis),
            Some(Bson::Int32(millis)) => Ok(i64::from(*millis)),
            Some(Bson::Double(millis)) => Ok(*millis as i64),
            Some(Bson::String(text)) => parse_iso_millis(text),
            Some(Bson::Document(inner)) => inner
                .get_str("$numberLong")
                .map_err(|e| CodecError::InvalidExtendedJson(e.to_string()))?
                .parse()
                .map_err(|_| CodecError::InvalidExtendedJson(format!("bad $numberLong in {doc}"))),
            _ => Err(CodecError::mismatch(WireShape::Temporal, bson)),
        },
        other => Err(CodecError::mismatch(WireShape::Temporal, other)),
    }
}

/// Parses an RFC 3339 timestamp into epoch milliseconds.
pub fn parse_iso_millis(text: &str) -> CodecResult<i64> {
    DateTime::parse_from_rfc3339(text)
        .map(|parsed| parsed.timestamp_millis())
        .map_err(|e| CodecError::InvalidExtendedJson(format!("invalid $date {text:?}: {e}")))
}

/// Decodes a [`Temporal`] value from its wire form.
pub fn from_bson<T: Temporal>(bson: &Bson) -> CodecResult<T> {
    let millis = millis_from_bson(bson)?;
    T::from_epoch_millis(millis).ok_or_else(|| {
        CodecError::Serialization(format!(
            "{millis} ms is out of range for {}",
            std::any::type_name::<T>()
        ))
    })
}

/// Serde helpers writing a [`Temporal`] field as a BSON datetime.
pub mod as_date {
    use bson::Bson;
    use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};

    use super::Temporal;

    pub fn serialize<T: Temporal, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
        value.to_bson_datetime().serialize(serializer)
    }

    pub fn deserialize<'de, T: Temporal, D: Deserializer<'de>>(deserializer: D) -> Result<T, D::Error> {
        let bson = Bson::deserialize(deserializer)?;
        super::from_bson(&bson).map_err(D::Error::custom)
    }

    /// The same conversion for optional fields.
    pub mod option {
        use bson::Bson;
        use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};

        use crate::temporal::Temporal;

        pub fn serialize<T: Temporal, S: Serializer>(
            value: &Option<T>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            value.as_ref().map(Temporal::to_bson_datetime).serialize(serializer)
        }

        pub fn deserialize<'de, T: Temporal, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<T>, D::Error> {
            match Option::<Bson>::deserialize(deserializer)? {
                None | Some(Bson::Null) => Ok(None),
                Some(bson) => crate::temporal::from_bson(&bson).map(Some).map_err(D::Error::custom),
            }
        }
    }
}
