//! Arbitrary-scale decimal numbers stored as IEEE 754-2008 Decimal128.
//!
//! [`Decimal`] keeps a decimal coefficient and a base-10 exponent, so values
//! such as `19.99` are stored and read back digit for digit instead of going
//! through a binary floating point approximation. The BSON wire form is the
//! 16-byte binary integer decimal (BID) encoding.

use std::{
    fmt,
    hash::{Hash, Hasher},
    str::FromStr,
};

use bson::{Bson, Decimal128};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};

use crate::{
    error::{CodecError, CodecResult},
    shape::WireShape,
};

const MAX_DIGITS: usize = 34;
const MAX_COEFFICIENT: u128 = 9_999_999_999_999_999_999_999_999_999_999_999;
const EXPONENT_BIAS: i32 = 6176;
const MIN_EXPONENT: i32 = -6176;
const MAX_EXPONENT: i32 = 6111;

const SIGN_BIT: u128 = 1 << 127;
const COMBINATION_SHIFT: u32 = 122;
const NAN_MASK: u128 = 0x1f;
const INFINITY_MASK: u128 = 0x1e;
const COEFFICIENT_MASK: u128 = (1 << 113) - 1;

/// A decimal number `(-1)^negative * coefficient * 10^exponent`.
///
/// Equality and hashing compare numeric values, so `1.50` equals `1.5`.
#[derive(Debug, Clone, Copy)]
pub struct Decimal {
    negative: bool,
    coefficient: u128,
    exponent: i32,
}

impl Decimal {
    pub const ZERO: Decimal = Decimal {
        negative: false,
        coefficient: 0,
        exponent: 0,
    };

    /// Builds a decimal from its parts.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidDecimal`] when the value needs more than 34
    /// significant digits or its exponent falls outside the Decimal128 range.
    pub fn new(negative: bool, coefficient: u128, exponent: i32) -> CodecResult<Self> {
        let mut coefficient = coefficient;
        let mut exponent = i64::from(exponent);

        while coefficient > MAX_COEFFICIENT && coefficient % 10 == 0 {
            coefficient /= 10;
            exponent += 1;
        }
        if coefficient > MAX_COEFFICIENT {
            return Err(CodecError::InvalidDecimal(format!(
                "coefficient {coefficient} exceeds {MAX_DIGITS} digits"
            )));
        }

        Self::clamp(negative, coefficient, exponent)
    }

    /// Returns the coefficient.
    pub fn coefficient(&self) -> u128 {
        self.coefficient
    }

    /// Returns the base-10 exponent.
    pub fn exponent(&self) -> i32 {
        self.exponent
    }

    /// Number of digits after the decimal point, negative for scaled integers.
    pub fn scale(&self) -> i32 {
        -self.exponent
    }

    pub fn is_negative(&self) -> bool {
        self.negative && self.coefficient != 0
    }

    pub fn is_zero(&self) -> bool {
        self.coefficient == 0
    }

    /// Converts a finite `f64` using its shortest round-trip decimal rendering.
    ///
    /// `19.99f64` becomes exactly `19.99`, not the nearest binary fraction.
    pub fn from_f64(value: f64) -> CodecResult<Self> {
        if !value.is_finite() {
            return Err(CodecError::InvalidDecimal(value.to_string()));
        }
        value.to_string().parse()
    }

    /// Converts to the nearest `f64`. Precision beyond 17 digits is lost.
    pub fn to_f64(&self) -> f64 {
        self.to_string().parse().unwrap_or(f64::NAN)
    }

    /// Encodes this value as a BSON Decimal128.
    pub fn to_decimal128(&self) -> Decimal128 {
        let biased = (self.exponent + EXPONENT_BIAS) as u128;
        let mut bits = (biased << 113) | self.coefficient;
        if self.negative {
            bits |= SIGN_BIT;
        }
        Decimal128::from_bytes(bits.to_le_bytes())
    }

    /// Decodes a BSON Decimal128.
    ///
    /// # Errors
    ///
    /// NaN and infinities have no [`Decimal`] counterpart and are rejected.
    pub fn from_decimal128(value: &Decimal128) -> CodecResult<Self> {
        let bits = u128::from_le_bytes(value.bytes());
        let negative = bits & SIGN_BIT != 0;
        let combination = (bits >> COMBINATION_SHIFT) & NAN_MASK;

        if combination == NAN_MASK {
            return Err(CodecError::InvalidDecimal("NaN".into()));
        }
        if combination == INFINITY_MASK {
            let sign = if negative { "-" } else { "" };
            return Err(CodecError::InvalidDecimal(format!("{sign}Infinity")));
        }

        // The second encoding form always carries a coefficient above 10^34 - 1,
        // which reads as zero.
        let (biased, coefficient) = if (bits >> 125) & 0b11 == 0b11 {
            (((bits >> 111) & 0x3fff) as i32, 0)
        } else {
            let coefficient = bits & COEFFICIENT_MASK;
            (
                ((bits >> 113) & 0x3fff) as i32,
                if coefficient > MAX_COEFFICIENT { 0 } else { coefficient },
            )
        };

        Ok(Self {
            negative,
            coefficient,
            exponent: biased - EXPONENT_BIAS,
        })
    }

    /// Reads any numeric BSON value as a decimal.
    ///
    /// Accepts Decimal128, doubles, 32/64-bit integers, decimal strings and the
    /// `{"$numberDecimal": "..."}` envelope.
    pub fn try_from_bson(bson: &Bson) -> CodecResult<Self> {
        match bson {
            Bson::Decimal128(value) => Self::from_decimal128(value),
            Bson::Double(value) => Self::from_f64(*value),
            Bson::Int32(value) => Ok(Self::from(*value)),
            Bson::Int64(value) => Ok(Self::from(*value)),
            Bson::String(text) => text.parse(),
            Bson::Document(doc) => match doc.get_str("$numberDecimal") {
                Ok(text) => text.parse(),
                Err(_) => Err(CodecError::mismatch(WireShape::Number, bson)),
            },
            other => Err(CodecError::mismatch(WireShape::Number, other)),
        }
    }

    /// Numerically canonical parts: trailing zeros stripped, zero unsigned.
    fn normalized(&self) -> (bool, u128, i32) {
        if self.coefficient == 0 {
            return (false, 0, 0);
        }
        let mut coefficient = self.coefficient;
        let mut exponent = self.exponent;
        while coefficient % 10 == 0 {
            coefficient /= 10;
            exponent += 1;
        }
        (self.negative, coefficient, exponent)
    }

    /// Fits a coefficient that already has at most 34 digits into the exponent range.
    ///
    /// Only exact moves are made: trailing zeros are shed on underflow and
    /// zeros are appended on overflow. A value that would lose digits is an error.
    fn clamp(negative: bool, coefficient: u128, exponent: i64) -> CodecResult<Self> {
        let (min, max) = (i64::from(MIN_EXPONENT), i64::from(MAX_EXPONENT));
        if coefficient == 0 {
            return Ok(Self {
                negative,
                coefficient,
                exponent: exponent.clamp(min, max) as i32,
            });
        }

        let mut fitted = coefficient;
        let mut fitted_exponent = exponent;
        while fitted_exponent > max {
            match fitted.checked_mul(10) {
                Some(scaled) if scaled <= MAX_COEFFICIENT => fitted = scaled,
                _ => return Err(out_of_range(coefficient, exponent)),
            }
            fitted_exponent -= 1;
        }
        while fitted_exponent < min {
            if fitted % 10 != 0 {
                return Err(out_of_range(coefficient, exponent));
            }
            fitted /= 10;
            fitted_exponent += 1;
        }

        Ok(Self {
            negative,
            coefficient: fitted,
            exponent: fitted_exponent as i32,
        })
    }
}

fn out_of_range(coefficient: u128, exponent: i64) -> CodecError {
    CodecError::InvalidDecimal(format!(
        "{coefficient}E{exponent} cannot be represented exactly as a Decimal128"
    ))
}

/// `[+-]` followed by `NaN`, `Inf`, `Infinity` or digits with an optional point and exponent.
fn is_decimal_literal(text: &str) -> bool {
    let unsigned = text.strip_prefix(['+', '-']).unwrap_or(text);
    if ["nan", "inf", "infinity"]
        .iter()
        .any(|word| unsigned.eq_ignore_ascii_case(word))
    {
        return true;
    }

    let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    let (mantissa, exponent) = match unsigned.split_once(['e', 'E']) {
        Some((mantissa, exponent)) => (mantissa, Some(exponent)),
        None => (unsigned, None),
    };
    let exponent_ok = exponent.is_none_or(|exponent| {
        let digits = exponent.strip_prefix(['+', '-']).unwrap_or(exponent);
        !digits.is_empty() && all_digits(digits)
    });
    let (integer, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));

    exponent_ok && !(integer.is_empty() && fraction.is_empty()) && all_digits(integer) && all_digits(fraction)
}

impl FromStr for Decimal {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_decimal128(&parse_decimal128(s)?)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.to_decimal128(), f)
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl Eq for Decimal {}

impl Hash for Decimal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized().hash(state);
    }
}

impl Default for Decimal {
    fn default() -> Self {
        Self::ZERO
    }
}

macro_rules! impl_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Decimal {
                fn from(value: $ty) -> Self {
                    Self {
                        negative: value < 0,
                        coefficient: i128::from(value).unsigned_abs(),
                        exponent: 0,
                    }
                }
            }
        )*
    };
}

impl_from_integer!(i8, i16, i32, i64);

macro_rules! impl_from_unsigned {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Decimal {
                fn from(value: $ty) -> Self {
                    Self {
                        negative: false,
                        coefficient: u128::from(value),
                        exponent: 0,
                    }
                }
            }
        )*
    };
}

impl_from_unsigned!(u8, u16, u32, u64);

impl TryFrom<Decimal128> for Decimal {
    type Error = CodecError;

    fn try_from(value: Decimal128) -> Result<Self, Self::Error> {
        Self::from_decimal128(&value)
    }
}

impl From<Decimal> for Decimal128 {
    fn from(value: Decimal) -> Self {
        value.to_decimal128()
    }
}

impl From<Decimal> for Bson {
    fn from(value: Decimal) -> Self {
        Bson::Decimal128(value.to_decimal128())
    }
}

impl Serialize for Decimal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Bson::Decimal128(self.to_decimal128()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Decimal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bson = Bson::deserialize(deserializer)?;
        Decimal::try_from_bson(&bson).map_err(D::Error::custom)
    }
}

/// Renders any Decimal128, including NaN and the infinities.
pub fn decimal128_to_string(value: &Decimal128) -> String {
    value.to_string()
}

/// Parses the textual Decimal128 form, including `NaN` and `[-]Infinity`.
///
/// # Errors
///
/// Returns [`CodecError::InvalidDecimal`] for malformed text and for values
/// that would need rounding to fit 34 digits or the exponent range.
pub fn parse_decimal128(text: &str) -> CodecResult<Decimal128> {
    let text = text.trim();
    if !is_decimal_literal(text) {
        return Err(CodecError::InvalidDecimal(text.to_string()));
    }
    text.parse()
        .map_err(|e: bson::error::Error| CodecError::InvalidDecimal(format!("{text}: {e}")))
}

#[cfg(test)]
mod tests {
    use bson::{de::deserialize_from_bson, doc, ser::serialize_to_bson};
    use proptest::prelude::*;

    use super::*;

    fn dec(text: &str) -> Decimal {
        text.parse().unwrap()
    }

    #[test]
    fn test_price_keeps_its_digits() {
        let price = dec("19.99");

        assert_eq!(price.coefficient(), 1999);
        assert_eq!(price.scale(), 2);
        assert_eq!(price.to_string(), "19.99");

        let decoded = Decimal::from_decimal128(&price.to_decimal128()).unwrap();
        assert_eq!(decoded.to_string(), "19.99");
    }

    #[test]
    fn test_float_converts_through_shortest_rendering() {
        assert_eq!(Decimal::from_f64(19.99).unwrap().to_string(), "19.99");
        assert_eq!(Decimal::from_f64(0.1).unwrap(), dec("0.1"));
        assert!(Decimal::from_f64(f64::NAN).is_err());
    }

    #[test]
    fn test_one_has_known_bid_encoding() {
        let bytes = Decimal::from(1i32).to_decimal128().bytes();
        let bits = u128::from_le_bytes(bytes);

        assert_eq!(bits, 0x3040_0000_0000_0000_0000_0000_0000_0001);
    }

    #[test]
    fn test_display_switches_to_scientific() {
        assert_eq!(dec("1E+3").to_string(), "1E+3");
        assert_eq!(dec("0.000001").to_string(), "0.000001");
        assert_eq!(dec("0.0000001").to_string(), "1E-7");
        assert_eq!(dec("-12.50").to_string(), "-12.50");
        assert_eq!(dec("123e-2").to_string(), "1.23");
    }

    #[test]
    fn test_equality_is_numeric() {
        assert_eq!(dec("1.50"), dec("1.5"));
        assert_eq!(dec("0"), dec("-0.000"));
        assert_ne!(dec("1.5"), dec("-1.5"));
    }

    #[test]
    fn test_rejects_malformed_text() {
        for text in ["", ".", "1.2.3", "abc", "1e", "--1", "++5", "1e+", "0x10", "1_000"] {
            assert!(text.parse::<Decimal>().is_err(), "{text} should not parse");
        }
    }

    #[test]
    fn test_only_exact_narrowing_is_accepted() {
        let value = dec("1234567890123456789012345678901234000");
        assert_eq!(value.coefficient(), 1_234_567_890_123_456_789_012_345_678_901_234);
        assert_eq!(value.exponent(), 3);

        let tiny = dec("1200E-6178");
        assert_eq!(tiny.coefficient(), 12);
        assert_eq!(tiny.exponent(), -6176);

        let huge = dec("1E+6112");
        assert_eq!(huge.coefficient(), 10);
        assert_eq!(huge.exponent(), 6111);

        for text in ["1234567890123456789012345678901234567", "1251E-6178", "1E+6200"] {
            let err = text.parse::<Decimal>().unwrap_err();
            assert!(matches!(err, CodecError::InvalidDecimal(_)), "{text}");
        }
    }

    #[test]
    fn test_extreme_exponents_fail_fast() {
        let inputs = [
            "12345678901234567890123456789012345e9223372036854775807",
            "1e-9223372036854775807",
            "1e9223372036854775807",
            "1e-99999999999999999999999999999999999999",
        ];

        for text in inputs {
            assert!(text.parse::<Decimal>().is_err(), "{text}");
        }

        assert!(dec("0e-9223372036854775807").is_zero());
        assert!(dec("0e9223372036854775807").is_zero());
    }

    #[test]
    fn test_parts_are_fitted_without_rounding() {
        let value = Decimal::new(false, 1_200, -6_178).unwrap();
        assert_eq!((value.coefficient(), value.exponent()), (12, -6176));

        assert!(Decimal::new(false, 1_251, -6_178).is_err());
        assert!(Decimal::new(true, 7, i32::MIN).is_err());
        assert!(Decimal::new(false, 7, i32::MAX).is_err());
        assert!(Decimal::new(false, 0, i32::MIN).unwrap().is_zero());
    }

    #[test]
    fn test_special_values_render_but_do_not_convert() {
        let nan = parse_decimal128("NaN").unwrap();
        let negative_infinity = parse_decimal128("-Infinity").unwrap();

        assert_eq!(decimal128_to_string(&nan), "NaN");
        assert_eq!(decimal128_to_string(&negative_infinity), "-Infinity");
        assert!(Decimal::from_decimal128(&nan).is_err());
    }

    #[test]
    fn test_reads_every_numeric_form() {
        assert_eq!(Decimal::try_from_bson(&Bson::Int32(7)).unwrap(), dec("7"));
        assert_eq!(Decimal::try_from_bson(&Bson::Int64(-7)).unwrap(), dec("-7"));
        assert_eq!(Decimal::try_from_bson(&Bson::Double(2.5)).unwrap(), dec("2.5"));
        assert_eq!(Decimal::try_from_bson(&Bson::String("19.99".into())).unwrap(), dec("19.99"));
        assert_eq!(
            Decimal::try_from_bson(&Bson::Document(doc! { "$numberDecimal": "3.14" })).unwrap(),
            dec("3.14")
        );

        let err = Decimal::try_from_bson(&Bson::Boolean(true)).unwrap_err();
        assert!(matches!(err, CodecError::TypeMismatch { expected: WireShape::Number, .. }));
    }

    #[test]
    fn test_serde_goes_through_decimal128() {
        let bson = serialize_to_bson(&dec("19.99")).unwrap();
        assert!(matches!(bson, Bson::Decimal128(_)));

        let back: Decimal = deserialize_from_bson(bson).unwrap();
        assert_eq!(back.to_string(), "19.99");
    }

    proptest! {
        #[test]
        fn prop_decimal128_round_trip(
            negative in any::<bool>(),
            coefficient in 0u128..=MAX_COEFFICIENT,
            exponent in MIN_EXPONENT..=MAX_EXPONENT,
        ) {
            let value = Decimal::new(negative, coefficient, exponent).unwrap();
            let decoded = Decimal::from_decimal128(&value.to_decimal128()).unwrap();

            prop_assert_eq!(decoded.coefficient(), value.coefficient());
            prop_assert_eq!(decoded.exponent(), value.exponent());
        }

        #[test]
        fn prop_text_round_trip(
            negative in any::<bool>(),
            coefficient in 0u128..1_000_000_000_000_000_000u128,
            exponent in -40i32..40,
        ) {
            let value = Decimal::new(negative, coefficient, exponent).unwrap();
            let parsed: Decimal = value.to_string().parse().unwrap();

            prop_assert_eq!(parsed, value);
        }
    }
}
