//! Typed field values and the per-type decode rules.
use std::fmt::Display;

use chrono::{NaiveDate, NaiveDateTime};
use derive_more::From;
#[cfg(feature = "serde")]
use serde::Serialize;

use crate::bits::BitChunk;
use crate::schema::FieldType;
use crate::{Error, Result};

/// A single decoded field value.
#[cfg_attr(feature = "serde", derive(Serialize), serde(untagged))]
#[derive(Debug, Clone, PartialEq, From)]
pub enum Value {
    UInt(u64),
    Int(i64),
    /// Single precision float, kept unwidened so its bits are preserved exactly
    Float32(f32),
    Float(f64),
    Date(NaiveDateTime),
    /// Placeholder for a field that could not be decoded, see
    /// [OnMalformedDate::Null](crate::OnMalformedDate::Null).
    Null,
}

impl Value {
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Value of either float variant, widened to double precision.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float32(v) => Some(f64::from(*v)),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_date(&self) -> Option<&NaiveDateTime> {
        match self {
            Value::Date(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// Text form used for delimited output. Floats use the shortest representation that round
/// trips, dates use microsecond precision and null is empty.
impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::UInt(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float32(v) => write!(f, "{v:?}"),
            Value::Float(v) => write!(f, "{v:?}"),
            Value::Date(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%.6f")),
            Value::Null => Ok(()),
        }
    }
}

/// Decode `chunk` according to a scalar field type.
///
/// Substructure fields carry no value of their own and are expanded by
/// [decode_record](crate::decode_record); passing [FieldType::Sub] here is a configuration error.
///
/// # Errors
/// [Error::UnsupportedWidth] if the chunk width does not fit the type, [Error::MalformedDate] if
/// a date field does not hold a valid timestamp.
pub fn decode_value(ty: &FieldType, chunk: &BitChunk) -> Result<Value> {
    match ty {
        FieldType::UInt => Ok(Value::UInt(chunk.as_unsigned()?)),
        FieldType::Int => Ok(Value::Int(chunk.as_signed()?)),
        FieldType::Float if chunk.width() == 32 => Ok(Value::Float32(chunk.as_f32()?)),
        FieldType::Float => Ok(Value::Float(chunk.as_float()?)),
        FieldType::Date => Ok(Value::Date(parse_date(&chunk.as_bytes()?)?)),
        FieldType::Sub(_) => Err(Error::Config(
            "substructure fields cannot be decoded as a single value".to_string(),
        )),
    }
}

/// Parse a fixed format ASCII timestamp, `YYYY-MM-DDTHH:MM:SS.ffffff`.
///
/// Leading and trailing ASCII whitespace and NUL padding is ignored. Every numeric group must be
/// zero padded to its full width. The fraction is required and may have 1 to 6 digits; it is read
/// as a decimal fraction of a second, so `.5` is 500000 microseconds. Years start at 0001.
///
/// # Errors
/// [Error::MalformedDate] with the untrimmed `raw` bytes if the text is not ASCII, does not have
/// the expected shape, or is not a valid calendar time.
pub fn parse_date(raw: &[u8]) -> Result<NaiveDateTime> {
    let malformed = || Error::MalformedDate { raw: raw.to_vec() };

    let is_pad = |b: &u8| b.is_ascii_whitespace() || *b == 0;
    let start = raw.iter().position(|b| !is_pad(b)).unwrap_or(raw.len());
    let end = raw.iter().rposition(|b| !is_pad(b)).map_or(start, |i| i + 1);
    let text = &raw[start..end];

    // YYYY-MM-DDTHH:MM:SS
    const BASE_LEN: usize = 19;
    if text.len() < BASE_LEN || !text.is_ascii() {
        return Err(malformed());
    }
    let (base, frac) = text.split_at(BASE_LEN);
    for (idx, sep) in [(4, b'-'), (7, b'-'), (10, b'T'), (13, b':'), (16, b':')] {
        if base[idx] != sep {
            return Err(malformed());
        }
    }

    let num = |from: usize, to: usize| digits(&base[from..to]).ok_or_else(malformed);
    let year = num(0, 4)?;
    let month = num(5, 7)?;
    let day = num(8, 10)?;
    let hour = num(11, 13)?;
    let minute = num(14, 16)?;
    let second = num(17, 19)?;

    if year == 0 {
        return Err(malformed());
    }

    let micros = match frac {
        [b'.', rest @ ..] if (1..=6).contains(&rest.len()) => {
            let value = digits(rest).ok_or_else(malformed)?;
            value * 10u32.pow(6 - rest.len() as u32)
        }
        _ => return Err(malformed()),
    };

    NaiveDate::from_ymd_opt(year as i32, month, day)
        .and_then(|d| d.and_hms_micro_opt(hour, minute, second, micros))
        .ok_or_else(malformed)
}

/// Value of a run of ASCII decimal digits, `None` if any byte is not a digit.
fn digits(s: &[u8]) -> Option<u32> {
    s.iter().try_fold(0u32, |acc, b| {
        b.is_ascii_digit().then(|| acc * 10 + u32::from(b - b'0'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::BitView;
    use test_case::test_case;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").unwrap()
    }

    #[test_case(b"2020-01-01T00:00:00.000000", "2020-01-01 00:00:00"; "microseconds")]
    #[test_case(b"2006-12-31T23:59:59.123", "2006-12-31 23:59:59.123"; "milliseconds")]
    #[test_case(b"2006-12-31T23:59:59.5", "2006-12-31 23:59:59.5"; "one fraction digit")]
    #[test_case(b"2020-02-29T12:30:45.000001  ", "2020-02-29 12:30:45.000001"; "trailing spaces")]
    #[test_case(b"2020-02-29T12:30:45.1\0\0\0", "2020-02-29 12:30:45.1"; "trailing nul")]
    #[test_case(b" 2020-02-29T12:30:45.1", "2020-02-29 12:30:45.1"; "leading space")]
    fn parse_date_ok(raw: &[u8], expected: &str) {
        assert_eq!(parse_date(raw).unwrap(), dt(expected));
    }

    #[test_case(b""; "empty")]
    #[test_case(b"                       "; "all padding")]
    #[test_case(b"2020-01-01 00:00:00.000"; "space separator")]
    #[test_case(b"2020/01/01T00:00:00.000"; "slash separator")]
    #[test_case(b"2020-1-01T00:00:00.000"; "unpadded month")]
    #[test_case(b"2020-13-01T00:00:00.000"; "month 13")]
    #[test_case(b"2019-02-29T00:00:00.000"; "not a leap year")]
    #[test_case(b"2020-01-01T24:00:00.000"; "hour 24")]
    #[test_case(b"2020-01-01T00:00:00"; "no fraction")]
    #[test_case(b"2020-01-01T00:00:00  "; "no fraction with padding")]
    #[test_case(b"0000-01-01T00:00:00.000000"; "year zero")]
    #[test_case(b"2020-01-01T00:00:00."; "empty fraction")]
    #[test_case(b"2020-01-01T00:00:00.1234567"; "seven fraction digits")]
    #[test_case(b"2020-01-01T00:00:00,000"; "comma fraction")]
    #[test_case(b"2020-0a-01T00:00:00.000"; "letter in month")]
    #[test_case(b"2020-01-01T00:00:00.0 0"; "interior space")]
    #[test_case("2020-01-01T00:00:00.\u{e9}".as_bytes(); "non ascii")]
    fn parse_date_malformed(raw: &[u8]) {
        match parse_date(raw) {
            Err(Error::MalformedDate { raw: got }) => assert_eq!(got, raw),
            zult => panic!("expected malformed date, got {zult:?}"),
        }
    }

    #[test]
    fn decode_value_by_type() {
        let dat = [0xff, 0xff, 0xff, 0xff];
        let chunk = BitView::new(&dat).slice(0, 32).unwrap();

        assert_eq!(
            decode_value(&FieldType::UInt, &chunk).unwrap(),
            Value::UInt(4_294_967_295)
        );
        assert_eq!(decode_value(&FieldType::Int, &chunk).unwrap(), Value::Int(-1));
        assert!(decode_value(&FieldType::Float, &chunk)
            .unwrap()
            .as_f64()
            .unwrap()
            .is_nan());
    }

    #[test]
    fn decode_date_value() {
        let mut dat = b"2020-01-01T00:00:00.000".to_vec();
        dat.extend([0u8; 3]);
        let chunk = BitView::new(&dat).slice(0, dat.len() * 8).unwrap();

        assert_eq!(
            decode_value(&FieldType::Date, &chunk).unwrap(),
            Value::Date(dt("2020-01-01 00:00:00"))
        );
    }

    #[test]
    fn display() {
        assert_eq!(Value::UInt(7).to_string(), "7");
        assert_eq!(Value::Int(-7).to_string(), "-7");
        assert_eq!(Value::Float(1.0).to_string(), "1.0");
        assert_eq!(Value::Float(0.1).to_string(), "0.1");
        assert_eq!(Value::Float32(0.1).to_string(), "0.1");
        assert_eq!(
            Value::Date(dt("2020-01-01 00:00:00")).to_string(),
            "2020-01-01 00:00:00.000000"
        );
        assert_eq!(Value::Null.to_string(), "");
    }

    #[test]
    fn from_primitives() {
        assert_eq!(Value::from(3u64), Value::UInt(3));
        assert_eq!(Value::from(-3i64), Value::Int(-3));
        assert_eq!(Value::from(0.5f64), Value::Float(0.5));
        assert_eq!(Value::from(0.5f32), Value::Float32(0.5));
    }
}
