use std::io::Read;

use modular_bitfield::prelude::*;

use crate::cursor::StreamCursor;
use crate::result::{Error, Result};
use crate::values::Value;

/// Wire numbers from PrimitiveTypeEnumeration. 4 is reserved and rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum PrimitiveKind {
    Boolean = 1,
    Byte = 2,
    Char = 3,
    Decimal = 5,
    Double = 6,
    Int16 = 7,
    Int32 = 8,
    Int64 = 9,
    SByte = 10,
    Single = 11,
    TimeSpan = 12,
    DateTime = 13,
    UInt16 = 14,
    UInt32 = 15,
    UInt64 = 16,
    Null = 17,
    String = 18,
}

impl PrimitiveKind {
    pub fn from_tag(tag: u8) -> Result<Self> {
        Ok(match tag {
            1 => Self::Boolean,
            2 => Self::Byte,
            3 => Self::Char,
            4 => return Err(Error::UnsupportedFeature("reserved primitive type 4")),
            5 => Self::Decimal,
            6 => Self::Double,
            7 => Self::Int16,
            8 => Self::Int32,
            9 => Self::Int64,
            10 => Self::SByte,
            11 => Self::Single,
            12 => Self::TimeSpan,
            13 => Self::DateTime,
            14 => Self::UInt16,
            15 => Self::UInt32,
            16 => Self::UInt64,
            17 => Self::Null,
            18 => Self::String,
            other => return Err(Error::BadTag(other)),
        })
    }

    /// Byte width of the encoding, for the kinds whose width does not
    /// depend on the value. Only these qualify for overwrite slots.
    pub fn fixed_width(self) -> Option<usize> {
        Some(match self {
            Self::Boolean | Self::Byte | Self::SByte => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Single => 4,
            Self::Int64 | Self::UInt64 | Self::Double => 8,
            _ => return None,
        })
    }
}

pub(crate) fn read_primitive<R: Read>(cur: &mut StreamCursor<R>, kind: PrimitiveKind) -> Result<Value> {
    Ok(match kind {
        PrimitiveKind::Boolean => Value::Bool(cur.read_bool()?),
        PrimitiveKind::Byte => Value::U8(cur.read_u8()?),
        PrimitiveKind::Char => Value::Char(read_char(cur)?),
        PrimitiveKind::Decimal => Value::Decimal(read_string(cur)?.into()),
        PrimitiveKind::Double => Value::F64(cur.read_f64()?),
        PrimitiveKind::Int16 => Value::I16(cur.read_i16()?),
        PrimitiveKind::Int32 => Value::I32(cur.read_i32()?),
        PrimitiveKind::Int64 => Value::I64(cur.read_i64()?),
        PrimitiveKind::SByte => Value::I8(cur.read_i8()?),
        PrimitiveKind::Single => Value::F32(cur.read_f32()?),
        PrimitiveKind::TimeSpan => Value::TimeSpan(TimeSpan::from_ticks(cur.read_i64()?)),
        PrimitiveKind::DateTime => Value::DateTime(DateTime::from_stamp(cur.read_u64()?)),
        PrimitiveKind::UInt16 => Value::U16(cur.read_u16()?),
        PrimitiveKind::UInt32 => Value::U32(cur.read_u32()?),
        PrimitiveKind::UInt64 => Value::U64(cur.read_u64()?),
        PrimitiveKind::Null => Value::Null,
        PrimitiveKind::String => Value::String(read_string(cur)?.into()),
    })
}

/// One UTF-8 scalar, read byte by byte because the encoded width is only
/// known once the accumulator decodes.
fn read_char<R: Read>(cur: &mut StreamCursor<R>) -> Result<char> {
    let mut buf = [0u8; 4];
    for len in 1..=buf.len() {
        buf[len - 1] = cur.read_u8()?;
        if let Ok(s) = std::str::from_utf8(&buf[..len]) {
            if let Some(c) = s.chars().next() {
                return Ok(c);
            }
        }
    }
    Err(Error::InvalidChar)
}

/// LengthPrefixedString: base-128 length over at most 5 bytes, then UTF-8.
pub(crate) fn read_string<R: Read>(cur: &mut StreamCursor<R>) -> Result<String> {
    let len = read_length_prefix(cur)?;
    let body = cur.read_vec(len)?;
    String::from_utf8(body).map_err(|_| Error::InvalidChar)
}

fn read_length_prefix<R: Read>(cur: &mut StreamCursor<R>) -> Result<usize> {
    let mut length = 0u64;
    for shift in (0..35).step_by(7) {
        let byte = cur.read_u8()?;
        length |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return usize::try_from(length).map_err(|_| Error::Overflow("string length prefix"));
        }
    }
    Err(Error::Overflow("string length prefix"))
}

/// A .NET TimeSpan: a signed duration counted in 100 ns ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeSpan {
    ticks: i64,
}

impl TimeSpan {
    pub(crate) fn from_ticks(ticks: i64) -> Self {
        Self { ticks }
    }

    pub fn ticks(&self) -> i64 {
        self.ticks
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateTimeKind {
    Unspecified,
    Utc,
    Local,
}

#[derive(BitfieldSpecifier, Debug, Clone, Copy)]
#[bits = 2]
enum RawKind {
    Unspecified = 0,
    Utc = 1,
    Local = 2,
    Reserved = 3,
}

#[bitfield]
struct RawStamp {
    ticks: B62,
    kind: RawKind,
}

/// A .NET DateTime: 100 ns ticks since 0001-01-01T00:00:00 (proleptic
/// Gregorian) plus the kind tag packed into the stamp's top two bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateTime {
    ticks: u64,
    kind: DateTimeKind,
}

impl DateTime {
    pub(crate) fn from_stamp(stamp: u64) -> Self {
        let raw = RawStamp::from_bytes(stamp.to_le_bytes());
        let kind = match raw.kind() {
            RawKind::Utc => DateTimeKind::Utc,
            RawKind::Local => DateTimeKind::Local,
            RawKind::Unspecified | RawKind::Reserved => DateTimeKind::Unspecified,
        };
        // The 62 tick bits are two's complement; instants before year 1
        // saturate silently to 0001-01-01T00:00:00.
        let raw_ticks = raw.ticks();
        let signed = if raw_ticks >= 1 << 61 {
            raw_ticks as i64 - (1 << 62)
        } else {
            raw_ticks as i64
        };
        let ticks = if signed < 0 { 0 } else { signed as u64 };
        Self { ticks, kind }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn kind(&self) -> DateTimeKind {
        self.kind
    }
}

fn int_of(value: &Value) -> Option<i128> {
    Some(match value {
        Value::Bool(v) => i128::from(*v),
        Value::I8(v) => i128::from(*v),
        Value::U8(v) => i128::from(*v),
        Value::I16(v) => i128::from(*v),
        Value::U16(v) => i128::from(*v),
        Value::I32(v) => i128::from(*v),
        Value::U32(v) => i128::from(*v),
        Value::I64(v) => i128::from(*v),
        Value::U64(v) => i128::from(*v),
        _ => return None,
    })
}

fn float_of(value: &Value) -> Option<f64> {
    match value {
        Value::F32(v) => Some(f64::from(*v)),
        Value::F64(v) => Some(*v),
        other => int_of(other).map(|v| v as f64),
    }
}

fn ranged(value: &Value, min: i128, max: i128) -> Result<i128> {
    let v = int_of(value).ok_or(Error::EncodingRange)?;
    if v < min || v > max {
        return Err(Error::EncodingRange);
    }
    Ok(v)
}

/// Encodes `value` with the fixed-width rule recorded for an overwrite
/// slot. Fails with `EncodingRange` when the value cannot be represented.
pub(crate) fn encode_fixed(kind: PrimitiveKind, value: &Value) -> Result<Vec<u8>> {
    match kind {
        PrimitiveKind::Boolean => {
            let v = int_of(value).ok_or(Error::EncodingRange)?;
            Ok(vec![u8::from(v != 0)])
        }
        PrimitiveKind::Byte => Ok(vec![ranged(value, 0, u8::MAX.into())? as u8]),
        PrimitiveKind::SByte => Ok((ranged(value, i8::MIN.into(), i8::MAX.into())? as i8)
            .to_le_bytes()
            .to_vec()),
        PrimitiveKind::Int16 => Ok((ranged(value, i16::MIN.into(), i16::MAX.into())? as i16)
            .to_le_bytes()
            .to_vec()),
        PrimitiveKind::UInt16 => Ok((ranged(value, 0, u16::MAX.into())? as u16)
            .to_le_bytes()
            .to_vec()),
        PrimitiveKind::Int32 => Ok((ranged(value, i32::MIN.into(), i32::MAX.into())? as i32)
            .to_le_bytes()
            .to_vec()),
        PrimitiveKind::UInt32 => Ok((ranged(value, 0, u32::MAX.into())? as u32)
            .to_le_bytes()
            .to_vec()),
        PrimitiveKind::Int64 => Ok((ranged(value, i64::MIN.into(), i64::MAX.into())? as i64)
            .to_le_bytes()
            .to_vec()),
        PrimitiveKind::UInt64 => Ok((ranged(value, 0, u64::MAX.into())? as u64)
            .to_le_bytes()
            .to_vec()),
        PrimitiveKind::Single => {
            let v = float_of(value).ok_or(Error::EncodingRange)?;
            if v.is_finite() && v.abs() > f64::from(f32::MAX) {
                return Err(Error::EncodingRange);
            }
            Ok((v as f32).to_le_bytes().to_vec())
        }
        PrimitiveKind::Double => {
            let v = float_of(value).ok_or(Error::EncodingRange)?;
            Ok(v.to_le_bytes().to_vec())
        }
        _ => Err(Error::NotWritable),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn datetime_stamp_unpacks_kind_and_ticks() {
        let stamp = 1234567890 | (2u64 << 62);
        let time = DateTime::from_stamp(stamp);
        assert_eq!(time.ticks(), 1234567890);
        assert_eq!(time.kind(), DateTimeKind::Local);
    }

    #[test]
    fn datetime_saturates_out_of_range_ticks() {
        // -1 tick in 62-bit two's complement, kind UTC
        let negative = ((1u64 << 62) - 1) | (1u64 << 62);
        let time = DateTime::from_stamp(negative);
        assert_eq!(time.ticks(), 0);
        assert_eq!(time.kind(), DateTimeKind::Utc);
    }

    #[test]
    fn fixed_encoding_checks_the_range() {
        assert_eq!(
            encode_fixed(PrimitiveKind::Int16, &Value::I32(-2)).unwrap(),
            vec![0xfe, 0xff]
        );
        assert_matches!(
            encode_fixed(PrimitiveKind::Byte, &Value::I32(256)),
            Err(Error::EncodingRange)
        );
        assert_matches!(
            encode_fixed(PrimitiveKind::Int32, &Value::F64(1.5)),
            Err(Error::EncodingRange)
        );
    }
}
