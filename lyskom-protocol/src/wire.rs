//! Protocol A primitive values.
//!
//! ```text
//! INT32      123              digits, terminated by one consumed delimiter
//! BOOL       0 | 1
//! HOLLERITH  5Hhello          length, 'H', raw bytes
//! BITSTRING  01001000         fixed number of '0'/'1'
//! ARRAY      3 { a b c }      or the elided form `3 *`
//! TIME       sec min hour mday mon year wday yday isdst
//! ```

use crate::buffer::StreamBuffer;
use crate::error::ProtocolError;
use bytes::{BufMut, Bytes, BytesMut};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::{Serialize, Serializer};
use std::fmt;

/// Values that can be parsed from the receive buffer.
///
/// Implementations return [`ProtocolError::Incomplete`] when the buffer ends
/// mid-value; the caller is responsible for rewinding.
pub trait WireDecode: Sized {
    fn decode(buf: &mut StreamBuffer) -> Result<Self, ProtocolError>;
}

/// Values that can be written as a request argument.
pub trait WireEncode {
    fn encode(&self, out: &mut BytesMut);
}

// =========================================================================
// Decoding
// =========================================================================

/// Reads an integer and returns it together with the consumed delimiter.
pub fn read_int_delimited(buf: &mut StreamBuffer) -> Result<(u32, u8), ProtocolError> {
    let first = buf.next_non_ws()?;
    if !first.is_ascii_digit() {
        return Err(ProtocolError::ExpectedDigit(first as char));
    }
    let mut value = u32::from(first - b'0');
    loop {
        let byte = buf.next_byte()?;
        if !byte.is_ascii_digit() {
            return Ok((value, byte));
        }
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add(u32::from(byte - b'0')))
            .ok_or(ProtocolError::IntegerOverflow)?;
    }
}

pub fn read_int(buf: &mut StreamBuffer) -> Result<u32, ProtocolError> {
    read_int_delimited(buf).map(|(value, _)| value)
}

pub fn read_bool(buf: &mut StreamBuffer) -> Result<bool, ProtocolError> {
    match read_int(buf)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(ProtocolError::InvalidBool(other)),
    }
}

pub fn read_hollerith(buf: &mut StreamBuffer) -> Result<Bytes, ProtocolError> {
    let (len, terminator) = read_int_delimited(buf)?;
    if terminator != b'H' {
        return Err(ProtocolError::BadHollerithTerminator(terminator as char));
    }
    buf.take(len as usize)
}

/// Reads a bitstring of exactly `N` characters.
pub fn read_bits<const N: usize>(buf: &mut StreamBuffer) -> Result<[bool; N], ProtocolError> {
    buf.peek_non_ws()?;
    let mut bits = [false; N];
    for bit in bits.iter_mut() {
        *bit = match buf.next_byte()? {
            b'0' => false,
            b'1' => true,
            other => return Err(ProtocolError::InvalidBit(other as char)),
        };
    }
    Ok(bits)
}

/// Reads an array, decoding each element with `item`.
///
/// The elided form `<count> *` yields an empty vector whatever the count.
pub fn read_array<T, F>(buf: &mut StreamBuffer, mut item: F) -> Result<Vec<T>, ProtocolError>
where
    F: FnMut(&mut StreamBuffer) -> Result<T, ProtocolError>,
{
    let count = read_int(buf)? as usize;
    match buf.next_non_ws()? {
        b'*' => Ok(Vec::new()),
        b'{' => {
            let mut items = Vec::with_capacity(count.min(1024));
            while buf.peek_non_ws()? != b'}' {
                items.push(item(buf)?);
            }
            buf.next_byte()?;
            Ok(items)
        }
        other => Err(ProtocolError::UnexpectedByte {
            expected: "'{' or '*'",
            found: other as char,
        }),
    }
}

/// Reads a float. The terminating character is left in the buffer.
pub fn read_float(buf: &mut StreamBuffer) -> Result<f64, ProtocolError> {
    buf.peek_non_ws()?;
    let mut literal = String::new();
    loop {
        let byte = buf.peek()?;
        if !matches!(byte, b'0'..=b'9' | b'.' | b'e' | b'E' | b'+' | b'-') {
            break;
        }
        literal.push(byte as char);
        buf.next_byte()?;
    }
    literal
        .parse()
        .map_err(|_| ProtocolError::InvalidFloat(literal))
}

impl WireDecode for u32 {
    fn decode(buf: &mut StreamBuffer) -> Result<Self, ProtocolError> {
        read_int(buf)
    }
}

impl WireDecode for bool {
    fn decode(buf: &mut StreamBuffer) -> Result<Self, ProtocolError> {
        read_bool(buf)
    }
}

impl WireDecode for f64 {
    fn decode(buf: &mut StreamBuffer) -> Result<Self, ProtocolError> {
        read_float(buf)
    }
}

impl<T: WireDecode> WireDecode for Vec<T> {
    fn decode(buf: &mut StreamBuffer) -> Result<Self, ProtocolError> {
        read_array(buf, T::decode)
    }
}

// =========================================================================
// Encoding
// =========================================================================

pub fn put_int(out: &mut BytesMut, value: u32) {
    out.put_slice(value.to_string().as_bytes());
}

pub fn put_hollerith(out: &mut BytesMut, data: &[u8]) {
    put_int(out, data.len() as u32);
    out.put_u8(b'H');
    out.put_slice(data);
}

pub fn put_bits(out: &mut BytesMut, bits: &[bool]) {
    for bit in bits {
        out.put_u8(if *bit { b'1' } else { b'0' });
    }
}

/// Writes `<count> { a b c }`.
pub fn put_array<T: WireEncode>(out: &mut BytesMut, items: &[T]) {
    put_int(out, items.len() as u32);
    out.put_slice(b" {");
    for item in items {
        out.put_u8(b' ');
        item.encode(out);
    }
    out.put_slice(b" }");
}

impl WireEncode for u32 {
    fn encode(&self, out: &mut BytesMut) {
        put_int(out, *self);
    }
}

impl WireEncode for bool {
    fn encode(&self, out: &mut BytesMut) {
        out.put_u8(if *self { b'1' } else { b'0' });
    }
}

impl<T: WireEncode> WireEncode for Vec<T> {
    fn encode(&self, out: &mut BytesMut) {
        put_array(out, self);
    }
}

// =========================================================================
// Hollerith strings
// =========================================================================

/// A length-prefixed byte string.
///
/// The protocol carries raw bytes; names and messages are conventionally
/// ISO 8859-1, which is what the `latin1` helpers convert to and from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Hollerith(pub Bytes);

impl Hollerith {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self(data.into())
    }

    /// Encodes `s` as ISO 8859-1. Characters outside Latin-1 become `?`.
    pub fn from_latin1(s: &str) -> Self {
        let bytes: Vec<u8> = s
            .chars()
            .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
            .collect();
        Self(Bytes::from(bytes))
    }

    pub fn to_latin1(&self) -> String {
        self.0.iter().map(|&b| b as char).collect()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Hollerith {
    fn from(s: &str) -> Self {
        Self::from_latin1(s)
    }
}

impl From<String> for Hollerith {
    fn from(s: String) -> Self {
        Self::from_latin1(&s)
    }
}

impl From<Vec<u8>> for Hollerith {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<Bytes> for Hollerith {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Hollerith {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_latin1())
    }
}

impl Serialize for Hollerith {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_latin1())
    }
}

impl WireDecode for Hollerith {
    fn decode(buf: &mut StreamBuffer) -> Result<Self, ProtocolError> {
        read_hollerith(buf).map(Hollerith)
    }
}

impl WireEncode for Hollerith {
    fn encode(&self, out: &mut BytesMut) {
        put_hollerith(out, &self.0);
    }
}

// =========================================================================
// Time
// =========================================================================

/// A broken-down server timestamp (`struct tm` layout).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Time {
    pub seconds: u32,
    pub minutes: u32,
    pub hours: u32,
    pub day: u32,
    /// 0-based month.
    pub month: u32,
    /// Years since 1900.
    pub year: u32,
    /// 0 = Sunday.
    pub day_of_week: u32,
    /// 0-based day of year.
    pub day_of_year: u32,
    pub is_dst: bool,
}

impl Time {
    /// Converts to a calendar date-time, if the fields form a valid date.
    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(1900 + self.year as i32, self.month + 1, self.day)?.and_hms_opt(
            self.hours,
            self.minutes,
            self.seconds,
        )
    }

    pub fn from_naive(dt: NaiveDateTime, is_dst: bool) -> Self {
        Self {
            seconds: dt.second(),
            minutes: dt.minute(),
            hours: dt.hour(),
            day: dt.day(),
            month: dt.month0(),
            year: (dt.year() - 1900).max(0) as u32,
            day_of_week: dt.weekday().num_days_from_sunday(),
            day_of_year: dt.ordinal0(),
            is_dst,
        }
    }
}

impl WireDecode for Time {
    fn decode(buf: &mut StreamBuffer) -> Result<Self, ProtocolError> {
        Ok(Self {
            seconds: read_int(buf)?,
            minutes: read_int(buf)?,
            hours: read_int(buf)?,
            day: read_int(buf)?,
            month: read_int(buf)?,
            year: read_int(buf)?,
            day_of_week: read_int(buf)?,
            day_of_year: read_int(buf)?,
            // Some servers send values other than 0/1 here
            is_dst: read_int(buf)? != 0,
        })
    }
}

impl WireEncode for Time {
    fn encode(&self, out: &mut BytesMut) {
        let fields = [
            self.seconds,
            self.minutes,
            self.hours,
            self.day,
            self.month,
            self.year,
            self.day_of_week,
            self.day_of_year,
            u32::from(self.is_dst),
        ];
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                out.put_u8(b' ');
            }
            put_int(out, *field);
        }
    }
}

// =========================================================================
// Bit-flag fields
// =========================================================================

/// Declares a fixed-width bitstring type with one named flag per position.
macro_rules! bitstring {
    (
        $(#[$meta:meta])*
        pub struct $name:ident[$width:literal] {
            $($(#[$field_meta:meta])* $field:ident),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize)]
        pub struct $name {
            $($(#[$field_meta])* pub $field: bool,)+
        }

        impl $name {
            /// Number of characters on the wire.
            pub const WIDTH: usize = $width;

            pub fn from_bits(bits: [bool; $width]) -> Self {
                let [$($field),+] = bits;
                Self { $($field),+ }
            }

            pub fn to_bits(&self) -> [bool; $width] {
                [$(self.$field),+]
            }
        }

        impl $crate::wire::WireDecode for $name {
            fn decode(
                buf: &mut $crate::buffer::StreamBuffer,
            ) -> Result<Self, $crate::error::ProtocolError> {
                $crate::wire::read_bits::<$width>(buf).map(Self::from_bits)
            }
        }

        impl $crate::wire::WireEncode for $name {
            fn encode(&self, out: &mut bytes::BytesMut) {
                $crate::wire::put_bits(out, &self.to_bits());
            }
        }
    };
}

pub(crate) use bitstring;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn encode<T: WireEncode>(value: &T) -> BytesMut {
        let mut out = BytesMut::new();
        value.encode(&mut out);
        out
    }

    /// Decodes `T` from `data` followed by a trailing delimiter.
    fn decode<T: WireDecode>(data: &[u8]) -> Result<T, ProtocolError> {
        let mut buf = StreamBuffer::from_slice(data);
        buf.extend(b" ");
        T::decode(&mut buf)
    }

    #[test]
    fn test_int_consumes_one_delimiter() {
        let mut buf = StreamBuffer::from_slice(b"  42 17\n");
        assert_eq!(read_int(&mut buf).unwrap(), 42);
        assert_eq!(buf.unread(), b"17\n");
        assert_eq!(read_int(&mut buf).unwrap(), 17);
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn test_int_needs_delimiter() {
        let mut buf = StreamBuffer::from_slice(b"123");
        assert!(read_int(&mut buf).unwrap_err().is_incomplete());
    }

    #[test]
    fn test_int_rejects_non_digit() {
        let mut buf = StreamBuffer::from_slice(b"x1 ");
        assert!(matches!(
            read_int(&mut buf),
            Err(ProtocolError::ExpectedDigit('x'))
        ));
    }

    #[test]
    fn test_int_overflow() {
        let mut buf = StreamBuffer::from_slice(b"99999999999 ");
        assert!(matches!(
            read_int(&mut buf),
            Err(ProtocolError::IntegerOverflow)
        ));
    }

    #[test]
    fn test_hollerith_with_embedded_bytes() {
        let data = Hollerith::new(&b"a H\n{ }*\x00\xe5"[..]);
        let encoded = encode(&data);
        assert_eq!(&encoded[..], b"10Ha H\n{ }*\x00\xe5");
        assert_eq!(decode::<Hollerith>(&encoded).unwrap(), data);
    }

    #[test]
    fn test_hollerith_empty() {
        assert_eq!(&encode(&Hollerith::default())[..], b"0H");
        assert!(decode::<Hollerith>(b"0H").unwrap().is_empty());
    }

    #[test]
    fn test_hollerith_bad_terminator() {
        let mut buf = StreamBuffer::from_slice(b"5Xhello");
        assert!(matches!(
            read_hollerith(&mut buf),
            Err(ProtocolError::BadHollerithTerminator('X'))
        ));
    }

    #[test]
    fn test_hollerith_incomplete_body() {
        let mut buf = StreamBuffer::from_slice(b"5Hhel");
        assert!(read_hollerith(&mut buf).unwrap_err().is_incomplete());
    }

    #[test]
    fn test_latin1_conversion() {
        let h = Hollerith::from_latin1("Räksmörgås");
        assert_eq!(h.len(), 10);
        assert_eq!(h.to_latin1(), "Räksmörgås");
        assert_eq!(Hollerith::from_latin1("→").as_bytes(), b"?");
    }

    #[test]
    fn test_bits() {
        let mut buf = StreamBuffer::from_slice(b" 1010");
        assert_eq!(read_bits::<4>(&mut buf).unwrap(), [true, false, true, false]);

        let mut buf = StreamBuffer::from_slice(b"10x0");
        assert!(matches!(
            read_bits::<4>(&mut buf),
            Err(ProtocolError::InvalidBit('x'))
        ));

        let mut out = BytesMut::new();
        put_bits(&mut out, &[false, true, true]);
        assert_eq!(&out[..], b"011");
    }

    #[test]
    fn test_array_roundtrip() {
        let values: Vec<u32> = vec![1, 22, 333];
        let encoded = encode(&values);
        assert_eq!(&encoded[..], b"3 { 1 22 333 }");
        assert_eq!(decode::<Vec<u32>>(&encoded).unwrap(), values);

        let empty: Vec<u32> = Vec::new();
        let encoded = encode(&empty);
        assert_eq!(&encoded[..], b"0 { }");
        assert!(decode::<Vec<u32>>(&encoded).unwrap().is_empty());
    }

    #[test]
    fn test_array_elided_form() {
        // A nonzero count with `*` still means "no elements transmitted"
        assert!(decode::<Vec<u32>>(b"0 *").unwrap().is_empty());
        assert!(decode::<Vec<u32>>(b"17 *").unwrap().is_empty());
    }

    #[test]
    fn test_array_of_holleriths() {
        let names: Vec<Hollerith> = vec!["one".into(), "two words".into()];
        let encoded = encode(&names);
        assert_eq!(&encoded[..], b"2 { 3Hone 9Htwo words }");
        assert_eq!(decode::<Vec<Hollerith>>(&encoded).unwrap(), names);
    }

    #[test]
    fn test_array_bad_open() {
        let mut buf = StreamBuffer::from_slice(b"2 ( 1 2 )");
        assert!(matches!(
            read_array(&mut buf, read_int),
            Err(ProtocolError::UnexpectedByte { found: '(', .. })
        ));
    }

    #[test]
    fn test_time_roundtrip() {
        let time = Time {
            seconds: 5,
            minutes: 30,
            hours: 14,
            day: 24,
            month: 11,
            year: 125,
            day_of_week: 3,
            day_of_year: 357,
            is_dst: false,
        };
        let encoded = encode(&time);
        assert_eq!(&encoded[..], b"5 30 14 24 11 125 3 357 0");
        assert_eq!(decode::<Time>(&encoded).unwrap(), time);
    }

    #[test]
    fn test_time_chrono_conversion() {
        let dt = NaiveDate::from_ymd_opt(2025, 12, 24)
            .unwrap()
            .and_hms_opt(14, 30, 5)
            .unwrap();
        let time = Time::from_naive(dt, false);
        assert_eq!(time.month, 11);
        assert_eq!(time.year, 125);
        assert_eq!(time.day_of_week, 3);
        assert_eq!(time.to_naive(), Some(dt));

        let invalid = Time {
            month: 13,
            ..time
        };
        assert_eq!(invalid.to_naive(), None);
    }

    #[test]
    fn test_float() {
        let mut buf = StreamBuffer::from_slice(b" 1.5e3 ");
        assert_eq!(read_float(&mut buf).unwrap(), 1500.0);
        assert_eq!(buf.unread(), b" ");

        let mut buf = StreamBuffer::from_slice(b"0.25");
        assert!(read_float(&mut buf).unwrap_err().is_incomplete());

        let mut buf = StreamBuffer::from_slice(b"1.2.3 ");
        assert!(matches!(
            read_float(&mut buf),
            Err(ProtocolError::InvalidFloat(_))
        ));
    }

    #[test]
    fn test_bool() {
        assert!(decode::<bool>(b"1").unwrap());
        assert!(!decode::<bool>(b"0").unwrap());
        assert!(matches!(
            decode::<bool>(b"2"),
            Err(ProtocolError::InvalidBool(2))
        ));
    }

    proptest! {
        #[test]
        fn prop_int_roundtrip(value in any::<u32>()) {
            prop_assert_eq!(decode::<u32>(&encode(&value)).unwrap(), value);
        }

        #[test]
        fn prop_hollerith_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            let h = Hollerith::from(data);
            prop_assert_eq!(decode::<Hollerith>(&encode(&h)).unwrap(), h);
        }

        #[test]
        fn prop_hollerith_split_anywhere(
            data in proptest::collection::vec(any::<u8>(), 1..64),
            split in 0usize..64
        ) {
            let encoded = encode(&Hollerith::from(data.clone()));
            let split = split.min(encoded.len() - 1);
            let mut buf = StreamBuffer::from_slice(&encoded[..split]);
            let mark = buf.mark();
            prop_assert!(read_hollerith(&mut buf).unwrap_err().is_incomplete());
            buf.reset(mark);
            buf.extend(&encoded[split..]);
            prop_assert_eq!(&read_hollerith(&mut buf).unwrap()[..], &data[..]);
        }
    }
}
