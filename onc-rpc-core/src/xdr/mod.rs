//! XDR ([RFC 4506]) as a serde data format.
//!
//! Every type with a `Serialize`/`Deserialize` impl can be put on the wire,
//! as long as its shape has an XDR counterpart:
//!
//! | serde                  | xdr                                  |
//! |------------------------|--------------------------------------|
//! | `bool`                 | `bool` (4 bytes)                     |
//! | `i8`..`i32`, `u8`..`u32` | `int` / `unsigned int`             |
//! | `i64`, `u64`           | `hyper` / `unsigned hyper`           |
//! | `f32`, `f64`           | `float` / `double`                   |
//! | `str`, `String`        | `string<>`                           |
//! | bytes ([`Opaque`])     | `opaque<>`                           |
//! | [`FixedOpaque<N>`]     | `opaque[N]`                          |
//! | arrays `[T; N]`        | fixed-length array (`T[N]`)          |
//! | `Option<T>`            | optional-data (`T *`)                |
//! | sequences              | variable-length array (`T<>`)        |
//! | tuples, structs        | fields in order                      |
//! | enums                  | `unsigned int` index, then the arm   |
//!
//! XDR is not self-describing, so maps and `deserialize_any` are rejected.
//!
//! [RFC 4506]: https://datatracker.ietf.org/doc/html/rfc4506

mod de;
mod ser;

use std::fmt::{self, Display};

use serde::{de::Visitor, Deserialize, Serialize};
use thiserror::Error;

pub use de::{from_bytes, from_bytes_partial, Deserializer};
pub use ser::{to_buffer, to_bytes, Serializer};

/// Every XDR item is a multiple of this many bytes.
pub const UNIT: usize = 4;

/// Newtype name that switches the codec to packed fixed-length opaque.
pub(crate) const FIXED_OPAQUE: &str = "$xdr::FixedOpaque";

pub(crate) fn padding(len: usize) -> usize {
    (UNIT - len % UNIT) % UNIT
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("{0}")]
    Message(String),
    #[error("unexpected end of input, {needed} more bytes needed")]
    UnexpectedEof { needed: usize },
    #[error("invalid boolean discriminant {0}")]
    InvalidBool(u32),
    #[error("value {0} is out of range for the target type")]
    OutOfRange(i64),
    #[error("string is not valid utf-8")]
    InvalidUtf8,
    #[error("non-zero padding byte")]
    NonZeroPadding,
    #[error("length {0} exceeds the remaining input")]
    LengthTooLarge(usize),
    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),
    #[error("{0} has no xdr representation")]
    Unsupported(&'static str),
}

impl serde::ser::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Error::Message(msg.to_string())
    }
}

impl serde::de::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Error::Message(msg.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Variable-length opaque data (`opaque<>`).
///
/// A plain `Vec<u8>` goes through serde as a sequence and would spend four
/// bytes per element; this wrapper is encoded as packed, padded bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Opaque(pub Vec<u8>);

impl Opaque {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Opaque {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl Serialize for Opaque {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Opaque {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_byte_buf(OpaqueVisitor)
    }
}

struct OpaqueVisitor;

impl<'de> Visitor<'de> for OpaqueVisitor {
    type Value = Opaque;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("variable-length opaque data")
    }

    fn visit_bytes<E: serde::de::Error>(self, v: &[u8]) -> std::result::Result<Opaque, E> {
        Ok(Opaque(v.to_vec()))
    }

    fn visit_byte_buf<E: serde::de::Error>(self, v: Vec<u8>) -> std::result::Result<Opaque, E> {
        Ok(Opaque(v))
    }
}

/// Fixed-length opaque data (`opaque[N]`): `N` packed bytes and padding,
/// no length prefix. A bare `[u8; N]` would take four bytes per element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedOpaque<const N: usize>(pub [u8; N]);

impl<const N: usize> Default for FixedOpaque<N> {
    fn default() -> Self {
        Self([0; N])
    }
}

struct Packed<'a>(&'a [u8]);

impl Serialize for Packed<'_> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_bytes(self.0)
    }
}

impl<const N: usize> Serialize for FixedOpaque<N> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_newtype_struct(FIXED_OPAQUE, &Packed(&self.0))
    }
}

impl<'de, const N: usize> Deserialize<'de> for FixedOpaque<N> {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_newtype_struct(FIXED_OPAQUE, FixedOpaqueVisitor::<N>)
    }
}

struct FixedOpaqueVisitor<const N: usize>;

impl<'de, const N: usize> Visitor<'de> for FixedOpaqueVisitor<N> {
    type Value = FixedOpaque<N>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{N} bytes of fixed-length opaque data")
    }

    fn visit_newtype_struct<D: serde::Deserializer<'de>>(
        self,
        deserializer: D,
    ) -> std::result::Result<Self::Value, D::Error> {
        deserializer.deserialize_tuple(N, self)
    }

    fn visit_bytes<E: serde::de::Error>(self, v: &[u8]) -> std::result::Result<Self::Value, E> {
        let bytes = <[u8; N]>::try_from(v).map_err(|_| E::invalid_length(v.len(), &self))?;
        Ok(FixedOpaque(bytes))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    enum Shape {
        Empty,
        Circle(u32),
        Rect { w: u32, h: u32 },
    }

    #[test]
    fn integers_are_big_endian_words() {
        assert_eq!(&to_bytes(&5i32).unwrap()[..], &[0, 0, 0, 5]);
        assert_eq!(&to_bytes(&-20i32).unwrap()[..], &[0xff, 0xff, 0xff, 0xec]);
        assert_eq!(&to_bytes(&7u8).unwrap()[..], &[0, 0, 0, 7]);
        assert_eq!(&to_bytes(&-1i16).unwrap()[..], &[0xff; 4]);
        assert_eq!(
            &to_bytes(&1u64).unwrap()[..],
            &[0, 0, 0, 0, 0, 0, 0, 1]
        );
        assert_eq!(&to_bytes(&true).unwrap()[..], &[0, 0, 0, 1]);
    }

    #[test]
    fn floats_use_ieee_layout() {
        assert_eq!(&to_bytes(&1.0f32).unwrap()[..], &[0x3f, 0x80, 0, 0]);
        assert_eq!(from_bytes::<f32>(&[0x41, 0, 0, 0]).unwrap(), 8.0);
        assert_eq!(
            &to_bytes(&-2.0f64).unwrap()[..],
            &[0xc0, 0, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn strings_are_length_prefixed_and_padded() {
        let bytes = to_bytes("tcp").unwrap();
        assert_eq!(&bytes[..], &[0, 0, 0, 3, b't', b'c', b'p', 0]);
        assert_eq!(from_bytes::<String>(&bytes).unwrap(), "tcp");

        let bytes = to_bytes("").unwrap();
        assert_eq!(&bytes[..], &[0, 0, 0, 0]);
    }

    #[test]
    fn opaque_is_packed() {
        let opaque = Opaque(vec![1, 2, 3, 4, 5]);
        let bytes = to_bytes(&opaque).unwrap();
        assert_eq!(&bytes[..], &[0, 0, 0, 5, 1, 2, 3, 4, 5, 0, 0, 0]);
        assert_eq!(from_bytes::<Opaque>(&bytes).unwrap(), opaque);
    }

    #[test]
    fn fixed_opaque_has_no_length() {
        let fixed = FixedOpaque([0xde, 0xad, 0xbe, 0xef, 0x01, 0x02]);
        let bytes = to_bytes(&fixed).unwrap();
        assert_eq!(&bytes[..], &[0xde, 0xad, 0xbe, 0xef, 1, 2, 0, 0]);
        assert_eq!(from_bytes::<FixedOpaque<6>>(&bytes).unwrap(), fixed);
        assert_eq!(
            from_bytes::<FixedOpaque<6>>(&bytes[..6]),
            Err(Error::UnexpectedEof { needed: 2 })
        );

        // a plain array is a fixed-length array of words
        assert_eq!(to_bytes(&[1u8, 2]).unwrap().len(), 8);

        #[derive(Serialize, Deserialize, Debug, PartialEq)]
        struct Tagged {
            tag: FixedOpaque<3>,
            id: u32,
            body: Opaque,
        }
        let tagged = Tagged {
            tag: FixedOpaque(*b"abc"),
            id: 7,
            body: Opaque(vec![9]),
        };
        let bytes = to_bytes(&tagged).unwrap();
        assert_eq!(
            &bytes[..],
            &[b'a', b'b', b'c', 0, 0, 0, 0, 7, 0, 0, 0, 1, 9, 0, 0, 0]
        );
        assert_eq!(from_bytes::<Tagged>(&bytes).unwrap(), tagged);
    }

    #[test]
    fn padding_must_be_zero() {
        let bytes = [0, 0, 0, 1, b'a', 0, 1, 0];
        assert_eq!(from_bytes::<String>(&bytes), Err(Error::NonZeroPadding));
    }

    #[test]
    fn structs_and_tuples_have_no_framing() {
        let bytes = to_bytes(&Point { x: 2, y: -5 }).unwrap();
        assert_eq!(&bytes[..], &[0, 0, 0, 2, 0xff, 0xff, 0xff, 0xfb]);
        assert_eq!(from_bytes::<(i32, i32)>(&bytes).unwrap(), (2, -5));
        assert_eq!(from_bytes::<Point>(&bytes).unwrap(), Point { x: 2, y: -5 });
    }

    #[test]
    fn enums_lead_with_the_variant_index() {
        assert_eq!(&to_bytes(&Shape::Empty).unwrap()[..], &[0, 0, 0, 0]);
        let rect = Shape::Rect { w: 3, h: 4 };
        let bytes = to_bytes(&rect).unwrap();
        assert_eq!(&bytes[..], &[0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0, 4]);
        assert_eq!(from_bytes::<Shape>(&bytes).unwrap(), rect);
        assert_eq!(
            from_bytes::<Shape>(&[0, 0, 0, 1, 0, 0, 0, 9]).unwrap(),
            Shape::Circle(9)
        );
        assert!(from_bytes::<Shape>(&[0, 0, 0, 7]).is_err());
    }

    #[test]
    fn options_and_sequences() {
        let value: Option<Vec<u32>> = Some(vec![1, 2]);
        let bytes = to_bytes(&value).unwrap();
        assert_eq!(
            &bytes[..],
            &[0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0, 1, 0, 0, 0, 2]
        );
        assert_eq!(from_bytes::<Option<Vec<u32>>>(&bytes).unwrap(), value);
        assert_eq!(from_bytes::<Option<u32>>(&[0, 0, 0, 0]).unwrap(), None);
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert_eq!(
            from_bytes::<u32>(&[0, 0]),
            Err(Error::UnexpectedEof { needed: 2 })
        );
        assert_eq!(from_bytes::<bool>(&[0, 0, 0, 2]), Err(Error::InvalidBool(2)));
        assert_eq!(
            from_bytes::<u8>(&[0, 0, 1, 0]),
            Err(Error::OutOfRange(256))
        );
        assert_eq!(
            from_bytes::<u32>(&[0, 0, 0, 1, 0]),
            Err(Error::TrailingBytes(1))
        );
        assert_eq!(
            from_bytes::<Vec<u32>>(&[0xff, 0xff, 0xff, 0xff]),
            Err(Error::LengthTooLarge(u32::MAX as usize))
        );
        assert_eq!(
            from_bytes::<String>(&[0, 0, 0, 2, 0xc3, 0x28, 0, 0]),
            Err(Error::InvalidUtf8)
        );
    }

    #[test]
    fn maps_are_unsupported() {
        let map: BTreeMap<u32, u32> = BTreeMap::new();
        assert_eq!(to_bytes(&map), Err(Error::Unsupported("map")));
    }

    #[test]
    fn partial_decoding_returns_the_tail() {
        let (head, rest): (u32, &[u8]) = from_bytes_partial(&[0, 0, 0, 1, 9, 9]).unwrap();
        assert_eq!(head, 1);
        assert_eq!(rest, &[9, 9]);
    }
}
