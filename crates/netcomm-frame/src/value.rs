//! Typed argument values and their tag tables.
//!
//! Every argument is written as one tag byte followed by its payload. The
//! tag's high nibble names the value family, the low nibble the payload width
//! (or, for text and bytes, the width of the length field) in bytes:
//!
//! | Family  | Tags                   | Payload                         |
//! |---------|------------------------|---------------------------------|
//! | Integer | `0x31 0x32 0x34 0x38`  | big-endian two's complement     |
//! | Float   | `0x54 0x58`            | IEEE-754 binary32 / binary64 BE |
//! | Boolean | `0x71`                 | `0x00` / `0x01`                 |
//! | Text    | `0x91 0x92 0x94`       | BE length, then UTF-8 bytes     |
//! | Bytes   | `0xB1 0xB2 0xB4`       | BE length, then raw bytes       |

use std::fmt;
use std::str::FromStr;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, ParseErrorKind, Result};

/// Integer family (high nibble).
pub const INTEGER: u8 = 0x30;
/// Float family (high nibble).
pub const FLOAT: u8 = 0x50;
/// Boolean family (high nibble).
pub const BOOLEAN: u8 = 0x70;
/// Text family (high nibble).
pub const TEXT: u8 = 0x90;
/// Byte-array family (high nibble).
pub const BYTES: u8 = 0xB0;

/// Selects the family bits of a tag.
pub const FAMILY_MASK: u8 = 0xF0;
/// Selects the width bits of a tag.
pub const WIDTH_MASK: u8 = 0x0F;

/// Maximum byte length of one text or byte-array argument.
pub const ARG_MAX_LEN: usize = 0x7F_FFFF - 5;

/// The value family of a [`TypedValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Integer,
    Float,
    Boolean,
    Text,
    Bytes,
}

impl ValueKind {
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Integer => "integer",
            ValueKind::Float => "float",
            ValueKind::Boolean => "boolean",
            ValueKind::Text => "text",
            ValueKind::Bytes => "bytes",
        }
    }

    /// Family nibble used in this kind's tags.
    pub fn family(self) -> u8 {
        match self {
            ValueKind::Integer => INTEGER,
            ValueKind::Float => FLOAT,
            ValueKind::Boolean => BOOLEAN,
            ValueKind::Text => TEXT,
            ValueKind::Bytes => BYTES,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Looks up the decode rule for a tag byte: its kind and width in bytes.
///
/// Returns `None` for tags with no encoding rule.
pub fn tag_rule(tag: u8) -> Option<(ValueKind, usize)> {
    let width = usize::from(tag & WIDTH_MASK);
    let kind = match (tag & FAMILY_MASK, width) {
        (INTEGER, 1 | 2 | 4 | 8) => ValueKind::Integer,
        (FLOAT, 4 | 8) => ValueKind::Float,
        (BOOLEAN, 1) => ValueKind::Boolean,
        (TEXT, 1 | 2 | 4) => ValueKind::Text,
        (BYTES, 1 | 2 | 4) => ValueKind::Bytes,
        _ => return None,
    };
    Some((kind, width))
}

/// Width of the length field needed for `len`: 1, 2 or 4 bytes.
///
/// Follows signed-range fit, so 127 is the largest one-byte length and
/// 32767 the largest two-byte length.
pub fn length_width(len: usize) -> usize {
    if len <= i8::MAX as usize {
        1
    } else if len <= i16::MAX as usize {
        2
    } else {
        4
    }
}

fn integer_width(v: i64) -> usize {
    if i8::try_from(v).is_ok() {
        1
    } else if i16::try_from(v).is_ok() {
        2
    } else if i32::try_from(v).is_ok() {
        4
    } else {
        8
    }
}

fn float_width(v: f64) -> usize {
    if v.abs() <= f64::from(f32::MAX) {
        4
    } else {
        8
    }
}

/// One frame argument.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
    Bytes(Bytes),
}

impl TypedValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            TypedValue::Integer(_) => ValueKind::Integer,
            TypedValue::Float(_) => ValueKind::Float,
            TypedValue::Boolean(_) => ValueKind::Boolean,
            TypedValue::Text(_) => ValueKind::Text,
            TypedValue::Bytes(_) => ValueKind::Bytes,
        }
    }

    fn width(&self) -> usize {
        match self {
            TypedValue::Integer(v) => integer_width(*v),
            TypedValue::Float(v) => float_width(*v),
            TypedValue::Boolean(_) => 1,
            TypedValue::Text(s) => length_width(s.len()),
            TypedValue::Bytes(b) => length_width(b.len()),
        }
    }

    /// The narrowest tag that can carry this value.
    pub fn tag(&self) -> u8 {
        // Widths are at most 8, so they always fit the low nibble.
        self.kind().family() | self.width() as u8
    }

    /// Bytes this value occupies on the wire, tag included.
    pub fn encoded_len(&self) -> usize {
        match self {
            TypedValue::Text(s) => 1 + self.width() + s.len(),
            TypedValue::Bytes(b) => 1 + self.width() + b.len(),
            _ => 1 + self.width(),
        }
    }

    /// Fails if a text or byte-array payload exceeds [`ARG_MAX_LEN`].
    pub(crate) fn check_len(&self) -> Result<()> {
        match self {
            TypedValue::Text(s) if s.len() > ARG_MAX_LEN => Err(FrameError::StringLengthOverflow {
                len: s.len(),
                max: ARG_MAX_LEN,
            }),
            TypedValue::Bytes(b) if b.len() > ARG_MAX_LEN => {
                Err(FrameError::ByteArrayLengthOverflow {
                    len: b.len(),
                    max: ARG_MAX_LEN,
                })
            }
            _ => Ok(()),
        }
    }

    /// Append tag and payload. Lengths must already have passed `check_len`.
    pub(crate) fn encode_into(&self, dst: &mut BytesMut) {
        let width = self.width();
        dst.put_u8(self.tag());
        match self {
            TypedValue::Integer(v) => match width {
                1 => dst.put_i8(*v as i8),
                2 => dst.put_i16(*v as i16),
                4 => dst.put_i32(*v as i32),
                _ => dst.put_i64(*v),
            },
            TypedValue::Float(v) if width == 4 => dst.put_f32(*v as f32),
            TypedValue::Float(v) => dst.put_f64(*v),
            TypedValue::Boolean(v) => dst.put_u8(u8::from(*v)),
            TypedValue::Text(s) => {
                dst.put_uint(s.len() as u64, width);
                dst.put_slice(s.as_bytes());
            }
            TypedValue::Bytes(b) => {
                dst.put_uint(b.len() as u64, width);
                dst.put_slice(b);
            }
        }
    }

    /// Decode one value starting at `text[*pos]`, advancing `pos` past it.
    pub(crate) fn decode_from(
        text: &[u8],
        pos: &mut usize,
    ) -> std::result::Result<Self, ParseErrorKind> {
        let tag = take(text, pos, 1)?[0];
        let (kind, width) = tag_rule(tag).ok_or(ParseErrorKind::UnknownValueTag(tag))?;
        let mut field = take(text, pos, width)?;

        let value = match kind {
            ValueKind::Integer => TypedValue::Integer(match width {
                1 => i64::from(field.get_i8()),
                2 => i64::from(field.get_i16()),
                4 => i64::from(field.get_i32()),
                _ => field.get_i64(),
            }),
            ValueKind::Float if width == 4 => TypedValue::Float(f64::from(field.get_f32())),
            ValueKind::Float => TypedValue::Float(field.get_f64()),
            ValueKind::Boolean => TypedValue::Boolean(field.get_u8() != 0),
            ValueKind::Text => {
                let len = field.get_uint(width) as usize;
                let payload = take(text, pos, len)?;
                let s = std::str::from_utf8(payload).map_err(|_| ParseErrorKind::InvalidText)?;
                TypedValue::Text(s.to_owned())
            }
            ValueKind::Bytes => {
                let len = field.get_uint(width) as usize;
                TypedValue::Bytes(Bytes::copy_from_slice(take(text, pos, len)?))
            }
        };
        Ok(value)
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            TypedValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            TypedValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TypedValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            TypedValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            TypedValue::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

fn take<'a>(
    text: &'a [u8],
    pos: &mut usize,
    n: usize,
) -> std::result::Result<&'a [u8], ParseErrorKind> {
    let end = pos
        .checked_add(n)
        .filter(|end| *end <= text.len())
        .ok_or(ParseErrorKind::Truncated)?;
    let field = &text[*pos..end];
    *pos = end;
    Ok(field)
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::Integer(v) => write!(f, "{v}"),
            TypedValue::Float(v) => write!(f, "{v:.6}"),
            TypedValue::Boolean(v) => write!(f, "{v}"),
            TypedValue::Text(s) => f.write_str(s),
            TypedValue::Bytes(b) => {
                for (i, byte) in b.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "0x{byte:02X}")?;
                }
                Ok(())
            }
        }
    }
}

/// Parses `kind:value` literals such as `int:-256`, `bool:true`,
/// `str:Hello`, `float:-1.1` or `bytes:414243`.
impl FromStr for TypedValue {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| FrameError::InvalidLiteral {
            literal: s.to_string(),
            reason: reason.to_string(),
        };
        let (kind, raw) = s
            .split_once(':')
            .ok_or_else(|| invalid("expected kind:value"))?;

        match kind {
            "int" | "integer" => raw
                .trim()
                .parse()
                .map(TypedValue::Integer)
                .map_err(|_| invalid("not a 64-bit integer")),
            "float" => raw
                .trim()
                .parse()
                .map(TypedValue::Float)
                .map_err(|_| invalid("not a float")),
            "bool" | "boolean" => match raw.trim() {
                "true" | "1" => Ok(TypedValue::Boolean(true)),
                "false" | "0" => Ok(TypedValue::Boolean(false)),
                _ => Err(invalid("expected true or false")),
            },
            "str" | "text" => Ok(TypedValue::Text(raw.to_string())),
            "bytes" => parse_hex(raw)
                .map(|b| TypedValue::Bytes(Bytes::from(b)))
                .ok_or_else(|| invalid("expected an even number of hex digits")),
            _ => Err(invalid("unknown kind (int, float, bool, str, bytes)")),
        }
    }
}

fn parse_hex(raw: &str) -> Option<Vec<u8>> {
    let raw = raw.trim();
    let raw = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    if raw.len() % 2 != 0 || !raw.is_ascii() {
        return None;
    }
    (0..raw.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&raw[i..i + 2], 16).ok())
        .collect()
}

impl From<i64> for TypedValue {
    fn from(v: i64) -> Self {
        TypedValue::Integer(v)
    }
}

impl From<i32> for TypedValue {
    fn from(v: i32) -> Self {
        TypedValue::Integer(i64::from(v))
    }
}

impl From<f64> for TypedValue {
    fn from(v: f64) -> Self {
        TypedValue::Float(v)
    }
}

impl From<f32> for TypedValue {
    fn from(v: f32) -> Self {
        TypedValue::Float(f64::from(v))
    }
}

impl From<bool> for TypedValue {
    fn from(v: bool) -> Self {
        TypedValue::Boolean(v)
    }
}

impl From<String> for TypedValue {
    fn from(v: String) -> Self {
        TypedValue::Text(v)
    }
}

impl From<&str> for TypedValue {
    fn from(v: &str) -> Self {
        TypedValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for TypedValue {
    fn from(v: Vec<u8>) -> Self {
        TypedValue::Bytes(Bytes::from(v))
    }
}

impl From<&[u8]> for TypedValue {
    fn from(v: &[u8]) -> Self {
        TypedValue::Bytes(Bytes::copy_from_slice(v))
    }
}

impl From<Bytes> for TypedValue {
    fn from(v: Bytes) -> Self {
        TypedValue::Bytes(v)
    }
}
