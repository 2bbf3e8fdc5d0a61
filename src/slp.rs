//! Serialized Literal Pack (SLP) decoding.
//!
//! The Array, ObjKey and ObjValue buffers all hold groups of literal values
//! behind the same tagged, variable-width encoding. A group starts with a
//! tag byte (optionally extended by a second byte for large counts):
//!
//! ```text
//! bit 7     : length-extension bit
//! bits 6..4 : kind
//! bits 3..0 : low nibble of element count
//! ```
//!
//! Mirrors how `wuff::variable_length` decodes WOFF2's `255UInt16`/`UIntBase128`
//! tagged scalars: a plain byte-oriented state machine, no lookahead beyond
//! what the tag itself demands.

use crate::error::HbcError;

/// The kind carried by a tag byte's bits 6..4 (pre-shifted by 4, as in the
/// on-disk encoding).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum SlpKind {
    Null,
    True,
    False,
    Number,
    LongString,
    ShortString,
    ByteString,
    Integer,
    /// Any kind nibble not covered by the seven known tags. The Python
    /// reference implementation falls back to this as `"Empty"` rather
    /// than rejecting the buffer.
    Empty,
}

impl SlpKind {
    fn from_bits(bits: u8) -> Self {
        match bits {
            0x00 => Self::Null,
            0x10 => Self::True,
            0x20 => Self::False,
            0x30 => Self::Number,
            0x40 => Self::LongString,
            0x50 => Self::ShortString,
            0x60 => Self::ByteString,
            0x70 => Self::Integer,
            _ => Self::Empty,
        }
    }

    /// The public `kindLabel` this decodes to at the accessor boundary.
    pub(crate) fn label(self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::True | Self::False => "Boolean",
            Self::Number => "Number",
            Self::LongString | Self::ShortString | Self::ByteString => "String",
            Self::Integer => "Integer",
            Self::Empty => "Empty",
        }
    }
}

/// One decoded literal. Internally a typed sum, per design note §9;
/// translated to a loosely-typed label + value only at the public
/// `getArray`/`getObjKey`/`getObjValue` boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum SlpValue {
    Null,
    Bool(bool),
    Integer(u32),
    Number(f64),
    /// An index into the string table.
    StringRef(u32),
}

/// A decoded group header: its kind and element count, plus the number of
/// header bytes consumed (1, or 2 if the length-extension bit was set).
pub(crate) struct GroupHeader {
    pub kind: SlpKind,
    pub count: usize,
    pub header_len: usize,
}

/// Decodes the tag byte (and, if extended, the following byte) at `offset`.
pub(crate) fn decode_group_header(buf: &[u8], offset: usize) -> Result<GroupHeader, HbcError> {
    let tag = *buf
        .get(offset)
        .ok_or_else(|| HbcError::malformed(offset, "SLP buffer truncated before tag byte"))?;
    let kind = SlpKind::from_bits(tag & 0x70);

    if tag & 0x80 != 0 {
        let low = *buf.get(offset + 1).ok_or_else(|| {
            HbcError::malformed(offset + 1, "SLP buffer truncated before extended count byte")
        })?;
        let count = (((tag & 0x0f) as usize) << 8) | (low as usize);
        Ok(GroupHeader {
            kind,
            count,
            header_len: 2,
        })
    } else {
        Ok(GroupHeader {
            kind,
            count: (tag & 0x0f) as usize,
            header_len: 1,
        })
    }
}

/// Decodes one payload of `kind` starting at `buf[offset..]`, returning the
/// value and the number of bytes consumed.
pub(crate) fn decode_payload(
    buf: &[u8],
    offset: usize,
    kind: SlpKind,
) -> Result<(SlpValue, usize), HbcError> {
    let take = |len: usize| -> Result<&[u8], HbcError> {
        buf.get(offset..offset + len)
            .ok_or_else(|| HbcError::malformed(offset, "SLP payload truncated"))
    };

    Ok(match kind {
        SlpKind::Null => (SlpValue::Null, 0),
        SlpKind::True => (SlpValue::Bool(true), 0),
        SlpKind::False => (SlpValue::Bool(false), 0),
        SlpKind::ByteString => (SlpValue::StringRef(take(1)?[0] as u32), 1),
        SlpKind::ShortString => {
            let bytes: [u8; 2] = take(2)?.try_into().unwrap();
            (SlpValue::StringRef(u16::from_le_bytes(bytes) as u32), 2)
        }
        SlpKind::LongString => {
            let bytes: [u8; 4] = take(4)?.try_into().unwrap();
            (SlpValue::StringRef(u32::from_le_bytes(bytes)), 4)
        }
        SlpKind::Integer => {
            let bytes: [u8; 4] = take(4)?.try_into().unwrap();
            (SlpValue::Integer(u32::from_le_bytes(bytes)), 4)
        }
        SlpKind::Number => {
            let bytes: [u8; 8] = take(8)?.try_into().unwrap();
            (SlpValue::Number(f64::from_le_bytes(bytes)), 8)
        }
        // Unknown kind nibbles carry no payload, matching the reference's
        // "Empty" fallback.
        SlpKind::Empty => (SlpValue::Null, 0),
    })
}
