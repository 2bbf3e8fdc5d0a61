//! The header codec: pack/unpack for the file header and the per-function
//! header's compact/overflow pair.
//!
//! This is the one component aware of bit-field boundaries. Versions 86 and
//! 96 share every field; the only difference this codec has to parameterize
//! is the string-table overflow sentinel (`INVALID_LENGTH`), so a single
//! [`HbcVersion`] enum replaces what the two-module reference implementation
//! (`hbctool.hbc.hbc86`, `hbctool.hbc.hbc96`) expressed as two near-identical
//! packages — see DESIGN.md's "version unification" note.

use bytes::{Buf, BufMut};

use crate::error::HbcError;

/// The overflow flag lives at bit 5 of a function header's `flags` byte.
pub const OVERFLOWED_FLAG: u8 = 1 << 5;

/// The largest `bytecodeSizeInBytes` a compact (non-overflow) header can
/// represent: 15 bits.
pub const MAX_SMALL_BYTECODE_SIZE: u32 = (1 << 15) - 1;

/// Size in bytes of one compact function header slot.
pub const COMPACT_HEADER_SIZE: usize = 16;

/// Size in bytes of one overflow ("large") function header record.
pub const OVERFLOW_HEADER_SIZE: usize = 40;

/// Size in bytes of the fixed file header.
pub const FILE_HEADER_SIZE: usize = 56;

const HBC_MAGIC: u64 = 0x1F1903_C103BC1179;

/// The two supported container versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HbcVersion {
    V86,
    V96,
}

impl HbcVersion {
    pub fn from_u32(version: u32) -> Result<Self, HbcError> {
        match version {
            86 => Ok(Self::V86),
            96 => Ok(Self::V96),
            other => Err(HbcError::UnsupportedVersion { version: other }),
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            Self::V86 => 86,
            Self::V96 => 96,
        }
    }

    /// Bit widths of the packed `(offset, length)` pair inside one 32-bit
    /// string table entry word (the remaining bit is `isUTF16`). v96 trades
    /// offset range for a wider inline length, since it targets bundles with
    /// many more strings per buffer than v86 ever needed.
    pub(crate) fn string_entry_widths(self) -> (u32, u32) {
        match self {
            Self::V86 => (23, 8),
            Self::V96 => (16, 15),
        }
    }

    /// The string-table entry `length` sentinel meaning "see the overflow
    /// table": the all-ones pattern of the inline length field.
    pub(crate) fn invalid_length(self) -> u32 {
        let (_, length_bits) = self.string_entry_widths();
        (1u32 << length_bits) - 1
    }
}

/// Fixed-layout file header.
#[derive(Debug, Clone)]
pub struct FileHeader {
    pub version: HbcVersion,
    pub function_count: u32,
    pub string_count: u32,
    pub string_table_overflow_count: u32,
    pub array_buffer_size: u32,
    pub obj_key_buffer_size: u32,
    pub obj_value_buffer_size: u32,
    pub function_headers_offset: u32,
    pub string_table_offset: u32,
    pub string_table_overflow_offset: u32,
    pub string_storage_offset: u32,
    pub array_buffer_offset: u32,
    pub obj_key_buffer_offset: u32,
    pub obj_value_buffer_offset: u32,
    pub inst_offset: u32,
}

impl FileHeader {
    pub(crate) fn parse(input: &mut &[u8]) -> Result<Self, HbcError> {
        if input.remaining() < FILE_HEADER_SIZE {
            return Err(HbcError::malformed(0, "file shorter than the fixed file header"));
        }
        let magic = input.get_u64_le();
        if magic != HBC_MAGIC {
            return Err(HbcError::malformed(0, "bad magic number"));
        }
        let version = HbcVersion::from_u32(input.get_u32_le())?;
        Ok(Self {
            version,
            function_count: input.get_u32_le(),
            string_count: input.get_u32_le(),
            string_table_overflow_count: input.get_u32_le(),
            array_buffer_size: input.get_u32_le(),
            obj_key_buffer_size: input.get_u32_le(),
            obj_value_buffer_size: input.get_u32_le(),
            function_headers_offset: input.get_u32_le(),
            string_table_offset: input.get_u32_le(),
            string_table_overflow_offset: input.get_u32_le(),
            string_storage_offset: input.get_u32_le(),
            array_buffer_offset: input.get_u32_le(),
            obj_key_buffer_offset: input.get_u32_le(),
            obj_value_buffer_offset: input.get_u32_le(),
            inst_offset: input.get_u32_le(),
        })
    }

    pub(crate) fn write(&self, out: &mut impl BufMut) {
        out.put_u64_le(HBC_MAGIC);
        out.put_u32_le(self.version.as_u32());
        out.put_u32_le(self.function_count);
        out.put_u32_le(self.string_count);
        out.put_u32_le(self.string_table_overflow_count);
        out.put_u32_le(self.array_buffer_size);
        out.put_u32_le(self.obj_key_buffer_size);
        out.put_u32_le(self.obj_value_buffer_size);
        out.put_u32_le(self.function_headers_offset);
        out.put_u32_le(self.string_table_offset);
        out.put_u32_le(self.string_table_overflow_offset);
        out.put_u32_le(self.string_storage_offset);
        out.put_u32_le(self.array_buffer_offset);
        out.put_u32_le(self.obj_key_buffer_offset);
        out.put_u32_le(self.obj_value_buffer_offset);
        out.put_u32_le(self.inst_offset);
    }
}

/// A function header with its true (in-memory) field values, and — when the
/// `overflowed` flag is set — the exact compact-slot snapshot that must be
/// re-emitted on export.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionHeader {
    pub offset: u32,
    pub param_count: u32,
    pub bytecode_size_in_bytes: u32,
    pub function_name: u32,
    pub info_offset: u32,
    pub frame_size: u32,
    pub environment_size: u32,
    pub highest_read_cache_index: u32,
    pub highest_write_cache_index: u32,
    pub flags: u8,
    /// Present iff `flags & OVERFLOWED_FLAG != 0`.
    pub small: Option<SmallFuncHeader>,
}

/// The truncated values that belong in the compact slot once a header has
/// overflowed. Every field here fits the compact widths by construction.
#[derive(Debug, Clone, PartialEq)]
pub struct SmallFuncHeader {
    pub offset: u32,
    pub param_count: u32,
    pub bytecode_size_in_bytes: u32,
    pub function_name: u32,
    pub info_offset: u32,
    pub frame_size: u32,
    pub environment_size: u32,
    pub highest_read_cache_index: u32,
    pub highest_write_cache_index: u32,
    pub flags: u8,
}

impl FunctionHeader {
    pub fn is_overflowed(&self) -> bool {
        self.flags & OVERFLOWED_FLAG != 0
    }
}

/// Packs two bitfields that together exactly fill a 32-bit word.
fn pack_word2(lo: (u32, u32), hi: (u32, u32)) -> u32 {
    debug_assert_eq!(lo.1 + hi.1, 32);
    mask(lo.0, lo.1) | (mask(hi.0, hi.1) << lo.1)
}

/// Packs four bitfields that together exactly fill a 32-bit word.
fn pack_word4(a: (u32, u32), b: (u32, u32), c: (u32, u32), d: (u32, u32)) -> u32 {
    debug_assert_eq!(a.1 + b.1 + c.1 + d.1, 32);
    let mut shift = 0u32;
    let mut acc = 0u32;
    for (value, width) in [a, b, c, d] {
        acc |= mask(value, width) << shift;
        shift += width;
    }
    acc
}

fn mask(value: u32, width: u32) -> u32 {
    if width >= 32 { value } else { value & ((1u32 << width) - 1) }
}

fn unpack_field(word: u32, shift: u32, width: u32) -> u32 {
    mask(word >> shift, width)
}

/// The fields that go into a compact slot: either the primary fields of a
/// non-overflowed header, or the `small` snapshot of an overflowed one.
struct CompactFields {
    offset: u32,
    param_count: u32,
    bytecode_size_in_bytes: u32,
    function_name: u32,
    info_offset: u32,
    frame_size: u32,
    environment_size: u32,
    highest_read_cache_index: u32,
    highest_write_cache_index: u32,
    flags: u8,
}

/// Packs one compact function header slot.
///
/// When `overflow_index` is `Some`, it replaces `fields.offset` in the
/// on-disk `offset` bit-field with the index/pointer to the large header,
/// resolved here as the position of this header's [`SmallFuncHeader`]'s
/// companion record in the overflow region (see DESIGN.md for the
/// reasoning; this is a documented, internally-consistent choice rather
/// than one verified against a reference binary layout).
fn pack_compact(fields: &CompactFields, overflow_index: Option<u32>) -> [u8; COMPACT_HEADER_SIZE] {
    let offset_field = overflow_index.unwrap_or(fields.offset);
    let w0 = pack_word2((offset_field, 25), (fields.param_count, 7));
    let w1 = pack_word2((fields.bytecode_size_in_bytes, 15), (fields.function_name, 17));
    let w2 = pack_word2((fields.info_offset, 25), (fields.frame_size, 7));
    let w3 = pack_word4(
        (fields.environment_size, 8),
        (fields.highest_read_cache_index, 8),
        (fields.highest_write_cache_index, 8),
        (fields.flags as u32, 8),
    );
    let mut out = [0u8; COMPACT_HEADER_SIZE];
    out[0..4].copy_from_slice(&w0.to_le_bytes());
    out[4..8].copy_from_slice(&w1.to_le_bytes());
    out[8..12].copy_from_slice(&w2.to_le_bytes());
    out[12..16].copy_from_slice(&w3.to_le_bytes());
    out
}

/// Unpacks one compact function header slot. The returned `offset` field is
/// the raw on-disk value — when `flags & OVERFLOWED_FLAG` is set, that value
/// is the overflow-record index, not a bytecode offset; callers must resolve
/// it via the overflow table before treating it as a byte offset.
fn unpack_compact(bytes: &[u8; COMPACT_HEADER_SIZE]) -> CompactFields {
    let w0 = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    let w1 = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
    let w2 = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
    let w3 = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
    CompactFields {
        offset: unpack_field(w0, 0, 25),
        param_count: unpack_field(w0, 25, 7),
        bytecode_size_in_bytes: unpack_field(w1, 0, 15),
        function_name: unpack_field(w1, 15, 17),
        info_offset: unpack_field(w2, 0, 25),
        frame_size: unpack_field(w2, 25, 7),
        environment_size: unpack_field(w3, 0, 8),
        highest_read_cache_index: unpack_field(w3, 8, 8),
        highest_write_cache_index: unpack_field(w3, 16, 8),
        flags: unpack_field(w3, 24, 8) as u8,
    }
}

/// Packs one overflow ("large") function header record: every field as a
/// plain 32-bit-aligned little-endian `u32`, no width restriction.
fn pack_overflow(h: &FunctionHeader) -> [u8; OVERFLOW_HEADER_SIZE] {
    let mut out = Vec::with_capacity(OVERFLOW_HEADER_SIZE);
    out.put_u32_le(h.offset);
    out.put_u32_le(h.param_count);
    out.put_u32_le(h.bytecode_size_in_bytes);
    out.put_u32_le(h.function_name);
    out.put_u32_le(h.info_offset);
    out.put_u32_le(h.frame_size);
    out.put_u32_le(h.environment_size);
    out.put_u32_le(h.highest_read_cache_index);
    out.put_u32_le(h.highest_write_cache_index);
    out.put_u32_le(h.flags as u32);
    out.try_into().expect("exactly OVERFLOW_HEADER_SIZE bytes written")
}

fn unpack_overflow(bytes: &[u8; OVERFLOW_HEADER_SIZE]) -> FunctionHeader {
    let mut buf = &bytes[..];
    FunctionHeader {
        offset: buf.get_u32_le(),
        param_count: buf.get_u32_le(),
        bytecode_size_in_bytes: buf.get_u32_le(),
        function_name: buf.get_u32_le(),
        info_offset: buf.get_u32_le(),
        frame_size: buf.get_u32_le(),
        environment_size: buf.get_u32_le(),
        highest_read_cache_index: buf.get_u32_le(),
        highest_write_cache_index: buf.get_u32_le(),
        flags: buf.get_u32_le() as u8,
        small: None,
    }
}

/// Parses one function header from the compact table, resolving it against
/// `overflow_region` (the raw bytes of the overflow record table, which
/// immediately follows the compact table on disk) if overflowed.
pub(crate) fn parse_function_header(
    compact_bytes: &[u8; COMPACT_HEADER_SIZE],
    overflow_region: &[u8],
) -> Result<FunctionHeader, HbcError> {
    let compact = unpack_compact(compact_bytes);

    if compact.flags & OVERFLOWED_FLAG == 0 {
        return Ok(FunctionHeader {
            offset: compact.offset,
            param_count: compact.param_count,
            bytecode_size_in_bytes: compact.bytecode_size_in_bytes,
            function_name: compact.function_name,
            info_offset: compact.info_offset,
            frame_size: compact.frame_size,
            environment_size: compact.environment_size,
            highest_read_cache_index: compact.highest_read_cache_index,
            highest_write_cache_index: compact.highest_write_cache_index,
            flags: compact.flags,
            small: None,
        });
    }

    let index = compact.offset as usize;
    let start = index
        .checked_mul(OVERFLOW_HEADER_SIZE)
        .ok_or_else(|| HbcError::malformed(0, "overflow header index overflowed"))?;
    let raw: &[u8; OVERFLOW_HEADER_SIZE] = overflow_region
        .get(start..start + OVERFLOW_HEADER_SIZE)
        .ok_or_else(|| HbcError::malformed(start, "overflow header index out of bounds"))?
        .try_into()
        .unwrap();
    let mut large = unpack_overflow(raw);
    // `compact.offset` holds the overflow-record index here, not a byte
    // offset (see `pack_compact`) — the true offset is whatever the
    // overflow record itself carries, which is also what `small.offset`
    // must reflect, since a function's offset never changes across an
    // overflow transition.
    large.small = Some(SmallFuncHeader {
        offset: large.offset,
        param_count: compact.param_count,
        bytecode_size_in_bytes: compact.bytecode_size_in_bytes,
        function_name: compact.function_name,
        info_offset: compact.info_offset,
        frame_size: compact.frame_size,
        environment_size: compact.environment_size,
        highest_read_cache_index: compact.highest_read_cache_index,
        highest_write_cache_index: compact.highest_write_cache_index,
        flags: compact.flags,
    });
    Ok(large)
}

/// Packs `headers` for export. Returns the bytes of the compact table
/// followed by the bytes of the overflow region (headers without a `small`
/// snapshot contribute nothing to the overflow region).
pub(crate) fn export_function_headers(headers: &[FunctionHeader]) -> (Vec<u8>, Vec<u8>) {
    let mut compact = Vec::with_capacity(headers.len() * COMPACT_HEADER_SIZE);
    let mut overflow = Vec::new();
    let mut next_overflow_index: u32 = 0;

    for h in headers {
        match &h.small {
            Some(small) => {
                let fields = CompactFields {
                    offset: small.offset,
                    param_count: small.param_count,
                    bytecode_size_in_bytes: small.bytecode_size_in_bytes,
                    function_name: small.function_name,
                    info_offset: small.info_offset,
                    frame_size: small.frame_size,
                    environment_size: small.environment_size,
                    highest_read_cache_index: small.highest_read_cache_index,
                    highest_write_cache_index: small.highest_write_cache_index,
                    flags: small.flags,
                };
                compact.extend_from_slice(&pack_compact(&fields, Some(next_overflow_index)));
                overflow.extend_from_slice(&pack_overflow(h));
                next_overflow_index += 1;
            }
            None => {
                let fields = CompactFields {
                    offset: h.offset,
                    param_count: h.param_count,
                    bytecode_size_in_bytes: h.bytecode_size_in_bytes,
                    function_name: h.function_name,
                    info_offset: h.info_offset,
                    frame_size: h.frame_size,
                    environment_size: h.environment_size,
                    highest_read_cache_index: h.highest_read_cache_index,
                    highest_write_cache_index: h.highest_write_cache_index,
                    flags: h.flags,
                };
                compact.extend_from_slice(&pack_compact(&fields, None));
            }
        }
    }

    (compact, overflow)
}

/// Packs one string table entry into its 32-bit on-disk word: bit 0 is
/// `isUTF16`, followed by the version-dependent `offset`/`length` bit
/// fields (in that order, low-to-high).
pub(crate) fn pack_string_entry(version: HbcVersion, is_utf16: bool, offset: u32, length: u32) -> [u8; 4] {
    let (offset_bits, length_bits) = version.string_entry_widths();
    let word = pack_word4(
        (is_utf16 as u32, 1),
        (offset, offset_bits),
        (length, length_bits),
        (0, 0),
    );
    word.to_le_bytes()
}

/// Unpacks one string table entry word.
pub(crate) fn unpack_string_entry(version: HbcVersion, word: u32) -> (bool, u32, u32) {
    let (offset_bits, length_bits) = version.string_entry_widths();
    let is_utf16 = (word & 1) != 0;
    let offset = unpack_field(word, 1, offset_bits);
    let length = unpack_field(word, 1 + offset_bits, length_bits);
    (is_utf16, offset, length)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> FunctionHeader {
        FunctionHeader {
            offset: 1234,
            param_count: 3,
            bytecode_size_in_bytes: 100,
            function_name: 7,
            info_offset: 999,
            frame_size: 4,
            environment_size: 2,
            highest_read_cache_index: 1,
            highest_write_cache_index: 0,
            flags: 0,
            small: None,
        }
    }

    #[test]
    fn compact_round_trips_non_overflowed_header() {
        let header = sample_header();
        let (compact, overflow) = export_function_headers(std::slice::from_ref(&header));
        assert!(overflow.is_empty());
        let bytes: [u8; COMPACT_HEADER_SIZE] = compact.try_into().unwrap();
        let parsed = parse_function_header(&bytes, &[]).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn compact_round_trips_overflowed_header() {
        let mut header = sample_header();
        header.flags = OVERFLOWED_FLAG;
        header.bytecode_size_in_bytes = 50_000;
        header.small = Some(SmallFuncHeader {
            offset: header.offset,
            param_count: header.param_count,
            bytecode_size_in_bytes: MAX_SMALL_BYTECODE_SIZE.min(100),
            function_name: header.function_name,
            info_offset: header.info_offset,
            frame_size: header.frame_size,
            environment_size: header.environment_size,
            highest_read_cache_index: header.highest_read_cache_index,
            highest_write_cache_index: header.highest_write_cache_index,
            flags: OVERFLOWED_FLAG,
        });

        let (compact, overflow) = export_function_headers(std::slice::from_ref(&header));
        assert_eq!(overflow.len(), OVERFLOW_HEADER_SIZE);
        let bytes: [u8; COMPACT_HEADER_SIZE] = compact.try_into().unwrap();
        let parsed = parse_function_header(&bytes, &overflow).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn bytecode_size_field_caps_at_fifteen_bits() {
        assert_eq!(MAX_SMALL_BYTECODE_SIZE, 32767);
    }

    #[test]
    fn string_entry_round_trips_for_both_versions() {
        for version in [HbcVersion::V86, HbcVersion::V96] {
            let packed = pack_string_entry(version, true, 12, 3);
            let word = u32::from_le_bytes(packed);
            assert_eq!(unpack_string_entry(version, word), (true, 12, 3));
        }
    }

    #[test]
    fn invalid_length_is_all_ones_of_the_inline_length_field() {
        assert_eq!(HbcVersion::V86.invalid_length(), 0xFF);
        assert_eq!(HbcVersion::V96.invalid_length(), 0x7FFF);
    }
}
