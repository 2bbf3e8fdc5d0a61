//! Byte stream → [`Container`].
//!
//! Follows the `wuff::parse::Parse` convention of borrowing a cursor and
//! returning `Result<Self, _>`, generalized here to a free function since
//! a `Container` is assembled from several independently-offset regions
//! rather than read sequentially off one cursor.

use crate::buffer::slice_checked;
use crate::container::{Container, RegionGaps, StringTableEntry, StringTableOverflowEntry};
use crate::error::HbcError;
use crate::header::{self, FileHeader};

/// Controls how much post-parse validation [`parse`] performs.
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    /// Re-walk every §3 invariant after materializing the container.
    /// Never skips the structural bounds checks a correct parse requires
    /// to avoid panics — only the redundant invariant re-walk.
    pub strict: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self { strict: true }
    }
}

/// Parses one complete HBC container from `bytes` with [`ParseOptions::default`].
pub fn parse(bytes: &[u8]) -> Result<Container, HbcError> {
    parse_with_options(bytes, ParseOptions::default())
}

/// Parses one complete HBC container from `bytes`.
///
/// Table boundaries the file header doesn't size explicitly are derived
/// from the next table's start offset, in the fixed order: function
/// headers (compact table, then overflow region), string table, string
/// table overflow table, string storage, array buffer, obj key buffer,
/// obj value buffer, instruction buffer (the last running to end of file).
pub fn parse_with_options(bytes: &[u8], options: ParseOptions) -> Result<Container, HbcError> {
    let mut input = bytes;
    let file_header = FileHeader::parse(&mut input)?;

    let before_function_headers = gap_bytes(
        bytes,
        header::FILE_HEADER_SIZE,
        file_header.function_headers_offset as usize,
        "function header table starts before the fixed file header ends",
    )?;

    let compact_len = file_header.function_count as usize * header::COMPACT_HEADER_SIZE;
    let compact_start = file_header.function_headers_offset as usize;
    let compact_end = compact_start + compact_len;
    let compact_table = slice_checked(bytes, compact_start, compact_len)?;

    let overflow_region_len = (file_header.string_table_offset as usize)
        .checked_sub(compact_end)
        .ok_or_else(|| HbcError::malformed(compact_end, "string table starts before function header table ends"))?;
    let overflow_region = slice_checked(bytes, compact_end, overflow_region_len)?;

    let mut function_headers = Vec::with_capacity(file_header.function_count as usize);
    for i in 0..file_header.function_count as usize {
        let start = i * header::COMPACT_HEADER_SIZE;
        let slot: &[u8; header::COMPACT_HEADER_SIZE] =
            compact_table[start..start + header::COMPACT_HEADER_SIZE].try_into().unwrap();
        function_headers.push(header::parse_function_header(slot, overflow_region)?);
    }

    // Overflowed headers are packed at the front of `overflow_region`,
    // indices 0..count-1 (see `header::pack_compact`); anything past that
    // is padding this crate has no structural use for but must still
    // reproduce on export.
    let overflow_count = function_headers.iter().filter(|h| h.small.is_some()).count();
    let packed_overflow_len = overflow_count * header::OVERFLOW_HEADER_SIZE;
    let after_function_headers = overflow_region
        .get(packed_overflow_len..)
        .ok_or_else(|| HbcError::malformed(compact_end + packed_overflow_len, "overflow region shorter than its referenced records"))?
        .to_vec();

    let string_table_len = file_header.string_count as usize * 4;
    let string_table = slice_checked(bytes, file_header.string_table_offset as usize, string_table_len)?;
    let mut string_table_entries = Vec::with_capacity(file_header.string_count as usize);
    for i in 0..file_header.string_count as usize {
        let word_bytes: [u8; 4] = string_table[i * 4..i * 4 + 4].try_into().unwrap();
        let (is_utf16, offset, length) =
            header::unpack_string_entry(file_header.version, u32::from_le_bytes(word_bytes));
        string_table_entries.push(StringTableEntry { is_utf16, offset, length });
    }

    let after_string_table = gap_bytes(
        bytes,
        file_header.string_table_offset as usize + string_table_len,
        file_header.string_table_overflow_offset as usize,
        "string table overflow region starts before the string table ends",
    )?;

    let overflow_entries_len = file_header.string_table_overflow_count as usize * 8;
    let overflow_entries_bytes =
        slice_checked(bytes, file_header.string_table_overflow_offset as usize, overflow_entries_len)?;
    let mut string_table_overflow_entries =
        Vec::with_capacity(file_header.string_table_overflow_count as usize);
    for i in 0..file_header.string_table_overflow_count as usize {
        let chunk = &overflow_entries_bytes[i * 8..i * 8 + 8];
        let offset = u32::from_le_bytes(chunk[0..4].try_into().unwrap());
        let length = u32::from_le_bytes(chunk[4..8].try_into().unwrap());
        string_table_overflow_entries.push(StringTableOverflowEntry { offset, length });
    }

    let after_string_table_overflow = gap_bytes(
        bytes,
        file_header.string_table_overflow_offset as usize + overflow_entries_len,
        file_header.string_storage_offset as usize,
        "string storage starts before the string table overflow region ends",
    )?;

    let string_storage_len = (file_header.array_buffer_offset as usize)
        .checked_sub(file_header.string_storage_offset as usize)
        .ok_or_else(|| HbcError::malformed(file_header.string_storage_offset as usize, "array buffer starts before string storage"))?;
    let string_storage = slice_checked(bytes, file_header.string_storage_offset as usize, string_storage_len)?.to_vec();

    let array_buffer =
        slice_checked(bytes, file_header.array_buffer_offset as usize, file_header.array_buffer_size as usize)?.to_vec();

    let after_array_buffer = gap_bytes(
        bytes,
        file_header.array_buffer_offset as usize + file_header.array_buffer_size as usize,
        file_header.obj_key_buffer_offset as usize,
        "obj key buffer starts before the array buffer ends",
    )?;

    let obj_key_buffer =
        slice_checked(bytes, file_header.obj_key_buffer_offset as usize, file_header.obj_key_buffer_size as usize)?.to_vec();

    let after_obj_key_buffer = gap_bytes(
        bytes,
        file_header.obj_key_buffer_offset as usize + file_header.obj_key_buffer_size as usize,
        file_header.obj_value_buffer_offset as usize,
        "obj value buffer starts before the obj key buffer ends",
    )?;

    let obj_value_buffer =
        slice_checked(bytes, file_header.obj_value_buffer_offset as usize, file_header.obj_value_buffer_size as usize)?.to_vec();

    let after_obj_value_buffer = gap_bytes(
        bytes,
        file_header.obj_value_buffer_offset as usize + file_header.obj_value_buffer_size as usize,
        file_header.inst_offset as usize,
        "instruction buffer starts before the obj value buffer ends",
    )?;

    let inst_buffer = bytes
        .get(file_header.inst_offset as usize..)
        .ok_or_else(|| HbcError::malformed(file_header.inst_offset as usize, "instOffset past end of file"))?
        .to_vec();

    let inst_offset = file_header.inst_offset;
    let gaps = RegionGaps {
        before_function_headers,
        after_function_headers,
        after_string_table,
        after_string_table_overflow,
        after_array_buffer,
        after_obj_key_buffer,
        after_obj_value_buffer,
    };
    let container = Container {
        header: file_header,
        function_headers,
        string_table_entries,
        string_table_overflow_entries,
        string_storage,
        array_buffer,
        obj_key_buffer,
        obj_value_buffer,
        inst_buffer,
        inst_offset,
        gaps,
    };

    if options.strict {
        container.validate_invariants()?;
    }
    Ok(container)
}

/// Returns the raw bytes between `region_end` and `next_offset`, the
/// padding a region's explicit size doesn't account for.
fn gap_bytes(bytes: &[u8], region_end: usize, next_offset: usize, reason: &'static str) -> Result<Vec<u8>, HbcError> {
    let len = next_offset
        .checked_sub(region_end)
        .ok_or_else(|| HbcError::malformed(region_end, reason))?;
    Ok(slice_checked(bytes, region_end, len)?.to_vec())
}
