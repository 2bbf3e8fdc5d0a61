//! [`Container`] → byte stream.
//!
//! `wuff` has no encode path to generalize from (it only decodes WOFF2);
//! this mirrors the shape its `types.rs`/`woff2_dec.rs` use for computing
//! region sizes (`required_size`-style running offset accumulation),
//! pointed the other direction — writing sections back-to-back rather than
//! validating that they fit.

use bytes::BufMut;

use crate::container::Container;
use crate::header::{self, FileHeader, FunctionHeader};

/// Serializes `container` to a freshly allocated buffer.
pub fn export(container: &Container) -> Vec<u8> {
    let mut out = Vec::new();
    export_into(container, &mut out);
    out
}

/// Serializes `container` into `sink`.
///
/// Tables are written in the file's fixed order (function headers, string
/// table, string table overflow, string storage, the three SLP buffers,
/// the instruction buffer), each immediately followed by the raw padding
/// bytes [`crate::container::RegionGaps`] captured for that boundary at
/// parse time. Every file-offset field is recomputed from these
/// content-plus-gap lengths rather than copied from the parsed header, so
/// a region whose packed size didn't change re-lands at its original
/// offset with its original gap intact, and a region a mutator resized
/// shifts everything after it by exactly the size delta while every other
/// gap keeps its own length and bytes. An unmodified `parse` → `export`
/// round trip is therefore byte-for-byte for any valid input, not just a
/// fixed point of this exporter. Because only the instruction buffer's
/// *file* position can move this way (function bytecode is never
/// relocated within it — see `setFunction`), every function header's
/// `offset` is translated by however much `instOffset` moved, keeping
/// `offset − instOffset` exactly as it was at parse time.
pub fn export_into(container: &Container, sink: &mut impl BufMut) {
    let gaps = &container.gaps;
    let overflow_count = container.function_headers.iter().filter(|h| h.small.is_some()).count();

    let mut string_table_bytes = Vec::with_capacity(container.string_table_entries.len() * 4);
    for e in &container.string_table_entries {
        string_table_bytes
            .extend_from_slice(&header::pack_string_entry(container.header.version, e.is_utf16, e.offset, e.length));
    }
    let overflow_entries_len = container.string_table_overflow_entries.len() * 8;

    let mut offset = header::FILE_HEADER_SIZE as u32;
    offset += gaps.before_function_headers.len() as u32;
    let function_headers_offset = offset;
    offset += (container.function_headers.len() * header::COMPACT_HEADER_SIZE) as u32;
    offset += (overflow_count * header::OVERFLOW_HEADER_SIZE) as u32;
    offset += gaps.after_function_headers.len() as u32;
    let string_table_offset = offset;
    offset += string_table_bytes.len() as u32;
    offset += gaps.after_string_table.len() as u32;
    let string_table_overflow_offset = offset;
    offset += overflow_entries_len as u32;
    offset += gaps.after_string_table_overflow.len() as u32;
    let string_storage_offset = offset;
    offset += container.string_storage.len() as u32;
    let array_buffer_offset = offset;
    offset += container.array_buffer.len() as u32;
    offset += gaps.after_array_buffer.len() as u32;
    let obj_key_buffer_offset = offset;
    offset += container.obj_key_buffer.len() as u32;
    offset += gaps.after_obj_key_buffer.len() as u32;
    let obj_value_buffer_offset = offset;
    offset += container.obj_value_buffer.len() as u32;
    offset += gaps.after_obj_value_buffer.len() as u32;
    let inst_offset = offset;

    let translated_headers = translate_offsets(&container.function_headers, container.inst_offset, inst_offset);
    let (compact, overflow) = header::export_function_headers(&translated_headers);

    let mut overflow_entries_bytes = Vec::with_capacity(overflow_entries_len);
    for e in &container.string_table_overflow_entries {
        overflow_entries_bytes.put_u32_le(e.offset);
        overflow_entries_bytes.put_u32_le(e.length);
    }

    let file_header = FileHeader {
        version: container.header.version,
        function_count: container.function_headers.len() as u32,
        string_count: container.string_table_entries.len() as u32,
        string_table_overflow_count: container.string_table_overflow_entries.len() as u32,
        array_buffer_size: container.array_buffer.len() as u32,
        obj_key_buffer_size: container.obj_key_buffer.len() as u32,
        obj_value_buffer_size: container.obj_value_buffer.len() as u32,
        function_headers_offset,
        string_table_offset,
        string_table_overflow_offset,
        string_storage_offset,
        array_buffer_offset,
        obj_key_buffer_offset,
        obj_value_buffer_offset,
        inst_offset,
    };

    file_header.write(sink);
    sink.put_slice(&gaps.before_function_headers);
    sink.put_slice(&compact);
    sink.put_slice(&overflow);
    sink.put_slice(&gaps.after_function_headers);
    sink.put_slice(&string_table_bytes);
    sink.put_slice(&gaps.after_string_table);
    sink.put_slice(&overflow_entries_bytes);
    sink.put_slice(&gaps.after_string_table_overflow);
    sink.put_slice(&container.string_storage);
    sink.put_slice(&container.array_buffer);
    sink.put_slice(&gaps.after_array_buffer);
    sink.put_slice(&container.obj_key_buffer);
    sink.put_slice(&gaps.after_obj_key_buffer);
    sink.put_slice(&container.obj_value_buffer);
    sink.put_slice(&gaps.after_obj_value_buffer);
    sink.put_slice(&container.inst_buffer);
}

/// Shifts every function header's `offset` (and its `small` snapshot's, if
/// present) by `new_inst_offset - old_inst_offset`, preserving each
/// function's position within `instBuffer` when the buffer's file offset
/// moves.
fn translate_offsets(headers: &[FunctionHeader], old_inst_offset: u32, new_inst_offset: u32) -> Vec<FunctionHeader> {
    let delta = new_inst_offset as i64 - old_inst_offset as i64;
    headers
        .iter()
        .map(|h| {
            let mut h = h.clone();
            h.offset = (h.offset as i64 + delta) as u32;
            if let Some(small) = &mut h.small {
                small.offset = (small.offset as i64 + delta) as u32;
            }
            h
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{RegionGaps, StringTableEntry, StringTableOverflowEntry};
    use crate::header::{HbcVersion, OVERFLOWED_FLAG};

    fn sample_container() -> Container {
        Container {
            header: FileHeader {
                version: HbcVersion::V96,
                function_count: 1,
                string_count: 1,
                string_table_overflow_count: 0,
                array_buffer_size: 0,
                obj_key_buffer_size: 0,
                obj_value_buffer_size: 0,
                function_headers_offset: 999,
                string_table_offset: 999,
                string_table_overflow_offset: 999,
                string_storage_offset: 999,
                array_buffer_offset: 999,
                obj_key_buffer_offset: 999,
                obj_value_buffer_offset: 999,
                inst_offset: 999,
            },
            function_headers: vec![FunctionHeader {
                offset: 42,
                param_count: 1,
                bytecode_size_in_bytes: 3,
                function_name: 0,
                info_offset: 0,
                frame_size: 2,
                environment_size: 0,
                highest_read_cache_index: 0,
                highest_write_cache_index: 0,
                flags: 0,
                small: None,
            }],
            string_table_entries: vec![StringTableEntry { is_utf16: false, offset: 0, length: 2 }],
            string_table_overflow_entries: vec![],
            string_storage: b"hi".to_vec(),
            array_buffer: vec![],
            obj_key_buffer: vec![],
            obj_value_buffer: vec![],
            inst_buffer: vec![9, 9, 9],
            inst_offset: 42,
            gaps: RegionGaps::default(),
        }
    }

    #[test]
    fn recomputes_header_counts_and_offsets() {
        let container = sample_container();
        let bytes = export(&container);
        let reparsed = crate::parser::parse(&bytes).unwrap();
        assert_eq!(reparsed.header.function_count, 1);
        assert_eq!(reparsed.header.string_count, 1);
        assert_ne!(reparsed.header.inst_offset, 999);
    }

    #[test]
    fn translates_function_offsets_with_inst_offset() {
        let container = sample_container();
        let bytes = export(&container);
        let reparsed = crate::parser::parse(&bytes).unwrap();
        let start = reparsed.function_headers[0].offset - reparsed.header.inst_offset;
        assert_eq!(start, 0);
        assert_eq!(&reparsed.inst_buffer[start as usize..start as usize + 3], &[9, 9, 9]);
    }

    #[test]
    fn includes_overflow_region_for_overflowed_headers() {
        let mut container = sample_container();
        container.function_headers[0].flags = OVERFLOWED_FLAG;
        container.function_headers[0].bytecode_size_in_bytes = 3;
        container.function_headers[0].small = Some(crate::header::SmallFuncHeader {
            offset: container.function_headers[0].offset,
            param_count: 1,
            bytecode_size_in_bytes: 3,
            function_name: 0,
            info_offset: 0,
            frame_size: 2,
            environment_size: 0,
            highest_read_cache_index: 0,
            highest_write_cache_index: 0,
            flags: OVERFLOWED_FLAG,
        });
        let bytes = export(&container);
        let reparsed = crate::parser::parse(&bytes).unwrap();
        assert!(reparsed.function_headers[0].is_overflowed());
        assert!(reparsed.function_headers[0].small.is_some());
    }

    #[test]
    fn string_table_overflow_entries_round_trip() {
        let mut container = sample_container();
        container.string_table_entries[0] =
            StringTableEntry { is_utf16: false, offset: 0, length: container.header.version.invalid_length() };
        container.string_table_overflow_entries = vec![StringTableOverflowEntry { offset: 0, length: 2 }];
        container.header.string_table_overflow_count = 1;
        let bytes = export(&container);
        let reparsed = crate::parser::parse(&bytes).unwrap();
        let (text, _) = reparsed.get_string(0).unwrap();
        assert_eq!(text, "hi");
    }

    #[test]
    fn unmodified_round_trip_reproduces_original_offsets_and_padding() {
        let mut container = sample_container();
        container.header.function_headers_offset = header::FILE_HEADER_SIZE as u32;
        container.gaps.after_function_headers = vec![0xAA, 0xAA];
        container.gaps.after_array_buffer = vec![0xBB];
        let bytes = export(&container);
        let reparsed = crate::parser::parse(&bytes).unwrap();
        let bytes_again = export(&reparsed);
        assert_eq!(bytes, bytes_again);
        assert_eq!(reparsed.gaps.after_function_headers, vec![0xAA, 0xAA]);
        assert_eq!(reparsed.gaps.after_array_buffer, vec![0xBB]);
    }
}
