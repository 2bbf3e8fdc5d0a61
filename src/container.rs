//! The container model: owns every parsed table and raw buffer, and
//! exposes the typed accessors/mutators callers edit an HBC file through.
//!
//! Mirrors the shape of `wuff::types::Woff2` — one struct owning every
//! table a parsed container needs, with `parse`-style constructors and
//! narrow accessor methods rather than public field soup — generalized to
//! also support in-place mutation, since `wuff` itself is decode-only.

use crate::buffer::{copy_with_growth, slice_checked};
use crate::error::HbcError;
use crate::header::{self, FileHeader, FunctionHeader, HbcVersion, SmallFuncHeader};
use crate::slp::{self, SlpValue};
use crate::translator::{BytecodeTranslator, Instruction};

/// One entry in the main string table.
#[derive(Debug, Clone, PartialEq)]
pub struct StringTableEntry {
    pub is_utf16: bool,
    pub offset: u32,
    pub length: u32,
}

/// One entry in the string table overflow region, addressed by index from
/// a main-table entry whose `length` equals the version's `INVALID_LENGTH`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StringTableOverflowEntry {
    pub offset: u32,
    pub length: u32,
}

/// Either the raw bytecode bytes of a function, or its disassembled form.
///
/// This is the idiomatic-Rust rendering of a `disasm: bool` flag: rather
/// than a boolean that must agree with which shape of data is actually
/// passed, the shape *is* the flag (see DESIGN.md).
#[derive(Debug, Clone)]
pub enum FunctionBody {
    Raw(Vec<u8>),
    Disassembled(Vec<Instruction>),
}

/// The result of [`Container::get_function`].
#[derive(Debug, Clone)]
pub struct FunctionView {
    pub name: String,
    pub param_count: u32,
    pub register_count: u32,
    pub symbol_count: u32,
    pub insts: FunctionBody,
}

/// The edit payload for [`Container::set_function`]. A function name is
/// intentionally absent: renaming a function is an explicit non-goal, so
/// there is nothing for a caller to pass.
#[derive(Debug, Clone)]
pub struct FunctionPatch {
    pub param_count: u32,
    pub register_count: u32,
    pub symbol_count: u32,
    pub insts: FunctionBody,
}

/// The raw inter-table padding a parsed file carried, captured verbatim so
/// an unmodified round trip reproduces it rather than collapsing every gap
/// to zero.
///
/// Each field is the byte span between one table's logical end and the
/// file offset of the table that follows it. A table whose length is
/// always derived by subtracting offsets (string storage) needs no entry
/// here, since any gap after it is already absorbed into its own bytes.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct RegionGaps {
    /// Between the fixed file header and the function header table.
    pub before_function_headers: Vec<u8>,
    /// Between the last referenced overflow header record and the string
    /// table.
    pub after_function_headers: Vec<u8>,
    /// Between the string table and the string table overflow region.
    pub after_string_table: Vec<u8>,
    /// Between the string table overflow region and string storage.
    pub after_string_table_overflow: Vec<u8>,
    /// Between the array buffer and the obj key buffer.
    pub after_array_buffer: Vec<u8>,
    /// Between the obj key buffer and the obj value buffer.
    pub after_obj_key_buffer: Vec<u8>,
    /// Between the obj value buffer and the instruction buffer.
    pub after_obj_value_buffer: Vec<u8>,
}

/// The parsed, mutable in-memory form of an HBC container.
///
/// Every raw buffer is exclusively owned here; getters hand out read-only
/// views and setters require `&mut self`, so Rust's borrow checker enforces
/// the "no call mix may read through a view that outlives a mutation" rule
/// for free rather than it being a documentation-only discipline.
#[derive(Debug, Clone)]
pub struct Container {
    pub(crate) header: FileHeader,
    pub(crate) function_headers: Vec<FunctionHeader>,
    pub(crate) string_table_entries: Vec<StringTableEntry>,
    pub(crate) string_table_overflow_entries: Vec<StringTableOverflowEntry>,
    pub(crate) string_storage: Vec<u8>,
    pub(crate) array_buffer: Vec<u8>,
    pub(crate) obj_key_buffer: Vec<u8>,
    pub(crate) obj_value_buffer: Vec<u8>,
    pub(crate) inst_buffer: Vec<u8>,
    pub(crate) inst_offset: u32,
    pub(crate) gaps: RegionGaps,
}

impl Container {
    pub fn version(&self) -> HbcVersion {
        self.header.version
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn function_count(&self) -> usize {
        self.function_headers.len()
    }

    pub fn string_count(&self) -> usize {
        self.string_table_entries.len()
    }

    pub fn array_buffer_size(&self) -> usize {
        self.array_buffer.len()
    }

    pub fn obj_key_buffer_size(&self) -> usize {
        self.obj_key_buffer.len()
    }

    pub fn obj_value_buffer_size(&self) -> usize {
        self.obj_value_buffer.len()
    }

    /// Every §3 invariant, checked against the current state. Called by the
    /// parser in strict mode and by tests; setters maintain these
    /// invariants as they go rather than calling this after every edit.
    pub(crate) fn validate_invariants(&self) -> Result<(), HbcError> {
        if self.header.function_count as usize != self.function_headers.len() {
            return Err(HbcError::malformed(0, "functionCount disagrees with functionHeaders length"));
        }
        if self.header.string_count as usize != self.string_table_entries.len() {
            return Err(HbcError::malformed(0, "stringCount disagrees with stringTableEntries length"));
        }
        if self.header.array_buffer_size as usize != self.array_buffer.len() {
            return Err(HbcError::malformed(0, "arrayBufferSize disagrees with arrayBuffer length"));
        }
        if self.header.obj_key_buffer_size as usize != self.obj_key_buffer.len() {
            return Err(HbcError::malformed(0, "objKeyBufferSize disagrees with objKeyBuffer length"));
        }
        if self.header.obj_value_buffer_size as usize != self.obj_value_buffer.len() {
            return Err(HbcError::malformed(0, "objValueBufferSize disagrees with objValueBuffer length"));
        }

        for (i, h) in self.function_headers.iter().enumerate() {
            if h.is_overflowed() != h.small.is_some() {
                return Err(HbcError::malformed(0, format!("function {i}: overflow flag disagrees with `small` presence")));
            }
            if let Some(small) = &h.small {
                if small.bytecode_size_in_bytes > header::MAX_SMALL_BYTECODE_SIZE {
                    return Err(HbcError::malformed(0, format!("function {i}: small.bytecodeSizeInBytes exceeds 15 bits")));
                }
                if small.flags != h.flags {
                    return Err(HbcError::malformed(0, format!("function {i}: small.flags disagrees with flags")));
                }
            }
            let start = (h.offset as usize)
                .checked_sub(self.inst_offset as usize)
                .ok_or_else(|| HbcError::malformed(0, format!("function {i}: offset precedes instOffset")))?;
            let end = start
                .checked_add(h.bytecode_size_in_bytes as usize)
                .ok_or_else(|| HbcError::malformed(0, format!("function {i}: bytecode range overflowed")))?;
            if end > self.inst_buffer.len() {
                return Err(HbcError::malformed(0, format!("function {i}: bytecode range exceeds instBuffer")));
            }
        }

        for (i, _) in self.string_table_entries.iter().enumerate() {
            let (is_utf16, offset, length) = self.resolve_string_slot(i)?;
            let byte_len = if is_utf16 { (length as usize) * 2 } else { length as usize };
            if offset as usize + byte_len > self.string_storage.len() {
                return Err(HbcError::malformed(0, format!("string {i}: resolved range exceeds stringStorage")));
            }
        }

        Ok(())
    }

    fn resolve_string_slot(&self, sid: usize) -> Result<(bool, u32, u32), HbcError> {
        let entry = self
            .string_table_entries
            .get(sid)
            .ok_or(HbcError::InvalidId { id: sid, bound: self.string_table_entries.len() })?;

        if entry.length >= self.header.version.invalid_length() {
            let overflow = self
                .string_table_overflow_entries
                .get(entry.offset as usize)
                .ok_or_else(|| HbcError::malformed(0, "string overflow index out of bounds"))?;
            Ok((entry.is_utf16, overflow.offset, overflow.length))
        } else {
            Ok((entry.is_utf16, entry.offset, entry.length))
        }
    }

    /// Reads a string slot as `(text, (isUTF16, offset, length))`.
    ///
    /// UTF-16 slots are returned as lowercase hex of the raw bytes (no
    /// decoding is attempted — HBC stores UTF-16 strings as opaque code
    /// unit sequences that a JS engine, not this crate, interprets).
    pub fn get_string(&self, sid: usize) -> Result<(String, (bool, u32, u32)), HbcError> {
        let slot = self.resolve_string_slot(sid)?;
        let (is_utf16, offset, length) = slot;
        let byte_len = if is_utf16 { (length as usize) * 2 } else { length as usize };
        let bytes = slice_checked(&self.string_storage, offset as usize, byte_len)?;

        let text = if is_utf16 {
            hex_encode(bytes)
        } else {
            std::str::from_utf8(bytes)
                .map(str::to_owned)
                .map_err(|_| HbcError::EncodingError { offset, len: byte_len as u32 })?
        };
        Ok((text, slot))
    }

    /// Overwrites a string slot in place. Growth beyond the slot's original
    /// byte length is rejected (`OverflowUnsupported`); shrinkage is
    /// permitted and leaves the unused tail bytes untouched (see DESIGN.md,
    /// "string length shrinkage").
    pub fn set_string(&mut self, sid: usize, value: &str) -> Result<(), HbcError> {
        let (is_utf16, offset, length) = self.resolve_string_slot(sid)?;

        let bytes = if is_utf16 {
            decode_hex(value)
                .ok_or_else(|| HbcError::malformed(0, "UTF-16 slot value is not valid hex"))?
        } else {
            value.as_bytes().to_vec()
        };

        // The length check compares code-unit/code-point counts against the
        // slot's declared length, not the encoded byte
        // count; this matches the reference implementation's `len(val)`
        // comparison verbatim (see DESIGN.md).
        let new_len = if is_utf16 { (bytes.len() / 2) as u32 } else { value.chars().count() as u32 };
        if new_len > length {
            return Err(HbcError::OverflowUnsupported { requested: new_len as usize, available: length as usize });
        }

        let end = offset as usize + bytes.len();
        if end > self.string_storage.len() {
            return Err(HbcError::malformed(offset as usize, "string write exceeds stringStorage bounds"));
        }
        self.string_storage[offset as usize..end].copy_from_slice(&bytes);
        Ok(())
    }

    pub fn get_array(&self, aid: usize) -> Result<(&'static str, Vec<SlpValue>), HbcError> {
        decode_slp_group(&self.array_buffer, aid)
    }

    pub fn get_obj_key(&self, kid: usize) -> Result<(&'static str, Vec<SlpValue>), HbcError> {
        decode_slp_group(&self.obj_key_buffer, kid)
    }

    pub fn get_obj_value(&self, vid: usize) -> Result<(&'static str, Vec<SlpValue>), HbcError> {
        decode_slp_group(&self.obj_value_buffer, vid)
    }

    /// Reads a function's header fields and bytecode, disassembling it via
    /// `translator` when `disasm` is set.
    pub fn get_function(
        &self,
        fid: usize,
        disasm: bool,
        translator: &dyn BytecodeTranslator,
    ) -> Result<FunctionView, HbcError> {
        let header = self
            .function_headers
            .get(fid)
            .ok_or(HbcError::InvalidId { id: fid, bound: self.function_headers.len() })?;

        let start = (header.offset as usize)
            .checked_sub(self.inst_offset as usize)
            .ok_or_else(|| HbcError::malformed(0, "function offset precedes instOffset"))?;
        let raw = slice_checked(&self.inst_buffer, start, header.bytecode_size_in_bytes as usize)?;

        let insts = if disasm {
            FunctionBody::Disassembled(translator.disassemble(raw)?)
        } else {
            FunctionBody::Raw(raw.to_vec())
        };

        let (name, _) = self.get_string(header.function_name as usize)?;

        Ok(FunctionView {
            name,
            param_count: header.param_count,
            register_count: header.frame_size,
            symbol_count: header.environment_size,
            insts,
        })
    }

    /// The central edit operation: updates a function's register/parameter
    /// metadata and bytecode, transitioning its header between compact and
    /// overflow form as needed.
    ///
    /// All preconditions are validated, and the replacement bytecode fully
    /// assembled, before any buffer is touched — a returned `Err` leaves
    /// the container exactly as it was.
    pub fn set_function(
        &mut self,
        fid: usize,
        patch: FunctionPatch,
        translator: &dyn BytecodeTranslator,
    ) -> Result<(), HbcError> {
        if fid >= self.function_headers.len() {
            return Err(HbcError::InvalidId { id: fid, bound: self.function_headers.len() });
        }

        let bc = match patch.insts {
            FunctionBody::Raw(bytes) => bytes,
            FunctionBody::Disassembled(insts) => translator.assemble(&insts)?,
        };

        let inst_offset = self.inst_offset;
        let h = &self.function_headers[fid];
        let start = (h.offset as usize)
            .checked_sub(inst_offset as usize)
            .ok_or_else(|| HbcError::malformed(0, "function offset precedes instOffset"))?;

        let h = &mut self.function_headers[fid];
        h.param_count = patch.param_count;
        h.frame_size = patch.register_count;
        h.environment_size = patch.symbol_count;

        let original = h.bytecode_size_in_bytes;
        let new_len = bc.len() as u32;

        if new_len > header::MAX_SMALL_BYTECODE_SIZE {
            h.flags |= header::OVERFLOWED_FLAG;
            if h.small.is_none() {
                h.small = Some(SmallFuncHeader {
                    offset: h.offset,
                    param_count: h.param_count,
                    bytecode_size_in_bytes: original.min(header::MAX_SMALL_BYTECODE_SIZE),
                    function_name: h.function_name,
                    info_offset: h.info_offset,
                    frame_size: h.frame_size,
                    environment_size: h.environment_size,
                    highest_read_cache_index: h.highest_read_cache_index,
                    highest_write_cache_index: h.highest_write_cache_index,
                    flags: h.flags,
                });
                tracing::debug!(fid, new_len, "function header entered overflow form");
            }
            h.bytecode_size_in_bytes = new_len;
        } else {
            let was_overflowed = h.small.is_some();
            h.bytecode_size_in_bytes = new_len;
            h.flags &= !header::OVERFLOWED_FLAG;
            h.small = None;
            if was_overflowed {
                tracing::debug!(fid, new_len, "function header left overflow form");
            }
        }

        copy_with_growth(&mut self.inst_buffer, start, &bc);
        Ok(())
    }
}

fn decode_slp_group(buf: &[u8], id: usize) -> Result<(&'static str, Vec<SlpValue>), HbcError> {
    if id >= buf.len() {
        return Err(HbcError::InvalidId { id, bound: buf.len() });
    }
    let group = slp::decode_group_header(buf, id)?;
    let mut offset = id + group.header_len;
    let mut values = Vec::with_capacity(group.count);
    for _ in 0..group.count {
        let (value, consumed) = slp::decode_payload(buf, offset, group.kind)?;
        offset += consumed;
        values.push(value);
    }
    Ok((group.kind.label(), values))
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(out, "{b:02x}").expect("writing to a String cannot fail");
    }
    out
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translator::NullTranslator;

    fn base_function_header() -> FunctionHeader {
        FunctionHeader {
            offset: 10,
            param_count: 1,
            bytecode_size_in_bytes: 100,
            function_name: 0,
            info_offset: 0,
            frame_size: 2,
            environment_size: 0,
            highest_read_cache_index: 0,
            highest_write_cache_index: 0,
            flags: 0,
            small: None,
        }
    }

    fn empty_container(bytecode_len: usize) -> Container {
        Container {
            header: FileHeader {
                version: HbcVersion::V86,
                function_count: 1,
                string_count: 1,
                string_table_overflow_count: 0,
                array_buffer_size: 0,
                obj_key_buffer_size: 0,
                obj_value_buffer_size: 0,
                function_headers_offset: 0,
                string_table_offset: 0,
                string_table_overflow_offset: 0,
                string_storage_offset: 0,
                array_buffer_offset: 0,
                obj_key_buffer_offset: 0,
                obj_value_buffer_offset: 0,
                inst_offset: 10,
            },
            function_headers: vec![base_function_header()],
            string_table_entries: vec![StringTableEntry { is_utf16: false, offset: 0, length: 0 }],
            string_table_overflow_entries: vec![],
            string_storage: vec![],
            array_buffer: vec![],
            obj_key_buffer: vec![],
            obj_value_buffer: vec![],
            inst_buffer: vec![0u8; bytecode_len],
            inst_offset: 10,
            gaps: RegionGaps::default(),
        }
    }

    #[test]
    fn scenario_1_normal_edit_no_overflow() {
        let mut c = empty_container(110);
        c.set_function(
            0,
            FunctionPatch { param_count: 1, register_count: 2, symbol_count: 0, insts: FunctionBody::Raw(vec![1, 2, 3]) },
            &NullTranslator,
        )
        .unwrap();
        let h = &c.function_headers[0];
        assert_eq!(h.bytecode_size_in_bytes, 3);
        assert_eq!(h.flags & header::OVERFLOWED_FLAG, 0);
        assert!(h.small.is_none());
        assert_eq!(&c.inst_buffer[0..3], &[1, 2, 3]);
    }

    #[test]
    fn scenario_2_exact_fifteen_bit_boundary_no_overflow() {
        let mut c = empty_container(100);
        let bc = vec![0x77u8; 32767];
        c.set_function(0, FunctionPatch { param_count: 1, register_count: 2, symbol_count: 0, insts: FunctionBody::Raw(bc) }, &NullTranslator)
            .unwrap();
        let h = &c.function_headers[0];
        assert_eq!(h.bytecode_size_in_bytes, 32767);
        assert_eq!(h.flags & header::OVERFLOWED_FLAG, 0);
        assert!(h.small.is_none());
    }

    #[test]
    fn scenario_3_just_over_boundary_triggers_overflow() {
        let mut c = empty_container(100);
        let bc = vec![0x88u8; 32768];
        c.set_function(0, FunctionPatch { param_count: 1, register_count: 2, symbol_count: 0, insts: FunctionBody::Raw(bc) }, &NullTranslator)
            .unwrap();
        let h = &c.function_headers[0];
        assert_eq!(h.bytecode_size_in_bytes, 32768);
        assert_ne!(h.flags & header::OVERFLOWED_FLAG, 0);
        let small = h.small.as_ref().unwrap();
        assert_eq!(small.bytecode_size_in_bytes, 100);
        assert_eq!(small.flags, h.flags);
    }

    #[test]
    fn scenario_4_large_overflow() {
        let mut c = empty_container(100);
        let bc = vec![0xFFu8; 50_000];
        c.set_function(0, FunctionPatch { param_count: 1, register_count: 2, symbol_count: 0, insts: FunctionBody::Raw(bc) }, &NullTranslator)
            .unwrap();
        let h = &c.function_headers[0];
        assert_eq!(h.bytecode_size_in_bytes, 50_000);
        assert_ne!(h.flags & header::OVERFLOWED_FLAG, 0);
        assert_eq!(h.small.as_ref().unwrap().bytecode_size_in_bytes, 100);
    }

    #[test]
    fn scenario_5_overflow_to_normal_transition() {
        let mut c = empty_container(100);
        c.set_function(0, FunctionPatch { param_count: 1, register_count: 2, symbol_count: 0, insts: FunctionBody::Raw(vec![0xFFu8; 50_000]) }, &NullTranslator)
            .unwrap();
        c.set_function(0, FunctionPatch { param_count: 1, register_count: 2, symbol_count: 0, insts: FunctionBody::Raw(vec![0x11u8; 100]) }, &NullTranslator)
            .unwrap();
        let h = &c.function_headers[0];
        assert_eq!(h.bytecode_size_in_bytes, 100);
        assert_eq!(h.flags & header::OVERFLOWED_FLAG, 0);
        assert!(h.small.is_none());
    }

    #[test]
    fn setter_is_idempotent_for_overflowing_edits() {
        let mut c = empty_container(100);
        let patch = || FunctionPatch { param_count: 1, register_count: 2, symbol_count: 0, insts: FunctionBody::Raw(vec![0xABu8; 40_000]) };
        c.set_function(0, patch(), &NullTranslator).unwrap();
        let after_first = c.function_headers[0].clone();
        c.set_function(0, patch(), &NullTranslator).unwrap();
        assert_eq!(c.function_headers[0], after_first);
    }

    #[test]
    fn scenario_6_slp_group_decoding() {
        let buf = [0x77u8, 0x01, 0x00, 0x02, 0x00, 0x03, 0x00, 0x04, 0x00, 0x05, 0x00, 0x06, 0x00, 0x07, 0x00];
        let mut c = empty_container(0);
        c.array_buffer = buf.to_vec();
        c.header.array_buffer_size = buf.len() as u32;
        let (kind, values) = c.get_array(0).unwrap();
        assert_eq!(kind, "String");
        let expected: Vec<SlpValue> = (1..=7).map(SlpValue::StringRef).collect();
        assert_eq!(values, expected);
    }

    #[test]
    fn get_function_out_of_range_is_invalid_id() {
        let c = empty_container(110);
        let err = c.get_function(5, false, &NullTranslator).unwrap_err();
        assert!(matches!(err, HbcError::InvalidId { id: 5, bound: 1 }));
    }

    #[test]
    fn set_string_rejects_growth_past_slot_length() {
        let mut c = empty_container(0);
        c.string_storage = vec![b'h', b'i', b'!'];
        c.string_table_entries[0] = StringTableEntry { is_utf16: false, offset: 0, length: 2 };
        let err = c.set_string(0, "xyz").unwrap_err();
        assert!(matches!(err, HbcError::OverflowUnsupported { requested: 3, available: 2 }));
    }

    #[test]
    fn set_string_allows_shrinkage_and_leaves_tail_untouched() {
        let mut c = empty_container(0);
        c.string_storage = vec![b'h', b'i', b'!'];
        c.string_table_entries[0] = StringTableEntry { is_utf16: false, offset: 0, length: 3 };
        c.set_string(0, "x").unwrap();
        assert_eq!(c.string_storage, vec![b'x', b'i', b'!']);
    }

    #[test]
    fn hex_round_trips() {
        assert_eq!(hex_encode(&[0xDE, 0xAD]), "dead");
        assert_eq!(decode_hex("dead").unwrap(), vec![0xDE, 0xAD]);
        assert_eq!(decode_hex("xyz"), None);
    }
}
