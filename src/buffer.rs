//! Byte I/O primitives shared by the header codec, parser and exporter.
//!
//! Every multi-byte field in an HBC file is little-endian, so reads and
//! writes go straight through [`bytes::Buf`]/[`bytes::BufMut`]'s `_le`
//! methods rather than a bespoke cursor type. What *is* bespoke here is the
//! one operation `bytes` doesn't model: copying a byte range into a mutable
//! buffer that is allowed to grow (but never shrink) to make room.

use crate::error::HbcError;

/// Copies `src` into `dst` starting at `start`, zero-extending `dst` first
/// if it isn't already long enough to hold the write.
///
/// This is the only way buffers in a [`crate::container::Container`] ever
/// grow: callers never truncate or relocate existing bytes, they only
/// ensure enough zeroed space exists and then overwrite part of it.
pub(crate) fn copy_with_growth(dst: &mut Vec<u8>, start: usize, src: &[u8]) {
    let end = start + src.len();
    if end > dst.len() {
        dst.resize(end, 0);
    }
    dst[start..end].copy_from_slice(src);
}

/// Returns `buf[offset..offset + len]`, or an [`HbcError::MalformedFile`]
/// naming the violating offset if the range runs past the end of `buf`.
pub(crate) fn slice_checked<'a>(
    buf: &'a [u8],
    offset: usize,
    len: usize,
) -> Result<&'a [u8], HbcError> {
    buf.get(offset..offset + len).ok_or_else(|| {
        HbcError::malformed(
            offset,
            format!("range {offset}..{} is out of bounds (buffer is {} bytes)", offset + len, buf.len()),
        )
    })
}
