//! Error kinds surfaced by the container model, parser and exporter.

use thiserror::Error;

/// All errors this crate can return.
///
/// Every variant is a caller error or a format error; none are retryable,
/// and no operation that returns one of these leaves the `Container` it was
/// called on partially mutated.
#[derive(Debug, Error)]
pub enum HbcError {
    /// A function/string/array/key/value id was out of bounds.
    #[error("invalid id {id} (valid range is 0..{bound})")]
    InvalidId {
        /// The id that was rejected.
        id: usize,
        /// The exclusive upper bound the id was checked against.
        bound: usize,
    },

    /// A non-UTF16 string slot failed UTF-8 decoding.
    #[error("string slot at offset {offset} ({len} bytes) is not valid UTF-8")]
    EncodingError {
        /// Byte offset of the slot in `stringStorage`.
        offset: u32,
        /// Length of the slot in bytes.
        len: u32,
    },

    /// A string set operation would require growing storage beyond its slot.
    #[error("value of {requested} bytes does not fit in a slot of {available} bytes")]
    OverflowUnsupported {
        /// The size the caller asked to write.
        requested: usize,
        /// The size available in the existing slot.
        available: usize,
    },

    /// The parser detected a structural violation (bad tag, length, offset).
    #[error("malformed HBC file at byte offset {offset}: {reason}")]
    MalformedFile {
        /// Byte offset in the input at which the violation was detected.
        offset: usize,
        /// Human-readable description of what was wrong.
        reason: String,
    },

    /// The file declares a version other than 86 or 96.
    #[error("unsupported HBC version {version} (only 86 and 96 are supported)")]
    UnsupportedVersion {
        /// The version field read from the file header.
        version: u32,
    },
}

impl HbcError {
    pub(crate) fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        Self::MalformedFile {
            offset,
            reason: reason.into(),
        }
    }
}
