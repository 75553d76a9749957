//! Byte buffers: the chunked write side and the bounds-checked read side.
//!
//! Everything that produces or consumes metadata bytes goes through this module:
//!
//! - [`crate::blob::BlobBuilder`] - Append-optimized chain of chunks with reservations and
//!   zero-copy linking of whole builders
//! - [`crate::blob::BlobWriter`] - Fixed-size cursor writer over a mutable slice, used for
//!   patching reserved regions after the fact
//! - [`crate::blob::BlobReader`] - Sequential reader over an immutable byte region
//! - [`crate::blob::MemoryBlock`] - Read-only view handed out by readers and heaps
//! - [`crate::blob::ChunkAllocator`] - Pluggable chunk allocation, with a pooling implementation
//!
//! # Compressed integers
//!
//! ECMA-335 II.23.2 packs unsigned integers into 1, 2 or 4 big-endian bytes, tagged by the top
//! bits of the first byte:
//!
//! | Range                     | Encoding                              |
//! |---------------------------|---------------------------------------|
//! | `0x00..=0x7F`             | `0xxxxxxx`                            |
//! | `0x80..=0x3FFF`           | `10xxxxxx xxxxxxxx`                   |
//! | `0x4000..=0x1FFF_FFFF`    | `110xxxxx xxxxxxxx xxxxxxxx xxxxxxxx` |
//!
//! Larger values are not representable and are rejected with
//! [`crate::Error::ArgumentOutOfRange`].

mod allocator;
mod builder;
mod memory;
mod reader;
mod writer;

pub use allocator::{ChunkAllocator, HeapAllocator, PooledAllocator};
pub use builder::{BlobBuilder, Blobs, DEFAULT_CHUNK_SIZE, MIN_CHUNK_SIZE};
pub use memory::MemoryBlock;
pub use reader::BlobReader;
pub use writer::BlobWriter;

use crate::Result;

/// Largest value representable as a compressed unsigned integer.
pub const MAX_COMPRESSED_INTEGER: u32 = 0x1FFF_FFFF;

/// A reserved region inside a [`BlobBuilder`].
///
/// Returned by [`BlobBuilder::reserve`]. The reservation addresses a chunk of the builder that
/// created it and remains valid for as long as that builder is not cleared or linked into
/// another builder. Use [`BlobBuilder::reserved_writer`] to fill it in.
///
/// A zero-length reservation is the default blob and is not backed by any chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Blob {
    pub(crate) chunk: Option<usize>,
    pub(crate) start: usize,
    pub(crate) length: usize,
}

impl Blob {
    /// True if this blob is not attached to any buffer.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.chunk.is_none()
    }

    /// Number of reserved bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.length
    }

    /// True if the reservation covers no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

/// Number of bytes [`encode_compressed_integer`] produces for `value`.
///
/// # Errors
/// Returns [`crate::Error::ArgumentOutOfRange`] for values above [`MAX_COMPRESSED_INTEGER`].
pub fn compressed_integer_size(value: u32) -> Result<usize> {
    match value {
        0..=0x7F => Ok(1),
        0x80..=0x3FFF => Ok(2),
        0x4000..=MAX_COMPRESSED_INTEGER => Ok(4),
        _ => Err(argument_error!(
            "value {:#x} exceeds the compressed integer range",
            value
        )),
    }
}

/// Encode `value` as an ECMA-335 compressed unsigned integer.
///
/// Returns the scratch array and the number of leading bytes that make up the encoding.
///
/// # Errors
/// Returns [`crate::Error::ArgumentOutOfRange`] for values above [`MAX_COMPRESSED_INTEGER`].
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn encode_compressed_integer(value: u32) -> Result<([u8; 4], usize)> {
    let size = compressed_integer_size(value)?;
    let bytes = match size {
        1 => [value as u8, 0, 0, 0],
        2 => {
            let [hi, lo] = (0x8000 | value as u16).to_be_bytes();
            [hi, lo, 0, 0]
        }
        _ => (0xC000_0000 | value).to_be_bytes(),
    };
    Ok((bytes, size))
}

/// Encode `value` as an ECMA-335 compressed signed integer.
///
/// The value is rotated so the sign ends up in the lowest bit of the 7, 14 or 29 bit payload.
///
/// # Errors
/// Returns [`crate::Error::ArgumentOutOfRange`] for values outside `-2^28..2^28`.
#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
pub(crate) fn encode_compressed_signed_integer(value: i32) -> Result<([u8; 4], usize)> {
    const B6: i32 = (1 << 6) - 1;
    const B13: i32 = (1 << 13) - 1;
    const B28: i32 = (1 << 28) - 1;

    let sign = value >> 31;
    if (value & !B6) == (sign & !B6) {
        let n = ((value & B6) << 1) | (sign & 1);
        Ok(([n as u8, 0, 0, 0], 1))
    } else if (value & !B13) == (sign & !B13) {
        let n = ((value & B13) << 1) | (sign & 1);
        let [hi, lo] = (0x8000 | n as u16).to_be_bytes();
        Ok(([hi, lo, 0, 0], 2))
    } else if (value & !B28) == (sign & !B28) {
        let n = ((value & B28) << 1) | (sign & 1);
        Ok(((0xC000_0000 | n as u32).to_be_bytes(), 4))
    } else {
        Err(argument_error!(
            "value {} exceeds the compressed signed integer range",
            value
        ))
    }
}

/// Terminal byte of a `#US` heap entry.
///
/// ECMA-335 II.24.2.4: 1 if any UTF-16 unit has its top byte set or is one of the control and
/// punctuation characters that need special handling, 0 otherwise.
pub(crate) fn user_string_terminal(units: &[u16]) -> u8 {
    let special = units.iter().any(|&unit| {
        unit >= 0x7F
            || matches!(unit, 0x01..=0x08 | 0x0E..=0x1F | 0x27 | 0x2D)
    });
    u8::from(special)
}
