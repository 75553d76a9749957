//! Bounds-checked sequential reader over an immutable byte region.
//!
//! [`BlobReader`] is the decode-side counterpart of [`crate::blob::BlobBuilder`]. It walks a
//! borrowed slice with a cursor; every read checks the remaining length, advances the cursor on
//! success and leaves it untouched on failure. The underlying bytes are never copied unless a
//! method explicitly returns an owned value.
//!
//! # Examples
//!
//! ```rust
//! use metascope::blob::BlobReader;
//!
//! let data = [0x68, 0x69, 0x00, 0x81, 0x2C, 0xFF];
//! let mut reader = BlobReader::new(&data);
//!
//! assert_eq!(reader.read_utf8_null_terminated()?, "hi");
//! assert_eq!(reader.read_compressed_integer()?, 300);
//! assert_eq!(reader.read_le::<u8>()?, 0xFF);
//! assert_eq!(reader.remaining(), 0);
//! # Ok::<(), metascope::Error>(())
//! ```

use widestring::U16Str;

use crate::{
    blob::MemoryBlock,
    file::io::{read_be_at, read_le_at, read_le_at_dyn, MetadataIO},
    Result,
};

/// A cursor over a borrowed byte slice.
///
/// Independent readers over the same slice may be used concurrently; each keeps its own cursor.
#[derive(Debug, Clone)]
pub struct BlobReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BlobReader<'a> {
    /// Create a reader positioned at the start of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        BlobReader { data, position: 0 }
    }

    /// Length of the underlying region.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the underlying region is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The underlying region.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Current cursor offset.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.position
    }

    /// Move the cursor to `offset`. Positioning exactly at the end is allowed.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `offset` exceeds the region length.
    pub fn set_offset(&mut self, offset: usize) -> Result<()> {
        if offset > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        self.position = offset;
        Ok(())
    }

    /// Move the cursor back to the start.
    pub fn reset(&mut self) {
        self.position = 0;
    }

    /// Bytes between the cursor and the end of the region.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    /// True while at least one byte remains.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Skip `step` bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `step` bytes remain.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        let end = self.end_of(step)?;
        self.position = end;
        Ok(())
    }

    /// Advance the cursor to the next multiple of `alignment`, a power of two.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the padding runs past the end of the region.
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        if self.try_align(alignment) {
            Ok(())
        } else {
            Err(out_of_bounds_error!())
        }
    }

    /// Like [`BlobReader::align`], but reports failure as `false` and leaves the cursor alone.
    pub fn try_align(&mut self, alignment: usize) -> bool {
        debug_assert!(alignment.is_power_of_two());

        let aligned = crate::utils::align_to(self.position, alignment);
        if aligned > self.data.len() {
            return false;
        }
        self.position = aligned;
        true
    }

    /// Run `f` and restore the cursor if it fails.
    ///
    /// # Errors
    /// Returns whatever `f` returns.
    pub fn transactional<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let saved_position = self.position;
        let result = f(self);
        if result.is_err() {
            self.position = saved_position;
        }
        result
    }

    /// Read a little-endian primitive.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if not enough bytes remain.
    pub fn read_le<T: MetadataIO>(&mut self) -> Result<T> {
        read_le_at::<T>(self.data, &mut self.position)
    }

    /// Read a big-endian primitive.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if not enough bytes remain.
    pub fn read_be<T: MetadataIO>(&mut self) -> Result<T> {
        read_be_at::<T>(self.data, &mut self.position)
    }

    /// Read a 2 (`is_small`) or 4 byte table or heap reference.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if not enough bytes remain.
    pub fn read_reference(&mut self, is_small: bool) -> Result<u32> {
        read_le_at_dyn(self.data, &mut self.position, !is_small)
    }

    /// Look at the next byte without consuming it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] at the end of the region.
    pub fn peek_byte(&self) -> Result<u8> {
        self.data
            .get(self.position)
            .copied()
            .ok_or(out_of_bounds_error!())
    }

    /// Read `length` bytes as a borrowed slice.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `length` bytes remain.
    pub fn read_bytes(&mut self, length: usize) -> Result<&'a [u8]> {
        let end = self.end_of(length)?;
        let bytes = &self.data[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    /// Read an ECMA-335 compressed unsigned integer.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the encoding is truncated, or
    /// [`crate::Error::Malformed`] if the first byte carries the invalid `111` tag.
    pub fn read_compressed_integer(&mut self) -> Result<u32> {
        self.transactional(|reader| {
            let first_byte = reader.read_le::<u8>()?;

            // 1-byte encoding: 0xxxxxxx
            if (first_byte & 0x80) == 0 {
                return Ok(u32::from(first_byte));
            }

            // 2-byte encoding: 10xxxxxx xxxxxxxx
            if (first_byte & 0xC0) == 0x80 {
                let second_byte = reader.read_le::<u8>()?;
                return Ok(((u32::from(first_byte) & 0x3F) << 8) | u32::from(second_byte));
            }

            // 4-byte encoding: 110xxxxx xxxxxxxx xxxxxxxx xxxxxxxx
            if (first_byte & 0xE0) == 0xC0 {
                let rest = reader.read_bytes(3)?;
                return Ok(((u32::from(first_byte) & 0x1F) << 24)
                    | (u32::from(rest[0]) << 16)
                    | (u32::from(rest[1]) << 8)
                    | u32::from(rest[2]));
            }

            Err(malformed_error!("Invalid compressed integer - {:#x}", first_byte))
        })
    }

    /// Read a compressed unsigned integer, returning `None` and keeping the cursor in place if
    /// the bytes do not hold a valid encoding.
    pub fn try_read_compressed_integer(&mut self) -> Option<u32> {
        self.read_compressed_integer().ok()
    }

    /// Read an ECMA-335 compressed signed integer.
    ///
    /// # Errors
    /// Same as [`BlobReader::read_compressed_integer`].
    #[allow(clippy::cast_possible_wrap)]
    pub fn read_compressed_signed_integer(&mut self) -> Result<i32> {
        let start = self.position;
        let unsigned = self.read_compressed_integer()?;

        let negative = unsigned & 1 != 0;
        let value = (unsigned >> 1) as i32;
        if !negative {
            return Ok(value);
        }

        Ok(match self.position - start {
            1 => value | 0xFFFF_FFC0_u32 as i32,
            2 => value | 0xFFFF_E000_u32 as i32,
            _ => value | 0xF000_0000_u32 as i32,
        })
    }

    /// Read UTF-8 bytes up to the next NUL and step over the terminator.
    ///
    /// A string running to the end of the region without terminator is accepted.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the bytes are not valid UTF-8.
    pub fn read_utf8_null_terminated(&mut self) -> Result<&'a str> {
        let start = self.position;
        let rest = &self.data[start..];
        let length = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());

        let text = std::str::from_utf8(&rest[..length]).map_err(|e| {
            malformed_error!(
                "Invalid UTF-8 string at offset {}-{}: {}",
                start,
                start + length,
                e
            )
        })?;

        self.position = (start + length + 1).min(self.data.len());
        Ok(text)
    }

    /// Read exactly `length` bytes as UTF-8.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer bytes remain, or
    /// [`crate::Error::Malformed`] if they are not valid UTF-8.
    pub fn read_utf8(&mut self, length: usize) -> Result<&'a str> {
        self.transactional(|reader| {
            let start = reader.position;
            let bytes = reader.read_bytes(length)?;
            std::str::from_utf8(bytes).map_err(|e| {
                malformed_error!(
                    "Invalid UTF-8 string at offset {}-{}: {}",
                    start,
                    start + length,
                    e
                )
            })
        })
    }

    /// Read `byte_length` bytes of UTF-16LE.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `byte_length` is odd or the units are not valid
    /// UTF-16, or [`crate::Error::OutOfBounds`] if fewer bytes remain.
    pub fn read_utf16(&mut self, byte_length: usize) -> Result<String> {
        if byte_length % 2 != 0 {
            return Err(malformed_error!("Invalid UTF-16 length - {}", byte_length));
        }

        self.transactional(|reader| {
            let start = reader.position;
            let units = reader
                .read_bytes(byte_length)?
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect::<Vec<u16>>();

            U16Str::from_slice(&units)
                .to_string()
                .map_err(|_| malformed_error!("Invalid UTF-16 string at offset {}", start))
        })
    }

    /// Read a `SerString`: `0xFF` for null, otherwise compressed length and UTF-8 bytes.
    ///
    /// # Errors
    /// Same as [`BlobReader::read_compressed_integer`] and [`BlobReader::read_utf8`].
    pub fn read_serialized_string(&mut self) -> Result<Option<&'a str>> {
        if self.peek_byte()? == 0xFF {
            self.position += 1;
            return Ok(None);
        }

        self.transactional(|reader| {
            let length = reader.read_compressed_integer()? as usize;
            reader.read_utf8(length).map(Some)
        })
    }

    /// Read the 16 on-disk bytes of a GUID.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than 16 bytes remain.
    pub fn read_guid(&mut self) -> Result<uguid::Guid> {
        let bytes = self.read_bytes(16)?;
        let mut raw = [0u8; 16];
        raw.copy_from_slice(bytes);
        Ok(uguid::Guid::from_bytes(raw))
    }

    /// A view of `length` bytes starting `offset` bytes after the cursor. The cursor does not
    /// move.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the window is not within the remaining bytes.
    pub fn get_memory_block_at(&self, offset: usize, length: usize) -> Result<MemoryBlock<'a>> {
        let start = self
            .position
            .checked_add(offset)
            .ok_or(out_of_bounds_error!())?;
        MemoryBlock::new(self.data).sub_block(start, length)
    }

    fn end_of(&self, length: usize) -> Result<usize> {
        let end = self
            .position
            .checked_add(length)
            .ok_or(out_of_bounds_error!())?;

        if end > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        Ok(end)
    }
}
