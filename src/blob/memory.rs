use crate::{
    blob::BlobReader,
    file::io::{read_le_at, MetadataIO},
    Result,
};

/// Read-only view of a byte region owned by someone else.
///
/// Heaps, streams and readers hand out `MemoryBlock`s instead of copies. Creating a sub-block is
/// free and always bounds-checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryBlock<'a> {
    data: &'a [u8],
}

impl<'a> MemoryBlock<'a> {
    /// Wrap `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        MemoryBlock { data }
    }

    /// Length of the block in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the block is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The bytes of the block.
    #[must_use]
    pub fn as_slice(&self) -> &'a [u8] {
        self.data
    }

    /// A reader positioned at the start of the block.
    #[must_use]
    pub fn reader(&self) -> BlobReader<'a> {
        BlobReader::new(self.data)
    }

    /// The `length` bytes at `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the window is not inside the block.
    pub fn sub_block(&self, offset: usize, length: usize) -> Result<MemoryBlock<'a>> {
        let end = offset.checked_add(length).ok_or(out_of_bounds_error!())?;
        if end > self.data.len() {
            return Err(out_of_bounds_error!());
        }
        Ok(MemoryBlock::new(&self.data[offset..end]))
    }

    /// Read a little-endian primitive at `offset` without a cursor.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the value is not inside the block.
    pub fn peek_le<T: MetadataIO>(&self, offset: usize) -> Result<T> {
        let mut position = offset;
        read_le_at(self.data, &mut position)
    }

    /// The UTF-8 string starting at `offset`, up to the next NUL byte or the end of the block.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `offset` is past the block, or
    /// [`crate::Error::Malformed`] if the bytes are not valid UTF-8.
    pub fn peek_utf8_null_terminated(&self, offset: usize) -> Result<&'a str> {
        if offset > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        let bytes = &self.data[offset..];
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        std::str::from_utf8(&bytes[..end])
            .map_err(|e| malformed_error!("Invalid UTF-8 string at offset {} - {}", offset, e))
    }
}

impl<'a> From<&'a [u8]> for MemoryBlock<'a> {
    fn from(data: &'a [u8]) -> Self {
        MemoryBlock::new(data)
    }
}
