//! Stream headers of the metadata root.
//!
//! # Reference
//! - [ECMA-335 II.24.2.2](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use crate::{
    blob::{BlobBuilder, BlobReader},
    utils::align_to_4_bytes,
    Result,
};

/// Longest stream name the format allows, without terminator.
pub const MAX_STREAM_NAME_LENGTH: usize = 31;

/// A stream header provides the name, and the position and length of a particular table or heap.
/// The length of a stream header is not fixed, but depends on the length of its name field (a
/// NUL-terminated string padded to 4 bytes).
///
/// # Examples
///
/// ```rust
/// use metascope::{blob::BlobReader, metadata::streams::StreamHeader};
///
/// let data = [0x6C, 0x00, 0x00, 0x00, 0xA4, 0x45, 0x00, 0x00, b'#', b'~', 0x00, 0x00];
/// let header = StreamHeader::read(&mut BlobReader::new(&data))?;
/// assert_eq!(header.name, "#~");
/// assert_eq!(header.size, 0x45A4);
/// # Ok::<(), metascope::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    /// Offset of the stream, relative to the metadata root
    pub offset: u32,
    /// Size of this stream in bytes, shall be a multiple of 4
    pub size: u32,
    /// Name of the stream
    pub name: String,
}

impl StreamHeader {
    /// Read a stream header and step over its padded name.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the header is truncated, or
    /// [`crate::Error::Malformed`] if the name is unterminated, too long or not ASCII.
    pub fn read(reader: &mut BlobReader<'_>) -> Result<StreamHeader> {
        reader.transactional(|reader| {
            let offset = reader.read_le::<u32>()?;
            let size = reader.read_le::<u32>()?;

            let name_start = reader.offset();
            let window = reader.remaining().min(MAX_STREAM_NAME_LENGTH + 1);
            let candidate = reader.get_memory_block_at(0, window)?;
            let Some(length) = candidate.as_slice().iter().position(|&b| b == 0) else {
                return Err(malformed_error!(
                    "Unterminated stream name at offset {}",
                    name_start
                ));
            };

            let name = &candidate.as_slice()[..length];
            if name.is_empty() || !name.is_ascii() {
                return Err(malformed_error!(
                    "Invalid stream name at offset {}",
                    name_start
                ));
            }

            // The padding of the last header may be cut off by the end of the directory
            let padded = align_to_4_bytes(length + 1).min(reader.remaining());
            reader.advance_by(padded)?;

            Ok(StreamHeader {
                offset,
                size,
                name: String::from_utf8_lossy(name).into_owned(),
            })
        })
    }

    /// Write this header, padding the name with zeros to 4 bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::ArgumentOutOfRange`] if the name is longer than
    /// [`MAX_STREAM_NAME_LENGTH`].
    pub fn write_to(&self, builder: &mut BlobBuilder) -> Result<()> {
        if self.name.len() > MAX_STREAM_NAME_LENGTH {
            return Err(argument_error!("Stream name too long - {}", self.name));
        }

        builder.write_le(self.offset)?;
        builder.write_le(self.size)?;
        builder.write_utf8(&self.name)?;
        builder.write_fill(0, align_to_4_bytes(self.name.len() + 1) - self.name.len())
    }

    /// Size of this header when serialized.
    #[must_use]
    pub fn serialized_size(&self) -> usize {
        8 + align_to_4_bytes(self.name.len() + 1)
    }
}
