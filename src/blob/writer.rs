use crate::{
    blob::{encode_compressed_integer, encode_compressed_signed_integer},
    file::io::{write_be_at, write_le_at, MetadataIO},
    Result,
};

/// Cursor writer over a fixed-size mutable slice.
///
/// Used to fill in regions reserved through [`crate::blob::BlobBuilder::reserve`], such as the
/// Portable PDB id which is only known after the whole image has been serialized. Every write is
/// bounds-checked against the slice.
///
/// # Examples
///
/// ```rust
/// use metascope::blob::BlobWriter;
///
/// let mut data = [0u8; 6];
/// let mut writer = BlobWriter::new(&mut data);
/// writer.write_le(0x0600_0001u32)?;
/// writer.write_compressed_integer(300)?;
/// assert!(writer.is_full());
/// assert_eq!(data, [0x01, 0x00, 0x00, 0x06, 0x81, 0x2C]);
/// # Ok::<(), metascope::Error>(())
/// ```
pub struct BlobWriter<'a> {
    data: &'a mut [u8],
    position: usize,
}

impl<'a> BlobWriter<'a> {
    /// Create a writer positioned at the start of `data`.
    pub fn new(data: &'a mut [u8]) -> Self {
        BlobWriter { data, position: 0 }
    }

    /// Total size of the underlying slice.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the underlying slice is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current write position.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Move the write position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `position` lies past the end of the slice.
    pub fn set_position(&mut self, position: usize) -> Result<()> {
        if position > self.data.len() {
            return Err(out_of_bounds_error!());
        }
        self.position = position;
        Ok(())
    }

    /// Bytes left between the position and the end of the slice.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    /// True once every byte has been written.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.remaining() == 0
    }

    /// Write a primitive in little-endian byte order.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the value does not fit.
    pub fn write_le<T: MetadataIO>(&mut self, value: T) -> Result<()> {
        write_le_at(self.data, &mut self.position, value)
    }

    /// Write a primitive in big-endian byte order.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the value does not fit.
    pub fn write_be<T: MetadataIO>(&mut self, value: T) -> Result<()> {
        write_be_at(self.data, &mut self.position, value)
    }

    /// Write raw bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the bytes do not fit.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.remaining() {
            return Err(out_of_bounds_error!());
        }
        self.data[self.position..self.position + bytes.len()].copy_from_slice(bytes);
        self.position += bytes.len();
        Ok(())
    }

    /// Write `count` copies of `value`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the bytes do not fit.
    pub fn write_fill(&mut self, value: u8, count: usize) -> Result<()> {
        if count > self.remaining() {
            return Err(out_of_bounds_error!());
        }
        self.data[self.position..self.position + count].fill(value);
        self.position += count;
        Ok(())
    }

    /// Write a 2 or 4 byte table or heap reference.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the reference does not fit.
    #[allow(clippy::cast_possible_truncation)]
    pub fn write_reference(&mut self, reference: u32, is_small: bool) -> Result<()> {
        if is_small {
            debug_assert!(reference <= u32::from(u16::MAX));
            self.write_le(reference as u16)
        } else {
            self.write_le(reference)
        }
    }

    /// Write an ECMA-335 compressed unsigned integer.
    ///
    /// # Errors
    /// Returns [`crate::Error::ArgumentOutOfRange`] if `value` exceeds `0x1FFF_FFFF`, or
    /// [`crate::Error::OutOfBounds`] if the encoding does not fit.
    pub fn write_compressed_integer(&mut self, value: u32) -> Result<()> {
        let (bytes, len) = encode_compressed_integer(value)?;
        self.write_bytes(&bytes[..len])
    }

    /// Write an ECMA-335 compressed signed integer.
    ///
    /// # Errors
    /// Returns [`crate::Error::ArgumentOutOfRange`] if `value` is outside `-2^28..2^28`, or
    /// [`crate::Error::OutOfBounds`] if the encoding does not fit.
    pub fn write_compressed_signed_integer(&mut self, value: i32) -> Result<()> {
        let (bytes, len) = encode_compressed_signed_integer(value)?;
        self.write_bytes(&bytes[..len])
    }

    /// Write the 16 on-disk bytes of `guid`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the GUID does not fit.
    pub fn write_guid(&mut self, guid: &uguid::Guid) -> Result<()> {
        self.write_bytes(&guid.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn sequential_writes() {
        let mut data = [0u8; 8];
        let mut writer = BlobWriter::new(&mut data);
        writer.write_le(0x0102u16).unwrap();
        writer.write_be(0x0304u16).unwrap();
        writer.write_reference(0x0506, true).unwrap();
        writer.write_fill(0xEE, 2).unwrap();
        assert!(writer.is_full());
        assert_eq!(data, [0x02, 0x01, 0x03, 0x04, 0x06, 0x05, 0xEE, 0xEE]);
    }

    #[test]
    fn overflow_is_rejected() {
        let mut data = [0u8; 3];
        let mut writer = BlobWriter::new(&mut data);
        assert!(matches!(writer.write_le(1u32), Err(Error::OutOfBounds)));
        assert_eq!(writer.position(), 0);

        writer.write_compressed_integer(0x3FFF).unwrap();
        assert!(matches!(
            writer.write_compressed_integer(0x4000),
            Err(Error::OutOfBounds)
        ));
        assert!(matches!(writer.set_position(4), Err(Error::OutOfBounds)));
        writer.set_position(3).unwrap();
        assert_eq!(writer.remaining(), 0);
    }

    #[test]
    fn guid_layout() {
        let guid = uguid::guid!("01234567-89ab-cdef-0123-456789abcdef");
        let mut data = [0u8; 16];
        BlobWriter::new(&mut data).write_guid(&guid).unwrap();
        assert_eq!(
            data,
            [
                0x67, 0x45, 0x23, 0x01, 0xAB, 0x89, 0xEF, 0xCD, 0x01, 0x23, 0x45, 0x67, 0x89,
                0xAB, 0xCD, 0xEF
            ]
        );
    }
}
