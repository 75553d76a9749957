//! Endian-aware primitive encoding shared by readers and writers.
//!
//! This module provides the [`crate::file::io::MetadataIO`] trait together with a small set of
//! bounds-checked helpers for reading and writing primitives from and to byte slices. Every
//! multi-byte integer in CLI metadata is little-endian, with the exception of the tagged forms of
//! compressed integers which are big-endian; both directions are therefore supported.
//!
//! # Key Components
//!
//! - [`crate::file::io::MetadataIO`] - Conversion between primitives and their byte representation
//! - [`crate::file::io::read_le_at`] / [`crate::file::io::read_be_at`] - Reads with auto-advance
//! - [`crate::file::io::read_le_at_dyn`] - Reads a 2 or 4 byte reference
//! - [`crate::file::io::write_le_at`] / [`crate::file::io::write_be_at`] - Writes with auto-advance
//!
//! # Examples
//!
//! ```rust
//! use metascope::file::io::{read_le_at, write_le_at};
//!
//! let mut data = [0u8; 6];
//! let mut offset = 0;
//! write_le_at(&mut data, &mut offset, 0x1234u16)?;
//! write_le_at(&mut data, &mut offset, 0xDEAD_BEEFu32)?;
//! assert_eq!(data, [0x34, 0x12, 0xEF, 0xBE, 0xAD, 0xDE]);
//!
//! let mut offset = 0;
//! assert_eq!(read_le_at::<u16>(&data, &mut offset)?, 0x1234);
//! assert_eq!(read_le_at::<u32>(&data, &mut offset)?, 0xDEAD_BEEF);
//! # Ok::<(), metascope::Error>(())
//! ```
//!
//! # Error Handling
//!
//! All functions return [`crate::Error::OutOfBounds`] if the slice does not hold enough bytes
//! at the requested offset. The offset is left untouched on failure.

use crate::{Error::OutOfBounds, Result};

/// Conversion between a primitive value and its fixed-size byte representation.
///
/// Implemented for all integer widths and the two IEEE floating point types. The associated
/// `Bytes` array is what travels over the wire.
pub trait MetadataIO: Sized + Copy {
    /// Fixed-size byte array holding the encoded value.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Decode from little-endian bytes.
    fn from_le_bytes(bytes: Self::Bytes) -> Self;
    /// Decode from big-endian bytes.
    fn from_be_bytes(bytes: Self::Bytes) -> Self;
    /// Encode to little-endian bytes.
    fn to_le_bytes(self) -> Self::Bytes;
    /// Encode to big-endian bytes.
    fn to_be_bytes(self) -> Self::Bytes;
}

macro_rules! impl_metadata_io {
    ($($ty:ty => $len:expr),* $(,)?) => {
        $(
            impl MetadataIO for $ty {
                type Bytes = [u8; $len];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn from_be_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_be_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }

                fn to_be_bytes(self) -> Self::Bytes {
                    <$ty>::to_be_bytes(self)
                }
            }
        )*
    };
}

impl_metadata_io!(
    u8 => 1,
    i8 => 1,
    u16 => 2,
    i16 => 2,
    u32 => 4,
    i32 => 4,
    u64 => 8,
    i64 => 8,
    f32 => 4,
    f64 => 8,
);

fn window(len: usize, offset: usize, type_len: usize) -> Result<std::ops::Range<usize>> {
    let end = offset.checked_add(type_len).ok_or(OutOfBounds)?;
    if end > len {
        return Err(OutOfBounds);
    }
    Ok(offset..end)
}

/// Read a little-endian value at `offset` and advance the offset past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if fewer than `size_of::<T>()` bytes remain.
pub fn read_le_at<T: MetadataIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let range = window(data.len(), *offset, std::mem::size_of::<T>())?;
    let Ok(bytes) = data[range.clone()].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = range.end;
    Ok(T::from_le_bytes(bytes))
}

/// Read a big-endian value at `offset` and advance the offset past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if fewer than `size_of::<T>()` bytes remain.
pub fn read_be_at<T: MetadataIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let range = window(data.len(), *offset, std::mem::size_of::<T>())?;
    let Ok(bytes) = data[range.clone()].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = range.end;
    Ok(T::from_be_bytes(bytes))
}

/// Read a metadata reference that is either 2 (`is_large == false`) or 4 bytes wide.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the slice is too short.
pub fn read_le_at_dyn(data: &[u8], offset: &mut usize, is_large: bool) -> Result<u32> {
    let res = if is_large {
        read_le_at::<u32>(data, offset)?
    } else {
        u32::from(read_le_at::<u16>(data, offset)?)
    };

    Ok(res)
}

/// Write `value` little-endian at `offset` and advance the offset past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the slice is too short.
pub fn write_le_at<T: MetadataIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let range = window(data.len(), *offset, std::mem::size_of::<T>())?;
    data[range.clone()].copy_from_slice(value.to_le_bytes().as_ref());
    *offset = range.end;
    Ok(())
}

/// Write `value` big-endian at `offset` and advance the offset past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the slice is too short.
pub fn write_be_at<T: MetadataIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let range = window(data.len(), *offset, std::mem::size_of::<T>())?;
    data[range.clone()].copy_from_slice(value.to_be_bytes().as_ref());
    *offset = range.end;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    const TEST_BUFFER: [u8; 8] = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];

    #[test]
    fn read_le_u16() {
        let mut offset = 0;
        let result = read_le_at::<u16>(&TEST_BUFFER, &mut offset).unwrap();
        assert_eq!(result, 0x0201);
        assert_eq!(offset, 2);
    }

    #[test]
    fn read_be_u32() {
        let mut offset = 4;
        let result = read_be_at::<u32>(&TEST_BUFFER, &mut offset).unwrap();
        assert_eq!(result, 0x0506_0708);
        assert_eq!(offset, 8);
    }

    #[test]
    fn read_i64_and_f32() {
        let mut offset = 0;
        let result = read_le_at::<i64>(&TEST_BUFFER, &mut offset).unwrap();
        assert_eq!(result, 0x0807_0605_0403_0201);

        let data = 1.5f32.to_le_bytes();
        let mut offset = 0;
        assert_eq!(read_le_at::<f32>(&data, &mut offset).unwrap(), 1.5);
    }

    #[test]
    fn read_dyn() {
        let mut offset = 0;
        assert_eq!(read_le_at_dyn(&TEST_BUFFER, &mut offset, false).unwrap(), 0x0201);
        assert_eq!(offset, 2);
        assert_eq!(
            read_le_at_dyn(&TEST_BUFFER, &mut offset, true).unwrap(),
            0x0605_0403
        );
        assert_eq!(offset, 6);
    }

    #[test]
    fn errors() {
        let mut offset = 7;
        let result = read_le_at::<u16>(&TEST_BUFFER, &mut offset);
        assert!(matches!(result, Err(Error::OutOfBounds)));
        assert_eq!(offset, 7);

        let mut offset = usize::MAX;
        assert!(matches!(
            read_le_at::<u8>(&TEST_BUFFER, &mut offset),
            Err(Error::OutOfBounds)
        ));

        let mut data = [0u8; 3];
        let mut offset = 0;
        assert!(matches!(
            write_le_at(&mut data, &mut offset, 1u32),
            Err(Error::OutOfBounds)
        ));
    }

    #[test]
    fn write_both_orders() {
        let mut data = [0u8; 4];
        let mut offset = 0;
        write_be_at(&mut data, &mut offset, 0x812Cu16).unwrap();
        write_le_at(&mut data, &mut offset, 0x812Cu16).unwrap();
        assert_eq!(data, [0x81, 0x2C, 0x2C, 0x81]);
        assert_eq!(offset, 4);
    }
}
