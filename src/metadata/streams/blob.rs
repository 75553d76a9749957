//! Blob Heap (`#Blob`)
//!
//! Signatures, custom attribute values, constants and other binary data referenced from tables.
//! Every entry starts with its length as a compressed integer:
//!
//! * `0bbbbbbb` - up to 127 bytes follow
//! * `10bbbbbb x` - up to 2^14 - 1 bytes follow
//! * `110bbbbb x y z` - up to 2^29 - 1 bytes follow
//!
//! # Reference
//! - [ECMA-335 II.24.2.4](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use crate::{
    blob::{BlobReader, MemoryBlock},
    metadata::handles::BlobHandle,
    Result,
};

/// Read access to the `#Blob` heap.
///
/// # Examples
///
/// ```rust
/// use metascope::metadata::streams::Blobs;
/// let data = &[0u8, 0x03, 0x41, 0x42, 0x43];
/// let blobs = Blobs::from(data)?;
/// assert_eq!(blobs.get(1)?, &[0x41, 0x42, 0x43]);
/// # Ok::<(), metascope::Error>(())
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Blobs<'a> {
    data: MemoryBlock<'a>,
}

impl<'a> Blobs<'a> {
    /// Create a `Blobs` view over the heap bytes
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap is non-empty and does not start with the
    /// empty blob
    pub fn from(data: &'a [u8]) -> Result<Blobs<'a>> {
        if data.first().is_some_and(|first| *first != 0) {
            return Err(malformed_error!("#Blob heap does not start with the empty blob"));
        }

        Ok(Blobs {
            data: MemoryBlock::new(data),
        })
    }

    /// The content of the blob at heap offset `offset`, without its length prefix
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the blob runs past the heap, or
    /// [`crate::Error::Malformed`] if the length prefix is invalid
    pub fn get(&self, offset: usize) -> Result<&'a [u8]> {
        if offset == 0 {
            return Ok(&[]);
        }
        if offset >= self.data.len() {
            return Err(out_of_bounds_error!());
        }

        let mut reader = self.data.reader();
        reader.set_offset(offset)?;
        let length = reader.read_compressed_integer()? as usize;
        reader.read_bytes(length)
    }

    /// The content of the blob referenced by `handle`
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for virtual handles, or the errors of
    /// [`Blobs::get`]
    pub fn resolve(&self, handle: BlobHandle) -> Result<&'a [u8]> {
        match handle.offset() {
            Some(offset) => self.get(offset as usize),
            None => Err(invalid_operation!(
                "{:?} is not backed by the #Blob heap",
                handle
            )),
        }
    }

    /// A reader over the blob referenced by `handle`
    ///
    /// # Errors
    /// Same as [`Blobs::resolve`]
    pub fn reader(&self, handle: BlobHandle) -> Result<BlobReader<'a>> {
        Ok(BlobReader::new(self.resolve(handle)?))
    }

    /// Size of the heap in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True for an empty heap
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Iterate `(offset, content)` of all entries after the empty blob. Iteration stops at the
    /// first invalid entry, or at trailing zero padding.
    pub fn iter(&self) -> impl Iterator<Item = Result<(usize, &'a [u8])>> + '_ {
        let mut reader = self.data.reader();
        let mut failed = reader.advance_by(1).is_err();

        std::iter::from_fn(move || {
            if failed || !reader.has_more_data() {
                return None;
            }

            let start = reader.offset();
            let entry = reader
                .read_compressed_integer()
                .and_then(|length| reader.read_bytes(length as usize));

            match entry {
                // Zero padding reads as a run of empty blobs
                Ok([]) if reader.data()[start..].iter().all(|b| *b == 0) => None,
                Ok(content) => Some(Ok((start, content))),
                Err(error) => {
                    failed = true;
                    Some(Err(error))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let data = [
            0x00,
            0x03, 0x41, 0x42, 0x43,
            0x00,
            0x80, 0x02, 0xAA, 0xBB,
            0x00, 0x00,
        ];

        let blobs = Blobs::from(&data).unwrap();
        assert_eq!(blobs.get(0).unwrap(), &[] as &[u8]);
        assert_eq!(blobs.get(1).unwrap(), &[0x41, 0x42, 0x43]);
        assert_eq!(blobs.get(5).unwrap(), &[] as &[u8]);
        assert_eq!(blobs.get(6).unwrap(), &[0xAA, 0xBB]);
        assert_eq!(
            blobs.resolve(BlobHandle::from_offset(1)).unwrap(),
            &[0x41, 0x42, 0x43]
        );

        let entries: Vec<usize> = blobs.iter().map(|entry| entry.unwrap().0).collect();
        assert_eq!(entries, [1, 5, 6]);

        let mut reader = blobs.reader(BlobHandle::from_offset(6)).unwrap();
        assert_eq!(reader.read_le::<u16>().unwrap(), 0xBBAA);
    }

    #[test]
    fn invalid() {
        assert!(Blobs::from(&[0x01]).is_err());

        let truncated = Blobs::from(&[0x00, 0x05, 0x41]).unwrap();
        assert!(matches!(truncated.get(1), Err(Error::OutOfBounds)));
        assert!(matches!(truncated.get(3), Err(Error::OutOfBounds)));
        assert!(truncated.iter().next().unwrap().is_err());

        let bad_prefix = Blobs::from(&[0x00, 0xE0, 0x00, 0x00, 0x00]).unwrap();
        assert!(matches!(bad_prefix.get(1), Err(Error::Malformed { .. })));
        assert!(matches!(
            bad_prefix.resolve(BlobHandle::from_virtual_index(1)),
            Err(Error::InvalidOperation(_))
        ));
    }

    #[test]
    fn empty_heap() {
        let blobs = Blobs::from(&[] as &[u8]).unwrap();
        assert!(blobs.is_empty());
        assert_eq!(blobs.iter().count(), 0);

        let single = Blobs::from(&[0x00]).unwrap();
        assert_eq!(single.iter().count(), 0);
    }
}
