//! User String Heap (`#US`)
//!
//! String literals referenced by `ldstr` tokens. Each entry is a compressed length, that many
//! bytes of UTF-16LE and one trailing terminal byte; the length includes the terminal byte.
//!
//! # Reference
//! - [ECMA-335 II.24.2.4](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use crate::{blob::MemoryBlock, metadata::handles::UserStringHandle, Result};

/// Read access to the `#US` heap.
///
/// # Examples
///
/// ```rust
/// use metascope::metadata::streams::UserStrings;
/// let data = &[0u8, 0x03, 0x41, 0x00, 0x00];
/// let us = UserStrings::from(data)?;
/// assert_eq!(us.get(1)?, "A");
/// # Ok::<(), metascope::Error>(())
/// ```
#[derive(Debug, Clone, Copy)]
pub struct UserStrings<'a> {
    data: MemoryBlock<'a>,
}

impl<'a> UserStrings<'a> {
    /// Create a `UserStrings` view over the heap bytes
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap is non-empty and does not start with the
    /// empty entry
    pub fn from(data: &'a [u8]) -> Result<UserStrings<'a>> {
        if data.first().is_some_and(|first| *first != 0) {
            return Err(malformed_error!("#US heap does not start with the empty entry"));
        }

        Ok(UserStrings {
            data: MemoryBlock::new(data),
        })
    }

    /// The string at heap offset `offset`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the entry runs past the heap, or
    /// [`crate::Error::Malformed`] if the length prefix or the UTF-16 content is invalid
    pub fn get(&self, offset: usize) -> Result<String> {
        if offset == 0 {
            return Ok(String::new());
        }
        if offset >= self.data.len() {
            return Err(out_of_bounds_error!());
        }

        let mut reader = self.data.reader();
        reader.set_offset(offset)?;
        let length = reader.read_compressed_integer()? as usize;
        if length == 0 {
            return Ok(String::new());
        }

        // The terminal byte is not part of the string
        reader.read_utf16(length & !1)
    }

    /// The string referenced by `handle`
    ///
    /// # Errors
    /// Same as [`UserStrings::get`]
    pub fn resolve(&self, handle: UserStringHandle) -> Result<String> {
        match handle.offset() {
            Some(offset) => self.get(offset as usize),
            None => Err(invalid_operation!(
                "{:?} is not backed by the #US heap",
                handle
            )),
        }
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
}
