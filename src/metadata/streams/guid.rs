//! GUID Heap (`#GUID`)
//!
//! A flat array of 16-byte GUIDs. References are 1-based indices; index 0 is the nil reference.
//!
//! # Reference
//! - [ECMA-335 II.24.2.5](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use crate::{blob::MemoryBlock, metadata::handles::GuidHandle, Result};

const GUID_SIZE: usize = 16;

/// Read access to the `#GUID` heap.
///
/// # Examples
///
/// ```rust
/// use metascope::metadata::streams::Guids;
/// let data = [0xAAu8; 32];
/// let guids = Guids::from(&data)?;
/// assert_eq!(guids.len(), 2);
/// assert_eq!(guids.get(2)?, uguid::guid!("AAAAAAAA-AAAA-AAAA-AAAA-AAAAAAAAAAAA"));
/// # Ok::<(), metascope::Error>(())
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Guids<'a> {
    data: MemoryBlock<'a>,
}

impl<'a> Guids<'a> {
    /// Create a `Guids` view over the heap bytes. Trailing bytes that do not form a full GUID are
    /// ignored.
    ///
    /// # Errors
    /// Currently infallible; kept fallible like the other heap constructors
    pub fn from(data: &'a [u8]) -> Result<Guids<'a>> {
        Ok(Guids {
            data: MemoryBlock::new(data),
        })
    }

    /// The GUID at 1-based index `index`; index 0 yields the nil GUID
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the index is past the heap
    pub fn get(&self, index: usize) -> Result<uguid::Guid> {
        if index == 0 {
            return Ok(uguid::Guid::ZERO);
        }
        if index > self.len() {
            return Err(out_of_bounds_error!());
        }

        let mut raw = [0u8; GUID_SIZE];
        raw.copy_from_slice(
            self.data
                .sub_block((index - 1) * GUID_SIZE, GUID_SIZE)?
                .as_slice(),
        );
        Ok(uguid::Guid::from_bytes(raw))
    }

    /// The GUID referenced by `handle`
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for virtual handles, or the errors of
    /// [`Guids::get`]
    pub fn resolve(&self, handle: GuidHandle) -> Result<uguid::Guid> {
        match handle.offset() {
            Some(index) => self.get(index as usize),
            None => Err(invalid_operation!(
                "{:?} is not backed by the #GUID heap",
                handle
            )),
        }
    }

    /// Number of GUIDs in the heap
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len() / GUID_SIZE
    }

    /// True if the heap holds no GUID
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate `(index, guid)` of all entries
    pub fn iter(&self) -> impl Iterator<Item = (usize, uguid::Guid)> + '_ {
        (1..=self.len()).filter_map(|index| self.get(index).ok().map(|guid| (index, guid)))
    }
}
