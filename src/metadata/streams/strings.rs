//! String Heap (`#Strings`)
//!
//! Identifiers referenced from metadata tables, stored as NUL-terminated UTF-8. Offset 0 always
//! holds the empty string. Entries may overlap: a string can be referenced from the middle of a
//! longer one that ends with it.
//!
//! # Reference
//! - [ECMA-335 II.24.2.3](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use crate::{
    blob::MemoryBlock,
    metadata::handles::{StringHandle, StringKind},
    Result,
};

/// `#Strings` holds the identifiers which are referenced from the tables of the metadata, e.g. type,
/// member and parameter names.
///
/// # Examples
///
/// ```rust
/// use metascope::metadata::streams::Strings;
/// let data = &[0u8, b'H', b'e', b'l', b'l', b'o', 0u8];
/// let strings = Strings::from(data)?;
/// assert_eq!(strings.get(1)?, "Hello");
/// assert_eq!(strings.get(3)?, "llo");
/// # Ok::<(), metascope::Error>(())
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Strings<'a> {
    data: MemoryBlock<'a>,
}

impl<'a> Strings<'a> {
    /// Create a `Strings` view over the heap bytes
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap is non-empty and does not start with NUL
    pub fn from(data: &'a [u8]) -> Result<Strings<'a>> {
        if data.first().is_some_and(|first| *first != 0) {
            return Err(malformed_error!("#Strings heap does not start with NUL"));
        }

        Ok(Strings {
            data: MemoryBlock::new(data),
        })
    }

    /// The string at heap offset `offset`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for offsets past the heap, or
    /// [`crate::Error::Malformed`] if the bytes are not valid UTF-8
    pub fn get(&self, offset: usize) -> Result<&'a str> {
        if offset == 0 && self.data.is_empty() {
            return Ok("");
        }
        if offset >= self.data.len() {
            return Err(out_of_bounds_error!());
        }

        self.data.peek_utf8_null_terminated(offset)
    }

    /// Resolve a string handle, honoring dot-terminated references
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for virtual handles, which are not backed by
    /// this heap, or the errors of [`Strings::get`]
    pub fn resolve(&self, handle: StringHandle) -> Result<&'a str> {
        let Some(offset) = handle.offset() else {
            return Err(invalid_operation!(
                "{:?} is not backed by the #Strings heap",
                handle
            ));
        };

        let text = self.get(offset as usize)?;
        match handle.kind() {
            StringKind::DotTerminated => Ok(text.rfind('.').map_or(text, |dot| &text[..dot])),
            _ => Ok(text),
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

    /// Iterate `(offset, string)` of every non-empty entry
    pub fn iter(&self) -> impl Iterator<Item = Result<(usize, &'a str)>> + '_ {
        let mut offset = 1;
        std::iter::from_fn(move || {
            while offset < self.data.len() {
                let start = offset;
                match self.data.peek_utf8_null_terminated(start) {
                    Ok("") => offset += 1,
                    Ok(text) => {
                        offset += text.len() + 1;
                        return Some(Ok((start, text)));
                    }
                    Err(error) => {
                        offset = self.data.len();
                        return Some(Err(error));
                    }
                }
            }
            None
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
            0x3c, 0x4d, 0x61, 0x69, 0x6e, 0x3e, 0x24, 0x00,
            0x3c, 0x4d, 0x6f, 0x64, 0x75, 0x6c, 0x65, 0x3e, 0x00,
            0x53, 0x79, 0x73, 0x74, 0x65, 0x6d, 0x2e, 0x43, 0x6f, 0x6e, 0x73, 0x6f, 0x6c, 0x65, 0x00,
        ];

        let strings = Strings::from(&data).unwrap();
        assert_eq!(strings.get(0).unwrap(), "");
        assert_eq!(strings.get(1).unwrap(), "<Main>$");
        assert_eq!(strings.get(9).unwrap(), "<Module>");
        assert_eq!(strings.get(18).unwrap(), "System.Console");
        assert_eq!(strings.get(25).unwrap(), "Console");
        assert!(matches!(strings.get(data.len()), Err(Error::OutOfBounds)));

        let all: Vec<&str> = strings.iter().map(|entry| entry.unwrap().1).collect();
        assert_eq!(all, ["<Main>$", "<Module>", "System.Console"]);
    }

    #[test]
    fn resolve() {
        let data = b"\0System.Collections.Generic\0";
        let strings = Strings::from(data).unwrap();

        assert_eq!(
            strings.resolve(StringHandle::from_offset(1)).unwrap(),
            "System.Collections.Generic"
        );
        assert_eq!(
            strings.resolve(StringHandle::dot_terminated(1)).unwrap(),
            "System.Collections"
        );
        assert_eq!(strings.resolve(StringHandle::default()).unwrap(), "");
        assert!(matches!(
            strings.resolve(StringHandle::from_virtual_index(1)),
            Err(Error::InvalidOperation(_))
        ));
    }

    #[test]
    fn invalid() {
        assert!(Strings::from(b"A\0").is_err());

        let strings = Strings::from(&[0x00, 0xFF, 0xFE, 0x00]).unwrap();
        assert!(matches!(strings.get(1), Err(Error::Malformed { .. })));
        assert!(Strings::from(&[]).unwrap().get(0).unwrap().is_empty());
    }
}
