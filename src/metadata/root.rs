//! Metadata root header and stream directory.
//!
//! The metadata root is the entry point for reading metadata. It contains the version string and
//! the directory locating all streams (`#~`, `#Strings`, `#Blob`, ...).
//!
//! ```text
//! Signature       u32, 0x424A5342 ("BSJB")
//! MajorVersion    u16, 1
//! MinorVersion    u16, 1
//! Reserved        u32, 0
//! Length          u32, padded length of the version string
//! Version         NUL-terminated UTF-8, padded to Length
//! Flags           u16, 0
//! Streams         u16, number of stream headers
//! StreamHeaders   see StreamHeader
//! ```
//!
//! # Example
//!
//! ```rust
//! use metascope::metadata::root::Root;
//!
//! #[rustfmt::skip]
//! let data = [
//!     0x42, 0x53, 0x4A, 0x42,
//!     0x01, 0x00, 0x01, 0x00,
//!     0x00, 0x00, 0x00, 0x00,
//!     0x04, 0x00, 0x00, 0x00,
//!     b'v', b'1', 0x00, 0x00,
//!     0x00, 0x00,
//!     0x01, 0x00,
//!     0x20, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, b'#', b'~', 0x00, 0x00,
//!     0x00, 0x00, 0x00, 0x00,
//! ];
//!
//! let root = Root::read(&data)?;
//! assert_eq!(root.version, "v1");
//! assert_eq!(root.stream("#~").unwrap().offset, 0x20);
//! # Ok::<(), metascope::Error>(())
//! ```
//!
//! # References
//! - [ECMA-335 II.24.2.1: Metadata root](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use crate::{
    blob::BlobReader, metadata::streams::StreamHeader, utils::align_to_4_bytes, Result,
};

/// The magic value of the metadata root ("BSJB")
pub const CIL_HEADER_MAGIC: u32 = 0x424A_5342;

/// Longest version string the root header can hold, without terminator
pub const MAX_VERSION_LENGTH: usize = 254;

/// The metadata root header and its stream directory.
#[derive(Debug, Clone)]
pub struct Root {
    /// Magic signature for physical metadata: 0x424A5342
    pub signature: u32,
    /// `MajorVersion`
    pub major_version: u16,
    /// `MinorVersion`
    pub minor_version: u16,
    /// Always 0
    pub reserved: u32,
    /// Number of bytes allocated to hold the version string
    pub length: u32,
    /// Version string without terminator and padding
    pub version: String,
    /// Reserved, always 0
    pub flags: u16,
    /// Stream directory in stored order
    pub stream_headers: Vec<StreamHeader>,
}

impl Root {
    /// Read the metadata root from the start of `data`, the complete metadata image.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the header is truncated, or
    /// [`crate::Error::Malformed`] if the signature is wrong, the version string is invalid, or a
    /// stream lies outside of `data` or is listed twice.
    pub fn read(data: &[u8]) -> Result<Root> {
        let mut reader = BlobReader::new(data);

        let signature = reader.read_le::<u32>()?;
        if signature != CIL_HEADER_MAGIC {
            return Err(malformed_error!(
                "CIL_HEADER_MAGIC does not match - {:#010x}",
                signature
            ));
        }

        let major_version = reader.read_le::<u16>()?;
        let minor_version = reader.read_le::<u16>()?;
        let reserved = reader.read_le::<u32>()?;
        let length = reader.read_le::<u32>()?;
        if length as usize > align_to_4_bytes(MAX_VERSION_LENGTH + 1) {
            return Err(malformed_error!("Version string too long - {}", length));
        }
        if length % 4 != 0 {
            return Err(malformed_error!(
                "Version length is not a multiple of 4 - {}",
                length
            ));
        }

        let version_bytes = reader.read_bytes(length as usize)?;
        let end = version_bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(version_bytes.len());
        let version = std::str::from_utf8(&version_bytes[..end])
            .map_err(|_| malformed_error!("Version string is not valid UTF-8"))?
            .to_string();

        let flags = reader.read_le::<u16>()?;
        let stream_count = reader.read_le::<u16>()?;

        let mut stream_headers: Vec<StreamHeader> = Vec::with_capacity(stream_count as usize);
        for _ in 0..stream_count {
            let header = StreamHeader::read(&mut reader)?;

            match header.offset.checked_add(header.size) {
                Some(end) if end as usize <= data.len() => {}
                Some(_) => {
                    return Err(malformed_error!(
                        "Stream {} exceeds the metadata - {} + {}",
                        header.name,
                        header.offset,
                        header.size
                    ))
                }
                None => {
                    return Err(malformed_error!(
                        "Stream offset and size cause integer overflow - {} + {}",
                        header.offset,
                        header.size
                    ))
                }
            }

            if stream_headers.iter().any(|known| known.name == header.name) {
                return Err(malformed_error!("Duplicate stream - {}", header.name));
            }

            stream_headers.push(header);
        }

        Ok(Root {
            signature,
            major_version,
            minor_version,
            reserved,
            length,
            version,
            flags,
            stream_headers,
        })
    }

    /// The header of stream `name`, if present
    #[must_use]
    pub fn stream(&self, name: &str) -> Option<&StreamHeader> {
        self.stream_headers.iter().find(|header| header.name == name)
    }

    /// The bytes of stream `name` within `data`, the image this root was read from
    #[must_use]
    pub fn stream_data<'a>(&self, data: &'a [u8], name: &str) -> Option<&'a [u8]> {
        let header = self.stream(name)?;
        let start = header.offset as usize;
        data.get(start..start + header.size as usize)
    }
}
