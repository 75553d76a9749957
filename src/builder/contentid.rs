//! Deterministic identity of serialized content.
//!
//! A Portable PDB is matched to its executable by a 20-byte id: a GUID followed by a 4-byte
//! stamp. [`ContentId::from_hash`] derives both from a content hash, so that identical input
//! produces identical output. The GUID carries the version 4 and variant bits of RFC 4122 and the
//! stamp always has its top bit set.

use sha1::{Digest, Sha1};

use crate::{blob::BlobBuilder, metadata::streams::PDB_ID_SIZE, Result};

/// The id of a Portable PDB, also recorded in the debug directory of the matching executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentId {
    /// Content GUID
    pub guid: uguid::Guid,
    /// Content stamp
    pub stamp: u32,
}

impl ContentId {
    /// Combine an explicit GUID and stamp
    #[must_use]
    pub fn new(guid: uguid::Guid, stamp: u32) -> Self {
        ContentId { guid, stamp }
    }

    /// Derive an id from the first 20 bytes of `hash`.
    ///
    /// # Errors
    /// Returns [`crate::Error::ArgumentOutOfRange`] if `hash` is shorter than 20 bytes.
    pub fn from_hash(hash: &[u8]) -> Result<Self> {
        if hash.len() < PDB_ID_SIZE {
            return Err(argument_error!(
                "Content hash needs {} bytes, got {}",
                PDB_ID_SIZE,
                hash.len()
            ));
        }

        let mut guid = [0u8; 16];
        guid.copy_from_slice(&hash[..16]);
        guid[7] = (guid[7] & 0x0F) | 0x40;
        guid[8] = (guid[8] & 0x3F) | 0x80;

        let stamp = u32::from_le_bytes([hash[16], hash[17], hash[18], hash[19]]) | 0x8000_0000;

        Ok(ContentId {
            guid: uguid::Guid::from_bytes(guid),
            stamp,
        })
    }

    /// Derive an id from the SHA-1 of the content of `builder`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if the builder has been linked.
    pub fn from_content(builder: &BlobBuilder) -> Result<Self> {
        let mut hasher = Sha1::new();
        for blob in builder.blobs()? {
            hasher.update(blob);
        }
        Self::from_hash(&hasher.finalize())
    }

    /// Read an id in its serialized layout
    #[must_use]
    pub fn from_bytes(bytes: &[u8; PDB_ID_SIZE]) -> Self {
        let mut guid = [0u8; 16];
        guid.copy_from_slice(&bytes[..16]);
        ContentId {
            guid: uguid::Guid::from_bytes(guid),
            stamp: u32::from_le_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]),
        }
    }

    /// The serialized layout: GUID bytes followed by the little-endian stamp
    #[must_use]
    pub fn to_bytes(&self) -> [u8; PDB_ID_SIZE] {
        let mut bytes = [0u8; PDB_ID_SIZE];
        bytes[..16].copy_from_slice(&self.guid.to_bytes());
        bytes[16..].copy_from_slice(&self.stamp.to_le_bytes());
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_bits() {
        let id = ContentId::from_hash(&[0xFF; 20]).unwrap();
        let bytes = id.to_bytes();

        assert_eq!(bytes[7], 0x4F);
        assert_eq!(bytes[8], 0xBF);
        assert_eq!(id.stamp, 0xFFFF_FFFF);

        let id = ContentId::from_hash(&[0; 32]).unwrap();
        let bytes = id.to_bytes();
        assert_eq!(bytes[7], 0x40);
        assert_eq!(bytes[8], 0x80);
        assert_eq!(id.stamp, 0x8000_0000);
    }

    #[test]
    fn stamp_is_little_endian() {
        let mut hash = [0u8; 20];
        hash[16] = 0x01;
        hash[19] = 0x02;
        assert_eq!(ContentId::from_hash(&hash).unwrap().stamp, 0x8200_0001);
    }

    #[test]
    fn short_hash() {
        assert!(ContentId::from_hash(&[0; 19]).is_err());
    }

    #[test]
    fn bytes_round_trip() {
        let id = ContentId::from_hash(&(0u8..20).collect::<Vec<_>>()).unwrap();
        assert_eq!(ContentId::from_bytes(&id.to_bytes()), id);
    }

    #[test]
    fn deterministic() {
        let mut first = BlobBuilder::with_capacity(16);
        first.write_bytes(&[7u8; 100]).unwrap();
        let mut second = BlobBuilder::new();
        second.write_bytes(&[7u8; 100]).unwrap();

        assert_eq!(
            ContentId::from_content(&first).unwrap(),
            ContentId::from_content(&second).unwrap()
        );

        second.write_u8(0).unwrap();
        assert_ne!(
            ContentId::from_content(&first).unwrap(),
            ContentId::from_content(&second).unwrap()
        );
    }
}
