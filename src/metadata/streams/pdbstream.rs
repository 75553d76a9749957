//! The `#Pdb` stream of a standalone Portable PDB.
//!
//! ```text
//! PdbId                      20 bytes
//! EntryPoint                 u32 MethodDef token or 0
//! ReferencedTypeSystemTables u64 mask
//! TypeSystemTableRows        u32 per bit set in the mask
//! ```
//!
//! The row counts describe the type-system tables of the assembly the PDB belongs to. They
//! determine the width of references from debug tables into those external tables.
//!
//! # Reference
//! - [Portable PDB v1.0, #Pdb stream](https://github.com/dotnet/runtime/blob/main/docs/design/specs/PortablePdb-Metadata.md#pdb-stream)

use crate::{
    blob::BlobReader,
    metadata::{
        handles::{EntityHandle, RID_MASK},
        tables::{TableId, TableMask, TABLE_SLOTS},
    },
    Result,
};

/// Size of the Portable PDB id.
pub const PDB_ID_SIZE: usize = 20;

/// Parsed `#Pdb` stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdbStream {
    /// Id shared with the debug directory entry of the PE file
    pub id: [u8; PDB_ID_SIZE],
    /// Entry point method, nil if there is none
    pub entry_point: EntityHandle,
    /// Tables with rows in the external type-system metadata
    pub referenced_tables: TableMask,
    /// Row counts of the external type-system tables
    pub external_row_counts: [u32; TABLE_SLOTS],
}

impl PdbStream {
    /// Parse a `#Pdb` stream.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the stream is truncated, or
    /// [`crate::Error::Malformed`] if the entry point is not a `MethodDef` token, the table mask
    /// references debug or reserved tables, or a row count exceeds 24 bits.
    pub fn read(data: &[u8]) -> Result<PdbStream> {
        let mut reader = BlobReader::new(data);

        let mut id = [0u8; PDB_ID_SIZE];
        id.copy_from_slice(reader.read_bytes(PDB_ID_SIZE)?);

        let entry_token = reader.read_le::<u32>()?;
        let entry_point = if entry_token == 0 {
            EntityHandle::nil(TableId::MethodDef)
        } else {
            let handle = EntityHandle::from_token(entry_token)?;
            if handle.table() != TableId::MethodDef || handle.is_nil() || handle.is_virtual() {
                return Err(malformed_error!(
                    "Invalid #Pdb entry point - {:#010x}",
                    entry_token
                ));
            }
            handle
        };

        let mask = reader.read_le::<u64>()?;
        let referenced_tables = TableMask::from_bits_retain(mask);
        if !TableMask::VALID_EXTERNAL.contains(referenced_tables) {
            return Err(malformed_error!(
                "Invalid #Pdb referenced table mask - {:#018x}",
                mask
            ));
        }

        let mut external_row_counts = [0u32; TABLE_SLOTS];
        for table in referenced_tables.tables() {
            let rows = reader.read_le::<u32>()?;
            if rows > RID_MASK {
                return Err(malformed_error!(
                    "External row count of {:?} exceeds 24 bits - {}",
                    table,
                    rows
                ));
            }
            external_row_counts[table.index()] = rows;
        }

        Ok(PdbStream {
            id,
            entry_point,
            referenced_tables,
            external_row_counts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn stream(entry_point: u32, mask: u64, rows: &[u32]) -> Vec<u8> {
        let mut data = vec![0x11; PDB_ID_SIZE];
        data.extend_from_slice(&entry_point.to_le_bytes());
        data.extend_from_slice(&mask.to_le_bytes());
        for count in rows {
            data.extend_from_slice(&count.to_le_bytes());
        }
        data
    }

    #[test]
    fn crafted() {
        let mask = (TableId::TypeDef.mask() | TableId::MethodDef.mask()).bits();
        let data = stream(0x0600_0002, mask, &[5, 9]);

        let pdb = PdbStream::read(&data).unwrap();
        assert_eq!(pdb.id, [0x11; PDB_ID_SIZE]);
        assert_eq!(pdb.entry_point, EntityHandle::new(TableId::MethodDef, 2));
        assert_eq!(pdb.external_row_counts[TableId::TypeDef.index()], 5);
        assert_eq!(pdb.external_row_counts[TableId::MethodDef.index()], 9);
        assert_eq!(pdb.referenced_tables.tables().count(), 2);
    }

    #[test]
    fn no_entry_point() {
        let pdb = PdbStream::read(&stream(0, 0, &[])).unwrap();
        assert!(pdb.entry_point.is_nil());
        assert!(pdb.referenced_tables.is_empty());
    }

    #[test]
    fn invalid() {
        assert!(matches!(
            PdbStream::read(&stream(0x0200_0001, 0, &[])),
            Err(Error::Malformed { .. })
        ));
        assert!(matches!(
            PdbStream::read(&stream(0x0600_0000, 0, &[])),
            Err(Error::Malformed { .. })
        ));
        assert!(matches!(
            PdbStream::read(&stream(0, TableId::Document.mask().bits(), &[1])),
            Err(Error::Malformed { .. })
        ));
        assert!(matches!(
            PdbStream::read(&stream(0, TableId::FieldPtr.mask().bits(), &[1])),
            Err(Error::Malformed { .. })
        ));
        assert!(matches!(
            PdbStream::read(&stream(0, TableId::TypeDef.mask().bits(), &[0x0100_0000])),
            Err(Error::Malformed { .. })
        ));
        assert!(matches!(
            PdbStream::read(&stream(0, TableId::TypeDef.mask().bits(), &[])),
            Err(Error::OutOfBounds)
        ));
    }
}
