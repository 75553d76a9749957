//! The table stream (`#~` or `#-`).
//!
//! ```text
//! Reserved       u32, always 0
//! MajorVersion   u8, 2
//! MinorVersion   u8, 0
//! HeapSizes      u8, see HeapSizeFlags
//! Reserved       u8, always 1
//! Valid          u64, present tables
//! Sorted         u64, sorted tables
//! Rows           u32 per present table, in table order
//! ExtraData      u32, only with HeapSizeFlags::EXTRA_DATA
//! Tables         rows of each present table, in table order
//! ```
//!
//! Row layouts follow [`TableId::columns`]; the width of every reference column is resolved
//! through [`ReferenceSizes`] from the heap-size flags, the row counts in this header and, for a
//! standalone Portable PDB, the external row counts of its `#Pdb` stream.
//!
//! # Reference
//! - [ECMA-335 II.24.2.6](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use crate::{
    blob::{BlobReader, MemoryBlock},
    metadata::{
        handles::{BlobHandle, EntityHandle, GuidHandle, StringHandle, OFFSET_MASK, RID_MASK},
        sizes::{HeapIndex, HeapSizeFlags, ReferenceSizes},
        tables::{Column, TableId, TableMask, TABLE_SLOTS},
    },
    Result,
};

/// Parsed header of the table stream, with access to the rows of every present table.
///
/// # Examples
///
/// ```rust
/// use metascope::metadata::{streams::TablesHeader, tables::{TableId, TABLE_SLOTS}};
///
/// #[rustfmt::skip]
/// let data = [
///     0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x01,
///     0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
///     0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
///     0x01, 0x00, 0x00, 0x00,
///     0x00, 0x00, 0x0A, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00,
/// ];
///
/// let tables = TablesHeader::read(&data, &[0; TABLE_SLOTS])?;
/// let module = tables.table(TableId::Module).unwrap().row(1)?;
/// assert_eq!(module.string(1)?.offset(), Some(0x0A));
/// assert_eq!(module.guid(2)?.offset(), Some(1));
/// # Ok::<(), metascope::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct TablesHeader<'a> {
    /// Major version of table schemata, shall be 2
    pub major_version: u8,
    /// Minor version of table schemata, shall be 0
    pub minor_version: u8,
    /// Heap-size flags as stored
    pub heap_flags: HeapSizeFlags,
    /// Present tables
    pub valid: TableMask,
    /// Sorted tables
    pub sorted: TableMask,
    row_counts: [u32; TABLE_SLOTS],
    references: ReferenceSizes,
    tables: Vec<Option<MemoryBlock<'a>>>,
    data_size: usize,
}

impl<'a> TablesHeader<'a> {
    /// Parse the table stream.
    ///
    /// ## Arguments
    /// * `data` - The complete stream
    /// * `external_row_counts` - Row counts from the `#Pdb` stream, all zero otherwise
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the header is truncated, or
    /// [`crate::Error::Malformed`] for reserved table bits, row counts beyond 24 bits, tables
    /// with both local and external rows, or table data exceeding the stream.
    pub fn read(data: &'a [u8], external_row_counts: &[u32; TABLE_SLOTS]) -> Result<Self> {
        Self::read_with_flags(data, external_row_counts, HeapSizeFlags::empty())
    }

    /// Parse the table stream, resolving reference widths as if `forced` were also set in the
    /// stored heap-size flags.
    ///
    /// A minimal delta marked by a `#JTD` stream passes [`HeapSizeFlags::ENC_DELTAS`] here, which
    /// makes every reference 4 bytes wide. [`TablesHeader::heap_flags`] keeps the stored value.
    ///
    /// # Errors
    /// Same as [`TablesHeader::read`].
    pub fn read_with_flags(
        data: &'a [u8],
        external_row_counts: &[u32; TABLE_SLOTS],
        forced: HeapSizeFlags,
    ) -> Result<Self> {
        let mut reader = BlobReader::new(data);

        let _reserved = reader.read_le::<u32>()?;
        let major_version = reader.read_le::<u8>()?;
        let minor_version = reader.read_le::<u8>()?;
        let heap_flags = HeapSizeFlags::from_bits_retain(reader.read_le::<u8>()?);
        let _reserved = reader.read_le::<u8>()?;
        let valid_bits = reader.read_le::<u64>()?;
        let sorted = TableMask::from_bits_retain(reader.read_le::<u64>()?);

        let valid = TableMask::from_bits_retain(valid_bits);
        if !TableMask::ALL.contains(valid) {
            return Err(malformed_error!(
                "Table stream references reserved tables - {:#018x}",
                valid_bits
            ));
        }

        let mut row_counts = [0u32; TABLE_SLOTS];
        let mut combined = [0u32; TABLE_SLOTS];
        for table in valid.tables() {
            let rows = reader.read_le::<u32>()?;
            if rows > RID_MASK {
                return Err(malformed_error!(
                    "Row count of {:?} exceeds 24 bits - {}",
                    table,
                    rows
                ));
            }

            let external = external_row_counts[table.index()];
            if rows > 0 && external > 0 {
                return Err(malformed_error!(
                    "{:?} has both local and external rows",
                    table
                ));
            }

            row_counts[table.index()] = rows;
        }
        for (slot, (local, external)) in combined
            .iter_mut()
            .zip(row_counts.iter().zip(external_row_counts))
        {
            *slot = local + external;
        }

        if heap_flags.contains(HeapSizeFlags::EXTRA_DATA) {
            let _extra = reader.read_le::<u32>()?;
        }

        let references = ReferenceSizes::new(&combined, heap_flags | forced);

        let mut tables = vec![None; TABLE_SLOTS];
        let mut offset = reader.offset();
        for table in valid.tables() {
            let size = u64::from(references.row_size(table)) * u64::from(row_counts[table.index()]);
            let size = usize::try_from(size)
                .map_err(|_| malformed_error!("Size of {:?} overflows", table))?;

            let block = MemoryBlock::new(data).sub_block(offset, size).map_err(|_| {
                malformed_error!(
                    "Data of {:?} exceeds the table stream - {} bytes at {}",
                    table,
                    size,
                    offset
                )
            })?;

            tables[table.index()] = Some(block);
            offset += size;
        }

        Ok(TablesHeader {
            major_version,
            minor_version,
            heap_flags,
            valid,
            sorted,
            row_counts,
            references,
            tables,
            data_size: offset,
        })
    }

    /// Number of present tables
    #[must_use]
    pub fn table_count(&self) -> u32 {
        self.valid.bits().count_ones()
    }

    /// True if `table` is present
    #[must_use]
    pub fn has_table(&self, table: TableId) -> bool {
        self.valid.contains(table.mask())
    }

    /// Rows of `table`, 0 if absent
    #[must_use]
    pub fn row_count(&self, table: TableId) -> u32 {
        self.row_counts[table.index()]
    }

    /// Resolved reference widths
    #[must_use]
    pub fn references(&self) -> &ReferenceSizes {
        &self.references
    }

    /// True for an uncompressed edit-and-continue delta
    #[must_use]
    pub fn is_enc_delta(&self) -> bool {
        self.references.is_enc_delta()
    }

    /// Bytes occupied by header and rows, excluding trailing padding
    #[must_use]
    pub fn data_size(&self) -> usize {
        self.data_size
    }

    /// Row access to `table`, `None` if absent
    #[must_use]
    pub fn table(&self, table: TableId) -> Option<Table<'a, '_>> {
        let data = (*self.tables.get(table.index())?)?;
        Some(Table {
            id: table,
            data,
            rows: self.row_counts[table.index()],
            row_size: self.references.row_size(table) as usize,
            references: &self.references,
        })
    }
}

/// The rows of a single table.
#[derive(Debug, Clone, Copy)]
pub struct Table<'a, 'h> {
    id: TableId,
    data: MemoryBlock<'a>,
    rows: u32,
    row_size: usize,
    references: &'h ReferenceSizes,
}

impl<'a, 'h> Table<'a, 'h> {
    /// The table identifier
    #[must_use]
    pub fn id(&self) -> TableId {
        self.id
    }

    /// Number of rows
    #[must_use]
    pub fn row_count(&self) -> u32 {
        self.rows
    }

    /// Size of one row in bytes
    #[must_use]
    pub fn row_size(&self) -> usize {
        self.row_size
    }

    /// Row with 1-based id `row_id`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the row does not exist
    pub fn row(&self, row_id: u32) -> Result<Row<'a, 'h>> {
        if row_id == 0 || row_id > self.rows {
            return Err(out_of_bounds_error!());
        }

        let start = (row_id as usize - 1) * self.row_size;
        Ok(Row {
            table: self.id,
            row_id,
            data: self.data.sub_block(start, self.row_size)?,
            references: self.references,
        })
    }

    /// Iterate all rows in order
    pub fn iter(&self) -> impl Iterator<Item = Row<'a, 'h>> + '_ {
        (1..=self.rows).filter_map(|row_id| self.row(row_id).ok())
    }
}

/// A single row with typed column access.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a, 'h> {
    table: TableId,
    row_id: u32,
    data: MemoryBlock<'a>,
    references: &'h ReferenceSizes,
}

impl Row<'_, '_> {
    /// The table this row belongs to
    #[must_use]
    pub fn table(&self) -> TableId {
        self.table
    }

    /// 1-based row id
    #[must_use]
    pub fn row_id(&self) -> u32 {
        self.row_id
    }

    /// Handle of this row
    #[must_use]
    pub fn handle(&self) -> EntityHandle {
        EntityHandle::new(self.table, self.row_id)
    }

    fn locate(&self, index: usize) -> Result<(Column, usize, u8)> {
        let columns = self.table.columns();
        let Some(column) = columns.get(index) else {
            return Err(invalid_operation!(
                "{:?} has no column {}",
                self.table,
                index
            ));
        };

        let offset = columns[..index]
            .iter()
            .map(|column| self.references.column_size(*column) as usize)
            .sum();
        Ok((*column, offset, self.references.column_size(*column)))
    }

    fn read(&self, offset: usize, width: u8) -> Result<u32> {
        match width {
            1 => self.data.peek_le::<u8>(offset).map(u32::from),
            2 => self.data.peek_le::<u16>(offset).map(u32::from),
            _ => self.data.peek_le::<u32>(offset),
        }
    }

    /// Raw value of column `index`
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if the column does not exist
    pub fn column(&self, index: usize) -> Result<u32> {
        let (_, offset, width) = self.locate(index)?;
        self.read(offset, width)
    }

    /// Column `index` as a table reference or decoded coded index
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if the column is not a reference, or
    /// [`crate::Error::Malformed`] if the value does not decode
    pub fn entity(&self, index: usize) -> Result<EntityHandle> {
        let (column, offset, width) = self.locate(index)?;
        let value = self.read(offset, width)?;
        match column {
            Column::Table(table) => EntityHandle::try_new(table, value),
            Column::Coded(coded) => coded.decode(value),
            _ => Err(invalid_operation!(
                "Column {} of {:?} is not a table reference",
                index,
                self.table
            )),
        }
    }

    fn heap(&self, index: usize, heap: HeapIndex) -> Result<u32> {
        let (column, offset, width) = self.locate(index)?;
        if column != Column::Heap(heap) {
            return Err(invalid_operation!(
                "Column {} of {:?} is not a {} reference",
                index,
                self.table,
                heap.stream_name()
            ));
        }

        let value = self.read(offset, width)?;
        if value > OFFSET_MASK {
            return Err(malformed_error!(
                "{} reference out of range - {:#x}",
                heap.stream_name(),
                value
            ));
        }
        Ok(value)
    }

    /// Column `index` as a `#Strings` reference
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if the column is not a string reference
    pub fn string(&self, index: usize) -> Result<StringHandle> {
        self.heap(index, HeapIndex::String)
            .map(StringHandle::from_offset)
    }

    /// Column `index` as a `#Blob` reference
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if the column is not a blob reference
    pub fn blob(&self, index: usize) -> Result<BlobHandle> {
        self.heap(index, HeapIndex::Blob).map(BlobHandle::from_offset)
    }

    /// Column `index` as a `#GUID` reference
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if the column is not a GUID reference
    pub fn guid(&self, index: usize) -> Result<GuidHandle> {
        self.heap(index, HeapIndex::Guid).map(GuidHandle::from_offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{metadata::tables::CodedIndexType, Error};

    #[rustfmt::skip]
    fn stream() -> Vec<u8> {
        vec![
            0x00, 0x00, 0x00, 0x00, // reserved
            0x02, 0x00,             // 2.0
            0x00, 0x01,             // heap sizes, reserved
            0x07, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // Module, TypeRef, TypeDef
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00,
            0x02, 0x00, 0x00, 0x00,
            // Module
            0x00, 0x00, 0x0A, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00,
            // TypeRef: ResolutionScope Module 1, name 0x10, namespace 0x20
            0x04, 0x00, 0x10, 0x00, 0x20, 0x00,
            // TypeDef 1: <Module>
            0x00, 0x00, 0x00, 0x00, 0x30, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00,
            // TypeDef 2: extends TypeRef 1
            0x01, 0x00, 0x10, 0x00, 0x40, 0x00, 0x50, 0x00, 0x05, 0x00, 0x01, 0x00, 0x01, 0x00,
            0x00, 0x00, 0x00, // terminator and padding
        ]
    }

    #[test]
    fn crafted() {
        let data = stream();
        let tables = TablesHeader::read(&data, &[0; TABLE_SLOTS]).unwrap();

        assert_eq!(tables.major_version, 2);
        assert_eq!(tables.table_count(), 3);
        assert_eq!(tables.row_count(TableId::TypeDef), 2);
        assert!(!tables.has_table(TableId::Field));
        assert!(tables.table(TableId::Field).is_none());
        assert_eq!(tables.data_size(), data.len() - 3);

        let typeref = tables.table(TableId::TypeRef).unwrap().row(1).unwrap();
        assert_eq!(
            typeref.entity(0).unwrap(),
            EntityHandle::new(TableId::Module, 1)
        );
        assert_eq!(typeref.string(1).unwrap(), StringHandle::from_offset(0x10));

        let typedefs = tables.table(TableId::TypeDef).unwrap();
        let second = typedefs.row(2).unwrap();
        assert_eq!(second.column(0).unwrap(), 0x0010_0001);
        assert_eq!(
            second.entity(3).unwrap(),
            CodedIndexType::TypeDefOrRef
                .decode(0x05)
                .unwrap()
        );
        assert_eq!(second.entity(3).unwrap().table(), TableId::TypeRef);
        assert_eq!(second.entity(4).unwrap(), EntityHandle::new(TableId::Field, 1));
        assert_eq!(second.handle().to_token(), 0x0200_0002);
        assert_eq!(typedefs.iter().count(), 2);

        assert!(matches!(typedefs.row(3), Err(Error::OutOfBounds)));
        assert!(matches!(second.string(0), Err(Error::InvalidOperation(_))));
        assert!(matches!(second.column(6), Err(Error::InvalidOperation(_))));
    }

    #[test]
    fn truncated_table_data() {
        let data = stream();
        let cut = &data[..data.len() - 10];
        assert!(matches!(
            TablesHeader::read(cut, &[0; TABLE_SLOTS]),
            Err(Error::Malformed { .. })
        ));
        assert!(matches!(
            TablesHeader::read(&data[..20], &[0; TABLE_SLOTS]),
            Err(Error::OutOfBounds)
        ));
    }

    #[test]
    fn reserved_table_bits() {
        let mut data = stream();
        data[8 + 5] = 0x20; // bit 45, no such table
        assert!(matches!(
            TablesHeader::read(&data, &[0; TABLE_SLOTS]),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn row_count_limit() {
        let mut data = stream();
        data[24..28].copy_from_slice(&0x0100_0000u32.to_le_bytes());
        assert!(matches!(
            TablesHeader::read(&data, &[0; TABLE_SLOTS]),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn local_and_external_rows() {
        let data = stream();
        let mut external = [0u32; TABLE_SLOTS];
        external[TableId::TypeDef.index()] = 4;
        assert!(matches!(
            TablesHeader::read(&data, &external),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn forced_large_references() {
        #[rustfmt::skip]
        let data = [
            0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x01,
            0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00,
            // Module: generation, name, mvid, enc id, enc base id
            0x00, 0x00,
            0x45, 0x23, 0x01, 0x00,
            0x01, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x00,
        ];

        let small = TablesHeader::read(&data, &[0; TABLE_SLOTS]).unwrap();
        assert_eq!(small.references().row_size(TableId::Module), 10);
        let module = small.table(TableId::Module).unwrap().row(1).unwrap();
        assert_eq!(module.column(1).unwrap(), 0x2345);

        let tables =
            TablesHeader::read_with_flags(&data, &[0; TABLE_SLOTS], HeapSizeFlags::ENC_DELTAS)
                .unwrap();
        assert!(tables.heap_flags.is_empty());
        assert!(tables.is_enc_delta());
        assert_eq!(tables.references().row_size(TableId::Module), 18);
        assert_eq!(tables.data_size(), 46);

        let module = tables.table(TableId::Module).unwrap().row(1).unwrap();
        assert_eq!(module.string(1).unwrap(), StringHandle::from_offset(0x0001_2345));
        assert_eq!(module.column(2).unwrap(), 1);
    }

    #[test]
    fn extra_data_and_enc() {
        let mut data = stream();
        data[6] = (HeapSizeFlags::EXTRA_DATA | HeapSizeFlags::ENC_DELTAS).bits();
        data.splice(36..36, [0xEE, 0xEE, 0xEE, 0xEE]);

        // Every reference is 4 bytes wide now, the same rows no longer fit
        let result = TablesHeader::read(&data, &[0; TABLE_SLOTS]);
        assert!(matches!(result, Err(Error::Malformed { .. })));

        let mut header = data[..40].to_vec();
        header[8] = 0x00;
        header.truncate(24);
        header.extend_from_slice(&[0xEE; 4]);
        let empty = TablesHeader::read(&header, &[0; TABLE_SLOTS]).unwrap();
        assert!(empty.is_enc_delta());
        assert_eq!(empty.table_count(), 0);
        assert_eq!(empty.references().table_size(TableId::TypeDef), 4);
        assert_eq!(empty.data_size(), 28);
    }
}
