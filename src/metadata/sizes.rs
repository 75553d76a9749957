//! Reference widths and stream layout of serialized metadata.
//!
//! Whether a reference column occupies 2 or 4 bytes is not stored per column. It is derived from
//! the row counts of the referenced tables and the sizes of the heaps:
//!
//! - a heap reference is small if the heap is at most `0xFFFF` bytes,
//! - a table reference is small if the table has at most `0xFFFF` rows,
//! - a coded index is small if every candidate table fits into `16 - tag_bits` bits.
//!
//! Edit-and-continue deltas (images with `EncLog` or `EncMap` rows) are stored uncompressed and
//! use 4-byte references throughout.
//!
//! [`ReferenceSizes`] holds the resolved widths and is shared by the reader, which derives it from
//! the heap-size flags and row counts of the `#~` header, and the writer, whose
//! [`MetadataSizes`] additionally computes the byte size of every stream.
//!
//! # Example
//!
//! ```rust
//! use metascope::metadata::{
//!     sizes::MetadataSizes,
//!     tables::{CodedIndexType, TableId, TABLE_SLOTS},
//! };
//!
//! let mut rows = [0u32; TABLE_SLOTS];
//! rows[TableId::MethodDef.index()] = 40_000;
//!
//! let sizes = MetadataSizes::new(&rows, &[0; TABLE_SLOTS], [1, 4, 1, 0], "v4.0.30319", false);
//! assert_eq!(sizes.references().table_size(TableId::MethodDef), 2);
//! assert_eq!(sizes.references().coded_index_size(CodedIndexType::MethodDefOrRef), 4);
//! ```

use bitflags::bitflags;
use strum::{EnumCount, EnumIter, IntoEnumIterator};

use crate::{
    metadata::{
        streams::PDB_ID_SIZE,
        tables::{CodedIndexType, Column, TableId, TableMask, TABLE_SLOTS},
    },
    utils::align_to_4_bytes,
};

/// The four heaps of a metadata image, in the order of heap-size arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
pub enum HeapIndex {
    /// `#US`, literal strings referenced from IL
    UserString,
    /// `#Strings`, identifiers
    String,
    /// `#Blob`, signatures and binary values
    Blob,
    /// `#GUID`, 16-byte GUIDs
    Guid,
}

impl HeapIndex {
    /// Position of this heap in a heap-size array.
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Name of the stream holding this heap.
    #[must_use]
    pub fn stream_name(self) -> &'static str {
        match self {
            HeapIndex::UserString => "#US",
            HeapIndex::String => "#Strings",
            HeapIndex::Blob => "#Blob",
            HeapIndex::Guid => "#GUID",
        }
    }
}

bitflags! {
    /// The `HeapSizes` byte of the table-stream header.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
    pub struct HeapSizeFlags: u8 {
        /// `#Strings` references are 4 bytes wide
        const STRING_LARGE = 0x01;
        /// `#GUID` references are 4 bytes wide
        const GUID_LARGE = 0x02;
        /// `#Blob` references are 4 bytes wide
        const BLOB_LARGE = 0x04;
        /// The tables form an edit-and-continue delta
        const ENC_DELTAS = 0x20;
        /// An extra dword follows the row counts
        const EXTRA_DATA = 0x40;
        /// Deleted rows are marked in the delta
        const DELETED_MARKS = 0x80;
    }
}

impl HeapSizeFlags {
    fn large_bit(heap: HeapIndex) -> HeapSizeFlags {
        match heap {
            HeapIndex::String => HeapSizeFlags::STRING_LARGE,
            HeapIndex::Guid => HeapSizeFlags::GUID_LARGE,
            HeapIndex::Blob => HeapSizeFlags::BLOB_LARGE,
            HeapIndex::UserString => HeapSizeFlags::empty(),
        }
    }
}

const SMALL_REFERENCE_LIMIT: u32 = 0xFFFF;

/// Resolved byte width of every kind of reference column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSizes {
    large_tables: TableMask,
    large_coded: [bool; CodedIndexType::COUNT],
    heap_flags: HeapSizeFlags,
}

impl ReferenceSizes {
    /// Derive reference widths from combined (local and external) row counts and the heap-size
    /// flags. With [`HeapSizeFlags::ENC_DELTAS`] set, every reference is large.
    #[must_use]
    pub fn new(row_counts: &[u32; TABLE_SLOTS], heap_flags: HeapSizeFlags) -> Self {
        let compressed = !heap_flags.contains(HeapSizeFlags::ENC_DELTAS);

        let mut large_tables = TableMask::empty();
        for table in TableId::iter() {
            if !compressed || row_counts[table.index()] > SMALL_REFERENCE_LIMIT {
                large_tables |= table.mask();
            }
        }

        let mut large_coded = [false; CodedIndexType::COUNT];
        for coded in CodedIndexType::iter() {
            let limit = coded.small_row_limit();
            large_coded[coded as usize] = !compressed
                || coded
                    .candidates()
                    .any(|table| row_counts[table.index()] > limit);
        }

        let mut heap_flags = heap_flags;
        if !compressed {
            heap_flags |=
                HeapSizeFlags::STRING_LARGE | HeapSizeFlags::GUID_LARGE | HeapSizeFlags::BLOB_LARGE;
        }

        ReferenceSizes {
            large_tables,
            large_coded,
            heap_flags,
        }
    }

    /// The heap-size flags these widths were derived from, large bits included.
    #[must_use]
    pub fn heap_flags(&self) -> HeapSizeFlags {
        self.heap_flags
    }

    /// True if the tables are stored uncompressed.
    #[must_use]
    pub fn is_enc_delta(&self) -> bool {
        self.heap_flags.contains(HeapSizeFlags::ENC_DELTAS)
    }

    /// Width of a reference into `table`.
    #[must_use]
    pub fn table_size(&self, table: TableId) -> u8 {
        if self.large_tables.contains(table.mask()) {
            4
        } else {
            2
        }
    }

    /// Width of a coded index of kind `coded`.
    #[must_use]
    pub fn coded_index_size(&self, coded: CodedIndexType) -> u8 {
        if self.large_coded[coded as usize] {
            4
        } else {
            2
        }
    }

    /// Width of a reference into `heap`. `#US` is only referenced by tokens and is always 4.
    #[must_use]
    pub fn heap_size(&self, heap: HeapIndex) -> u8 {
        match heap {
            HeapIndex::UserString => 4,
            _ if self.heap_flags.contains(HeapSizeFlags::large_bit(heap)) => 4,
            _ => 2,
        }
    }

    /// Width of a column.
    #[must_use]
    pub fn column_size(&self, column: Column) -> u8 {
        match column {
            Column::Fixed(width) => width,
            Column::Table(table) => self.table_size(table),
            Column::Coded(coded) => self.coded_index_size(coded),
            Column::Heap(heap) => self.heap_size(heap),
        }
    }

    /// Width of a row of `table`.
    #[must_use]
    pub fn row_size(&self, table: TableId) -> u32 {
        table
            .columns()
            .iter()
            .map(|column| u32::from(self.column_size(*column)))
            .sum()
    }
}

fn stream_header_size(name: &str) -> usize {
    8 + align_to_4_bytes(name.len() + 1)
}

/// Layout of one metadata image, computed once before serialization.
///
/// All sizes are in bytes. The struct is immutable; a new serialization pass computes a new one.
#[derive(Debug, Clone)]
pub struct MetadataSizes {
    references: ReferenceSizes,
    row_counts: [u32; TABLE_SLOTS],
    external_row_counts: [u32; TABLE_SLOTS],
    heap_sizes: [usize; HeapIndex::COUNT],
    present_tables: TableMask,
    external_tables: TableMask,
    is_standalone_debug: bool,
    padded_version_length: usize,
    metadata_header_size: usize,
    table_stream_size: usize,
    standalone_pdb_stream_size: usize,
}

impl MetadataSizes {
    /// Compute the layout.
    ///
    /// ## Arguments
    /// * `row_counts` - Rows of each table of this image
    /// * `external_row_counts` - Rows of each table of the type-system image a standalone PDB
    ///   refers to
    /// * `heap_sizes` - Unaligned heap sizes, indexed by [`HeapIndex`]
    /// * `version` - The metadata version string of the root header
    /// * `is_standalone_debug` - True for a standalone Portable PDB, which carries a `#Pdb` stream
    #[must_use]
    pub fn new(
        row_counts: &[u32; TABLE_SLOTS],
        external_row_counts: &[u32; TABLE_SLOTS],
        heap_sizes: [usize; HeapIndex::COUNT],
        version: &str,
        is_standalone_debug: bool,
    ) -> Self {
        let mut present_tables = TableMask::empty();
        let mut external_tables = TableMask::empty();
        let mut combined = [0u32; TABLE_SLOTS];
        for table in TableId::iter() {
            let local = row_counts[table.index()];
            let external = external_row_counts[table.index()];
            debug_assert!(
                local == 0 || external == 0,
                "{table:?} has both local and external rows"
            );

            if local > 0 {
                present_tables |= table.mask();
            }
            if external > 0 {
                external_tables |= table.mask();
            }
            combined[table.index()] = local.saturating_add(external);
        }

        let is_enc_delta = present_tables.intersects(TableMask::ENC);
        let mut heap_flags = HeapSizeFlags::empty();
        if is_enc_delta {
            heap_flags |= HeapSizeFlags::ENC_DELTAS | HeapSizeFlags::DELETED_MARKS;
        }
        for heap in [HeapIndex::String, HeapIndex::Guid, HeapIndex::Blob] {
            if heap_sizes[heap.index()] > SMALL_REFERENCE_LIMIT as usize {
                heap_flags |= HeapSizeFlags::large_bit(heap);
            }
        }

        let references = ReferenceSizes::new(&combined, heap_flags);

        let mut table_data_size = 0usize;
        for table in present_tables.tables() {
            table_data_size += references.row_size(table) as usize * row_counts[table.index()] as usize;
        }
        let table_stream_size = align_to_4_bytes(
            Self::TABLE_STREAM_HEADER_SIZE
                + 4 * present_tables.bits().count_ones() as usize
                + table_data_size
                + 1,
        );

        let standalone_pdb_stream_size = if is_standalone_debug {
            PDB_ID_SIZE + 4 + 8 + 4 * external_tables.bits().count_ones() as usize
        } else {
            0
        };

        let padded_version_length = align_to_4_bytes(version.len() + 1);
        let mut metadata_header_size = 16 + padded_version_length + 4;
        for name in ["#~", "#Strings", "#US", "#GUID", "#Blob"] {
            metadata_header_size += stream_header_size(name);
        }
        if is_enc_delta {
            metadata_header_size += stream_header_size("#JTD");
        }
        if is_standalone_debug {
            metadata_header_size += stream_header_size("#Pdb");
        }

        let sizes = MetadataSizes {
            references,
            row_counts: *row_counts,
            external_row_counts: *external_row_counts,
            heap_sizes,
            present_tables,
            external_tables,
            is_standalone_debug,
            padded_version_length,
            metadata_header_size,
            table_stream_size,
            standalone_pdb_stream_size,
        };

        tracing::debug!(
            present_tables = sizes.present_tables.bits().count_ones(),
            enc_delta = is_enc_delta,
            heap_flags = sizes.references.heap_flags().bits(),
            table_stream_size,
            storage_size = sizes.metadata_stream_storage_size(),
            "computed metadata layout"
        );

        sizes
    }

    /// Fixed part of the table-stream header before the row counts.
    pub const TABLE_STREAM_HEADER_SIZE: usize = 24;

    /// Resolved reference widths.
    #[must_use]
    pub fn references(&self) -> &ReferenceSizes {
        &self.references
    }

    /// Rows of `table` in this image.
    #[must_use]
    pub fn row_count(&self, table: TableId) -> u32 {
        self.row_counts[table.index()]
    }

    /// Rows of `table` in the external image.
    #[must_use]
    pub fn external_row_count(&self, table: TableId) -> u32 {
        self.external_row_counts[table.index()]
    }

    /// Row counts of all tables of this image.
    #[must_use]
    pub fn row_counts(&self) -> &[u32; TABLE_SLOTS] {
        &self.row_counts
    }

    /// Tables with at least one row, the valid mask of the table-stream header.
    #[must_use]
    pub fn present_tables(&self) -> TableMask {
        self.present_tables
    }

    /// True if `table` has rows in this image.
    #[must_use]
    pub fn is_present(&self, table: TableId) -> bool {
        self.present_tables.contains(table.mask())
    }

    /// Tables with rows in the external image.
    #[must_use]
    pub fn external_tables(&self) -> TableMask {
        self.external_tables
    }

    /// True if the tables form an edit-and-continue delta.
    #[must_use]
    pub fn is_enc_delta(&self) -> bool {
        self.references.is_enc_delta()
    }

    /// True for a standalone Portable PDB.
    #[must_use]
    pub fn is_standalone_debug(&self) -> bool {
        self.is_standalone_debug
    }

    /// Unaligned size of `heap`.
    #[must_use]
    pub fn heap_size(&self, heap: HeapIndex) -> usize {
        self.heap_sizes[heap.index()]
    }

    /// Size of `heap` padded to 4 bytes, as stored in the image.
    #[must_use]
    pub fn aligned_heap_size(&self, heap: HeapIndex) -> usize {
        align_to_4_bytes(self.heap_sizes[heap.index()])
    }

    /// Length of the version string including its terminator and padding.
    #[must_use]
    pub fn padded_version_length(&self) -> usize {
        self.padded_version_length
    }

    /// Size of the metadata root header including all stream headers.
    #[must_use]
    pub fn metadata_header_size(&self) -> usize {
        self.metadata_header_size
    }

    /// Size of the `#~` or `#-` stream, 4-byte aligned.
    #[must_use]
    pub fn table_stream_size(&self) -> usize {
        self.table_stream_size
    }

    /// Size of the `#Pdb` stream, 0 unless standalone debug metadata.
    #[must_use]
    pub fn standalone_pdb_stream_size(&self) -> usize {
        self.standalone_pdb_stream_size
    }

    /// Size of all streams following the root header.
    #[must_use]
    pub fn metadata_stream_storage_size(&self) -> usize {
        self.standalone_pdb_stream_size
            + self.table_stream_size
            + HeapIndex::iter()
                .map(|heap| self.aligned_heap_size(heap))
                .sum::<usize>()
    }

    /// Size of the complete metadata image.
    #[must_use]
    pub fn metadata_size(&self) -> usize {
        self.metadata_header_size + self.metadata_stream_storage_size()
    }

    /// Size of the table-stream body: header, row counts and rows, before the terminator.
    #[must_use]
    pub fn table_data_end(&self) -> usize {
        let mut size = Self::TABLE_STREAM_HEADER_SIZE
            + 4 * self.present_tables.bits().count_ones() as usize;
        for table in self.present_tables.tables() {
            size += self.references.row_size(table) as usize * self.row_count(table) as usize;
        }
        size
    }
}
