//! Serialization of a complete metadata image.
//!
//! [`MetadataRootBuilder`] freezes the content of a [`MetadataBuilder`]: it lays out the
//! `#Strings` heap, validates the order of sorted tables and computes the [`MetadataSizes`].
//! [`MetadataRootBuilder::serialize`] then writes, without further decisions:
//!
//! ```text
//! root header         signature, version string, stream count
//! stream headers      [#Pdb] #~|#- #Strings #US #GUID #Blob [#JTD]
//! [#Pdb]              id, entry point, external tables
//! #~ | #-             table stream, 4-byte aligned
//! #Strings #US #GUID #Blob
//!                     each 4-byte aligned
//! ```

use crate::{
    blob::{Blob, BlobBuilder},
    builder::{MetadataBuilder, SerializedHeaps, TableRows},
    metadata::{
        handles::EntityHandle,
        root::{CIL_HEADER_MAGIC, MAX_VERSION_LENGTH},
        sizes::{HeapIndex, MetadataSizes},
        streams::{StreamHeader, PDB_ID_SIZE},
        tables::{TableId, TableMask, TABLE_SLOTS},
    },
    utils::to_u32,
    Result,
};

/// Metadata version of a CLR 4 image, used unless another version is requested
pub const DEFAULT_METADATA_VERSION: &str = "v4.0.30319";

/// Metadata version of a standalone Portable PDB
pub const PORTABLE_PDB_VERSION: &str = "PDB v1.0";

/// Order in which heaps follow the table stream
const HEAP_ORDER: [HeapIndex; 4] = [
    HeapIndex::String,
    HeapIndex::UserString,
    HeapIndex::Guid,
    HeapIndex::Blob,
];

/// Serializer of a metadata image.
///
/// # Example
///
/// ```rust
/// use metascope::{
///     builder::{MetadataBuilder, MetadataRootBuilder, RowValue},
///     metadata::tables::TableId,
///     BlobBuilder,
/// };
///
/// let mut metadata = MetadataBuilder::new();
/// let name = metadata.intern_string("Lib");
/// metadata.add_row(TableId::ModuleRef, vec![RowValue::String(name)])?;
///
/// let root = MetadataRootBuilder::new(metadata, None, false)?;
/// let mut image = BlobBuilder::new();
/// let sizes = root.serialize(&mut image)?;
/// assert_eq!(image.count(), sizes.metadata_size());
/// # Ok::<(), metascope::Error>(())
/// ```
#[derive(Debug)]
pub struct MetadataRootBuilder {
    heaps: SerializedHeaps,
    tables: TableRows,
    sizes: MetadataSizes,
    version: String,
    suppress_validation: bool,
}

impl MetadataRootBuilder {
    /// Prepare `builder` for serialization.
    ///
    /// ## Arguments
    /// * `builder` - Tables and heaps of the image
    /// * `version` - Metadata version string, [`DEFAULT_METADATA_VERSION`] if `None`
    /// * `suppress_validation` - Skip checking the order of sorted tables
    ///
    /// # Errors
    /// Returns [`crate::Error::ArgumentOutOfRange`] if the version exceeds 254 bytes or a heap is
    /// too large, and [`crate::Error::InvalidOperation`] if a sorted table is out of order.
    pub fn new(
        builder: MetadataBuilder,
        version: Option<&str>,
        suppress_validation: bool,
    ) -> Result<Self> {
        Self::with_layout(
            builder,
            version.unwrap_or(DEFAULT_METADATA_VERSION),
            &[0; TABLE_SLOTS],
            false,
            suppress_validation,
        )
    }

    pub(crate) fn with_layout(
        builder: MetadataBuilder,
        version: &str,
        external_row_counts: &[u32; TABLE_SLOTS],
        is_standalone_debug: bool,
        suppress_validation: bool,
    ) -> Result<Self> {
        if version.len() > MAX_VERSION_LENGTH {
            return Err(argument_error!(
                "Metadata version exceeds {} bytes - {}",
                MAX_VERSION_LENGTH,
                version.len()
            ));
        }

        let (heaps, tables) = builder.into_parts();
        let heaps = heaps.finish()?;
        if !suppress_validation {
            tables.validate_order(&heaps)?;
        }

        let sizes = MetadataSizes::new(
            &tables.row_counts(),
            external_row_counts,
            heaps.heap_sizes(),
            version,
            is_standalone_debug,
        );

        Ok(MetadataRootBuilder {
            heaps,
            tables,
            sizes,
            version: version.to_string(),
            suppress_validation,
        })
    }

    /// The layout the image will be written with
    #[must_use]
    pub fn sizes(&self) -> &MetadataSizes {
        &self.sizes
    }

    /// The metadata version string
    #[must_use]
    pub fn metadata_version(&self) -> &str {
        &self.version
    }

    /// True if sorted tables were not checked
    #[must_use]
    pub fn suppress_validation(&self) -> bool {
        self.suppress_validation
    }

    /// Append the metadata image to `out` and return its layout.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if `out` has been linked or a row value does
    /// not fit its column.
    pub fn serialize(&self, out: &mut BlobBuilder) -> Result<&MetadataSizes> {
        self.serialize_with(out, EntityHandle::nil(TableId::MethodDef))?;
        Ok(&self.sizes)
    }

    /// Append the image; returns the reserved PDB id of a standalone Portable PDB.
    pub(crate) fn serialize_with(
        &self,
        out: &mut BlobBuilder,
        entry_point: EntityHandle,
    ) -> Result<Option<Blob>> {
        let sizes = &self.sizes;
        let start = out.count();

        out.write_le(CIL_HEADER_MAGIC)?;
        out.write_le(1u16)?;
        out.write_le(1u16)?;
        out.write_le(0u32)?;
        out.write_le(to_u32(sizes.padded_version_length())?)?;
        out.write_utf8(&self.version)?;
        out.write_fill(0, sizes.padded_version_length() - self.version.len())?;
        out.write_le(0u16)?;

        let headers = self.stream_headers()?;
        out.write_le(headers.len() as u16)?;
        for header in &headers {
            header.write_to(out)?;
        }
        debug_assert_eq!(out.count() - start, sizes.metadata_header_size());

        let pdb_id = if sizes.is_standalone_debug() {
            Some(self.write_pdb_stream(out, entry_point)?)
        } else {
            None
        };

        self.write_table_stream(out)?;

        for heap in HEAP_ORDER {
            let heap_start = out.count();
            out.write_builder(self.heaps.heap(heap))?;
            out.pad_to(heap_start + sizes.aligned_heap_size(heap))?;
        }
        debug_assert_eq!(out.count() - start, sizes.metadata_size());

        tracing::debug!(
            version = %self.version,
            streams = headers.len(),
            tables = sizes.present_tables().bits().count_ones(),
            enc_delta = sizes.is_enc_delta(),
            size = out.count() - start,
            "serialized metadata"
        );

        Ok(pdb_id)
    }

    fn stream_headers(&self) -> Result<Vec<StreamHeader>> {
        let sizes = &self.sizes;

        let mut streams: Vec<(&str, usize)> = Vec::with_capacity(7);
        if sizes.is_standalone_debug() {
            streams.push(("#Pdb", sizes.standalone_pdb_stream_size()));
        }
        streams.push((
            if sizes.is_enc_delta() { "#-" } else { "#~" },
            sizes.table_stream_size(),
        ));
        for heap in HEAP_ORDER {
            streams.push((heap.stream_name(), sizes.aligned_heap_size(heap)));
        }
        if sizes.is_enc_delta() {
            streams.push(("#JTD", 0));
        }

        let mut offset = sizes.metadata_header_size();
        let mut headers = Vec::with_capacity(streams.len());
        for (name, size) in streams {
            headers.push(StreamHeader {
                offset: to_u32(offset)?,
                size: to_u32(size)?,
                name: name.to_string(),
            });
            offset += size;
        }
        Ok(headers)
    }

    fn write_pdb_stream(&self, out: &mut BlobBuilder, entry_point: EntityHandle) -> Result<Blob> {
        let sizes = &self.sizes;
        let start = out.count();

        let id = out.reserve(PDB_ID_SIZE)?;
        out.write_le(if entry_point.is_nil() {
            0
        } else {
            entry_point.to_token()
        })?;
        out.write_le(sizes.external_tables().bits())?;
        for table in sizes.external_tables().tables() {
            out.write_le(sizes.external_row_count(table))?;
        }

        debug_assert_eq!(out.count() - start, sizes.standalone_pdb_stream_size());
        Ok(id)
    }

    fn write_table_stream(&self, out: &mut BlobBuilder) -> Result<()> {
        let sizes = &self.sizes;
        let start = out.count();

        let sorted = if sizes.is_standalone_debug() {
            TableMask::SORTED_DEBUG
        } else {
            TableMask::SORTED_TYPE_SYSTEM | TableMask::SORTED_DEBUG
        };

        out.write_le(0u32)?;
        out.write_u8(2)?;
        out.write_u8(0)?;
        out.write_u8(sizes.references().heap_flags().bits())?;
        out.write_u8(1)?;
        out.write_le(sizes.present_tables().bits())?;
        out.write_le(sorted.bits())?;
        for table in sizes.present_tables().tables() {
            out.write_le(sizes.row_count(table))?;
        }

        self.tables.serialize(sizes, &self.heaps, out)?;
        debug_assert_eq!(out.count() - start, sizes.table_data_end());

        out.write_u8(0)?;
        out.pad_to(start + sizes.table_stream_size())
    }
}
