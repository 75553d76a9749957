//! Entry point for reading a metadata image.
//!
//! [`MetadataReader`] parses the root, locates the streams and validates the table stream, so
//! that every view it hands out refers to consistent, bounds-checked data. It is the decode-side
//! counterpart of [`crate::builder::MetadataRootBuilder`].
//!
//! # Example
//!
//! ```rust
//! use metascope::{
//!     builder::{MetadataBuilder, MetadataRootBuilder, RowValue},
//!     metadata::{tables::TableId, MetadataReader},
//!     BlobBuilder,
//! };
//!
//! let mut metadata = MetadataBuilder::new();
//! let name = metadata.intern_string("Sample.dll");
//! let mvid = uguid::guid!("d437908e-65e6-487c-9735-7bdff699bea5");
//! let mvid_handle = metadata.intern_guid(mvid)?;
//! metadata.add_row(
//!     TableId::Module,
//!     vec![
//!         RowValue::Int(0),
//!         RowValue::String(name),
//!         RowValue::Guid(mvid_handle),
//!         RowValue::Guid(Default::default()),
//!         RowValue::Guid(Default::default()),
//!     ],
//! )?;
//!
//! let root = MetadataRootBuilder::new(metadata, None, false)?;
//! let mut image = BlobBuilder::new();
//! root.serialize(&mut image)?;
//! let bytes = image.to_vec()?;
//!
//! let reader = MetadataReader::read(&bytes)?;
//! let module = reader.tables().table(TableId::Module).unwrap().row(1)?;
//! assert_eq!(reader.strings().resolve(module.string(1)?)?, "Sample.dll");
//! assert_eq!(reader.guids().resolve(module.guid(2)?)?, mvid);
//! # Ok::<(), metascope::Error>(())
//! ```

use crate::{
    metadata::{
        root::Root,
        sizes::HeapSizeFlags,
        streams::{Blobs, Guids, PdbStream, Strings, TablesHeader, UserStrings},
        tables::TABLE_SLOTS,
    },
    Result,
};

/// A parsed metadata image.
#[derive(Debug, Clone)]
pub struct MetadataReader<'a> {
    data: &'a [u8],
    root: Root,
    tables: TablesHeader<'a>,
    strings: Strings<'a>,
    blobs: Blobs<'a>,
    guids: Guids<'a>,
    user_strings: UserStrings<'a>,
    pdb: Option<PdbStream>,
    is_minimal_delta: bool,
    is_uncompressed: bool,
}

impl<'a> MetadataReader<'a> {
    /// Parse the metadata image in `data`, starting with the `BSJB` root.
    ///
    /// Streams with names this reader does not know are ignored.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] or [`crate::Error::OutOfBounds`] for any structural
    /// inconsistency: bad root, missing or duplicate table stream, invalid heaps, an invalid
    /// `#Pdb` stream or table stream.
    pub fn read(data: &'a [u8]) -> Result<Self> {
        let root = Root::read(data)?;

        let mut table_stream = None;
        let mut is_uncompressed = false;
        let mut is_minimal_delta = false;
        let mut strings = &[][..];
        let mut blobs = &[][..];
        let mut guids = &[][..];
        let mut user_strings = &[][..];
        let mut pdb_stream = None;

        for header in &root.stream_headers {
            let Some(stream) = root.stream_data(data, &header.name) else {
                return Err(out_of_bounds_error!());
            };

            match header.name.as_str() {
                "#~" | "#-" => {
                    if table_stream.is_some() {
                        return Err(malformed_error!("Metadata holds two table streams"));
                    }
                    is_uncompressed = header.name == "#-";
                    table_stream = Some(stream);
                }
                "#Strings" => strings = stream,
                "#Blob" => blobs = stream,
                "#GUID" => guids = stream,
                "#US" => user_strings = stream,
                "#Pdb" => pdb_stream = Some(stream),
                "#JTD" => is_minimal_delta = true,
                unknown => {
                    tracing::debug!(
                        name = unknown,
                        offset = header.offset,
                        size = header.size,
                        "ignoring unknown metadata stream"
                    );
                }
            }
        }

        let Some(table_stream) = table_stream else {
            return Err(malformed_error!("Metadata holds no table stream"));
        };

        let pdb = pdb_stream.map(PdbStream::read).transpose()?;
        let external_row_counts = pdb
            .as_ref()
            .map_or([0; TABLE_SLOTS], |pdb| pdb.external_row_counts);

        let forced = if is_minimal_delta {
            HeapSizeFlags::ENC_DELTAS
        } else {
            HeapSizeFlags::empty()
        };
        let tables = TablesHeader::read_with_flags(table_stream, &external_row_counts, forced)?;

        Ok(MetadataReader {
            data,
            strings: Strings::from(strings)?,
            blobs: Blobs::from(blobs)?,
            guids: Guids::from(guids)?,
            user_strings: UserStrings::from(user_strings)?,
            root,
            tables,
            pdb,
            is_minimal_delta,
            is_uncompressed,
        })
    }

    /// The complete image
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// The metadata root and stream directory
    #[must_use]
    pub fn root(&self) -> &Root {
        &self.root
    }

    /// The metadata version string, e.g. `v4.0.30319` or `PDB v1.0`
    #[must_use]
    pub fn metadata_version(&self) -> &str {
        &self.root.version
    }

    /// The table stream
    #[must_use]
    pub fn tables(&self) -> &TablesHeader<'a> {
        &self.tables
    }

    /// The `#Strings` heap, empty if absent
    #[must_use]
    pub fn strings(&self) -> &Strings<'a> {
        &self.strings
    }

    /// The `#Blob` heap, empty if absent
    #[must_use]
    pub fn blobs(&self) -> &Blobs<'a> {
        &self.blobs
    }

    /// The `#GUID` heap, empty if absent
    #[must_use]
    pub fn guids(&self) -> &Guids<'a> {
        &self.guids
    }

    /// The `#US` heap, empty if absent
    #[must_use]
    pub fn user_strings(&self) -> &UserStrings<'a> {
        &self.user_strings
    }

    /// The `#Pdb` stream of a standalone Portable PDB
    #[must_use]
    pub fn pdb(&self) -> Option<&PdbStream> {
        self.pdb.as_ref()
    }

    /// True for a standalone Portable PDB
    #[must_use]
    pub fn is_standalone_debug(&self) -> bool {
        self.pdb.is_some()
    }

    /// True if the image carries the `#JTD` marker of a minimal edit-and-continue delta
    #[must_use]
    pub fn is_minimal_delta(&self) -> bool {
        self.is_minimal_delta
    }

    /// True if the tables are stored in the uncompressed `#-` stream
    #[must_use]
    pub fn is_uncompressed(&self) -> bool {
        self.is_uncompressed
    }
}
