//! Serialization of standalone Portable PDB metadata.
//!
//! A standalone PDB holds only debug tables. Its rows reference type-system rows of the
//! executable it describes, so the `#Pdb` stream records the row counts of those external tables,
//! and reference widths are derived from them as if the tables were local.

use std::fmt;

use crate::{
    blob::BlobBuilder,
    builder::{root::PORTABLE_PDB_VERSION, ContentId, MetadataBuilder, MetadataRootBuilder},
    metadata::{
        handles::{EntityHandle, RID_MASK},
        sizes::MetadataSizes,
        tables::{TableId, TableMask, TABLE_SLOTS},
    },
    Result,
};

/// Computes the id of a serialized PDB from the content written so far.
///
/// The 20 id bytes inside the content are zero when the provider runs.
pub type IdProvider = Box<dyn Fn(&BlobBuilder) -> Result<ContentId> + Send + Sync>;

/// Serializer of a standalone Portable PDB.
///
/// # Example
///
/// ```rust
/// use metascope::{
///     builder::{MetadataBuilder, PortablePdbBuilder, RowValue},
///     metadata::{handles::EntityHandle, tables::{TableId, TABLE_SLOTS}, MetadataReader},
///     BlobBuilder,
/// };
///
/// let mut metadata = MetadataBuilder::new();
/// let name = metadata.intern_document_name("/src/Program.cs")?;
/// metadata.add_row(
///     TableId::Document,
///     vec![
///         RowValue::Blob(name),
///         RowValue::Guid(Default::default()),
///         RowValue::Blob(Default::default()),
///         RowValue::Guid(Default::default()),
///     ],
/// )?;
///
/// let mut type_system = [0u32; TABLE_SLOTS];
/// type_system[TableId::MethodDef.index()] = 3;
///
/// let entry_point = EntityHandle::new(TableId::MethodDef, 1);
/// let pdb = PortablePdbBuilder::new(metadata, &type_system, entry_point)?;
///
/// let mut out = BlobBuilder::new();
/// let id = pdb.serialize(&mut out)?;
///
/// let bytes = out.to_vec()?;
/// let reader = MetadataReader::read(&bytes)?;
/// let stream = reader.pdb().unwrap();
/// assert_eq!(stream.id, id.to_bytes());
/// assert_eq!(stream.entry_point, entry_point);
/// # Ok::<(), metascope::Error>(())
/// ```
pub struct PortablePdbBuilder {
    root: MetadataRootBuilder,
    entry_point: EntityHandle,
    id_provider: Option<IdProvider>,
}

impl PortablePdbBuilder {
    /// Prepare the debug tables in `builder` for serialization.
    ///
    /// ## Arguments
    /// * `builder` - Debug tables and heaps
    /// * `external_row_counts` - Row counts of the type-system tables of the described image
    /// * `entry_point` - Entry point method of the image, or a nil handle
    ///
    /// # Errors
    /// Returns [`crate::Error::ArgumentOutOfRange`] if the entry point is not a `MethodDef` row,
    /// a table outside the externally referenceable set has external rows, an external row count
    /// exceeds 24 bits, or a table has both local and external rows. Returns
    /// [`crate::Error::InvalidOperation`] if a sorted debug table is out of order.
    pub fn new(
        builder: MetadataBuilder,
        external_row_counts: &[u32; TABLE_SLOTS],
        entry_point: EntityHandle,
    ) -> Result<Self> {
        if entry_point.is_virtual() || (!entry_point.is_nil() && entry_point.table() != TableId::MethodDef)
        {
            return Err(argument_error!(
                "Entry point must be a MethodDef - {:?}",
                entry_point
            ));
        }

        for (index, &rows) in external_row_counts.iter().enumerate() {
            if rows == 0 {
                continue;
            }

            let table = u8::try_from(index).ok().and_then(TableId::from_u8);
            let Some(table) = table.filter(|table| TableMask::VALID_EXTERNAL.contains(table.mask()))
            else {
                return Err(argument_error!(
                    "Table {:#04x} cannot have external rows",
                    index
                ));
            };

            if rows > RID_MASK {
                return Err(argument_error!(
                    "External row count of {:?} exceeds 24 bits - {}",
                    table,
                    rows
                ));
            }
            if builder.row_count(table) > 0 {
                return Err(argument_error!(
                    "{:?} has both local and external rows",
                    table
                ));
            }
        }

        Ok(PortablePdbBuilder {
            root: MetadataRootBuilder::with_layout(
                builder,
                PORTABLE_PDB_VERSION,
                external_row_counts,
                true,
                false,
            )?,
            entry_point,
            id_provider: None,
        })
    }

    /// Replace the default id, the [`ContentId::from_content`] hash of the output.
    #[must_use]
    pub fn with_id_provider(
        mut self,
        provider: impl Fn(&BlobBuilder) -> Result<ContentId> + Send + Sync + 'static,
    ) -> Self {
        self.id_provider = Some(Box::new(provider));
        self
    }

    /// The layout the PDB will be written with
    #[must_use]
    pub fn sizes(&self) -> &MetadataSizes {
        self.root.sizes()
    }

    /// The entry point recorded in the `#Pdb` stream
    #[must_use]
    pub fn entry_point(&self) -> EntityHandle {
        self.entry_point
    }

    /// Append the PDB metadata to `out`, then compute and fill in its id.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if `out` has been linked, and any error of the
    /// id provider.
    pub fn serialize(&self, out: &mut BlobBuilder) -> Result<ContentId> {
        let reserved = self.root.serialize_with(out, self.entry_point)?;

        let id = match &self.id_provider {
            Some(provider) => provider(out)?,
            None => ContentId::from_content(out)?,
        };

        if let Some(reserved) = reserved {
            out.reserved_writer(&reserved)?.write_bytes(&id.to_bytes())?;
        }
        Ok(id)
    }
}

impl fmt::Debug for PortablePdbBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortablePdbBuilder")
            .field("root", &self.root)
            .field("entry_point", &self.entry_point)
            .field("custom_id", &self.id_provider.is_some())
            .finish()
    }
}
