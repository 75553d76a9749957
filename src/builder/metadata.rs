use crate::{
    blob::BlobBuilder,
    builder::{HeapBuilder, RowValue, TableRows},
    metadata::{
        handles::{BlobHandle, EntityHandle, GuidHandle, StringHandle, UserStringHandle},
        tables::TableId,
    },
    Result,
};

/// Tables and heaps of one metadata image under construction.
///
/// The content is handed to [`crate::builder::MetadataRootBuilder`] or
/// [`crate::builder::PortablePdbBuilder`] for serialization.
#[derive(Debug, Default)]
pub struct MetadataBuilder {
    heaps: HeapBuilder,
    tables: TableRows,
}

impl MetadataBuilder {
    /// Create an empty image
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The heap accumulator
    #[must_use]
    pub fn heaps(&self) -> &HeapBuilder {
        &self.heaps
    }

    /// The heap accumulator, for interning
    pub fn heaps_mut(&mut self) -> &mut HeapBuilder {
        &mut self.heaps
    }

    /// The table rows
    #[must_use]
    pub fn tables(&self) -> &TableRows {
        &self.tables
    }

    /// See [`HeapBuilder::intern_string`]
    pub fn intern_string(&mut self, text: &str) -> StringHandle {
        self.heaps.intern_string(text)
    }

    /// See [`HeapBuilder::intern_user_string`]
    ///
    /// # Errors
    /// Returns [`crate::Error::ArgumentOutOfRange`] if the `#US` heap is full
    pub fn intern_user_string(&mut self, text: &str) -> Result<UserStringHandle> {
        self.heaps.intern_user_string(text)
    }

    /// See [`HeapBuilder::intern_blob`]
    ///
    /// # Errors
    /// Returns [`crate::Error::ArgumentOutOfRange`] if the `#Blob` heap is full
    pub fn intern_blob(&mut self, content: &[u8]) -> Result<BlobHandle> {
        self.heaps.intern_blob(content)
    }

    /// See [`HeapBuilder::intern_blob_builder`]
    ///
    /// # Errors
    /// Returns [`crate::Error::ArgumentOutOfRange`] if the `#Blob` heap is full
    pub fn intern_blob_builder(&mut self, builder: &BlobBuilder) -> Result<BlobHandle> {
        self.heaps.intern_blob_builder(builder)
    }

    /// See [`HeapBuilder::intern_document_name`]
    ///
    /// # Errors
    /// Returns [`crate::Error::ArgumentOutOfRange`] if the `#Blob` heap is full
    pub fn intern_document_name(&mut self, name: &str) -> Result<BlobHandle> {
        self.heaps.intern_document_name(name)
    }

    /// See [`HeapBuilder::intern_guid`]
    ///
    /// # Errors
    /// Returns [`crate::Error::ArgumentOutOfRange`] if the `#GUID` heap is full
    pub fn intern_guid(&mut self, guid: uguid::Guid) -> Result<GuidHandle> {
        self.heaps.intern_guid(guid)
    }

    /// See [`TableRows::add_row`]
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if the values do not match the table's columns
    pub fn add_row(&mut self, table: TableId, values: Vec<RowValue>) -> Result<EntityHandle> {
        self.tables.add_row(table, values)
    }

    /// Rows of `table`
    #[must_use]
    pub fn row_count(&self, table: TableId) -> u32 {
        self.tables.row_count(table)
    }

    /// Split into heaps and tables
    #[must_use]
    pub fn into_parts(self) -> (HeapBuilder, TableRows) {
        (self.heaps, self.tables)
    }
}
