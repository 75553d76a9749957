//! Row storage for the metadata tables of an image under construction.
//!
//! Rows are kept as typed [`RowValue`]s and checked against [`TableId::columns`] when they are
//! added. Their encoded form depends on the final heap layout and on the reference widths of the
//! whole image, so rows are only turned into bytes by [`TableRows::serialize`], after
//! [`crate::metadata::sizes::MetadataSizes`] has been computed.

use std::cmp::Ordering;

use strum::IntoEnumIterator;

use crate::{
    blob::BlobBuilder,
    builder::SerializedHeaps,
    metadata::{
        handles::{BlobHandle, EntityHandle, GuidHandle, StringHandle, RID_MASK},
        sizes::{HeapIndex, MetadataSizes},
        tables::{Column, SortKey, TableId, TABLE_SLOTS},
    },
    Result,
};

/// The value of one column of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowValue {
    /// Constant of a fixed-width column
    Int(u32),
    /// Row of a table or coded-index column
    Entity(EntityHandle),
    /// `#Strings` entry
    String(StringHandle),
    /// `#Blob` entry
    Blob(BlobHandle),
    /// `#GUID` entry
    Guid(GuidHandle),
}

/// The rows of every table, in insertion order.
///
/// # Example
///
/// ```rust
/// use metascope::{
///     builder::{RowValue, TableRows},
///     metadata::{handles::EntityHandle, tables::TableId},
/// };
///
/// let mut tables = TableRows::new();
/// let module_ref = tables.add_row(
///     TableId::ModuleRef,
///     vec![RowValue::String(Default::default())],
/// )?;
///
/// assert_eq!(module_ref, EntityHandle::new(TableId::ModuleRef, 1));
/// assert!(tables.add_row(TableId::ModuleRef, vec![RowValue::Int(1)]).is_err());
/// # Ok::<(), metascope::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct TableRows {
    rows: Vec<Vec<Box<[RowValue]>>>,
}

impl TableRows {
    /// Create empty tables
    #[must_use]
    pub fn new() -> Self {
        TableRows {
            rows: vec![Vec::new(); TABLE_SLOTS],
        }
    }

    /// Append a row to `table` and return its handle.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if the values do not match the columns of the
    /// table, and [`crate::Error::ArgumentOutOfRange`] if a constant does not fit its column or the
    /// table is full.
    pub fn add_row(&mut self, table: TableId, values: Vec<RowValue>) -> Result<EntityHandle> {
        let columns = table.columns();
        if values.len() != columns.len() {
            return Err(invalid_operation!(
                "{:?} rows have {} columns, got {}",
                table,
                columns.len(),
                values.len()
            ));
        }

        for (index, (column, value)) in columns.iter().zip(&values).enumerate() {
            check_value(table, index, *column, *value)?;
        }

        let rows = &mut self.rows[table.index()];
        if rows.len() >= RID_MASK as usize {
            return Err(argument_error!("{:?} exceeds {} rows", table, RID_MASK));
        }

        rows.push(values.into_boxed_slice());
        Ok(EntityHandle::new(table, rows.len() as u32))
    }

    /// Rows of `table`
    #[must_use]
    pub fn row_count(&self, table: TableId) -> u32 {
        self.rows[table.index()].len() as u32
    }

    /// Rows of every table, indexed by table number
    #[must_use]
    pub fn row_counts(&self) -> [u32; TABLE_SLOTS] {
        let mut counts = [0; TABLE_SLOTS];
        for table in TableId::iter() {
            counts[table.index()] = self.row_count(table);
        }
        counts
    }

    /// The values of row `row_id` of `table`, `None` if it does not exist
    #[must_use]
    pub fn row(&self, table: TableId, row_id: u32) -> Option<&[RowValue]> {
        let index = (row_id as usize).checked_sub(1)?;
        self.rows[table.index()].get(index).map(AsRef::as_ref)
    }

    /// Check that every sorted table is ordered by its key, using the final encoded values.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for the first table that is out of order or
    /// repeats a key that has to be unique.
    pub fn validate_order(&self, heaps: &SerializedHeaps) -> Result<()> {
        for table in TableId::iter() {
            let Some(order) = table.sort_order() else {
                continue;
            };

            let columns = table.columns();
            let mut previous: Option<Vec<u32>> = None;
            for (index, row) in self.rows[table.index()].iter().enumerate() {
                let key = order
                    .keys
                    .iter()
                    .map(|key| encode(columns[key.column], row[key.column], heaps))
                    .collect::<Result<Vec<u32>>>()?;

                if let Some(previous) = &previous {
                    match compare_keys(order.keys, previous, &key) {
                        Ordering::Greater => {
                            return Err(invalid_operation!(
                                "{:?} is not sorted at row {}",
                                table,
                                index + 1
                            ))
                        }
                        Ordering::Equal if order.unique => {
                            return Err(invalid_operation!(
                                "{:?} repeats the key of row {} at row {}",
                                table,
                                index,
                                index + 1
                            ))
                        }
                        _ => {}
                    }
                }
                previous = Some(key);
            }
        }
        Ok(())
    }

    /// Write the rows of every present table, in table order, using the widths of `sizes`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if a handle cannot be resolved against `heaps`
    /// or a value does not fit the width chosen for its column.
    pub fn serialize(
        &self,
        sizes: &MetadataSizes,
        heaps: &SerializedHeaps,
        out: &mut BlobBuilder,
    ) -> Result<()> {
        let references = sizes.references();
        for table in sizes.present_tables().tables() {
            let columns = table.columns();
            for row in &self.rows[table.index()] {
                for (column, value) in columns.iter().zip(row.iter()) {
                    let encoded = encode(*column, *value, heaps)?;
                    match references.column_size(*column) {
                        1 => out.write_u8(narrow(table, *column, encoded, 0xFF)? as u8)?,
                        2 => out.write_le(narrow(table, *column, encoded, 0xFFFF)? as u16)?,
                        _ => out.write_le(encoded)?,
                    }
                }
            }
        }
        Ok(())
    }
}

impl Default for TableRows {
    fn default() -> Self {
        Self::new()
    }
}

fn narrow(table: TableId, column: Column, value: u32, max: u32) -> Result<u32> {
    if value > max {
        return Err(invalid_operation!(
            "{:?} value {:#x} does not fit its {:?} column",
            table,
            value,
            column
        ));
    }
    Ok(value)
}

fn compare_keys(keys: &[SortKey], x: &[u32], y: &[u32]) -> Ordering {
    for (key, (a, b)) in keys.iter().zip(x.iter().zip(y)) {
        let ordering = if key.descending { b.cmp(a) } else { a.cmp(b) };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn check_value(table: TableId, index: usize, column: Column, value: RowValue) -> Result<()> {
    let valid = match (column, value) {
        (Column::Fixed(width), RowValue::Int(constant)) => {
            if width < 4 && constant >> (u32::from(width) * 8) != 0 {
                return Err(argument_error!(
                    "{:?} column {} holds {} bytes - {:#x}",
                    table,
                    index,
                    width,
                    constant
                ));
            }
            true
        }
        (Column::Table(target), RowValue::Entity(handle)) => {
            !handle.is_virtual() && (handle.is_nil() || handle.table() == target)
        }
        (Column::Coded(coded), RowValue::Entity(handle)) => coded.encode(handle).is_ok(),
        (Column::Heap(HeapIndex::String), RowValue::String(_)) => true,
        (Column::Heap(HeapIndex::Blob), RowValue::Blob(handle)) => !handle.is_virtual(),
        (Column::Heap(HeapIndex::Guid), RowValue::Guid(handle)) => !handle.is_virtual(),
        _ => false,
    };

    if !valid {
        return Err(invalid_operation!(
            "{:?} column {} ({:?}) cannot hold {:?}",
            table,
            index,
            column,
            value
        ));
    }
    Ok(())
}

fn encode(column: Column, value: RowValue, heaps: &SerializedHeaps) -> Result<u32> {
    match (column, value) {
        (Column::Coded(coded), RowValue::Entity(handle)) => coded.encode(handle),
        (_, RowValue::Int(constant)) => Ok(constant),
        (_, RowValue::Entity(handle)) => Ok(handle.row_id()),
        (_, RowValue::String(handle)) => heaps.string_offset(handle),
        (_, RowValue::Blob(handle)) => Ok(handle.offset().unwrap_or(0)),
        (_, RowValue::Guid(handle)) => Ok(handle.offset().unwrap_or(0)),
    }
}
