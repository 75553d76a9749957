//! Metadata table identifiers, column layouts and coded indices.
//!
//! The physical row storage lives in [`crate::metadata::streams::TablesHeader`] on the read side
//! and [`crate::builder::TableRows`] on the write side; both interpret rows through the layout
//! described here.

mod codedindex;
mod schema;
mod tableid;

pub use codedindex::CodedIndexType;
pub use schema::{Column, SortKey, SortOrder};
pub use tableid::{TableId, TableMask, TABLE_SLOTS};
