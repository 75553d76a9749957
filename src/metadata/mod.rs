//! ECMA-335 metadata: handles, tables, streams and their layout.
//!
//! # Key Components
//!
//! - [`handles`] - Bit-packed references to table rows and heap entries
//! - [`tables`] - Table identifiers, column schema and coded indices
//! - [`sizes`] - Reference widths and the byte layout of every stream
//! - [`streams`] - Readers for the table stream, the four heaps and the `#Pdb` stream
//! - [`root`] - The metadata root header and stream directory
//! - [`MetadataReader`] - Validated access to a complete metadata image
//!
//! The write side lives in [`crate::builder`] and shares [`tables`], [`handles`] and [`sizes`]
//! with the readers here, so both directions agree on every width decision.
//!
//! # References
//! - [ECMA-335 6th Edition, Partition II](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)
//! - [Portable PDB v1.0](https://github.com/dotnet/runtime/blob/main/docs/design/specs/PortablePdb-Metadata.md)

pub mod handles;
pub mod root;
pub mod sizes;
pub mod streams;
pub mod tables;

mod reader;

pub use reader::MetadataReader;
