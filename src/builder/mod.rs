//! Construction and serialization of metadata images.
//!
//! Building an image is split in two phases:
//!
//! - **Accumulation** - [`MetadataBuilder`] collects rows into [`TableRows`] and interns heap
//!   content through [`HeapBuilder`], handing out handles that rows can reference right away.
//! - **Serialization** - [`MetadataRootBuilder`] (or [`PortablePdbBuilder`] for a standalone PDB)
//!   takes ownership of the content, lays out the heaps, computes the
//!   [`crate::metadata::sizes::MetadataSizes`] and writes the image into a
//!   [`crate::BlobBuilder`].
//!
//! Nothing here is global: every serialization pass owns its dictionaries and layout and drops
//! them when done.
//!
//! # Example
//!
//! ```rust
//! use metascope::{
//!     builder::{MetadataBuilder, MetadataRootBuilder, RowValue},
//!     metadata::{handles::EntityHandle, tables::TableId, MetadataReader},
//!     BlobBuilder,
//! };
//!
//! let mut metadata = MetadataBuilder::new();
//! let system = metadata.intern_string("System");
//! let object = metadata.intern_string("Object");
//! metadata.add_row(
//!     TableId::TypeRef,
//!     vec![
//!         RowValue::Entity(EntityHandle::nil(TableId::Module)),
//!         RowValue::String(object),
//!         RowValue::String(system),
//!     ],
//! )?;
//!
//! let mut image = BlobBuilder::new();
//! MetadataRootBuilder::new(metadata, None, false)?.serialize(&mut image)?;
//!
//! let bytes = image.to_vec()?;
//! let reader = MetadataReader::read(&bytes)?;
//! let type_ref = reader.tables().table(TableId::TypeRef).unwrap().row(1)?;
//! assert_eq!(reader.strings().resolve(type_ref.string(1)?)?, "Object");
//! # Ok::<(), metascope::Error>(())
//! ```

mod contentid;
mod heaps;
mod metadata;
mod pdb;
mod root;
mod tables;

pub use contentid::ContentId;
pub use heaps::{HeapBuilder, SerializedHeaps, MAX_USER_STRING_HEAP_SIZE};
pub use metadata::MetadataBuilder;
pub use pdb::{IdProvider, PortablePdbBuilder};
pub use root::{MetadataRootBuilder, DEFAULT_METADATA_VERSION, PORTABLE_PDB_VERSION};
pub use tables::{RowValue, TableRows};
