//! # metascope Prelude
//!
//! This module provides a convenient prelude for the most commonly used types from the metascope
//! library. Import this module to get quick access to the essential types for reading and
//! writing metadata.
//!
//! ```rust
//! use metascope::prelude::*;
//!
//! let mut builder = BlobBuilder::new();
//! builder.write_compressed_integer(0x80)?;
//! assert_eq!(BlobReader::new(&builder.to_vec()?).read_compressed_integer()?, 0x80);
//! # Ok::<(), Error>(())
//! ```

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all metascope operations
pub use crate::Error;

/// The result type used throughout metascope
pub use crate::Result;

// ================================================================================================
// Byte Streams
// ================================================================================================

/// Chunked writer, bounded reader and their supporting types
pub use crate::blob::{Blob, BlobBuilder, BlobReader, BlobWriter, MemoryBlock, PooledAllocator};

// ================================================================================================
// Metadata - Handles, Tables and Layout
// ================================================================================================

/// Handles to table rows and heap entries
pub use crate::metadata::handles::{
    BlobHandle, EntityHandle, GuidHandle, Handle, HandleKind, HandleValue, StringHandle,
    UserStringHandle,
};

/// Table identifiers and coded indices
pub use crate::metadata::tables::{CodedIndexType, TableId, TableMask, TABLE_SLOTS};

/// Reference widths and stream layout
pub use crate::metadata::sizes::{HeapIndex, HeapSizeFlags, MetadataSizes, ReferenceSizes};

// ================================================================================================
// Reading
// ================================================================================================

/// Parsed metadata images
pub use crate::{file::MetadataFile, metadata::MetadataReader};

// ================================================================================================
// Writing
// ================================================================================================

/// Heap and table accumulation, root and Portable PDB serialization
pub use crate::builder::{
    ContentId, HeapBuilder, MetadataBuilder, MetadataRootBuilder, PortablePdbBuilder, RowValue,
};
