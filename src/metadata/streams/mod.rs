//! Metadata streams.
//!
//! The metadata root lists a directory of named streams:
//!
//! ## String Heaps
//! - **`#Strings`** - UTF-8 identifier strings. The first entry is always the empty string.
//! - **`#US`** - UTF-16 user strings from IL code, each with a length prefix and terminal byte.
//!
//! ## Binary Data
//! - **`#Blob`** - Signatures, custom attribute values and other length-prefixed binary data.
//! - **`#GUID`** - A sequence of 128-bit GUIDs.
//!
//! ## Tables
//! - **`#~`** - Compressed metadata tables.
//! - **`#-`** - Uncompressed tables of edit-and-continue deltas.
//!
//! ## Portable PDB
//! - **`#Pdb`** - Id, entry point and external row counts of a standalone Portable PDB.
//!
//! Every reader here borrows the stream bytes and never copies them.
//!
//! # References
//! - ECMA-335 6th Edition, Partition II, Section 24.2
//! - Portable PDB v1.0, Metadata Format

mod blob;
mod guid;
mod pdbstream;
mod streamheader;
mod strings;
mod tablesheader;
mod userstrings;

pub use blob::Blobs;
pub use guid::Guids;
pub use pdbstream::{PdbStream, PDB_ID_SIZE};
pub use streamheader::{StreamHeader, MAX_STREAM_NAME_LENGTH};
pub use strings::Strings;
pub use tablesheader::{Row, Table, TablesHeader};
pub use userstrings::UserStrings;
